//! Staged MAC cluster
//!
//! Four parallel multiply-accumulate lanes, each with a 3-deep stage shift
//! register and a 64-bit signed accumulator. Operands arrive as raw bytes
//! and are widened unsigned before zero-point subtraction, so `0xE0` with a
//! zero-point of 0 is 224, not -32.
//!
//! The product of the operand pair presented in a cycle lands in the
//! accumulator in that same cycle; the stage registers shift once per cycle
//! and model the three-cycle result-valid latency only. The accumulator
//! captured on a TLAST cycle is therefore the complete dot product of the
//! pixel. TLAST resets the accumulator alone; stage registers are never
//! flushed.

use qcar_core::MAC_LANES;

/// One pipeline stage register.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MacStage {
    pub valid: bool,
    pub input: u8,
    pub weight: u8,
    pub product: i64,
}

/// Snapshot emitted by a lane at the start of a cycle, before the stages
/// shift. `valid` tracks the stage-2 register and goes high once the
/// pipeline has filled (three cycles).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneStep {
    pub cycle: u64,
    pub accumulator: i64,
    pub valid: bool,
}

/// A single MAC lane.
#[derive(Debug, Clone)]
pub struct MacLane {
    id: u8,
    zero_point_in: i32,
    zero_point_weight: i32,
    stages: [MacStage; 3],
    accumulator: i64,
    cycle_count: u64,
}

impl MacLane {
    pub fn new(id: u8, zero_point_in: i32, zero_point_weight: i32) -> Self {
        Self {
            id,
            zero_point_in,
            zero_point_weight,
            stages: [MacStage::default(); 3],
            accumulator: 0,
            cycle_count: 0,
        }
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    /// Advance one cycle with a new operand pair.
    pub fn step(&mut self, input: u8, weight: u8) -> LaneStep {
        let emitted = LaneStep {
            cycle: self.cycle_count,
            accumulator: self.accumulator,
            valid: self.stages[2].valid,
        };

        self.stages[2] = self.stages[1];
        self.stages[1] = self.stages[0];

        let product = i64::from(i32::from(input) - self.zero_point_in)
            * i64::from(i32::from(weight) - self.zero_point_weight);
        self.accumulator += product;
        self.stages[0] = MacStage {
            valid: true,
            input,
            weight,
            product,
        };

        self.cycle_count += 1;
        emitted
    }

    pub fn accumulator(&self) -> i64 {
        self.accumulator
    }

    pub fn reset_accumulator(&mut self) {
        self.accumulator = 0;
    }

    fn take_accumulator(&mut self) -> i64 {
        let accumulator = self.accumulator;
        self.accumulator = 0;
        accumulator
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    pub fn stage(&self, index: usize) -> &MacStage {
        &self.stages[index]
    }
}

/// Result of one cluster cycle. `accumulators` holds the captured dot
/// products when `valid` (a TLAST cycle), otherwise the in-flight running
/// sums, which are informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterOutput {
    pub cycle: u64,
    pub accumulators: [i64; MAC_LANES],
    pub valid: bool,
}

/// Four lanes stepping in lockstep on a shared cycle.
#[derive(Debug, Clone)]
pub struct MacCluster {
    lanes: [MacLane; MAC_LANES],
}

impl MacCluster {
    pub fn new(zero_point_in: i32, zero_point_weight: i32) -> Self {
        Self {
            lanes: [
                MacLane::new(0, zero_point_in, zero_point_weight),
                MacLane::new(1, zero_point_in, zero_point_weight),
                MacLane::new(2, zero_point_in, zero_point_weight),
                MacLane::new(3, zero_point_in, zero_point_weight),
            ],
        }
    }

    /// Step all four lanes. On `tlast`, each lane's accumulator is captured
    /// into the output and reset for the next pixel.
    pub fn step(
        &mut self,
        inputs: [u8; MAC_LANES],
        weights: [u8; MAC_LANES],
        tlast: bool,
    ) -> ClusterOutput {
        let cycle = self.lanes[0].cycle_count();
        let mut accumulators = [0i64; MAC_LANES];
        for (index, lane) in self.lanes.iter_mut().enumerate() {
            lane.step(inputs[index], weights[index]);
            accumulators[index] = if tlast {
                lane.take_accumulator()
            } else {
                lane.accumulator()
            };
        }
        ClusterOutput {
            cycle,
            accumulators,
            valid: tlast,
        }
    }

    pub fn reset_all(&mut self) {
        for lane in &mut self.lanes {
            lane.reset_accumulator();
        }
    }

    pub fn lane(&self, index: usize) -> &MacLane {
        &self.lanes[index]
    }

    /// Cycles elapsed since construction (all lanes share the clock).
    pub fn cycle_count(&self) -> u64 {
        self.lanes[0].cycle_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_lane_dot_product() {
        let mut lane = MacLane::new(0, 0, 0);
        let inputs = [10u8, 20, 30, 40, 50];
        for &input in &inputs {
            lane.step(input, 2);
        }
        assert_eq!(lane.accumulator(), 300);
        assert_eq!(lane.cycle_count(), 5);
    }

    #[test]
    fn cluster_emits_300_on_tlast() {
        let mut cluster = MacCluster::new(0, 0);
        let inputs = [10u8, 20, 30, 40, 50];
        let mut last = None;
        for (i, &input) in inputs.iter().enumerate() {
            let tlast = i == inputs.len() - 1;
            let out = cluster.step([input; 4], [2; 4], tlast);
            last = Some(out);
        }
        let out = last.unwrap();
        assert!(out.valid);
        assert_eq!(out.accumulators[0], 300);
        // TLAST resets every lane.
        assert_eq!(cluster.lane(0).accumulator(), 0);
    }

    #[test]
    fn result_valid_after_three_cycle_fill() {
        let mut lane = MacLane::new(0, 0, 0);
        let mut valids = Vec::new();
        for _ in 0..5 {
            valids.push(lane.step(1, 1).valid);
        }
        assert_eq!(valids, vec![false, false, false, true, true]);
    }

    #[test]
    fn zero_points_shift_operands() {
        // 200 - 128 = 72 signed, 100 - 120 = -20 signed.
        let mut lane = MacLane::new(0, 128, 120);
        lane.step(200, 100);
        assert_eq!(lane.accumulator(), 72 * -20);
        assert_eq!(lane.stage(0).product, -1440);
    }

    #[test]
    fn high_bytes_are_unsigned_operands() {
        // 0xE0 reads as 224, not -32.
        let mut lane = MacLane::new(0, 0, 0);
        lane.step(1, 0xE0);
        assert_eq!(lane.accumulator(), 224);
    }

    #[test]
    fn accumulator_reset_is_per_pixel_only() {
        let mut cluster = MacCluster::new(0, 0);
        // First pixel: 3 taps of 2*3.
        for i in 0..3 {
            cluster.step([2; 4], [3; 4], i == 2);
        }
        // Second pixel: 3 taps of 5*1; sum must not include the first pixel.
        let mut final_out = None;
        for i in 0..3 {
            final_out = Some(cluster.step([5; 4], [1; 4], i == 2));
        }
        let out = final_out.unwrap();
        assert_eq!(out.accumulators, [15; 4]);
        // Stage registers kept shifting across the pixel boundary.
        assert!(cluster.lane(0).stage(2).valid);
    }

    #[test]
    fn lanes_accumulate_independently() {
        let mut cluster = MacCluster::new(0, 0);
        let out = cluster.step([1, 2, 3, 4], [10, 10, 10, 10], true);
        assert_eq!(out.accumulators, [10, 20, 30, 40]);
    }

    #[test]
    fn non_tlast_output_is_running_sum() {
        let mut cluster = MacCluster::new(0, 0);
        let out = cluster.step([7; 4], [2; 4], false);
        assert!(!out.valid);
        assert_eq!(out.accumulators, [14; 4]);
        assert_eq!(cluster.lane(0).accumulator(), 14);
    }

    #[test]
    fn cluster_cycle_advances_once_per_step() {
        let mut cluster = MacCluster::new(0, 0);
        assert_eq!(cluster.step([0; 4], [0; 4], false).cycle, 0);
        assert_eq!(cluster.step([0; 4], [0; 4], false).cycle, 1);
        assert_eq!(cluster.cycle_count(), 2);
    }
}
