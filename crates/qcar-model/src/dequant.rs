//! Q8.24 dequantization pipeline
//!
//! Converts a signed wide accumulator to a saturated signed 8-bit output:
//!
//! 1. Subtract `zero_point_in`
//! 2. Multiply by the Q8.24 `scale_factor` (widened to 128 bits)
//! 3. Add 0.5 in Q8.24 (`0x0080_0000`), then arithmetic shift right by 24
//! 4. Optional ReLU
//! 5. Add `zero_point_out`
//! 6. Saturate to `[-128, 127]`
//!
//! The rounding add is applied before the shift for negative products too,
//! which promotes exact halves toward positive infinity. That asymmetry is
//! part of the hardware contract; do not replace it with round-half-away or
//! banker's rounding. No floating point anywhere on this path.

use qcar_core::{QuantConfig, Q824_FRAC_BITS, Q824_HALF};
use serde::Serialize;

/// Clamp a wide value to the signed 8-bit range.
pub fn saturate_i8(value: i64) -> i8 {
    value.clamp(i64::from(i8::MIN), i64::from(i8::MAX)) as i8
}

/// Per-element record of the fixed-point pipeline, for golden-trace
/// verification against the hardware's internal registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DequantTrace {
    pub accum_before: i64,
    pub accum_after_zp: i64,
    pub product_shifted: i64,
    pub after_relu: i64,
    pub final_int8: i8,
}

/// The dequantization unit for one layer.
#[derive(Debug, Clone)]
pub struct Dequantizer {
    config: QuantConfig,
}

impl Dequantizer {
    pub fn new(config: QuantConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &QuantConfig {
        &self.config
    }

    /// Dequantize a single accumulator.
    pub fn dequantize_scalar(&self, accumulator: i64) -> (i8, DequantTrace) {
        let accum_after_zp = accumulator - i64::from(self.config.zero_point_in);

        // Widen to 128 bits: a ~2^40 accumulator times a 2^32 scale does not
        // fit in i64 before the shift.
        let wide = i128::from(accum_after_zp) * i128::from(self.config.scale_factor);
        let shifted = (wide + i128::from(Q824_HALF)) >> Q824_FRAC_BITS;
        let product_shifted = shifted as i64;

        let after_relu = if self.config.enable_relu {
            product_shifted.max(0)
        } else {
            product_shifted
        };

        let final_int8 = saturate_i8(after_relu.saturating_add(i64::from(self.config.zero_point_out)));

        let trace = DequantTrace {
            accum_before: accumulator,
            accum_after_zp,
            product_shifted,
            after_relu,
            final_int8,
        };
        (final_int8, trace)
    }

    /// Dequantize a slice of accumulators in order.
    pub fn dequantize_vector(&self, accumulators: &[i64]) -> (Vec<i8>, Vec<DequantTrace>) {
        let mut outputs = Vec::with_capacity(accumulators.len());
        let mut traces = Vec::with_capacity(accumulators.len());
        for &accum in accumulators {
            let (value, trace) = self.dequantize_scalar(accum);
            outputs.push(value);
            traces.push(trace);
        }
        (outputs, traces)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use qcar_core::Q824_ONE;

    fn unit(scale_factor: u32, enable_relu: bool) -> Dequantizer {
        Dequantizer::new(QuantConfig {
            zero_point_in: 0,
            zero_point_weight: 0,
            zero_point_out: 0,
            scale_factor,
            enable_relu,
        })
    }

    #[test]
    fn basic_half_scale_with_relu() {
        let dequant = unit(Q824_HALF, true);
        let cases = [
            (0, 0),
            (100, 50),
            (200, 100),
            (512, 127),
            (-100, 0),
            (-50, 0),
        ];
        for (accum, expected) in cases {
            let (value, _) = dequant.dequantize_scalar(accum);
            assert_eq!(value, expected, "accum {}", accum);
        }
    }

    #[test]
    fn saturation_without_relu() {
        let dequant = unit(Q824_ONE, false);
        let cases = [
            (0, 0),
            (127, 127),
            (128, 127),
            (255, 127),
            (-128, -128),
            (-129, -128),
            (-200, -128),
        ];
        for (accum, expected) in cases {
            let (value, _) = dequant.dequantize_scalar(accum);
            assert_eq!(value, expected, "accum {}", accum);
        }
    }

    #[test]
    fn relu_clips_negatives() {
        let dequant = unit(Q824_ONE, true);
        let cases = [(100, 100), (50, 50), (0, 0), (-1, 0), (-50, 0), (-128, 0)];
        for (accum, expected) in cases {
            let (value, _) = dequant.dequantize_scalar(accum);
            assert_eq!(value, expected, "accum {}", accum);
        }
    }

    #[test]
    fn vector_matches_scalar() {
        let dequant = unit(Q824_HALF, true);
        let accums = [0, 100, 200, -100, -50, 300];
        let (values, traces) = dequant.dequantize_vector(&accums);
        assert_eq!(values, vec![0, 50, 100, 0, 0, 127]);
        assert_eq!(traces.len(), accums.len());
        for (i, &accum) in accums.iter().enumerate() {
            assert_eq!(traces[i].accum_before, accum);
            assert_eq!(traces[i].final_int8, values[i]);
        }
    }

    #[test]
    fn trace_exposes_every_stage() {
        let dequant = Dequantizer::new(QuantConfig {
            zero_point_in: 10,
            zero_point_weight: 0,
            zero_point_out: 5,
            scale_factor: Q824_HALF,
            enable_relu: true,
        });
        let (value, trace) = dequant.dequantize_scalar(110);
        assert_eq!(trace.accum_before, 110);
        assert_eq!(trace.accum_after_zp, 100);
        assert_eq!(trace.product_shifted, 50);
        assert_eq!(trace.after_relu, 50);
        assert_eq!(trace.final_int8, 55);
        assert_eq!(value, 55);
    }

    #[test]
    fn negative_half_rounds_toward_positive() {
        // -1.5 in the pre-shift domain rounds to -1, not -2.
        let dequant = unit(Q824_HALF, false);
        let (value, trace) = dequant.dequantize_scalar(-3);
        assert_eq!(trace.product_shifted, -1);
        assert_eq!(value, -1);

        // An exact -0.5 is promoted to 0.
        let (value, _) = dequant.dequantize_scalar(-1);
        assert_eq!(value, 0);

        // Scale 1.0 keeps integers fixed even when negative.
        let dequant = unit(Q824_ONE, false);
        let (value, _) = dequant.dequantize_scalar(-7);
        assert_eq!(value, -7);
    }

    #[test]
    fn wide_accumulators_do_not_overflow() {
        let dequant = unit(Q824_ONE, false);
        let (value, trace) = dequant.dequantize_scalar(1 << 40);
        assert_eq!(trace.product_shifted, 1 << 40);
        assert_eq!(value, 127);

        let (value, _) = dequant.dequantize_scalar(-(1 << 40));
        assert_eq!(value, -128);
    }

    #[test]
    fn saturate_is_idempotent() {
        for value in [-1000, -129, -128, -1, 0, 1, 127, 128, 1000] {
            let once = saturate_i8(value);
            assert_eq!(saturate_i8(i64::from(once)), once);
        }
    }

    proptest! {
        #[test]
        fn saturate_idempotent_for_all(value in any::<i64>()) {
            let once = saturate_i8(value);
            prop_assert_eq!(saturate_i8(i64::from(once)), once);
        }

        #[test]
        fn relu_output_is_non_negative_before_zp(accum in any::<i32>()) {
            let dequant = unit(Q824_HALF, true);
            let (_, trace) = dequant.dequantize_scalar(i64::from(accum));
            prop_assert!(trace.after_relu >= 0);
        }

        #[test]
        fn final_value_is_in_i8_range(accum in any::<i64>(), scale in any::<u32>()) {
            let dequant = unit(scale, false);
            let (value, trace) = dequant.dequantize_scalar(accum);
            prop_assert_eq!(value, trace.final_int8);
            prop_assert!(i64::from(value) >= -128 && i64::from(value) <= 127);
        }
    }
}
