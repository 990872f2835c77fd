//! Pipeline coordinator
//!
//! Drives one convolutional layer through the full accelerator model:
//! address generation, the 4-lane MAC cluster, Q8.24 dequantization, and
//! RMW output storage, emitting golden-trace events along the way.
//!
//! The coordinator consumes the generator's pixel-block walk rather than
//! the flat record stream: the blocks carry pad validity (so padded
//! operands can be zeroed), absolute output channels (so stores land on the
//! right bytes across lane batches), and pixel coordinates (the tiled walk
//! order is not raster order once the output is wider than a tile, so
//! coordinates cannot be recovered from a running pixel count).
//!
//! All four lanes step every cycle. Lanes whose output channel does not
//! exist (the tail of a partial batch) are fed zero operands and their
//! results are never emitted, like the idle hardware lanes they model.

use log::debug;
use qcar_core::error::{MemRegion, ModelError};
use qcar_core::{ConvConfig, OutputConfig, QuantConfig, MAC_LANES};
use serde::Serialize;
use std::fmt;

use crate::dequant::Dequantizer;
use crate::index_gen::IndexGenerator;
use crate::mac::MacCluster;
use crate::storage::OutputStorage;
use crate::trace::{TraceEvent, TraceSink};

/// End-of-layer totals reported by [`AcceleratorModel::run_layer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LayerSummary {
    pub total_macs: u64,
    /// Pixel completions across all lane batches
    /// (`output_height * output_width * oc_batches`).
    pub pixels_completed: u64,
    pub outputs_stored: u64,
    pub cycles: u64,
    /// Dimensions of the stored surface (pooled when pooling is fused).
    pub output_height: u32,
    pub output_width: u32,
    pub output_channels: u32,
}

impl fmt::Display for LayerSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total MACs processed:  {}", self.total_macs)?;
        writeln!(f, "Pixels completed:      {}", self.pixels_completed)?;
        writeln!(f, "Outputs stored:        {}", self.outputs_stored)?;
        writeln!(f, "Cycles executed:       {}", self.cycles)?;
        write!(
            f,
            "Stored surface:        {}x{}x{}",
            self.output_height, self.output_width, self.output_channels
        )
    }
}

/// The complete accelerator pipeline for one layer invocation.
#[derive(Debug)]
pub struct AcceleratorModel {
    conv: ConvConfig,
    quant: QuantConfig,
    pooling: bool,
    index_gen: IndexGenerator,
    cluster: MacCluster,
    dequant: Dequantizer,
    storage: OutputStorage,
}

impl AcceleratorModel {
    /// Build the pipeline. `output` describes the conv-resolution surface;
    /// it must agree with the derived output dimensions of `conv`. With
    /// `enable_pooling` the storage is allocated at pooled (floor-halved)
    /// resolution and stores go through the 2x2 max reduction.
    pub fn new(
        conv: ConvConfig,
        quant: QuantConfig,
        output: OutputConfig,
    ) -> Result<Self, ModelError> {
        if output.output_height != conv.output_height()
            || output.output_width != conv.output_width()
            || output.output_channels != conv.num_filters()
        {
            return Err(ModelError::Configuration(format!(
                "output surface {}x{}x{} does not match derived conv output {}x{}x{}",
                output.output_height,
                output.output_width,
                output.output_channels,
                conv.output_height(),
                conv.output_width(),
                conv.num_filters(),
            )));
        }

        let storage_config = if output.enable_pooling {
            output.pooled()
        } else {
            output
        };

        Ok(Self {
            index_gen: IndexGenerator::with_defaults(conv.clone())?,
            cluster: MacCluster::new(quant.zero_point_in, quant.zero_point_weight),
            dequant: Dequantizer::new(quant),
            storage: OutputStorage::new(storage_config)?,
            pooling: output.enable_pooling,
            conv,
            quant,
        })
    }

    pub fn conv_config(&self) -> &ConvConfig {
        &self.conv
    }

    pub fn index_generator(&self) -> &IndexGenerator {
        &self.index_gen
    }

    pub fn storage(&self) -> &OutputStorage {
        &self.storage
    }

    /// The stored output tensor in linear order.
    pub fn output_bytes(&self) -> Vec<i8> {
        self.storage.output_bytes()
    }

    /// Run the layer over the given activation and weight RAM images
    /// (addresses index the slices directly; the generator is built with
    /// zero base addresses).
    pub fn run_layer(
        &mut self,
        input_ram: &[u8],
        weight_ram: &[u8],
        sink: &mut dyn TraceSink,
    ) -> Result<LayerSummary, ModelError> {
        if input_ram.len() < self.conv.input_len() as usize {
            return Err(ModelError::Configuration(format!(
                "input RAM holds {} bytes, layer needs {}",
                input_ram.len(),
                self.conv.input_len()
            )));
        }
        if weight_ram.len() < self.conv.weight_len() as usize {
            return Err(ModelError::Configuration(format!(
                "weight RAM holds {} bytes, layer needs {}",
                weight_ram.len(),
                self.conv.weight_len()
            )));
        }

        debug!(
            "running layer: {}x{}x{} -> {}x{}x{}, {} MACs expected",
            self.conv.input_height(),
            self.conv.input_width(),
            self.conv.input_channels(),
            self.conv.output_height(),
            self.conv.output_width(),
            self.conv.num_filters(),
            self.conv.total_macs(),
        );

        let pooling = self.pooling;
        let macs_per_pixel = self.conv.macs_per_pixel() as usize;
        let conv_width = self.conv.output_width();
        let quant = self.quant;

        let index_gen = &self.index_gen;
        let cluster = &mut self.cluster;
        let dequant = &self.dequant;
        let storage = &mut self.storage;

        let mut total_macs = 0u64;
        let mut pixels_completed = 0u64;
        let mut outputs_stored = 0u64;

        // Per-batch conv-resolution plane, only used when pooling.
        let mut plane = if pooling {
            vec![0i8; (self.conv.output_height() * conv_width) as usize * MAC_LANES]
        } else {
            Vec::new()
        };
        let mut current_batch: Option<(u32, usize)> = None;

        index_gen.try_for_each_pixel(|block| -> Result<(), ModelError> {
            if pooling {
                match current_batch {
                    Some((batch, lane_count)) if batch != block.oc_batch => {
                        outputs_stored += flush_pooled(
                            storage,
                            sink,
                            &plane,
                            conv_width,
                            batch,
                            lane_count,
                            cluster.cycle_count(),
                        )?;
                        current_batch = Some((block.oc_batch, block.lanes.len()));
                    }
                    None => current_batch = Some((block.oc_batch, block.lanes.len())),
                    _ => {}
                }
            }

            for j in 0..macs_per_pixel {
                let mut inputs = [0u8; MAC_LANES];
                let mut weights = [0u8; MAC_LANES];
                for (lane_idx, lane) in block.lanes.iter().enumerate() {
                    let tap = lane.taps[j];
                    if !tap.pad {
                        inputs[lane_idx] = *input_ram
                            .get(tap.input_addr as usize)
                            .ok_or(ModelError::AddressOutOfBounds {
                                region: MemRegion::Input,
                                index: total_macs as usize + lane_idx,
                                addr: tap.input_addr,
                                base: 0,
                                limit: input_ram.len() as u32,
                            })?;
                    }
                    weights[lane_idx] = *weight_ram.get(tap.weight_addr as usize).ok_or(
                        ModelError::AddressOutOfBounds {
                            region: MemRegion::Weight,
                            index: total_macs as usize + lane_idx,
                            addr: tap.weight_addr,
                            base: 0,
                            limit: weight_ram.len() as u32,
                        },
                    )?;
                }

                let tlast = j == macs_per_pixel - 1;
                let out = cluster.step(inputs, weights, tlast);
                for (lane_idx, lane) in block.lanes.iter().enumerate() {
                    sink.record(TraceEvent::Mac {
                        cycle: out.cycle,
                        lane: lane.oc_lane,
                        input: inputs[lane_idx],
                        weight: weights[lane_idx],
                        accumulator: out.accumulators[lane_idx],
                    });
                }
                total_macs += block.lanes.len() as u64;

                if tlast {
                    for (lane_idx, lane) in block.lanes.iter().enumerate() {
                        let accumulator = out.accumulators[lane_idx];
                        let (value, _) = dequant.dequantize_scalar(accumulator);
                        sink.record(TraceEvent::Dequant {
                            cycle: out.cycle,
                            accumulator,
                            scale_factor: quant.scale_factor,
                            output: value as u8,
                        });

                        if pooling {
                            let slot = ((block.out_y * conv_width + block.out_x) as usize)
                                * MAC_LANES
                                + lane_idx;
                            plane[slot] = value;
                        } else {
                            let record =
                                storage.store(block.out_y, block.out_x, lane.oc, value)?;
                            sink.record(TraceEvent::Store {
                                cycle: out.cycle,
                                word_addr: record.word_addr,
                                byte_sel: record.byte_sel,
                                value: value as u8,
                            });
                            outputs_stored += 1;
                        }
                    }
                    pixels_completed += 1;
                    sink.record(TraceEvent::PixelComplete {
                        cycle: out.cycle,
                        out_y: block.out_y,
                        out_x: block.out_x,
                        oc_batch: block.oc_batch,
                    });
                }
            }
            Ok(())
        })?;

        if let Some((batch, lane_count)) = current_batch {
            outputs_stored += flush_pooled(
                storage,
                sink,
                &plane,
                conv_width,
                batch,
                lane_count,
                cluster.cycle_count(),
            )?;
        }

        let expected_macs = self.conv.total_macs();
        if total_macs != expected_macs {
            return Err(ModelError::SequenceInvariant {
                what: "total MAC count".to_string(),
                index: total_macs as usize,
                expected: expected_macs.to_string(),
                actual: total_macs.to_string(),
            });
        }

        let summary = LayerSummary {
            total_macs,
            pixels_completed,
            outputs_stored,
            cycles: self.cluster.cycle_count(),
            output_height: self.storage.config().output_height,
            output_width: self.storage.config().output_width,
            output_channels: self.storage.config().output_channels,
        };
        debug!("layer complete: {} MACs, {} outputs", total_macs, outputs_stored);
        Ok(summary)
    }
}

/// Reduce one batch's buffered conv-resolution plane 2x2 and commit the
/// maxima at pooled coordinates.
fn flush_pooled(
    storage: &mut OutputStorage,
    sink: &mut dyn TraceSink,
    plane: &[i8],
    conv_width: u32,
    batch: u32,
    lane_count: usize,
    cycle: u64,
) -> Result<u64, ModelError> {
    let pooled_height = storage.config().output_height;
    let pooled_width = storage.config().output_width;
    let mut stored = 0u64;
    for pooled_y in 0..pooled_height {
        for pooled_x in 0..pooled_width {
            for lane_idx in 0..lane_count {
                let slot = |y: u32, x: u32| ((y * conv_width + x) as usize) * MAC_LANES + lane_idx;
                let y0 = pooled_y * 2;
                let x0 = pooled_x * 2;
                let values = [
                    plane[slot(y0, x0)],
                    plane[slot(y0, x0 + 1)],
                    plane[slot(y0 + 1, x0)],
                    plane[slot(y0 + 1, x0 + 1)],
                ];
                let value = storage.pool_max2x2(values);
                let oc = batch * MAC_LANES as u32 + lane_idx as u32;
                let record = storage.store(pooled_y, pooled_x, oc, value)?;
                sink.record(TraceEvent::Store {
                    cycle,
                    word_addr: record.word_addr,
                    byte_sel: record.byte_sel,
                    value: value as u8,
                });
                stored += 1;
            }
        }
    }
    Ok(stored)
}
