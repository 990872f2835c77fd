//! Tiled convolution address-stream generator
//!
//! Produces the exact MAC descriptor sequence the hardware iterates for one
//! convolutional layer. Iteration order, outermost to innermost:
//!
//! 1. Output-channel batch (groups of 4 filters)
//! 2. Tile id, row-major over 16x16 output tiles
//! 3. Pixel within the tile (row-major)
//! 4. MAC lane (0..3)
//! 5. Filter taps: fy, fx, input channel innermost
//!
//! Pixels past the tile overhang and lanes past `num_filters` are skipped
//! whole; no partial records are ever emitted. Taps whose input window
//! falls outside the image still emit a record with the input address
//! clamped to `(0, 0, ic)` and no validity bit; the consumer zeroes the
//! operand. TLAST is asserted on the last tap of each pixel, so exactly one
//! TLAST every `macs_per_pixel` records.

use std::ops::ControlFlow;

use qcar_core::error::{MemRegion, ModelError, VerifyReport};
use qcar_core::{AddressRecord, ConvConfig, MAC_LANES};

/// Default edge length of an output tile.
pub const DEFAULT_TILE_SIZE: u32 = 16;

/// One MAC tap as seen by the pipeline coordinator. `pad` marks taps whose
/// input window fell outside the image (their `input_addr` is the clamped
/// placeholder).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tap {
    pub input_addr: u32,
    pub weight_addr: u32,
    pub pad: bool,
    pub tlast: bool,
}

/// The taps of one lane for one output pixel.
#[derive(Debug, Clone)]
pub struct LaneTaps {
    /// Absolute output channel, `oc_batch * MAC_LANES + oc_lane`.
    pub oc: u32,
    pub oc_lane: u8,
    pub taps: Vec<Tap>,
}

/// All work for one output pixel within one output-channel batch. `lanes`
/// holds only the lanes whose channel exists (1..=4 entries).
#[derive(Debug, Clone)]
pub struct PixelBlock {
    pub oc_batch: u32,
    pub out_y: u32,
    pub out_x: u32,
    pub lanes: Vec<LaneTaps>,
}

/// Deterministic address-stream generator for one layer. Pure function of
/// the configuration: owns no mutable state.
#[derive(Debug, Clone)]
pub struct IndexGenerator {
    config: ConvConfig,
    input_base: u32,
    weight_base: u32,
    tile_size: u32,
    tiles_per_row: u32,
    tiles_per_col: u32,
}

impl IndexGenerator {
    pub fn new(
        config: ConvConfig,
        input_base: u32,
        weight_base: u32,
        tile_size: u32,
    ) -> Result<Self, ModelError> {
        if tile_size == 0 {
            return Err(ModelError::Configuration("tile size must be non-zero".to_string()));
        }
        let tiles_per_row = (config.output_width() + tile_size - 1) / tile_size;
        let tiles_per_col = (config.output_height() + tile_size - 1) / tile_size;
        Ok(Self {
            config,
            input_base,
            weight_base,
            tile_size,
            tiles_per_row,
            tiles_per_col,
        })
    }

    /// Base addresses 0 and the default 16x16 tile.
    pub fn with_defaults(config: ConvConfig) -> Result<Self, ModelError> {
        Self::new(config, 0, 0, DEFAULT_TILE_SIZE)
    }

    pub fn config(&self) -> &ConvConfig {
        &self.config
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn tiles_per_row(&self) -> u32 {
        self.tiles_per_row
    }

    pub fn tiles_per_col(&self) -> u32 {
        self.tiles_per_col
    }

    pub fn total_tiles(&self) -> u32 {
        self.tiles_per_row * self.tiles_per_col
    }

    fn input_addr(&self, in_y: u32, in_x: u32, ic: u32) -> u32 {
        self.input_base
            + (in_y * self.config.input_width() + in_x) * self.config.input_channels()
            + ic
    }

    fn weight_addr(&self, oc: u32, fy: u32, fx: u32, ic: u32) -> u32 {
        let per_filter =
            self.config.filter_height() * self.config.filter_width() * self.config.input_channels();
        self.weight_base
            + oc * per_filter
            + (fy * self.config.filter_width() + fx) * self.config.input_channels()
            + ic
    }

    /// Input position for an output pixel and filter offset, or `None` when
    /// the window falls into the padding border.
    fn input_position(&self, out_y: u32, out_x: u32, fy: u32, fx: u32) -> Option<(u32, u32)> {
        let stride = i64::from(self.config.stride());
        let padding = i64::from(self.config.padding());
        let in_y = i64::from(out_y) * stride - padding + i64::from(fy);
        let in_x = i64::from(out_x) * stride - padding + i64::from(fx);
        if in_y < 0
            || in_y >= i64::from(self.config.input_height())
            || in_x < 0
            || in_x >= i64::from(self.config.input_width())
        {
            return None;
        }
        Some((in_y as u32, in_x as u32))
    }

    fn lane_taps(&self, out_y: u32, out_x: u32, oc: u32, oc_lane: u8) -> LaneTaps {
        let shape = self.config.shape();
        let mut taps = Vec::with_capacity(self.config.macs_per_pixel() as usize);
        for fy in 0..shape.filter_height {
            for fx in 0..shape.filter_width {
                for ic in 0..shape.input_channels {
                    let position = self.input_position(out_y, out_x, fy, fx);
                    let (in_y, in_x) = position.unwrap_or((0, 0));
                    taps.push(Tap {
                        input_addr: self.input_addr(in_y, in_x, ic),
                        weight_addr: self.weight_addr(oc, fy, fx, ic),
                        pad: position.is_none(),
                        tlast: fy == shape.filter_height - 1
                            && fx == shape.filter_width - 1
                            && ic == shape.input_channels - 1,
                    });
                }
            }
        }
        LaneTaps { oc, oc_lane, taps }
    }

    fn walk_pixels(
        &self,
        visit: &mut dyn FnMut(PixelBlock) -> ControlFlow<()>,
    ) -> ControlFlow<()> {
        let num_filters = self.config.num_filters();
        for oc_batch in 0..self.config.oc_batches() {
            for tile_id in 0..self.total_tiles() {
                let tile_row = tile_id / self.tiles_per_row;
                let tile_col = tile_id % self.tiles_per_row;
                for out_y_in_tile in 0..self.tile_size {
                    for out_x_in_tile in 0..self.tile_size {
                        let out_y = tile_row * self.tile_size + out_y_in_tile;
                        let out_x = tile_col * self.tile_size + out_x_in_tile;
                        // Tile overhang: skip the whole pixel.
                        if out_y >= self.config.output_height()
                            || out_x >= self.config.output_width()
                        {
                            continue;
                        }
                        let mut lanes = Vec::with_capacity(MAC_LANES);
                        for oc_lane in 0..MAC_LANES as u32 {
                            let oc = oc_batch * MAC_LANES as u32 + oc_lane;
                            if oc >= num_filters {
                                break;
                            }
                            lanes.push(self.lane_taps(out_y, out_x, oc, oc_lane as u8));
                        }
                        visit(PixelBlock {
                            oc_batch,
                            out_y,
                            out_x,
                            lanes,
                        })?;
                    }
                }
            }
        }
        ControlFlow::Continue(())
    }

    /// Visit every pixel block in hardware order.
    pub fn for_each_pixel<F: FnMut(PixelBlock)>(&self, mut visit: F) {
        let _ = self.walk_pixels(&mut |block| {
            visit(block);
            ControlFlow::Continue(())
        });
    }

    /// Visit every pixel block, stopping at the first error.
    pub fn try_for_each_pixel<E, F: FnMut(PixelBlock) -> Result<(), E>>(
        &self,
        mut visit: F,
    ) -> Result<(), E> {
        let mut first_err = None;
        let _ = self.walk_pixels(&mut |block| match visit(block) {
            Ok(()) => ControlFlow::Continue(()),
            Err(err) => {
                first_err = Some(err);
                ControlFlow::Break(())
            }
        });
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// The complete address stream for the layer.
    pub fn generate_all(&self) -> Vec<AddressRecord> {
        let mut records = Vec::with_capacity(self.config.total_macs() as usize);
        self.for_each_pixel(|block| {
            for lane in &block.lanes {
                for tap in &lane.taps {
                    records.push(AddressRecord {
                        input_addr: tap.input_addr,
                        weight_addr: tap.weight_addr,
                        tlast: tap.tlast,
                        oc_lane: lane.oc_lane,
                    });
                }
            }
        });
        records
    }

    /// Prefix of the address stream, without generating the rest.
    pub fn generate_first_n(&self, n: usize) -> Vec<AddressRecord> {
        let mut records = Vec::with_capacity(n.min(self.config.total_macs() as usize));
        let _ = self.walk_pixels(&mut |block| {
            for lane in &block.lanes {
                for tap in &lane.taps {
                    if records.len() == n {
                        return ControlFlow::Break(());
                    }
                    records.push(AddressRecord {
                        input_addr: tap.input_addr,
                        weight_addr: tap.weight_addr,
                        tlast: tap.tlast,
                        oc_lane: lane.oc_lane,
                    });
                }
            }
            if records.len() == n {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        records
    }

    /// Check an emitted sequence against the layer invariants: total record
    /// count, TLAST placement every `macs_per_pixel`, address windows, and
    /// lane range. All mismatches are aggregated into the report.
    pub fn verify(&self, records: &[AddressRecord]) -> VerifyReport {
        let mut report = VerifyReport::new("index_generator", records.len());

        let expected_total = self.config.total_macs();
        if records.len() as u64 != expected_total {
            report.push(
                records.len(),
                format!("{} total records", expected_total),
                format!("{}", records.len()),
            );
        }

        let macs_per_pixel = self.config.macs_per_pixel() as usize;
        let input_limit = self.input_base + self.config.input_len();
        let weight_limit = self.weight_base + self.config.weight_len();

        for (index, record) in records.iter().enumerate() {
            let expected_tlast = (index + 1) % macs_per_pixel == 0;
            if record.tlast != expected_tlast {
                report.push(
                    index,
                    format!("tlast={}", expected_tlast),
                    format!("tlast={}", record.tlast),
                );
            }
            if record.input_addr < self.input_base || record.input_addr >= input_limit {
                report.push(
                    index,
                    format!(
                        "{} address in 0x{:06x}..0x{:06x}",
                        MemRegion::Input,
                        self.input_base,
                        input_limit
                    ),
                    format!("0x{:06x}", record.input_addr),
                );
            }
            if record.weight_addr < self.weight_base || record.weight_addr >= weight_limit {
                report.push(
                    index,
                    format!(
                        "{} address in 0x{:06x}..0x{:06x}",
                        MemRegion::Weight,
                        self.weight_base,
                        weight_limit
                    ),
                    format!("0x{:06x}", record.weight_addr),
                );
            }
            if usize::from(record.oc_lane) >= MAC_LANES {
                report.push(
                    index,
                    "oc_lane in 0..4".to_string(),
                    format!("oc_lane={}", record.oc_lane),
                );
            }
        }

        report
    }
}
