//! Output storage: byte-level read-modify-write into 32-bit BRAM words
//!
//! Outputs are signed bytes packed four to a little-endian 32-bit word at
//! `word_addr = base + linear/4`, `byte_sel = linear % 4`, where
//! `linear = (y * width + x) * channels + c`. Writes are applied in the
//! exact order received, so a later write to the same byte lane wins.
//!
//! The BRAM is a sparse word map; unwritten words read as zero. A
//! `BTreeMap` keeps readout order deterministic across runs and platforms.

use std::collections::BTreeMap;

use qcar_core::error::{ModelError, VerifyReport};
use qcar_core::{OutputConfig, StreamBeat};
use serde::Serialize;

/// Insert one byte into a 32-bit little-endian word.
pub fn insert_byte(word: u32, value: u8, byte_sel: u32) -> u32 {
    let shift = byte_sel * 8;
    let mask = 0xFFFF_FFFFu32 ^ (0xFFu32 << shift);
    (word & mask) | (u32::from(value) << shift)
}

/// Extract one byte from a 32-bit little-endian word.
pub fn extract_byte(word: u32, byte_sel: u32) -> u8 {
    ((word >> (byte_sel * 8)) & 0xFF) as u8
}

/// Golden-trace record of one committed (or computed) store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreRecord {
    pub out_y: u32,
    pub out_x: u32,
    pub out_c: u32,
    pub word_addr: u32,
    pub byte_sel: u32,
    pub value: i8,
    pub old_word: u32,
    pub new_word: u32,
}

/// Banked BRAM packer with stream-driven pixel sequencing.
#[derive(Debug, Clone)]
pub struct OutputStorage {
    config: OutputConfig,
    bram: BTreeMap<u32, u32>,
    pixel_count: u32,
}

impl OutputStorage {
    pub fn new(config: OutputConfig) -> Result<Self, ModelError> {
        config.validate()?;
        Ok(Self {
            config,
            bram: BTreeMap::new(),
            pixel_count: 0,
        })
    }

    pub fn config(&self) -> &OutputConfig {
        &self.config
    }

    /// Pixels completed so far on the stream path (advanced by TLAST).
    pub fn pixel_count(&self) -> u32 {
        self.pixel_count
    }

    /// Word address and byte lane for an output coordinate.
    pub fn calc_output_addr(&self, out_y: u32, out_x: u32, out_c: u32) -> (u32, u32) {
        let linear =
            (out_y * self.config.output_width + out_x) * self.config.output_channels + out_c;
        let word_addr = self.config.output_base_addr + linear / 4;
        (word_addr, linear % 4)
    }

    /// Compute the RMW for one output value against a caller-supplied word.
    /// Pure: no state is touched, so drivers can emit golden store traces
    /// without committing them.
    pub fn store_output(
        &self,
        out_y: u32,
        out_x: u32,
        out_c: u32,
        value: i8,
        old_word: u32,
    ) -> Result<StoreRecord, ModelError> {
        if out_y >= self.config.output_height
            || out_x >= self.config.output_width
            || out_c >= self.config.output_channels
        {
            return Err(ModelError::CoordinateOutOfBounds {
                y: out_y,
                x: out_x,
                c: out_c,
                height: self.config.output_height,
                width: self.config.output_width,
                channels: self.config.output_channels,
            });
        }

        let (word_addr, byte_sel) = self.calc_output_addr(out_y, out_x, out_c);
        let new_word = insert_byte(old_word, value as u8, byte_sel);
        Ok(StoreRecord {
            out_y,
            out_x,
            out_c,
            word_addr,
            byte_sel,
            value,
            old_word,
            new_word,
        })
    }

    /// Commit one output value through the RMW path.
    pub fn store(
        &mut self,
        out_y: u32,
        out_x: u32,
        out_c: u32,
        value: i8,
    ) -> Result<StoreRecord, ModelError> {
        let (word_addr, _) = self.calc_output_addr(out_y, out_x, out_c);
        let old_word = self.word(word_addr);
        let record = self.store_output(out_y, out_x, out_c, value, old_word)?;
        self.bram.insert(record.word_addr, record.new_word);
        Ok(record)
    }

    /// Consume one stream beat, deriving raster coordinates from the running
    /// pixel count: `out_y = pixels / width`, `out_x = pixels % width`,
    /// `out_c = tid`. TLAST advances the pixel count after the beat is
    /// processed. Beats past the end of the output array are silently
    /// dropped.
    pub fn process_stream(&mut self, beat: StreamBeat) -> Option<StoreRecord> {
        let out_y = self.pixel_count / self.config.output_width;
        let out_x = self.pixel_count % self.config.output_width;
        let out_c = u32::from(beat.tid);

        if out_y >= self.config.output_height {
            return None;
        }

        let (word_addr, byte_sel) = self.calc_output_addr(out_y, out_x, out_c);
        let old_word = self.word(word_addr);
        let new_word = insert_byte(old_word, beat.tdata, byte_sel);
        self.bram.insert(word_addr, new_word);

        if beat.tlast {
            self.pixel_count += 1;
        }

        Some(StoreRecord {
            out_y,
            out_x,
            out_c,
            word_addr,
            byte_sel,
            value: beat.tdata as i8,
            old_word,
            new_word,
        })
    }

    /// Signed maximum of a 2x2 output block.
    pub fn pool_max2x2(&self, values: [i8; 4]) -> i8 {
        values.into_iter().fold(i8::MIN, i8::max)
    }

    /// Check that every word address lies within the declared output window.
    pub fn verify(&self, addresses: &[u32]) -> VerifyReport {
        let base = self.config.output_base_addr;
        let limit = base + self.config.words_needed();
        let mut report = VerifyReport::new("output_storage", addresses.len());
        for (index, &addr) in addresses.iter().enumerate() {
            if addr < base || addr >= limit {
                report.push(
                    index,
                    format!("word address in 0x{:06x}..0x{:06x}", base, limit),
                    format!("0x{:06x}", addr),
                );
            }
        }
        report
    }

    /// Read a BRAM word; unwritten words are zero.
    pub fn word(&self, word_addr: u32) -> u32 {
        self.bram.get(&word_addr).copied().unwrap_or(0)
    }

    /// All written words in ascending address order.
    pub fn words(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.bram.iter().map(|(&addr, &word)| (addr, word))
    }

    /// Read one output byte by linear element index.
    pub fn read_byte(&self, linear: u32) -> i8 {
        let word = self.word(self.config.output_base_addr + linear / 4);
        extract_byte(word, linear % 4) as i8
    }

    /// The full output tensor in linear order, as the driver reads it out
    /// at the end of a layer.
    pub fn output_bytes(&self) -> Vec<i8> {
        (0..self.config.num_outputs())
            .map(|linear| self.read_byte(linear))
            .collect()
    }

    /// An out-of-bounds word address for this surface; used by tests and
    /// demos to show `verify` catching generator bugs.
    pub fn limit_word_addr(&self) -> u32 {
        self.config.output_base_addr + self.config.words_needed()
    }
}
