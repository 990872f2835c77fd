//! Core types for the QCAR accelerator reference model
//!
//! This crate provides the shared vocabulary of the bit-accurate reference
//! model of a tiled, quantized CNN convolution accelerator:
//!
//! - Layer descriptors (`ConvShape`/`ConvConfig`, `QuantConfig`, `OutputConfig`)
//! - The address-stream record emitted by the index generator (`AddressRecord`)
//! - The AXI-Stream-shaped beat consumed by output storage (`StreamBeat`)
//! - Q8.24 fixed-point constants
//! - The error taxonomy and structured verification reports (`error` module)
//!
//! All descriptors are immutable for the duration of one layer invocation:
//! they are validated at construction and held by value by the components.
//! Derived quantities (output dimensions, MACs per pixel) are computed once
//! and cached in `ConvConfig`; a shape whose output dimensions would not
//! divide exactly is rejected rather than silently floored.

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Error taxonomy and verification reports
pub mod error;

// ============================================================================
// Fixed-point format
// ============================================================================

/// Number of fractional bits in the Q8.24 fixed-point format.
pub const Q824_FRAC_BITS: u32 = 24;

/// 1.0 in Q8.24.
pub const Q824_ONE: u32 = 0x0100_0000;

/// 0.5 in Q8.24; also the rounding constant added before the right shift.
pub const Q824_HALF: u32 = 0x0080_0000;

/// Convert a Q8.24 scale constant to a float, for display only.
///
/// The bit-accurate pipeline never touches floating point; this exists so
/// drivers can echo `scale=0x00800000 (0.50)` in their banners.
pub fn q824_to_f64(scale: u32) -> f64 {
    f64::from(scale) / f64::from(1u32 << Q824_FRAC_BITS)
}

// ============================================================================
// MAC cluster geometry
// ============================================================================

/// Number of parallel MAC lanes; output channels are batched in groups of
/// this size and `AddressRecord::oc_lane` is always below it.
pub const MAC_LANES: usize = 4;

// ============================================================================
// Convolution configuration
// ============================================================================

/// Raw per-layer convolution dimensions, as supplied by the driver.
///
/// `ConvShape` carries no derived state and no invariants beyond its field
/// types; validation happens when it is turned into a [`ConvConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConvShape {
    pub input_height: u32,
    pub input_width: u32,
    pub input_channels: u32,
    pub filter_height: u32,
    pub filter_width: u32,
    pub num_filters: u32,
    pub stride: u32,
    pub padding: u32,
}

impl ConvShape {
    /// Flat length of the input activation RAM (row-major, channels innermost).
    pub fn input_len(&self) -> u32 {
        self.input_height * self.input_width * self.input_channels
    }

    /// Flat length of the weight RAM (`[oc][fy][fx][ic]` order).
    pub fn weight_len(&self) -> u32 {
        self.num_filters * self.filter_height * self.filter_width * self.input_channels
    }
}

/// Validated, immutable per-layer descriptor with cached derived values.
///
/// Construction fails with [`ModelError::Configuration`] for zero dimensions,
/// zero stride, a filter larger than the padded input, or output dimensions
/// that do not divide exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConvConfig {
    shape: ConvShape,
    output_height: u32,
    output_width: u32,
    macs_per_pixel: u32,
}

impl ConvConfig {
    pub fn new(shape: ConvShape) -> Result<Self, ModelError> {
        if shape.input_height == 0 || shape.input_width == 0 || shape.input_channels == 0 {
            return Err(ModelError::Configuration(
                "input dimensions must be non-zero".to_string(),
            ));
        }
        if shape.filter_height == 0 || shape.filter_width == 0 || shape.num_filters == 0 {
            return Err(ModelError::Configuration(
                "filter dimensions must be non-zero".to_string(),
            ));
        }
        if shape.stride == 0 {
            return Err(ModelError::Configuration("stride must be non-zero".to_string()));
        }

        let output_height = Self::derive_dim(
            shape.input_height,
            shape.filter_height,
            shape.padding,
            shape.stride,
            "output_height",
        )?;
        let output_width = Self::derive_dim(
            shape.input_width,
            shape.filter_width,
            shape.padding,
            shape.stride,
            "output_width",
        )?;
        let macs_per_pixel = shape.filter_height * shape.filter_width * shape.input_channels;

        Ok(Self {
            shape,
            output_height,
            output_width,
            macs_per_pixel,
        })
    }

    /// `(in_dim - filter_dim + 2*padding) / stride + 1`, rejecting underflow
    /// and non-exact division.
    fn derive_dim(
        in_dim: u32,
        filter_dim: u32,
        padding: u32,
        stride: u32,
        name: &str,
    ) -> Result<u32, ModelError> {
        let padded = in_dim + 2 * padding;
        let span = padded.checked_sub(filter_dim).ok_or_else(|| {
            ModelError::Configuration(format!(
                "{}: filter dimension {} exceeds padded input {}",
                name, filter_dim, padded
            ))
        })?;
        if span % stride != 0 {
            return Err(ModelError::Configuration(format!(
                "{}: ({} - {} + 2*{}) is not divisible by stride {}",
                name, in_dim, filter_dim, padding, stride
            )));
        }
        Ok(span / stride + 1)
    }

    pub fn shape(&self) -> &ConvShape {
        &self.shape
    }

    pub fn input_height(&self) -> u32 {
        self.shape.input_height
    }

    pub fn input_width(&self) -> u32 {
        self.shape.input_width
    }

    pub fn input_channels(&self) -> u32 {
        self.shape.input_channels
    }

    pub fn filter_height(&self) -> u32 {
        self.shape.filter_height
    }

    pub fn filter_width(&self) -> u32 {
        self.shape.filter_width
    }

    pub fn num_filters(&self) -> u32 {
        self.shape.num_filters
    }

    pub fn stride(&self) -> u32 {
        self.shape.stride
    }

    pub fn padding(&self) -> u32 {
        self.shape.padding
    }

    pub fn output_height(&self) -> u32 {
        self.output_height
    }

    pub fn output_width(&self) -> u32 {
        self.output_width
    }

    /// `filter_height * filter_width * input_channels`; one TLAST per this
    /// many address records.
    pub fn macs_per_pixel(&self) -> u32 {
        self.macs_per_pixel
    }

    pub fn input_len(&self) -> u32 {
        self.shape.input_len()
    }

    pub fn weight_len(&self) -> u32 {
        self.shape.weight_len()
    }

    /// Total output elements, `output_height * output_width * num_filters`.
    pub fn output_len(&self) -> u32 {
        self.output_height * self.output_width * self.shape.num_filters
    }

    /// Number of output-channel batches of [`MAC_LANES`] filters each.
    pub fn oc_batches(&self) -> u32 {
        (self.shape.num_filters + MAC_LANES as u32 - 1) / MAC_LANES as u32
    }

    /// Expected total MAC count for the layer,
    /// `output_height * output_width * num_filters * macs_per_pixel`.
    pub fn total_macs(&self) -> u64 {
        u64::from(self.output_height)
            * u64::from(self.output_width)
            * u64::from(self.shape.num_filters)
            * u64::from(self.macs_per_pixel)
    }
}

// ============================================================================
// Quantization configuration
// ============================================================================

/// Immutable per-layer quantization descriptor.
///
/// `scale_factor` is an unsigned Q8.24 constant; `zero_point_in` is
/// subtracted from operands in the MAC stage and from the accumulator in the
/// dequantization stage, `zero_point_weight` from weight operands, and
/// `zero_point_out` is added after scaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantConfig {
    pub zero_point_in: i32,
    pub zero_point_weight: i32,
    pub zero_point_out: i32,
    /// Q8.24 fixed-point scale.
    pub scale_factor: u32,
    pub enable_relu: bool,
}

// ============================================================================
// Output storage configuration
// ============================================================================

/// Geometry of the output BRAM surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    pub output_height: u32,
    pub output_width: u32,
    pub output_channels: u32,
    /// Base word address of the output region.
    pub output_base_addr: u32,
    /// Fuse 2x2 max pooling into the store path.
    pub enable_pooling: bool,
}

impl OutputConfig {
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.output_height == 0 || self.output_width == 0 || self.output_channels == 0 {
            return Err(ModelError::Configuration(
                "output dimensions must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Total output elements.
    pub fn num_outputs(&self) -> u32 {
        self.output_height * self.output_width * self.output_channels
    }

    /// 32-bit words needed to hold `num_outputs` packed bytes.
    pub fn words_needed(&self) -> u32 {
        (self.num_outputs() + 3) / 4
    }

    /// The same surface at 2x2-pooled (floor-halved) resolution.
    pub fn pooled(&self) -> OutputConfig {
        OutputConfig {
            output_height: self.output_height / 2,
            output_width: self.output_width / 2,
            ..*self
        }
    }
}

// ============================================================================
// Streams and records
// ============================================================================

/// One MAC descriptor emitted by the index generator.
///
/// `tlast` is asserted on the final MAC of each output pixel; `oc_lane`
/// identifies which of the [`MAC_LANES`] parallel lanes produces the pixel.
/// The absolute output channel is `oc_batch * MAC_LANES + oc_lane`, with
/// `oc_batch` tracked by the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRecord {
    pub input_addr: u32,
    pub weight_addr: u32,
    pub tlast: bool,
    pub oc_lane: u8,
}

/// One beat of the output stream (models AXI-Stream `tdata`/`tid`/`tlast`).
///
/// `tdata` is the dequantized byte, `tid` the output-channel lane, and
/// `tlast` marks the last beat of an output pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamBeat {
    pub tdata: u8,
    pub tid: u8,
    pub tlast: bool,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn conv1_shape() -> ConvShape {
        ConvShape {
            input_height: 64,
            input_width: 64,
            input_channels: 3,
            filter_height: 3,
            filter_width: 3,
            num_filters: 64,
            stride: 1,
            padding: 1,
        }
    }

    #[test]
    fn conv1_derived_dims() {
        let config = ConvConfig::new(conv1_shape()).unwrap();
        assert_eq!(config.output_height(), 64);
        assert_eq!(config.output_width(), 64);
        assert_eq!(config.macs_per_pixel(), 27);
        assert_eq!(config.total_macs(), 7_077_888);
        assert_eq!(config.oc_batches(), 16);
        assert_eq!(config.input_len(), 64 * 64 * 3);
        assert_eq!(config.weight_len(), 64 * 3 * 3 * 3);
        assert_eq!(config.output_len(), 64 * 64 * 64);
    }

    #[test]
    fn unpadded_valid_convolution() {
        let config = ConvConfig::new(ConvShape {
            input_height: 64,
            input_width: 64,
            input_channels: 3,
            filter_height: 5,
            filter_width: 5,
            num_filters: 32,
            stride: 1,
            padding: 0,
        })
        .unwrap();
        assert_eq!(config.output_height(), 60);
        assert_eq!(config.output_width(), 60);
        assert_eq!(config.macs_per_pixel(), 75);
    }

    #[test]
    fn zero_dimension_rejected() {
        let mut shape = conv1_shape();
        shape.input_channels = 0;
        assert!(matches!(
            ConvConfig::new(shape),
            Err(ModelError::Configuration(_))
        ));

        let mut shape = conv1_shape();
        shape.num_filters = 0;
        assert!(ConvConfig::new(shape).is_err());

        let mut shape = conv1_shape();
        shape.stride = 0;
        assert!(ConvConfig::new(shape).is_err());
    }

    #[test]
    fn non_exact_division_rejected() {
        // (64 - 3 + 0) = 61 is not divisible by 2
        let shape = ConvShape {
            padding: 0,
            stride: 2,
            ..conv1_shape()
        };
        let err = ConvConfig::new(shape).unwrap_err();
        assert!(matches!(err, ModelError::Configuration(_)));
    }

    #[test]
    fn oversized_filter_rejected() {
        let shape = ConvShape {
            input_height: 4,
            input_width: 4,
            filter_height: 7,
            filter_width: 7,
            padding: 0,
            ..conv1_shape()
        };
        assert!(ConvConfig::new(shape).is_err());
    }

    #[test]
    fn partial_lane_batch() {
        let shape = ConvShape {
            num_filters: 6,
            ..conv1_shape()
        };
        let config = ConvConfig::new(shape).unwrap();
        assert_eq!(config.oc_batches(), 2);
    }

    #[test]
    fn q824_constants() {
        assert_eq!(Q824_ONE, 0x0100_0000);
        assert_eq!(Q824_HALF, 0x0080_0000);
        assert_eq!(q824_to_f64(Q824_ONE), 1.0);
        assert_eq!(q824_to_f64(Q824_HALF), 0.5);
    }

    #[test]
    fn output_config_words() {
        let config = OutputConfig {
            output_height: 8,
            output_width: 8,
            output_channels: 3,
            output_base_addr: 0x100,
            enable_pooling: false,
        };
        assert_eq!(config.num_outputs(), 192);
        assert_eq!(config.words_needed(), 48);

        let odd = OutputConfig {
            output_channels: 5,
            ..config
        };
        assert_eq!(odd.num_outputs(), 320);
        assert_eq!(odd.words_needed(), 80);
    }

    #[test]
    fn pooled_output_config_halves_dims() {
        let config = OutputConfig {
            output_height: 9,
            output_width: 8,
            output_channels: 16,
            output_base_addr: 0,
            enable_pooling: true,
        };
        let pooled = config.pooled();
        assert_eq!(pooled.output_height, 4);
        assert_eq!(pooled.output_width, 4);
        assert_eq!(pooled.output_channels, 16);
    }

    #[test]
    fn shape_serde_round_trip() {
        let shape = conv1_shape();
        let json = serde_json::to_string(&shape).unwrap();
        let back: ConvShape = serde_json::from_str(&json).unwrap();
        assert_eq!(shape, back);
    }
}
