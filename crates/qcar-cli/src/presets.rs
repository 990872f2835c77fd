//! Layer presets for the reference 64x64x3 classifier
//!
//! The six convolution layers of the network the accelerator was built
//! around (5x5 and 3x3 `valid` convolutions with 2x2 stride-2 max pools
//! between the pairs), plus the padded 3x3/64 layer used for address-stream
//! bring-up.

use qcar_core::{ConvConfig, ConvShape, OutputConfig, QuantConfig, Q824_HALF};

/// One named convolution layer.
#[derive(Debug, Clone, Copy)]
pub struct LayerPreset {
    pub name: &'static str,
    pub shape: ConvShape,
    /// A 2x2 max pool follows this layer in the reference network.
    pub pool_after: bool,
}

/// The reference network's convolution layers, in order.
pub const NETWORK: &[LayerPreset] = &[
    LayerPreset {
        name: "conv1",
        shape: ConvShape {
            input_height: 64,
            input_width: 64,
            input_channels: 3,
            filter_height: 5,
            filter_width: 5,
            num_filters: 32,
            stride: 1,
            padding: 0,
        },
        pool_after: false,
    },
    LayerPreset {
        name: "conv2",
        shape: ConvShape {
            input_height: 60,
            input_width: 60,
            input_channels: 32,
            filter_height: 5,
            filter_width: 5,
            num_filters: 32,
            stride: 1,
            padding: 0,
        },
        pool_after: true,
    },
    LayerPreset {
        name: "conv3",
        shape: ConvShape {
            input_height: 28,
            input_width: 28,
            input_channels: 32,
            filter_height: 3,
            filter_width: 3,
            num_filters: 64,
            stride: 1,
            padding: 0,
        },
        pool_after: false,
    },
    LayerPreset {
        name: "conv4",
        shape: ConvShape {
            input_height: 26,
            input_width: 26,
            input_channels: 64,
            filter_height: 3,
            filter_width: 3,
            num_filters: 64,
            stride: 1,
            padding: 0,
        },
        pool_after: true,
    },
    LayerPreset {
        name: "conv5",
        shape: ConvShape {
            input_height: 12,
            input_width: 12,
            input_channels: 64,
            filter_height: 3,
            filter_width: 3,
            num_filters: 64,
            stride: 1,
            padding: 0,
        },
        pool_after: false,
    },
    LayerPreset {
        name: "conv6",
        shape: ConvShape {
            input_height: 10,
            input_width: 10,
            input_channels: 64,
            filter_height: 3,
            filter_width: 3,
            num_filters: 128,
            stride: 1,
            padding: 0,
        },
        pool_after: true,
    },
];

/// The padded same-resolution layer used for address-stream bring-up:
/// 64x64x3 in, 64 3x3 filters, stride 1, padding 1.
pub const PAD3X3: LayerPreset = LayerPreset {
    name: "pad3x3",
    shape: ConvShape {
        input_height: 64,
        input_width: 64,
        input_channels: 3,
        filter_height: 3,
        filter_width: 3,
        num_filters: 64,
        stride: 1,
        padding: 1,
    },
    pool_after: false,
};

/// Look up a preset by name.
pub fn find(name: &str) -> Option<LayerPreset> {
    if name == PAD3X3.name {
        return Some(PAD3X3);
    }
    NETWORK.iter().copied().find(|preset| preset.name == name)
}

/// All preset names, for CLI error messages.
pub fn all_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = NETWORK.iter().map(|preset| preset.name).collect();
    names.push(PAD3X3.name);
    names
}

/// The quantization used by the driver demos: scale 0.5 in Q8.24, ReLU on,
/// all zero points at zero.
pub fn default_quant() -> QuantConfig {
    QuantConfig {
        zero_point_in: 0,
        zero_point_weight: 0,
        zero_point_out: 0,
        scale_factor: Q824_HALF,
        enable_relu: true,
    }
}

/// Conv-resolution output surface for a layer.
pub fn output_config(conv: &ConvConfig, enable_pooling: bool) -> OutputConfig {
    OutputConfig {
        output_height: conv.output_height(),
        output_width: conv.output_width(),
        output_channels: conv.num_filters(),
        output_base_addr: 0,
        enable_pooling,
    }
}
