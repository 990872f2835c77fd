//! External-interface plumbing for the QCAR reference model
//!
//! The bit-accurate core works on byte RAM images; everything that crosses
//! the process boundary lives here instead:
//!
//! - [`blob`]: little-endian `float32` tensor files (weights, biases,
//!   activations, regenerated layer outputs), kernel layout conversions,
//!   and the affine quantization helper that turns float tensors into RAM
//!   images.
//! - [`datagen`]: synthetic RAM images — the classic modular ramps plus
//!   seeded random bytes for fuzz-style runs.

pub mod blob;
pub mod datagen;

pub use blob::{
    layer_output_regen_filename, quantize_f32, read_f32_tensor, read_f32_tensor_expect,
    repack_conv_kernel, transpose_dense_kernel, write_f32_tensor, BlobError,
};
pub use datagen::{ramp_activations, ramp_weights, seeded_bytes};
