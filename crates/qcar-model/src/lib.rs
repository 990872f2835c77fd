//! Bit-accurate pipeline components of the QCAR accelerator reference model
//!
//! This crate implements the four subsystems of the accelerator and the
//! coordinator that wires them together for one layer invocation:
//!
//! - [`index_gen`]: tiled address-stream generation
//! - [`mac`]: the 4-lane staged multiply-accumulate cluster
//! - [`dequant`]: Q8.24 fixed-point dequantization to saturated int8
//! - [`storage`]: byte-level RMW packing into 32-bit BRAM words, with the
//!   2x2 max-pooling primitive
//! - [`pipeline`]: the cycle-driven coordinator
//! - [`trace`]: golden-trace event sinks
//!
//! Everything is single-threaded and deterministic: given one configuration
//! the address stream, the accumulator sequence, and the packed output words
//! are reproducible byte for byte across runs and platforms. The model
//! exists to produce golden traces a hardware implementation is verified
//! against, so exactness beats speed everywhere the two conflict.

pub mod dequant;
pub mod index_gen;
pub mod mac;
pub mod pipeline;
pub mod storage;
pub mod trace;

// Re-export common types
pub use dequant::{saturate_i8, DequantTrace, Dequantizer};
pub use index_gen::{IndexGenerator, LaneTaps, PixelBlock, Tap, DEFAULT_TILE_SIZE};
pub use mac::{ClusterOutput, MacCluster, MacLane, MacStage};
pub use pipeline::{AcceleratorModel, LayerSummary};
pub use storage::{extract_byte, insert_byte, OutputStorage, StoreRecord};
pub use trace::{NullSink, TraceEvent, TraceSink, VecSink, WriterSink};
