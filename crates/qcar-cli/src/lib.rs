//! Shared driver pieces for the QCAR binaries
//!
//! The binaries themselves live in this crate's `[[bin]]` targets; the lib
//! only carries what they share, chiefly the reference-network layer
//! presets.

pub mod presets;
