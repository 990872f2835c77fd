//! Error taxonomy and structured verification reports
//!
//! Construction-time problems abort the layer with [`ModelError`]; the
//! `verify` operations instead aggregate every mismatch into a
//! [`VerifyReport`] so a single run reports all defects, each renderable as
//! a one-line diagnostic naming the component, the index, and expected vs.
//! actual values.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Which simulated memory region an address belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MemRegion {
    Input,
    Weight,
    Output,
}

impl fmt::Display for MemRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemRegion::Input => write!(f, "input"),
            MemRegion::Weight => write!(f, "weight"),
            MemRegion::Output => write!(f, "output"),
        }
    }
}

/// Errors raised by the reference model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// Invalid layer descriptor; raised at construction, aborts the layer.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An emitted address fell outside its declared base+size window.
    /// Signals an index-generator bug, not bad input data.
    #[error(
        "{region} address 0x{addr:06x} out of bounds at record {index} \
         (valid range 0x{base:06x}..0x{limit:06x})"
    )]
    AddressOutOfBounds {
        region: MemRegion,
        index: usize,
        addr: u32,
        base: u32,
        limit: u32,
    },

    /// Total MAC count or TLAST placement does not match the expected formula.
    #[error("sequence invariant violated: {what} at index {index} (expected {expected}, got {actual})")]
    SequenceInvariant {
        what: String,
        index: usize,
        expected: String,
        actual: String,
    },

    /// `store_output` called with coordinates beyond the declared output dims.
    /// Fails the call without corrupting storage state.
    #[error("output coordinate ({y}, {x}, {c}) outside {height}x{width}x{channels}")]
    CoordinateOutOfBounds {
        y: u32,
        x: u32,
        c: u32,
        height: u32,
        width: u32,
        channels: u32,
    },
}

/// One verification mismatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyFailure {
    pub component: &'static str,
    pub index: usize,
    pub expected: String,
    pub actual: String,
}

impl fmt::Display for VerifyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: index {}: expected {}, actual {}",
            self.component, self.index, self.expected, self.actual
        )
    }
}

/// Aggregated result of a `verify` pass.
///
/// At most [`VerifyReport::MAX_RECORDED`] failures are kept verbatim;
/// `failure_count` always carries the true total so a fully corrupted
/// multi-million-record stream cannot balloon the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub component: &'static str,
    pub total_records: usize,
    pub failure_count: usize,
    pub failures: Vec<VerifyFailure>,
}

impl VerifyReport {
    pub const MAX_RECORDED: usize = 64;

    pub fn new(component: &'static str, total_records: usize) -> Self {
        Self {
            component,
            total_records,
            failure_count: 0,
            failures: Vec::new(),
        }
    }

    pub fn push(&mut self, index: usize, expected: impl Into<String>, actual: impl Into<String>) {
        self.failure_count += 1;
        if self.failures.len() < Self::MAX_RECORDED {
            self.failures.push(VerifyFailure {
                component: self.component,
                index,
                expected: expected.into(),
                actual: actual.into(),
            });
        }
    }

    pub fn passed(&self) -> bool {
        self.failure_count == 0
    }
}

impl fmt::Display for VerifyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.passed() {
            write!(
                f,
                "{} verification PASSED ({} records)",
                self.component, self.total_records
            )
        } else {
            writeln!(
                f,
                "{} verification FAILED ({} of {} records)",
                self.component, self.failure_count, self.total_records
            )?;
            for failure in &self.failures {
                writeln!(f, "  {}", failure)?;
            }
            if self.failure_count > self.failures.len() {
                write!(f, "  ... {} more", self.failure_count - self.failures.len())?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_passes_when_empty() {
        let report = VerifyReport::new("index_generator", 100);
        assert!(report.passed());
        assert_eq!(
            report.to_string(),
            "index_generator verification PASSED (100 records)"
        );
    }

    #[test]
    fn report_records_failures() {
        let mut report = VerifyReport::new("output_storage", 10);
        report.push(3, "0x10", "0x20");
        assert!(!report.passed());
        assert_eq!(report.failure_count, 1);
        assert!(report.to_string().contains("index 3"));
        assert!(report.to_string().contains("expected 0x10, actual 0x20"));
    }

    #[test]
    fn report_caps_recorded_failures() {
        let mut report = VerifyReport::new("index_generator", 1000);
        for i in 0..200 {
            report.push(i, "t", "f");
        }
        assert_eq!(report.failure_count, 200);
        assert_eq!(report.failures.len(), VerifyReport::MAX_RECORDED);
        assert!(report.to_string().contains("... 136 more"));
    }

    #[test]
    fn error_display_is_one_line() {
        let err = ModelError::AddressOutOfBounds {
            region: MemRegion::Weight,
            index: 42,
            addr: 0x2000,
            base: 0,
            limit: 0x1b00,
        };
        let line = err.to_string();
        assert!(!line.contains('\n'));
        assert!(line.contains("weight address 0x002000"));
        assert!(line.contains("record 42"));
    }
}
