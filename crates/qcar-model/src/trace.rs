//! Golden-trace sink
//!
//! The pipeline narrates itself as a stream of [`TraceEvent`]s with a fixed
//! line rendering, so a hardware testbench can diff its waveform log against
//! the model cycle by cycle. The sink is an instance passed into the
//! coordinator, never a global: collect events with [`VecSink`], stream them
//! to a file with [`WriterSink`], or discard them with [`NullSink`].

use std::fmt;
use std::io::Write;

use serde::Serialize;

/// One pipeline event on the shared logical clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TraceEvent {
    Mac {
        cycle: u64,
        lane: u8,
        input: u8,
        weight: u8,
        accumulator: i64,
    },
    Dequant {
        cycle: u64,
        accumulator: i64,
        scale_factor: u32,
        output: u8,
    },
    Store {
        cycle: u64,
        word_addr: u32,
        byte_sel: u32,
        value: u8,
    },
    PixelComplete {
        cycle: u64,
        out_y: u32,
        out_x: u32,
        oc_batch: u32,
    },
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            TraceEvent::Mac {
                cycle,
                lane,
                input,
                weight,
                accumulator,
            } => write!(
                f,
                "[CYCLE {:06}] MAC#{} input=0x{:02x} weight=0x{:02x} -> accum=0x{:016x}",
                cycle, lane, input, weight, accumulator as u64
            ),
            TraceEvent::Dequant {
                cycle,
                accumulator,
                scale_factor,
                output,
            } => write!(
                f,
                "[CYCLE {:06}] DEQUANT input=0x{:016x} scale=0x{:08x} -> output=0x{:02x}",
                cycle, accumulator as u64, scale_factor, output
            ),
            TraceEvent::Store {
                cycle,
                word_addr,
                byte_sel,
                value,
            } => write!(
                f,
                "[CYCLE {:06}] STORE addr=0x{:06x} byte[{}]=0x{:02x}",
                cycle, word_addr, byte_sel, value
            ),
            TraceEvent::PixelComplete {
                cycle,
                out_y,
                out_x,
                oc_batch,
            } => write!(
                f,
                "[CYCLE {:06}] PIXEL_COMPLETE y={:3} x={:3} batch={:2}",
                cycle, out_y, out_x, oc_batch
            ),
        }
    }
}

/// Receives pipeline events in emission order.
pub trait TraceSink {
    fn record(&mut self, event: TraceEvent);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl TraceSink for NullSink {
    fn record(&mut self, _event: TraceEvent) {}
}

/// Collects events in memory.
#[derive(Debug, Default, Clone)]
pub struct VecSink {
    events: Vec<TraceEvent>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<TraceEvent> {
        self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl TraceSink for VecSink {
    fn record(&mut self, event: TraceEvent) {
        self.events.push(event);
    }
}

/// Writes one rendered line per event. Write errors are remembered rather
/// than interrupting the simulation; check [`WriterSink::io_error`] after
/// the run.
#[derive(Debug)]
pub struct WriterSink<W: Write> {
    writer: W,
    io_error: Option<std::io::Error>,
}

impl<W: Write> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            io_error: None,
        }
    }

    pub fn io_error(&self) -> Option<&std::io::Error> {
        self.io_error.as_ref()
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> TraceSink for WriterSink<W> {
    fn record(&mut self, event: TraceEvent) {
        if self.io_error.is_some() {
            return;
        }
        if let Err(err) = writeln!(self.writer, "{}", event) {
            self.io_error = Some(err);
        }
    }
}
