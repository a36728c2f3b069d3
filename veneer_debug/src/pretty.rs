// Copyright 2026 the Veneer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr). Timestamps
//! are shown in microseconds since the client was created.

use std::io::Write;

use veneer_core::trace::{
    DebugModeEvent, InvalidUseEvent, SurfaceCreatedEvent, SurfaceReleasedEvent, TraceSink,
    TransactionAppliedEvent,
};

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrintSink<W: Write + Send = Box<dyn Write + Send>> {
    writer: W,
}

impl<W: Write + Send> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink").finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self {
            writer: Box::new(std::io::stderr()),
        }
    }

    /// Creates a sink that writes to a boxed writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self { writer }
    }
}

impl<W: Write + Send> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W) -> Self {
        Self { writer }
    }

    /// Consumes the sink and returns the writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

fn us(ns: u64) -> f64 {
    ns as f64 / 1000.0
}

impl<W: Write + Send> TraceSink for PrettyPrintSink<W> {
    fn on_surface_created(&mut self, e: &SurfaceCreatedEvent<'_>) {
        let _ = writeln!(
            self.writer,
            "[create] #{} `{}` {:?} layer={} kind={} origin={:?} callsite={} at {:.1}µs",
            e.serial,
            e.name,
            e.surface,
            e.layer_id,
            e.kind.as_str(),
            e.origin,
            e.callsite.unwrap_or("-"),
            us(e.timestamp_ns),
        );
    }

    fn on_surface_released(&mut self, e: &SurfaceReleasedEvent<'_>) {
        let recorded = if e.record_captured { " recorded" } else { "" };
        let destroyed = if e.destroyed { " destroyed" } else { "" };
        let _ = writeln!(
            self.writer,
            "[release] #{} `{}` {:?}{recorded}{destroyed} at {:.1}µs",
            e.serial,
            e.name,
            e.kind,
            us(e.timestamp_ns),
        );
    }

    fn on_invalid_use(&mut self, e: &InvalidUseEvent<'_>) {
        let cause = if e.cause_attached {
            "with cause"
        } else {
            "no cause"
        };
        let _ = writeln!(
            self.writer,
            "[INVALID] #{} `{}`: {} ({cause}) at {:.1}µs",
            e.serial,
            e.name,
            e.operation,
            us(e.timestamp_ns),
        );
    }

    fn on_transaction_applied(&mut self, e: &TransactionAppliedEvent) {
        let _ = writeln!(
            self.writer,
            "[apply] txn={} mutations={} surfaces={} at {:.1}µs",
            e.transaction,
            e.mutations,
            e.surfaces,
            us(e.timestamp_ns),
        );
    }

    fn on_debug_mode_changed(&mut self, e: &DebugModeEvent) {
        let state = if e.enabled { "on" } else { "off" };
        let _ = writeln!(
            self.writer,
            "[debug] usage-after-release tracking {state} at {:.1}µs",
            us(e.timestamp_ns),
        );
    }
}

#[cfg(test)]
mod tests {
    use veneer_core::Operation;

    use super::*;

    #[test]
    fn pretty_print_invalid_use() {
        let mut sink = PrettyPrintSink::with_writer(Vec::<u8>::new());
        sink.on_invalid_use(&InvalidUseEvent {
            timestamp_ns: 2_500,
            serial: 4,
            operation: Operation::WriteToParcel,
            cause_attached: true,
            name: "ime-window",
        });
        let output = String::from_utf8(sink.into_inner()).unwrap();
        assert!(output.starts_with("[INVALID] #4"), "got: {output}");
        assert!(output.contains("write to parcel"), "got: {output}");
        assert!(output.contains("with cause"), "got: {output}");
        assert!(output.contains("2.5µs"), "got: {output}");
    }

    #[test]
    fn pretty_print_debug_toggle() {
        let mut sink = PrettyPrintSink::with_writer(Vec::<u8>::new());
        sink.on_debug_mode_changed(&DebugModeEvent {
            timestamp_ns: 0,
            enabled: true,
        });
        let output = String::from_utf8(sink.into_inner()).unwrap();
        assert!(output.contains("tracking on"), "got: {output}");
    }
}
