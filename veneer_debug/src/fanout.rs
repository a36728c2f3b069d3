// Copyright 2026 the Veneer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Forwarding one event stream to several sinks.

use veneer_core::trace::{
    DebugModeEvent, InvalidUseEvent, SurfaceCreatedEvent, SurfaceReleasedEvent, TraceSink,
    TransactionAppliedEvent,
};

/// A [`TraceSink`] that forwards every event to each inner sink in order.
///
/// A client holds a single sink; install a `FanoutSink` to, say, print
/// events and record them at the same time.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Box<dyn TraceSink>>,
}

impl std::fmt::Debug for FanoutSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutSink")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl FanoutSink {
    /// Creates a sink with no outputs.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an output.
    #[must_use]
    pub fn with(mut self, sink: impl TraceSink + 'static) -> Self {
        self.push(sink);
        self
    }

    /// Adds an output.
    pub fn push(&mut self, sink: impl TraceSink + 'static) {
        self.sinks.push(Box::new(sink));
    }

    /// Number of outputs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Whether there are no outputs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl TraceSink for FanoutSink {
    fn on_surface_created(&mut self, e: &SurfaceCreatedEvent<'_>) {
        for sink in &mut self.sinks {
            sink.on_surface_created(e);
        }
    }

    fn on_surface_released(&mut self, e: &SurfaceReleasedEvent<'_>) {
        for sink in &mut self.sinks {
            sink.on_surface_released(e);
        }
    }

    fn on_invalid_use(&mut self, e: &InvalidUseEvent<'_>) {
        for sink in &mut self.sinks {
            sink.on_invalid_use(e);
        }
    }

    fn on_transaction_applied(&mut self, e: &TransactionAppliedEvent) {
        for sink in &mut self.sinks {
            sink.on_transaction_applied(e);
        }
    }

    fn on_debug_mode_changed(&mut self, e: &DebugModeEvent) {
        for sink in &mut self.sinks {
            sink.on_debug_mode_changed(e);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::recorder::{RecorderSink, decode};

    #[test]
    fn every_output_sees_every_event() {
        let a = Arc::new(Mutex::new(RecorderSink::new()));
        let b = Arc::new(Mutex::new(RecorderSink::new()));
        let mut fanout = FanoutSink::new().with(Arc::clone(&a)).with(Arc::clone(&b));
        assert_eq!(fanout.len(), 2);

        fanout.on_transaction_applied(&TransactionAppliedEvent {
            timestamp_ns: 10,
            transaction: 1,
            mutations: 2,
            surfaces: 2,
        });
        fanout.on_debug_mode_changed(&DebugModeEvent {
            timestamp_ns: 11,
            enabled: true,
        });

        assert_eq!(decode(a.lock().as_bytes()).count(), 2);
        assert_eq!(a.lock().as_bytes(), b.lock().as_bytes());
    }

    #[test]
    fn empty_fanout_discards() {
        let mut fanout = FanoutSink::new();
        assert!(fanout.is_empty());
        fanout.on_debug_mode_changed(&DebugModeEvent {
            timestamp_ns: 0,
            enabled: false,
        });
    }
}
