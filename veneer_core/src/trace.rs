// Copyright 2026 the Veneer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Event instrumentation for surface lifecycles.
//!
//! A [`Client`](crate::Client) reports every handle creation, release,
//! invalid use, transaction apply and debug-mode change to its installed
//! [`TraceSink`]. All methods default to no-ops, so a sink implements only
//! the events it cares about. Sinks for recording, pretty-printing and
//! Chrome trace export live in `veneer_debug`.
//!
//! Timestamps are nanoseconds since the client was created.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Operation;
use crate::scene::{SurfaceId, SurfaceKind};

/// How a handle came to exist.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HandleOrigin {
    /// Built with a [`SurfaceBuilder`](crate::SurfaceBuilder).
    Built,
    /// Read back from a [`Parcel`](crate::Parcel).
    Unparcelled,
}

/// How a handle was released.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReleaseKind {
    /// By an explicit `release()` call.
    Explicit,
    /// By dropping a live handle.
    Dropped,
}

/// Emitted when a handle is created.
#[derive(Clone, Copy, Debug)]
pub struct SurfaceCreatedEvent<'a> {
    /// Nanoseconds since the client was created.
    pub timestamp_ns: u64,
    /// Per-client handle serial.
    pub serial: u64,
    /// Compositor id of the surface.
    pub surface: SurfaceId,
    /// Compositor layer id.
    pub layer_id: u32,
    /// What the surface is for.
    pub kind: SurfaceKind,
    /// How the handle came to exist.
    pub origin: HandleOrigin,
    /// Debug name.
    pub name: &'a str,
    /// Callsite tag, if any.
    pub callsite: Option<&'a str>,
}

/// Emitted when a handle is released.
#[derive(Clone, Copy, Debug)]
pub struct SurfaceReleasedEvent<'a> {
    /// Nanoseconds since the client was created.
    pub timestamp_ns: u64,
    /// Per-client handle serial.
    pub serial: u64,
    /// Compositor id of the surface.
    pub surface: SurfaceId,
    /// How the handle was released.
    pub kind: ReleaseKind,
    /// Whether a release record was captured.
    pub record_captured: bool,
    /// Whether this was the last reference and the surface was destroyed.
    pub destroyed: bool,
    /// Debug name.
    pub name: &'a str,
}

/// Emitted when a released handle is used.
#[derive(Clone, Copy, Debug)]
pub struct InvalidUseEvent<'a> {
    /// Nanoseconds since the client was created.
    pub timestamp_ns: u64,
    /// Per-client handle serial.
    pub serial: u64,
    /// What was attempted.
    pub operation: Operation,
    /// Whether the error carries a release record.
    pub cause_attached: bool,
    /// Debug name.
    pub name: &'a str,
}

/// Emitted after a transaction is applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransactionAppliedEvent {
    /// Nanoseconds since the client was created.
    pub timestamp_ns: u64,
    /// Per-client transaction id.
    pub transaction: u64,
    /// Number of mutations applied.
    pub mutations: u32,
    /// Number of distinct surfaces touched.
    pub surfaces: u32,
}

/// Emitted when debug-usage-after-release mode changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DebugModeEvent {
    /// Nanoseconds since the client was created.
    pub timestamp_ns: u64,
    /// New state.
    pub enabled: bool,
}

/// Receives surface lifecycle events.
pub trait TraceSink: Send {
    /// Called when a handle is created.
    fn on_surface_created(&mut self, e: &SurfaceCreatedEvent<'_>) {
        _ = e;
    }

    /// Called when a handle is released.
    fn on_surface_released(&mut self, e: &SurfaceReleasedEvent<'_>) {
        _ = e;
    }

    /// Called when a released handle is used.
    fn on_invalid_use(&mut self, e: &InvalidUseEvent<'_>) {
        _ = e;
    }

    /// Called after a transaction is applied.
    fn on_transaction_applied(&mut self, e: &TransactionAppliedEvent) {
        _ = e;
    }

    /// Called when debug-usage-after-release mode changes.
    fn on_debug_mode_changed(&mut self, e: &DebugModeEvent) {
        _ = e;
    }
}

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

/// Lets a caller keep a handle on a sink after installing it.
impl<S: TraceSink> TraceSink for Arc<Mutex<S>> {
    fn on_surface_created(&mut self, e: &SurfaceCreatedEvent<'_>) {
        self.lock().on_surface_created(e);
    }

    fn on_surface_released(&mut self, e: &SurfaceReleasedEvent<'_>) {
        self.lock().on_surface_released(e);
    }

    fn on_invalid_use(&mut self, e: &InvalidUseEvent<'_>) {
        self.lock().on_invalid_use(e);
    }

    fn on_transaction_applied(&mut self, e: &TransactionAppliedEvent) {
        self.lock().on_transaction_applied(e);
    }

    fn on_debug_mode_changed(&mut self, e: &DebugModeEvent) {
        self.lock().on_debug_mode_changed(e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counting {
        applied: u32,
        modes: Vec<bool>,
    }

    impl TraceSink for Counting {
        fn on_transaction_applied(&mut self, e: &TransactionAppliedEvent) {
            self.applied += e.mutations;
        }

        fn on_debug_mode_changed(&mut self, e: &DebugModeEvent) {
            self.modes.push(e.enabled);
        }
    }

    #[test]
    fn noop_sink_accepts_everything() {
        let mut sink = NoopSink;
        sink.on_transaction_applied(&TransactionAppliedEvent {
            timestamp_ns: 0,
            transaction: 1,
            mutations: 2,
            surfaces: 1,
        });
        sink.on_debug_mode_changed(&DebugModeEvent {
            timestamp_ns: 0,
            enabled: true,
        });
    }

    #[test]
    fn shared_sink_forwards_to_inner() {
        let shared = Arc::new(Mutex::new(Counting::default()));
        let mut installed: Box<dyn TraceSink> = Box::new(Arc::clone(&shared));
        installed.on_transaction_applied(&TransactionAppliedEvent {
            timestamp_ns: 5,
            transaction: 1,
            mutations: 3,
            surfaces: 2,
        });
        installed.on_debug_mode_changed(&DebugModeEvent {
            timestamp_ns: 6,
            enabled: true,
        });
        drop(installed);

        let inner = shared.lock();
        assert_eq!(inner.applied, 3);
        assert_eq!(inner.modes, vec![true]);
    }
}
