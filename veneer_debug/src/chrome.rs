// Copyright 2026 the Veneer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chrome Trace Event Format exporter.
//!
//! [`export`] reads recorded bytes from a [`RecorderSink`](super::recorder::RecorderSink)
//! and writes [Chrome Trace Event Format][spec] JSON to the given writer.
//!
//! Each handle becomes an async span (`"b"`/`"e"`) keyed by its serial, so
//! the viewer shows one bar per handle from creation to release. Invalid
//! uses, transactions and debug-mode changes are instant events. A handle
//! still open at the end of the recording has no end event; viewers draw
//! it to the end of the trace, which makes leaks easy to spot.
//!
//! [spec]: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU

use std::io::{self, Write};

use serde_json::{Value, json};

use crate::recorder::{RecordedEvent, decode};

/// Exports recorded events as Chrome Trace Event Format JSON.
///
/// The output is a complete JSON array of trace event objects, suitable for
/// loading into `chrome://tracing` or [Perfetto](https://ui.perfetto.dev/).
pub fn export(bytes: &[u8], writer: &mut dyn Write) -> io::Result<()> {
    let mut events: Vec<Value> = Vec::new();

    for recorded in decode(bytes) {
        let ts = ns_to_us(recorded.timestamp_ns());
        match recorded {
            RecordedEvent::SurfaceCreated(e) => {
                events.push(json!({
                    "ph": "b",
                    "name": e.name,
                    "cat": "Surface",
                    "id": e.serial,
                    "ts": ts,
                    "pid": 0,
                    "tid": 0,
                    "args": {
                        "surface": format!("{:?}", e.surface),
                        "layer_id": e.layer_id,
                        "kind": e.kind.as_str(),
                        "origin": format!("{:?}", e.origin),
                        "callsite": e.callsite,
                    }
                }));
            }
            RecordedEvent::SurfaceReleased(e) => {
                events.push(json!({
                    "ph": "e",
                    "name": e.name,
                    "cat": "Surface",
                    "id": e.serial,
                    "ts": ts,
                    "pid": 0,
                    "tid": 0,
                    "args": {
                        "kind": format!("{:?}", e.kind),
                        "record_captured": e.record_captured,
                        "destroyed": e.destroyed,
                    }
                }));
            }
            RecordedEvent::InvalidUse(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": "InvalidUse",
                    "cat": "Error",
                    "ts": ts,
                    "pid": 0,
                    "tid": 0,
                    "s": "g",
                    "args": {
                        "surface": e.name,
                        "serial": e.serial,
                        "operation": e.operation.as_str(),
                        "cause_attached": e.cause_attached,
                    }
                }));
            }
            RecordedEvent::TransactionApplied(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": "Apply",
                    "cat": "Transaction",
                    "ts": ts,
                    "pid": 0,
                    "tid": 0,
                    "s": "t",
                    "args": {
                        "transaction": e.transaction,
                        "mutations": e.mutations,
                        "surfaces": e.surfaces,
                    }
                }));
            }
            RecordedEvent::DebugModeChanged(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": "DebugUsageAfterRelease",
                    "cat": "Client",
                    "ts": ts,
                    "pid": 0,
                    "tid": 0,
                    "s": "g",
                    "args": {
                        "enabled": e.enabled,
                    }
                }));
            }
        }
    }

    serde_json::to_writer_pretty(writer, &events)?;
    Ok(())
}

fn ns_to_us(ns: u64) -> f64 {
    ns as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use veneer_core::trace::{
        DebugModeEvent, HandleOrigin, InvalidUseEvent, ReleaseKind, SurfaceCreatedEvent,
        SurfaceReleasedEvent, TraceSink,
    };
    use veneer_core::{Operation, SurfaceId, SurfaceKind};

    use super::*;
    use crate::recorder::RecorderSink;

    fn created(rec: &mut RecorderSink, serial: u64, ts: u64, name: &str) {
        rec.on_surface_created(&SurfaceCreatedEvent {
            timestamp_ns: ts,
            serial,
            surface: SurfaceId::from_raw(0, u32::try_from(serial).unwrap()),
            layer_id: 1,
            kind: SurfaceKind::Container,
            origin: HandleOrigin::Built,
            name,
            callsite: Some("chrome::tests"),
        });
    }

    #[test]
    fn export_produces_valid_json() {
        let mut rec = RecorderSink::new();
        created(&mut rec, 1, 1_000, "status-bar");
        rec.on_surface_released(&SurfaceReleasedEvent {
            timestamp_ns: 5_000,
            serial: 1,
            surface: SurfaceId::from_raw(0, 1),
            kind: ReleaseKind::Explicit,
            record_captured: true,
            destroyed: true,
            name: "status-bar",
        });
        rec.on_invalid_use(&InvalidUseEvent {
            timestamp_ns: 6_000,
            serial: 1,
            operation: Operation::SetAlpha,
            cause_attached: true,
            name: "status-bar",
        });
        rec.on_debug_mode_changed(&DebugModeEvent {
            timestamp_ns: 7_000,
            enabled: false,
        });

        let mut out = Vec::new();
        export(rec.as_bytes(), &mut out).unwrap();
        let json_str = String::from_utf8(out).unwrap();

        // Should parse as a JSON array.
        let parsed: Vec<Value> = serde_json::from_str(&json_str).unwrap();
        assert_eq!(parsed.len(), 4);

        // The handle lifetime is one async span.
        assert_eq!(parsed[0]["ph"], "b");
        assert_eq!(parsed[1]["ph"], "e");
        assert_eq!(parsed[0]["id"], parsed[1]["id"]);
        assert_eq!(parsed[0]["name"], "status-bar");
        assert_eq!(parsed[0]["ts"], 1.0);
        assert_eq!(parsed[0]["args"]["callsite"], "chrome::tests");

        assert_eq!(parsed[2]["name"], "InvalidUse");
        assert_eq!(parsed[2]["args"]["operation"], "set alpha of");
        assert_eq!(parsed[3]["args"]["enabled"], false);
    }

    #[test]
    fn unreleased_handle_has_no_end_event() {
        let mut rec = RecorderSink::new();
        created(&mut rec, 1, 0, "leaked");
        let mut out = Vec::new();
        export(rec.as_bytes(), &mut out).unwrap();
        let parsed: Vec<Value> = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0]["ph"], "b");
    }

    #[test]
    fn export_empty_recording() {
        let mut out = Vec::new();
        export(&[], &mut out).unwrap();
        let json_str = String::from_utf8(out).unwrap();
        let parsed: Vec<Value> = serde_json::from_str(&json_str).unwrap();
        assert!(parsed.is_empty());
    }
}
