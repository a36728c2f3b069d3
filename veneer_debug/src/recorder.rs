// Copyright 2026 the Veneer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compact binary event recording and decoding.
//!
//! [`RecorderSink`] implements [`TraceSink`] and encodes events into a
//! `Vec<u8>` as little-endian records. Names are stored as a `u32` length
//! followed by UTF-8 bytes. [`decode`] reads them back as an iterator of
//! [`RecordedEvent`], stopping at the first truncated or unknown record.

use veneer_core::Operation;
use veneer_core::scene::{SurfaceId, SurfaceKind};
use veneer_core::trace::{
    DebugModeEvent, HandleOrigin, InvalidUseEvent, ReleaseKind, SurfaceCreatedEvent,
    SurfaceReleasedEvent, TraceSink, TransactionAppliedEvent,
};

// ---------------------------------------------------------------------------
// Event type discriminants
// ---------------------------------------------------------------------------

const TAG_SURFACE_CREATED: u8 = 1;
const TAG_SURFACE_RELEASED: u8 = 2;
const TAG_INVALID_USE: u8 = 3;
const TAG_TRANSACTION_APPLIED: u8 = 4;
const TAG_DEBUG_MODE: u8 = 5;

// ---------------------------------------------------------------------------
// RecorderSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that encodes events into a compact binary buffer.
#[derive(Debug, Default)]
pub struct RecorderSink {
    buf: Vec<u8>,
}

impl RecorderSink {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a view of the recorded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the recorder and returns the recorded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    // -- encoding helpers --------------------------------------------------

    fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_bool(&mut self, v: bool) {
        self.write_u8(u8::from(v));
    }

    /// Writes a length-prefixed string, cut at `u32::MAX` bytes.
    fn write_str(&mut self, s: &str) {
        let len = u32::try_from(s.len()).unwrap_or(u32::MAX);
        self.write_u32(len);
        self.buf.extend_from_slice(&s.as_bytes()[..len as usize]);
    }

    fn write_option_str(&mut self, s: Option<&str>) {
        match s {
            Some(s) => {
                self.write_u8(1);
                self.write_str(s);
            }
            None => self.write_u8(0),
        }
    }

    fn write_surface(&mut self, id: SurfaceId) {
        self.write_u32(id.index());
        self.write_u32(id.generation());
    }

    fn write_kind(&mut self, kind: SurfaceKind) {
        self.write_u8(match kind {
            SurfaceKind::Buffer => 0,
            SurfaceKind::Container => 1,
            SurfaceKind::Effect => 2,
        });
    }

    fn write_operation(&mut self, op: Operation) {
        self.write_u8(match op {
            Operation::SetVisibility => 0,
            Operation::SetPosition => 1,
            Operation::SetMatrix => 2,
            Operation::SetCrop => 3,
            Operation::SetAlpha => 4,
            Operation::SetLayer => 5,
            Operation::SetBufferSize => 6,
            Operation::Reparent => 7,
            Operation::SetParent => 8,
            Operation::WriteToParcel => 9,
            Operation::QueryTransformHint => 10,
            Operation::QueryId => 11,
        });
    }
}

impl TraceSink for RecorderSink {
    fn on_surface_created(&mut self, e: &SurfaceCreatedEvent<'_>) {
        self.write_u8(TAG_SURFACE_CREATED);
        self.write_u64(e.timestamp_ns);
        self.write_u64(e.serial);
        self.write_surface(e.surface);
        self.write_u32(e.layer_id);
        self.write_kind(e.kind);
        self.write_bool(e.origin == HandleOrigin::Unparcelled);
        self.write_str(e.name);
        self.write_option_str(e.callsite);
    }

    fn on_surface_released(&mut self, e: &SurfaceReleasedEvent<'_>) {
        self.write_u8(TAG_SURFACE_RELEASED);
        self.write_u64(e.timestamp_ns);
        self.write_u64(e.serial);
        self.write_surface(e.surface);
        self.write_bool(e.kind == ReleaseKind::Dropped);
        self.write_bool(e.record_captured);
        self.write_bool(e.destroyed);
        self.write_str(e.name);
    }

    fn on_invalid_use(&mut self, e: &InvalidUseEvent<'_>) {
        self.write_u8(TAG_INVALID_USE);
        self.write_u64(e.timestamp_ns);
        self.write_u64(e.serial);
        self.write_operation(e.operation);
        self.write_bool(e.cause_attached);
        self.write_str(e.name);
    }

    fn on_transaction_applied(&mut self, e: &TransactionAppliedEvent) {
        self.write_u8(TAG_TRANSACTION_APPLIED);
        self.write_u64(e.timestamp_ns);
        self.write_u64(e.transaction);
        self.write_u32(e.mutations);
        self.write_u32(e.surfaces);
    }

    fn on_debug_mode_changed(&mut self, e: &DebugModeEvent) {
        self.write_u8(TAG_DEBUG_MODE);
        self.write_u64(e.timestamp_ns);
        self.write_bool(e.enabled);
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// A decoded handle creation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedCreate {
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
    pub name: String,
    /// Callsite tag, if any.
    pub callsite: Option<String>,
}

/// A decoded handle release.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedRelease {
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
    /// Whether the surface was destroyed.
    pub destroyed: bool,
    /// Debug name.
    pub name: String,
}

/// A decoded use of a released handle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedInvalidUse {
    /// Nanoseconds since the client was created.
    pub timestamp_ns: u64,
    /// Per-client handle serial.
    pub serial: u64,
    /// What was attempted.
    pub operation: Operation,
    /// Whether the error carried a release record.
    pub cause_attached: bool,
    /// Debug name.
    pub name: String,
}

/// A decoded event from a binary recording.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordedEvent {
    /// A [`SurfaceCreatedEvent`].
    SurfaceCreated(RecordedCreate),
    /// A [`SurfaceReleasedEvent`].
    SurfaceReleased(RecordedRelease),
    /// An [`InvalidUseEvent`].
    InvalidUse(RecordedInvalidUse),
    /// A [`TransactionAppliedEvent`].
    TransactionApplied(TransactionAppliedEvent),
    /// A [`DebugModeEvent`].
    DebugModeChanged(DebugModeEvent),
}

impl RecordedEvent {
    /// Timestamp of the event in nanoseconds since the client was created.
    #[must_use]
    pub fn timestamp_ns(&self) -> u64 {
        match self {
            Self::SurfaceCreated(e) => e.timestamp_ns,
            Self::SurfaceReleased(e) => e.timestamp_ns,
            Self::InvalidUse(e) => e.timestamp_ns,
            Self::TransactionApplied(e) => e.timestamp_ns,
            Self::DebugModeChanged(e) => e.timestamp_ns,
        }
    }
}

/// Decodes a byte slice produced by [`RecorderSink`] into an iterator of
/// [`RecordedEvent`].
pub fn decode(bytes: &[u8]) -> DecodeIter<'_> {
    DecodeIter {
        data: bytes,
        pos: 0,
    }
}

/// Iterator over decoded events.
#[derive(Debug)]
pub struct DecodeIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl DecodeIter<'_> {
    fn take(&mut self, n: usize) -> Option<&[u8]> {
        if self.data.len() - self.pos < n {
            return None;
        }
        let start = self.pos;
        self.pos += n;
        Some(&self.data[start..self.pos])
    }

    fn read_u8(&mut self) -> Option<u8> {
        Some(self.take(1)?[0])
    }

    fn read_u32(&mut self) -> Option<u32> {
        Some(u32::from_le_bytes(self.take(4)?.try_into().ok()?))
    }

    fn read_u64(&mut self) -> Option<u64> {
        Some(u64::from_le_bytes(self.take(8)?.try_into().ok()?))
    }

    fn read_bool(&mut self) -> Option<bool> {
        Some(self.read_u8()? != 0)
    }

    fn read_string(&mut self) -> Option<String> {
        let len = self.read_u32()? as usize;
        String::from_utf8(self.take(len)?.to_vec()).ok()
    }

    fn read_option_string(&mut self) -> Option<Option<String>> {
        match self.read_u8()? {
            0 => Some(None),
            _ => self.read_string().map(Some),
        }
    }

    fn read_surface(&mut self) -> Option<SurfaceId> {
        Some(SurfaceId::from_raw(self.read_u32()?, self.read_u32()?))
    }

    fn read_kind(&mut self) -> Option<SurfaceKind> {
        Some(match self.read_u8()? {
            0 => SurfaceKind::Buffer,
            1 => SurfaceKind::Container,
            2 => SurfaceKind::Effect,
            _ => return None,
        })
    }

    fn read_operation(&mut self) -> Option<Operation> {
        Some(match self.read_u8()? {
            0 => Operation::SetVisibility,
            1 => Operation::SetPosition,
            2 => Operation::SetMatrix,
            3 => Operation::SetCrop,
            4 => Operation::SetAlpha,
            5 => Operation::SetLayer,
            6 => Operation::SetBufferSize,
            7 => Operation::Reparent,
            8 => Operation::SetParent,
            9 => Operation::WriteToParcel,
            10 => Operation::QueryTransformHint,
            11 => Operation::QueryId,
            _ => return None,
        })
    }

    fn decode_created(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::SurfaceCreated(RecordedCreate {
            timestamp_ns: self.read_u64()?,
            serial: self.read_u64()?,
            surface: self.read_surface()?,
            layer_id: self.read_u32()?,
            kind: self.read_kind()?,
            origin: if self.read_bool()? {
                HandleOrigin::Unparcelled
            } else {
                HandleOrigin::Built
            },
            name: self.read_string()?,
            callsite: self.read_option_string()?,
        }))
    }

    fn decode_released(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::SurfaceReleased(RecordedRelease {
            timestamp_ns: self.read_u64()?,
            serial: self.read_u64()?,
            surface: self.read_surface()?,
            kind: if self.read_bool()? {
                ReleaseKind::Dropped
            } else {
                ReleaseKind::Explicit
            },
            record_captured: self.read_bool()?,
            destroyed: self.read_bool()?,
            name: self.read_string()?,
        }))
    }

    fn decode_invalid_use(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::InvalidUse(RecordedInvalidUse {
            timestamp_ns: self.read_u64()?,
            serial: self.read_u64()?,
            operation: self.read_operation()?,
            cause_attached: self.read_bool()?,
            name: self.read_string()?,
        }))
    }

    fn decode_transaction(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::TransactionApplied(TransactionAppliedEvent {
            timestamp_ns: self.read_u64()?,
            transaction: self.read_u64()?,
            mutations: self.read_u32()?,
            surfaces: self.read_u32()?,
        }))
    }

    fn decode_debug_mode(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::DebugModeChanged(DebugModeEvent {
            timestamp_ns: self.read_u64()?,
            enabled: self.read_bool()?,
        }))
    }
}

impl Iterator for DecodeIter<'_> {
    type Item = RecordedEvent;

    fn next(&mut self) -> Option<Self::Item> {
        let event = match self.read_u8()? {
            TAG_SURFACE_CREATED => self.decode_created(),
            TAG_SURFACE_RELEASED => self.decode_released(),
            TAG_INVALID_USE => self.decode_invalid_use(),
            TAG_TRANSACTION_APPLIED => self.decode_transaction(),
            TAG_DEBUG_MODE => self.decode_debug_mode(),
            _ => None,
        };
        // A bad record ends the stream; never resume mid-record.
        if event.is_none() {
            self.pos = self.data.len();
        }
        event
    }
}
