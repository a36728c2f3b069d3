// Copyright 2026 the Veneer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error types.
//!
//! Every operation that can observe a released handle or a stale compositor
//! id returns [`Result`]. Use of a released handle is always reported as
//! [`Error::Released`]; whether it carries a [`ReleaseRecord`] as its
//! [`source`](std::error::Error::source) depends on the client's
//! debug-usage-after-release mode (see [`Client`](crate::Client)).

use std::backtrace::Backtrace;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;
use std::time::SystemTime;

use thiserror::Error;

use crate::scene::{CompositorId, SurfaceId};

/// Shorthand for results in this crate.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// The operation that was attempted on a surface handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `Transaction::set_visibility` and its shorthands.
    SetVisibility,
    /// `Transaction::set_position`.
    SetPosition,
    /// `Transaction::set_matrix`.
    SetMatrix,
    /// `Transaction::set_crop`.
    SetCrop,
    /// `Transaction::set_alpha`.
    SetAlpha,
    /// `Transaction::set_layer`.
    SetLayer,
    /// `Transaction::set_buffer_size`.
    SetBufferSize,
    /// `Transaction::reparent`, either side.
    Reparent,
    /// Use as the parent of a new surface.
    SetParent,
    /// `SurfaceControl::write_to_parcel`.
    WriteToParcel,
    /// `SurfaceControl::transform_hint`.
    QueryTransformHint,
    /// `SurfaceControl::id`.
    QueryId,
}

impl Operation {
    /// Short name, used in messages and traces.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SetVisibility => "set visibility of",
            Self::SetPosition => "set position of",
            Self::SetMatrix => "set matrix of",
            Self::SetCrop => "set crop of",
            Self::SetAlpha => "set alpha of",
            Self::SetLayer => "set layer of",
            Self::SetBufferSize => "set buffer size of",
            Self::Reparent => "reparent",
            Self::SetParent => "parent a new surface under",
            Self::WriteToParcel => "write to parcel",
            Self::QueryTransformHint => "query transform hint of",
            Self::QueryId => "query id of",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where and when a surface handle was released.
///
/// Captured by [`SurfaceControl::release`](crate::SurfaceControl::release)
/// only while debug-usage-after-release mode is enabled, and attached as the
/// source of later [`Error::Released`] errors.
#[derive(Debug, Error)]
#[error("surface `{name}` released at {location} on thread {}", .thread.as_deref().unwrap_or("<unnamed>"))]
pub struct ReleaseRecord {
    name: Arc<str>,
    callsite: Option<Arc<str>>,
    location: &'static Location<'static>,
    thread: Option<String>,
    released_at: SystemTime,
    stack: Backtrace,
}

impl ReleaseRecord {
    pub(crate) fn capture(
        name: Arc<str>,
        callsite: Option<Arc<str>>,
        location: &'static Location<'static>,
        force_backtrace: bool,
    ) -> Self {
        let stack = if force_backtrace {
            Backtrace::force_capture()
        } else {
            Backtrace::capture()
        };
        Self {
            name,
            callsite,
            location,
            thread: std::thread::current().name().map(str::to_owned),
            released_at: SystemTime::now(),
            stack,
        }
    }

    /// Debug name of the released surface.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Callsite tag given to the surface builder, if any.
    #[must_use]
    pub fn callsite(&self) -> Option<&str> {
        self.callsite.as_deref()
    }

    /// Source location of the `release()` call.
    #[must_use]
    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    /// Name of the releasing thread, if it had one.
    #[must_use]
    pub fn thread(&self) -> Option<&str> {
        self.thread.as_deref()
    }

    /// Wall-clock time of the release.
    #[must_use]
    pub fn released_at(&self) -> SystemTime {
        self.released_at
    }

    /// Backtrace of the release.
    ///
    /// Empty unless backtraces are enabled (`RUST_BACKTRACE`) or the client
    /// was configured with `capture_backtraces`.
    #[must_use]
    pub fn backtrace(&self) -> &Backtrace {
        &self.stack
    }
}

/// Malformed parcel data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ParcelError {
    /// The parcel ended before the value was complete.
    #[error("parcel truncated: needed {needed} bytes at offset {offset}")]
    Truncated {
        /// Read cursor at the failed read.
        offset: usize,
        /// Bytes the read needed.
        needed: usize,
    },
    /// The next value is not a surface.
    #[error("unexpected tag {0:#04x}")]
    BadTag(u8),
    /// A string field was not valid UTF-8.
    #[error("string field is not valid UTF-8")]
    BadUtf8,
    /// A string was too long to length-prefix with a `u32`.
    #[error("string of {0} bytes is too long for a parcel")]
    TooLong(usize),
}

/// Errors produced by surface handles, transactions and compositors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The handle was released before this use.
    ///
    /// With debug-usage-after-release mode on, `cause` records the release.
    #[error("cannot {operation} surface `{name}`: it has been released")]
    Released {
        /// Debug name of the surface.
        name: Arc<str>,
        /// What was attempted.
        operation: Operation,
        /// The release event, when captured.
        #[source]
        cause: Option<Arc<ReleaseRecord>>,
    },
    /// The compositor no longer has a surface for this id.
    #[error("compositor has no live surface {0:?}")]
    StaleSurface(SurfaceId),
    /// The surface belongs to another compositor.
    #[error("surface {surface:?} belongs to compositor {found}, expected {expected}")]
    ForeignSurface {
        /// The offending surface.
        surface: SurfaceId,
        /// The compositor doing the work.
        expected: CompositorId,
        /// The compositor that owns the surface.
        found: CompositorId,
    },
    /// A surface was built without a name.
    #[error("surface builder requires a name")]
    MissingName,
    /// A property value was out of range or not finite.
    #[error("invalid {what}: {value}")]
    InvalidValue {
        /// Which property.
        what: &'static str,
        /// The rejected value.
        value: f64,
    },
    /// Reparenting would make a surface its own ancestor.
    #[error("reparenting {child:?} under {parent:?} would create a cycle")]
    ReparentCycle {
        /// The surface being moved.
        child: SurfaceId,
        /// The requested parent.
        parent: SurfaceId,
    },
    /// Parcel data could not be decoded.
    #[error("malformed parcel: {0}")]
    Parcel(#[from] ParcelError),
}

impl Error {
    /// Whether this error reports use of a released handle.
    #[must_use]
    pub fn is_released(&self) -> bool {
        matches!(self, Self::Released { .. })
    }

    /// The release record attached to a [`Released`](Self::Released) error.
    #[must_use]
    pub fn release_cause(&self) -> Option<&ReleaseRecord> {
        match self {
            Self::Released { cause, .. } => cause.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn released_error_exposes_record_as_source() {
        let record = Arc::new(ReleaseRecord::capture(
            "status-bar".into(),
            Some("tests".into()),
            Location::caller(),
            false,
        ));
        let err = Error::Released {
            name: "status-bar".into(),
            operation: Operation::SetVisibility,
            cause: Some(record),
        };
        assert!(err.is_released());
        let source = err.source().expect("cause should be the source");
        assert!(source.to_string().contains("status-bar"));
        assert_eq!(err.release_cause().and_then(ReleaseRecord::callsite), Some("tests"));
        assert_eq!(
            err.to_string(),
            "cannot set visibility of surface `status-bar`: it has been released"
        );
    }

    #[test]
    fn released_error_without_record_has_no_source() {
        let err = Error::Released {
            name: "nav".into(),
            operation: Operation::WriteToParcel,
            cause: None,
        };
        assert!(err.source().is_none());
        assert!(err.release_cause().is_none());
    }

    #[test]
    fn record_display_names_location() {
        let here = Location::caller();
        let record = ReleaseRecord::capture("dim".into(), None, here, false);
        let text = record.to_string();
        assert!(text.contains(here.file()), "{text}");
        assert_eq!(record.location().line(), here.line());
    }

    #[test]
    fn parcel_errors_convert() {
        let err: Error = ParcelError::BadTag(0x7f).into();
        assert!(!err.is_released());
        assert_eq!(err.to_string(), "malformed parcel: unexpected tag 0x7f");
    }
}
