// Copyright 2026 the Veneer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Surface identity types.

use core::fmt;

/// Sentinel value indicating "no surface" in index fields.
pub const INVALID: u32 = u32::MAX;

/// A compositor-side handle to a surface in a [`SurfaceStore`](super::SurfaceStore).
///
/// Contains both a slot index and a generation counter so that stale ids
/// can be detected after a surface is destroyed and the slot is reused.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId {
    pub(crate) idx: u32,
    pub(crate) generation: u32,
}

impl SurfaceId {
    /// Rebuilds an id from its raw parts (as found in a parcel).
    #[inline]
    #[must_use]
    pub const fn from_raw(idx: u32, generation: u32) -> Self {
        Self { idx, generation }
    }

    /// Returns the raw slot index (for diagnostics only).
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.idx
    }

    /// Returns the generation counter.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SurfaceId({}@gen{})", self.idx, self.generation)
    }
}

/// Identifies one compositor instance.
///
/// Surfaces are only meaningful to the compositor that created them; the id
/// travels in parcels so that a handle cannot be revived against a
/// different compositor.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompositorId(pub u64);

impl fmt::Debug for CompositorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CompositorId({})", self.0)
    }
}

impl fmt::Display for CompositorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a surface is for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SurfaceKind {
    /// A buffer-backed surface that presents client content.
    #[default]
    Buffer,
    /// A grouping node with no content of its own.
    Container,
    /// A solid-color or shader effect surface.
    Effect,
}

impl SurfaceKind {
    /// Short lowercase name, used in logs and traces.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buffer => "buffer",
            Self::Container => "container",
            Self::Effect => "effect",
        }
    }
}

/// Display rotation, also used as a per-surface transform hint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Rotation {
    /// Natural orientation.
    #[default]
    R0,
    /// Rotated 90 degrees clockwise.
    R90,
    /// Rotated 180 degrees.
    R180,
    /// Rotated 270 degrees clockwise.
    R270,
}

impl Rotation {
    /// Rotation in degrees.
    #[must_use]
    pub const fn degrees(self) -> u32 {
        match self {
            Self::R0 => 0,
            Self::R90 => 90,
            Self::R180 => 180,
            Self::R270 => 270,
        }
    }

    /// Whether this rotation swaps width and height relative to [`R0`](Self::R0).
    #[must_use]
    pub const fn is_transposed(self) -> bool {
        matches!(self, Self::R90 | Self::R270)
    }
}
