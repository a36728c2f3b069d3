// Copyright 2026 the Veneer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Dirty-tracking channel constants for the surface store.
//!
//! The reference compositor uses multi-channel dirty tracking (via
//! [`understory_dirty`]) so that applying a transaction only recomputes what
//! the transaction touched.
//!
//! # Propagation semantics
//!
//! - **Propagating**: [`GEOMETRY`], [`ALPHA`] and [`VISIBILITY`] use
//!   [`EagerPolicy`](understory_dirty::EagerPolicy) and have dependency edges
//!   from child to parent, because world transforms, effective alpha and
//!   effective visibility are inherited.
//! - **Local-only**: [`CROP`], [`BUFFER`] and [`HINT`] are per-surface
//!   properties; only the marked surface appears in the drain output.
//! - **Structural**: [`TOPOLOGY`] is marked on reparenting, z-order changes,
//!   and surface creation or destruction. It triggers a traversal-order
//!   rebuild but does not propagate.
//!
//! Callers never query dirty state directly;
//! [`SurfaceStore::evaluate`](crate::scene::SurfaceStore::evaluate) drains
//! every channel into [`FrameChanges`](crate::scene::FrameChanges).

use understory_dirty::Channel;

/// Position or matrix changed; world transforms of descendants are stale.
pub const GEOMETRY: Channel = Channel::new(0);

/// Alpha changed; effective alpha of descendants is stale.
pub const ALPHA: Channel = Channel::new(1);

/// Hidden flag changed; effective visibility of descendants is stale.
pub const VISIBILITY: Channel = Channel::new(2);

/// Crop rectangle changed.
pub const CROP: Channel = Channel::new(3);

/// Buffer size changed.
pub const BUFFER: Channel = Channel::new(4);

/// Transform hint changed after a display rotation.
pub const HINT: Channel = Channel::new(5);

/// Tree topology or sibling order changed.
pub const TOPOLOGY: Channel = Channel::new(6);
