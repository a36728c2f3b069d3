// Copyright 2026 the Veneer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compositor-side surface tree.
//!
//! This is the data model behind [`LocalCompositor`](crate::LocalCompositor).
//! Each surface has:
//!
//! - An identity ([`SurfaceId`]): a generational index that becomes stale
//!   when the surface is destroyed, so a dead id can never address a reused
//!   slot.
//! - A reference count: one per live client handle plus one per
//!   transaction holding a mutation for it.
//! - Topology: parent, first-child and sibling links, with siblings drawn
//!   in z-order.
//! - **Local properties** written by transactions and **computed
//!   properties** (world transform, effective alpha, effective visibility)
//!   produced by [`evaluate`](SurfaceStore::evaluate).

mod evaluate;
mod id;
mod store;
mod traverse;

pub use evaluate::FrameChanges;
pub use id::{CompositorId, INVALID, Rotation, SurfaceId, SurfaceKind};
pub use store::{SurfaceDesc, SurfaceSnapshot, SurfaceStore};
pub use traverse::Children;
