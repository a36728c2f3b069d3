// Copyright 2026 the Veneer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compositor contract and the in-process reference compositor.
//!
//! The compositor owns the real surfaces; the client library only ever
//! talks to it through the [`Compositor`] trait. A platform integration
//! implements the trait over its IPC channel. [`LocalCompositor`] implements
//! it in-process on top of a [`SurfaceStore`], which is what tests and demos
//! use.
//!
//! # Reference counting
//!
//! Every live [`SurfaceControl`](crate::SurfaceControl) holds one reference
//! on its surface, and every [`Transaction`](crate::Transaction) holds one
//! reference on each surface it has a mutation for. The surface is destroyed
//! when the count reaches zero, so releasing a handle never invalidates a
//! mutation that was already recorded.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use kurbo::{Affine, Point, Rect, Size};
use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::scene::{
    CompositorId, FrameChanges, Rotation, SurfaceDesc, SurfaceId, SurfaceSnapshot, SurfaceStore,
};

/// One property change.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Change {
    /// Show (`true`) or hide (`false`).
    Visibility(bool),
    /// Position relative to the parent.
    Position(Point),
    /// Local matrix.
    Matrix(Affine),
    /// Crop rectangle, or `None` to clear it.
    Crop(Option<Rect>),
    /// Local alpha in `[0, 1]`.
    Alpha(f32),
    /// Z-order among siblings.
    Layer(i32),
    /// Buffer size.
    BufferSize(Size),
    /// New parent, or `None` to detach.
    Reparent(Option<SurfaceId>),
}

/// A [`Change`] aimed at one surface.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Mutation {
    /// The surface to change.
    pub target: SurfaceId,
    /// What to change.
    pub change: Change,
}

/// A surface returned by [`Compositor::create_surface`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CreatedSurface {
    /// Generational id for later calls.
    pub id: SurfaceId,
    /// Compositor-wide unique layer id, for diagnostics.
    pub layer_id: u32,
}

/// The client's view of a compositor.
///
/// Implementations must be internally synchronized: every method may be
/// called concurrently from any thread.
pub trait Compositor: Send + Sync + core::fmt::Debug {
    /// Identifies this compositor instance.
    fn instance_id(&self) -> CompositorId;

    /// Creates a surface holding one reference.
    ///
    /// # Errors
    ///
    /// Fails if the requested parent is gone.
    fn create_surface(&self, desc: &SurfaceDesc) -> Result<CreatedSurface>;

    /// Adds a reference to a live surface.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::StaleSurface`] if the surface is gone.
    fn acquire(&self, id: SurfaceId) -> Result<()>;

    /// Drops a reference. Returns `true` if the surface was destroyed.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::StaleSurface`] if the surface is already gone.
    fn release(&self, id: SurfaceId) -> Result<bool>;

    /// Whether the id refers to a live surface.
    fn is_alive(&self, id: SurfaceId) -> bool;

    /// Applies a batch of mutations atomically, in order.
    ///
    /// # Errors
    ///
    /// Fails without applying anything if any target is gone or a reparent
    /// would create a cycle.
    fn apply(&self, batch: &[Mutation]) -> Result<()>;

    /// Returns the transform hint of a surface.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::StaleSurface`] if the surface is gone.
    fn transform_hint(&self, id: SurfaceId) -> Result<Rotation>;
}

static NEXT_COMPOSITOR_ID: AtomicU64 = AtomicU64::new(1);

/// In-process compositor backed by a [`SurfaceStore`].
#[derive(Debug)]
pub struct LocalCompositor {
    id: CompositorId,
    store: RwLock<SurfaceStore>,
}

impl Default for LocalCompositor {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalCompositor {
    /// Creates an empty compositor with a process-unique id.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: CompositorId(NEXT_COMPOSITOR_ID.fetch_add(1, Ordering::Relaxed)),
            store: RwLock::new(SurfaceStore::new()),
        }
    }

    /// Evaluates the surface tree and returns what changed since the last call.
    pub fn evaluate(&self) -> FrameChanges {
        self.store.write().evaluate()
    }

    /// Returns a copy of one surface's state.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::StaleSurface`] if the surface is gone.
    pub fn snapshot(&self, id: SurfaceId) -> Result<SurfaceSnapshot> {
        self.store.read().snapshot(id)
    }

    /// Number of live surfaces.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.store.read().live_count()
    }

    /// Rotates the display. Returns whether the rotation changed.
    pub fn set_display_rotation(&self, rotation: Rotation) -> bool {
        let changed = self.store.write().set_display_rotation(rotation);
        if changed {
            tracing::debug!(compositor = %self.id, degrees = rotation.degrees(), "display rotated");
        }
        changed
    }

    /// Runs `f` with read access to the store.
    pub fn with_store<R>(&self, f: impl FnOnce(&SurfaceStore) -> R) -> R {
        f(&self.store.read())
    }
}

impl Compositor for LocalCompositor {
    fn instance_id(&self) -> CompositorId {
        self.id
    }

    fn create_surface(&self, desc: &SurfaceDesc) -> Result<CreatedSurface> {
        let mut store = self.store.write();
        let id = store.create(desc)?;
        let layer_id = store.layer_id(id)?;
        Ok(CreatedSurface { id, layer_id })
    }

    fn acquire(&self, id: SurfaceId) -> Result<()> {
        self.store.write().acquire(id)
    }

    fn release(&self, id: SurfaceId) -> Result<bool> {
        let destroyed = self.store.write().release(id)?;
        if destroyed {
            tracing::debug!(compositor = %self.id, surface = ?id, "surface destroyed");
        }
        Ok(destroyed)
    }

    fn is_alive(&self, id: SurfaceId) -> bool {
        self.store.read().is_alive(id)
    }

    fn apply(&self, batch: &[Mutation]) -> Result<()> {
        let mut store = self.store.write();
        validate_batch(&store, batch)?;
        for m in batch {
            apply_one(&mut store, m)?;
        }
        Ok(())
    }

    fn transform_hint(&self, id: SurfaceId) -> Result<Rotation> {
        self.store.read().transform_hint(id)
    }
}

/// Checks a batch against the current store without mutating it.
///
/// Reparents are tracked in an overlay so that a cycle formed by several
/// mutations of the same batch is caught too.
fn validate_batch(store: &SurfaceStore, batch: &[Mutation]) -> Result<()> {
    let mut pending_parent: HashMap<SurfaceId, Option<SurfaceId>> = HashMap::new();
    for m in batch {
        store.check(m.target)?;
        let Change::Reparent(parent) = m.change else {
            continue;
        };
        if let Some(parent) = parent {
            store.check(parent)?;
            let mut cursor = Some(parent);
            while let Some(ancestor) = cursor {
                if ancestor == m.target {
                    return Err(Error::ReparentCycle {
                        child: m.target,
                        parent,
                    });
                }
                cursor = match pending_parent.get(&ancestor) {
                    Some(&overlaid) => overlaid,
                    None => store.parent(ancestor)?,
                };
            }
        }
        pending_parent.insert(m.target, parent);
    }
    Ok(())
}

fn apply_one(store: &mut SurfaceStore, m: &Mutation) -> Result<()> {
    let id = m.target;
    match m.change {
        Change::Visibility(visible) => store.set_hidden(id, !visible),
        Change::Position(position) => store.set_position(id, position),
        Change::Matrix(matrix) => store.set_matrix(id, matrix),
        Change::Crop(crop) => store.set_crop(id, crop),
        Change::Alpha(alpha) => store.set_alpha(id, alpha),
        Change::Layer(z) => store.set_layer(id, z),
        Change::BufferSize(size) => store.set_buffer_size(id, size),
        Change::Reparent(parent) => store.reparent(id, parent),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::SurfaceKind;

    fn create(compositor: &LocalCompositor, name: &str) -> SurfaceId {
        compositor
            .create_surface(&SurfaceDesc::new(name, SurfaceKind::Container))
            .unwrap()
            .id
    }

    #[test]
    fn instances_have_distinct_ids() {
        let a = LocalCompositor::new();
        let b = LocalCompositor::new();
        assert_ne!(a.instance_id(), b.instance_id());
    }

    #[test]
    fn apply_runs_mutations_in_order() {
        let compositor = LocalCompositor::new();
        let id = create(&compositor, "a");
        compositor
            .apply(&[
                Mutation {
                    target: id,
                    change: Change::Alpha(0.2),
                },
                Mutation {
                    target: id,
                    change: Change::Alpha(0.7),
                },
                Mutation {
                    target: id,
                    change: Change::Visibility(false),
                },
            ])
            .unwrap();

        let snap = compositor.snapshot(id).unwrap();
        assert_eq!(snap.alpha, 0.7);
        assert!(snap.hidden);
    }

    #[test]
    fn apply_is_all_or_nothing_on_stale_target() {
        let compositor = LocalCompositor::new();
        let live = create(&compositor, "live");
        let dead = create(&compositor, "dead");
        compositor.release(dead).unwrap();

        let err = compositor
            .apply(&[
                Mutation {
                    target: live,
                    change: Change::Layer(9),
                },
                Mutation {
                    target: dead,
                    change: Change::Visibility(true),
                },
            ])
            .unwrap_err();
        assert!(matches!(err, Error::StaleSurface(id) if id == dead));
        assert_eq!(compositor.snapshot(live).unwrap().z, 0);
    }

    #[test]
    fn apply_rejects_cycle_formed_within_batch() {
        let compositor = LocalCompositor::new();
        let a = create(&compositor, "a");
        let b = create(&compositor, "b");

        let err = compositor
            .apply(&[
                Mutation {
                    target: b,
                    change: Change::Reparent(Some(a)),
                },
                Mutation {
                    target: a,
                    change: Change::Reparent(Some(b)),
                },
            ])
            .unwrap_err();
        assert!(matches!(err, Error::ReparentCycle { .. }));
        assert_eq!(compositor.snapshot(b).unwrap().parent, None);
    }

    #[test]
    fn apply_allows_swapping_parents_within_batch() {
        let compositor = LocalCompositor::new();
        let a = create(&compositor, "a");
        let b = create(&compositor, "b");
        compositor
            .apply(&[Mutation {
                target: b,
                change: Change::Reparent(Some(a)),
            }])
            .unwrap();

        compositor
            .apply(&[
                Mutation {
                    target: b,
                    change: Change::Reparent(None),
                },
                Mutation {
                    target: a,
                    change: Change::Reparent(Some(b)),
                },
            ])
            .unwrap();
        assert_eq!(compositor.snapshot(a).unwrap().parent, Some(b));
        assert_eq!(compositor.snapshot(b).unwrap().parent, None);
    }

    #[test]
    fn release_reports_destruction() {
        let compositor = LocalCompositor::new();
        let id = create(&compositor, "a");
        compositor.acquire(id).unwrap();
        assert!(!compositor.release(id).unwrap());
        assert!(compositor.release(id).unwrap());
        assert!(!compositor.is_alive(id));
        assert_eq!(compositor.live_count(), 0);
    }

    #[test]
    fn display_rotation_updates_hints() {
        let compositor = LocalCompositor::new();
        let id = create(&compositor, "a");
        assert!(compositor.set_display_rotation(Rotation::R270));
        assert_eq!(compositor.transform_hint(id).unwrap(), Rotation::R270);
    }
}
