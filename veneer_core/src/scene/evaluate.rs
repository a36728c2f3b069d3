// Copyright 2026 the Veneer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Frame evaluation and change tracking.
//!
//! Evaluation drains each dirty channel and recomputes what it covers:
//!
//! 1. **GEOMETRY**: `world = parent_world * translate(position) * matrix`.
//! 2. **ALPHA**: `effective_alpha = parent_effective * alpha`.
//! 3. **VISIBILITY**: `effective_hidden = parent_hidden || hidden`, with
//!    transitions reported in [`FrameChanges::hidden`] / [`FrameChanges::unhidden`].
//! 4. **CROP** / **BUFFER** / **HINT**: collected only; consumers read the
//!    current values from the store.
//! 5. **TOPOLOGY**: drained and discarded; the traversal order was rebuilt
//!    up front if needed.
//!
//! [`FrameChanges`] carries raw slot indices so consumers can use the
//! `*_at()` accessors without generation checks.

use kurbo::Affine;

use super::id::INVALID;
use super::store::SurfaceStore;
use crate::dirty;

/// The set of changes produced by one [`SurfaceStore::evaluate`] call.
#[derive(Clone, Debug, Default)]
pub struct FrameChanges {
    /// Surfaces whose world transform was recomputed.
    pub geometry: Vec<u32>,
    /// Surfaces whose effective alpha was recomputed.
    pub alphas: Vec<u32>,
    /// Surfaces whose crop changed.
    pub crops: Vec<u32>,
    /// Surfaces whose buffer size changed.
    pub buffers: Vec<u32>,
    /// Surfaces whose transform hint changed.
    pub hints: Vec<u32>,
    /// Surfaces that became effectively hidden.
    pub hidden: Vec<u32>,
    /// Surfaces that became effectively visible.
    pub unhidden: Vec<u32>,
    /// Surfaces created since the last evaluate.
    pub added: Vec<u32>,
    /// Surfaces destroyed since the last evaluate.
    pub removed: Vec<u32>,
    /// Whether the traversal order was rebuilt.
    pub topology_changed: bool,
}

impl FrameChanges {
    /// Clears all change lists.
    pub fn clear(&mut self) {
        self.geometry.clear();
        self.alphas.clear();
        self.crops.clear();
        self.buffers.clear();
        self.hints.clear();
        self.hidden.clear();
        self.unhidden.clear();
        self.added.clear();
        self.removed.clear();
        self.topology_changed = false;
    }

    /// Whether nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.geometry.is_empty()
            && self.alphas.is_empty()
            && self.crops.is_empty()
            && self.buffers.is_empty()
            && self.hints.is_empty()
            && self.hidden.is_empty()
            && self.unhidden.is_empty()
            && self.added.is_empty()
            && self.removed.is_empty()
            && !self.topology_changed
    }
}

impl SurfaceStore {
    /// Evaluates the surface tree, recomputing dirty properties and
    /// returning the set of changes.
    pub fn evaluate(&mut self) -> FrameChanges {
        let mut changes = FrameChanges::default();
        self.evaluate_into(&mut changes);
        changes
    }

    /// Like [`evaluate`](Self::evaluate), but reuses a caller-provided buffer.
    pub fn evaluate_into(&mut self, changes: &mut FrameChanges) {
        changes.clear();

        if self.traversal_dirty {
            self.rebuild_traversal_order();
            changes.topology_changed = true;
            self.traversal_dirty = false;
        }

        let dirty_geometry = self.drain_live(dirty::GEOMETRY, true);
        for &idx in &dirty_geometry {
            let i = idx as usize;
            let parent_world = match self.parent[i] {
                INVALID => Affine::IDENTITY,
                p => self.world_transform[p as usize],
            };
            self.world_transform[i] =
                parent_world * Affine::translate(self.position[i].to_vec2()) * self.matrix[i];
        }
        changes.geometry = dirty_geometry;

        let dirty_alphas = self.drain_live(dirty::ALPHA, true);
        for &idx in &dirty_alphas {
            let i = idx as usize;
            let parent_alpha = match self.parent[i] {
                INVALID => 1.0,
                p => self.effective_alpha[p as usize],
            };
            self.effective_alpha[i] = parent_alpha * self.alpha[i];
        }
        changes.alphas = dirty_alphas;

        for idx in self.drain_live(dirty::VISIBILITY, true) {
            let i = idx as usize;
            let parent_hidden = match self.parent[i] {
                INVALID => false,
                p => self.effective_hidden[p as usize],
            };
            let new_hidden = parent_hidden || self.hidden[i];
            if new_hidden != self.effective_hidden[i] {
                if new_hidden {
                    changes.hidden.push(idx);
                } else {
                    changes.unhidden.push(idx);
                }
                self.effective_hidden[i] = new_hidden;
            }
        }

        changes.crops = self.drain_live(dirty::CROP, false);
        changes.buffers = self.drain_live(dirty::BUFFER, false);
        changes.hints = self.drain_live(dirty::HINT, false);
        let _ = self.drain_live(dirty::TOPOLOGY, false);

        core::mem::swap(&mut self.pending_added, &mut changes.added);
        core::mem::swap(&mut self.pending_removed, &mut changes.removed);
    }

    /// Returns the current traversal order (depth-first pre-order, siblings
    /// by z-order).
    ///
    /// Only valid after [`evaluate`](Self::evaluate) has been called.
    #[must_use]
    pub fn traversal_order(&self) -> &[u32] {
        &self.traversal_order
    }

    /// Drains `channel`, dropping slots that were destroyed after marking.
    fn drain_live(&mut self, channel: understory_dirty::Channel, affected: bool) -> Vec<u32> {
        let drained: Vec<u32> = if affected {
            self.dirty
                .drain(channel)
                .affected()
                .deterministic()
                .run()
                .collect()
        } else {
            self.dirty.drain(channel).deterministic().run().collect()
        };
        drained
            .into_iter()
            .filter(|&idx| idx < self.len && self.alive[idx as usize])
            .collect()
    }
}
