// Copyright 2026 the Veneer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Struct-of-arrays surface storage with allocation, reference counting,
//! topology, and property management.

use kurbo::{Affine, Point, Rect, Size};
use understory_dirty::{CycleHandling, DirtyTracker, EagerPolicy};

use super::id::{INVALID, Rotation, SurfaceId, SurfaceKind};
use super::traverse::Children;
use crate::dirty;
use crate::error::{Error, Result};

/// Parameters for a new surface.
#[derive(Clone, Debug, PartialEq)]
pub struct SurfaceDesc {
    /// Debug name.
    pub name: String,
    /// What the surface is for.
    pub kind: SurfaceKind,
    /// Parent to attach to, if any.
    pub parent: Option<SurfaceId>,
    /// Initial buffer size.
    pub buffer_size: Size,
    /// Whether the surface starts hidden.
    pub hidden: bool,
}

impl SurfaceDesc {
    /// A visible, unparented surface of the given kind.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: SurfaceKind) -> Self {
        Self {
            name: name.into(),
            kind,
            parent: None,
            buffer_size: Size::ZERO,
            hidden: false,
        }
    }
}

/// Read-only copy of one surface's state.
#[derive(Clone, Debug, PartialEq)]
pub struct SurfaceSnapshot {
    /// Debug name.
    pub name: String,
    /// Compositor-assigned layer id.
    pub layer_id: u32,
    /// What the surface is for.
    pub kind: SurfaceKind,
    /// Parent surface, if attached.
    pub parent: Option<SurfaceId>,
    /// Position relative to the parent.
    pub position: Point,
    /// Local matrix applied after the position.
    pub matrix: Affine,
    /// Crop rectangle in local coordinates.
    pub crop: Option<Rect>,
    /// Local alpha.
    pub alpha: f32,
    /// Z-order among siblings.
    pub z: i32,
    /// Buffer size.
    pub buffer_size: Size,
    /// Local hidden flag.
    pub hidden: bool,
    /// Transform hint for buffer producers.
    pub transform_hint: Rotation,
    /// Outstanding references (handles plus transactions).
    pub refs: u32,
}

/// Struct-of-arrays storage for all surfaces of one compositor.
///
/// Surfaces are addressed by [`SurfaceId`]. Each surface is reference
/// counted; when the last reference is dropped the surface is destroyed,
/// its children are orphaned, and its slot is recycled with a bumped
/// generation so old ids fail validation.
#[derive(Debug)]
pub struct SurfaceStore {
    // -- Topology --
    pub(crate) parent: Vec<u32>,
    pub(crate) first_child: Vec<u32>,
    pub(crate) next_sibling: Vec<u32>,
    pub(crate) prev_sibling: Vec<u32>,

    // -- Identity --
    pub(crate) name: Vec<String>,
    pub(crate) layer_id: Vec<u32>,
    pub(crate) kind: Vec<SurfaceKind>,
    pub(crate) refs: Vec<u32>,

    // -- Local properties (set by transactions) --
    pub(crate) position: Vec<Point>,
    pub(crate) matrix: Vec<Affine>,
    pub(crate) crop: Vec<Option<Rect>>,
    pub(crate) alpha: Vec<f32>,
    pub(crate) z: Vec<i32>,
    pub(crate) buffer_size: Vec<Size>,
    pub(crate) hidden: Vec<bool>,
    pub(crate) transform_hint: Vec<Rotation>,

    // -- Computed properties (written by evaluate) --
    pub(crate) world_transform: Vec<Affine>,
    pub(crate) effective_alpha: Vec<f32>,
    pub(crate) effective_hidden: Vec<bool>,

    // -- Allocation --
    pub(crate) generation: Vec<u32>,
    pub(crate) alive: Vec<bool>,
    pub(crate) free_list: Vec<u32>,
    pub(crate) len: u32,
    next_layer_id: u32,
    display_rotation: Rotation,

    // -- Dirty tracking --
    pub(crate) dirty: DirtyTracker<u32>,

    // -- Traversal cache --
    pub(crate) traversal_order: Vec<u32>,
    pub(crate) traversal_dirty: bool,

    // -- Lifecycle tracking --
    pub(crate) pending_added: Vec<u32>,
    pub(crate) pending_removed: Vec<u32>,
}

impl Default for SurfaceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SurfaceStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            parent: Vec::new(),
            first_child: Vec::new(),
            next_sibling: Vec::new(),
            prev_sibling: Vec::new(),
            name: Vec::new(),
            layer_id: Vec::new(),
            kind: Vec::new(),
            refs: Vec::new(),
            position: Vec::new(),
            matrix: Vec::new(),
            crop: Vec::new(),
            alpha: Vec::new(),
            z: Vec::new(),
            buffer_size: Vec::new(),
            hidden: Vec::new(),
            transform_hint: Vec::new(),
            world_transform: Vec::new(),
            effective_alpha: Vec::new(),
            effective_hidden: Vec::new(),
            generation: Vec::new(),
            alive: Vec::new(),
            free_list: Vec::new(),
            len: 0,
            next_layer_id: 1,
            display_rotation: Rotation::R0,
            dirty: DirtyTracker::with_cycle_handling(CycleHandling::Error),
            traversal_order: Vec::new(),
            traversal_dirty: true,
            pending_added: Vec::new(),
            pending_removed: Vec::new(),
        }
    }

    // -- Allocation API --

    /// Creates a surface holding one reference, and returns its id.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::StaleSurface`] if `desc.parent` is not alive.
    pub fn create(&mut self, desc: &SurfaceDesc) -> Result<SurfaceId> {
        if let Some(parent) = desc.parent {
            self.check(parent)?;
        }

        let layer_id = self.next_layer_id;
        self.next_layer_id = self.next_layer_id.wrapping_add(1).max(1);
        let hint = self.display_rotation;

        let idx = if let Some(idx) = self.free_list.pop() {
            let i = idx as usize;
            self.parent[i] = INVALID;
            self.first_child[i] = INVALID;
            self.next_sibling[i] = INVALID;
            self.prev_sibling[i] = INVALID;
            self.name[i].clone_from(&desc.name);
            self.layer_id[i] = layer_id;
            self.kind[i] = desc.kind;
            self.refs[i] = 1;
            self.position[i] = Point::ORIGIN;
            self.matrix[i] = Affine::IDENTITY;
            self.crop[i] = None;
            self.alpha[i] = 1.0;
            self.z[i] = 0;
            self.buffer_size[i] = desc.buffer_size;
            self.hidden[i] = desc.hidden;
            self.transform_hint[i] = hint;
            self.world_transform[i] = Affine::IDENTITY;
            self.effective_alpha[i] = 1.0;
            self.effective_hidden[i] = false;
            self.alive[i] = true;
            idx
        } else {
            let idx = self.len;
            self.len += 1;
            self.parent.push(INVALID);
            self.first_child.push(INVALID);
            self.next_sibling.push(INVALID);
            self.prev_sibling.push(INVALID);
            self.name.push(desc.name.clone());
            self.layer_id.push(layer_id);
            self.kind.push(desc.kind);
            self.refs.push(1);
            self.position.push(Point::ORIGIN);
            self.matrix.push(Affine::IDENTITY);
            self.crop.push(None);
            self.alpha.push(1.0);
            self.z.push(0);
            self.buffer_size.push(desc.buffer_size);
            self.hidden.push(desc.hidden);
            self.transform_hint.push(hint);
            self.world_transform.push(Affine::IDENTITY);
            self.effective_alpha.push(1.0);
            self.effective_hidden.push(false);
            self.generation.push(0);
            self.alive.push(true);
            idx
        };

        self.traversal_dirty = true;
        self.pending_added.push(idx);
        self.dirty.mark(idx, dirty::TOPOLOGY);
        self.mark_subtree_inherited_dirty(idx);
        if desc.buffer_size != Size::ZERO {
            self.dirty.mark(idx, dirty::BUFFER);
        }

        let id = SurfaceId {
            idx,
            generation: self.generation[idx as usize],
        };
        if let Some(parent) = desc.parent {
            self.link_child(parent.idx, idx);
        }
        Ok(id)
    }

    /// Adds a reference to a live surface.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::StaleSurface`] if the surface is gone.
    pub fn acquire(&mut self, id: SurfaceId) -> Result<()> {
        let idx = self.check(id)?;
        self.refs[idx as usize] += 1;
        Ok(())
    }

    /// Drops a reference. Returns `true` if this destroyed the surface.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::StaleSurface`] if the surface is already gone.
    pub fn release(&mut self, id: SurfaceId) -> Result<bool> {
        let idx = self.check(id)?;
        self.refs[idx as usize] -= 1;
        if self.refs[idx as usize] > 0 {
            return Ok(false);
        }
        self.destroy(idx);
        Ok(true)
    }

    /// Returns whether the given id refers to a live surface.
    #[must_use]
    pub fn is_alive(&self, id: SurfaceId) -> bool {
        id.idx < self.len
            && self.alive[id.idx as usize]
            && self.generation[id.idx as usize] == id.generation
    }

    /// Number of live surfaces.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.alive.iter().filter(|&&alive| alive).count()
    }

    // -- Topology API --

    /// Moves `child` under `new_parent`, or detaches it when `None`.
    ///
    /// # Errors
    ///
    /// Fails if either id is stale, or with [`Error::ReparentCycle`] if
    /// `new_parent` is `child` or one of its descendants.
    pub fn reparent(&mut self, child: SurfaceId, new_parent: Option<SurfaceId>) -> Result<()> {
        let c = self.check(child)?;
        let p = match new_parent {
            Some(parent) => {
                let p = self.check(parent)?;
                if self.is_ancestor_or_self(c, p) {
                    return Err(Error::ReparentCycle { child, parent });
                }
                p
            }
            None => INVALID,
        };

        let old_p = self.parent[c as usize];
        if old_p == p {
            return Ok(());
        }
        if old_p != INVALID {
            self.unlink_from_parent(c);
            self.remove_inherited_dependencies(c, old_p);
            self.dirty.mark(old_p, dirty::TOPOLOGY);
        }
        if p == INVALID {
            self.mark_subtree_inherited_dirty(c);
            self.traversal_dirty = true;
            self.dirty.mark(c, dirty::TOPOLOGY);
        } else {
            self.link_child(p, c);
        }
        Ok(())
    }

    /// Returns the parent of a surface, if any.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::StaleSurface`] if the surface is gone.
    pub fn parent(&self, id: SurfaceId) -> Result<Option<SurfaceId>> {
        let idx = self.check(id)?;
        Ok(self.id_at(self.parent[idx as usize]))
    }

    /// Returns an iterator over the direct children of a surface, in
    /// insertion order.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::StaleSurface`] if the surface is gone.
    pub fn children(&self, id: SurfaceId) -> Result<Children<'_>> {
        let idx = self.check(id)?;
        Ok(Children::new(self, self.first_child[idx as usize]))
    }

    /// Returns the live surfaces with no parent.
    #[must_use]
    pub fn roots(&self) -> Vec<SurfaceId> {
        (0..self.len)
            .filter(|&idx| self.alive[idx as usize] && self.parent[idx as usize] == INVALID)
            .map(|idx| SurfaceId {
                idx,
                generation: self.generation[idx as usize],
            })
            .collect()
    }

    /// Whether `ancestor` is `id` or one of its ancestors.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::StaleSurface`] if either id is stale.
    pub fn is_ancestor_of(&self, ancestor: SurfaceId, id: SurfaceId) -> Result<bool> {
        let a = self.check(ancestor)?;
        let i = self.check(id)?;
        Ok(self.is_ancestor_or_self(a, i))
    }

    // -- Display --

    /// Current display rotation.
    #[must_use]
    pub fn display_rotation(&self) -> Rotation {
        self.display_rotation
    }

    /// Rotates the display, updating the transform hint of every live
    /// surface whose hint differs. Returns whether the rotation changed.
    pub fn set_display_rotation(&mut self, rotation: Rotation) -> bool {
        if self.display_rotation == rotation {
            return false;
        }
        self.display_rotation = rotation;
        for idx in 0..self.len {
            let i = idx as usize;
            if self.alive[i] && self.transform_hint[i] != rotation {
                self.transform_hint[i] = rotation;
                self.dirty.mark(idx, dirty::HINT);
            }
        }
        true
    }

    // -- Property getters --

    /// Returns a copy of a surface's state.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::StaleSurface`] if the surface is gone.
    pub fn snapshot(&self, id: SurfaceId) -> Result<SurfaceSnapshot> {
        let i = self.check(id)? as usize;
        Ok(SurfaceSnapshot {
            name: self.name[i].clone(),
            layer_id: self.layer_id[i],
            kind: self.kind[i],
            parent: self.id_at(self.parent[i]),
            position: self.position[i],
            matrix: self.matrix[i],
            crop: self.crop[i],
            alpha: self.alpha[i],
            z: self.z[i],
            buffer_size: self.buffer_size[i],
            hidden: self.hidden[i],
            transform_hint: self.transform_hint[i],
            refs: self.refs[i],
        })
    }

    /// Returns the compositor-assigned layer id.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::StaleSurface`] if the surface is gone.
    pub fn layer_id(&self, id: SurfaceId) -> Result<u32> {
        Ok(self.layer_id[self.check(id)? as usize])
    }

    /// Returns the transform hint of a surface.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::StaleSurface`] if the surface is gone.
    pub fn transform_hint(&self, id: SurfaceId) -> Result<Rotation> {
        Ok(self.transform_hint[self.check(id)? as usize])
    }

    /// Returns the computed world transform.
    ///
    /// Only valid after [`evaluate`](Self::evaluate) has been called.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::StaleSurface`] if the surface is gone.
    pub fn world_transform(&self, id: SurfaceId) -> Result<Affine> {
        Ok(self.world_transform[self.check(id)? as usize])
    }

    /// Returns the computed effective alpha.
    ///
    /// Only valid after [`evaluate`](Self::evaluate) has been called.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::StaleSurface`] if the surface is gone.
    pub fn effective_alpha(&self, id: SurfaceId) -> Result<f32> {
        Ok(self.effective_alpha[self.check(id)? as usize])
    }

    /// Returns whether the surface is hidden by itself or an ancestor.
    ///
    /// Only valid after [`evaluate`](Self::evaluate) has been called.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::StaleSurface`] if the surface is gone.
    pub fn effective_hidden(&self, id: SurfaceId) -> Result<bool> {
        Ok(self.effective_hidden[self.check(id)? as usize])
    }

    // -- Mutation API (auto-marks dirty) --

    /// Sets the local hidden flag.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::StaleSurface`] if the surface is gone.
    pub fn set_hidden(&mut self, id: SurfaceId, hidden: bool) -> Result<()> {
        let idx = self.check(id)?;
        self.hidden[idx as usize] = hidden;
        self.dirty.mark_with(idx, dirty::VISIBILITY, &EagerPolicy);
        Ok(())
    }

    /// Sets the position relative to the parent.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::StaleSurface`] if the surface is gone.
    pub fn set_position(&mut self, id: SurfaceId, position: Point) -> Result<()> {
        let idx = self.check(id)?;
        self.position[idx as usize] = position;
        self.dirty.mark_with(idx, dirty::GEOMETRY, &EagerPolicy);
        Ok(())
    }

    /// Sets the local matrix.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::StaleSurface`] if the surface is gone.
    pub fn set_matrix(&mut self, id: SurfaceId, matrix: Affine) -> Result<()> {
        let idx = self.check(id)?;
        self.matrix[idx as usize] = matrix;
        self.dirty.mark_with(idx, dirty::GEOMETRY, &EagerPolicy);
        Ok(())
    }

    /// Sets the crop rectangle.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::StaleSurface`] if the surface is gone.
    pub fn set_crop(&mut self, id: SurfaceId, crop: Option<Rect>) -> Result<()> {
        let idx = self.check(id)?;
        self.crop[idx as usize] = crop;
        self.dirty.mark(idx, dirty::CROP);
        Ok(())
    }

    /// Sets the local alpha.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::StaleSurface`] if the surface is gone.
    pub fn set_alpha(&mut self, id: SurfaceId, alpha: f32) -> Result<()> {
        let idx = self.check(id)?;
        self.alpha[idx as usize] = alpha;
        self.dirty.mark_with(idx, dirty::ALPHA, &EagerPolicy);
        Ok(())
    }

    /// Sets the z-order among siblings.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::StaleSurface`] if the surface is gone.
    pub fn set_layer(&mut self, id: SurfaceId, z: i32) -> Result<()> {
        let idx = self.check(id)?;
        if self.z[idx as usize] != z {
            self.z[idx as usize] = z;
            self.traversal_dirty = true;
            self.dirty.mark(idx, dirty::TOPOLOGY);
        }
        Ok(())
    }

    /// Sets the buffer size.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::StaleSurface`] if the surface is gone.
    pub fn set_buffer_size(&mut self, id: SurfaceId, size: Size) -> Result<()> {
        let idx = self.check(id)?;
        self.buffer_size[idx as usize] = size;
        self.dirty.mark(idx, dirty::BUFFER);
        Ok(())
    }

    // -- Raw-index accessors for consumers of `FrameChanges` --
    //
    // These skip generation validation. Only use with indices that came from
    // `FrameChanges` or `traversal_order()`.

    /// Returns the computed world transform at raw slot `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx >= self.len`.
    #[must_use]
    pub fn world_transform_at(&self, idx: u32) -> Affine {
        assert!(
            idx < self.len,
            "slot index {idx} out of range (len {})",
            self.len
        );
        self.world_transform[idx as usize]
    }

    /// Returns the computed effective alpha at raw slot `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx >= self.len`.
    #[must_use]
    pub fn effective_alpha_at(&self, idx: u32) -> f32 {
        assert!(
            idx < self.len,
            "slot index {idx} out of range (len {})",
            self.len
        );
        self.effective_alpha[idx as usize]
    }

    /// Returns the name at raw slot `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx >= self.len`.
    #[must_use]
    pub fn name_at(&self, idx: u32) -> &str {
        assert!(
            idx < self.len,
            "slot index {idx} out of range (len {})",
            self.len
        );
        &self.name[idx as usize]
    }

    // -- Internal helpers --

    /// Validates `id` and returns its slot index.
    pub(crate) fn check(&self, id: SurfaceId) -> Result<u32> {
        if self.is_alive(id) {
            Ok(id.idx)
        } else {
            Err(Error::StaleSurface(id))
        }
    }

    pub(crate) fn id_at(&self, idx: u32) -> Option<SurfaceId> {
        (idx != INVALID).then(|| SurfaceId {
            idx,
            generation: self.generation[idx as usize],
        })
    }

    /// Whether slot `a` is slot `idx` or one of its ancestors.
    fn is_ancestor_or_self(&self, a: u32, mut idx: u32) -> bool {
        while idx != INVALID {
            if idx == a {
                return true;
            }
            idx = self.parent[idx as usize];
        }
        false
    }

    /// Appends `c` as the last child of `p`. `c` must be unparented.
    fn link_child(&mut self, p: u32, c: u32) {
        self.parent[c as usize] = p;
        self.prev_sibling[c as usize] = INVALID;
        self.next_sibling[c as usize] = INVALID;

        if self.first_child[p as usize] == INVALID {
            self.first_child[p as usize] = c;
        } else {
            let mut last = self.first_child[p as usize];
            while self.next_sibling[last as usize] != INVALID {
                last = self.next_sibling[last as usize];
            }
            self.next_sibling[last as usize] = c;
            self.prev_sibling[c as usize] = last;
        }

        let _ = self.dirty.add_dependency(c, p, dirty::GEOMETRY);
        let _ = self.dirty.add_dependency(c, p, dirty::ALPHA);
        let _ = self.dirty.add_dependency(c, p, dirty::VISIBILITY);

        self.mark_subtree_inherited_dirty(c);
        self.traversal_dirty = true;
        self.dirty.mark(p, dirty::TOPOLOGY);
    }

    /// Removes `idx` from its parent's child list without touching dirty state.
    fn unlink_from_parent(&mut self, idx: u32) {
        let p = self.parent[idx as usize];
        let prev = self.prev_sibling[idx as usize];
        let next = self.next_sibling[idx as usize];

        if prev != INVALID {
            self.next_sibling[prev as usize] = next;
        } else {
            self.first_child[p as usize] = next;
        }
        if next != INVALID {
            self.prev_sibling[next as usize] = prev;
        }

        self.parent[idx as usize] = INVALID;
        self.prev_sibling[idx as usize] = INVALID;
        self.next_sibling[idx as usize] = INVALID;
    }

    fn remove_inherited_dependencies(&mut self, c: u32, p: u32) {
        self.dirty.remove_dependency(c, p, dirty::GEOMETRY);
        self.dirty.remove_dependency(c, p, dirty::ALPHA);
        self.dirty.remove_dependency(c, p, dirty::VISIBILITY);
    }

    /// Marks the subtree rooted at `idx` dirty for inherited channels.
    fn mark_subtree_inherited_dirty(&mut self, idx: u32) {
        self.dirty.mark_with(idx, dirty::GEOMETRY, &EagerPolicy);
        self.dirty.mark_with(idx, dirty::ALPHA, &EagerPolicy);
        self.dirty.mark_with(idx, dirty::VISIBILITY, &EagerPolicy);
    }

    /// Tears down slot `idx`: orphans its children, detaches it, and frees
    /// the slot under a new generation.
    fn destroy(&mut self, idx: u32) {
        while self.first_child[idx as usize] != INVALID {
            let c = self.first_child[idx as usize];
            self.unlink_from_parent(c);
            self.remove_inherited_dependencies(c, idx);
            self.mark_subtree_inherited_dirty(c);
            self.dirty.mark(c, dirty::TOPOLOGY);
        }
        let p = self.parent[idx as usize];
        if p != INVALID {
            self.unlink_from_parent(idx);
            self.dirty.mark(p, dirty::TOPOLOGY);
        }

        self.dirty.remove_key(idx);
        self.generation[idx as usize] = self.generation[idx as usize].wrapping_add(1);
        self.alive[idx as usize] = false;
        self.free_list.push(idx);
        self.traversal_dirty = true;
        // A surface created and destroyed between evaluations was never
        // reported, so it is dropped from both lifecycle lists.
        if let Some(pos) = self.pending_added.iter().position(|&added| added == idx) {
            self.pending_added.swap_remove(pos);
        } else {
            self.pending_removed.push(idx);
        }
    }
}
