// Copyright 2026 the Veneer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tree traversal utilities.

use super::id::{INVALID, SurfaceId};
use super::store::SurfaceStore;

/// An iterator over the direct children of a surface, in insertion order.
///
/// Created by [`SurfaceStore::children`].
#[derive(Debug)]
pub struct Children<'a> {
    store: &'a SurfaceStore,
    current: u32,
}

impl<'a> Children<'a> {
    pub(crate) fn new(store: &'a SurfaceStore, first: u32) -> Self {
        Self {
            store,
            current: first,
        }
    }
}

impl Iterator for Children<'_> {
    type Item = SurfaceId;

    fn next(&mut self) -> Option<SurfaceId> {
        let id = self.store.id_at(self.current)?;
        self.current = self.store.next_sibling[self.current as usize];
        Some(id)
    }
}

impl SurfaceStore {
    /// Rebuilds the depth-first pre-order traversal of all live surfaces.
    ///
    /// Roots and siblings are visited in ascending z-order; equal z keeps
    /// insertion (or slot) order.
    pub(crate) fn rebuild_traversal_order(&mut self) {
        self.traversal_order.clear();
        let mut roots: Vec<u32> = (0..self.len)
            .filter(|&idx| self.alive[idx as usize] && self.parent[idx as usize] == INVALID)
            .collect();
        roots.sort_by_key(|&idx| self.z[idx as usize]);
        for idx in roots {
            self.dfs_collect(idx);
        }
    }

    fn dfs_collect(&mut self, idx: u32) {
        self.traversal_order.push(idx);
        let mut kids = Vec::new();
        let mut child = self.first_child[idx as usize];
        while child != INVALID {
            kids.push(child);
            child = self.next_sibling[child as usize];
        }
        kids.sort_by_key(|&c| self.z[c as usize]);
        for c in kids {
            self.dfs_collect(c);
        }
    }
}
