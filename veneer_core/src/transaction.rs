// Copyright 2026 the Veneer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Batched surface mutations.
//!
//! A [`Transaction`] records property changes against surface handles and
//! hands them to the compositor in one atomic [`apply`](Transaction::apply).
//! Each record call checks its handle immediately: a released handle fails
//! at the call, not at apply time. Recording also takes a compositor
//! reference on the target, so a change recorded while the handle was valid
//! is still applied if the handle is released before `apply`.

use std::collections::BTreeSet;

use kurbo::{Affine, Point, Rect, Size};

use crate::client::Client;
use crate::compositor::{Change, Mutation};
use crate::error::{Error, Operation, Result};
use crate::scene::SurfaceId;
use crate::surface::SurfaceControl;
use crate::trace::TransactionAppliedEvent;

/// Summary of one successful [`Transaction::apply`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ApplyReceipt {
    /// Per-client transaction id.
    pub transaction: u64,
    /// Number of mutations applied.
    pub mutations: u32,
    /// Number of distinct surfaces changed.
    pub surfaces: u32,
}

/// An ordered batch of surface mutations.
///
/// Setters return `Result<&mut Self>` so calls chain with `?`. Dropping a
/// transaction discards its mutations and returns its compositor
/// references.
#[derive(Debug)]
#[must_use = "mutations are discarded unless the transaction is applied"]
pub struct Transaction {
    client: Client,
    id: u64,
    mutations: Vec<Mutation>,
    retained: Vec<SurfaceId>,
}

impl Transaction {
    pub(crate) fn new(client: &Client) -> Self {
        Self {
            client: client.clone(),
            id: client.next_transaction_id(),
            mutations: Vec::new(),
            retained: Vec::new(),
        }
    }

    /// Per-client id of the batch currently being recorded.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Number of recorded mutations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    /// Whether nothing is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    /// The recorded mutations, in order.
    #[must_use]
    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    // -- Recording --

    /// Shows or hides the surface.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Released`] if the handle was released.
    pub fn set_visibility(&mut self, sc: &SurfaceControl, visible: bool) -> Result<&mut Self> {
        self.push(sc, Operation::SetVisibility, Change::Visibility(visible))
    }

    /// Shorthand for `set_visibility(sc, true)`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Released`] if the handle was released.
    pub fn show(&mut self, sc: &SurfaceControl) -> Result<&mut Self> {
        self.set_visibility(sc, true)
    }

    /// Shorthand for `set_visibility(sc, false)`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Released`] if the handle was released.
    pub fn hide(&mut self, sc: &SurfaceControl) -> Result<&mut Self> {
        self.set_visibility(sc, false)
    }

    /// Sets the position relative to the parent.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Released`] if the handle was released, or
    /// [`Error::InvalidValue`] for a non-finite coordinate.
    pub fn set_position(&mut self, sc: &SurfaceControl, position: Point) -> Result<&mut Self> {
        finite("x", position.x)?;
        finite("y", position.y)?;
        self.push(sc, Operation::SetPosition, Change::Position(position))
    }

    /// Sets the local matrix, applied after the position.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Released`] if the handle was released, or
    /// [`Error::InvalidValue`] for a non-finite coefficient.
    pub fn set_matrix(&mut self, sc: &SurfaceControl, matrix: Affine) -> Result<&mut Self> {
        for c in matrix.as_coeffs() {
            finite("matrix coefficient", c)?;
        }
        self.push(sc, Operation::SetMatrix, Change::Matrix(matrix))
    }

    /// Sets or clears the crop rectangle.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Released`] if the handle was released, or
    /// [`Error::InvalidValue`] for a non-finite edge.
    pub fn set_crop(&mut self, sc: &SurfaceControl, crop: Option<Rect>) -> Result<&mut Self> {
        if let Some(r) = crop {
            for edge in [r.x0, r.y0, r.x1, r.y1] {
                finite("crop edge", edge)?;
            }
        }
        self.push(sc, Operation::SetCrop, Change::Crop(crop))
    }

    /// Sets the local alpha, clamped to `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Released`] if the handle was released, or
    /// [`Error::InvalidValue`] for NaN or infinity.
    pub fn set_alpha(&mut self, sc: &SurfaceControl, alpha: f32) -> Result<&mut Self> {
        finite("alpha", f64::from(alpha))?;
        self.push(sc, Operation::SetAlpha, Change::Alpha(alpha.clamp(0.0, 1.0)))
    }

    /// Sets the z-order among siblings.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Released`] if the handle was released.
    pub fn set_layer(&mut self, sc: &SurfaceControl, z: i32) -> Result<&mut Self> {
        self.push(sc, Operation::SetLayer, Change::Layer(z))
    }

    /// Sets the buffer size.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Released`] if the handle was released, or
    /// [`Error::InvalidValue`] for a negative or non-finite dimension.
    pub fn set_buffer_size(&mut self, sc: &SurfaceControl, size: Size) -> Result<&mut Self> {
        for (what, value) in [("buffer width", size.width), ("buffer height", size.height)] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::InvalidValue { what, value });
            }
        }
        self.push(sc, Operation::SetBufferSize, Change::BufferSize(size))
    }

    /// Moves the surface under `parent`, or to the root for `None`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Released`] if either handle was released, or
    /// [`Error::ReparentCycle`] when reparenting a surface under itself.
    /// Cycles through other surfaces are detected at [`apply`](Self::apply).
    pub fn reparent(
        &mut self,
        sc: &SurfaceControl,
        parent: Option<&SurfaceControl>,
    ) -> Result<&mut Self> {
        let Some(parent) = parent else {
            return self.push(sc, Operation::Reparent, Change::Reparent(None));
        };
        if core::ptr::eq(sc, parent) {
            return sc.with_live(Operation::Reparent, |id| {
                Err(Error::ReparentCycle {
                    child: id,
                    parent: id,
                })
            });
        }
        // Both handles stay locked until the references are taken.
        let (target, parent_id) = sc.with_live(Operation::Reparent, |target| {
            parent.with_live(Operation::Reparent, |parent_id| {
                self.check_compositor(sc, target)?;
                self.check_compositor(parent, parent_id)?;
                if parent_id == target {
                    return Err(Error::ReparentCycle {
                        child: target,
                        parent: parent_id,
                    });
                }
                let target_acquired = self.acquire_once(target)?;
                if let Err(err) = self.acquire_once(parent_id) {
                    if target_acquired {
                        self.retained.pop();
                        release_ref(&self.client, target);
                    }
                    return Err(err);
                }
                Ok((target, parent_id))
            })
        })?;
        self.mutations.push(Mutation {
            target,
            change: Change::Reparent(Some(parent_id)),
        });
        Ok(self)
    }

    /// Moves every mutation of `other` to the end of this transaction,
    /// leaving `other` empty.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::ForeignSurface`] if `other` targets a different
    /// compositor. Neither transaction changes in that case.
    pub fn merge(&mut self, other: &mut Self) -> Result<&mut Self> {
        let expected = self.client.compositor_id();
        let found = other.client.compositor_id();
        if expected != found {
            if let Some(m) = other.mutations.first() {
                return Err(Error::ForeignSurface {
                    surface: m.target,
                    expected,
                    found,
                });
            }
            return Ok(self);
        }
        self.mutations.append(&mut other.mutations);
        for id in other.retained.drain(..) {
            if self.retained.contains(&id) {
                release_ref(&self.client, id);
            } else {
                self.retained.push(id);
            }
        }
        Ok(self)
    }

    /// Discards every recorded mutation.
    pub fn clear(&mut self) -> &mut Self {
        self.mutations.clear();
        self.release_retained();
        self
    }

    /// Applies every recorded mutation atomically and empties the
    /// transaction for reuse.
    ///
    /// # Errors
    ///
    /// Fails if the compositor rejects the batch, for example because a
    /// reparent would create a cycle. Nothing is applied and the mutations
    /// stay recorded.
    pub fn apply(&mut self) -> Result<ApplyReceipt> {
        self.client.compositor().apply(&self.mutations)?;

        let surfaces: BTreeSet<SurfaceId> = self.mutations.iter().map(|m| m.target).collect();
        let receipt = ApplyReceipt {
            transaction: self.id,
            mutations: saturating_u32(self.mutations.len()),
            surfaces: saturating_u32(surfaces.len()),
        };
        self.mutations.clear();
        self.release_retained();
        self.id = self.client.next_transaction_id();

        tracing::trace!(
            transaction = receipt.transaction,
            mutations = receipt.mutations,
            surfaces = receipt.surfaces,
            "transaction applied"
        );
        let e = TransactionAppliedEvent {
            timestamp_ns: self.client.now_ns(),
            transaction: receipt.transaction,
            mutations: receipt.mutations,
            surfaces: receipt.surfaces,
        };
        self.client.emit(|sink| sink.on_transaction_applied(&e));
        Ok(receipt)
    }

    fn push(&mut self, sc: &SurfaceControl, op: Operation, change: Change) -> Result<&mut Self> {
        let target = self.retain(sc, op)?;
        self.mutations.push(Mutation { target, change });
        Ok(self)
    }

    /// Validates `sc` and makes sure this transaction holds a reference on
    /// its surface.
    fn retain(&mut self, sc: &SurfaceControl, op: Operation) -> Result<SurfaceId> {
        sc.with_live(op, |id| {
            self.check_compositor(sc, id)?;
            self.acquire_once(id)?;
            Ok(id)
        })
    }

    fn check_compositor(&self, sc: &SurfaceControl, id: SurfaceId) -> Result<()> {
        let expected = self.client.compositor_id();
        let found = sc.client().compositor_id();
        if expected == found {
            Ok(())
        } else {
            Err(Error::ForeignSurface {
                surface: id,
                expected,
                found,
            })
        }
    }

    /// Takes a reference on `id` unless one is already held. Returns
    /// whether a new reference was taken.
    fn acquire_once(&mut self, id: SurfaceId) -> Result<bool> {
        if self.retained.contains(&id) {
            return Ok(false);
        }
        self.client.compositor().acquire(id)?;
        self.retained.push(id);
        Ok(true)
    }

    fn release_retained(&mut self) {
        for id in self.retained.drain(..) {
            release_ref(&self.client, id);
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        self.release_retained();
    }
}

fn release_ref(client: &Client, id: SurfaceId) {
    if let Err(err) = client.compositor().release(id) {
        tracing::warn!(surface = ?id, %err, "dropping transaction reference failed");
    }
}

fn finite(what: &'static str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(Error::InvalidValue { what, value })
    }
}

fn saturating_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::compositor::LocalCompositor;
    use crate::config::ClientConfig;
    use crate::parcel::Parcel;

    fn client() -> (Client, Arc<LocalCompositor>) {
        Client::with_local_compositor(ClientConfig::default().with_name("tests"))
    }

    fn build(client: &Client, name: &str) -> SurfaceControl {
        client
            .surface_builder()
            .set_container_layer()
            .set_name(name)
            .set_callsite("transaction::tests")
            .build()
            .unwrap()
    }

    #[test]
    fn use_valid_surface() {
        let (client, compositor) = client();
        let sc = build(&client, "valid");
        let mut t = client.transaction();
        t.set_visibility(&sc, false).unwrap();
        let receipt = t.apply().unwrap();
        assert_eq!(receipt.mutations, 1);
        assert_eq!(receipt.surfaces, 1);
        assert!(compositor.snapshot(sc.id().unwrap()).unwrap().hidden);
        assert!(t.is_empty());
    }

    #[test]
    fn use_invalid_surface() {
        let (client, _) = client();
        let sc = build(&client, "invalid");
        sc.release();
        let mut t = client.transaction();
        let err = t.set_visibility(&sc, false).unwrap_err();
        assert!(matches!(
            err,
            Error::Released {
                operation: Operation::SetVisibility,
                cause: None,
                ..
            }
        ));
        assert!(err.source().is_none());
        assert!(t.is_empty());
    }

    #[test]
    fn use_invalid_surface_debug_enabled_reports_release_site() {
        let (client, _) = client();
        let _debug = client.debug_usage_scope(true);
        let sc = build(&client, "invalid");
        let line = line!() + 1;
        sc.release();

        let mut t = client.transaction();
        let err = t.set_visibility(&sc, false).unwrap_err();
        let cause = err.release_cause().unwrap();
        assert_eq!(cause.location().file(), file!());
        assert_eq!(cause.location().line(), line);
        assert_eq!(cause.callsite(), Some("transaction::tests"));
        assert!(err.source().is_some());
    }

    #[test]
    fn cause_requires_debug_mode_at_release() {
        let (client, _) = client();
        let sc = build(&client, "released-quietly");
        sc.release();
        client.set_debug_usage_after_release(true);
        let err = client.transaction().show(&sc).unwrap_err();
        assert!(err.is_released());
        assert!(err.release_cause().is_none());
    }

    #[test]
    fn cause_requires_debug_mode_at_failure() {
        let (client, _) = client();
        let sc = build(&client, "a");
        {
            let _debug = client.debug_usage_scope(true);
            sc.release();
        }
        let err = client.transaction().show(&sc).unwrap_err();
        assert!(err.is_released());
        assert!(err.release_cause().is_none());
    }

    #[test]
    fn every_operation_rejects_released_handle() {
        let (client, compositor) = client();
        let sc = build(&client, "gone");
        let other = build(&client, "other");
        sc.release();
        let mut t = client.transaction();
        let results = [
            t.show(&sc).map(|_| ()),
            t.hide(&sc).map(|_| ()),
            t.set_position(&sc, Point::new(1.0, 2.0)).map(|_| ()),
            t.set_matrix(&sc, Affine::scale(2.0)).map(|_| ()),
            t.set_crop(&sc, None).map(|_| ()),
            t.set_alpha(&sc, 0.5).map(|_| ()),
            t.set_layer(&sc, 3).map(|_| ()),
            t.set_buffer_size(&sc, Size::new(4.0, 4.0)).map(|_| ()),
            t.reparent(&sc, None).map(|_| ()),
            t.reparent(&other, Some(&sc)).map(|_| ()),
        ];
        for r in results {
            assert!(r.unwrap_err().is_released());
        }
        assert!(t.is_empty());
        assert_eq!(compositor.snapshot(other.id().unwrap()).unwrap().refs, 1);
    }

    #[test]
    fn failed_reparent_takes_no_reference() {
        let (client, compositor) = client();
        let live = build(&client, "live");
        let gone = build(&client, "gone");
        let live_id = live.id().unwrap();
        gone.release();

        let mut t = client.transaction();
        assert!(t.reparent(&live, Some(&gone)).unwrap_err().is_released());
        assert!(t.is_empty());
        assert_eq!(compositor.snapshot(live_id).unwrap().refs, 1);

        live.release();
        assert!(!compositor.is_alive(live_id));
    }

    #[test]
    fn reparent_under_alias_of_self_takes_no_reference() {
        let (client, compositor) = client();
        let sc = build(&client, "aliased");
        let id = sc.id().unwrap();
        let mut parcel = Parcel::new();
        sc.write_to_parcel(&mut parcel).unwrap();
        let alias = SurfaceControl::read_from_parcel(&client, &mut parcel).unwrap();

        let mut t = client.transaction();
        assert!(matches!(
            t.reparent(&sc, Some(&alias)).unwrap_err(),
            Error::ReparentCycle { .. }
        ));
        assert!(t.is_empty());
        assert_eq!(compositor.snapshot(id).unwrap().refs, 2);
    }

    #[test]
    fn failed_reparent_keeps_earlier_reference() {
        let (client, compositor) = client();
        let sc = build(&client, "a");
        let gone = build(&client, "gone");
        let id = sc.id().unwrap();
        gone.release();

        let mut t = client.transaction();
        t.show(&sc).unwrap();
        assert!(t.reparent(&sc, Some(&gone)).is_err());
        assert_eq!(t.len(), 1);
        assert_eq!(compositor.snapshot(id).unwrap().refs, 2);
        drop(t);
        assert_eq!(compositor.snapshot(id).unwrap().refs, 1);
    }

    #[test]
    fn recorded_change_survives_release_before_apply() {
        let (client, compositor) = client();
        let sc = build(&client, "short-lived");
        let id = sc.id().unwrap();
        let mut t = client.transaction();
        t.set_alpha(&sc, 0.25).unwrap();
        sc.release();
        assert!(compositor.is_alive(id));

        t.apply().unwrap();
        // The transaction held the last reference.
        assert!(!compositor.is_alive(id));
    }

    #[test]
    fn transaction_holds_one_reference_per_surface() {
        let (client, compositor) = client();
        let sc = build(&client, "a");
        let id = sc.id().unwrap();
        let mut t = client.transaction();
        t.show(&sc).unwrap().set_alpha(&sc, 0.5).unwrap().set_layer(&sc, 2).unwrap();
        assert_eq!(compositor.snapshot(id).unwrap().refs, 2);
        drop(t);
        assert_eq!(compositor.snapshot(id).unwrap().refs, 1);
    }

    #[test]
    fn chained_setters_apply_in_order() {
        let (client, compositor) = client();
        let sc = build(&client, "a");
        let mut t = client.transaction();
        t.set_alpha(&sc, 0.2)
            .unwrap()
            .set_alpha(&sc, 2.0)
            .unwrap()
            .set_position(&sc, Point::new(10.0, 20.0))
            .unwrap()
            .set_crop(&sc, Some(Rect::new(0.0, 0.0, 5.0, 5.0)))
            .unwrap();
        assert_eq!(t.len(), 4);
        t.apply().unwrap();

        let snap = compositor.snapshot(sc.id().unwrap()).unwrap();
        assert_eq!(snap.alpha, 1.0);
        assert_eq!(snap.position, Point::new(10.0, 20.0));
        assert_eq!(snap.crop, Some(Rect::new(0.0, 0.0, 5.0, 5.0)));
    }

    #[test]
    fn non_finite_values_are_rejected() {
        let (client, _) = client();
        let sc = build(&client, "a");
        let mut t = client.transaction();
        assert!(matches!(
            t.set_alpha(&sc, f32::NAN).unwrap_err(),
            Error::InvalidValue { what: "alpha", .. }
        ));
        assert!(t.set_position(&sc, Point::new(f64::INFINITY, 0.0)).is_err());
        assert!(t.set_buffer_size(&sc, Size::new(-1.0, 1.0)).is_err());
        assert!(t.is_empty());
    }

    #[test]
    fn reparent_moves_surface() {
        let (client, compositor) = client();
        let parent = build(&client, "parent");
        let child = build(&client, "child");
        let mut t = client.transaction();
        t.reparent(&child, Some(&parent)).unwrap();
        t.apply().unwrap();
        assert_eq!(
            compositor.snapshot(child.id().unwrap()).unwrap().parent,
            Some(parent.id().unwrap())
        );

        t.reparent(&child, None).unwrap().apply().unwrap();
        assert_eq!(compositor.snapshot(child.id().unwrap()).unwrap().parent, None);
    }

    #[test]
    fn reparent_under_self_is_rejected() {
        let (client, _) = client();
        let sc = build(&client, "loop");
        let err = client.transaction().reparent(&sc, Some(&sc)).unwrap_err();
        assert!(matches!(err, Error::ReparentCycle { .. }));
    }

    #[test]
    fn failed_apply_keeps_mutations() {
        let (client, compositor) = client();
        let a = build(&client, "a");
        let b = build(&client, "b");
        let mut t = client.transaction();
        t.set_layer(&a, 7)
            .unwrap()
            .reparent(&a, Some(&b))
            .unwrap()
            .reparent(&b, Some(&a))
            .unwrap();
        assert!(matches!(t.apply().unwrap_err(), Error::ReparentCycle { .. }));
        assert_eq!(t.len(), 3);
        assert_eq!(compositor.snapshot(a.id().unwrap()).unwrap().z, 0);

        t.clear();
        assert!(t.is_empty());
        assert_eq!(compositor.snapshot(a.id().unwrap()).unwrap().refs, 1);
    }

    #[test]
    fn merge_moves_mutations_and_references() {
        let (client, compositor) = client();
        let a = build(&client, "a");
        let b = build(&client, "b");
        let mut first = client.transaction();
        first.set_layer(&a, 1).unwrap();
        let mut second = client.transaction();
        second.set_layer(&a, 2).unwrap().set_layer(&b, 3).unwrap();

        first.merge(&mut second).unwrap();
        assert!(second.is_empty());
        assert_eq!(first.len(), 3);
        assert_eq!(compositor.snapshot(a.id().unwrap()).unwrap().refs, 2);
        assert_eq!(compositor.snapshot(b.id().unwrap()).unwrap().refs, 2);

        let receipt = first.apply().unwrap();
        assert_eq!(receipt.surfaces, 2);
        assert_eq!(compositor.snapshot(a.id().unwrap()).unwrap().z, 2);
        assert_eq!(compositor.snapshot(a.id().unwrap()).unwrap().refs, 1);
    }

    #[test]
    fn merge_rejects_other_compositor() {
        let (a, _) = client();
        let (b, _) = client();
        let sa = build(&a, "a");
        let sb = build(&b, "b");
        let mut ta = a.transaction();
        ta.show(&sa).unwrap();
        let mut tb = b.transaction();
        tb.show(&sb).unwrap();
        assert!(matches!(
            ta.merge(&mut tb).unwrap_err(),
            Error::ForeignSurface { .. }
        ));
        assert_eq!(ta.len(), 1);
        assert_eq!(tb.len(), 1);
    }

    #[test]
    fn handle_from_other_compositor_is_rejected() {
        let (a, _) = client();
        let (b, _) = client();
        let foreign = build(&b, "foreign");
        let err = a.transaction().show(&foreign).unwrap_err();
        assert!(matches!(err, Error::ForeignSurface { .. }));
    }

    #[test]
    fn receipt_ids_increase() {
        let (client, _) = client();
        let sc = build(&client, "a");
        let mut t = client.transaction();
        let first = t.show(&sc).unwrap().apply().unwrap().transaction;
        let second = t.hide(&sc).unwrap().apply().unwrap().transaction;
        assert!(second > first);
    }

    #[test]
    fn release_racing_record_is_all_or_nothing() {
        for _ in 0..50 {
            let (client, compositor) = client();
            let sc = build(&client, "raced");
            let id = sc.id().unwrap();
            let mut t = client.transaction();
            let recorded = thread::scope(|scope| {
                scope.spawn(|| sc.release());
                t.set_alpha(&sc, 0.5).is_ok()
            });
            assert!(!sc.is_valid());
            if recorded {
                assert_eq!(t.len(), 1);
                assert!(compositor.is_alive(id));
                t.apply().unwrap();
            } else {
                assert!(t.is_empty());
            }
            assert!(!compositor.is_alive(id));
        }
    }
}
