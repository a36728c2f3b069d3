// Copyright 2026 the Veneer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Client-side surface handles.
//!
//! A [`SurfaceControl`] is valid from [`SurfaceBuilder::build`] (or
//! [`SurfaceControl::read_from_parcel`]) until its first
//! [`release`](SurfaceControl::release) or drop. While valid it holds one
//! compositor reference on its surface. Once released, every operation that
//! needs the surface fails with [`Error::Released`]; there is no way back to
//! the valid state.

use std::panic::Location;
use std::sync::Arc;

use kurbo::Size;
use parking_lot::RwLock;

use crate::client::{Client, HandleInfo};
use crate::compositor::CreatedSurface;
use crate::error::{Error, Operation, ParcelError, ReleaseRecord, Result};
use crate::parcel::Parcel;
use crate::scene::{CompositorId, Rotation, SurfaceDesc, SurfaceId, SurfaceKind};
use crate::trace::{HandleOrigin, ReleaseKind, SurfaceCreatedEvent, SurfaceReleasedEvent};

/// Tag byte that starts a parcelled surface.
const PARCEL_TAG: u8 = 0x53;

/// Configures and creates a [`SurfaceControl`].
///
/// Obtained from [`Client::surface_builder`]. Only the name is required.
#[derive(Debug)]
#[must_use = "a builder does nothing until `build` is called"]
pub struct SurfaceBuilder<'a> {
    client: &'a Client,
    name: Option<String>,
    callsite: Option<String>,
    kind: SurfaceKind,
    parent: Option<&'a SurfaceControl>,
    buffer_size: Size,
    hidden: bool,
}

impl<'a> SurfaceBuilder<'a> {
    pub(crate) fn new(client: &'a Client) -> Self {
        Self {
            client,
            name: None,
            callsite: None,
            kind: SurfaceKind::Buffer,
            parent: None,
            buffer_size: Size::ZERO,
            hidden: false,
        }
    }

    /// Sets the debug name. Required.
    pub fn set_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Tags the surface with the code path that created it.
    ///
    /// Shows up in release records, traces and leak reports.
    pub fn set_callsite(mut self, callsite: impl Into<String>) -> Self {
        self.callsite = Some(callsite.into());
        self
    }

    /// Makes this a container layer with no content of its own.
    pub fn set_container_layer(mut self) -> Self {
        self.kind = SurfaceKind::Container;
        self
    }

    /// Makes this an effect layer.
    pub fn set_effect_layer(mut self) -> Self {
        self.kind = SurfaceKind::Effect;
        self
    }

    /// Sets the initial buffer size.
    pub fn set_buffer_size(mut self, width: f64, height: f64) -> Self {
        self.buffer_size = Size::new(width, height);
        self
    }

    /// Creates the surface under `parent` instead of at the root.
    pub fn set_parent(mut self, parent: Option<&'a SurfaceControl>) -> Self {
        self.parent = parent;
        self
    }

    /// Creates the surface hidden.
    pub fn set_hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    /// Creates the surface and returns a valid handle to it.
    ///
    /// # Errors
    ///
    /// - [`Error::MissingName`] if no name was set.
    /// - [`Error::InvalidValue`] for a negative or non-finite buffer size.
    /// - [`Error::Released`] if the parent handle was released.
    /// - [`Error::ForeignSurface`] if the parent belongs to another compositor.
    #[track_caller]
    pub fn build(self) -> Result<SurfaceControl> {
        let created_at = Location::caller();
        let name = self.name.ok_or(Error::MissingName)?;
        for (what, value) in [
            ("buffer width", self.buffer_size.width),
            ("buffer height", self.buffer_size.height),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::InvalidValue { what, value });
            }
        }

        let mut desc = SurfaceDesc::new(name, self.kind);
        desc.buffer_size = self.buffer_size;
        desc.hidden = self.hidden;

        let client = self.client;
        let created = match self.parent {
            Some(parent) => parent.with_live(Operation::SetParent, |parent_id| {
                check_compositor(client, parent_id, parent.client.compositor_id())?;
                desc.parent = Some(parent_id);
                client.compositor().create_surface(&desc)
            })?,
            None => client.compositor().create_surface(&desc)?,
        };

        Ok(SurfaceControl::register(
            client,
            created,
            desc.name.into(),
            self.callsite.map(Into::into),
            self.kind,
            HandleOrigin::Built,
            created_at,
        ))
    }
}

fn check_compositor(client: &Client, surface: SurfaceId, found: CompositorId) -> Result<()> {
    let expected = client.compositor_id();
    if found == expected {
        Ok(())
    } else {
        Err(Error::ForeignSurface {
            surface,
            expected,
            found,
        })
    }
}

enum HandleState {
    Live(SurfaceId),
    Released(Option<Arc<ReleaseRecord>>),
}

/// A client handle to one compositor surface.
///
/// Handles are `Send + Sync`; any thread may use or release one. Release is
/// idempotent, and dropping a handle that is still valid releases it.
pub struct SurfaceControl {
    client: Client,
    serial: u64,
    name: Arc<str>,
    callsite: Option<Arc<str>>,
    kind: SurfaceKind,
    layer_id: u32,
    state: RwLock<HandleState>,
}

impl core::fmt::Debug for SurfaceControl {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SurfaceControl")
            .field("serial", &self.serial)
            .field("name", &self.name)
            .field("layer_id", &self.layer_id)
            .field("valid", &self.is_valid())
            .finish_non_exhaustive()
    }
}

impl SurfaceControl {
    fn register(
        client: &Client,
        created: CreatedSurface,
        name: Arc<str>,
        callsite: Option<Arc<str>>,
        kind: SurfaceKind,
        origin: HandleOrigin,
        created_at: &'static Location<'static>,
    ) -> Self {
        let serial = client.next_serial();
        client.register(HandleInfo {
            serial,
            name: Arc::clone(&name),
            callsite: callsite.clone(),
            surface: created.id,
            layer_id: created.layer_id,
            kind,
            origin,
            created_at,
        });
        tracing::debug!(
            surface = %name,
            serial,
            layer_id = created.layer_id,
            kind = kind.as_str(),
            ?origin,
            "surface handle created"
        );
        let e = SurfaceCreatedEvent {
            timestamp_ns: client.now_ns(),
            serial,
            surface: created.id,
            layer_id: created.layer_id,
            kind,
            origin,
            name: &name,
            callsite: callsite.as_deref(),
        };
        client.emit(|sink| sink.on_surface_created(&e));
        Self {
            client: client.clone(),
            serial,
            name,
            callsite,
            kind,
            layer_id: created.layer_id,
            state: RwLock::new(HandleState::Live(created.id)),
        }
    }

    /// Debug name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Callsite tag, if one was set.
    #[must_use]
    pub fn callsite(&self) -> Option<&str> {
        self.callsite.as_deref()
    }

    /// Per-client handle serial.
    #[must_use]
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// What the surface is for.
    #[must_use]
    pub fn kind(&self) -> SurfaceKind {
        self.kind
    }

    /// Compositor layer id. Remains readable after release.
    #[must_use]
    pub fn layer_id(&self) -> u32 {
        self.layer_id
    }

    /// The client this handle belongs to.
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Whether the handle has not been released.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(*self.state.read(), HandleState::Live(_))
    }

    /// Compositor id of the surface.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Released`] once the handle is released.
    pub fn id(&self) -> Result<SurfaceId> {
        self.with_live(Operation::QueryId, Ok)
    }

    /// Current transform hint for the surface's buffers.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Released`] once the handle is released.
    pub fn transform_hint(&self) -> Result<Rotation> {
        self.with_live(Operation::QueryTransformHint, |id| {
            self.client.compositor().transform_hint(id)
        })
    }

    /// Releases the handle. Returns `false` if it was already released.
    ///
    /// The compositor surface is destroyed once no handle or pending
    /// transaction references it. With debug-usage-after-release mode on,
    /// the caller's location is recorded and reported by later misuse.
    #[track_caller]
    pub fn release(&self) -> bool {
        let location = Location::caller();
        let mut state = self.state.write();
        let HandleState::Live(id) = *state else {
            tracing::debug!(surface = %self.name, "release of released surface ignored");
            return false;
        };
        let record = self
            .client
            .capture_release(&self.name, self.callsite.as_ref(), location);
        let record_captured = record.is_some();
        *state = HandleState::Released(record);
        drop(state);
        self.drop_surface_ref(id, ReleaseKind::Explicit, record_captured);
        true
    }

    /// Serializes the handle so another client of the same compositor can
    /// read it back.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Released`] once the handle is released. Nothing
    /// is written in that case.
    pub fn write_to_parcel(&self, parcel: &mut Parcel) -> Result<()> {
        self.with_live(Operation::WriteToParcel, |id| {
            let mut record = Parcel::new();
            record.write_u8(PARCEL_TAG);
            record.write_u64(self.client.compositor_id().0);
            record.write_u32(id.index());
            record.write_u32(id.generation());
            record.write_u32(self.layer_id);
            record.write_u8(kind_to_u8(self.kind));
            record.write_str(&self.name)?;
            record.write_option_str(self.callsite.as_deref())?;
            parcel.append(&record);
            Ok(())
        })
    }

    /// Reads a handle written by [`write_to_parcel`](Self::write_to_parcel)
    /// and takes a new compositor reference for it.
    ///
    /// # Errors
    ///
    /// - [`Error::Parcel`] for malformed data.
    /// - [`Error::ForeignSurface`] if the parcel names another compositor.
    /// - [`Error::StaleSurface`] if the surface no longer exists.
    #[track_caller]
    pub fn read_from_parcel(client: &Client, parcel: &mut Parcel) -> Result<Self> {
        let created_at = Location::caller();
        let tag = parcel.read_u8()?;
        if tag != PARCEL_TAG {
            return Err(ParcelError::BadTag(tag).into());
        }
        let compositor = CompositorId(parcel.read_u64()?);
        let id = SurfaceId::from_raw(parcel.read_u32()?, parcel.read_u32()?);
        let layer_id = parcel.read_u32()?;
        let kind = kind_from_u8(parcel.read_u8()?)?;
        let name = parcel.read_str()?;
        let callsite = parcel.read_option_str()?;

        check_compositor(client, id, compositor)?;
        client.compositor().acquire(id)?;
        Ok(Self::register(
            client,
            CreatedSurface { id, layer_id },
            name.into(),
            callsite.map(Into::into),
            kind,
            HandleOrigin::Unparcelled,
            created_at,
        ))
    }

    /// Runs `f` with the surface id while holding the handle state, so a
    /// concurrent release waits until `f` returns.
    pub(crate) fn with_live<R>(
        &self,
        operation: Operation,
        f: impl FnOnce(SurfaceId) -> Result<R>,
    ) -> Result<R> {
        let state = self.state.read();
        match &*state {
            HandleState::Live(id) => f(*id),
            HandleState::Released(record) => Err(self.client.released_error(
                self.serial,
                &self.name,
                operation,
                record.as_ref(),
            )),
        }
    }

    fn drop_surface_ref(&self, id: SurfaceId, kind: ReleaseKind, record_captured: bool) {
        let destroyed = match self.client.compositor().release(id) {
            Ok(destroyed) => destroyed,
            Err(err) => {
                tracing::warn!(surface = %self.name, %err, "compositor release failed");
                false
            }
        };
        self.client.unregister(self.serial);
        tracing::debug!(
            surface = %self.name,
            serial = self.serial,
            ?kind,
            destroyed,
            "surface handle released"
        );
        let e = SurfaceReleasedEvent {
            timestamp_ns: self.client.now_ns(),
            serial: self.serial,
            surface: id,
            kind,
            record_captured,
            destroyed,
            name: &self.name,
        };
        self.client.emit(|sink| sink.on_surface_released(&e));
    }
}

impl Drop for SurfaceControl {
    fn drop(&mut self) {
        if let HandleState::Live(id) = *self.state.get_mut() {
            self.drop_surface_ref(id, ReleaseKind::Dropped, false);
        }
    }
}

fn kind_to_u8(kind: SurfaceKind) -> u8 {
    match kind {
        SurfaceKind::Buffer => 0,
        SurfaceKind::Container => 1,
        SurfaceKind::Effect => 2,
    }
}

fn kind_from_u8(v: u8) -> Result<SurfaceKind, ParcelError> {
    match v {
        0 => Ok(SurfaceKind::Buffer),
        1 => Ok(SurfaceKind::Container),
        2 => Ok(SurfaceKind::Effect),
        other => Err(ParcelError::BadTag(other)),
    }
}
