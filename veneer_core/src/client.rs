// Copyright 2026 the Veneer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The client connection: configuration, debug mode, handle registry and
//! trace sink shared by every handle and transaction it creates.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

use crate::compositor::{Compositor, LocalCompositor};
use crate::config::ClientConfig;
use crate::error::{Error, Operation, ReleaseRecord};
use crate::scene::{CompositorId, SurfaceId, SurfaceKind};
use crate::surface::SurfaceBuilder;
use crate::trace::{DebugModeEvent, HandleOrigin, InvalidUseEvent, TraceSink};
use crate::transaction::Transaction;

/// A live handle as listed by [`Client::live_handles`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandleInfo {
    /// Per-client handle serial.
    pub serial: u64,
    /// Debug name.
    pub name: Arc<str>,
    /// Callsite tag, if any.
    pub callsite: Option<Arc<str>>,
    /// Compositor id of the surface.
    pub surface: SurfaceId,
    /// Compositor layer id.
    pub layer_id: u32,
    /// What the surface is for.
    pub kind: SurfaceKind,
    /// How the handle came to exist.
    pub origin: HandleOrigin,
    /// Where the handle was built or unparcelled.
    pub created_at: &'static Location<'static>,
}

/// A connection to a compositor.
///
/// Cloning is cheap and yields another reference to the same connection.
/// Every handle and transaction keeps its client alive.
///
/// # Debug usage after release
///
/// The client owns the debug-usage-after-release flag; there is no
/// process-wide state. While the flag is on, [`SurfaceControl::release`]
/// records where it was called, and any later use of that handle fails with
/// an [`Error::Released`] whose source is the [`ReleaseRecord`]. With the
/// flag off the failure still happens, without the record. Toggling the
/// flag never changes whether an operation succeeds.
///
/// [`SurfaceControl::release`]: crate::SurfaceControl::release
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    name: String,
    compositor: Arc<dyn Compositor>,
    compositor_id: CompositorId,
    debug_usage_after_release: AtomicBool,
    capture_backtraces: bool,
    epoch: Instant,
    next_serial: AtomicU64,
    next_transaction: AtomicU64,
    handles: Mutex<BTreeMap<u64, HandleInfo>>,
    sink: Mutex<Option<Box<dyn TraceSink>>>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("name", &self.inner.name)
            .field("compositor", &self.inner.compositor_id)
            .field(
                "debug_usage_after_release",
                &self.debug_usage_after_release(),
            )
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Connects to `compositor`.
    #[must_use]
    pub fn new(compositor: Arc<dyn Compositor>, config: ClientConfig) -> Self {
        let compositor_id = compositor.instance_id();
        tracing::debug!(
            client = %config.name,
            compositor = %compositor_id,
            debug_usage_after_release = config.debug_usage_after_release,
            "client connected"
        );
        Self {
            inner: Arc::new(ClientInner {
                name: config.name,
                compositor,
                compositor_id,
                debug_usage_after_release: AtomicBool::new(config.debug_usage_after_release),
                capture_backtraces: config.capture_backtraces,
                epoch: Instant::now(),
                next_serial: AtomicU64::new(1),
                next_transaction: AtomicU64::new(1),
                handles: Mutex::new(BTreeMap::new()),
                sink: Mutex::new(None),
            }),
        }
    }

    /// Creates a fresh [`LocalCompositor`] and connects to it.
    #[must_use]
    pub fn with_local_compositor(config: ClientConfig) -> (Self, Arc<LocalCompositor>) {
        let compositor = Arc::new(LocalCompositor::new());
        let client = Self::new(compositor.clone(), config);
        (client, compositor)
    }

    /// Name from the configuration.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The compositor this client talks to.
    #[must_use]
    pub fn compositor(&self) -> &Arc<dyn Compositor> {
        &self.inner.compositor
    }

    /// Id of the compositor this client talks to.
    #[must_use]
    pub fn compositor_id(&self) -> CompositorId {
        self.inner.compositor_id
    }

    /// Starts building a surface.
    #[must_use]
    pub fn surface_builder(&self) -> SurfaceBuilder<'_> {
        SurfaceBuilder::new(self)
    }

    /// Starts an empty transaction.
    #[must_use]
    pub fn transaction(&self) -> Transaction {
        Transaction::new(self)
    }

    // -- Debug usage after release --

    /// Whether debug-usage-after-release mode is on.
    #[must_use]
    pub fn debug_usage_after_release(&self) -> bool {
        self.inner.debug_usage_after_release.load(Ordering::Acquire)
    }

    /// Turns debug-usage-after-release mode on or off and returns the
    /// previous state.
    pub fn set_debug_usage_after_release(&self, enabled: bool) -> bool {
        let previous = self
            .inner
            .debug_usage_after_release
            .swap(enabled, Ordering::AcqRel);
        if previous != enabled {
            tracing::debug!(client = %self.inner.name, enabled, "debug usage after release toggled");
            let e = DebugModeEvent {
                timestamp_ns: self.now_ns(),
                enabled,
            };
            self.emit(|sink| sink.on_debug_mode_changed(&e));
        }
        previous
    }

    /// Sets debug-usage-after-release mode until the returned guard drops,
    /// then restores the previous state.
    #[must_use = "the previous mode is restored when the guard drops"]
    pub fn debug_usage_scope(&self, enabled: bool) -> DebugUsageGuard<'_> {
        let previous = self.set_debug_usage_after_release(enabled);
        DebugUsageGuard {
            client: self,
            previous,
        }
    }

    // -- Diagnostics --

    /// Installs a trace sink, returning the previous one.
    pub fn set_trace_sink(&self, sink: impl TraceSink + 'static) -> Option<Box<dyn TraceSink>> {
        self.inner.sink.lock().replace(Box::new(sink))
    }

    /// Removes and returns the trace sink.
    pub fn take_trace_sink(&self) -> Option<Box<dyn TraceSink>> {
        self.inner.sink.lock().take()
    }

    /// Lists handles that have not been released, ordered by serial.
    #[must_use]
    pub fn live_handles(&self) -> Vec<HandleInfo> {
        self.inner.handles.lock().values().cloned().collect()
    }

    // -- Crate-internal plumbing --

    pub(crate) fn now_ns(&self) -> u64 {
        u64::try_from(self.inner.epoch.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    pub(crate) fn next_serial(&self) -> u64 {
        self.inner.next_serial.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn next_transaction_id(&self) -> u64 {
        self.inner.next_transaction.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn register(&self, info: HandleInfo) {
        self.inner.handles.lock().insert(info.serial, info);
    }

    pub(crate) fn unregister(&self, serial: u64) {
        self.inner.handles.lock().remove(&serial);
    }

    pub(crate) fn emit(&self, f: impl FnOnce(&mut dyn TraceSink)) {
        if let Some(sink) = self.inner.sink.lock().as_deref_mut() {
            f(sink);
        }
    }

    /// Captures a release record if debug mode is on.
    pub(crate) fn capture_release(
        &self,
        name: &Arc<str>,
        callsite: Option<&Arc<str>>,
        location: &'static Location<'static>,
    ) -> Option<Arc<ReleaseRecord>> {
        self.debug_usage_after_release().then(|| {
            Arc::new(ReleaseRecord::capture(
                Arc::clone(name),
                callsite.cloned(),
                location,
                self.inner.capture_backtraces,
            ))
        })
    }

    /// Builds the error for a use of a released handle, attaching `record`
    /// only while debug mode is on.
    pub(crate) fn released_error(
        &self,
        serial: u64,
        name: &Arc<str>,
        operation: Operation,
        record: Option<&Arc<ReleaseRecord>>,
    ) -> Error {
        let cause = if self.debug_usage_after_release() {
            record.cloned()
        } else {
            None
        };
        match &cause {
            Some(record) => tracing::warn!(
                surface = %name,
                operation = %operation,
                released_at = %record.location(),
                "use of released surface"
            ),
            None => tracing::warn!(
                surface = %name,
                operation = %operation,
                "use of released surface"
            ),
        }
        let e = InvalidUseEvent {
            timestamp_ns: self.now_ns(),
            serial,
            operation,
            cause_attached: cause.is_some(),
            name,
        };
        self.emit(|sink| sink.on_invalid_use(&e));
        Error::Released {
            name: Arc::clone(name),
            operation,
            cause,
        }
    }
}

/// Restores the previous debug-usage-after-release mode on drop.
///
/// Created by [`Client::debug_usage_scope`].
#[derive(Debug)]
pub struct DebugUsageGuard<'a> {
    client: &'a Client,
    previous: bool,
}

impl Drop for DebugUsageGuard<'_> {
    fn drop(&mut self) {
        self.client.set_debug_usage_after_release(self.previous);
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::trace::{
        SurfaceCreatedEvent, SurfaceReleasedEvent, TransactionAppliedEvent,
    };

    #[derive(Default)]
    struct Log {
        lines: Vec<String>,
    }

    impl TraceSink for Log {
        fn on_surface_created(&mut self, e: &SurfaceCreatedEvent<'_>) {
            self.lines.push(format!("create {}", e.name));
        }

        fn on_surface_released(&mut self, e: &SurfaceReleasedEvent<'_>) {
            self.lines
                .push(format!("release {} {:?} {}", e.name, e.kind, e.destroyed));
        }

        fn on_invalid_use(&mut self, e: &InvalidUseEvent<'_>) {
            self.lines
                .push(format!("invalid {} cause={}", e.name, e.cause_attached));
        }

        fn on_transaction_applied(&mut self, e: &TransactionAppliedEvent) {
            self.lines.push(format!("apply {}", e.mutations));
        }

        fn on_debug_mode_changed(&mut self, e: &DebugModeEvent) {
            self.lines.push(format!("debug {}", e.enabled));
        }
    }

    #[test]
    fn config_sets_initial_debug_mode() {
        let (client, _) =
            Client::with_local_compositor(ClientConfig::default().with_debug_usage_after_release(true));
        assert!(client.debug_usage_after_release());
    }

    #[test]
    fn toggle_returns_previous_state() {
        let (client, _) = Client::with_local_compositor(ClientConfig::default());
        assert!(!client.set_debug_usage_after_release(true));
        assert!(client.set_debug_usage_after_release(false));
        assert!(!client.debug_usage_after_release());
    }

    #[test]
    fn scope_guard_restores_previous_state() {
        let (client, _) = Client::with_local_compositor(ClientConfig::default());
        {
            let _guard = client.debug_usage_scope(true);
            assert!(client.debug_usage_after_release());
        }
        assert!(!client.debug_usage_after_release());
    }

    #[test]
    fn clients_do_not_share_debug_mode() {
        let (a, compositor) = Client::with_local_compositor(ClientConfig::default());
        let b = Client::new(compositor, ClientConfig::default());
        a.set_debug_usage_after_release(true);
        assert!(!b.debug_usage_after_release());
        assert_eq!(a.compositor_id(), b.compositor_id());
    }

    #[test]
    fn registry_tracks_live_handles() {
        let (client, _) = Client::with_local_compositor(ClientConfig::default());
        let a = client
            .surface_builder()
            .set_name("a")
            .set_callsite("registry_tracks_live_handles")
            .build()
            .unwrap();
        let b = client.surface_builder().set_name("b").build().unwrap();

        let names: Vec<_> = client
            .live_handles()
            .iter()
            .map(|h| h.name.to_string())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(
            client.live_handles()[0].callsite.as_deref(),
            Some("registry_tracks_live_handles")
        );

        a.release();
        drop(b);
        assert!(client.live_handles().is_empty());
    }

    #[test]
    fn trace_sink_sees_lifecycle() {
        let (client, _) = Client::with_local_compositor(ClientConfig::default());
        let log = Arc::new(Mutex::new(Log::default()));
        assert!(client.set_trace_sink(Arc::clone(&log)).is_none());

        let sc = client.surface_builder().set_name("dim").build().unwrap();
        let mut t = client.transaction();
        t.hide(&sc).unwrap();
        t.apply().unwrap();
        {
            let _guard = client.debug_usage_scope(true);
            sc.release();
            assert!(t.show(&sc).is_err());
        }
        assert!(client.take_trace_sink().is_some());

        assert_eq!(
            log.lock().lines,
            vec![
                "create dim",
                "apply 1",
                "debug true",
                "release dim Explicit true",
                "invalid dim cause=true",
                "debug false",
            ]
        );
    }

    #[test]
    fn toggling_debug_mode_does_not_change_outcomes() {
        let (client, _) = Client::with_local_compositor(ClientConfig::default());
        let surfaces: Vec<_> = (0..8)
            .map(|i| {
                client
                    .surface_builder()
                    .set_name(format!("s{i}"))
                    .build()
                    .unwrap()
            })
            .collect();

        thread::scope(|scope| {
            scope.spawn(|| {
                for i in 0..1_000 {
                    client.set_debug_usage_after_release(i % 2 == 0);
                }
            });
            scope.spawn(|| {
                for _ in 0..100 {
                    let mut t = client.transaction();
                    for sc in &surfaces {
                        t.set_alpha(sc, 0.5).unwrap();
                    }
                    t.apply().unwrap();
                }
            });
        });
        client.set_debug_usage_after_release(false);
    }
}
