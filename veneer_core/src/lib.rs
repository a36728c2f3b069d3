// Copyright 2026 the Veneer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Client-side surface handles with enforced liveness.
//!
//! `veneer_core` lets a client create compositor surfaces, change their
//! properties in atomic transactions and pass handles between processes.
//! A handle is valid until it is released; after that, every operation on
//! it fails with [`Error::Released`] instead of touching a surface that no
//! longer belongs to the client.
//!
//! # Architecture
//!
//! ```text
//!   Client ──► SurfaceBuilder::build() ──► SurfaceControl ──► release()
//!     │                                       │        │
//!     │                 Transaction::set_*() ◄┘        └► write_to_parcel()
//!     │                        │                               │
//!     │                        ▼                               ▼
//!     │                 Transaction::apply()        read_from_parcel()
//!     │                        │
//!     ▼                        ▼
//!   dyn Compositor ◄───────────┘   (LocalCompositor: SurfaceStore + evaluate)
//! ```
//!
//! **[`client`]**: The connection. Owns the debug-usage-after-release flag,
//! the registry of live handles and the optional [`TraceSink`].
//!
//! **[`surface`]**: [`SurfaceBuilder`] and [`SurfaceControl`]. Release is
//! idempotent and thread-safe; dropping a valid handle releases it.
//!
//! **[`transaction`]**: [`Transaction`] records mutations, validating each
//! handle at record time, and applies them all or none.
//!
//! **[`compositor`]**: The [`Compositor`] trait the client talks to, and
//! [`LocalCompositor`], an in-process implementation.
//!
//! **[`scene`]**: Struct-of-arrays surface tree with generational ids, used
//! by [`LocalCompositor`]. Evaluation produces [`FrameChanges`](scene::FrameChanges).
//!
//! **[`dirty`]**: Dirty channels over `understory_dirty`.
//!
//! **[`parcel`]**: [`Parcel`], the byte container handles are written to.
//!
//! **[`trace`]**: Lifecycle events for diagnostics sinks.
//!
//! # Debug usage after release
//!
//! With [`ClientConfig::debug_usage_after_release`] (or
//! [`Client::set_debug_usage_after_release`]) on, each release records its
//! source location, thread and backtrace in a [`ReleaseRecord`]. A later
//! misuse reports that record as the [`source`](std::error::Error::source)
//! of its error, so the failure points at the code that released too early.
//!
//! ```
//! use veneer_core::{Client, ClientConfig};
//!
//! let (client, _compositor) = Client::with_local_compositor(
//!     ClientConfig::default().with_debug_usage_after_release(true),
//! );
//! let sc = client.surface_builder().set_name("dim-layer").build()?;
//! sc.release();
//!
//! let err = client.transaction().hide(&sc).unwrap_err();
//! assert!(err.is_released());
//! assert!(err.release_cause().is_some());
//! # Ok::<(), veneer_core::Error>(())
//! ```

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod client;
pub mod compositor;
pub mod config;
pub mod dirty;
pub mod error;
pub mod parcel;
pub mod scene;
pub mod surface;
pub mod trace;
pub mod transaction;

pub use client::{Client, DebugUsageGuard, HandleInfo};
pub use compositor::{Change, Compositor, CreatedSurface, LocalCompositor, Mutation};
pub use config::ClientConfig;
pub use error::{Error, Operation, ParcelError, ReleaseRecord, Result};
pub use parcel::Parcel;
pub use scene::{CompositorId, Rotation, SurfaceId, SurfaceKind};
pub use surface::{SurfaceBuilder, SurfaceControl};
pub use trace::TraceSink;
pub use transaction::{ApplyReceipt, Transaction};
