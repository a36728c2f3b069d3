// Copyright 2026 the Veneer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Walks surface handles through their lifecycle and exercises the
//! diagnostics pipeline.
//!
//! Builds a small window hierarchy, applies transactions, misuses a
//! released handle with debug-usage-after-release mode off and on, passes a
//! handle through a parcel to a second client, rotates the display, and
//! leaks one handle on purpose. Events go to both a
//! [`PrettyPrintSink`](veneer_debug::pretty::PrettyPrintSink) and a
//! [`RecorderSink`](veneer_debug::recorder::RecorderSink); the recording is
//! exported as a Chrome trace JSON file.
//!
//! Set `RUST_LOG=veneer_core=debug` for the library's own logs and
//! `VENEER_CAPTURE_BACKTRACES=1` for backtraces in release records.

use std::error::Error as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::Arc;

use anyhow::{Context, ensure};
use kurbo::{Affine, Point, Rect};
use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

use veneer_core::{Client, ClientConfig, LocalCompositor, Parcel, Rotation, SurfaceControl};
use veneer_debug::fanout::FanoutSink;
use veneer_debug::pretty::PrettyPrintSink;
use veneer_debug::recorder::RecorderSink;
use veneer_debug::{chrome, leaks};

const TRACE_PATH: &str = "lifecycle_trace.json";

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // -- client and sinks --------------------------------------------------
    let compositor = Arc::new(LocalCompositor::new());
    let client = Client::new(compositor.clone(), ClientConfig::from_env().with_name("wm"));
    let recorder = Arc::new(Mutex::new(RecorderSink::new()));
    client.set_trace_sink(
        FanoutSink::new()
            .with(PrettyPrintSink::new(Box::new(std::io::stdout())))
            .with(Arc::clone(&recorder)),
    );

    // -- valid use ---------------------------------------------------------
    let root = client
        .surface_builder()
        .set_name("display-root")
        .set_container_layer()
        .set_callsite("lifecycle_demo::main")
        .build()?;
    let app = client
        .surface_builder()
        .set_name("app-window")
        .set_parent(Some(&root))
        .set_buffer_size(1080.0, 2400.0)
        .set_callsite("lifecycle_demo::main")
        .build()?;
    let dim = client
        .surface_builder()
        .set_name("dim-layer")
        .set_effect_layer()
        .set_parent(Some(&root))
        .set_callsite("lifecycle_demo::dim")
        .build()?;

    let mut t = client.transaction();
    t.set_position(&app, Point::new(0.0, 96.0))?
        .set_crop(&app, Some(Rect::new(0.0, 0.0, 1080.0, 2304.0)))?
        .set_layer(&dim, 1)?
        .set_alpha(&dim, 0.6)?
        .set_matrix(&root, Affine::IDENTITY)?;
    let receipt = t.apply()?;
    tracing::info!(
        mutations = receipt.mutations,
        surfaces = receipt.surfaces,
        "initial layout applied"
    );
    let changes = compositor.evaluate();
    tracing::info!(
        added = changes.added.len(),
        geometry = changes.geometry.len(),
        "compositor evaluated"
    );

    // -- invalid use, debug mode off ----------------------------------------
    dim.release();
    let err = t
        .hide(&dim)
        .err()
        .context("released handle was accepted")?;
    tracing::warn!(%err, has_cause = err.source().is_some(), "debug mode off");

    // -- invalid use, debug mode on -----------------------------------------
    {
        let _debug = client.debug_usage_scope(true);
        let scrim = client
            .surface_builder()
            .set_name("scrim")
            .set_parent(Some(&app))
            .set_callsite("lifecycle_demo::scrim")
            .build()?;
        scrim.release();
        let err = t
            .set_alpha(&scrim, 0.0)
            .err()
            .context("released handle was accepted")?;
        let cause = err
            .release_cause()
            .context("debug mode did not attach a release record")?;
        tracing::warn!(%err, released_at = %cause.location(), "debug mode on");
    }

    // -- parcel ------------------------------------------------------------
    let mut parcel = Parcel::new();
    app.write_to_parcel(&mut parcel)?;
    let system_ui = Client::new(compositor.clone(), ClientConfig::default().with_name("sysui"));
    let remote = SurfaceControl::read_from_parcel(&system_ui, &mut parcel)?;
    system_ui.transaction().set_alpha(&remote, 0.9)?.apply()?;
    remote.release();
    ensure!(app.is_valid(), "releasing a parcelled copy released the original");

    // -- rotation ----------------------------------------------------------
    let mut hint_changes = 0;
    for rotation in [Rotation::R90, Rotation::R180, Rotation::R270, Rotation::R0] {
        compositor.set_display_rotation(rotation);
        let changes = compositor.evaluate();
        let app_id = app.id()?;
        let seen = changes.hints.iter().filter(|&&idx| idx == app_id.index()).count();
        ensure!(seen <= 1, "transform hint reported {seen} times for one rotation");
        hint_changes += seen;
        let hint = app.transform_hint()?;
        tracing::info!(degrees = rotation.degrees(), ?hint, "display rotated");
    }
    tracing::info!(hint_changes, "rotation done");

    // -- leak report -------------------------------------------------------
    let leaked = client
        .surface_builder()
        .set_name("forgotten-overlay")
        .set_callsite("lifecycle_demo::leak")
        .build()?;
    let live = leaks::write_report(&client, &mut std::io::stdout())?;
    tracing::info!(live, "leak report written");
    drop(leaked);

    // -- teardown ----------------------------------------------------------
    drop(t);
    app.release();
    root.release();
    drop(client.take_trace_sink());
    ensure!(
        compositor.live_count() == 0,
        "{} surfaces outlived their handles",
        compositor.live_count()
    );

    // -- chrome trace export -----------------------------------------------
    let file = File::create(TRACE_PATH).with_context(|| format!("creating {TRACE_PATH}"))?;
    let mut writer = BufWriter::new(file);
    chrome::export(recorder.lock().as_bytes(), &mut writer)?;
    writer.flush()?;
    println!("\nChrome trace written to {TRACE_PATH}");
    println!("Open in chrome://tracing or https://ui.perfetto.dev/");
    Ok(())
}
