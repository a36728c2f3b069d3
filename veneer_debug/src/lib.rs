// Copyright 2026 the Veneer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Recording, pretty-printing, leak reports, and Chrome trace export for
//! veneer diagnostics.
//!
//! This crate provides [`TraceSink`](veneer_core::trace::TraceSink)
//! implementations and reports for development and post-mortem analysis:
//!
//! - [`pretty::PrettyPrintSink`]: one line per event.
//! - [`recorder::RecorderSink`]: compact binary recording with
//!   [`recorder::decode`] for playback.
//! - [`chrome::export`]: Chrome Trace Event Format JSON from recorded
//!   bytes, with one async span per handle lifetime.
//! - [`fanout::FanoutSink`]: forwards every event to several sinks.
//! - [`leaks::write_report`]: lists a client's unreleased handles grouped
//!   by callsite.

pub mod chrome;
pub mod fanout;
pub mod leaks;
pub mod pretty;
pub mod recorder;
