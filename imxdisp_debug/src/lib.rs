// Copyright 2026 the imxdisp Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Recording, pretty-printing, and Chrome trace export for flip-loop
//! diagnostics.
//!
//! This crate provides [`TraceSink`](imxdisp_core::trace::TraceSink)
//! implementations for bring-up and post-mortem analysis:
//!
//! - [`pretty::PrettyPrintSink`]: one line per event, with dropped frames and
//!   unexpected terminations flagged.
//! - [`recorder::RecorderSink`]: compact binary recording with
//!   [`recorder::decode`] for playback.
//! - [`chrome::export`]: writes Chrome Trace Event Format JSON from recorded
//!   bytes.

pub mod chrome;
pub mod pretty;
pub mod recorder;
