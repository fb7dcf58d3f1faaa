// Copyright 2026 the imxdisp Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Swap-chain frame processing for the i.MX 8M display controller.
//!
//! `imxdisp_core` holds the portable part of the display drivers: the loop
//! that takes rendered surfaces from the OS compositor and gets them onto the
//! panel. It is `no_std` compatible (with `alloc`) and talks to hardware and
//! to the compositor only through small traits that hosts implement.
//!
//! # Architecture
//!
//! ```text
//!   SwapChain (compositor)          FrameWait (new frame / terminate)
//!       │  release_and_acquire            │
//!       ▼                                 │
//!   AcquiredBuffer ──► FlipLoop ◄─────────┘
//!                         │
//!                         ▼
//!               DisplaySink::present()
//!              ┌──────────┴───────────┐
//!              ▼                      ▼
//!   ScanoutRegister::write   BufferStager ─► LinearBuffer::write_frame
//!      (direct flip)         (copy + map)      (staged copy)
//!                         │
//!                         ▼
//!   SwapChain::finish_frame ──► back to the compositor
//! ```
//!
//! **[`frame`]**: Mode geometry, the frame-buffer descriptor, and acquired
//! buffers with their reported physical placement.
//!
//! **[`swap_chain`]**: The [`SwapChain`](swap_chain::SwapChain) and
//! [`FrameWait`](swap_chain::FrameWait) contracts for the frame source.
//!
//! **[`stager`]**: The GPU to CPU staging contract and the
//! [`StagedFrame`](stager::StagedFrame) unmap guard.
//!
//! **[`sink`]**: The bank-switch register and linear buffer the panel scans
//! out from.
//!
//! **[`present`]**: The per-frame update strategy (direct flip, staged copy,
//! or drop) and baseline restore.
//!
//! **[`flip`]**: The [`FlipLoop`](flip::FlipLoop) state machine and its
//! configuration.
//!
//! **[`time`]**: Host tick types.
//!
//! **[`trace`]**: [`TraceSink`](trace::TraceSink) trait and event types for
//! flip-loop instrumentation, with a zero-overhead
//! [`Tracer`](trace::Tracer) wrapper.
//!
//! # Crate features
//!
//! - `trace` (disabled by default): Enables `Tracer` method bodies (one branch
//!   per call site).

#![no_std]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;

pub mod flip;
pub mod frame;
pub mod present;
pub mod sink;
pub mod stager;
pub mod swap_chain;
pub mod time;
pub mod trace;
