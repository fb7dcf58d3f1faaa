// Copyright 2026 the imxdisp Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing and diagnostics for the flip loop.
//!
//! [`TraceSink`] has one method per event, each defaulting to a no-op, so a
//! sink only implements what it cares about.
//!
//! [`Tracer`] wraps an optional `&mut dyn TraceSink`. With the `trace` feature
//! **off**, every `Tracer` method compiles to nothing. With it **on**, each
//! method costs one `Option` branch before dispatching.
//!
//! [`FrameSummaryBuilder`] collects phase timestamps for one acquired buffer
//! and produces a [`FrameSummary`] once the producer has been notified.
//!
//! # Crate features
//!
//! - `trace` enables the `Tracer` method bodies.

use crate::flip::TerminateReason;
use crate::present::PresentPath;
use crate::swap_chain::{ChainId, WaitOutcome};
use crate::time::HostTime;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Which phase of a flip-loop iteration is being measured.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PhaseKind {
    /// Releasing the previous buffer and requesting the next one.
    Acquire,
    /// Copying the surface through the staging surface into the linear buffer.
    Stage,
    /// Writing a surface address to the bank-switch register.
    Scanout,
    /// Telling the producer the frame has been processed.
    Notify,
}

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// Emitted after every buffer request.
#[derive(Clone, Copy, Debug)]
pub struct AcquireEvent {
    /// Chain the request went to.
    pub chain: ChainId,
    /// Index the next presented frame will carry.
    pub frame_index: u64,
    /// Host time of the request.
    pub timestamp: HostTime,
    /// Whether a buffer was handed out (`false` means pending).
    pub ready: bool,
    /// Scanout-reachable address of the buffer, if it reported one.
    pub scanout_address: Option<u32>,
}

/// Emitted when a wait for the new-frame signal returns.
#[derive(Clone, Copy, Debug)]
pub struct WaitEvent {
    /// Chain being waited on.
    pub chain: ChainId,
    /// Index the next presented frame will carry.
    pub frame_index: u64,
    /// Host time the wait started.
    pub started: HostTime,
    /// Host time the wait returned.
    pub finished: HostTime,
    /// What woke the wait.
    pub outcome: WaitOutcome,
}

/// Marks the beginning of a flip-loop phase.
#[derive(Clone, Copy, Debug)]
pub struct PhaseBeginEvent {
    /// Chain the phase runs for.
    pub chain: ChainId,
    /// Frame counter.
    pub frame_index: u64,
    /// Which phase is starting.
    pub phase: PhaseKind,
    /// Host time at the start of the phase.
    pub timestamp: HostTime,
}

/// Marks the end of a flip-loop phase.
#[derive(Clone, Copy, Debug)]
pub struct PhaseEndEvent {
    /// Chain the phase ran for.
    pub chain: ChainId,
    /// Frame counter.
    pub frame_index: u64,
    /// Which phase is ending.
    pub phase: PhaseKind,
    /// Host time at the end of the phase.
    pub timestamp: HostTime,
}

/// Emitted once per acquired buffer with the update path taken.
#[derive(Clone, Copy, Debug)]
pub struct PresentEvent {
    /// Chain the buffer came from.
    pub chain: ChainId,
    /// Frame counter.
    pub frame_index: u64,
    /// Host time the present finished.
    pub timestamp: HostTime,
    /// Path taken, including the drop reason for dropped frames.
    pub path: PresentPath,
}

/// Emitted when scanout is pointed back at the firmware frame buffer.
#[derive(Clone, Copy, Debug)]
pub struct BaselineRestoreEvent {
    /// Chain whose staged frame triggered the restore.
    pub chain: ChainId,
    /// Frame counter.
    pub frame_index: u64,
    /// Host time of the register write.
    pub timestamp: HostTime,
    /// Register value before the restore.
    pub from: u32,
    /// Baseline written.
    pub to: u32,
}

/// Emitted once when the flip loop stops.
#[derive(Clone, Copy, Debug)]
pub struct TerminateEvent {
    /// Chain that was destroyed.
    pub chain: ChainId,
    /// Host time of termination.
    pub timestamp: HostTime,
    /// Why the loop stopped.
    pub reason: TerminateReason,
    /// Frames that reached the display.
    pub frames_presented: u64,
    /// Frames that were acquired but dropped.
    pub frames_dropped: u64,
}

/// Per-frame timing summary produced by [`FrameSummaryBuilder`].
#[derive(Clone, Copy, Debug)]
pub struct FrameSummary {
    /// Chain the frame came from.
    pub chain: ChainId,
    /// Frame counter.
    pub frame_index: u64,
    /// Host time the buffer was handed out.
    pub acquired_at: HostTime,
    /// Waits on the new-frame signal before the buffer was ready.
    pub waits: u32,
    /// Producer's presentation sequence number for the surface, if it
    /// reported one.
    pub presentation_frame: Option<u32>,
    /// Path taken.
    pub path: PresentPath,
    /// Whether the baseline was restored after this frame.
    pub restored_baseline: bool,
    /// Acquire phase duration in ticks (0 if not measured).
    pub acquire_ticks: u64,
    /// Stage phase duration in ticks (0 if not measured).
    pub stage_ticks: u64,
    /// Scanout phase duration in ticks (0 if not measured).
    pub scanout_ticks: u64,
    /// Notify phase duration in ticks (0 if not measured).
    pub notify_ticks: u64,
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives trace events from the flip loop.
///
/// All methods have default no-op implementations, so you only need to
/// override the events you care about.
pub trait TraceSink {
    /// Called after every buffer request.
    fn on_acquire(&mut self, e: &AcquireEvent) {
        _ = e;
    }

    /// Called when a wait for the new-frame signal returns.
    fn on_wait(&mut self, e: &WaitEvent) {
        _ = e;
    }

    /// Called at the beginning of a flip-loop phase.
    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        _ = e;
    }

    /// Called at the end of a flip-loop phase.
    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        _ = e;
    }

    /// Called once per acquired buffer after the update strategy ran.
    fn on_present(&mut self, e: &PresentEvent) {
        _ = e;
    }

    /// Called when the bank-switch register is restored to its baseline.
    fn on_baseline_restore(&mut self, e: &BaselineRestoreEvent) {
        _ = e;
    }

    /// Called once when the loop stops.
    fn on_terminate(&mut self, e: &TerminateEvent) {
        _ = e;
    }

    /// Called with a per-frame timing summary.
    fn on_frame_summary(&mut self, s: &FrameSummary) {
        _ = s;
    }
}

impl<S: TraceSink + ?Sized> TraceSink for &mut S {
    fn on_acquire(&mut self, e: &AcquireEvent) {
        (**self).on_acquire(e);
    }

    fn on_wait(&mut self, e: &WaitEvent) {
        (**self).on_wait(e);
    }

    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        (**self).on_phase_begin(e);
    }

    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        (**self).on_phase_end(e);
    }

    fn on_present(&mut self, e: &PresentEvent) {
        (**self).on_present(e);
    }

    fn on_baseline_restore(&mut self, e: &BaselineRestoreEvent) {
        (**self).on_baseline_restore(e);
    }

    fn on_terminate(&mut self, e: &TerminateEvent) {
        (**self).on_terminate(e);
    }

    fn on_frame_summary(&mut self, s: &FrameSummary) {
        (**self).on_frame_summary(s);
    }
}

// ---------------------------------------------------------------------------
// Optional sinks
// ---------------------------------------------------------------------------

/// `None` discards events; `Some` forwards them.
impl<S: TraceSink> TraceSink for Option<S> {
    fn on_acquire(&mut self, e: &AcquireEvent) {
        if let Some(sink) = self {
            sink.on_acquire(e);
        }
    }

    fn on_wait(&mut self, e: &WaitEvent) {
        if let Some(sink) = self {
            sink.on_wait(e);
        }
    }

    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        if let Some(sink) = self {
            sink.on_phase_begin(e);
        }
    }

    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        if let Some(sink) = self {
            sink.on_phase_end(e);
        }
    }

    fn on_present(&mut self, e: &PresentEvent) {
        if let Some(sink) = self {
            sink.on_present(e);
        }
    }

    fn on_baseline_restore(&mut self, e: &BaselineRestoreEvent) {
        if let Some(sink) = self {
            sink.on_baseline_restore(e);
        }
    }

    fn on_terminate(&mut self, e: &TerminateEvent) {
        if let Some(sink) = self {
            sink.on_terminate(e);
        }
    }

    fn on_frame_summary(&mut self, s: &FrameSummary) {
        if let Some(sink) = self {
            sink.on_frame_summary(s);
        }
    }
}

// ---------------------------------------------------------------------------
// NoopSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

// ---------------------------------------------------------------------------
// Tracer wrapper
// ---------------------------------------------------------------------------

/// Thin wrapper around an optional [`TraceSink`].
///
/// When the `trace` feature is **off**, every method compiles to nothing. When
/// **on**, each method checks the inner `Option` (one branch) before
/// dispatching to the sink.
pub struct Tracer<'a> {
    #[cfg(feature = "trace")]
    sink: Option<&'a mut dyn TraceSink>,
    #[cfg(not(feature = "trace"))]
    _marker: core::marker::PhantomData<&'a mut dyn TraceSink>,
}

impl core::fmt::Debug for Tracer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

/// Generates one forwarding method per event.
macro_rules! tracer_methods {
    ($($(#[$attr:meta])* $name:ident => $hook:ident($ty:ty);)*) => {
        $(
            $(#[$attr])*
            #[inline]
            pub fn $name(&mut self, e: &$ty) {
                #[cfg(feature = "trace")]
                if let Some(s) = &mut self.sink {
                    s.$hook(e);
                }
                #[cfg(not(feature = "trace"))]
                {
                    _ = e;
                }
            }
        )*
    };
}

impl<'a> Tracer<'a> {
    /// Creates a tracer that dispatches to the given sink.
    #[inline]
    #[must_use]
    pub fn new(sink: &'a mut dyn TraceSink) -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: Some(sink) }
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: None }
        }
        #[cfg(not(feature = "trace"))]
        {
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    tracer_methods! {
        /// Emits an [`AcquireEvent`].
        acquire => on_acquire(AcquireEvent);
        /// Emits a [`WaitEvent`].
        wait => on_wait(WaitEvent);
        /// Emits a [`PhaseBeginEvent`].
        phase_begin => on_phase_begin(PhaseBeginEvent);
        /// Emits a [`PhaseEndEvent`].
        phase_end => on_phase_end(PhaseEndEvent);
        /// Emits a [`PresentEvent`].
        present => on_present(PresentEvent);
        /// Emits a [`BaselineRestoreEvent`].
        baseline_restore => on_baseline_restore(BaselineRestoreEvent);
        /// Emits a [`TerminateEvent`].
        terminate => on_terminate(TerminateEvent);
        /// Emits a [`FrameSummary`].
        frame_summary => on_frame_summary(FrameSummary);
    }
}

// ---------------------------------------------------------------------------
// FrameSummaryBuilder
// ---------------------------------------------------------------------------

/// Collects phase timestamps for one frame and produces a [`FrameSummary`].
#[derive(Debug)]
pub struct FrameSummaryBuilder {
    chain: ChainId,
    frame_index: u64,
    acquired_at: HostTime,
    waits: u32,
    presentation_frame: Option<u32>,
    path: Option<PresentPath>,
    restored_baseline: bool,
    phase_starts: [Option<HostTime>; 4],
    phase_ends: [Option<HostTime>; 4],
}

impl FrameSummaryBuilder {
    /// Starts a summary for a buffer handed out at `acquired_at` after
    /// `waits` waits.
    #[must_use]
    pub fn new(chain: ChainId, frame_index: u64, acquired_at: HostTime, waits: u32) -> Self {
        Self {
            chain,
            frame_index,
            acquired_at,
            waits,
            presentation_frame: None,
            path: None,
            restored_baseline: false,
            phase_starts: [None; 4],
            phase_ends: [None; 4],
        }
    }

    /// Records the start of a phase.
    pub fn phase_begin(&mut self, phase: PhaseKind, t: HostTime) {
        self.phase_starts[phase_index(phase)] = Some(t);
    }

    /// Records the end of a phase.
    pub fn phase_end(&mut self, phase: PhaseKind, t: HostTime) {
        self.phase_ends[phase_index(phase)] = Some(t);
    }

    /// Records the producer's sequence number for the surface.
    pub fn set_presentation_frame(&mut self, frame: Option<u32>) {
        self.presentation_frame = frame;
    }

    /// Records the path the frame took.
    pub fn set_path(&mut self, path: PresentPath) {
        self.path = Some(path);
    }

    /// Records that the baseline was restored after this frame.
    pub fn set_restored_baseline(&mut self, restored: bool) {
        self.restored_baseline = restored;
    }

    /// Consumes the builder and produces the final [`FrameSummary`].
    ///
    /// A frame whose path was never recorded is reported as dropped with
    /// [`DropReason::NoTarget`](crate::present::DropReason::NoTarget).
    #[must_use]
    pub fn finish(self) -> FrameSummary {
        FrameSummary {
            chain: self.chain,
            frame_index: self.frame_index,
            acquired_at: self.acquired_at,
            waits: self.waits,
            presentation_frame: self.presentation_frame,
            path: self.path.unwrap_or(PresentPath::Dropped(
                crate::present::DropReason::NoTarget,
            )),
            restored_baseline: self.restored_baseline,
            acquire_ticks: self.phase_duration(PhaseKind::Acquire),
            stage_ticks: self.phase_duration(PhaseKind::Stage),
            scanout_ticks: self.phase_duration(PhaseKind::Scanout),
            notify_ticks: self.phase_duration(PhaseKind::Notify),
        }
    }

    fn phase_duration(&self, phase: PhaseKind) -> u64 {
        let idx = phase_index(phase);
        match (self.phase_starts[idx], self.phase_ends[idx]) {
            (Some(start), Some(end)) => end.saturating_duration_since(start).ticks(),
            _ => 0,
        }
    }
}

/// Maps a [`PhaseKind`] to an array index.
const fn phase_index(phase: PhaseKind) -> usize {
    match phase {
        PhaseKind::Acquire => 0,
        PhaseKind::Stage => 1,
        PhaseKind::Scanout => 2,
        PhaseKind::Notify => 3,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
