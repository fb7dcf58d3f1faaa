// Copyright 2026 the imxdisp Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The flip loop: one swap-chain, one consumer, one frame in flight.
//!
//! [`FlipLoop`] is a state machine driven by [`FlipLoop::step`]. Hosts run it
//! to completion on a dedicated worker thread with [`FlipLoop::run`].
//!
//! ```text
//!   WaitingForDevice ──ok──► Acquiring ◄──────────────┐
//!          │                   │   │                  │
//!        error            pending  buffer             │
//!          │                   │   │                  │
//!          │                   ▼   ▼                  │
//!          │    WaitingForBuffer   Presenting ─notify─┘
//!          │        │     │              │
//!          │   new frame  terminate   notify error
//!          │   / timeout  / error        │
//!          ▼        │     ▼              ▼
//!      Terminated ◄─┼─────┴──────────────┘
//!                   └──► Acquiring
//! ```
//!
//! Entering `Terminated` drops the held buffer and destroys the swap-chain.
//! That happens exactly once; every later `step` is a no-op.

use core::fmt;

use crate::frame::{AcquiredBuffer, FrameBufferDesc};
use crate::present::{BaselinePolicy, PresentPath, PresentPolicy};
use crate::sink::{DisplaySink, LinearBuffer, ScanoutRegister};
use crate::stager::BufferStager;
use crate::swap_chain::{
    Acquired, ChainId, FrameWait, SwapChain, SwapChainError, WaitError, WaitOutcome,
};
use crate::time::HostTime;
use crate::trace::{
    AcquireEvent, BaselineRestoreEvent, FrameSummaryBuilder, PhaseBeginEvent, PhaseEndEvent,
    PhaseKind, PresentEvent, TerminateEvent, Tracer, WaitEvent,
};

/// Configuration for a [`FlipLoop`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FlipConfig {
    /// Upper bound on one wait for the new-frame signal.
    ///
    /// Termination is observed within this interval.
    pub poll_interval: core::time::Duration,
    /// Flip scanout straight to producer surfaces that report a reachable
    /// physical address.
    pub direct_scanout: bool,
    /// Register handling after staged presents.
    pub baseline_policy: BaselinePolicy,
}

impl FlipConfig {
    /// Configuration for the i.MX 8M DCSS path: 16 ms polling, direct
    /// scanout enabled, baseline restored after copies.
    #[must_use]
    pub const fn imx8m() -> Self {
        Self {
            poll_interval: core::time::Duration::from_millis(16),
            direct_scanout: true,
            baseline_policy: BaselinePolicy::RestoreAfterStaged,
        }
    }

    /// Copy-only configuration: every frame goes through the linear buffer
    /// and the register is left alone.
    #[must_use]
    pub const fn copy_only() -> Self {
        Self {
            poll_interval: core::time::Duration::from_millis(16),
            direct_scanout: false,
            baseline_policy: BaselinePolicy::Leave,
        }
    }

    /// The per-frame policy handed to [`DisplaySink::present`].
    #[inline]
    #[must_use]
    pub const fn present_policy(&self) -> PresentPolicy {
        PresentPolicy {
            direct_scanout: self.direct_scanout,
            baseline: self.baseline_policy,
        }
    }
}

impl Default for FlipConfig {
    fn default() -> Self {
        Self::imx8m()
    }
}

/// Why a flip loop stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TerminateReason {
    /// The chain could not be associated with the render device.
    DeviceAssociation(SwapChainError),
    /// The producer abandoned the chain.
    Abandoned(SwapChainError),
    /// The wait primitive failed.
    WaitFailed(WaitError),
    /// The owner raised the terminate signal.
    Requested,
    /// The producer rejected the completion notification.
    NotifyFailed(SwapChainError),
}

impl TerminateReason {
    /// Whether the loop stopped because its owner asked it to.
    #[inline]
    #[must_use]
    pub const fn is_requested(&self) -> bool {
        matches!(self, Self::Requested)
    }
}

impl fmt::Display for TerminateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeviceAssociation(err) => write!(f, "device association failed: {err}"),
            Self::Abandoned(err) => write!(f, "swap-chain abandoned: {err}"),
            Self::WaitFailed(err) => write!(f, "{err}"),
            Self::Requested => f.write_str("termination requested"),
            Self::NotifyFailed(err) => write!(f, "frame completion rejected: {err}"),
        }
    }
}

impl core::error::Error for TerminateReason {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::DeviceAssociation(err) | Self::Abandoned(err) | Self::NotifyFailed(err) => {
                Some(err)
            }
            Self::WaitFailed(err) => Some(err),
            Self::Requested => None,
        }
    }
}

/// Where a [`FlipLoop`] is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlipState {
    /// The chain has not been associated with the render device yet.
    WaitingForDevice,
    /// The next step requests a buffer.
    Acquiring,
    /// No buffer was ready; the next step blocks on the signals.
    WaitingForBuffer,
    /// A buffer is held; the next step presents it and notifies.
    Presenting,
    /// The chain has been destroyed.
    Terminated(TerminateReason),
}

/// Counters reported when a flip loop stops.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FlipReport {
    /// Chain the loop consumed.
    pub chain: ChainId,
    /// Why the loop stopped.
    pub reason: TerminateReason,
    /// Frames that reached the display.
    pub frames_presented: u64,
    /// Frames acquired and notified but not displayed.
    pub frames_dropped: u64,
    /// Waits on the new-frame signal.
    pub waits: u64,
    /// Times the register was pointed back at the firmware frame buffer.
    pub baseline_restores: u64,
}

fn zero_clock() -> HostTime {
    HostTime(0)
}

/// Consumer loop for one swap-chain.
///
/// Owns the chain, the render device (which doubles as the staging
/// [`BufferStager`]), and the display sink. At most one acquired buffer is
/// held at a time; it is released by the next request or by termination.
pub struct FlipLoop<C, R, L>
where
    C: SwapChain,
{
    chain: Option<C>,
    id: ChainId,
    device: C::Device,
    sink: DisplaySink<R, L>,
    desc: FrameBufferDesc,
    config: FlipConfig,
    clock: fn() -> HostTime,
    state: FlipState,
    held: Option<AcquiredBuffer<C::Surface>>,
    summary: Option<FrameSummaryBuilder>,
    frame_index: u64,
    waits_this_frame: u32,
    frames_presented: u64,
    frames_dropped: u64,
    waits: u64,
    baseline_restores: u64,
}

impl<C, R, L> FlipLoop<C, R, L>
where
    C: SwapChain,
    C::Device: BufferStager<Surface = C::Surface>,
    R: ScanoutRegister,
    L: LinearBuffer,
{
    /// Creates a loop in [`FlipState::WaitingForDevice`].
    #[must_use]
    pub fn new(
        chain: C,
        device: C::Device,
        sink: DisplaySink<R, L>,
        desc: FrameBufferDesc,
        config: FlipConfig,
    ) -> Self {
        Self {
            chain: Some(chain),
            id: ChainId::default(),
            device,
            sink,
            desc,
            config,
            clock: zero_clock,
            state: FlipState::WaitingForDevice,
            held: None,
            summary: None,
            frame_index: 0,
            waits_this_frame: 0,
            frames_presented: 0,
            frames_dropped: 0,
            waits: 0,
            baseline_restores: 0,
        }
    }

    /// Tags trace events and the report with `id`.
    #[must_use]
    pub fn with_id(mut self, id: ChainId) -> Self {
        self.id = id;
        self
    }

    /// Timestamps trace events with `clock`. Without one every timestamp is 0.
    #[must_use]
    pub fn with_clock(mut self, clock: fn() -> HostTime) -> Self {
        self.clock = clock;
        self
    }

    /// Current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> FlipState {
        self.state
    }

    /// Id this loop reports under.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ChainId {
        self.id
    }

    /// The display sink.
    #[inline]
    #[must_use]
    pub fn sink(&self) -> &DisplaySink<R, L> {
        &self.sink
    }

    /// The render device.
    #[inline]
    #[must_use]
    pub fn device(&self) -> &C::Device {
        &self.device
    }

    /// Whether the chain is still held (i.e. not yet destroyed).
    #[inline]
    #[must_use]
    pub fn holds_chain(&self) -> bool {
        self.chain.is_some()
    }

    /// Performs one state transition and returns the new state.
    pub fn step<W: FrameWait + ?Sized>(&mut self, wait: &W, tracer: &mut Tracer<'_>) -> FlipState {
        let next = match self.state {
            FlipState::WaitingForDevice => self.associate(),
            FlipState::Acquiring => self.acquire(wait, tracer),
            FlipState::WaitingForBuffer => self.wait_for_buffer(wait, tracer),
            FlipState::Presenting => self.present(tracer),
            FlipState::Terminated(_) => return self.state,
        };
        if let FlipState::Terminated(reason) = next {
            self.terminate(reason, tracer);
        }
        self.state = next;
        next
    }

    /// Steps until the loop terminates and reports why.
    pub fn run<W: FrameWait + ?Sized>(&mut self, wait: &W, tracer: &mut Tracer<'_>) -> FlipReport {
        loop {
            if let FlipState::Terminated(reason) = self.step(wait, tracer) {
                return self.report(reason);
            }
        }
    }

    /// Consumes the loop and returns its display sink.
    ///
    /// If the loop had not terminated, the chain is destroyed first.
    #[must_use]
    pub fn into_sink(mut self) -> DisplaySink<R, L> {
        core::mem::replace(&mut self.sink, DisplaySink::new(None, None))
    }

    fn report(&self, reason: TerminateReason) -> FlipReport {
        FlipReport {
            chain: self.id,
            reason,
            frames_presented: self.frames_presented,
            frames_dropped: self.frames_dropped,
            waits: self.waits,
            baseline_restores: self.baseline_restores,
        }
    }

    // -- transitions ---------------------------------------------------------

    fn associate(&mut self) -> FlipState {
        let Some(chain) = self.chain.as_mut() else {
            return FlipState::Terminated(TerminateReason::Requested);
        };
        match chain.set_device(&self.device) {
            Ok(()) => FlipState::Acquiring,
            Err(err) => FlipState::Terminated(TerminateReason::DeviceAssociation(err)),
        }
    }

    fn acquire<W: FrameWait + ?Sized>(&mut self, wait: &W, tracer: &mut Tracer<'_>) -> FlipState {
        if wait.terminate_requested() {
            return FlipState::Terminated(TerminateReason::Requested);
        }
        let Some(chain) = self.chain.as_mut() else {
            return FlipState::Terminated(TerminateReason::Requested);
        };

        // The previous surface goes back to the producer with this request.
        self.held = None;

        let begin = (self.clock)();
        tracer.phase_begin(&PhaseBeginEvent {
            chain: self.id,
            frame_index: self.frame_index,
            phase: PhaseKind::Acquire,
            timestamp: begin,
        });
        let result = chain.release_and_acquire();
        let end = (self.clock)();
        tracer.phase_end(&PhaseEndEvent {
            chain: self.id,
            frame_index: self.frame_index,
            phase: PhaseKind::Acquire,
            timestamp: end,
        });

        match result {
            Ok(Acquired::Buffer(buffer)) => {
                tracer.acquire(&AcquireEvent {
                    chain: self.id,
                    frame_index: self.frame_index,
                    timestamp: end,
                    ready: true,
                    scanout_address: buffer.scanout_address(),
                });
                let mut summary =
                    FrameSummaryBuilder::new(self.id, self.frame_index, end, self.waits_this_frame);
                summary.phase_begin(PhaseKind::Acquire, begin);
                summary.phase_end(PhaseKind::Acquire, end);
                summary.set_presentation_frame(buffer.presentation_frame);
                self.summary = Some(summary);
                self.held = Some(buffer);
                FlipState::Presenting
            }
            Ok(Acquired::Pending) => {
                tracer.acquire(&AcquireEvent {
                    chain: self.id,
                    frame_index: self.frame_index,
                    timestamp: end,
                    ready: false,
                    scanout_address: None,
                });
                FlipState::WaitingForBuffer
            }
            Err(err) => FlipState::Terminated(TerminateReason::Abandoned(err)),
        }
    }

    fn wait_for_buffer<W: FrameWait + ?Sized>(
        &mut self,
        wait: &W,
        tracer: &mut Tracer<'_>,
    ) -> FlipState {
        let started = (self.clock)();
        let outcome = match wait.wait(self.config.poll_interval) {
            Ok(outcome) => outcome,
            Err(err) => return FlipState::Terminated(TerminateReason::WaitFailed(err)),
        };
        self.waits += 1;
        self.waits_this_frame = self.waits_this_frame.saturating_add(1);
        tracer.wait(&WaitEvent {
            chain: self.id,
            frame_index: self.frame_index,
            started,
            finished: (self.clock)(),
            outcome,
        });
        match outcome {
            WaitOutcome::NewFrame | WaitOutcome::TimedOut => FlipState::Acquiring,
            WaitOutcome::Terminate => FlipState::Terminated(TerminateReason::Requested),
        }
    }

    fn present(&mut self, tracer: &mut Tracer<'_>) -> FlipState {
        let Some(buffer) = self.held.as_ref() else {
            return FlipState::Acquiring;
        };
        let policy = self.config.present_policy();
        let frame_index = self.frame_index;

        let phase = if self.sink.direct_address(buffer, policy).is_some() {
            PhaseKind::Scanout
        } else {
            PhaseKind::Stage
        };
        let begin = (self.clock)();
        tracer.phase_begin(&PhaseBeginEvent {
            chain: self.id,
            frame_index,
            phase,
            timestamp: begin,
        });
        let outcome = self
            .sink
            .present(&mut self.device, buffer, &self.desc, policy);
        let end = (self.clock)();
        tracer.phase_end(&PhaseEndEvent {
            chain: self.id,
            frame_index,
            phase,
            timestamp: end,
        });

        match outcome.path {
            PresentPath::Dropped(_) => self.frames_dropped += 1,
            PresentPath::Direct { .. } | PresentPath::Staged { .. } => self.frames_presented += 1,
        }
        tracer.present(&PresentEvent {
            chain: self.id,
            frame_index,
            timestamp: end,
            path: outcome.path,
        });
        if let Some(restore) = outcome.restored {
            self.baseline_restores += 1;
            tracer.baseline_restore(&BaselineRestoreEvent {
                chain: self.id,
                frame_index,
                timestamp: end,
                from: restore.from,
                to: restore.to,
            });
        }

        let Some(chain) = self.chain.as_mut() else {
            return FlipState::Terminated(TerminateReason::Requested);
        };
        let notify_begin = (self.clock)();
        tracer.phase_begin(&PhaseBeginEvent {
            chain: self.id,
            frame_index,
            phase: PhaseKind::Notify,
            timestamp: notify_begin,
        });
        let notified = chain.finish_frame();
        let notify_end = (self.clock)();
        tracer.phase_end(&PhaseEndEvent {
            chain: self.id,
            frame_index,
            phase: PhaseKind::Notify,
            timestamp: notify_end,
        });
        if let Err(err) = notified {
            return FlipState::Terminated(TerminateReason::NotifyFailed(err));
        }

        if let Some(mut summary) = self.summary.take() {
            summary.phase_begin(phase, begin);
            summary.phase_end(phase, end);
            summary.phase_begin(PhaseKind::Notify, notify_begin);
            summary.phase_end(PhaseKind::Notify, notify_end);
            summary.set_path(outcome.path);
            summary.set_restored_baseline(outcome.restored.is_some());
            tracer.frame_summary(&summary.finish());
        }
        self.frame_index += 1;
        self.waits_this_frame = 0;
        FlipState::Acquiring
    }

    fn terminate(&mut self, reason: TerminateReason, tracer: &mut Tracer<'_>) {
        self.held = None;
        self.summary = None;
        if let Some(chain) = self.chain.take() {
            chain.destroy();
        }
        tracer.terminate(&TerminateEvent {
            chain: self.id,
            timestamp: (self.clock)(),
            reason,
            frames_presented: self.frames_presented,
            frames_dropped: self.frames_dropped,
        });
    }
}

impl<C: SwapChain, R, L> Drop for FlipLoop<C, R, L> {
    fn drop(&mut self) {
        self.held = None;
        if let Some(chain) = self.chain.take() {
            chain.destroy();
        }
    }
}

impl<C: SwapChain, R, L> fmt::Debug for FlipLoop<C, R, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlipLoop")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("frame_index", &self.frame_index)
            .field("frames_presented", &self.frames_presented)
            .field("frames_dropped", &self.frames_dropped)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::DisplayMode;
    use crate::sink::BankSwitch;
    use crate::stager::StageError;
    use alloc::collections::VecDeque;
    use alloc::rc::Rc;
    use alloc::vec;
    use alloc::vec::Vec;
    use core::cell::{Cell, RefCell};
    use core::convert::Infallible;

    /// Calls observed across the chain, stager, and sink, in order.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Call {
        SetDevice,
        Acquire,
        Copy,
        Unmap,
        RegisterWrite(u32),
        LinearWrite,
        Finish,
        Destroy,
        Wait,
    }

    type Log = Rc<RefCell<Vec<Call>>>;

    enum Script {
        Ready(u64),
        Pending,
        Lost,
    }

    struct Chain {
        log: Log,
        script: VecDeque<Script>,
        set_device: Result<(), SwapChainError>,
        finish: Result<(), SwapChainError>,
        sequence: u32,
    }

    impl Chain {
        fn new(log: &Log, script: impl IntoIterator<Item = Script>) -> Self {
            Self {
                log: log.clone(),
                script: script.into_iter().collect(),
                set_device: Ok(()),
                finish: Ok(()),
                sequence: 0,
            }
        }
    }

    impl SwapChain for Chain {
        type Device = Device;
        type Surface = ();

        fn set_device(&mut self, _device: &Device) -> Result<(), SwapChainError> {
            self.log.borrow_mut().push(Call::SetDevice);
            self.set_device
        }

        fn release_and_acquire(&mut self) -> Result<Acquired<()>, SwapChainError> {
            self.log.borrow_mut().push(Call::Acquire);
            match self.script.pop_front() {
                Some(Script::Ready(address)) => {
                    let mut buffer = AcquiredBuffer::new(()).with_reported_address(address);
                    buffer.presentation_frame = Some(self.sequence);
                    self.sequence += 1;
                    Ok(Acquired::Buffer(buffer))
                }
                Some(Script::Pending) => Ok(Acquired::Pending),
                Some(Script::Lost) | None => Err(SwapChainError::ACCESS_LOST),
            }
        }

        fn finish_frame(&mut self) -> Result<(), SwapChainError> {
            self.log.borrow_mut().push(Call::Finish);
            self.finish
        }

        fn destroy(self) {
            self.log.borrow_mut().push(Call::Destroy);
        }
    }

    struct Device {
        log: Log,
        pitch: u32,
        data: Vec<u8>,
        fail_map: bool,
    }

    impl BufferStager for Device {
        type Surface = ();

        fn copy_and_map(&mut self, _source: &()) -> Result<u32, StageError> {
            self.log.borrow_mut().push(Call::Copy);
            if self.fail_map {
                return Err(StageError::MapFailed(-1));
            }
            Ok(self.pitch)
        }

        fn mapped(&self) -> &[u8] {
            &self.data
        }

        fn unmap(&mut self) {
            self.log.borrow_mut().push(Call::Unmap);
        }
    }

    struct Reg {
        log: Log,
        value: Cell<u32>,
    }

    impl ScanoutRegister for Reg {
        fn read(&self) -> u32 {
            self.value.get()
        }

        fn write(&self, address: u32) {
            self.log.borrow_mut().push(Call::RegisterWrite(address));
            self.value.set(address);
        }
    }

    struct Linear {
        log: Log,
        bytes: Vec<u8>,
    }

    impl LinearBuffer for Linear {
        fn capacity(&self) -> usize {
            self.bytes.len()
        }

        fn write_frame(&mut self, frame: &[u8]) {
            self.log.borrow_mut().push(Call::LinearWrite);
            self.bytes[..frame.len()].copy_from_slice(frame);
        }
    }

    /// Answers waits from a script; an empty script times out.
    struct Signals {
        log: Log,
        outcomes: RefCell<VecDeque<Result<WaitOutcome, WaitError>>>,
        terminate: Cell<bool>,
    }

    impl Signals {
        fn new(log: &Log, outcomes: impl IntoIterator<Item = Result<WaitOutcome, WaitError>>) -> Self {
            Self {
                log: log.clone(),
                outcomes: RefCell::new(outcomes.into_iter().collect()),
                terminate: Cell::new(false),
            }
        }
    }

    impl FrameWait for Signals {
        fn wait(&self, _timeout: core::time::Duration) -> Result<WaitOutcome, WaitError> {
            self.log.borrow_mut().push(Call::Wait);
            self.outcomes
                .borrow_mut()
                .pop_front()
                .unwrap_or(Ok(WaitOutcome::TimedOut))
        }

        fn terminate_requested(&self) -> bool {
            self.terminate.get()
        }
    }

    fn small() -> FrameBufferDesc {
        FrameBufferDesc::for_mode(DisplayMode { width: 4, height: 2 })
    }

    fn device(log: &Log, desc: &FrameBufferDesc) -> Device {
        Device {
            log: log.clone(),
            pitch: desc.row_pitch,
            data: vec![0x5a; desc.frame_bytes()],
            fail_map: false,
        }
    }

    fn register_sink(log: &Log, baseline: u32) -> DisplaySink<Reg, Infallible> {
        DisplaySink::new(
            Some(BankSwitch::with_baseline(
                Reg {
                    log: log.clone(),
                    value: Cell::new(baseline),
                },
                Some(baseline),
            )),
            None,
        )
    }

    fn linear_sink(log: &Log, desc: &FrameBufferDesc) -> DisplaySink<Infallible, Linear> {
        DisplaySink::new(
            None,
            Some(Linear {
                log: log.clone(),
                bytes: vec![0; desc.frame_bytes()],
            }),
        )
    }

    fn count(log: &Log, call: Call) -> usize {
        log.borrow().iter().filter(|&&c| c == call).count()
    }

    #[test]
    fn hd_720_direct_address_lands_in_register() {
        let log = Log::default();
        let desc = FrameBufferDesc::for_mode(DisplayMode::HD_720);
        let mut flip = FlipLoop::new(
            Chain::new(&log, [Script::Ready(0x1000_0000), Script::Lost]),
            device(&log, &small()),
            register_sink(&log, 0x9000_0000),
            desc,
            FlipConfig::imx8m(),
        );

        let report = flip.run(&Signals::new(&log, []), &mut Tracer::none());

        let reg = flip.sink().bank_switch().unwrap().register();
        assert_eq!(reg.read(), 0x1000_0000, "register holds the surface address");
        assert_eq!(count(&log, Call::RegisterWrite(0x1000_0000)), 1);
        assert_eq!(count(&log, Call::Copy), 0, "direct path never copies");
        assert_eq!(report.frames_presented, 1);
    }

    #[test]
    fn staged_frames_cycle_copy_and_unmap_once_each() {
        let log = Log::default();
        let desc = small();
        let mut flip = FlipLoop::new(
            Chain::new(&log, [Script::Ready(0), Script::Ready(0), Script::Lost]),
            device(&log, &desc),
            linear_sink(&log, &desc),
            desc,
            FlipConfig::imx8m(),
        );

        let report = flip.run(&Signals::new(&log, []), &mut Tracer::none());

        assert_eq!(count(&log, Call::Copy), 2);
        assert_eq!(count(&log, Call::Unmap), 2);
        assert_eq!(count(&log, Call::LinearWrite), 2);
        assert_eq!(report.frames_presented, 2);
        assert!(flip.sink().linear().unwrap().bytes.iter().all(|&b| b == 0x5a));
    }

    #[test]
    fn pitch_mismatch_drops_frame_and_keeps_looping() {
        let log = Log::default();
        let desc = small();
        let mut dev = device(&log, &desc);
        dev.pitch = desc.row_pitch * 2;
        dev.data = vec![0x5a; desc.frame_bytes() * 2];
        let mut flip = FlipLoop::new(
            Chain::new(&log, [Script::Ready(0), Script::Ready(0), Script::Lost]),
            dev,
            linear_sink(&log, &desc),
            desc,
            FlipConfig::imx8m(),
        );

        let report = flip.run(&Signals::new(&log, []), &mut Tracer::none());

        assert_eq!(report.frames_dropped, 2);
        assert_eq!(report.frames_presented, 0);
        assert_eq!(count(&log, Call::Unmap), 2, "unmap even on pitch failure");
        assert_eq!(count(&log, Call::LinearWrite), 0, "no partial data written");
        assert_eq!(count(&log, Call::Finish), 2, "dropped frames are still notified");
    }

    #[test]
    fn map_failure_is_recoverable() {
        let log = Log::default();
        let desc = small();
        let mut dev = device(&log, &desc);
        dev.fail_map = true;
        let mut flip = FlipLoop::new(
            Chain::new(&log, [Script::Ready(0), Script::Lost]),
            dev,
            linear_sink(&log, &desc),
            desc,
            FlipConfig::imx8m(),
        );

        let report = flip.run(&Signals::new(&log, []), &mut Tracer::none());

        assert_eq!(report.frames_dropped, 1);
        assert_eq!(count(&log, Call::Unmap), 0, "nothing mapped, nothing to unmap");
        assert!(matches!(report.reason, TerminateReason::Abandoned(_)));
    }

    #[test]
    fn no_target_drops_every_frame() {
        let log = Log::default();
        let desc = small();
        let mut flip = FlipLoop::new(
            Chain::new(&log, [Script::Ready(0x1000_0000), Script::Lost]),
            device(&log, &desc),
            DisplaySink::unavailable(),
            desc,
            FlipConfig::imx8m(),
        );

        let report = flip.run(&Signals::new(&log, []), &mut Tracer::none());

        assert_eq!(report.frames_dropped, 1);
        assert_eq!(count(&log, Call::Copy), 0);
        assert_eq!(count(&log, Call::Finish), 1);
    }

    #[test]
    fn three_pendings_then_one_present() {
        let log = Log::default();
        let desc = small();
        let mut flip = FlipLoop::new(
            Chain::new(
                &log,
                [
                    Script::Pending,
                    Script::Pending,
                    Script::Pending,
                    Script::Ready(0x1000_0000),
                    Script::Lost,
                ],
            ),
            device(&log, &desc),
            register_sink(&log, 0),
            desc,
            FlipConfig::imx8m(),
        );
        let signals = Signals::new(
            &log,
            [
                Ok(WaitOutcome::NewFrame),
                Ok(WaitOutcome::TimedOut),
                Ok(WaitOutcome::NewFrame),
            ],
        );

        let report = flip.run(&signals, &mut Tracer::none());

        assert_eq!(count(&log, Call::Wait), 3);
        assert_eq!(report.waits, 3);
        assert_eq!(count(&log, Call::RegisterWrite(0x1000_0000)), 1);
        assert_eq!(report.frames_presented, 1);
    }

    #[test]
    fn acquire_present_notify_alternate() {
        let log = Log::default();
        let desc = small();
        let mut flip = FlipLoop::new(
            Chain::new(
                &log,
                [
                    Script::Ready(0x1000_0000),
                    Script::Pending,
                    Script::Ready(0x2000_0000),
                    Script::Lost,
                ],
            ),
            device(&log, &desc),
            register_sink(&log, 0),
            desc,
            FlipConfig::imx8m(),
        );

        flip.run(&Signals::new(&log, []), &mut Tracer::none());

        assert_eq!(
            *log.borrow(),
            [
                Call::SetDevice,
                Call::Acquire,
                Call::RegisterWrite(0x1000_0000),
                Call::Finish,
                Call::Acquire,
                Call::Wait,
                Call::Acquire,
                Call::RegisterWrite(0x2000_0000),
                Call::Finish,
                Call::Acquire,
                Call::Destroy,
            ]
        );
    }

    #[test]
    fn abandoned_chain_is_destroyed_once_without_sink_writes() {
        let log = Log::default();
        let desc = small();
        let mut flip = FlipLoop::new(
            Chain::new(&log, [Script::Lost]),
            device(&log, &desc),
            register_sink(&log, 0x9000_0000),
            desc,
            FlipConfig::imx8m(),
        );
        let signals = Signals::new(&log, []);

        let report = flip.run(&signals, &mut Tracer::none());
        // Further steps are no-ops.
        flip.step(&signals, &mut Tracer::none());

        assert_eq!(
            report.reason,
            TerminateReason::Abandoned(SwapChainError::ACCESS_LOST)
        );
        assert_eq!(count(&log, Call::Destroy), 1);
        assert!(!log.borrow().iter().any(|c| matches!(c, Call::RegisterWrite(_))));
        assert!(!flip.holds_chain());
    }

    #[test]
    fn terminate_during_wait_destroys_once() {
        let log = Log::default();
        let desc = small();
        let mut flip = FlipLoop::new(
            Chain::new(&log, [Script::Pending]),
            device(&log, &desc),
            register_sink(&log, 0),
            desc,
            FlipConfig::imx8m(),
        );

        let report = flip.run(
            &Signals::new(&log, [Ok(WaitOutcome::Terminate)]),
            &mut Tracer::none(),
        );
        drop(flip);

        assert_eq!(report.reason, TerminateReason::Requested);
        assert_eq!(count(&log, Call::Destroy), 1, "drop after run must not destroy again");
    }

    #[test]
    fn terminate_is_seen_even_when_buffers_never_run_dry() {
        let log = Log::default();
        let desc = small();
        let mut flip = FlipLoop::new(
            Chain::new(&log, [Script::Ready(0x1000_0000), Script::Ready(0x1000_0000)]),
            device(&log, &desc),
            register_sink(&log, 0),
            desc,
            FlipConfig::imx8m(),
        );
        let signals = Signals::new(&log, []);
        let mut tracer = Tracer::none();

        assert_eq!(flip.step(&signals, &mut tracer), FlipState::Acquiring);
        assert_eq!(flip.step(&signals, &mut tracer), FlipState::Presenting);
        assert_eq!(flip.step(&signals, &mut tracer), FlipState::Acquiring);
        signals.terminate.set(true);
        assert_eq!(
            flip.step(&signals, &mut tracer),
            FlipState::Terminated(TerminateReason::Requested)
        );
        assert_eq!(count(&log, Call::Acquire), 1, "no request after terminate");
        assert_eq!(count(&log, Call::Destroy), 1);
    }

    #[test]
    fn wait_error_is_terminal() {
        let log = Log::default();
        let desc = small();
        let mut flip = FlipLoop::new(
            Chain::new(&log, [Script::Pending]),
            device(&log, &desc),
            register_sink(&log, 0),
            desc,
            FlipConfig::imx8m(),
        );

        let report = flip.run(&Signals::new(&log, [Err(WaitError(6))]), &mut Tracer::none());

        assert_eq!(report.reason, TerminateReason::WaitFailed(WaitError(6)));
        assert_eq!(count(&log, Call::Destroy), 1);
    }

    #[test]
    fn device_association_failure_destroys_chain() {
        let log = Log::default();
        let desc = small();
        let mut chain = Chain::new(&log, [Script::Ready(0x1000_0000)]);
        chain.set_device = Err(SwapChainError::FAILED);
        let mut flip = FlipLoop::new(
            chain,
            device(&log, &desc),
            register_sink(&log, 0),
            desc,
            FlipConfig::imx8m(),
        );

        let report = flip.run(&Signals::new(&log, []), &mut Tracer::none());

        assert_eq!(
            report.reason,
            TerminateReason::DeviceAssociation(SwapChainError::FAILED)
        );
        assert_eq!(*log.borrow(), [Call::SetDevice, Call::Destroy]);
    }

    #[test]
    fn notify_failure_is_terminal_after_present() {
        let log = Log::default();
        let desc = small();
        let mut chain = Chain::new(&log, [Script::Ready(0x1000_0000)]);
        chain.finish = Err(SwapChainError::FAILED);
        let mut flip = FlipLoop::new(
            chain,
            device(&log, &desc),
            register_sink(&log, 0),
            desc,
            FlipConfig::imx8m(),
        );

        let report = flip.run(&Signals::new(&log, []), &mut Tracer::none());

        assert_eq!(report.reason, TerminateReason::NotifyFailed(SwapChainError::FAILED));
        assert_eq!(report.frames_presented, 1, "present completes before notify");
        assert_eq!(count(&log, Call::Destroy), 1);
    }

    #[test]
    fn dropping_unfinished_loop_destroys_chain() {
        let log = Log::default();
        let desc = small();
        let flip = FlipLoop::new(
            Chain::new(&log, []),
            device(&log, &desc),
            register_sink(&log, 0),
            desc,
            FlipConfig::imx8m(),
        );
        let sink = flip.into_sink();

        assert!(sink.bank_switch().is_some(), "sink survives the loop");
        assert_eq!(count(&log, Call::Destroy), 1);
    }

    #[test]
    fn staged_present_restores_baseline() {
        let log = Log::default();
        let desc = small();
        let sink: DisplaySink<Reg, Linear> = DisplaySink::new(
            Some(BankSwitch::with_baseline(
                Reg {
                    log: log.clone(),
                    value: Cell::new(0x1000_0000),
                },
                Some(0x9000_0000),
            )),
            Some(Linear {
                log: log.clone(),
                bytes: vec![0; desc.frame_bytes()],
            }),
        );
        let mut flip = FlipLoop::new(
            Chain::new(&log, [Script::Ready(0), Script::Lost]),
            device(&log, &desc),
            sink,
            desc,
            FlipConfig::imx8m(),
        );

        let report = flip.run(&Signals::new(&log, []), &mut Tracer::none());

        assert_eq!(report.baseline_restores, 1);
        assert_eq!(
            flip.sink().bank_switch().unwrap().register().read(),
            0x9000_0000
        );
    }

    #[test]
    fn copy_only_never_touches_the_register() {
        let log = Log::default();
        let desc = small();
        let sink: DisplaySink<Reg, Linear> = DisplaySink::new(
            Some(BankSwitch::with_baseline(
                Reg {
                    log: log.clone(),
                    value: Cell::new(0x1000_0000),
                },
                Some(0x9000_0000),
            )),
            Some(Linear {
                log: log.clone(),
                bytes: vec![0; desc.frame_bytes()],
            }),
        );
        let mut flip = FlipLoop::new(
            Chain::new(
                &log,
                [Script::Ready(0x2000_0000), Script::Ready(0), Script::Lost],
            ),
            device(&log, &desc),
            sink,
            desc,
            FlipConfig::copy_only(),
        );

        let report = flip.run(&Signals::new(&log, []), &mut Tracer::none());

        assert_eq!(report.frames_presented, 2);
        assert_eq!(report.baseline_restores, 0, "copy-only leaves the register");
        assert_eq!(count(&log, Call::Copy), 2, "contiguous surfaces are copied too");
        assert_eq!(count(&log, Call::LinearWrite), 2);
        assert!(
            !log.borrow().iter().any(|c| matches!(c, Call::RegisterWrite(_))),
            "no register writes at all"
        );
        assert_eq!(
            flip.sink().bank_switch().unwrap().register().read(),
            0x1000_0000
        );
    }

    #[cfg(feature = "trace")]
    #[test]
    fn restore_event_carries_chain_and_time() {
        use crate::trace::TraceSink;
        use core::sync::atomic::{AtomicU64, Ordering};

        static TICKS: AtomicU64 = AtomicU64::new(100);
        fn tick() -> HostTime {
            HostTime(TICKS.fetch_add(1, Ordering::Relaxed))
        }

        #[derive(Default)]
        struct Restores {
            restores: Vec<BaselineRestoreEvent>,
            presents: Vec<PresentEvent>,
        }

        impl TraceSink for Restores {
            fn on_baseline_restore(&mut self, e: &BaselineRestoreEvent) {
                self.restores.push(*e);
            }
            fn on_present(&mut self, e: &PresentEvent) {
                self.presents.push(*e);
            }
        }

        let log = Log::default();
        let desc = small();
        let sink: DisplaySink<Reg, Linear> = DisplaySink::new(
            Some(BankSwitch::with_baseline(
                Reg {
                    log: log.clone(),
                    value: Cell::new(0x1000_0000),
                },
                Some(0x9000_0000),
            )),
            Some(Linear {
                log: log.clone(),
                bytes: vec![0; desc.frame_bytes()],
            }),
        );
        let mut flip = FlipLoop::new(
            Chain::new(&log, [Script::Ready(0), Script::Lost]),
            device(&log, &desc),
            sink,
            desc,
            FlipConfig::imx8m(),
        )
        .with_id(ChainId(3))
        .with_clock(tick);
        let mut events = Restores::default();
        flip.run(&Signals::new(&log, []), &mut Tracer::new(&mut events));

        assert_eq!(events.restores.len(), 1);
        let restore = events.restores[0];
        assert_eq!(restore.chain, ChainId(3));
        assert_eq!((restore.from, restore.to), (0x1000_0000, 0x9000_0000));
        assert!(restore.timestamp.ticks() >= 100, "stamped by the loop's clock");
        assert_eq!(
            restore.timestamp, events.presents[0].timestamp,
            "restore happens as part of the present"
        );
    }

    #[test]
    fn terminate_reason_display() {
        use alloc::string::ToString;
        assert_eq!(
            TerminateReason::Abandoned(SwapChainError::ACCESS_LOST).to_string(),
            "swap-chain abandoned: swap-chain call failed (0x887a0026)"
        );
        assert_eq!(TerminateReason::Requested.to_string(), "termination requested");
        assert!(TerminateReason::Requested.is_requested());
    }

    #[test]
    fn dropped_frame_is_not_counted_as_presented() {
        let log = Log::default();
        let desc = small();
        let mut flip = FlipLoop::new(
            Chain::new(&log, [Script::Ready(0), Script::Lost]),
            device(&log, &desc),
            register_sink(&log, 0),
            desc,
            FlipConfig::imx8m(),
        );
        let report = flip.run(&Signals::new(&log, []), &mut Tracer::none());
        assert_eq!((report.frames_presented, report.frames_dropped), (0, 1));
    }

    #[cfg(feature = "trace")]
    #[test]
    fn trace_stream_brackets_every_frame() {
        use crate::trace::{FrameSummary, TraceSink};

        #[derive(Default)]
        struct Events {
            acquires: Vec<bool>,
            presents: Vec<PresentPath>,
            summaries: Vec<FrameSummary>,
            terminations: u32,
            open_phases: i32,
            phase_chains: Vec<ChainId>,
        }

        impl TraceSink for Events {
            fn on_acquire(&mut self, e: &AcquireEvent) {
                self.acquires.push(e.ready);
            }
            fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
                self.open_phases += 1;
                self.phase_chains.push(e.chain);
            }
            fn on_phase_end(&mut self, e: &PhaseEndEvent) {
                self.open_phases -= 1;
                self.phase_chains.push(e.chain);
            }
            fn on_present(&mut self, e: &PresentEvent) {
                self.presents.push(e.path);
            }
            fn on_frame_summary(&mut self, s: &FrameSummary) {
                self.summaries.push(*s);
            }
            fn on_terminate(&mut self, _: &TerminateEvent) {
                self.terminations += 1;
            }
        }

        let log = Log::default();
        let desc = small();
        let mut flip = FlipLoop::new(
            Chain::new(
                &log,
                [Script::Pending, Script::Ready(0x1000_0000), Script::Lost],
            ),
            device(&log, &desc),
            register_sink(&log, 0),
            desc,
            FlipConfig::imx8m(),
        )
        .with_id(ChainId(7));
        let mut events = Events::default();
        flip.run(&Signals::new(&log, []), &mut Tracer::new(&mut events));

        assert_eq!(events.acquires, [false, true]);
        assert_eq!(
            events.presents,
            [PresentPath::Direct {
                address: 0x1000_0000
            }]
        );
        assert_eq!(events.summaries.len(), 1);
        assert_eq!(events.summaries[0].waits, 1);
        assert_eq!(events.summaries[0].chain, ChainId(7));
        assert_eq!(
            events.summaries[0].presentation_frame,
            Some(0),
            "producer sequence number reaches the summary"
        );
        assert!(
            events.phase_chains.iter().all(|&c| c == ChainId(7)),
            "phases are tagged with their chain"
        );
        assert_eq!(events.terminations, 1);
        assert_eq!(events.open_phases, 0, "every phase begin has an end");
    }
}
