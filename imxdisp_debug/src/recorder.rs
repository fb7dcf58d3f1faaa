// Copyright 2026 the imxdisp Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compact binary event recording and decoding.
//!
//! [`RecorderSink`] implements [`TraceSink`] and encodes events into a
//! `Vec<u8>` as fixed-size little-endian records. [`decode`] reads them back
//! as an iterator of [`RecordedEvent`].
//!
//! Present paths and terminate reasons are stored as a kind byte followed by
//! fixed-width operands, so every record of a given tag has the same size.

use imxdisp_core::flip::TerminateReason;
use imxdisp_core::present::{DropReason, PresentPath};
use imxdisp_core::stager::StageError;
use imxdisp_core::swap_chain::{ChainId, SwapChainError, WaitError, WaitOutcome};
use imxdisp_core::time::HostTime;
use imxdisp_core::trace::{
    AcquireEvent, BaselineRestoreEvent, FrameSummary, PhaseBeginEvent, PhaseEndEvent, PhaseKind,
    PresentEvent, TerminateEvent, TraceSink, WaitEvent,
};

// ---------------------------------------------------------------------------
// Event type discriminants
// ---------------------------------------------------------------------------

const TAG_ACQUIRE: u8 = 1;
const TAG_WAIT: u8 = 2;
const TAG_PHASE_BEGIN: u8 = 3;
const TAG_PHASE_END: u8 = 4;
const TAG_PRESENT: u8 = 5;
const TAG_BASELINE_RESTORE: u8 = 6;
const TAG_TERMINATE: u8 = 7;
const TAG_FRAME_SUMMARY: u8 = 8;

const PATH_DIRECT: u8 = 0;
const PATH_STAGED: u8 = 1;
const PATH_NO_TARGET: u8 = 2;
const PATH_INCOMPATIBLE_SURFACE: u8 = 3;
const PATH_MAP_FAILED: u8 = 4;
const PATH_PITCH_MISMATCH: u8 = 5;
const PATH_TRUNCATED: u8 = 6;

const REASON_DEVICE_ASSOCIATION: u8 = 0;
const REASON_ABANDONED: u8 = 1;
const REASON_WAIT_FAILED: u8 = 2;
const REASON_REQUESTED: u8 = 3;
const REASON_NOTIFY_FAILED: u8 = 4;

// ---------------------------------------------------------------------------
// RecorderSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that encodes events into a compact binary buffer.
#[derive(Debug, Default)]
pub struct RecorderSink {
    buf: Vec<u8>,
}

impl RecorderSink {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a view of the recorded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the recorder and returns the recorded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    // -- encoding helpers --------------------------------------------------

    fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_option_u32(&mut self, v: Option<u32>) {
        match v {
            Some(val) => {
                self.write_u8(1);
                self.write_u32(val);
            }
            None => {
                self.write_u8(0);
                self.write_u32(0);
            }
        }
    }

    fn write_phase(&mut self, p: PhaseKind) {
        self.write_u8(match p {
            PhaseKind::Acquire => 0,
            PhaseKind::Stage => 1,
            PhaseKind::Scanout => 2,
            PhaseKind::Notify => 3,
        });
    }

    fn write_outcome(&mut self, o: WaitOutcome) {
        self.write_u8(match o {
            WaitOutcome::NewFrame => 0,
            WaitOutcome::TimedOut => 1,
            WaitOutcome::Terminate => 2,
        });
    }

    fn write_path(&mut self, path: PresentPath) {
        let (kind, a, b) = match path {
            PresentPath::Direct { address } => (PATH_DIRECT, u64::from(address), 0),
            PresentPath::Staged { bytes } => (PATH_STAGED, widen(bytes), 0),
            PresentPath::Dropped(DropReason::NoTarget) => (PATH_NO_TARGET, 0, 0),
            PresentPath::Dropped(DropReason::StageFailed(StageError::IncompatibleSurface)) => {
                (PATH_INCOMPATIBLE_SURFACE, 0, 0)
            }
            PresentPath::Dropped(DropReason::StageFailed(StageError::MapFailed(code))) => {
                (PATH_MAP_FAILED, u64::from(code.cast_unsigned()), 0)
            }
            PresentPath::Dropped(DropReason::PitchMismatch { expected, actual }) => (
                PATH_PITCH_MISMATCH,
                u64::from(expected),
                u64::from(actual),
            ),
            PresentPath::Dropped(DropReason::Truncated { needed, available }) => {
                (PATH_TRUNCATED, widen(needed), widen(available))
            }
        };
        self.write_u8(kind);
        self.write_u64(a);
        self.write_u64(b);
    }

    fn write_reason(&mut self, reason: TerminateReason) {
        let (kind, code) = match reason {
            TerminateReason::DeviceAssociation(err) => {
                (REASON_DEVICE_ASSOCIATION, err.0.cast_unsigned())
            }
            TerminateReason::Abandoned(err) => (REASON_ABANDONED, err.0.cast_unsigned()),
            TerminateReason::WaitFailed(err) => (REASON_WAIT_FAILED, err.0),
            TerminateReason::Requested => (REASON_REQUESTED, 0),
            TerminateReason::NotifyFailed(err) => (REASON_NOTIFY_FAILED, err.0.cast_unsigned()),
        };
        self.write_u8(kind);
        self.write_u32(code);
    }
}

fn widen(v: usize) -> u64 {
    u64::try_from(v).unwrap_or(u64::MAX)
}

impl TraceSink for RecorderSink {
    fn on_acquire(&mut self, e: &AcquireEvent) {
        self.write_u8(TAG_ACQUIRE);
        self.write_u32(e.chain.0);
        self.write_u64(e.frame_index);
        self.write_u64(e.timestamp.ticks());
        self.write_u8(u8::from(e.ready));
        self.write_option_u32(e.scanout_address);
    }

    fn on_wait(&mut self, e: &WaitEvent) {
        self.write_u8(TAG_WAIT);
        self.write_u32(e.chain.0);
        self.write_u64(e.frame_index);
        self.write_u64(e.started.ticks());
        self.write_u64(e.finished.ticks());
        self.write_outcome(e.outcome);
    }

    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        self.write_u8(TAG_PHASE_BEGIN);
        self.write_u32(e.chain.0);
        self.write_u64(e.frame_index);
        self.write_phase(e.phase);
        self.write_u64(e.timestamp.ticks());
    }

    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        self.write_u8(TAG_PHASE_END);
        self.write_u32(e.chain.0);
        self.write_u64(e.frame_index);
        self.write_phase(e.phase);
        self.write_u64(e.timestamp.ticks());
    }

    fn on_present(&mut self, e: &PresentEvent) {
        self.write_u8(TAG_PRESENT);
        self.write_u32(e.chain.0);
        self.write_u64(e.frame_index);
        self.write_u64(e.timestamp.ticks());
        self.write_path(e.path);
    }

    fn on_baseline_restore(&mut self, e: &BaselineRestoreEvent) {
        self.write_u8(TAG_BASELINE_RESTORE);
        self.write_u32(e.chain.0);
        self.write_u64(e.frame_index);
        self.write_u64(e.timestamp.ticks());
        self.write_u32(e.from);
        self.write_u32(e.to);
    }

    fn on_terminate(&mut self, e: &TerminateEvent) {
        self.write_u8(TAG_TERMINATE);
        self.write_u32(e.chain.0);
        self.write_u64(e.timestamp.ticks());
        self.write_reason(e.reason);
        self.write_u64(e.frames_presented);
        self.write_u64(e.frames_dropped);
    }

    fn on_frame_summary(&mut self, s: &FrameSummary) {
        self.write_u8(TAG_FRAME_SUMMARY);
        self.write_u32(s.chain.0);
        self.write_u64(s.frame_index);
        self.write_u64(s.acquired_at.ticks());
        self.write_u32(s.waits);
        self.write_option_u32(s.presentation_frame);
        self.write_path(s.path);
        self.write_u8(u8::from(s.restored_baseline));
        self.write_u64(s.acquire_ticks);
        self.write_u64(s.stage_ticks);
        self.write_u64(s.scanout_ticks);
        self.write_u64(s.notify_ticks);
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// A decoded event from a binary recording.
#[derive(Clone, Debug)]
pub enum RecordedEvent {
    /// An [`AcquireEvent`].
    Acquire(AcquireEvent),
    /// A [`WaitEvent`].
    Wait(WaitEvent),
    /// A [`PhaseBeginEvent`].
    PhaseBegin(PhaseBeginEvent),
    /// A [`PhaseEndEvent`].
    PhaseEnd(PhaseEndEvent),
    /// A [`PresentEvent`].
    Present(PresentEvent),
    /// A [`BaselineRestoreEvent`].
    BaselineRestore(BaselineRestoreEvent),
    /// A [`TerminateEvent`].
    Terminate(TerminateEvent),
    /// A [`FrameSummary`].
    FrameSummary(FrameSummary),
}

/// Decodes a byte slice produced by [`RecorderSink`] into an iterator of
/// [`RecordedEvent`].
///
/// Iteration stops at the first unknown tag or truncated record.
pub fn decode(bytes: &[u8]) -> DecodeIter<'_> {
    DecodeIter {
        data: bytes,
        pos: 0,
    }
}

/// Iterator over decoded events.
#[derive(Debug)]
pub struct DecodeIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl DecodeIter<'_> {
    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let bytes: [u8; N] = self.data.get(self.pos..self.pos + N)?.try_into().ok()?;
        self.pos += N;
        Some(bytes)
    }

    fn read_u8(&mut self) -> Option<u8> {
        self.take::<1>().map(|[v]| v)
    }

    fn read_u32(&mut self) -> Option<u32> {
        self.take().map(u32::from_le_bytes)
    }

    fn read_u64(&mut self) -> Option<u64> {
        self.take().map(u64::from_le_bytes)
    }

    fn read_time(&mut self) -> Option<HostTime> {
        self.read_u64().map(HostTime)
    }

    fn read_bool(&mut self) -> Option<bool> {
        self.read_u8().map(|v| v != 0)
    }

    fn read_option_u32(&mut self) -> Option<Option<u32>> {
        let present = self.read_bool()?;
        let val = self.read_u32()?;
        Some(present.then_some(val))
    }

    fn read_phase(&mut self) -> Option<PhaseKind> {
        Some(match self.read_u8()? {
            0 => PhaseKind::Acquire,
            1 => PhaseKind::Stage,
            2 => PhaseKind::Scanout,
            _ => PhaseKind::Notify,
        })
    }

    fn read_outcome(&mut self) -> Option<WaitOutcome> {
        Some(match self.read_u8()? {
            0 => WaitOutcome::NewFrame,
            1 => WaitOutcome::TimedOut,
            _ => WaitOutcome::Terminate,
        })
    }

    fn read_path(&mut self) -> Option<PresentPath> {
        let kind = self.read_u8()?;
        let a = self.read_u64()?;
        let b = self.read_u64()?;
        let narrow = |v: u64| usize::try_from(v).ok();
        Some(match kind {
            PATH_DIRECT => PresentPath::Direct {
                address: u32::try_from(a).ok()?,
            },
            PATH_STAGED => PresentPath::Staged { bytes: narrow(a)? },
            PATH_NO_TARGET => PresentPath::Dropped(DropReason::NoTarget),
            PATH_INCOMPATIBLE_SURFACE => {
                PresentPath::Dropped(DropReason::StageFailed(StageError::IncompatibleSurface))
            }
            PATH_MAP_FAILED => PresentPath::Dropped(DropReason::StageFailed(
                StageError::MapFailed(u32::try_from(a).ok()?.cast_signed()),
            )),
            PATH_PITCH_MISMATCH => PresentPath::Dropped(DropReason::PitchMismatch {
                expected: u32::try_from(a).ok()?,
                actual: u32::try_from(b).ok()?,
            }),
            PATH_TRUNCATED => PresentPath::Dropped(DropReason::Truncated {
                needed: narrow(a)?,
                available: narrow(b)?,
            }),
            _ => return None,
        })
    }

    fn read_reason(&mut self) -> Option<TerminateReason> {
        let kind = self.read_u8()?;
        let code = self.read_u32()?;
        let chain_err = SwapChainError(code.cast_signed());
        Some(match kind {
            REASON_DEVICE_ASSOCIATION => TerminateReason::DeviceAssociation(chain_err),
            REASON_ABANDONED => TerminateReason::Abandoned(chain_err),
            REASON_WAIT_FAILED => TerminateReason::WaitFailed(WaitError(code)),
            REASON_REQUESTED => TerminateReason::Requested,
            REASON_NOTIFY_FAILED => TerminateReason::NotifyFailed(chain_err),
            _ => return None,
        })
    }

    fn decode_acquire(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Acquire(AcquireEvent {
            chain: ChainId(self.read_u32()?),
            frame_index: self.read_u64()?,
            timestamp: self.read_time()?,
            ready: self.read_bool()?,
            scanout_address: self.read_option_u32()?,
        }))
    }

    fn decode_wait(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Wait(WaitEvent {
            chain: ChainId(self.read_u32()?),
            frame_index: self.read_u64()?,
            started: self.read_time()?,
            finished: self.read_time()?,
            outcome: self.read_outcome()?,
        }))
    }

    fn decode_phase_begin(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::PhaseBegin(PhaseBeginEvent {
            chain: ChainId(self.read_u32()?),
            frame_index: self.read_u64()?,
            phase: self.read_phase()?,
            timestamp: self.read_time()?,
        }))
    }

    fn decode_phase_end(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::PhaseEnd(PhaseEndEvent {
            chain: ChainId(self.read_u32()?),
            frame_index: self.read_u64()?,
            phase: self.read_phase()?,
            timestamp: self.read_time()?,
        }))
    }

    fn decode_present(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Present(PresentEvent {
            chain: ChainId(self.read_u32()?),
            frame_index: self.read_u64()?,
            timestamp: self.read_time()?,
            path: self.read_path()?,
        }))
    }

    fn decode_baseline_restore(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::BaselineRestore(BaselineRestoreEvent {
            chain: ChainId(self.read_u32()?),
            frame_index: self.read_u64()?,
            timestamp: self.read_time()?,
            from: self.read_u32()?,
            to: self.read_u32()?,
        }))
    }

    fn decode_terminate(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Terminate(TerminateEvent {
            chain: ChainId(self.read_u32()?),
            timestamp: self.read_time()?,
            reason: self.read_reason()?,
            frames_presented: self.read_u64()?,
            frames_dropped: self.read_u64()?,
        }))
    }

    fn decode_frame_summary(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::FrameSummary(FrameSummary {
            chain: ChainId(self.read_u32()?),
            frame_index: self.read_u64()?,
            acquired_at: self.read_time()?,
            waits: self.read_u32()?,
            presentation_frame: self.read_option_u32()?,
            path: self.read_path()?,
            restored_baseline: self.read_bool()?,
            acquire_ticks: self.read_u64()?,
            stage_ticks: self.read_u64()?,
            scanout_ticks: self.read_u64()?,
            notify_ticks: self.read_u64()?,
        }))
    }
}

impl Iterator for DecodeIter<'_> {
    type Item = RecordedEvent;

    fn next(&mut self) -> Option<Self::Item> {
        let tag = self.read_u8()?;
        match tag {
            TAG_ACQUIRE => self.decode_acquire(),
            TAG_WAIT => self.decode_wait(),
            TAG_PHASE_BEGIN => self.decode_phase_begin(),
            TAG_PHASE_END => self.decode_phase_end(),
            TAG_PRESENT => self.decode_present(),
            TAG_BASELINE_RESTORE => self.decode_baseline_restore(),
            TAG_TERMINATE => self.decode_terminate(),
            TAG_FRAME_SUMMARY => self.decode_frame_summary(),
            _ => None, // unknown tag → stop iteration
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn present(frame_index: u64, path: PresentPath) -> PresentEvent {
        PresentEvent {
            chain: ChainId(2),
            frame_index,
            timestamp: HostTime(1_000 + frame_index),
            path,
        }
    }

    fn decoded_paths(bytes: &[u8]) -> Vec<PresentPath> {
        decode(bytes)
            .map(|e| match e {
                RecordedEvent::Present(p) => p.path,
                other => panic!("expected Present, got {other:?}"),
            })
            .collect()
    }

    #[test]
    fn every_present_path_survives_recording() {
        let paths = [
            PresentPath::Direct {
                address: 0x1000_0000,
            },
            PresentPath::Staged { bytes: 3_686_400 },
            PresentPath::Dropped(DropReason::NoTarget),
            PresentPath::Dropped(DropReason::StageFailed(StageError::IncompatibleSurface)),
            PresentPath::Dropped(DropReason::StageFailed(StageError::MapFailed(-2_147_024_809))),
            PresentPath::Dropped(DropReason::PitchMismatch {
                expected: 5120,
                actual: 5184,
            }),
            PresentPath::Dropped(DropReason::Truncated {
                needed: 3_686_400,
                available: 4096,
            }),
        ];
        let mut rec = RecorderSink::new();
        for (i, path) in paths.iter().enumerate() {
            rec.on_present(&present(i as u64, *path));
        }

        assert_eq!(decoded_paths(rec.as_bytes()), paths);
    }

    #[test]
    fn terminate_keeps_reason_and_counters() {
        let mut rec = RecorderSink::new();
        rec.on_terminate(&TerminateEvent {
            chain: ChainId(9),
            timestamp: HostTime(77),
            reason: TerminateReason::Abandoned(SwapChainError::ACCESS_LOST),
            frames_presented: 120,
            frames_dropped: 3,
        });
        rec.on_terminate(&TerminateEvent {
            chain: ChainId(10),
            timestamp: HostTime(78),
            reason: TerminateReason::WaitFailed(WaitError(0x80)),
            frames_presented: 0,
            frames_dropped: 0,
        });

        let events: Vec<_> = decode(rec.as_bytes()).collect();
        assert_eq!(events.len(), 2);
        match &events[0] {
            RecordedEvent::Terminate(e) => {
                assert_eq!(e.chain, ChainId(9));
                assert_eq!(
                    e.reason,
                    TerminateReason::Abandoned(SwapChainError::ACCESS_LOST),
                    "negative HRESULT must come back intact"
                );
                assert_eq!(e.frames_presented, 120);
                assert_eq!(e.frames_dropped, 3);
            }
            other => panic!("expected Terminate, got {other:?}"),
        }
        assert!(matches!(
            events[1],
            RecordedEvent::Terminate(TerminateEvent {
                reason: TerminateReason::WaitFailed(WaitError(0x80)),
                ..
            })
        ));
    }

    #[test]
    fn one_frame_in_order() {
        let mut rec = RecorderSink::new();
        rec.on_acquire(&AcquireEvent {
            chain: ChainId(0),
            frame_index: 0,
            timestamp: HostTime(10),
            ready: false,
            scanout_address: None,
        });
        rec.on_wait(&WaitEvent {
            chain: ChainId(0),
            frame_index: 0,
            started: HostTime(11),
            finished: HostTime(20),
            outcome: WaitOutcome::NewFrame,
        });
        rec.on_acquire(&AcquireEvent {
            chain: ChainId(0),
            frame_index: 0,
            timestamp: HostTime(21),
            ready: true,
            scanout_address: Some(0x1000_0000),
        });
        rec.on_phase_begin(&PhaseBeginEvent {
            chain: ChainId(0),
            frame_index: 0,
            phase: PhaseKind::Scanout,
            timestamp: HostTime(22),
        });
        rec.on_phase_end(&PhaseEndEvent {
            chain: ChainId(0),
            frame_index: 0,
            phase: PhaseKind::Scanout,
            timestamp: HostTime(23),
        });
        rec.on_baseline_restore(&BaselineRestoreEvent {
            chain: ChainId(0),
            frame_index: 0,
            timestamp: HostTime(24),
            from: 0x1000_0000,
            to: 0x9000_0000,
        });

        let events: Vec<_> = decode(rec.as_bytes()).collect();
        assert_eq!(events.len(), 6);
        assert!(matches!(
            events[0],
            RecordedEvent::Acquire(AcquireEvent {
                ready: false,
                scanout_address: None,
                ..
            })
        ));
        assert!(matches!(
            events[1],
            RecordedEvent::Wait(WaitEvent {
                outcome: WaitOutcome::NewFrame,
                ..
            })
        ));
        assert!(matches!(
            events[2],
            RecordedEvent::Acquire(AcquireEvent {
                ready: true,
                scanout_address: Some(0x1000_0000),
                ..
            })
        ));
        assert!(matches!(
            events[3],
            RecordedEvent::PhaseBegin(PhaseBeginEvent {
                phase: PhaseKind::Scanout,
                ..
            })
        ));
        assert!(matches!(events[4], RecordedEvent::PhaseEnd(_)));
        assert!(matches!(
            events[5],
            RecordedEvent::BaselineRestore(BaselineRestoreEvent {
                timestamp: HostTime(24),
                to: 0x9000_0000,
                ..
            })
        ));
    }

    #[test]
    fn summary_keeps_phase_durations() {
        let mut rec = RecorderSink::new();
        rec.on_frame_summary(&FrameSummary {
            chain: ChainId(1),
            frame_index: 4,
            acquired_at: HostTime(500),
            waits: 2,
            presentation_frame: Some(11),
            path: PresentPath::Staged { bytes: 32 },
            restored_baseline: true,
            acquire_ticks: 5,
            stage_ticks: 400,
            scanout_ticks: 0,
            notify_ticks: 7,
        });

        let Some(RecordedEvent::FrameSummary(s)) = decode(rec.as_bytes()).next() else {
            panic!("expected FrameSummary");
        };
        assert_eq!(s.waits, 2);
        assert_eq!(s.presentation_frame, Some(11));
        assert_eq!(s.path, PresentPath::Staged { bytes: 32 });
        assert!(s.restored_baseline);
        assert_eq!(
            (s.acquire_ticks, s.stage_ticks, s.scanout_ticks, s.notify_ticks),
            (5, 400, 0, 7)
        );
    }

    #[test]
    fn truncated_recording_stops_at_last_whole_record() {
        let mut rec = RecorderSink::new();
        rec.on_present(&present(0, PresentPath::Staged { bytes: 8 }));
        rec.on_present(&present(1, PresentPath::Staged { bytes: 8 }));
        let bytes = rec.into_bytes();

        let cut = &bytes[..bytes.len() - 3];
        assert_eq!(decode(cut).count(), 1);
    }

    #[test]
    fn unknown_tag_stops_iteration() {
        let mut rec = RecorderSink::new();
        rec.on_present(&present(0, PresentPath::Dropped(DropReason::NoTarget)));
        let mut bytes = rec.into_bytes();
        bytes.push(0xee);
        bytes.extend_from_slice(&[0; 16]);

        assert_eq!(decode(&bytes).count(), 1);
    }

    #[test]
    fn empty_buffer_decodes_to_nothing() {
        let events: Vec<_> = decode(&[]).collect();
        assert!(events.is_empty(), "no bytes, no events");
    }
}
