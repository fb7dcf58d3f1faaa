// Copyright 2026 the imxdisp Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-frame update strategy.
//!
//! [`DisplaySink::present`] picks one of three paths for each acquired buffer:
//!
//! ```text
//!   scanout address known ─┬─ register configured ─► register write (direct)
//!   and direct enabled     │
//!                          └─ otherwise ─┐
//!   no usable address ───────────────────┤
//!                                        ▼
//!                  linear buffer configured? ── no ──► dropped (NoTarget)
//!                                        │ yes
//!                                        ▼
//!                  stage → pitch check → copy → unmap ─► staged
//!                                        │
//!                                        ▼
//!                  baseline restore (policy)
//! ```
//!
//! Dropped frames are not errors; the loop keeps going.

use core::fmt;

use crate::frame::{AcquiredBuffer, FrameBufferDesc};
use crate::sink::{DisplaySink, LinearBuffer, ScanoutRegister};
use crate::stager::{BufferStager, StageError, StagedFrame};

/// What to do with the bank-switch register after a staged present.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum BaselinePolicy {
    /// Leave the register alone.
    Leave,
    /// Point scanout back at the firmware frame buffer if it moved.
    #[default]
    RestoreAfterStaged,
}

/// Why a frame produced no visible update.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// Neither a usable register path nor a linear buffer is configured.
    NoTarget,
    /// Copying or mapping the surface failed.
    StageFailed(StageError),
    /// The mapping's row pitch is not `width * 4`.
    PitchMismatch {
        /// Row pitch the frame buffer needs.
        expected: u32,
        /// Row pitch the mapping reported.
        actual: u32,
    },
    /// The mapping or the linear buffer is smaller than one frame.
    Truncated {
        /// Bytes one frame occupies.
        needed: usize,
        /// Bytes that were available.
        available: usize,
    },
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoTarget => f.write_str("no display target configured"),
            Self::StageFailed(err) => write!(f, "{err}"),
            Self::PitchMismatch { expected, actual } => {
                write!(f, "row pitch {actual} does not match {expected}")
            }
            Self::Truncated { needed, available } => {
                write!(f, "frame needs {needed} bytes, only {available} available")
            }
        }
    }
}

/// Path a frame took to the display.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PresentPath {
    /// Scanout was pointed at the surface itself.
    Direct {
        /// Physical address written to the register.
        address: u32,
    },
    /// The surface was copied into the linear buffer.
    Staged {
        /// Bytes copied.
        bytes: usize,
    },
    /// Nothing was written.
    Dropped(DropReason),
}

/// A register rewrite back to the firmware frame buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BaselineRestore {
    /// Value the register held before the restore.
    pub from: u32,
    /// Baseline value written.
    pub to: u32,
}

/// Result of presenting one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PresentOutcome {
    /// Path taken.
    pub path: PresentPath,
    /// Baseline restore performed after the present, if any.
    pub restored: Option<BaselineRestore>,
}

/// Knobs for [`DisplaySink::present`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PresentPolicy {
    /// Allow flipping scanout directly to producer surfaces.
    pub direct_scanout: bool,
    /// Register handling after staged presents.
    pub baseline: BaselinePolicy,
}

impl<R: ScanoutRegister, L: LinearBuffer> DisplaySink<R, L> {
    /// Presents one acquired buffer.
    ///
    /// `stager` is only touched on the copy path, and then for exactly one
    /// copy/map/unmap cycle.
    pub fn present<B: BufferStager + ?Sized>(
        &mut self,
        stager: &mut B,
        buffer: &AcquiredBuffer<B::Surface>,
        desc: &FrameBufferDesc,
        policy: PresentPolicy,
    ) -> PresentOutcome {
        if let Some(address) = self.direct_address(buffer, policy)
            && let Some(bank) = &self.bank_switch
        {
            bank.register().write(address);
            return PresentOutcome {
                path: PresentPath::Direct { address },
                restored: None,
            };
        }

        let path = self.copy_to_linear(stager, &buffer.surface, desc);
        let restored = match (path, policy.baseline) {
            (PresentPath::Staged { .. }, BaselinePolicy::RestoreAfterStaged) => {
                self.restore_baseline()
            }
            _ => None,
        };
        PresentOutcome { path, restored }
    }

    /// Returns the address [`present`](Self::present) would write for
    /// `buffer`, or `None` if it would take the copy path.
    #[must_use]
    pub fn direct_address<S>(&self, buffer: &AcquiredBuffer<S>, policy: PresentPolicy) -> Option<u32> {
        if !policy.direct_scanout || self.bank_switch.is_none() {
            return None;
        }
        buffer.scanout_address()
    }

    fn copy_to_linear<B: BufferStager + ?Sized>(
        &mut self,
        stager: &mut B,
        surface: &B::Surface,
        desc: &FrameBufferDesc,
    ) -> PresentPath {
        let Some(linear) = self.linear.as_mut() else {
            return PresentPath::Dropped(DropReason::NoTarget);
        };

        let staged = match StagedFrame::stage(stager, surface) {
            Ok(staged) => staged,
            Err(err) => return PresentPath::Dropped(DropReason::StageFailed(err)),
        };

        let expected = desc.row_pitch;
        if staged.row_pitch() != expected {
            return PresentPath::Dropped(DropReason::PitchMismatch {
                expected,
                actual: staged.row_pitch(),
            });
        }

        let needed = desc.frame_bytes();
        let available = staged.bytes().len().min(linear.capacity());
        if available < needed {
            return PresentPath::Dropped(DropReason::Truncated { needed, available });
        }

        linear.write_frame(&staged.bytes()[..needed]);
        PresentPath::Staged { bytes: needed }
    }

    fn restore_baseline(&self) -> Option<BaselineRestore> {
        let bank = self.bank_switch.as_ref()?;
        let baseline = bank.baseline()?;
        let current = bank.register().read();
        if current == baseline {
            return None;
        }
        bank.register().write(baseline);
        Some(BaselineRestore {
            from: current,
            to: baseline,
        })
    }
}
