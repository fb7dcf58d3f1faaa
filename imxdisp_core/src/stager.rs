// Copyright 2026 the imxdisp Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! GPU → CPU staging contract for the copy path.
//!
//! A [`BufferStager`] owns one staging surface sized to the committed mode.
//! [`StagedFrame::stage`] copies a source surface into it, maps it for
//! reading, and returns a guard. The guard exposes the mapped bytes and
//! unmaps on drop, so every successful map is paired with exactly one unmap
//! no matter which branch the caller leaves through.

use core::fmt;

/// Why a surface could not be staged for CPU access.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StageError {
    /// The surface could not be viewed as a copyable resource.
    IncompatibleSurface,
    /// Mapping the staging surface for read failed with the given status.
    MapFailed(i32),
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IncompatibleSurface => f.write_str("surface cannot be copied to staging"),
            Self::MapFailed(code) => write!(f, "staging map failed ({code:#x})"),
        }
    }
}

impl core::error::Error for StageError {}

/// Copies GPU-resident surfaces into a CPU-readable staging surface.
///
/// Calls always alternate: [`copy_and_map`](Self::copy_and_map), then
/// [`unmap`](Self::unmap) if and only if the map succeeded. Use
/// [`StagedFrame::stage`] instead of calling these directly.
pub trait BufferStager {
    /// Source surface type.
    type Surface;

    /// Copies `source` into the staging surface and maps it for reading.
    ///
    /// Blocks until the GPU copy has completed. On success returns the row
    /// pitch of the mapping in bytes; the mapping stays valid until
    /// [`unmap`](Self::unmap).
    ///
    /// # Errors
    ///
    /// On error nothing is left mapped.
    fn copy_and_map(&mut self, source: &Self::Surface) -> Result<u32, StageError>;

    /// Returns the currently mapped bytes, or an empty slice if not mapped.
    fn mapped(&self) -> &[u8];

    /// Unmaps the staging surface.
    fn unmap(&mut self);
}

/// A mapped staging surface. Unmaps when dropped.
pub struct StagedFrame<'a, B: BufferStager + ?Sized> {
    stager: &'a mut B,
    row_pitch: u32,
}

impl<'a, B: BufferStager + ?Sized> StagedFrame<'a, B> {
    /// Copies and maps `source`, returning a guard over the mapping.
    ///
    /// # Errors
    ///
    /// Propagates the stager's [`StageError`]; no unmap is owed in that case.
    pub fn stage(stager: &'a mut B, source: &B::Surface) -> Result<Self, StageError> {
        let row_pitch = stager.copy_and_map(source)?;
        Ok(Self { stager, row_pitch })
    }

    /// Row pitch reported by the mapping.
    #[inline]
    #[must_use]
    pub fn row_pitch(&self) -> u32 {
        self.row_pitch
    }

    /// The mapped bytes.
    #[inline]
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        self.stager.mapped()
    }
}

impl<B: BufferStager + ?Sized> Drop for StagedFrame<'_, B> {
    fn drop(&mut self) {
        self.stager.unmap();
    }
}

impl<B: BufferStager + ?Sized> fmt::Debug for StagedFrame<'_, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagedFrame")
            .field("row_pitch", &self.row_pitch)
            .finish_non_exhaustive()
    }
}
