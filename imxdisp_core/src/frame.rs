// Copyright 2026 the imxdisp Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Frame buffer geometry and acquired swap-chain buffers.
//!
//! [`FrameBufferDesc`] is fixed for the lifetime of one committed
//! [`DisplayMode`]. [`AcquiredBuffer`] wraps one producer surface together with
//! the physical placement the producer reported for it.

use core::fmt;

/// Pixel layout of every surface the pipeline handles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    /// 32-bit blue, green, red, alpha; 8 bits per channel.
    #[default]
    Bgra8,
}

impl PixelFormat {
    /// Size of one pixel in bytes.
    #[inline]
    #[must_use]
    pub const fn bytes_per_pixel(self) -> u32 {
        match self {
            Self::Bgra8 => 4,
        }
    }
}

/// A committed display mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DisplayMode {
    /// Active width in pixels.
    pub width: u32,
    /// Active height in pixels.
    pub height: u32,
}

impl DisplayMode {
    /// 1280×720, the only mode the i.MX 8M panel path commits.
    pub const HD_720: Self = Self {
        width: 0x500,
        height: 0x2d0,
    };
}

impl Default for DisplayMode {
    fn default() -> Self {
        Self::HD_720
    }
}

/// Geometry of the destination frame buffer and of the staging surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameBufferDesc {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel layout.
    pub format: PixelFormat,
    /// Bytes between the starts of consecutive rows.
    pub row_pitch: u32,
}

impl FrameBufferDesc {
    /// Returns the tightly packed descriptor for `mode`.
    #[must_use]
    pub const fn for_mode(mode: DisplayMode) -> Self {
        let format = PixelFormat::Bgra8;
        Self {
            width: mode.width,
            height: mode.height,
            format,
            row_pitch: mode.width * format.bytes_per_pixel(),
        }
    }

    /// Bytes in one row of visible pixels (`width * 4`).
    #[inline]
    #[must_use]
    pub const fn row_bytes(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel() as usize
    }

    /// Bytes in the whole frame (`height * row_pitch`).
    #[inline]
    #[must_use]
    pub const fn frame_bytes(&self) -> usize {
        self.height as usize * self.row_pitch as usize
    }
}

/// Decodes the physical address a producer reported for a surface.
///
/// The producer only places surfaces in the physically contiguous heap below
/// 4 GiB, so a usable address has a zero high word and a non-zero low word.
/// Anything else means the surface lives somewhere the scanout engine cannot
/// reach.
#[inline]
#[must_use]
#[expect(
    clippy::cast_possible_truncation,
    reason = "the high word is checked separately; only the low word is kept"
)]
pub const fn scanout_address(reported: u64) -> Option<u32> {
    let high = reported >> 32;
    let low = reported as u32;
    if high == 0 && low != 0 {
        Some(low)
    } else {
        None
    }
}

/// One producer surface held by the flip loop for a single iteration.
///
/// Dropping the buffer returns the surface to the producer's ownership; the
/// flip loop drops it before requesting the next one.
pub struct AcquiredBuffer<S> {
    /// The rendered surface.
    pub surface: S,
    /// Raw physical address reported alongside the surface (0 if none).
    pub reported_address: u64,
    /// Producer-side presentation counter, if the producer supplies one.
    pub presentation_frame: Option<u32>,
}

impl<S> AcquiredBuffer<S> {
    /// Wraps a surface with no reported physical placement.
    #[must_use]
    pub fn new(surface: S) -> Self {
        Self {
            surface,
            reported_address: 0,
            presentation_frame: None,
        }
    }

    /// Sets the reported physical address.
    #[must_use]
    pub fn with_reported_address(mut self, address: u64) -> Self {
        self.reported_address = address;
        self
    }

    /// Returns the scanout-reachable address of this buffer, if any.
    #[inline]
    #[must_use]
    pub fn scanout_address(&self) -> Option<u32> {
        scanout_address(self.reported_address)
    }
}

impl<S> fmt::Debug for AcquiredBuffer<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcquiredBuffer")
            .field("reported_address", &format_args!("{:#x}", self.reported_address))
            .field("presentation_frame", &self.presentation_frame)
            .finish_non_exhaustive()
    }
}
