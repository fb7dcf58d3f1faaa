// Copyright 2026 the imxdisp Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! D3D11 staging texture for CPU readback of acquired surfaces.

use core::ptr::NonNull;

use imxdisp_core::frame::FrameBufferDesc;
use imxdisp_core::stager::{BufferStager, StageError};
use windows::Win32::Foundation::E_POINTER;
use windows::Win32::Graphics::Direct3D11::{
    D3D11_CPU_ACCESS_READ, D3D11_MAP_READ, D3D11_MAPPED_SUBRESOURCE, D3D11_TEXTURE2D_DESC,
    D3D11_USAGE_STAGING, ID3D11Device, ID3D11DeviceContext, ID3D11Resource, ID3D11Texture2D,
};
use windows::Win32::Graphics::Dxgi::Common::{DXGI_FORMAT_B8G8R8A8_UNORM, DXGI_SAMPLE_DESC};
use windows::Win32::Graphics::Dxgi::IDXGIResource;
use windows_core::Interface;

#[derive(Debug)]
struct Mapping {
    data: NonNull<u8>,
    len: usize,
}

/// A `B8G8R8A8` staging texture the size of one frame, with the immediate
/// context used to fill and map it.
#[derive(Debug)]
pub struct D3d11Stager {
    context: ID3D11DeviceContext,
    staging: ID3D11Resource,
    height: u32,
    mapping: Option<Mapping>,
}

// SAFETY: the stager is moved onto the flip thread and used only there. The
// immediate context is not free-threaded but may change threads when no other
// thread uses it, and no other handle to it is kept by the stager's owner.
unsafe impl Send for D3d11Stager {}

impl D3d11Stager {
    /// Creates a staging texture sized for `desc` on `device`.
    ///
    /// `context` must be `device`'s immediate context and must not be used by
    /// any other thread while the stager is alive.
    ///
    /// # Errors
    ///
    /// Returns the Direct3D error if the texture cannot be created.
    pub fn new(
        device: &ID3D11Device,
        context: ID3D11DeviceContext,
        desc: &FrameBufferDesc,
    ) -> windows_core::Result<Self> {
        let texture_desc = D3D11_TEXTURE2D_DESC {
            Width: desc.width,
            Height: desc.height,
            MipLevels: 1,
            ArraySize: 1,
            Format: DXGI_FORMAT_B8G8R8A8_UNORM,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            Usage: D3D11_USAGE_STAGING,
            BindFlags: 0,
            CPUAccessFlags: D3D11_CPU_ACCESS_READ.0.cast_unsigned(),
            MiscFlags: 0,
        };
        let mut texture: Option<ID3D11Texture2D> = None;
        // SAFETY: `texture_desc` and `texture` are valid for the call; no
        // initial data is supplied for a staging texture.
        unsafe { device.CreateTexture2D(&texture_desc, None, Some(&mut texture)) }?;
        let staging = texture
            .ok_or_else(|| windows_core::Error::from(E_POINTER))?
            .cast::<ID3D11Resource>()?;
        Ok(Self {
            context,
            staging,
            height: desc.height,
            mapping: None,
        })
    }
}

impl BufferStager for D3d11Stager {
    type Surface = IDXGIResource;

    fn copy_and_map(&mut self, source: &IDXGIResource) -> Result<u32, StageError> {
        self.unmap();
        let source: ID3D11Resource = source
            .cast()
            .map_err(|_| StageError::IncompatibleSurface)?;

        // SAFETY: both resources are live; CopyResource validates that their
        // dimensions and formats match and does nothing if they do not.
        unsafe { self.context.CopyResource(&self.staging, &source) };

        let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
        // SAFETY: the staging texture was created with CPU read access.
        // Mapping for read waits for the copy above to complete.
        unsafe {
            self.context
                .Map(&self.staging, 0, D3D11_MAP_READ, 0, Some(&mut mapped))
        }
        .map_err(|err| StageError::MapFailed(err.code().0))?;

        let len = mapped.RowPitch as usize * self.height as usize;
        match NonNull::new(mapped.pData.cast::<u8>()) {
            Some(data) => {
                self.mapping = Some(Mapping { data, len });
                Ok(mapped.RowPitch)
            }
            None => {
                // SAFETY: the map above succeeded.
                unsafe { self.context.Unmap(&self.staging, 0) };
                Err(StageError::MapFailed(E_POINTER.0))
            }
        }
    }

    fn mapped(&self) -> &[u8] {
        match &self.mapping {
            // SAFETY: the subresource stays mapped until `unmap`, which needs
            // `&mut self`, so the slice cannot outlive the mapping. D3D11
            // guarantees `RowPitch * Height` readable bytes.
            Some(m) => unsafe { core::slice::from_raw_parts(m.data.as_ptr(), m.len) },
            None => &[],
        }
    }

    fn unmap(&mut self) {
        if self.mapping.take().is_some() {
            // SAFETY: subresource 0 is currently mapped.
            unsafe { self.context.Unmap(&self.staging, 0) };
        }
    }
}

impl Drop for D3d11Stager {
    fn drop(&mut self) {
        self.unmap();
    }
}
