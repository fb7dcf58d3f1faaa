// Copyright 2026 the imxdisp Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A CPU-only display device.
//!
//! Everything the flip loop talks to, backed by plain memory: an atomic word
//! standing in for the bank-switch register, a heap frame buffer, a stager
//! that copies pixel rows, and two swap-chains (a channel fed by a
//! [`FrameProducer`] and a fixed script). Used by tests and by the demo.

use std::collections::VecDeque;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError};
use std::sync::{Arc, Mutex, PoisonError};

use bytemuck::{Pod, Zeroable};
use imxdisp_core::frame::{AcquiredBuffer, FrameBufferDesc};
use imxdisp_core::sink::{LinearBuffer, ScanoutRegister};
use imxdisp_core::stager::{BufferStager, StageError};
use imxdisp_core::swap_chain::{Acquired, SwapChain, SwapChainError};

use crate::context::DeviceFactory;
use crate::events::SwapChainEvents;
use crate::resources::{IoSpace, MemoryResource};

// ---------------------------------------------------------------------------
// Pixels
// ---------------------------------------------------------------------------

/// One 32-bit BGRA pixel, laid out as the display controller reads it.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct Bgra8 {
    /// Blue.
    pub b: u8,
    /// Green.
    pub g: u8,
    /// Red.
    pub r: u8,
    /// Alpha.
    pub a: u8,
}

impl Bgra8 {
    /// Opaque black.
    pub const BLACK: Self = Self::opaque(0, 0, 0);

    /// An opaque color from red, green, blue.
    #[must_use]
    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { b, g, r, a: 0xff }
    }
}

/// A rendered producer surface in system memory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SoftSurface {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Tightly packed rows, top to bottom.
    pub pixels: Vec<Bgra8>,
}

impl SoftSurface {
    /// A surface sized for `desc` filled with `color`.
    #[must_use]
    pub fn filled(desc: &FrameBufferDesc, color: Bgra8) -> Self {
        Self {
            width: desc.width,
            height: desc.height,
            pixels: vec![color; desc.width as usize * desc.height as usize],
        }
    }

    /// A black surface sized for `desc`.
    #[must_use]
    pub fn blank(desc: &FrameBufferDesc) -> Self {
        Self::filled(desc, Bgra8::BLACK)
    }

    /// Pixel row `y`, if in bounds.
    #[must_use]
    pub fn row(&self, y: u32) -> Option<&[Bgra8]> {
        let width = self.width as usize;
        let start = y as usize * width;
        self.pixels.get(start..start + width)
    }
}

// ---------------------------------------------------------------------------
// Display sink
// ---------------------------------------------------------------------------

/// An in-memory bank-switch register. Clones share the same word.
#[derive(Clone, Debug, Default)]
pub struct MemoryRegister(Arc<AtomicU32>);

impl MemoryRegister {
    /// A register holding `initial`.
    #[must_use]
    pub fn new(initial: u32) -> Self {
        Self(Arc::new(AtomicU32::new(initial)))
    }

    /// Current value.
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }
}

impl ScanoutRegister for MemoryRegister {
    fn read(&self) -> u32 {
        self.value()
    }

    fn write(&self, address: u32) {
        self.0.store(address, Ordering::Release);
    }
}

/// A heap frame buffer. Clones share the same pixels.
#[derive(Clone, Debug)]
pub struct HeapFrameBuffer {
    pixels: Arc<Mutex<Vec<Bgra8>>>,
}

impl HeapFrameBuffer {
    /// A zeroed buffer large enough for one frame of `desc`.
    #[must_use]
    pub fn new(desc: &FrameBufferDesc) -> Self {
        let count = desc.frame_bytes() / size_of::<Bgra8>();
        Self {
            pixels: Arc::new(Mutex::new(vec![Bgra8::zeroed(); count])),
        }
    }

    /// Copies out the current contents.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Bgra8> {
        self.pixels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl LinearBuffer for HeapFrameBuffer {
    fn capacity(&self) -> usize {
        self.pixels.lock().unwrap_or_else(PoisonError::into_inner).len() * size_of::<Bgra8>()
    }

    fn write_frame(&mut self, frame: &[u8]) {
        let mut pixels = self.pixels.lock().unwrap_or_else(PoisonError::into_inner);
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(pixels.as_mut_slice());
        bytes[..frame.len()].copy_from_slice(frame);
    }
}

// ---------------------------------------------------------------------------
// Stager
// ---------------------------------------------------------------------------

/// Copies [`SoftSurface`] rows into a staging buffer with a fixed row pitch.
#[derive(Debug)]
pub struct SoftwareStager {
    width: u32,
    height: u32,
    row_pitch: u32,
    staging: Vec<u8>,
    mapped: bool,
    copies: u64,
}

impl SoftwareStager {
    /// A staging surface matching `desc`.
    #[must_use]
    pub fn new(desc: &FrameBufferDesc) -> Self {
        Self::with_row_pitch(desc, desc.row_pitch)
    }

    /// A staging surface whose rows are padded to `row_pitch` bytes.
    ///
    /// `row_pitch` is raised to at least one packed row.
    #[must_use]
    pub fn with_row_pitch(desc: &FrameBufferDesc, row_pitch: u32) -> Self {
        let row_bytes = desc.width * desc.format.bytes_per_pixel();
        let row_pitch = row_pitch.max(row_bytes);
        Self {
            width: desc.width,
            height: desc.height,
            row_pitch,
            staging: vec![0; row_pitch as usize * desc.height as usize],
            mapped: false,
            copies: 0,
        }
    }

    /// Completed copy/map cycles.
    #[must_use]
    pub fn copies(&self) -> u64 {
        self.copies
    }

    /// Whether the staging surface is currently mapped.
    #[must_use]
    pub fn is_mapped(&self) -> bool {
        self.mapped
    }
}

impl BufferStager for SoftwareStager {
    type Surface = SoftSurface;

    fn copy_and_map(&mut self, source: &SoftSurface) -> Result<u32, StageError> {
        if source.width != self.width
            || source.height != self.height
            || source.pixels.len() < self.width as usize * self.height as usize
        {
            return Err(StageError::IncompatibleSurface);
        }
        let pitch = self.row_pitch as usize;
        for (y, dst) in self.staging.chunks_exact_mut(pitch).enumerate() {
            let Some(src) = u32::try_from(y).ok().and_then(|y| source.row(y)) else {
                return Err(StageError::IncompatibleSurface);
            };
            let src: &[u8] = bytemuck::cast_slice(src);
            dst[..src.len()].copy_from_slice(src);
        }
        self.mapped = true;
        self.copies += 1;
        Ok(self.row_pitch)
    }

    fn mapped(&self) -> &[u8] {
        if self.mapped { &self.staging } else { &[] }
    }

    fn unmap(&mut self) {
        self.mapped = false;
    }
}

// ---------------------------------------------------------------------------
// Swap-chains
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ChainShared {
    associated: AtomicBool,
    finished: AtomicU64,
    destroyed: AtomicBool,
}

/// Observes a software swap-chain from the producer side.
#[derive(Clone, Debug)]
pub struct ChainStatus(Arc<ChainShared>);

impl ChainStatus {
    /// Whether the consumer associated a device with the chain.
    #[must_use]
    pub fn is_associated(&self) -> bool {
        self.0.associated.load(Ordering::Acquire)
    }

    /// Frames the consumer reported as processed.
    #[must_use]
    pub fn frames_finished(&self) -> u64 {
        self.0.finished.load(Ordering::Acquire)
    }

    /// Whether the consumer destroyed the chain.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.0.destroyed.load(Ordering::Acquire)
    }
}

struct QueuedFrame {
    surface: SoftSurface,
    reported_address: u64,
    sequence: u32,
}

/// Producer end of a channel-fed swap-chain.
///
/// Dropping the producer abandons the chain: once the queued frames are
/// drained, the consumer's next request fails with
/// [`SwapChainError::ACCESS_LOST`].
pub struct FrameProducer {
    tx: SyncSender<QueuedFrame>,
    events: Arc<SwapChainEvents>,
    status: ChainStatus,
    next_sequence: u32,
}

impl fmt::Debug for FrameProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameProducer")
            .field("status", &self.status)
            .field("next_sequence", &self.next_sequence)
            .finish_non_exhaustive()
    }
}

impl FrameProducer {
    /// Queues a rendered surface and raises the new-frame signal.
    ///
    /// `reported_address` is the physical placement to report with the
    /// surface (0 for none). Blocks while the queue is full. Returns `false`
    /// if the consumer is gone.
    pub fn present(&mut self, surface: SoftSurface, reported_address: u64) -> bool {
        let frame = QueuedFrame {
            surface,
            reported_address,
            sequence: self.next_sequence,
        };
        if self.tx.send(frame).is_err() {
            return false;
        }
        self.next_sequence = self.next_sequence.wrapping_add(1);
        self.events.signal_new_frame();
        true
    }

    /// A handle for observing the chain after the producer is dropped.
    #[must_use]
    pub fn status(&self) -> ChainStatus {
        self.status.clone()
    }

    /// Whether the consumer destroyed the chain.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.status.is_destroyed()
    }
}

/// Consumer end of a channel-fed swap-chain.
pub struct ChannelSwapChain {
    rx: Receiver<QueuedFrame>,
    status: ChainStatus,
}

impl fmt::Debug for ChannelSwapChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelSwapChain")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Creates a swap-chain holding at most `depth` queued frames.
///
/// New frames raise the new-frame signal on `events`.
#[must_use]
pub fn channel(events: Arc<SwapChainEvents>, depth: usize) -> (FrameProducer, ChannelSwapChain) {
    let (tx, rx) = mpsc::sync_channel(depth.max(1));
    let status = ChainStatus(Arc::default());
    (
        FrameProducer {
            tx,
            events,
            status: status.clone(),
            next_sequence: 0,
        },
        ChannelSwapChain { rx, status },
    )
}

impl SwapChain for ChannelSwapChain {
    type Device = SoftwareStager;
    type Surface = SoftSurface;

    fn set_device(&mut self, _device: &SoftwareStager) -> Result<(), SwapChainError> {
        self.status.0.associated.store(true, Ordering::Release);
        Ok(())
    }

    fn release_and_acquire(&mut self) -> Result<Acquired<SoftSurface>, SwapChainError> {
        match self.rx.try_recv() {
            Ok(frame) => {
                let mut buffer = AcquiredBuffer::new(frame.surface)
                    .with_reported_address(frame.reported_address);
                buffer.presentation_frame = Some(frame.sequence);
                Ok(Acquired::Buffer(buffer))
            }
            Err(TryRecvError::Empty) => Ok(Acquired::Pending),
            Err(TryRecvError::Disconnected) => Err(SwapChainError::ACCESS_LOST),
        }
    }

    fn finish_frame(&mut self) -> Result<(), SwapChainError> {
        self.status.0.finished.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn destroy(self) {
        self.status.0.destroyed.store(true, Ordering::Release);
    }
}

/// One step of a [`ScriptedSwapChain`].
#[derive(Clone, Debug)]
pub enum ScriptStep {
    /// Hand out a surface with the given reported address.
    Frame(SoftSurface, u64),
    /// Report that no buffer is ready.
    Pending,
    /// Fail the request with the given status.
    Fail(SwapChainError),
}

/// A swap-chain that replays a fixed script, then reports access lost.
#[derive(Debug)]
pub struct ScriptedSwapChain {
    steps: VecDeque<ScriptStep>,
    status: ChainStatus,
    finish: Result<(), SwapChainError>,
}

impl ScriptedSwapChain {
    /// A chain replaying `steps`.
    #[must_use]
    pub fn new(steps: impl IntoIterator<Item = ScriptStep>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
            status: ChainStatus(Arc::default()),
            finish: Ok(()),
        }
    }

    /// Makes every completion notification fail with `err`.
    #[must_use]
    pub fn failing_finish(mut self, err: SwapChainError) -> Self {
        self.finish = Err(err);
        self
    }

    /// A handle for observing the chain after it is handed off.
    #[must_use]
    pub fn status(&self) -> ChainStatus {
        self.status.clone()
    }
}

impl SwapChain for ScriptedSwapChain {
    type Device = SoftwareStager;
    type Surface = SoftSurface;

    fn set_device(&mut self, _device: &SoftwareStager) -> Result<(), SwapChainError> {
        self.status.0.associated.store(true, Ordering::Release);
        Ok(())
    }

    fn release_and_acquire(&mut self) -> Result<Acquired<SoftSurface>, SwapChainError> {
        match self.steps.pop_front() {
            Some(ScriptStep::Frame(surface, address)) => Ok(Acquired::Buffer(
                AcquiredBuffer::new(surface).with_reported_address(address),
            )),
            Some(ScriptStep::Pending) => Ok(Acquired::Pending),
            Some(ScriptStep::Fail(err)) => Err(err),
            None => Err(SwapChainError::ACCESS_LOST),
        }
    }

    fn finish_frame(&mut self) -> Result<(), SwapChainError> {
        self.finish?;
        self.status.0.finished.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn destroy(self) {
        self.status.0.destroyed.store(true, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// Device factory and I/O space
// ---------------------------------------------------------------------------

/// The software render device could not be created.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SoftDeviceError;

impl fmt::Display for SoftDeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("software render device unavailable")
    }
}

impl std::error::Error for SoftDeviceError {}

/// Creates [`SoftwareStager`] devices for any software swap-chain `C`.
pub struct SoftwareFactory<C> {
    row_pitch: Option<u32>,
    failures: u32,
    created: u32,
    _chain: PhantomData<fn() -> C>,
}

impl<C> fmt::Debug for SoftwareFactory<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftwareFactory")
            .field("row_pitch", &self.row_pitch)
            .field("failures", &self.failures)
            .field("created", &self.created)
            .finish()
    }
}

impl<C> Default for SoftwareFactory<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> SoftwareFactory<C> {
    /// A factory producing tightly packed staging surfaces.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            row_pitch: None,
            failures: 0,
            created: 0,
            _chain: PhantomData,
        }
    }

    /// Pads staging rows to `row_pitch` bytes.
    #[must_use]
    pub const fn with_row_pitch(mut self, row_pitch: u32) -> Self {
        self.row_pitch = Some(row_pitch);
        self
    }

    /// Fails the next `count` device creations.
    #[must_use]
    pub const fn failing(mut self, count: u32) -> Self {
        self.failures = count;
        self
    }

    /// Devices created so far.
    #[must_use]
    pub const fn created(&self) -> u32 {
        self.created
    }
}

impl<C> DeviceFactory for SoftwareFactory<C>
where
    C: SwapChain<Device = SoftwareStager, Surface = SoftSurface>,
{
    type Chain = C;
    type Wait = SwapChainEvents;
    type Error = SoftDeviceError;

    fn create_device(&mut self, desc: &FrameBufferDesc) -> Result<SoftwareStager, SoftDeviceError> {
        if self.failures > 0 {
            self.failures -= 1;
            return Err(SoftDeviceError);
        }
        self.created += 1;
        Ok(match self.row_pitch {
            Some(pitch) => SoftwareStager::with_row_pitch(desc, pitch),
            None => SoftwareStager::new(desc),
        })
    }
}

/// An [`IoSpace`] that hands out one [`MemoryRegister`] for every mapping.
#[derive(Debug)]
pub struct SoftIoSpace {
    register: MemoryRegister,
    fail: Option<i32>,
    mapped: Vec<(MemoryResource, u64)>,
    unmapped: Vec<MemoryResource>,
}

impl SoftIoSpace {
    /// Maps every register to `register`.
    #[must_use]
    pub fn new(register: MemoryRegister) -> Self {
        Self {
            register,
            fail: None,
            mapped: Vec::new(),
            unmapped: Vec::new(),
        }
    }

    /// Fails every mapping with `code`.
    #[must_use]
    pub fn failing(mut self, code: i32) -> Self {
        self.fail = Some(code);
        self
    }

    /// Offsets of currently mapped registers, in mapping order.
    #[must_use]
    pub fn mapped_offsets(&self) -> Vec<u64> {
        self.mapped.iter().map(|&(_, offset)| offset).collect()
    }

    /// Resources released so far.
    #[must_use]
    pub fn unmapped(&self) -> &[MemoryResource] {
        &self.unmapped
    }
}

impl IoSpace for SoftIoSpace {
    type Register = MemoryRegister;

    fn map_register(
        &mut self,
        resource: &MemoryResource,
        offset: u64,
    ) -> Result<MemoryRegister, i32> {
        if let Some(code) = self.fail {
            return Err(code);
        }
        self.mapped.push((*resource, offset));
        Ok(self.register.clone())
    }

    fn unmap(&mut self, resource: &MemoryResource) {
        self.mapped.retain(|(r, _)| r != resource);
        self.unmapped.push(*resource);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imxdisp_core::frame::DisplayMode;
    use imxdisp_core::stager::StagedFrame;

    fn desc() -> FrameBufferDesc {
        FrameBufferDesc::for_mode(DisplayMode { width: 3, height: 2 })
    }

    #[test]
    fn stager_copies_rows_into_padded_pitch() {
        let d = desc();
        let mut stager = SoftwareStager::with_row_pitch(&d, 16);
        let mut surface = SoftSurface::blank(&d);
        surface.pixels[3] = Bgra8::opaque(1, 2, 3);

        let staged = StagedFrame::stage(&mut stager, &surface).unwrap();
        assert_eq!(staged.row_pitch(), 16);
        assert_eq!(staged.bytes().len(), 32);
        assert_eq!(&staged.bytes()[16..20], &[3, 2, 1, 0xff], "row 1 starts at pitch");
        drop(staged);

        assert!(!stager.is_mapped());
        assert_eq!(stager.copies(), 1);
    }

    #[test]
    fn stager_rejects_wrong_size_surface() {
        let d = desc();
        let mut stager = SoftwareStager::new(&d);
        let other = SoftSurface::blank(&FrameBufferDesc::for_mode(DisplayMode {
            width: 2,
            height: 2,
        }));
        assert_eq!(
            stager.copy_and_map(&other),
            Err(StageError::IncompatibleSurface)
        );
        assert!(stager.mapped().is_empty());
    }

    #[test]
    fn heap_buffer_receives_bgra_bytes() {
        let d = desc();
        let mut buffer = HeapFrameBuffer::new(&d);
        let view = buffer.clone();
        assert_eq!(buffer.capacity(), d.frame_bytes());

        buffer.write_frame(&[9, 8, 7, 6]);

        assert_eq!(
            view.snapshot()[0],
            Bgra8 {
                b: 9,
                g: 8,
                r: 7,
                a: 6,
            }
        );
    }

    #[test]
    fn channel_reports_pending_then_frame_then_abandoned() {
        let d = desc();
        let events = Arc::new(SwapChainEvents::new());
        let (mut producer, mut chain) = channel(Arc::clone(&events), 2);

        assert!(matches!(chain.release_and_acquire(), Ok(Acquired::Pending)));
        assert!(producer.present(SoftSurface::blank(&d), 0x1000_0000));
        drop(producer);

        let Ok(Acquired::Buffer(buffer)) = chain.release_and_acquire() else {
            panic!("queued frame must survive the producer");
        };
        assert_eq!(buffer.scanout_address(), Some(0x1000_0000));
        assert_eq!(buffer.presentation_frame, Some(0));
        assert_eq!(
            chain.release_and_acquire().err(),
            Some(SwapChainError::ACCESS_LOST)
        );
    }

    #[test]
    fn present_after_consumer_gone_fails() {
        let d = desc();
        let (mut producer, chain) = channel(Arc::new(SwapChainEvents::new()), 1);
        let status = producer.status();
        chain.destroy();
        assert!(status.is_destroyed());
        assert!(!producer.present(SoftSurface::blank(&d), 0));
    }

    #[test]
    fn factory_fails_requested_number_of_times() {
        let d = desc();
        let mut factory = SoftwareFactory::<ScriptedSwapChain>::new().failing(1);
        assert_eq!(factory.create_device(&d).err(), Some(SoftDeviceError));
        assert!(factory.create_device(&d).is_ok());
        assert_eq!(factory.created(), 1);
    }
}
