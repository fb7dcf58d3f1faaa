// Copyright 2026 the imxdisp Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-adapter device context.
//!
//! [`DeviceContext`] is the flat set of operations the OS invokes on a display
//! adapter: prepare and release hardware, commit modes, assign and unassign
//! swap-chains. It owns the discovered display resources between swap-chains
//! and lends them to each [`SwapChainProcessor`] in turn.

use std::fmt;
use std::sync::Arc;

use imxdisp_core::flip::{FlipConfig, FlipLoop, FlipReport};
use imxdisp_core::frame::{DisplayMode, FrameBufferDesc};
use imxdisp_core::sink::{DisplaySink, DisplayTarget, LinearBuffer};
use imxdisp_core::stager::BufferStager;
use imxdisp_core::swap_chain::{ChainId, SwapChain};
use imxdisp_core::trace::{NoopSink, TraceSink};

use crate::processor::{ProcessorConfig, ProcessorError, SwapChainProcessor, TerminateSignal};
use crate::resources::{DiscoveryError, IoSpace, MemoryResource, discover};

/// Creates the render device each new swap-chain is associated with.
pub trait DeviceFactory {
    /// Swap-chain type the OS hands out.
    type Chain: SwapChain;
    /// Signal pair delivered with each swap-chain.
    type Wait: TerminateSignal;
    /// Device creation failure.
    type Error: std::error::Error;

    /// Creates a render device with a staging surface matching `desc`.
    ///
    /// # Errors
    ///
    /// Returns the platform error if no device can be created.
    fn create_device(
        &mut self,
        desc: &FrameBufferDesc,
    ) -> Result<<Self::Chain as SwapChain>::Device, Self::Error>;
}

/// Assigning a swap-chain failed. The chain has been destroyed either way,
/// and the display and trace sinks stay with the context.
#[derive(Debug)]
pub enum AssignError<E> {
    /// The render device could not be created.
    DeviceCreation(E),
    /// The worker thread could not be started.
    Spawn(ProcessorError),
}

impl<E: fmt::Display> fmt::Display for AssignError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeviceCreation(err) => write!(f, "render device creation failed: {err}"),
            Self::Spawn(err) => write!(f, "{err}"),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for AssignError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::DeviceCreation(err) => Some(err),
            Self::Spawn(err) => Some(err),
        }
    }
}

/// The firmware boot frame buffer handed to the driver at start.
#[derive(Debug)]
pub struct BootFrameBuffer<L> {
    /// Physical address of the buffer, kept for diagnostics.
    pub physical_address: u64,
    /// CPU mapping of the buffer.
    pub buffer: L,
}

/// One display adapter.
///
/// A worker that panics takes the display and trace sinks down with it. The
/// context then runs later swap-chains untraced on whatever sink
/// [`prepare_hardware`](Self::prepare_hardware) rebuilds, until
/// [`set_trace`](Self::set_trace) installs a new trace sink.
pub struct DeviceContext<F, I, L, T = NoopSink>
where
    F: DeviceFactory,
    I: IoSpace,
{
    processor: Option<SwapChainProcessor<I::Register, L, Option<T>>>,
    sink: Option<DisplaySink<I::Register, L>>,
    trace: Option<T>,
    factory: F,
    io: I,
    dcss: Option<MemoryResource>,
    boot_frame_buffer: Option<u64>,
    mode: Option<DisplayMode>,
    panel_mode: DisplayMode,
    config: FlipConfig,
    processor_config: ProcessorConfig,
    next_chain: u32,
    last_report: Option<FlipReport>,
}

impl<F, I, L, T> fmt::Debug for DeviceContext<F, I, L, T>
where
    F: DeviceFactory,
    I: IoSpace,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceContext")
            .field("processor", &self.processor)
            .field("dcss", &self.dcss)
            .field("boot_frame_buffer", &self.boot_frame_buffer)
            .field("mode", &self.mode)
            .field("config", &self.config)
            .field("last_report", &self.last_report)
            .finish_non_exhaustive()
    }
}

impl<F, I, L, T> DeviceContext<F, I, L, T>
where
    F: DeviceFactory,
    F::Chain: Send + 'static,
    <F::Chain as SwapChain>::Device: BufferStager<Surface = <F::Chain as SwapChain>::Surface> + Send + 'static,
    <F::Chain as SwapChain>::Surface: Send + 'static,
    I: IoSpace,
    I::Register: Send + 'static,
    L: LinearBuffer + Send + 'static,
    T: TraceSink + Send + 'static,
{
    /// Creates a context for a 1280×720 panel with no hardware prepared yet.
    ///
    /// `trace` receives events from every swap-chain's worker in turn.
    #[must_use]
    pub fn new(factory: F, io: I, config: FlipConfig, trace: T) -> Self {
        Self {
            processor: None,
            sink: None,
            trace: Some(trace),
            factory,
            io,
            dcss: None,
            boot_frame_buffer: None,
            mode: None,
            panel_mode: DisplayMode::HD_720,
            config,
            processor_config: ProcessorConfig::new(),
            next_chain: 0,
            last_report: None,
        }
    }

    /// Overrides worker thread settings.
    #[must_use]
    pub fn with_processor_config(mut self, config: ProcessorConfig) -> Self {
        self.processor_config = config;
        self
    }

    /// Discovers the display resources and builds the display sink.
    ///
    /// `boot_frame_buffer` is the firmware frame buffer, if the platform
    /// provided one. Any previously prepared hardware is released first.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError`] if the DCSS block is assigned but cannot be
    /// mapped. The boot frame buffer is still used in that case.
    pub fn prepare_hardware(
        &mut self,
        resources: &[MemoryResource],
        boot_frame_buffer: Option<BootFrameBuffer<L>>,
    ) -> Result<DisplayTarget, DiscoveryError> {
        self.release_hardware();

        let (physical, linear) = match boot_frame_buffer {
            Some(fb) => (Some(fb.physical_address), Some(fb.buffer)),
            None => (None, None),
        };
        self.boot_frame_buffer = physical;

        let (bank_switch, discovered) = match discover(resources, &mut self.io) {
            Ok(Some(block)) => {
                self.dcss = Some(block.resource);
                (Some(block.bank_switch), Ok(()))
            }
            Ok(None) => (None, Ok(())),
            Err(err) => (None, Err(err)),
        };
        let sink = DisplaySink::new(bank_switch, linear);
        let target = sink.target();
        self.sink = Some(sink);
        discovered.map(|()| target)
    }

    /// Stops any running worker, drops the display sink, and unmaps the DCSS
    /// block.
    pub fn release_hardware(&mut self) {
        self.unassign_swap_chain();
        self.sink = None;
        self.boot_frame_buffer = None;
        if let Some(resource) = self.dcss.take() {
            self.io.unmap(&resource);
        }
    }

    /// Commits the panel's only mode and returns it.
    pub fn commit_modes(&mut self) -> DisplayMode {
        self.mode = Some(self.panel_mode);
        self.panel_mode
    }

    /// Installs `trace` for the next swap-chain and returns the one it
    /// replaces.
    ///
    /// A worker already running keeps writing to the sink it started with;
    /// the sink installed here wins when that worker is unassigned.
    pub fn set_trace(&mut self, trace: T) -> Option<T> {
        self.trace.replace(trace)
    }

    /// Starts consuming `chain`, replacing any chain being consumed.
    ///
    /// Runs untraced if no trace sink is installed.
    ///
    /// # Errors
    ///
    /// If the render device or the worker cannot be created the chain is
    /// destroyed at once so the OS can offer a new one.
    pub fn assign_swap_chain(
        &mut self,
        chain: F::Chain,
        signal: Arc<F::Wait>,
    ) -> Result<ChainId, AssignError<F::Error>> {
        self.unassign_swap_chain();

        let desc = FrameBufferDesc::for_mode(self.mode.unwrap_or(self.panel_mode));
        let device = match self.factory.create_device(&desc) {
            Ok(device) => device,
            Err(err) => {
                chain.destroy();
                return Err(AssignError::DeviceCreation(err));
            }
        };

        let id = ChainId(self.next_chain);
        self.next_chain = self.next_chain.wrapping_add(1);
        let sink = self
            .sink
            .take()
            .unwrap_or_else(|| DisplaySink::new(None, None));
        let flip = FlipLoop::new(chain, device, sink, desc, self.config)
            .with_id(id)
            .with_clock(crate::time::now);

        match SwapChainProcessor::spawn(flip, signal, self.trace.take(), &self.processor_config) {
            Ok(processor) => {
                self.processor = Some(processor);
                Ok(id)
            }
            Err(failure) => {
                self.sink = Some(failure.sink);
                self.trace = failure.trace;
                Err(AssignError::Spawn(failure.error))
            }
        }
    }

    /// Stops the current worker, if any, and takes back the display sink.
    ///
    /// Returns the worker's report, or `None` if no chain was assigned or the
    /// worker panicked.
    pub fn unassign_swap_chain(&mut self) -> Option<FlipReport> {
        let exit = self.processor.take()?.stop()?;
        self.sink = Some(exit.sink);
        if self.trace.is_none() {
            self.trace = exit.trace;
        }
        self.last_report = Some(exit.report);
        Some(exit.report)
    }
}

impl<F, I, L, T> DeviceContext<F, I, L, T>
where
    F: DeviceFactory,
    I: IoSpace,
{
    /// The committed mode, if modes have been committed.
    #[must_use]
    pub fn committed_mode(&self) -> Option<DisplayMode> {
        self.mode
    }

    /// Whether a swap-chain worker is running.
    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.processor.as_ref().is_some_and(|p| !p.is_finished())
    }

    /// Physical address of the firmware boot frame buffer, if provided.
    #[must_use]
    pub fn boot_frame_buffer_address(&self) -> Option<u64> {
        self.boot_frame_buffer
    }

    /// The display sink while no worker holds it.
    #[must_use]
    pub fn sink(&self) -> Option<&DisplaySink<I::Register, L>> {
        self.sink.as_ref()
    }

    /// The trace sink while no worker holds it.
    #[must_use]
    pub fn trace(&self) -> Option<&T> {
        self.trace.as_ref()
    }

    /// Takes the trace sink out of the context.
    ///
    /// Later swap-chains run untraced until [`set_trace`](DeviceContext::set_trace).
    pub fn take_trace(&mut self) -> Option<T> {
        self.trace.take()
    }

    /// Report from the most recently stopped worker.
    #[must_use]
    pub fn last_report(&self) -> Option<FlipReport> {
        self.last_report
    }

    /// The I/O space.
    #[must_use]
    pub fn io(&self) -> &I {
        &self.io
    }

    /// The device factory.
    #[must_use]
    pub fn factory(&self) -> &F {
        &self.factory
    }
}

impl<F, I, L, T> Drop for DeviceContext<F, I, L, T>
where
    F: DeviceFactory,
    I: IoSpace,
{
    fn drop(&mut self) {
        // Registers derived from the mapping must go before the unmap.
        self.processor = None;
        self.sink = None;
        if let Some(resource) = self.dcss.take() {
            self.io.unmap(&resource);
        }
    }
}
