// Copyright 2026 the imxdisp Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The worker thread that runs one [`FlipLoop`].
//!
//! [`SwapChainProcessor::spawn`] moves a flip loop onto a named thread. The
//! processor raises terminate and joins when stopped or dropped, then hands
//! back the display sink and the trace sink so the next swap-chain can reuse
//! them.

use std::fmt;
use std::sync::{Arc, mpsc};
use std::thread::{self, JoinHandle};

use imxdisp_core::flip::{FlipLoop, FlipReport};
use imxdisp_core::sink::{DisplaySink, LinearBuffer, ScanoutRegister};
use imxdisp_core::stager::BufferStager;
use imxdisp_core::swap_chain::{FrameWait, SwapChain};
use imxdisp_core::trace::{NoopSink, TraceSink, Tracer};

/// A [`FrameWait`] whose terminate signal the owner can raise from another
/// thread.
pub trait TerminateSignal: FrameWait + Send + Sync + 'static {
    /// Raises the terminate signal. Waits observe it until the loop exits.
    fn raise_terminate(&self);
}

/// Worker thread settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProcessorConfig {
    /// Prefix for worker thread names; the chain id is appended.
    pub thread_name: &'static str,
    /// Stack size for the worker, or `None` for the platform default.
    pub stack_size: Option<usize>,
}

impl ProcessorConfig {
    /// Default worker settings.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            thread_name: "imxdisp-flip",
            stack_size: None,
        }
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// The worker thread could not be started.
#[derive(Debug)]
pub struct ProcessorError(pub std::io::Error);

impl fmt::Display for ProcessorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to spawn flip worker: {}", self.0)
    }
}

impl std::error::Error for ProcessorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

/// What a finished worker hands back.
#[derive(Debug)]
pub struct ProcessorExit<R, L, T> {
    /// Why the loop stopped and what it did.
    pub report: FlipReport,
    /// The display sink, ready for the next swap-chain.
    pub sink: DisplaySink<R, L>,
    /// The trace sink the worker wrote to.
    pub trace: T,
}

/// A worker that never started, with the sinks it would have used.
///
/// The swap-chain has already been destroyed.
pub struct SpawnFailure<R, L, T> {
    /// Why the thread could not be started.
    pub error: ProcessorError,
    /// The display sink, untouched.
    pub sink: DisplaySink<R, L>,
    /// The trace sink, untouched.
    pub trace: T,
}

impl<R, L, T> fmt::Debug for SpawnFailure<R, L, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpawnFailure")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

/// Owns the worker thread for one swap-chain.
pub struct SwapChainProcessor<R, L, T = NoopSink> {
    signal: Arc<dyn TerminateSignal>,
    thread: Option<JoinHandle<Option<ProcessorExit<R, L, T>>>>,
}

impl<R, L, T> fmt::Debug for SwapChainProcessor<R, L, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwapChainProcessor")
            .field("running", &self.thread.as_ref().is_some_and(|t| !t.is_finished()))
            .finish_non_exhaustive()
    }
}

impl<R, L, T> SwapChainProcessor<R, L, T>
where
    R: ScanoutRegister + Send + 'static,
    L: LinearBuffer + Send + 'static,
    T: TraceSink + Send + 'static,
{
    /// Runs `flip` to completion on a new thread, waiting on `signal`.
    ///
    /// The loop and trace sink are handed to the thread only once it exists.
    ///
    /// # Errors
    ///
    /// Returns a [`SpawnFailure`] if the thread cannot be spawned. The
    /// swap-chain is destroyed and both sinks come back in it.
    pub fn spawn<C, W>(
        flip: FlipLoop<C, R, L>,
        signal: Arc<W>,
        trace: T,
        config: &ProcessorConfig,
    ) -> Result<Self, SpawnFailure<R, L, T>>
    where
        C: SwapChain + Send + 'static,
        C::Device: BufferStager<Surface = C::Surface> + Send + 'static,
        C::Surface: Send + 'static,
        W: TerminateSignal,
    {
        let mut builder =
            thread::Builder::new().name(format!("{}-{}", config.thread_name, flip.id().0));
        if let Some(size) = config.stack_size {
            builder = builder.stack_size(size);
        }

        let (handoff, start) = mpsc::sync_channel::<(FlipLoop<C, R, L>, T)>(1);
        let wait = Arc::clone(&signal);
        let spawned = builder.spawn(move || {
            let (mut flip, mut trace) = start.recv().ok()?;
            let report = flip.run(&*wait, &mut Tracer::new(&mut trace));
            Some(ProcessorExit {
                report,
                sink: flip.into_sink(),
                trace,
            })
        });

        let thread = match spawned {
            Ok(thread) => thread,
            Err(err) => {
                return Err(SpawnFailure {
                    error: ProcessorError(err),
                    sink: flip.into_sink(),
                    trace,
                });
            }
        };
        // The receiver only goes away if the thread died before reading.
        if let Err(mpsc::SendError((flip, trace))) = handoff.send((flip, trace)) {
            let _ = thread.join();
            return Err(SpawnFailure {
                error: ProcessorError(std::io::Error::other("flip worker exited before start")),
                sink: flip.into_sink(),
                trace,
            });
        }

        Ok(Self {
            signal,
            thread: Some(thread),
        })
    }
}

impl<R, L, T> SwapChainProcessor<R, L, T> {
    /// Whether the worker has exited on its own (e.g. the chain was
    /// abandoned).
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Raises terminate and waits for the worker to exit.
    ///
    /// Returns `None` if the worker panicked.
    #[must_use]
    pub fn stop(mut self) -> Option<ProcessorExit<R, L, T>> {
        self.signal.raise_terminate();
        self.join_thread()
    }

    /// Waits for the worker to exit without raising terminate.
    ///
    /// Returns `None` if the worker panicked.
    #[must_use]
    pub fn join(mut self) -> Option<ProcessorExit<R, L, T>> {
        self.join_thread()
    }

    fn join_thread(&mut self) -> Option<ProcessorExit<R, L, T>> {
        self.thread.take()?.join().ok().flatten()
    }
}

impl<R, L, T> Drop for SwapChainProcessor<R, L, T> {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.signal.raise_terminate();
            let _ = self.join_thread();
        }
    }
}
