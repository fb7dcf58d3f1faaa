// Copyright 2026 the imxdisp Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Simulated compositor that exercises the flip loop end to end.
//!
//! Prepares a software display device with a DCSS block and a boot frame
//! buffer, assigns a channel-fed swap-chain, and renders 60 frames from a
//! producer thread. Every fourth frame reports a physically contiguous
//! placement and is flipped directly; the rest are copied through staging.
//! Events go to both a [`PrettyPrintSink`] and a [`RecorderSink`], and the
//! recording is exported as a Chrome trace.

use std::fs::File;
use std::io::BufWriter;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use imxdisp_core::flip::FlipConfig;
use imxdisp_core::frame::FrameBufferDesc;
use imxdisp_core::trace::{
    AcquireEvent, BaselineRestoreEvent, FrameSummary, PhaseBeginEvent, PhaseEndEvent,
    PresentEvent, TerminateEvent, TraceSink, WaitEvent,
};
use imxdisp_host::soft::{
    Bgra8, ChannelSwapChain, HeapFrameBuffer, MemoryRegister, SoftIoSpace, SoftSurface,
    SoftwareFactory, channel,
};
use imxdisp_host::{BootFrameBuffer, DcssLayout, DeviceContext, MemoryResource, SwapChainEvents};

use imxdisp_debug::pretty::PrettyPrintSink;
use imxdisp_debug::recorder::RecorderSink;

const FRAME_COUNT: u64 = 60;
const FRAME_INTERVAL: Duration = Duration::from_millis(16);
/// Physical address the firmware left in the bank-switch register.
const BOOT_FRAME_BUFFER: u32 = 0x9000_0000;
/// Spacing of the simulated contiguous surfaces.
const SURFACE_STRIDE: u64 = 0x40_0000;

/// Forwards every event to both sinks.
struct Tee {
    pretty: PrettyPrintSink,
    recorder: RecorderSink,
}

impl TraceSink for Tee {
    fn on_acquire(&mut self, e: &AcquireEvent) {
        self.pretty.on_acquire(e);
        self.recorder.on_acquire(e);
    }

    fn on_wait(&mut self, e: &WaitEvent) {
        self.pretty.on_wait(e);
        self.recorder.on_wait(e);
    }

    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        self.pretty.on_phase_begin(e);
        self.recorder.on_phase_begin(e);
    }

    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        self.pretty.on_phase_end(e);
        self.recorder.on_phase_end(e);
    }

    fn on_present(&mut self, e: &PresentEvent) {
        self.pretty.on_present(e);
        self.recorder.on_present(e);
    }

    fn on_baseline_restore(&mut self, e: &BaselineRestoreEvent) {
        self.pretty.on_baseline_restore(e);
        self.recorder.on_baseline_restore(e);
    }

    fn on_terminate(&mut self, e: &TerminateEvent) {
        self.pretty.on_terminate(e);
        self.recorder.on_terminate(e);
    }

    fn on_frame_summary(&mut self, s: &FrameSummary) {
        self.pretty.on_frame_summary(s);
        self.recorder.on_frame_summary(s);
    }
}

fn main() {
    let timebase = imxdisp_host::timebase();

    // -- sinks -------------------------------------------------------------
    let tee = Tee {
        pretty: PrettyPrintSink::new(Box::new(std::io::stdout()), timebase).quiet(),
        recorder: RecorderSink::new(),
    };

    // -- hardware ----------------------------------------------------------
    let register = MemoryRegister::new(BOOT_FRAME_BUFFER);
    let mut ctx = DeviceContext::new(
        SoftwareFactory::<ChannelSwapChain>::new(),
        SoftIoSpace::new(register.clone()),
        FlipConfig::imx8m(),
        tee,
    );
    let mode = ctx.commit_modes();
    let desc = FrameBufferDesc::for_mode(mode);
    let boot = HeapFrameBuffer::new(&desc);
    let target = ctx
        .prepare_hardware(
            &[MemoryResource {
                start: DcssLayout::BASE,
                length: DcssLayout::LENGTH,
            }],
            Some(BootFrameBuffer {
                physical_address: u64::from(BOOT_FRAME_BUFFER),
                buffer: boot.clone(),
            }),
        )
        .expect("software DCSS mapping cannot fail");
    println!("Display target: {target:?}, mode {}x{}", mode.width, mode.height);

    // -- swap-chain --------------------------------------------------------
    let events = Arc::new(SwapChainEvents::new());
    let (mut producer, chain) = channel(Arc::clone(&events), 2);
    let chain_id = ctx
        .assign_swap_chain(chain, events)
        .expect("failed to start flip worker");

    let compositor = thread::Builder::new()
        .name("compositor".into())
        .spawn(move || {
            for i in 0..FRAME_COUNT {
                let shade = u8::try_from(i * 4).unwrap_or(u8::MAX);
                let surface = SoftSurface::filled(&desc, Bgra8::opaque(shade, 0x40, 0xff - shade));
                let address = if i % 4 == 0 {
                    0x1000_0000 + i * SURFACE_STRIDE
                } else {
                    0
                };
                if !producer.present(surface, address) {
                    break;
                }
                thread::sleep(FRAME_INTERVAL);
            }
            // Dropping the producer abandons the chain.
        })
        .expect("failed to spawn compositor thread");
    compositor.join().expect("compositor thread panicked");

    // The worker drains the queue, sees the chain abandoned, and exits.
    while ctx.is_processing() {
        thread::sleep(FRAME_INTERVAL);
    }
    let report = ctx.unassign_swap_chain().expect("flip worker panicked");
    println!(
        "Chain {:?}: {} ({} presented, {} dropped, {} restores)",
        chain_id,
        report.reason,
        report.frames_presented,
        report.frames_dropped,
        report.baseline_restores,
    );
    println!(
        "Scanout register: {:#010x}, boot frame buffer first pixel: {:?}",
        register.value(),
        boot.snapshot().first(),
    );

    // -- export Chrome trace -----------------------------------------------
    let tee = ctx.trace().expect("trace sink returned by worker");
    let path = "trace.json";
    let file = File::create(path).expect("failed to create trace.json");
    let mut writer = BufWriter::new(file);
    imxdisp_debug::chrome::export(tee.recorder.as_bytes(), timebase, &mut writer)
        .expect("failed to write Chrome trace");

    println!("Wrote {path} ({FRAME_COUNT} frames)");
}
