// Copyright 2026 the imxdisp Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chrome Trace Event Format exporter.
//!
//! [`export`] reads recorded bytes from a [`RecorderSink`](super::recorder::RecorderSink)
//! and writes [Chrome Trace Event Format][format] JSON to the given writer.
//!
//! Phases become duration slices on the flip thread, waits become complete
//! events with their measured length, and everything else is an instant.
//!
//! [format]: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU

use std::io::{self, Write};

use serde_json::{Value, json};

use imxdisp_core::present::PresentPath;
use imxdisp_core::time::Timebase;

use crate::recorder::{RecordedEvent, decode};

/// Exports recorded events as Chrome Trace Event Format JSON.
///
/// The output is a complete JSON array of trace event objects, suitable for
/// loading into `chrome://tracing` or [Perfetto](https://ui.perfetto.dev/).
///
/// Timestamps are converted to microseconds using the provided [`Timebase`].
pub fn export(bytes: &[u8], timebase: Timebase, writer: &mut dyn Write) -> io::Result<()> {
    let mut events: Vec<Value> = Vec::new();

    for recorded in decode(bytes) {
        match recorded {
            RecordedEvent::Acquire(e) => {
                let name = if e.ready { "Acquire" } else { "Pending" };
                events.push(json!({
                    "ph": "i",
                    "name": name,
                    "cat": "SwapChain",
                    "ts": ticks_to_us(e.timestamp.ticks(), timebase),
                    "pid": 0,
                    "tid": e.chain.0,
                    "s": "t",
                    "args": {
                        "frame_index": e.frame_index,
                        "scanout_address": e.scanout_address,
                    }
                }));
            }
            RecordedEvent::Wait(e) => {
                let dur = e.finished.saturating_duration_since(e.started).ticks();
                events.push(json!({
                    "ph": "X",
                    "name": "Wait",
                    "cat": "SwapChain",
                    "ts": ticks_to_us(e.started.ticks(), timebase),
                    "dur": ticks_to_us(dur, timebase),
                    "pid": 0,
                    "tid": e.chain.0,
                    "args": {
                        "frame_index": e.frame_index,
                        "outcome": format!("{:?}", e.outcome),
                    }
                }));
            }
            RecordedEvent::PhaseBegin(e) => {
                events.push(json!({
                    "ph": "B",
                    "name": format!("{:?}", e.phase),
                    "cat": "Frame",
                    "ts": ticks_to_us(e.timestamp.ticks(), timebase),
                    "pid": 0,
                    "tid": e.chain.0,
                    "args": {
                        "frame_index": e.frame_index,
                    }
                }));
            }
            RecordedEvent::PhaseEnd(e) => {
                events.push(json!({
                    "ph": "E",
                    "name": format!("{:?}", e.phase),
                    "cat": "Frame",
                    "ts": ticks_to_us(e.timestamp.ticks(), timebase),
                    "pid": 0,
                    "tid": e.chain.0,
                    "args": {
                        "frame_index": e.frame_index,
                    }
                }));
            }
            RecordedEvent::Present(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": path_name(&e.path),
                    "cat": "Frame",
                    "ts": ticks_to_us(e.timestamp.ticks(), timebase),
                    "pid": 0,
                    "tid": e.chain.0,
                    "s": "t",
                    "args": path_args(e.frame_index, &e.path),
                }));
            }
            RecordedEvent::BaselineRestore(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": "BaselineRestore",
                    "cat": "Frame",
                    "ts": ticks_to_us(e.timestamp.ticks(), timebase),
                    "pid": 0,
                    "tid": e.chain.0,
                    "s": "t",
                    "args": {
                        "frame_index": e.frame_index,
                        "from": format!("{:#010x}", e.from),
                        "to": format!("{:#010x}", e.to),
                    }
                }));
            }
            RecordedEvent::Terminate(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": "Terminate",
                    "cat": "SwapChain",
                    "ts": ticks_to_us(e.timestamp.ticks(), timebase),
                    "pid": 0,
                    "tid": e.chain.0,
                    "s": "g",
                    "args": {
                        "reason": e.reason.to_string(),
                        "requested": e.reason.is_requested(),
                        "frames_presented": e.frames_presented,
                        "frames_dropped": e.frames_dropped,
                    }
                }));
            }
            RecordedEvent::FrameSummary(s) => {
                let mut args = path_args(s.frame_index, &s.path);
                args["waits"] = json!(s.waits);
                args["presentation_frame"] = json!(s.presentation_frame);
                args["restored_baseline"] = json!(s.restored_baseline);
                args["acquire_us"] = json!(ticks_to_us(s.acquire_ticks, timebase));
                args["stage_us"] = json!(ticks_to_us(s.stage_ticks, timebase));
                args["scanout_us"] = json!(ticks_to_us(s.scanout_ticks, timebase));
                args["notify_us"] = json!(ticks_to_us(s.notify_ticks, timebase));
                events.push(json!({
                    "ph": "i",
                    "name": "FrameSummary",
                    "cat": "Summary",
                    "ts": ticks_to_us(s.acquired_at.ticks(), timebase),
                    "pid": 0,
                    "tid": s.chain.0,
                    "s": "t",
                    "args": args,
                }));
            }
        }
    }

    serde_json::to_writer_pretty(writer, &events)?;
    Ok(())
}

fn path_name(path: &PresentPath) -> &'static str {
    match path {
        PresentPath::Direct { .. } => "Flip",
        PresentPath::Staged { .. } => "Copy",
        PresentPath::Dropped(_) => "Dropped",
    }
}

fn path_args(frame_index: u64, path: &PresentPath) -> Value {
    match path {
        PresentPath::Direct { address } => json!({
            "frame_index": frame_index,
            "address": format!("{address:#010x}"),
        }),
        PresentPath::Staged { bytes } => json!({
            "frame_index": frame_index,
            "bytes": bytes,
        }),
        PresentPath::Dropped(reason) => json!({
            "frame_index": frame_index,
            "reason": reason.to_string(),
        }),
    }
}

fn ticks_to_us(ticks: u64, timebase: Timebase) -> f64 {
    timebase.ticks_to_nanos(ticks) as f64 / 1000.0
}
