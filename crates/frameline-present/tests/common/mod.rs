//! Record builders shared by the integration tests. Each helper produces one
//! trace record the way a capture backend would emit it.

#![allow(dead_code)]

use frameline_present::{PresentTracker, TrackerSettings};
use frameline_trace::{
    CompositorEvent, DisplayEvent, EventRecord, HistoryModel, PacerEvent, PacketType,
    ProcessEvent, Provider, RuntimeEvent, TokenState, WindowEvent,
};

pub fn tracker() -> PresentTracker {
    PresentTracker::new(TrackerSettings::default())
}

pub fn tracker_with(settings: TrackerSettings) -> PresentTracker {
    PresentTracker::new(settings)
}

/// Sends an unrelated kernel present event so the engine's startup purge
/// fires while nothing is tracked yet.
pub fn warm_up(tracker: &mut PresentTracker) {
    tracker.handle_event(&kernel_present(1, 0, 0, 0));
}

// -- runtime --

pub fn present_start(ts: u64, pid: u32, tid: u32, swapchain: u64) -> EventRecord {
    present_start_with(ts, pid, tid, swapchain, 0, 1)
}

pub fn present_start_with(
    ts: u64,
    pid: u32,
    tid: u32,
    swapchain: u64,
    flags: u32,
    sync_interval: u32,
) -> EventRecord {
    EventRecord::new(
        Provider::ModernRuntime,
        RuntimeEvent::PresentStart as u16,
        ts,
        pid,
        tid,
    )
    .with_u64("swapchain", swapchain)
    .with_u32("flags", flags)
    .with_u32("sync_interval", sync_interval)
}

pub fn present_stop(ts: u64, pid: u32, tid: u32, result: u32) -> EventRecord {
    EventRecord::new(
        Provider::ModernRuntime,
        RuntimeEvent::PresentStop as u16,
        ts,
        pid,
        tid,
    )
    .with_u32("result", result)
}

// -- display kernel --

pub fn flip(ts: u64, pid: u32, tid: u32, interval: u32, mmio: bool) -> EventRecord {
    EventRecord::new(Provider::DisplayKernel, DisplayEvent::Flip as u16, ts, pid, tid)
        .with_u32("interval", interval)
        .with_u32("mmio", mmio as u32)
}

pub fn queue_packet(ts: u64, pid: u32, tid: u32, sequence: u32, context: u64) -> EventRecord {
    EventRecord::new(
        Provider::DisplayKernel,
        DisplayEvent::QueuePacketStart as u16,
        ts,
        pid,
        tid,
    )
    .with_u32("packet_type", PacketType::Dma as u32)
    .with_u32("sequence", sequence)
    .with_u64("context", context)
    .with_u32("present", 1)
}

pub fn queue_packet_no_kernel_event(
    ts: u64,
    pid: u32,
    tid: u32,
    sequence: u32,
    context: u64,
) -> EventRecord {
    queue_packet(ts, pid, tid, sequence, context).with_u32("supports_present_event", 0)
}

pub fn queue_packet_stop(ts: u64, sequence: u32) -> EventRecord {
    EventRecord::new(
        Provider::DisplayKernel,
        DisplayEvent::QueuePacketStop as u16,
        ts,
        0,
        0,
    )
    .with_u32("sequence", sequence)
}

pub fn mmio_flip(ts: u64, sequence: u32, flags: u32) -> EventRecord {
    EventRecord::new(Provider::DisplayKernel, DisplayEvent::MmioFlip as u16, ts, 0, 0)
        .with_u32("sequence", sequence)
        .with_u32("flags", flags)
}

pub fn vsync(ts: u64, sequence: u32) -> EventRecord {
    EventRecord::new(
        Provider::DisplayKernel,
        DisplayEvent::VsyncInterrupt as u16,
        ts,
        0,
        0,
    )
    .with_u64("flip_id", u64::from(sequence) << 32)
}

pub fn kernel_present(ts: u64, pid: u32, tid: u32, window: u64) -> EventRecord {
    EventRecord::new(
        Provider::DisplayKernel,
        DisplayEvent::KernelPresent as u16,
        ts,
        pid,
        tid,
    )
    .with_u64("window", window)
}

pub fn present_history(
    ts: u64,
    pid: u32,
    tid: u32,
    token: u64,
    model: HistoryModel,
    token_data: u64,
) -> EventRecord {
    EventRecord::new(
        Provider::DisplayKernel,
        DisplayEvent::PresentHistory as u16,
        ts,
        pid,
        tid,
    )
    .with_u64("token", token)
    .with_u32("model", model as u32)
    .with_u64("token_data", token_data)
}

pub fn history_retired(ts: u64, token: u64) -> EventRecord {
    EventRecord::new(
        Provider::DisplayKernel,
        DisplayEvent::PresentHistoryRetired as u16,
        ts,
        0,
        0,
    )
    .with_u64("token", token)
}

pub fn blit(ts: u64, pid: u32, tid: u32, window: u64, redirected: bool) -> EventRecord {
    EventRecord::new(Provider::DisplayKernel, DisplayEvent::Blit as u16, ts, pid, tid)
        .with_u64("window", window)
        .with_u32("redirected", redirected as u32)
}

pub fn blit_cancel(ts: u64, pid: u32, tid: u32) -> EventRecord {
    EventRecord::new(
        Provider::DisplayKernel,
        DisplayEvent::BlitCancel as u16,
        ts,
        pid,
        tid,
    )
}

// -- window session --

pub fn token_issued(
    ts: u64,
    pid: u32,
    tid: u32,
    surface: u64,
    present_count: u64,
    bind_id: u64,
) -> EventRecord {
    EventRecord::new(
        Provider::WindowSession,
        WindowEvent::TokenIssued as u16,
        ts,
        pid,
        tid,
    )
    .with_version(1)
    .with_u64("surface", surface)
    .with_u64("present_count", present_count)
    .with_u64("bind_id", bind_id)
    .with_u32("dest_width", 1920)
    .with_u32("dest_height", 1080)
}

pub fn token_state(
    ts: u64,
    surface: u64,
    present_count: u64,
    bind_id: u64,
    state: TokenState,
) -> EventRecord {
    EventRecord::new(
        Provider::WindowSession,
        WindowEvent::TokenStateChanged as u16,
        ts,
        0,
        0,
    )
    .with_u64("surface", surface)
    .with_u64("present_count", present_count)
    .with_u64("bind_id", bind_id)
    .with_u32("state", state as u32)
}

pub fn input_read(ts: u64, pid: u32, tid: u32) -> EventRecord {
    EventRecord::new(
        Provider::WindowSession,
        WindowEvent::InputDeviceRead as u16,
        ts,
        pid,
        tid,
    )
}

// -- compositor --

pub fn compositor_history_fetch(ts: u64, pid: u32, tid: u32) -> EventRecord {
    EventRecord::new(
        Provider::Compositor,
        CompositorEvent::PresentHistoryNotify as u16,
        ts,
        pid,
        tid,
    )
}

pub fn compositor_schedule(ts: u64, pid: u32, tid: u32) -> EventRecord {
    EventRecord::new(
        Provider::Compositor,
        CompositorEvent::SchedulePresent as u16,
        ts,
        pid,
        tid,
    )
}

pub fn flip_chain_complete(ts: u64, pid: u32, chain_id: u32, serial: u32, window: u64) -> EventRecord {
    EventRecord::new(
        Provider::Compositor,
        CompositorEvent::FlipChainComplete as u16,
        ts,
        pid,
        0,
    )
    .with_u32("chain_id", chain_id)
    .with_u32("serial", serial)
    .with_u64("window", window)
}

// -- process --

pub fn process_started(ts: u64, pid: u32, name: &str) -> EventRecord {
    EventRecord::new(Provider::Process, ProcessEvent::Started as u16, ts, 0, 0)
        .with_u32("process_id", pid)
        .with_str("image_name", name)
}

pub fn process_stopped(ts: u64, pid: u32, name: &str) -> EventRecord {
    EventRecord::new(Provider::Process, ProcessEvent::Stopped as u16, ts, 0, 0)
        .with_u32("process_id", pid)
        .with_str("image_name", name)
}

// -- frame pacer --

pub fn pacer_session_start(ts: u64, pid: u32, swapchain: u64) -> EventRecord {
    EventRecord::new(Provider::FramePacer, PacerEvent::SessionStart as u16, ts, pid, 0)
        .with_u64("swapchain", swapchain)
}

pub fn pacer_session_stop(ts: u64, pid: u32, swapchain: u64) -> EventRecord {
    EventRecord::new(Provider::FramePacer, PacerEvent::SessionStop as u16, ts, pid, 0)
        .with_u64("swapchain", swapchain)
}

pub fn pacer_frame_complete(
    ts: u64,
    pid: u32,
    swapchain: u64,
    scheduled_time: u64,
    flip_time: u64,
) -> EventRecord {
    EventRecord::new(
        Provider::FramePacer,
        PacerEvent::FrameComplete as u16,
        ts,
        pid,
        0,
    )
    .with_u64("swapchain", swapchain)
    .with_u64("scheduled_time", scheduled_time)
    .with_u64("flip_time", flip_time)
}

// -- gpu tracking --

pub fn gpu_device_start(ts: u64, adapter: u64, device: u64) -> EventRecord {
    EventRecord::new(Provider::DisplayKernel, DisplayEvent::DeviceStart as u16, ts, 0, 0)
        .with_u64("adapter", adapter)
        .with_u64("device", device)
}

pub fn gpu_context_start(ts: u64, pid: u32, context: u64, device: u64, node: u32) -> EventRecord {
    EventRecord::new(
        Provider::DisplayKernel,
        DisplayEvent::ContextStart as u16,
        ts,
        pid,
        0,
    )
    .with_u64("context", context)
    .with_u64("device", device)
    .with_u32("node", node)
}

pub fn gpu_engine_metadata(ts: u64, adapter: u64, node: u32, class: u32) -> EventRecord {
    EventRecord::new(
        Provider::DisplayKernel,
        DisplayEvent::EngineMetadata as u16,
        ts,
        0,
        0,
    )
    .with_u64("adapter", adapter)
    .with_u32("node", node)
    .with_u32("class", class)
}

pub fn gpu_dma_start(ts: u64, context: u64, sequence: u32) -> EventRecord {
    EventRecord::new(
        Provider::DisplayKernel,
        DisplayEvent::DmaPacketStart as u16,
        ts,
        0,
        0,
    )
    .with_u64("context", context)
    .with_u32("sequence", sequence)
}

pub fn gpu_dma_complete(ts: u64, context: u64, sequence: u32) -> EventRecord {
    EventRecord::new(
        Provider::DisplayKernel,
        DisplayEvent::DmaPacketComplete as u16,
        ts,
        0,
        0,
    )
    .with_u64("context", context)
    .with_u32("sequence", sequence)
}
