//! Tracker-level behavior: process filtering, bounded in-flight memory,
//! stragglers holding up a swap chain, pacing sessions, GPU attribution, and
//! the process update feed.

mod common;

use common::*;
use frameline_present::{PresentResult, Runtime, TrackerSettings};
use frameline_trace::{
    EngineClass, MMIO_FLIP_IMMEDIATE, PRESENT_RESULT_FAILED, PRESENT_RESULT_OK,
};
use pretty_assertions::assert_eq;

const PID: u32 = 10;
const TID: u32 = 11;
const SWAPCHAIN: u64 = 0xa;
const WINDOW: u64 = 0x77;

/// Drives one fullscreen present through to completion via an immediate flip.
fn immediate_flip_frame(tracker: &mut frameline_present::PresentTracker, base_ts: u64, seq: u32) {
    tracker.handle_event(&present_start(base_ts, PID, TID, SWAPCHAIN));
    tracker.handle_event(&flip(base_ts + 2, PID, TID, 1, true));
    tracker.handle_event(&queue_packet(base_ts + 4, PID, TID, seq, 0xc0));
    tracker.handle_event(&kernel_present(base_ts + 6, PID, TID, WINDOW));
    tracker.handle_event(&present_stop(base_ts + 10, PID, TID, PRESENT_RESULT_OK));
    tracker.handle_event(&mmio_flip(base_ts + 20, seq, MMIO_FLIP_IMMEDIATE));
}

#[test]
fn allow_list_drops_other_processes_up_front() {
    let mut tracker = tracker();
    let delivery = tracker.delivery();
    tracker.process_filter().allow(42);
    warm_up(&mut tracker);

    tracker.handle_event(&present_start(100, PID, TID, SWAPCHAIN));
    assert_eq!(tracker.live_presents(), 0);

    // Kernel events from a filtered process synthesize nothing either.
    tracker.handle_event(&blit(110, PID, 12, WINDOW, false));
    assert_eq!(tracker.live_presents(), 0);

    tracker.handle_event(&present_start(120, 42, 13, SWAPCHAIN));
    assert_eq!(tracker.live_presents(), 1);
    assert!(delivery.lost.is_empty());
}

#[test]
fn in_flight_presents_are_bounded_by_the_ring() {
    let mut tracker = tracker_with(TrackerSettings {
        ring_capacity: 4,
        ..TrackerSettings::default()
    });
    let delivery = tracker.delivery();

    for i in 0..10u32 {
        tracker.handle_event(&present_start(100 + u64::from(i), PID, TID + i, SWAPCHAIN));
    }

    assert_eq!(tracker.live_presents(), 4);
    let lost = delivery.lost.drain();
    assert_eq!(lost.len(), 6);
    // Oldest first.
    assert_eq!(lost[0].created, 100);
    assert_eq!(lost[5].created, 105);
}

#[test]
fn straggler_blocking_completed_work_is_dropped() {
    let mut tracker = tracker();
    let delivery = tracker.delivery();
    warm_up(&mut tracker);

    // A batched present that will never see kernel activity.
    tracker.handle_event(&present_start(100, PID, TID, SWAPCHAIN));
    tracker.handle_event(&present_stop(105, PID, TID, PRESENT_RESULT_OK));

    // Failed presents on the same swap chain complete behind it.
    for i in 0..4u64 {
        let tid = 20 + i as u32;
        tracker.handle_event(&present_start(200 + i * 100, PID, tid, SWAPCHAIN));
        tracker.handle_event(&present_stop(205 + i * 100, PID, tid, PRESENT_RESULT_FAILED));
    }

    let lost = delivery.lost.drain();
    assert_eq!(lost.len(), 1);
    assert_eq!(lost[0].created, 100);
    let completed = delivery.completed.drain();
    assert_eq!(completed.len(), 4);
    assert!(completed.iter().all(|p| p.result == PresentResult::Discarded));
    assert_eq!(tracker.live_presents(), 0);
}

#[test]
fn paced_swapchain_waits_for_the_pacer_report() {
    let mut tracker = tracker();
    let delivery = tracker.delivery();
    warm_up(&mut tracker);

    tracker.handle_event(&pacer_session_start(50, PID, SWAPCHAIN));
    immediate_flip_frame(&mut tracker, 100, 5);
    assert!(delivery.completed.is_empty(), "parked until the pacer reports");

    tracker.handle_event(&pacer_frame_complete(130, PID, SWAPCHAIN, 115, 125));
    let completed = delivery.completed.drain();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].pacer_scheduled_time, Some(115));
    assert_eq!(completed[0].pacer_flip_time, Some(125));
}

#[test]
fn pacer_session_stop_releases_waiting_presents() {
    let mut tracker = tracker();
    let delivery = tracker.delivery();
    warm_up(&mut tracker);

    tracker.handle_event(&pacer_session_start(50, PID, SWAPCHAIN));
    immediate_flip_frame(&mut tracker, 100, 5);
    assert!(delivery.completed.is_empty());

    tracker.handle_event(&pacer_session_stop(130, PID, SWAPCHAIN));
    let completed = delivery.completed.drain();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].pacer_scheduled_time, None);
    assert_eq!(completed[0].pacer_flip_time, None);

    // Pacing no longer applies to the next frame.
    immediate_flip_frame(&mut tracker, 200, 6);
    assert_eq!(delivery.completed.len(), 1);
}

#[test]
fn finish_flushes_parked_and_in_flight_presents() {
    let mut tracker = tracker();
    let delivery = tracker.delivery();
    warm_up(&mut tracker);

    tracker.handle_event(&pacer_session_start(50, PID, SWAPCHAIN));
    immediate_flip_frame(&mut tracker, 100, 5);
    tracker.handle_event(&present_start(300, PID, 12, 0xb));
    assert!(delivery.completed.is_empty());
    assert_eq!(tracker.live_presents(), 2);

    tracker.finish();
    assert_eq!(delivery.completed.len(), 1);
    assert_eq!(delivery.lost.len(), 1);
    assert_eq!(tracker.live_presents(), 0);
}

#[test]
fn finish_releases_each_swap_chain_in_submission_order() {
    let mut tracker = tracker();
    let delivery = tracker.delivery();
    warm_up(&mut tracker);

    // A frame that comes and goes early, so its arena slot is free again by
    // the time the last frame arrives.
    tracker.handle_event(&present_start(10, PID, TID, SWAPCHAIN));
    tracker.handle_event(&flip(12, PID, TID, 1, true));
    tracker.handle_event(&queue_packet(14, PID, TID, 1, 0xc0));
    tracker.handle_event(&kernel_present(16, PID, TID, WINDOW));
    tracker.handle_event(&present_stop(20, PID, TID, PRESENT_RESULT_OK));
    tracker.handle_event(&present_start(30, PID, 12, SWAPCHAIN));
    tracker.handle_event(&mmio_flip(40, 1, MMIO_FLIP_IMMEDIATE));

    // The remaining two frames park on the pacing session, sitting in arena
    // slots that invert their submission order.
    tracker.handle_event(&pacer_session_start(50, PID, SWAPCHAIN));
    tracker.handle_event(&flip(60, PID, 12, 1, true));
    tracker.handle_event(&queue_packet(62, PID, 12, 2, 0xc0));
    tracker.handle_event(&kernel_present(64, PID, 12, WINDOW));
    tracker.handle_event(&present_stop(66, PID, 12, PRESENT_RESULT_OK));
    tracker.handle_event(&mmio_flip(70, 2, MMIO_FLIP_IMMEDIATE));

    tracker.handle_event(&present_start(200, PID, 13, SWAPCHAIN));
    tracker.handle_event(&flip(202, PID, 13, 1, true));
    tracker.handle_event(&queue_packet(204, PID, 13, 3, 0xc0));
    tracker.handle_event(&kernel_present(206, PID, 13, WINDOW));
    tracker.handle_event(&present_stop(208, PID, 13, PRESENT_RESULT_OK));
    tracker.handle_event(&mmio_flip(210, 3, MMIO_FLIP_IMMEDIATE));
    assert_eq!(tracker.live_presents(), 2);

    tracker.finish();
    let completed = delivery.completed.drain();
    let creations: Vec<u64> = completed.iter().map(|p| p.created).collect();
    assert_eq!(creations, vec![10, 30, 200], "creation order per swap chain");
    assert!(delivery.lost.is_empty());
}

#[test]
fn queue_packet_stop_carries_accumulated_gpu_time() {
    let mut tracker = tracker_with(TrackerSettings {
        track_gpu: true,
        ..TrackerSettings::default()
    });
    let delivery = tracker.delivery();
    warm_up(&mut tracker);

    let context = 0xc0;
    tracker.handle_event(&gpu_device_start(10, 0xad, 0xde));
    tracker.handle_event(&gpu_context_start(20, PID, context, 0xde, 0));
    tracker.handle_event(&gpu_dma_start(100, context, 1));
    tracker.handle_event(&gpu_dma_complete(150, context, 1));

    tracker.handle_event(&present_start_with(160, PID, TID, SWAPCHAIN, 0, 0));
    tracker.handle_event(&flip(162, PID, TID, 0, false));
    tracker.handle_event(&queue_packet(164, PID, TID, 9, context));
    tracker.handle_event(&kernel_present(166, PID, TID, WINDOW));
    tracker.handle_event(&present_stop(168, PID, TID, PRESENT_RESULT_OK));
    tracker.handle_event(&queue_packet_stop(170, 9));

    let completed = delivery.completed.drain();
    assert_eq!(completed.len(), 1);
    let p = &completed[0];
    assert_eq!(p.gpu_duration, 50);
    assert_eq!(p.gpu_video_duration, 0);
    assert_eq!(p.screen_time, 170);
    assert_eq!(p.result, PresentResult::Presented);
}

#[test]
fn cloud_streaming_encode_work_surfaces_as_presents() {
    let mut tracker = tracker_with(TrackerSettings {
        track_gpu: true,
        ..TrackerSettings::default()
    });
    let delivery = tracker.delivery();

    let cloud_pid = 77;
    let context = 0xc0;
    tracker.handle_event(&process_started(5, cloud_pid, "CloudStreamD.exe"));
    tracker.handle_event(&gpu_device_start(10, 0xad, 0xde));
    tracker.handle_event(&gpu_engine_metadata(15, 0xad, 0, EngineClass::VideoDecode as u32));
    tracker.handle_event(&gpu_context_start(20, cloud_pid, context, 0xde, 0));
    tracker.handle_event(&gpu_dma_start(100, context, 1));
    tracker.handle_event(&gpu_dma_complete(150, context, 1));

    let completed = delivery.completed.drain();
    assert_eq!(completed.len(), 1);
    let frame = &completed[0];
    assert_eq!(frame.process_id, cloud_pid);
    assert_eq!(frame.runtime, Runtime::CloudStreaming);
    assert_eq!(frame.result, PresentResult::Presented);
    assert_eq!(frame.screen_time, 150);
    assert_eq!(frame.gpu_video_duration, 50);
    assert_eq!(frame.gpu_duration, 0);
}

#[test]
fn input_read_time_rides_the_next_composed_frame() {
    let mut tracker = tracker_with(TrackerSettings {
        track_input: true,
        ..TrackerSettings::default()
    });
    let delivery = tracker.delivery();
    warm_up(&mut tracker);

    tracker.handle_event(&input_read(90, PID, TID));
    tracker.handle_event(&present_start(100, PID, TID, SWAPCHAIN));
    tracker.handle_event(&token_issued(102, PID, TID, 0x5f, 1, 7));
    tracker.finish();

    let lost = delivery.lost.drain();
    assert_eq!(lost.len(), 1);
    assert_eq!(lost[0].input_time, Some(90));
}

#[test]
fn process_updates_are_queued_for_the_consumer() {
    let mut tracker = tracker();
    let delivery = tracker.delivery();

    tracker.handle_event(&process_started(100, 7, "game.exe"));
    tracker.handle_event(&process_stopped(200, 7, "game.exe"));

    let updates = delivery.processes.drain();
    assert_eq!(updates.len(), 2);
    assert_eq!(updates[0].process_id, 7);
    assert_eq!(updates[0].image_name, "game.exe");
    assert!(updates[0].started);
    assert_eq!(updates[1].timestamp, 200);
    assert!(!updates[1].started);
}
