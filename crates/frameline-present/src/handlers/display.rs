//! Display-kernel events: flips, queue packets, flip-completion interrupts,
//! present history tokens, and blits. This is where most presents learn
//! their mode and reach a terminal state.

use frameline_trace::{EventRecord, FlipEntryStatus, HistoryModel, MMIO_FLIP_IMMEDIATE};

use crate::present::{PresentMode, PresentResult, Runtime};
use crate::tracker::PresentTracker;

impl PresentTracker {
    /// Fullscreen present submission. An MMIO flip packet on the same thread
    /// follows and traces the flip to screen.
    pub(crate) fn display_flip(&mut self, record: &EventRecord, interval: i32, mmio: bool) {
        // The only events expected before a flip are a runtime present start
        // or an earlier multi-plane flip, so a present that already has
        // kernel work attached is one whose tracking was lost.
        let Some(mut slot) = self.find_or_create_present(
            record.process_id,
            record.thread_id,
            record.timestamp,
        ) else {
            return;
        };
        loop {
            let contradicted = self
                .registry
                .get(slot)
                .map_or(false, |p| p.submit_sequence != 0 || p.seen_kernel_present);
            if !contradicted {
                break;
            }
            self.evict_as_lost(slot);
            let Some(fresh) = self.find_or_create_present(
                record.process_id,
                record.thread_id,
                record.timestamp,
            ) else {
                return;
            };
            slot = fresh;
        }

        let Some(present) = self.registry.get_mut(slot) else {
            return;
        };
        // Multi-plane submission issues one event per plane; only the first
        // matters.
        if present.mode != PresentMode::Unknown {
            return;
        }
        present.mmio = mmio;
        present.mode = PresentMode::HardwareLegacyFlip;
        if present.sync_interval == -1 {
            present.sync_interval = interval;
        }
        if !mmio {
            present.supports_tearing = interval == 0;
        }

        // The compositor's own fullscreen flip carries the composed presents
        // that were parked waiting for it.
        if record.thread_id == self.compositor_flip_thread && self.compositor_flip_thread != 0 {
            let adopted = self.indices.take_compositor_wait();
            for rider in &adopted {
                if let Some(p) = self.registry.get_mut(*rider) {
                    p.in_compositor_wait_list = false;
                }
            }
            if let Some(present) = self.registry.get_mut(slot) {
                present.dependents.extend(adopted);
            }
            self.compositor_flip_thread = 0;
        }
    }

    pub(crate) fn display_queue_packet_start(
        &mut self,
        record: &EventRecord,
        is_present_packet: bool,
        sequence: u32,
        context: u64,
        supports_kernel_present_event: bool,
    ) {
        if self.settings.track_gpu {
            // Contexts created before capture get their process accounting
            // from the first submission referencing them.
            self.gpu.ensure_context_accounting(context, record.process_id);
        }

        // Without kernel present events, front-buffer blits complete when
        // their packet does; a prior history submission on the same context
        // would have re-marked the present as redirected by now.
        if !supports_kernel_present_event {
            let mut completed = false;
            if let Some(slot) = self.indices.driver_context(context) {
                if let Some(present) = self.registry.get_mut(slot) {
                    if present.mode == PresentMode::HardwareLegacyCopy {
                        present.seen_kernel_present = true;
                        if present.screen_time != 0 {
                            self.complete_present(slot);
                            completed = true;
                        }
                    }
                }
            }
            if !completed {
                self.indices.clear_driver_context(context);
            }
        }

        if !is_present_packet {
            return;
        }
        let Some(slot) = self.indices.thread(record.thread_id) else {
            return;
        };
        let Some(present) = self.registry.get_mut(slot) else {
            return;
        };
        if present.submit_sequence != 0 {
            return;
        }
        present.submit_sequence = sequence;
        let legacy_copy = present.mode == PresentMode::HardwareLegacyCopy;
        if legacy_copy && !supports_kernel_present_event {
            present.driver_context = context;
        }
        self.indices.set_submit_sequence(sequence, slot);
        if legacy_copy && !supports_kernel_present_event {
            self.indices.set_driver_context(context, slot);
        }
    }

    /// The queued packet finished on the GPU. For modes without a later flip
    /// interrupt this is also the on-screen point.
    pub(crate) fn display_queue_packet_stop(&mut self, record: &EventRecord, sequence: u32) {
        let Some(slot) = self.indices.submit_sequence(sequence) else {
            return;
        };
        let Some(present) = self.registry.get_mut(slot) else {
            return;
        };
        if self.settings.track_gpu {
            let process_id = present.process_id;
            self.gpu.assign_accumulated(process_id, record.timestamp, present);
        }
        let Some(present) = self.registry.get_mut(slot) else {
            return;
        };
        let completes_on_packet = present.mode == PresentMode::HardwareLegacyCopy
            || (present.mode == PresentMode::HardwareLegacyFlip && !present.mmio);
        if !completes_on_packet {
            return;
        }
        present.ready_time = record.timestamp;
        present.screen_time = record.timestamp;
        present.result = PresentResult::Presented;

        // Blit completion can beat the kernel present event, and until that
        // event arrives there is no telling fullscreen from windowed blits.
        if present.mode == PresentMode::HardwareLegacyCopy && !present.seen_kernel_present {
            return;
        }
        self.complete_present(slot);
    }

    /// An MMIO flip packet was dequeued: all GPU work for the present is
    /// done. Immediate flips are on screen at this point.
    pub(crate) fn display_mmio_flip(&mut self, record: &EventRecord, sequence: u32, flags: u32) {
        let Some(slot) = self.indices.submit_sequence(sequence) else {
            return;
        };
        let Some(present) = self.registry.get_mut(slot) else {
            return;
        };
        present.ready_time = record.timestamp;
        if present.mode == PresentMode::ComposedFlip {
            present.mode = PresentMode::HardwareIndependentFlip;
        }
        if flags & MMIO_FLIP_IMMEDIATE != 0 {
            present.result = PresentResult::Presented;
            present.screen_time = record.timestamp;
            present.supports_tearing = true;
            if present.mode == PresentMode::HardwareLegacyFlip {
                self.complete_present(slot);
            }
        }
    }

    pub(crate) fn display_mmio_flip_multi_plane(
        &mut self,
        record: &EventRecord,
        sequence: u32,
        entry_status: Option<FlipEntryStatus>,
    ) {
        let Some(slot) = self.indices.submit_sequence(sequence) else {
            return;
        };
        let Some(present) = self.registry.get_mut(slot) else {
            return;
        };
        // One present packet can surface through both the plain and the
        // multi-plane event; keep the first ready time.
        if present.ready_time == 0 {
            present.ready_time = record.timestamp;
        }
        if present.mode == PresentMode::HardwareIndependentFlip
            || present.mode == PresentMode::ComposedFlip
        {
            present.mode = PresentMode::HardwareComposedIndependentFlip;
        }

        let Some(status) = entry_status else {
            return;
        };
        if status != FlipEntryStatus::WaitVsync {
            present.supports_tearing = true;
        }
        match status {
            // The sync interrupt gives a tighter on-screen time; wait for it.
            FlipEntryStatus::WaitVsync | FlipEntryStatus::WaitHsync => {}
            FlipEntryStatus::WaitComplete => {
                present.result = PresentResult::Presented;
                present.screen_time = record.timestamp;
                if present.mode == PresentMode::HardwareLegacyFlip {
                    self.complete_present(slot);
                }
            }
        }
    }

    /// Vsync/hsync interrupt naming what flipped to screen.
    pub(crate) fn display_sync_interrupt(&mut self, record: &EventRecord, sequence: u32) {
        let Some(slot) = self.indices.submit_sequence(sequence) else {
            return;
        };
        let Some(present) = self.registry.get_mut(slot) else {
            return;
        };
        // Both the multi-plane and the plain interrupt can fire for one
        // plane; the first one wins.
        if present.result == PresentResult::Presented {
            return;
        }
        present.screen_time = record.timestamp;
        present.result = PresentResult::Presented;
        if present.mode == PresentMode::HardwareLegacyFlip {
            self.complete_present(slot);
        }
    }

    /// Emitted at the end of the kernel present call, before it returns.
    pub(crate) fn display_kernel_present(&mut self, record: &EventRecord, window: u64) {
        if let Some(slot) = self.indices.thread(record.thread_id) {
            if let Some(present) = self.registry.get_mut(slot) {
                present.seen_kernel_present = true;
                if present.window == 0 {
                    present.window = window;
                }

                if present.thread_id != record.thread_id {
                    // A present batched by the driver; the kernel thread's
                    // present call is the nearest thing to its return time.
                    present.batch_thread_id = record.thread_id;
                    if present.time_in_call == 0 {
                        present.time_in_call =
                            record.timestamp.saturating_sub(present.created);
                    }
                    self.indices.clear_thread(record.thread_id);
                } else if present.runtime == Runtime::Other {
                    // No runtime stop event is coming for this one.
                    self.indices.clear_thread(record.thread_id);
                }

                let deferred_blit = self
                    .registry
                    .get(slot)
                    .map_or(false, |p| {
                        p.mode == PresentMode::HardwareLegacyCopy && p.screen_time != 0
                    });
                if deferred_blit {
                    self.complete_present(slot);
                }
            }
        }

        self.note_kernel_present_observed();
    }

    /// Submission of a windowed present into the kernel's history tracking.
    pub(crate) fn display_present_history(
        &mut self,
        record: &EventRecord,
        token: u64,
        model: HistoryModel,
        token_data: u64,
    ) {
        if model == HistoryModel::RedirectedGdi {
            return;
        }

        let Some(mut slot) = self.find_or_create_present(
            record.process_id,
            record.thread_id,
            record.timestamp,
        ) else {
            return;
        };
        // A present that already holds a history token is stuck.
        loop {
            let contradicted = self
                .registry
                .get(slot)
                .map_or(false, |p| p.history_token != 0);
            if !contradicted {
                break;
            }
            self.evict_as_lost(slot);
            let Some(fresh) = self.find_or_create_present(
                record.process_id,
                record.thread_id,
                record.timestamp,
            ) else {
                return;
            };
            slot = fresh;
        }

        let Some(present) = self.registry.get_mut(slot) else {
            return;
        };
        // Any timing learned so far belonged to an earlier frame of a reused
        // present; the composition path starts over from here.
        present.ready_time = 0;
        present.screen_time = 0;
        present.supports_tearing = false;
        present.result = PresentResult::Unknown;
        present.history_token = token;

        match present.mode {
            PresentMode::HardwareLegacyCopy => {
                present.mode = PresentMode::ComposedCopyGpu;
            }
            PresentMode::Unknown => {
                if model == HistoryModel::CompositionAtlas {
                    present.mode = PresentMode::ComposedCompositionAtlas;
                } else {
                    // Without window-session events there is no way to track
                    // these tokens precisely; assume a composed flip that
                    // gets displayed rather than dropping the present.
                    present.mode = PresentMode::ComposedFlip;
                }
            }
            PresentMode::ComposedCopyCpu => {
                if token_data == 0 {
                    present.in_compositor_wait_list = true;
                    self.indices.push_compositor_wait(slot);
                } else {
                    present.legacy_blit_token = token_data;
                    self.indices.set_legacy_blit_token(token_data, slot);
                }
            }
            _ => {}
        }
        self.indices.set_history_token(token, slot);

        if !self.settings.track_display {
            self.complete_present(slot);
        }
    }

    /// The history token is being handed to the compositor: the frame's
    /// content is ready.
    pub(crate) fn display_present_history_retired(&mut self, record: &EventRecord, token: u64) {
        let Some(slot) = self.indices.history_token(token) else {
            return;
        };
        let Some(present) = self.registry.get_mut(slot) else {
            return;
        };
        present.ready_time = if present.ready_time == 0 {
            record.timestamp
        } else {
            present.ready_time.min(record.timestamp)
        };

        match present.mode {
            PresentMode::ComposedCompositionAtlas => {
                present.in_compositor_wait_list = true;
                self.indices.push_compositor_wait(slot);
            }
            PresentMode::ComposedFlip if !present.seen_window_token => {
                present.in_compositor_wait_list = true;
                self.indices.push_compositor_wait(slot);
            }
            PresentMode::ComposedCopyGpu => {
                // The compositor will pick up the most recent copy targeting
                // this window; older entries are simply overwritten.
                let window = present.window;
                if window != 0 {
                    self.indices.set_window_latest(window, slot);
                }
            }
            _ => {}
        }
        self.indices.clear_history_token(token);
    }

    /// Copy of a surface toward the screen. Until later events clarify,
    /// assume a direct copy into a front buffer already being scanned out.
    pub(crate) fn display_blit(&mut self, record: &EventRecord, window: u64, redirected: bool) {
        let Some(mut slot) = self.find_or_create_present(
            record.process_id,
            record.thread_id,
            record.timestamp,
        ) else {
            return;
        };
        loop {
            let contradicted = self
                .registry
                .get(slot)
                .map_or(false, |p| p.mode != PresentMode::Unknown);
            if !contradicted {
                break;
            }
            self.evict_as_lost(slot);
            let Some(fresh) = self.find_or_create_present(
                record.process_id,
                record.thread_id,
                record.timestamp,
            ) else {
                return;
            };
            slot = fresh;
        }

        let Some(present) = self.registry.get_mut(slot) else {
            return;
        };
        present.window = window;
        if redirected {
            present.mode = PresentMode::ComposedCopyCpu;
            present.supports_tearing = false;
        } else {
            present.mode = PresentMode::HardwareLegacyCopy;
            present.supports_tearing = true;
        }
    }

    /// The kernel optimized the blit out entirely; the call succeeds but the
    /// frame never goes anywhere.
    pub(crate) fn display_blit_cancel(&mut self, record: &EventRecord) {
        let Some(slot) = self.indices.thread(record.thread_id) else {
            return;
        };
        if let Some(present) = self.registry.get_mut(slot) {
            present.result = PresentResult::Discarded;
        }
        self.complete_present(slot);
    }

    // GPU-tracking events delegate to the attribution state.

    pub(crate) fn display_dma_complete(&mut self, record: &EventRecord, context: u64, sequence: u32) {
        if let Some(frame) = self.gpu.dma_complete(context, sequence, record.timestamp) {
            self.emit_cloud_frame(record.timestamp, frame);
        }
    }
}
