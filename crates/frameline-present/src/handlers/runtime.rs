//! Runtime present-call events: the start marks a new present on the calling
//! thread, the stop records the call's return and decides whether the present
//! was batched into the driver queue or finished on the spot.

use frameline_trace::{EventRecord, PRESENT_FLAG_PROBE, PRESENT_RESULT_OK};

use crate::present::{Present, PresentResult, Runtime};
use crate::tracker::PresentTracker;

impl PresentTracker {
    pub(crate) fn runtime_present_start(
        &mut self,
        record: &EventRecord,
        runtime: Runtime,
        swapchain: u64,
        flags: u32,
        sync_interval: i32,
    ) {
        if !self.process_allowed(record.process_id) {
            return;
        }

        // Probe presents only test swap chain state. The thread binding is
        // cleared so the matching stop event cannot touch an unrelated
        // present left behind by an uninstrumented runtime.
        if flags & PRESENT_FLAG_PROBE != 0 {
            self.indices.clear_thread(record.thread_id);
            return;
        }

        let mut present = Present::new(
            record.process_id,
            record.thread_id,
            record.timestamp,
            runtime,
        );
        present.swapchain = swapchain;
        present.flags = flags;
        present.sync_interval = sync_interval;
        self.track_on_thread(present);
    }

    pub(crate) fn runtime_present_stop(
        &mut self,
        record: &EventRecord,
        runtime: Runtime,
        result: u32,
    ) {
        let Some(slot) = self.indices.thread(record.thread_id) else {
            return;
        };
        let Some(present) = self.registry.get_mut(slot) else {
            return;
        };

        // Failed or occluded presents issue no further work.
        let batchable = result == PRESENT_RESULT_OK;

        if present.completed {
            // The kernel finished this present before the call returned; the
            // return time was the only thing its delivery still waited on.
            if present.awaiting_return {
                present.runtime = runtime;
                present.time_in_call = record.timestamp.saturating_sub(present.created);
                present.awaiting_return = false;
                let process_id = present.process_id;
                let swapchain = present.swapchain;
                self.indices.clear_thread(record.thread_id);
                self.drain_swapchain(process_id, swapchain);
            }
            return;
        }

        present.runtime = runtime;
        present.time_in_call = record.timestamp.saturating_sub(present.created);

        if !batchable || !self.settings.track_display {
            present.result = if batchable {
                PresentResult::Presented
            } else {
                PresentResult::Discarded
            };
            self.complete_present(slot);
        } else {
            // Further kernel events for this present arrive on other
            // threads, so the binding to this one is done.
            self.indices.clear_thread(record.thread_id);
        }
    }
}
