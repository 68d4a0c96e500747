//! Frame-pacer sessions. While a session is active on a swap chain, each
//! completed present also waits (bounded) for the pacer's timing report
//! before delivery, so the scheduled and actual flip times ride along.

use frameline_trace::EventRecord;

use crate::tracker::PresentTracker;

impl PresentTracker {
    pub(crate) fn pacer_session_start(&mut self, _record: &EventRecord, swapchain: u64) {
        self.paced_swapchains.insert(swapchain);
    }

    /// Presents already completed and parked for pacer timing will never get
    /// it; release them.
    pub(crate) fn pacer_session_stop(&mut self, record: &EventRecord, swapchain: u64) {
        self.paced_swapchains.remove(&swapchain);
        let waiting: Vec<_> = self
            .indices
            .swapchain_queue(record.process_id, swapchain)
            .map(|queue| queue.iter().copied().collect())
            .unwrap_or_default();
        for slot in waiting {
            if let Some(present) = self.registry.get_mut(slot) {
                present.awaiting_pacer = false;
            }
        }
        self.drain_swapchain(record.process_id, swapchain);
    }

    pub(crate) fn pacer_frame_complete(
        &mut self,
        record: &EventRecord,
        swapchain: u64,
        scheduled_time: u64,
        flip_time: u64,
    ) {
        // Reports arrive in submission order, so they pair with the oldest
        // present still waiting on this swap chain.
        let waiting = self
            .indices
            .swapchain_queue(record.process_id, swapchain)
            .and_then(|queue| {
                queue.iter().copied().find(|slot| {
                    self.registry
                        .get(*slot)
                        .map_or(false, |p| p.completed && p.awaiting_pacer)
                })
            });
        let Some(slot) = waiting else {
            tracing::debug!(swapchain, "pacer report with no waiting present");
            return;
        };
        if let Some(present) = self.registry.get_mut(slot) {
            present.pacer_scheduled_time = Some(scheduled_time);
            present.pacer_flip_time = Some(flip_time);
            present.awaiting_pacer = false;
        }
        self.drain_swapchain(record.process_id, swapchain);
    }
}
