//! Compositor events. The compositor batches windowed presents into its own
//! fullscreen frame, so these events mark which application presents it has
//! picked up and which kernel flip will carry them.

use frameline_trace::EventRecord;

use crate::present::{PresentMode, SurfaceToken};
use crate::tracker::PresentTracker;

impl PresentTracker {
    /// The compositor fetched the pending present history: the latest copy
    /// per window is now in its hands and will ride its next frame.
    pub(crate) fn compositor_history_fetched(&mut self, _record: &EventRecord) {
        for (_, slot) in self.indices.window_latest_entries() {
            let Some(present) = self.registry.get_mut(slot) else {
                continue;
            };
            if present.mode != PresentMode::ComposedCopyGpu
                && present.mode != PresentMode::ComposedCopyCpu
            {
                continue;
            }
            present.compositor_notified = true;
            present.in_compositor_wait_list = true;
            self.indices.push_compositor_wait(slot);
        }
        self.indices.clear_all_window_latest();
    }

    /// The compositor is about to present; its flip on this thread adopts
    /// the parked presents.
    pub(crate) fn compositor_schedule_present(&mut self, record: &EventRecord) {
        self.compositor_pid = record.process_id;
        self.compositor_flip_thread = record.thread_id;
    }

    /// A legacy copy completed against a window. The flip chain id and
    /// serial are the two halves of the token the history submission
    /// carried.
    pub(crate) fn compositor_flip_chain(
        &mut self,
        _record: &EventRecord,
        chain_id: u32,
        serial: u32,
        window: u64,
    ) {
        let token = (u64::from(chain_id) << 32) | u64::from(serial);
        let Some(slot) = self.indices.legacy_blit_token(token) else {
            return;
        };
        let Some(present) = self.registry.get_mut(slot) else {
            return;
        };
        present.compositor_notified = true;
        if present.window == 0 {
            present.window = window;
        }
        // Multiple legacy copies can land on the same window; only the most
        // recent one is picked up.
        self.indices.set_window_latest(window, slot);
        self.indices.clear_legacy_blit_token(token);
    }

    pub(crate) fn compositor_surface_update(&mut self, _record: &EventRecord, key: SurfaceToken) {
        if let Some(slot) = self.indices.surface_token(key) {
            if let Some(present) = self.registry.get_mut(slot) {
                present.compositor_notified = true;
            }
        }
    }
}
