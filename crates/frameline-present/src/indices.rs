//! Correlation indices: keyed lookups that route an incoming event to the
//! present it pertains to.
//!
//! Every map holds `SlotId`s into the registry arena, never a second owner.
//! Removal is symmetric and idempotent per key: an entry is only erased when
//! it still maps to the present being removed, so duplicate terminal events
//! and out-of-order removals are harmless.

use std::collections::{BTreeMap, VecDeque};

use hashbrown::HashMap;

use crate::present::{Present, SlotId, SurfaceToken};

#[derive(Debug, Default)]
pub struct CorrelationIndices {
    /// The present currently being worked on by each thread. A present can
    /// also appear under a second, driver-batch thread id.
    by_thread: HashMap<u32, SlotId>,
    /// Presents whose kernel queue packet is in flight.
    by_submit_sequence: HashMap<u32, SlotId>,
    /// Presents handed to the kernel present-history path.
    by_history_token: HashMap<u64, SlotId>,
    /// Presents handed to the window-session composition path.
    by_surface_token: HashMap<SurfaceToken, SlotId>,
    /// Legacy CPU-copy presents keyed by their flip-chain/serial token.
    by_legacy_blit_token: HashMap<u64, SlotId>,
    /// Legacy front-buffer copies on drivers without kernel present events,
    /// keyed by the driver context they were submitted on.
    by_driver_context: HashMap<u64, SlotId>,
    /// Most recent copy-path present per target window.
    window_latest: HashMap<u64, SlotId>,
    /// In-flight presents per process, ordered by creation time. Feeds the
    /// cross-thread batched-submission lookup.
    by_process: HashMap<u32, BTreeMap<u64, SlotId>>,
    /// In-flight presents per (process, swap chain), in creation order.
    /// Drives supersede-on-present and the straggler guard.
    by_process_swapchain: HashMap<(u32, u64), VecDeque<SlotId>>,
    /// Presents parked until the compositor's next kernel flip adopts them.
    compositor_wait: Vec<SlotId>,
}

impl CorrelationIndices {
    // ---- thread ----

    pub fn thread(&self, thread_id: u32) -> Option<SlotId> {
        self.by_thread.get(&thread_id).copied()
    }

    pub fn set_thread(&mut self, thread_id: u32, slot: SlotId) {
        self.by_thread.insert(thread_id, slot);
    }

    pub fn clear_thread(&mut self, thread_id: u32) {
        self.by_thread.remove(&thread_id);
    }

    fn clear_thread_if(&mut self, thread_id: u32, slot: SlotId) {
        if self.by_thread.get(&thread_id) == Some(&slot) {
            self.by_thread.remove(&thread_id);
        }
    }

    // ---- submit sequence ----

    pub fn submit_sequence(&self, sequence: u32) -> Option<SlotId> {
        self.by_submit_sequence.get(&sequence).copied()
    }

    pub fn set_submit_sequence(&mut self, sequence: u32, slot: SlotId) {
        self.by_submit_sequence.insert(sequence, slot);
    }

    // ---- handoff tokens ----

    pub fn history_token(&self, token: u64) -> Option<SlotId> {
        self.by_history_token.get(&token).copied()
    }

    pub fn set_history_token(&mut self, token: u64, slot: SlotId) {
        self.by_history_token.insert(token, slot);
    }

    pub fn clear_history_token(&mut self, token: u64) {
        self.by_history_token.remove(&token);
    }

    pub fn surface_token(&self, key: SurfaceToken) -> Option<SlotId> {
        self.by_surface_token.get(&key).copied()
    }

    pub fn set_surface_token(&mut self, key: SurfaceToken, slot: SlotId) {
        self.by_surface_token.insert(key, slot);
    }

    pub fn clear_surface_token(&mut self, key: SurfaceToken) {
        self.by_surface_token.remove(&key);
    }

    pub fn legacy_blit_token(&self, token: u64) -> Option<SlotId> {
        self.by_legacy_blit_token.get(&token).copied()
    }

    pub fn set_legacy_blit_token(&mut self, token: u64, slot: SlotId) {
        self.by_legacy_blit_token.insert(token, slot);
    }

    pub fn clear_legacy_blit_token(&mut self, token: u64) {
        self.by_legacy_blit_token.remove(&token);
    }

    pub fn driver_context(&self, context: u64) -> Option<SlotId> {
        self.by_driver_context.get(&context).copied()
    }

    pub fn set_driver_context(&mut self, context: u64, slot: SlotId) {
        self.by_driver_context.insert(context, slot);
    }

    pub fn clear_driver_context(&mut self, context: u64) {
        self.by_driver_context.remove(&context);
    }

    // ---- window ----

    pub fn window_latest(&self, window: u64) -> Option<SlotId> {
        self.window_latest.get(&window).copied()
    }

    pub fn set_window_latest(&mut self, window: u64, slot: SlotId) {
        self.window_latest.insert(window, slot);
    }

    pub fn clear_window_latest(&mut self, window: u64) {
        self.window_latest.remove(&window);
    }

    pub fn window_latest_entries(&self) -> Vec<(u64, SlotId)> {
        self.window_latest.iter().map(|(w, s)| (*w, *s)).collect()
    }

    pub fn clear_all_window_latest(&mut self) {
        self.window_latest.clear();
    }

    // ---- per-process / per-swapchain ordering ----

    pub fn insert_process_ordered(&mut self, process_id: u32, created: u64, slot: SlotId) {
        // Duplicate creation timestamps within one process are possible in
        // principle; keep the first, matching the batched-lookup assumption
        // that the oldest entry wins.
        self.by_process
            .entry(process_id)
            .or_default()
            .entry(created)
            .or_insert(slot);
    }

    pub fn remove_process_ordered(&mut self, process_id: u32, created: u64, slot: SlotId) {
        if let Some(ordered) = self.by_process.get_mut(&process_id) {
            if ordered.get(&created) == Some(&slot) {
                ordered.remove(&created);
            }
        }
    }

    /// Oldest present of `process_id` that matches `filter`, removed from the
    /// process-ordered index (it is being adopted by a thread).
    pub fn take_oldest_in_process(
        &mut self,
        process_id: u32,
        filter: impl Fn(SlotId) -> bool,
    ) -> Option<SlotId> {
        let ordered = self.by_process.get_mut(&process_id)?;
        let key = ordered
            .iter()
            .find(|(_, slot)| filter(**slot))
            .map(|(created, _)| *created)?;
        ordered.remove(&key)
    }

    pub fn push_swapchain(&mut self, process_id: u32, swapchain: u64, slot: SlotId) {
        self.by_process_swapchain
            .entry((process_id, swapchain))
            .or_default()
            .push_back(slot);
    }

    pub fn swapchain_queue(&self, process_id: u32, swapchain: u64) -> Option<&VecDeque<SlotId>> {
        self.by_process_swapchain.get(&(process_id, swapchain))
    }

    pub fn remove_from_swapchain(&mut self, process_id: u32, swapchain: u64, slot: SlotId) {
        if let Some(queue) = self.by_process_swapchain.get_mut(&(process_id, swapchain)) {
            if let Some(pos) = queue.iter().position(|s| *s == slot) {
                queue.remove(pos);
            }
            if queue.is_empty() {
                self.by_process_swapchain.remove(&(process_id, swapchain));
            }
        }
    }

    // ---- compositor wait list ----

    pub fn push_compositor_wait(&mut self, slot: SlotId) {
        self.compositor_wait.push(slot);
    }

    pub fn take_compositor_wait(&mut self) -> Vec<SlotId> {
        std::mem::take(&mut self.compositor_wait)
    }

    // ---- symmetric removal ----

    /// Removes the present from every index that hosts it temporarily (all of
    /// them except the process-ordered and swap-chain-ordered collections,
    /// which completion/eviction handle explicitly).
    pub fn remove_temporary(&mut self, slot: SlotId, present: &mut Present) {
        self.clear_thread_if(present.thread_id, slot);
        if present.batch_thread_id != 0 {
            self.clear_thread_if(present.batch_thread_id, slot);
        }
        if present.submit_sequence != 0 {
            if self.by_submit_sequence.get(&present.submit_sequence) == Some(&slot) {
                self.by_submit_sequence.remove(&present.submit_sequence);
            }
        }
        if present.history_token != 0 {
            if self.by_history_token.get(&present.history_token) == Some(&slot) {
                self.by_history_token.remove(&present.history_token);
            }
        }
        if let Some(key) = present.surface_token {
            if self.by_surface_token.get(&key) == Some(&slot) {
                self.by_surface_token.remove(&key);
            }
        }
        if present.legacy_blit_token != 0 {
            if self.by_legacy_blit_token.get(&present.legacy_blit_token) == Some(&slot) {
                self.by_legacy_blit_token.remove(&present.legacy_blit_token);
            }
        }
        if present.driver_context != 0 {
            if self.by_driver_context.get(&present.driver_context) == Some(&slot) {
                self.by_driver_context.remove(&present.driver_context);
            }
        }
        if present.window != 0 {
            if self.window_latest.get(&present.window) == Some(&slot) {
                self.window_latest.remove(&present.window);
            }
        }
        if present.in_compositor_wait_list {
            if let Some(pos) = self.compositor_wait.iter().position(|s| *s == slot) {
                self.compositor_wait.remove(pos);
            }
            present.in_compositor_wait_list = false;
        }
    }

    /// True when the present is absent from every keyed index. Used by the
    /// index-symmetry assertions in tests.
    #[cfg(test)]
    pub fn holds_nothing_for(&self, slot: SlotId) -> bool {
        !self.by_thread.values().any(|s| *s == slot)
            && !self.by_submit_sequence.values().any(|s| *s == slot)
            && !self.by_history_token.values().any(|s| *s == slot)
            && !self.by_surface_token.values().any(|s| *s == slot)
            && !self.by_legacy_blit_token.values().any(|s| *s == slot)
            && !self.by_driver_context.values().any(|s| *s == slot)
            && !self.window_latest.values().any(|s| *s == slot)
            && !self
                .by_process
                .values()
                .any(|ordered| ordered.values().any(|s| *s == slot))
            && !self
                .by_process_swapchain
                .values()
                .any(|queue| queue.iter().any(|s| *s == slot))
            && !self.compositor_wait.contains(&slot)
    }
}
