//! The lifecycle engine.
//!
//! A [`PresentTracker`] owns the arena, the correlation indices, and the GPU
//! attribution state, and is driven from a single thread by
//! [`handle_event`](PresentTracker::handle_event). Consumers read finished
//! presents from the shared [`DeliveryQueues`] and may adjust the process
//! allow list concurrently through a [`ProcessFilter`] handle.

use std::sync::{Arc, Mutex, RwLock};

use hashbrown::{HashMap, HashSet};

use crate::delivery::DeliveryQueues;
use crate::gpu::{CloudEncodeFrame, GpuAttribution, ProcessNames};
use crate::indices::CorrelationIndices;
use crate::present::{Present, PresentMode, PresentResult, Runtime, SlotId};
use crate::registry::{PresentRegistry, DEFAULT_RING_CAPACITY};

#[derive(Clone, Copy, Debug)]
pub struct TrackerSettings {
    /// Follow presents through the display kernel and compositor to a
    /// terminal state. When off, presents complete as soon as the runtime
    /// call returns or the kernel handoff is submitted.
    pub track_display: bool,
    /// Attribute DMA execution time to presents.
    pub track_gpu: bool,
    /// Carry the latest input-device read time onto the next composed frame.
    pub track_input: bool,
    /// Size of the in-flight loss ring.
    pub ring_capacity: usize,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            track_display: true,
            track_gpu: false,
            track_input: false,
            ring_capacity: DEFAULT_RING_CAPACITY,
        }
    }
}

type AllowList = Arc<RwLock<Option<HashSet<u32>>>>;

/// Cloneable handle for editing the process allow list while the tracker
/// runs. With no list installed, every process is tracked.
#[derive(Clone, Debug, Default)]
pub struct ProcessFilter {
    inner: AllowList,
}

impl ProcessFilter {
    pub fn allow(&self, process_id: u32) {
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.get_or_insert_with(HashSet::new).insert(process_id);
    }

    /// Tracked presents of the process are not purged here; completion and
    /// eviction remove them from the tracking structures naturally.
    pub fn disallow(&self, process_id: u32) {
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(set) = guard.as_mut() {
            set.remove(&process_id);
        }
    }

    /// Removes the list entirely, returning to track-everything.
    pub fn clear(&self) {
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = None;
    }
}

pub struct PresentTracker {
    pub(crate) settings: TrackerSettings,
    pub(crate) registry: PresentRegistry,
    pub(crate) indices: CorrelationIndices,
    pub(crate) gpu: GpuAttribution,
    pub(crate) delivery: Arc<DeliveryQueues>,
    pub(crate) allow_list: AllowList,
    pub(crate) process_names: ProcessNames,
    /// Compositor process, learned from its scheduling events. Exempt from
    /// the allow list since other processes' presents flow through it.
    pub(crate) compositor_pid: u32,
    /// When nonzero, the next kernel flip on this thread is the compositor
    /// frame that carries the parked composed presents.
    pub(crate) compositor_flip_thread: u32,
    /// Kernel present events observed yet. Presents tracked before the first
    /// one may have mismatched timing, so they are purged when it arrives
    /// and completion is held off until then.
    pub(crate) seen_kernel_present_event: bool,
    /// Swap chains with an active pacing session.
    pub(crate) paced_swapchains: HashSet<u64>,
    pub(crate) last_input_read: Option<u64>,
}

impl PresentTracker {
    pub fn new(settings: TrackerSettings) -> Self {
        let process_names: ProcessNames = Arc::new(Mutex::new(HashMap::new()));
        Self {
            settings,
            registry: PresentRegistry::new(settings.ring_capacity),
            indices: CorrelationIndices::default(),
            gpu: GpuAttribution::new(Arc::clone(&process_names)),
            delivery: Arc::new(DeliveryQueues::new()),
            allow_list: AllowList::default(),
            process_names,
            compositor_pid: 0,
            compositor_flip_thread: 0,
            seen_kernel_present_event: false,
            paced_swapchains: HashSet::new(),
            last_input_read: None,
        }
    }

    pub fn delivery(&self) -> Arc<DeliveryQueues> {
        Arc::clone(&self.delivery)
    }

    pub fn process_filter(&self) -> ProcessFilter {
        ProcessFilter { inner: Arc::clone(&self.allow_list) }
    }

    /// Number of presents currently tracked (including completed ones not
    /// yet drained to the delivery queue).
    pub fn live_presents(&self) -> usize {
        self.registry.live_count()
    }

    /// Flushes everything still in flight at end of trace. Incomplete
    /// presents are reported lost; completed presents parked on a deferred
    /// wait are released through their swap chain queues, in submission
    /// order, since the events they were waiting for are never coming.
    pub fn finish(&mut self) {
        let mut chains: Vec<(u32, u64)> = Vec::new();
        for slot in self.registry.live_slots() {
            let Some(present) = self.registry.get_mut(slot) else {
                continue;
            };
            if present.completed {
                present.awaiting_return = false;
                present.awaiting_pacer = false;
                let chain = (present.process_id, present.swapchain);
                if !chains.contains(&chain) {
                    chains.push(chain);
                }
            } else {
                self.evict_as_lost(slot);
            }
        }
        for (process_id, swapchain) in chains {
            self.drain_swapchain(process_id, swapchain);
        }
    }

    pub(crate) fn process_allowed(&self, process_id: u32) -> bool {
        if process_id == self.compositor_pid {
            return true;
        }
        let guard = match self.allow_list.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match guard.as_ref() {
            None => true,
            Some(set) => set.contains(&process_id),
        }
    }

    /// Finds the present an event on (`process_id`, `thread_id`) pertains
    /// to: the thread's in-progress present if any, otherwise the oldest
    /// batched present of the process still without a known mode, otherwise
    /// a new present synthesized for an uninstrumented runtime.
    pub(crate) fn find_or_create_present(
        &mut self,
        process_id: u32,
        thread_id: u32,
        timestamp: u64,
    ) -> Option<SlotId> {
        if let Some(slot) = self.indices.thread(thread_id) {
            return Some(slot);
        }

        if !self.process_allowed(process_id) {
            return None;
        }

        // Batched presents are popped off the front of the driver queue per
        // process in order, hence oldest-first.
        let registry = &self.registry;
        let batched = self.indices.take_oldest_in_process(process_id, |slot| {
            registry
                .get(slot)
                .map_or(false, |p| p.mode == PresentMode::Unknown)
        });
        if let Some(slot) = batched {
            self.indices.set_thread(thread_id, slot);
            return Some(slot);
        }

        let present = Present::new(process_id, thread_id, timestamp, Runtime::Other);
        Some(self.track_present(present))
    }

    /// Starts tracking a present, evicting whatever incomplete present still
    /// occupies the ring slot coming up for reuse.
    pub(crate) fn track_present(&mut self, present: Present) -> SlotId {
        if let Some(victim) = self.registry.ring_occupant_to_evict() {
            tracing::debug!(
                process_id = present.process_id,
                "in-flight ring wrapped, evicting oldest present"
            );
            self.evict_as_lost(victim);
        }

        let process_id = present.process_id;
        let thread_id = present.thread_id;
        let swapchain = present.swapchain;
        let created = present.created;

        let slot = self.registry.insert(present);
        self.registry.ring_claim(slot);
        self.indices.insert_process_ordered(process_id, created, slot);
        self.indices.push_swapchain(process_id, swapchain, slot);
        self.indices.set_thread(thread_id, slot);
        slot
    }

    /// Tracking entry point for runtime present-start events. An existing
    /// in-flight present on the same thread means its tracking went wrong.
    pub(crate) fn track_on_thread(&mut self, present: Present) -> SlotId {
        if let Some(stuck) = self.indices.thread(present.thread_id) {
            self.evict_as_lost(stuck);
        }
        self.track_present(present)
    }

    /// Drops a present (and everything depending on it) without a terminal
    /// state, removing it from every tracking structure.
    pub(crate) fn evict_as_lost(&mut self, slot: SlotId) {
        let mut worklist = vec![slot];
        while let Some(slot) = worklist.pop() {
            let Some(present) = self.registry.get_mut(slot) else {
                continue;
            };
            if present.lost {
                continue;
            }
            present.lost = true;
            worklist.append(&mut std::mem::take(&mut present.dependents));

            let process_id = present.process_id;
            let swapchain = present.swapchain;
            let created = present.created;
            self.indices.remove_temporary(slot, present);
            self.indices.remove_process_ordered(process_id, created, slot);
            self.indices.remove_from_swapchain(process_id, swapchain, slot);

            let present = self.registry.remove(slot);
            self.delivery.lost.push(present);
        }
    }

    /// Moves a present to its terminal state and propagates the consequences:
    /// dependents inherit the outcome, a displayed present discards every
    /// earlier present on its swap chain, and the swap chain's delivery queue
    /// is drained. Iterative with a visited set, so cyclic dependent links in
    /// a corrupt trace cannot recurse.
    pub(crate) fn complete_present(&mut self, slot: SlotId) {
        // Until the display kernel proves it is emitting present events,
        // terminal states cannot be trusted (timing may splice two different
        // calls together).
        if self.settings.track_display && !self.seen_kernel_present_event {
            self.evict_as_lost(slot);
            return;
        }

        let mut touched_chains: Vec<(u32, u64)> = Vec::new();
        let mut visited: HashSet<SlotId> = HashSet::new();
        let mut worklist = vec![slot];
        while let Some(slot) = worklist.pop() {
            if !visited.insert(slot) {
                continue;
            }
            let Some(present) = self.registry.get_mut(slot) else {
                continue;
            };
            if present.lost {
                continue;
            }
            if present.completed {
                tracing::debug!(
                    process_id = present.process_id,
                    swapchain = present.swapchain,
                    "duplicate completion ignored"
                );
                continue;
            }

            let result = present.result;
            let screen_time = present.screen_time;
            let process_id = present.process_id;
            let swapchain = present.swapchain;
            let created = present.created;
            let dependents = std::mem::take(&mut present.dependents);

            // Presents that rode along with this one (composed frames the
            // compositor batched into its own present) share its outcome.
            // One window can only show one of them, though: when the carrier
            // was displayed, only the newest rider per window is Presented
            // and the rest were overdrawn before reaching the screen.
            let mut window_newest: HashMap<u64, (u64, SlotId)> = HashMap::new();
            if result == PresentResult::Presented {
                for dependent in &dependents {
                    if let Some(rider) = self.registry.get(*dependent) {
                        if rider.is_terminal() || rider.window == 0 {
                            continue;
                        }
                        let entry = window_newest
                            .entry(rider.window)
                            .or_insert((rider.created, *dependent));
                        if rider.created > entry.0 {
                            *entry = (rider.created, *dependent);
                        }
                    }
                }
            }
            for dependent in dependents {
                if let Some(rider) = self.registry.get_mut(dependent) {
                    if !rider.is_terminal() {
                        let superseded = matches!(
                            window_newest.get(&rider.window),
                            Some((_, newest)) if *newest != dependent
                        );
                        if superseded {
                            rider.result = PresentResult::Discarded;
                        } else {
                            rider.screen_time = screen_time;
                            rider.result = result;
                        }
                        worklist.push(dependent);
                    }
                }
            }

            // A present reaching the screen supersedes every present still
            // in flight ahead of it on the same swap chain.
            if result == PresentResult::Presented {
                if let Some(queue) = self.indices.swapchain_queue(process_id, swapchain) {
                    let earlier: Vec<SlotId> =
                        queue.iter().take_while(|s| **s != slot).copied().collect();
                    for old in earlier {
                        if let Some(p) = self.registry.get_mut(old) {
                            if !p.is_terminal() {
                                if p.result == PresentResult::Unknown {
                                    p.result = PresentResult::Discarded;
                                }
                                worklist.push(old);
                            }
                        }
                    }
                }
            }

            let Some(present) = self.registry.get_mut(slot) else {
                continue;
            };
            present.completed = true;
            present.awaiting_return =
                matches!(present.runtime, Runtime::Modern | Runtime::Legacy)
                    && present.time_in_call == 0;
            present.awaiting_pacer = self.paced_swapchains.contains(&swapchain)
                && present.pacer_flip_time.is_none();
            let thread_id = present.thread_id;
            let awaiting_return = present.awaiting_return;

            self.indices.remove_temporary(slot, present);
            if awaiting_return {
                // The runtime return event still needs to find this present.
                self.indices.set_thread(thread_id, slot);
            }
            self.indices.remove_process_ordered(process_id, created, slot);
            self.registry.ring_detach(slot);

            if !touched_chains.contains(&(process_id, swapchain)) {
                touched_chains.push((process_id, swapchain));
            }
        }

        for (process_id, swapchain) in touched_chains {
            self.drain_swapchain(process_id, swapchain);
        }
    }

    /// Releases finished presents from the front of a swap chain's queue in
    /// submission order. A completed present with an outstanding deferred
    /// wait, or an unfinished present blocking completed work behind it, gets
    /// a bounded number of passes before it is released or dropped.
    pub(crate) fn drain_swapchain(&mut self, process_id: u32, swapchain: u64) {
        loop {
            let front = self
                .indices
                .swapchain_queue(process_id, swapchain)
                .and_then(|queue| queue.front().copied());
            let Some(front) = front else {
                return;
            };
            let Some(present) = self.registry.get_mut(front) else {
                self.indices.remove_from_swapchain(process_id, swapchain, front);
                continue;
            };

            if present.completed {
                if present.wait_pending() {
                    present.defer_budget -= 1;
                    if present.defer_budget > 0 {
                        return;
                    }
                }
                self.deliver(front);
                continue;
            }

            // An unfinished front only matters once a completed present is
            // queued behind it.
            let registry = &self.registry;
            let blocking = self
                .indices
                .swapchain_queue(process_id, swapchain)
                .map_or(false, |queue| {
                    queue
                        .iter()
                        .skip(1)
                        .any(|s| registry.get(*s).map_or(false, |p| p.completed))
                });
            if !blocking {
                return;
            }
            let Some(present) = self.registry.get_mut(front) else {
                return;
            };
            if present.defer_budget > 0 {
                present.defer_budget -= 1;
                return;
            }
            tracing::debug!(
                process_id,
                swapchain,
                "present holding up completed work, dropping it"
            );
            self.evict_as_lost(front);
        }
    }

    /// Hands a completed present to the consumer and forgets it.
    pub(crate) fn deliver(&mut self, slot: SlotId) {
        let Some(present) = self.registry.get_mut(slot) else {
            return;
        };
        let process_id = present.process_id;
        let swapchain = present.swapchain;
        let created = present.created;
        self.indices.remove_temporary(slot, present);
        self.indices.remove_process_ordered(process_id, created, slot);
        self.indices.remove_from_swapchain(process_id, swapchain, slot);

        let present = self.registry.remove(slot);
        self.delivery.completed.push(present);
    }

    /// First kernel present event of the session: everything tracked so far
    /// may have incomplete kernel history, so drop it.
    pub(crate) fn note_kernel_present_observed(&mut self) {
        if self.seen_kernel_present_event {
            return;
        }
        self.seen_kernel_present_event = true;
        for slot in self.registry.live_slots() {
            let terminal = self
                .registry
                .get(slot)
                .map_or(true, |present| present.is_terminal());
            if !terminal {
                self.evict_as_lost(slot);
            }
        }
    }

    /// Video-encode work drained for the cloud-streaming process becomes a
    /// synthetic present so streamed frames show up in the output.
    pub(crate) fn emit_cloud_frame(&mut self, timestamp: u64, frame: CloudEncodeFrame) {
        let mut present = Present::new(frame.process_id, 0, timestamp, Runtime::CloudStreaming);
        present.result = PresentResult::Presented;
        present.screen_time = timestamp;
        present.completed = true;
        self.gpu.assign_accumulated(frame.process_id, timestamp, &mut present);
        self.delivery.completed.push(present);
    }
}
