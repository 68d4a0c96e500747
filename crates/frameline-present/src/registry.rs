//! Owning arena for in-flight presents plus the loss-detection ring.
//!
//! The arena is the only owner of `Present` values; everything else (indices,
//! ring slots, dependent lists) holds `SlotId`s. The ring is the engine's one
//! memory bound: every tracked present claims a ring slot at creation, and a
//! claim that lands on a slot still occupied by an incomplete present forces
//! that present to be evicted as lost.

use crate::present::{Present, SlotId, NO_RING_SLOT};

/// Default ring capacity; doubled for debug builds where capture stalls are
/// common while sitting in a debugger.
#[cfg(debug_assertions)]
pub const DEFAULT_RING_CAPACITY: usize = 32768;
#[cfg(not(debug_assertions))]
pub const DEFAULT_RING_CAPACITY: usize = 8192;

#[derive(Debug)]
pub struct PresentRegistry {
    slots: Vec<Option<Present>>,
    free: Vec<u32>,
    live: usize,
    ring: Vec<Option<SlotId>>,
    ring_next: usize,
}

impl PresentRegistry {
    pub fn new(ring_capacity: usize) -> Self {
        assert!(ring_capacity > 0, "ring capacity must be nonzero");
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            ring: vec![None; ring_capacity],
            ring_next: 0,
        }
    }

    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Inserts a present into the arena (without touching the ring).
    pub fn insert(&mut self, present: Present) -> SlotId {
        self.live += 1;
        match self.free.pop() {
            Some(index) => {
                debug_assert!(self.slots[index as usize].is_none());
                self.slots[index as usize] = Some(present);
                SlotId(index)
            }
            None => {
                self.slots.push(Some(present));
                SlotId((self.slots.len() - 1) as u32)
            }
        }
    }

    pub fn get(&self, slot: SlotId) -> Option<&Present> {
        self.slots.get(slot.index()).and_then(|s| s.as_ref())
    }

    pub fn get_mut(&mut self, slot: SlotId) -> Option<&mut Present> {
        self.slots.get_mut(slot.index()).and_then(|s| s.as_mut())
    }

    /// Removes a present from the arena, releasing its ring slot.
    pub fn remove(&mut self, slot: SlotId) -> Present {
        let mut present = self.slots[slot.index()]
            .take()
            .expect("slot must be live on removal");
        self.free.push(slot.0);
        self.live -= 1;
        if present.ring_index != NO_RING_SLOT {
            debug_assert_eq!(self.ring[present.ring_index], Some(slot));
            self.ring[present.ring_index] = None;
            present.ring_index = NO_RING_SLOT;
        }
        present
    }

    /// The present that must be displaced before the next ring claim, if the
    /// next slot is still occupied by an incomplete present. Completed
    /// occupants (sitting in a deferred delivery batch) are detached from the
    /// ring instead of evicted.
    pub fn ring_occupant_to_evict(&mut self) -> Option<SlotId> {
        let slot = self.ring[self.ring_next]?;
        let present = self.slots[slot.index()]
            .as_mut()
            .expect("ring entries always point at live presents");
        if present.completed {
            present.ring_index = NO_RING_SLOT;
            self.ring[self.ring_next] = None;
            None
        } else {
            Some(slot)
        }
    }

    /// Claims the next ring slot for `slot`. The caller must have evicted the
    /// previous occupant first (see [`Self::ring_occupant_to_evict`]).
    pub fn ring_claim(&mut self, slot: SlotId) {
        debug_assert!(self.ring[self.ring_next].is_none());
        let index = self.ring_next;
        self.ring[index] = Some(slot);
        self.ring_next = (self.ring_next + 1) % self.ring.len();
        self.slots[slot.index()]
            .as_mut()
            .expect("claiming a ring slot for a live present")
            .ring_index = index;
    }

    /// Detaches a completed present from the ring so it can no longer be
    /// displaced by ring pressure while it waits in a deferred batch.
    pub fn ring_detach(&mut self, slot: SlotId) {
        if let Some(present) = self.get_mut(slot) {
            let index = present.ring_index;
            if index != NO_RING_SLOT {
                present.ring_index = NO_RING_SLOT;
                debug_assert_eq!(self.ring[index], Some(slot));
                self.ring[index] = None;
            }
        }
    }

    /// All live slot ids, in arena order. Used by the trace-start purge and
    /// by invariant checks in tests.
    pub fn live_slots(&self) -> Vec<SlotId> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|_| SlotId(i as u32)))
            .collect()
    }
}
