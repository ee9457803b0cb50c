//! In-memory streaming service
//!
//! Backs the runtime demo and the tests. Every slot keeps counters so
//! callers can check that a resource was loaded exactly once and released
//! exactly once, and loads can be made to fail on purpose. A slot stays
//! resident until every load request on it has been released.

use std::collections::HashMap;

use super::{SlotIndex, StreamingService};
use crate::geometry::Drawable;
use crate::hash::joaat;

/// Per-slot request counters.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct SlotStats {
    pub loads: u32,
    pub failed_loads: u32,
    pub releases: u32,
}

struct Slot<G> {
    name: String,
    drawable: Drawable<G>,
    requests: u32,
    pending_failures: u32,
    stats: SlotStats,
}

pub struct MemoryStreaming<G> {
    slots: Vec<Slot<G>>,
    by_hash: HashMap<u32, SlotIndex>,
}

impl<G> MemoryStreaming<G> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            by_hash: HashMap::new(),
        }
    }

    /// Add a drawable to the archive. Re-inserting a name replaces its contents
    /// and keeps the slot index.
    pub fn insert(&mut self, name: &str, drawable: Drawable<G>) -> SlotIndex {
        let hash = joaat(name);
        if let Some(&slot) = self.by_hash.get(&hash) {
            let entry = &mut self.slots[slot as usize];
            entry.name = name.to_string();
            entry.drawable = drawable;
            return slot;
        }

        let slot = self.slots.len() as SlotIndex;
        self.slots.push(Slot {
            name: name.to_string(),
            drawable,
            requests: 0,
            pending_failures: 0,
            stats: SlotStats::default(),
        });
        self.by_hash.insert(hash, slot);
        slot
    }

    /// Make the next `count` loads of `name` fail.
    pub fn fail_next_loads(&mut self, name: &str, count: u32) {
        if let Some(entry) = self.slot_mut(name) {
            entry.pending_failures = count;
        }
    }

    /// Drop a resident slot and all its requests, as the host does under memory pressure.
    pub fn evict(&mut self, name: &str) {
        if let Some(entry) = self.slot_mut(name) {
            entry.requests = 0;
        }
    }

    pub fn is_resident(&self, name: &str) -> bool {
        self.slot(name).is_some_and(Slot::is_resident)
    }

    /// Outstanding load requests on `name`.
    pub fn requests(&self, name: &str) -> u32 {
        self.slot(name).map_or(0, |entry| entry.requests)
    }

    pub fn stats(&self, name: &str) -> Option<SlotStats> {
        self.slot(name).map(|entry| entry.stats)
    }

    pub fn resident_count(&self) -> usize {
        self.slots.iter().filter(|entry| entry.is_resident()).count()
    }

    /// Names of every resident slot, in slot order.
    pub fn resident_names(&self) -> impl Iterator<Item = &str> {
        self.slots
            .iter()
            .filter(|entry| entry.is_resident())
            .map(|entry| entry.name.as_str())
    }

    fn slot(&self, name: &str) -> Option<&Slot<G>> {
        let index = *self.by_hash.get(&joaat(name))?;
        self.slots.get(index as usize)
    }

    fn slot_mut(&mut self, name: &str) -> Option<&mut Slot<G>> {
        let index = *self.by_hash.get(&joaat(name))?;
        self.slots.get_mut(index as usize)
    }
}

impl<G> Slot<G> {
    fn is_resident(&self) -> bool {
        self.requests > 0
    }
}

impl<G> Default for MemoryStreaming<G> {
    fn default() -> Self {
        Self::new()
    }
}

impl<G> StreamingService for MemoryStreaming<G> {
    type Geometry = G;

    fn find_slot(&self, resource: &str) -> Option<SlotIndex> {
        self.by_hash.get(&joaat(resource)).copied()
    }

    fn load_now(&mut self, slot: SlotIndex) -> bool {
        let Some(entry) = self.slots.get_mut(slot as usize) else {
            return false;
        };

        if entry.pending_failures > 0 {
            entry.pending_failures -= 1;
            entry.stats.failed_loads += 1;
            tracing::trace!(slot, name = %entry.name, "simulated load failure");
            return false;
        }

        entry.requests += 1;
        entry.stats.loads += 1;
        true
    }

    fn drawable(&self, slot: SlotIndex) -> Option<&Drawable<G>> {
        self.slots
            .get(slot as usize)
            .filter(|entry| entry.is_resident())
            .map(|entry| &entry.drawable)
    }

    fn release(&mut self, slot: SlotIndex) {
        if let Some(entry) = self.slots.get_mut(slot as usize) {
            if entry.requests == 0 {
                tracing::warn!(slot, name = %entry.name, "release without an outstanding request");
            }
            entry.requests = entry.requests.saturating_sub(1);
            entry.stats.releases += 1;
        }
    }
}
