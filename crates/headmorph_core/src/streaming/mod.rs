//! Streaming collaborator
//!
//! The host's streaming subsystem is treated as an opaque load/unload
//! service addressed by slot. Loads are synchronous: `load_now` returns
//! only after the slot is resident or the request has failed.

mod memory;

pub use memory::{MemoryStreaming, SlotStats};

use crate::geometry::Drawable;

/// Index of a streamable resource inside the streaming service.
pub type SlotIndex = u32;

pub trait StreamingService {
    /// Geometry buffer type handed to the blend transform.
    type Geometry;

    /// Resolve a resource path such as `"mp_m_freemode_01/micro_brow_up"` to its slot.
    fn find_slot(&self, resource: &str) -> Option<SlotIndex>;

    /// Request a slot and block until it is resident. Returns `false` if the load failed.
    fn load_now(&mut self, slot: SlotIndex) -> bool;

    /// The resident drawable in `slot`, if it is loaded.
    fn drawable(&self, slot: SlotIndex) -> Option<&Drawable<Self::Geometry>>;

    /// Give one residency request back to the service.
    fn release(&mut self, slot: SlotIndex);

    /// Primary geometry buffer of a resident slot.
    fn primary_geometry(&self, slot: SlotIndex) -> Option<&Self::Geometry> {
        self.drawable(slot)?.primary_geometry()
    }
}
