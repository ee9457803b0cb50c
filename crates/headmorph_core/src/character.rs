//! Characters as seen by the morph system
//!
//! The host owns its entities. The morph system only keeps generational
//! [`Entity`] ids and asks a [`CharacterHost`] to re-validate them on every
//! use, so a character destroyed between frames is never touched again.

use crate::hash::joaat;
use crate::profile::CharacterMorphProfile;

/// Weak reference to a host entity: a slot in the host's entity table plus
/// the slot's generation when the id was handed out. Freeing a slot bumps its
/// generation, so stale ids stop resolving.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity {
    index: u32,
    generation: u32,
}

impl Entity {
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// 32-bit handle given to scripts: `(index << 8) | (generation & 0xff)`.
    pub fn script_guid(&self) -> ScriptGuid {
        (self.index << 8) | (self.generation & 0xff)
    }
}

/// Integer character handle as passed in from scripts.
pub type ScriptGuid = u32;

/// Engine-side view of the characters a morph can target.
///
/// Implemented by the host adapter. All queries must treat dead or
/// recycled entities as absent.
pub trait CharacterHost {
    /// Resolve a script handle to a live entity of any type.
    fn resolve_guid(&self, guid: ScriptGuid) -> Option<Entity>;

    /// Whether `entity` is alive and is a character.
    fn is_character(&self, entity: Entity) -> bool;

    /// Whether the character carries head-blend data and can therefore be morphed.
    fn has_head_blend(&self, entity: Entity) -> bool;

    /// Hash of the character's model name.
    fn model_hash(&self, entity: Entity) -> Option<u32>;

    fn profile(&self, entity: Entity) -> Option<&CharacterMorphProfile>;

    fn profile_mut(&mut self, entity: Entity) -> Option<&mut CharacterMorphProfile>;

    /// Attach an empty profile if the character has none. `None` for dead or non-character entities.
    fn profile_or_insert(&mut self, entity: Entity) -> Option<&mut CharacterMorphProfile>;

    /// Detach and return the character's profile.
    fn detach_profile(&mut self, entity: Entity) -> Option<CharacterMorphProfile>;

    /// Every live entity that currently has a profile attached.
    fn profiled_characters(&self) -> Vec<Entity>;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EntityKind {
    Character,
    Vehicle,
    Object,
}

#[derive(Debug)]
struct Occupant {
    kind: EntityKind,
    model_hash: u32,
    head_blend: bool,
    profile: Option<CharacterMorphProfile>,
}

#[derive(Debug, Default)]
struct PoolSlot {
    generation: u32,
    occupant: Option<Occupant>,
}

/// Generational entity table implementing [`CharacterHost`].
///
/// Stands in for the engine's entity pool in the runtime binary and tests.
#[derive(Debug, Default)]
pub struct CharacterPool {
    slots: Vec<PoolSlot>,
    free: Vec<u32>,
}

impl CharacterPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn an entity. Characters start without head-blend data.
    pub fn spawn(&mut self, kind: EntityKind, model_name: &str) -> Entity {
        let occupant = Occupant {
            kind,
            model_hash: joaat(model_name),
            head_blend: false,
            profile: None,
        };

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.occupant = Some(occupant);
            return Entity::new(index, slot.generation);
        }

        let index = self.slots.len() as u32;
        self.slots.push(PoolSlot {
            generation: 0,
            occupant: Some(occupant),
        });
        Entity::new(index, 0)
    }

    /// Spawn a character that already has head-blend data.
    pub fn spawn_blended_character(&mut self, model_name: &str) -> Entity {
        let entity = self.spawn(EntityKind::Character, model_name);
        self.set_head_blend(entity, true);
        entity
    }

    pub fn set_head_blend(&mut self, entity: Entity, enabled: bool) -> bool {
        match self.occupant_mut(entity) {
            Some(occupant) => {
                occupant.head_blend = enabled;
                true
            }
            None => false,
        }
    }

    /// Swap the entity's model in place, as the engine does on a model change.
    pub fn set_model(&mut self, entity: Entity, model_name: &str) -> bool {
        match self.occupant_mut(entity) {
            Some(occupant) => {
                occupant.model_hash = joaat(model_name);
                true
            }
            None => false,
        }
    }

    /// Free the entity's slot. Any profile still attached is dropped with it,
    /// so release it through the morph system first.
    pub fn despawn(&mut self, entity: Entity) -> bool {
        let Some(slot) = self.slots.get_mut(entity.index() as usize) else {
            return false;
        };
        if slot.generation != entity.generation() || slot.occupant.is_none() {
            return false;
        }

        slot.occupant = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(entity.index());
        true
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.occupant.is_some()).count()
    }

    fn occupant(&self, entity: Entity) -> Option<&Occupant> {
        let slot = self.slots.get(entity.index() as usize)?;
        if slot.generation != entity.generation() {
            return None;
        }
        slot.occupant.as_ref()
    }

    fn occupant_mut(&mut self, entity: Entity) -> Option<&mut Occupant> {
        let slot = self.slots.get_mut(entity.index() as usize)?;
        if slot.generation != entity.generation() {
            return None;
        }
        slot.occupant.as_mut()
    }

    fn character_mut(&mut self, entity: Entity) -> Option<&mut Occupant> {
        self.occupant_mut(entity)
            .filter(|occupant| occupant.kind == EntityKind::Character)
    }
}

impl CharacterHost for CharacterPool {
    fn resolve_guid(&self, guid: ScriptGuid) -> Option<Entity> {
        let index = guid >> 8;
        let slot = self.slots.get(index as usize)?;
        if slot.occupant.is_none() || slot.generation & 0xff != guid & 0xff {
            return None;
        }
        Some(Entity::new(index, slot.generation))
    }

    fn is_character(&self, entity: Entity) -> bool {
        self.occupant(entity)
            .is_some_and(|occupant| occupant.kind == EntityKind::Character)
    }

    fn has_head_blend(&self, entity: Entity) -> bool {
        self.occupant(entity)
            .is_some_and(|occupant| occupant.kind == EntityKind::Character && occupant.head_blend)
    }

    fn model_hash(&self, entity: Entity) -> Option<u32> {
        self.occupant(entity).map(|occupant| occupant.model_hash)
    }

    fn profile(&self, entity: Entity) -> Option<&CharacterMorphProfile> {
        self.occupant(entity)?.profile.as_ref()
    }

    fn profile_mut(&mut self, entity: Entity) -> Option<&mut CharacterMorphProfile> {
        self.character_mut(entity)?.profile.as_mut()
    }

    fn profile_or_insert(&mut self, entity: Entity) -> Option<&mut CharacterMorphProfile> {
        Some(self.character_mut(entity)?.profile.get_or_insert_with(Default::default))
    }

    fn detach_profile(&mut self, entity: Entity) -> Option<CharacterMorphProfile> {
        self.occupant_mut(entity)?.profile.take()
    }

    fn profiled_characters(&self) -> Vec<Entity> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| {
                slot.occupant
                    .as_ref()
                    .is_some_and(|occupant| occupant.profile.is_some())
            })
            .map(|(index, slot)| Entity::new(index as u32, slot.generation))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_guid_packs_low_generation_bits() {
        let entity = Entity::new(7, 0x1_03);
        assert_eq!(entity.script_guid(), (7 << 8) | 0x03);
    }

    #[test]
    fn despawn_invalidates_stale_handles() {
        let mut pool = CharacterPool::new();
        let first = pool.spawn_blended_character("mp_m_freemode_01");
        let guid = first.script_guid();

        assert!(pool.despawn(first));
        assert!(!pool.despawn(first));
        assert!(!pool.is_character(first));
        assert_eq!(pool.resolve_guid(guid), None);

        let second = pool.spawn(EntityKind::Character, "mp_f_freemode_01");
        assert_eq!(second.index(), first.index());
        assert_ne!(second, first);
        assert!(!pool.is_character(first));
        assert_eq!(pool.resolve_guid(second.script_guid()), Some(second));
    }

    #[test]
    fn head_blend_requires_a_character() {
        let mut pool = CharacterPool::new();
        let car = pool.spawn(EntityKind::Vehicle, "adder");
        pool.set_head_blend(car, true);

        assert!(!pool.is_character(car));
        assert!(!pool.has_head_blend(car));
        assert!(pool.profile_or_insert(car).is_none());

        let ped = pool.spawn(EntityKind::Character, "mp_m_freemode_01");
        assert!(!pool.has_head_blend(ped));
        pool.set_head_blend(ped, true);
        assert!(pool.has_head_blend(ped));
        assert_eq!(pool.model_hash(ped), Some(joaat("mp_m_freemode_01")));
    }

    #[test]
    fn profiles_attach_lazily() {
        let mut pool = CharacterPool::new();
        let ped = pool.spawn_blended_character("mp_m_freemode_01");
        let other = pool.spawn_blended_character("mp_m_freemode_01");

        assert!(pool.profile(ped).is_none());
        assert!(pool.profile_or_insert(ped).is_some());
        assert_eq!(pool.profiled_characters(), vec![ped]);

        assert!(pool.detach_profile(ped).is_some());
        assert!(pool.profile(ped).is_none());
        assert!(pool.profiled_characters().is_empty());
        assert!(pool.profile(other).is_none());
    }
}
