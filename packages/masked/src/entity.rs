//! Entity identifiers and the registry which tracks live entities.
//!
//! Entity IDs are issued in increasing order starting at 1 and are never
//! reused, even after the entity they named has been destroyed.

use std::fmt::{self, Debug, Formatter};
use std::num::NonZeroU64;

use crate::component::ComponentMask;
use crate::error::Result;

/// The ID of a single entity.
///
/// Entity IDs are unique per `World`. They are not unique across worlds.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityID(NonZeroU64);

impl EntityID {
    /// Create an `EntityID` from the inner unique ID.
    ///
    /// Returns `None` for 0, which never names an entity.
    pub fn new(id: u64) -> Option<EntityID> {
        NonZeroU64::new(id).map(EntityID)
    }

    /// Return the inner unique ID.
    pub fn id(&self) -> u64 {
        self.0.get()
    }
}

impl Debug for EntityID {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "EntityID({})", self.0)
    }
}

/// A single entity as recorded in the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntityEntry {
    id: EntityID,
    mask: ComponentMask,
}

impl EntityEntry {
    /// Get the ID of this entity.
    pub fn id(&self) -> EntityID {
        self.id
    }

    /// Get the components currently attached to this entity.
    pub fn mask(&self) -> ComponentMask {
        self.mask
    }
}

/// The list of live entities and their component masks.
///
/// Entries are kept in creation order. Since IDs only ever increase and removal
/// shifts later entries down, the list is also sorted by ID.
#[derive(Debug)]
pub struct EntityRegistry {
    entries: Vec<EntityEntry>,
    next_id: u64,
}

impl EntityRegistry {
    /// Create an empty registry. The first entity will have ID 1.
    pub fn new() -> EntityRegistry {
        EntityRegistry {
            entries: Vec::new(),
            next_id: 1,
        }
    }

    /// Return the number of live entities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no live entities.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return the live entities in creation order.
    pub fn entries(&self) -> &[EntityEntry] {
        &self.entries
    }

    /// Allocate the next ID and append an entity with no components.
    ///
    /// If growing the registry fails, no ID is consumed.
    pub fn allocate(&mut self) -> Result<EntityID> {
        self.entries.try_reserve(1)?;

        let id = EntityID::new(self.next_id).expect("entity IDs start at 1");
        self.next_id = self.next_id.checked_add(1).expect("entity IDs exhausted");
        self.entries.push(EntityEntry {
            id,
            mask: ComponentMask::EMPTY,
        });

        Ok(id)
    }

    fn position(&self, id: EntityID) -> Option<usize> {
        self.entries.binary_search_by_key(&id, |e| e.id).ok()
    }

    /// Returns true if the entity is live.
    pub fn contains(&self, id: EntityID) -> bool {
        self.position(id).is_some()
    }

    /// Find the registry entry for an entity.
    pub fn get(&self, id: EntityID) -> Option<&EntityEntry> {
        self.position(id).map(|idx| &self.entries[idx])
    }

    /// Return the component mask of an entity, or `None` if it does not exist.
    ///
    /// A live entity with no components returns `Some(ComponentMask::EMPTY)`.
    pub fn mask(&self, id: EntityID) -> Option<ComponentMask> {
        self.get(id).map(|e| e.mask)
    }

    /// Update the component mask of an entity.
    ///
    /// Returns false if the entity does not exist.
    pub(crate) fn set_mask(&mut self, id: EntityID, mask: ComponentMask) -> bool {
        match self.position(id) {
            Some(idx) => {
                self.entries[idx].mask = mask;
                true
            }
            None => false,
        }
    }

    /// Remove an entity, keeping the remaining entries in order.
    ///
    /// Returns the mask the entity had, or `None` if it did not exist.
    pub(crate) fn remove(&mut self, id: EntityID) -> Option<ComponentMask> {
        self.position(id).map(|idx| self.entries.remove(idx).mask)
    }
}

impl Default for EntityRegistry {
    fn default() -> Self {
        EntityRegistry::new()
    }
}
