//! Dense per-type component storage.
//!
//! Each registered component type owns one `ComponentStore`: the payloads of
//! every entity with that component, kept sorted by entity ID so a single
//! entity's payload can be found with a binary search.

use std::any::Any;
use std::collections::TryReserveError;

use crate::component::Component;
use crate::entity::EntityID;

/// The component payloads of a single type, sorted by owning entity.
///
/// `entities[i]` owns `values[i]`. IDs are unique and strictly increasing.
#[derive(Debug)]
pub struct ComponentStore<T> {
    entities: Vec<EntityID>,
    values: Vec<T>,
}

impl<T> ComponentStore<T> {
    /// Create a new, empty, store.
    pub fn new() -> ComponentStore<T> {
        ComponentStore {
            entities: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Return the number of records in the store.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns true if the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Return the owning entities, in ascending order.
    pub fn entity_ids(&self) -> &[EntityID] {
        &self.entities
    }

    /// Return the payloads, in the same order as `entity_ids`.
    pub fn values(&self) -> &[T] {
        &self.values
    }

    fn search(&self, entity: EntityID) -> Result<usize, usize> {
        if self.entities.is_empty() {
            return Err(0);
        }

        self.entities.binary_search(&entity)
    }

    /// Return the index of an entity's record.
    pub fn position(&self, entity: EntityID) -> Option<usize> {
        self.search(entity).ok()
    }

    /// Returns true if the entity has a record in this store.
    pub fn contains(&self, entity: EntityID) -> bool {
        self.position(entity).is_some()
    }

    /// Get the payload for an entity.
    pub fn get(&self, entity: EntityID) -> Option<&T> {
        self.position(entity).map(|idx| &self.values[idx])
    }

    /// Get the mutable payload for an entity.
    pub fn get_mut(&mut self, entity: EntityID) -> Option<&mut T> {
        self.position(entity).map(move |idx| &mut self.values[idx])
    }

    /// Insert a record for an entity at its sorted position.
    ///
    /// Returns `Ok(false)` without touching the store if the entity already has
    /// a record. If reserving space fails the store is left unchanged.
    pub fn insert(&mut self, entity: EntityID, value: T) -> Result<bool, TryReserveError> {
        let idx = match self.search(entity) {
            Ok(_) => return Ok(false),
            Err(idx) => idx,
        };

        self.entities.try_reserve(1)?;
        self.values.try_reserve(1)?;
        self.entities.insert(idx, entity);
        self.values.insert(idx, value);
        Ok(true)
    }

    /// Remove the record for an entity, shifting later records down.
    pub fn remove(&mut self, entity: EntityID) -> Option<T> {
        let idx = self.position(entity)?;
        self.entities.remove(idx);
        Some(self.values.remove(idx))
    }

    /// Iterate over all records in entity order.
    pub fn iter(&self) -> impl Iterator<Item=(EntityID, &T)> + '_ {
        self.entities.iter().cloned().zip(self.values.iter())
    }

    /// Iterate mutably over all records in entity order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item=(EntityID, &mut T)> + '_ {
        self.entities.iter().cloned().zip(self.values.iter_mut())
    }
}

impl<T> Default for ComponentStore<T> {
    fn default() -> Self {
        ComponentStore::new()
    }
}

/// The type-erased view of a `ComponentStore` the world uses for structural
/// changes that only know a component's mask bit.
pub(crate) trait ErasedStore: Send + Sync {
    /// Attach a default payload. See `ComponentStore::insert`.
    fn attach_default(&mut self, entity: EntityID) -> Result<bool, TryReserveError>;

    /// Drop an entity's payload, returning true if it had one.
    fn detach(&mut self, entity: EntityID) -> bool;

    fn len(&self) -> usize;

    #[cfg(test)]
    fn contains(&self, entity: EntityID) -> bool;

    #[cfg(test)]
    fn entity_ids(&self) -> &[EntityID];

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Component> ErasedStore for ComponentStore<T> {
    fn attach_default(&mut self, entity: EntityID) -> Result<bool, TryReserveError> {
        self.insert(entity, T::default())
    }

    fn detach(&mut self, entity: EntityID) -> bool {
        self.remove(entity).is_some()
    }

    fn len(&self) -> usize {
        ComponentStore::len(self)
    }

    #[cfg(test)]
    fn contains(&self, entity: EntityID) -> bool {
        ComponentStore::contains(self, entity)
    }

    #[cfg(test)]
    fn entity_ids(&self) -> &[EntityID] {
        ComponentStore::entity_ids(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
