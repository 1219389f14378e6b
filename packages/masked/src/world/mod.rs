//! A world which holds entities, their components and the systems run over them.

use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;
use std::sync::atomic::{self, AtomicU64};

use once_cell::sync::OnceCell;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

pub use borrow::{ComponentRef, ComponentRefMut};
pub use config::WorldConfig;
pub use frame::SliceRanges;

use crate::command_buffer::{CommandBuffer, Task};
use crate::component::{
    Component,
    ComponentMask,
    ComponentRegistration,
    ComponentType,
    MAX_COMPONENT_TYPES,
};
use crate::entity::{EntityID, EntityRegistry};
use crate::error::{Error, Result};
use crate::store::{ComponentStore, ErasedStore};
use crate::system::{Query, System, SystemDescriptor, SystemRegistry, SystemToken};
use borrow::{Access, BorrowToken};

mod borrow;
mod config;
mod frame;

struct ComponentSlot {
    registration: ComponentRegistration,
    store: RwLock<Box<dyn ErasedStore>>,
}

/// A World owns every entity, component store and system.
///
/// Most operations take `&self` so they can be called from inside running
/// systems. Registering component types, applying deferred tasks and running a
/// frame need `&mut self`, which is how the world guarantees the component
/// table and system schedule never change while a frame iterates them.
///
/// Guards returned by `component`, `component_mut` and `store` lock their
/// component type's store until dropped. While a store is locked, attaching
/// or detaching its component is deferred to the end of the frame, and `set`
/// and `insert` on it from the same thread return false. Threads holding
/// guards on several component types should take them in a consistent order.
pub struct World {
    config: WorldConfig,
    entities: RwLock<EntityRegistry>,
    components: Vec<ComponentSlot>,
    systems: SystemRegistry,
    tasks: CommandBuffer,
    next_system: AtomicU64,
    pool: OnceCell<Option<rayon::ThreadPool>>,
}

impl World {
    /// Create a new, empty, world with the default configuration.
    pub fn new() -> World {
        World::with_config(WorldConfig::default())
    }

    /// Create a new, empty, world.
    pub fn with_config(config: WorldConfig) -> World {
        World {
            config,
            entities: RwLock::new(EntityRegistry::new()),
            components: Vec::new(),
            systems: SystemRegistry::new(),
            tasks: CommandBuffer::new(),
            next_system: AtomicU64::new(1),
            pool: OnceCell::new(),
        }
    }

    /// Return the configuration this world was created with.
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    fn key(&self) -> usize {
        self as *const World as usize
    }

    fn borrowed_here(&self, index: usize) -> Option<Access> {
        borrow::held(self.key(), index)
    }

    // Components

    /// Register a new component type, assigning it the next free mask bit.
    ///
    /// Component types should be registered before entities are created, but
    /// this is not required.
    pub fn register<T: Component>(&mut self) -> Result<ComponentType<T>> {
        let index = self.components.len();
        if index >= MAX_COMPONENT_TYPES {
            return Err(Error::ComponentTypesExhausted);
        }

        self.components.try_reserve(1)?;
        let registration = ComponentRegistration::new::<T>(index);
        log::debug!("registered {:?}", registration);
        self.components.push(ComponentSlot {
            registration,
            store: RwLock::new(Box::new(ComponentStore::<T>::new())),
        });

        Ok(ComponentType::new(index))
    }

    /// Fetch the registration for the component type with the given bit.
    pub fn registration(&self, index: usize) -> Option<&ComponentRegistration> {
        self.components.get(index).map(|slot| &slot.registration)
    }

    /// Iterate over all registered component types in bit order.
    pub fn registrations(&self) -> impl Iterator<Item=&ComponentRegistration> + '_ {
        self.components.iter().map(|slot| &slot.registration)
    }

    /// Return the mask of every registered component type.
    pub fn registered_mask(&self) -> ComponentMask {
        match self.components.len() {
            MAX_COMPONENT_TYPES => ComponentMask::from_bits(u64::MAX),
            n => ComponentMask::from_bits((1u64 << n) - 1),
        }
    }

    fn slot<T: Component>(&self, ty: ComponentType<T>) -> Option<&ComponentSlot> {
        self.components.get(ty.index())
    }

    /// Return the number of entities with the given component.
    pub fn component_count<T: Component>(&self, ty: ComponentType<T>) -> usize {
        self.read_store(ty).map_or(0, |store| store.len())
    }

    /// Attach default-valued components to an entity.
    ///
    /// Components the entity already has, and bits naming no registered type,
    /// are skipped. Nothing happens if the entity does not exist. Components
    /// whose store is locked are attached once the current frame is over.
    pub fn attach(&self, entity: EntityID, mask: impl Into<ComponentMask>) {
        let mut entities = self.entities.write();
        let busy = self.attach_locked(&mut entities, entity, mask.into(), false);
        drop(entities);
        self.defer_busy(entity, busy, Task::AttachComponents);
    }

    /// Attach components, returning the ones skipped because their store was
    /// locked. With `wait` set the store locks are waited for instead.
    fn attach_locked(&self, entities: &mut EntityRegistry, entity: EntityID, mask: ComponentMask, wait: bool) -> ComponentMask {
        let current = match entities.mask(entity) {
            Some(current) => current,
            None => return ComponentMask::EMPTY,
        };

        let mut added = ComponentMask::EMPTY;
        let mut busy = ComponentMask::EMPTY;
        for index in mask.without(current) {
            let slot = match self.components.get(index) {
                Some(slot) => slot,
                None => continue,
            };
            let store = if wait {
                Some(slot.store.write())
            } else {
                slot.store.try_write()
            };
            let mut store = match store {
                Some(store) => store,
                None => {
                    busy |= ComponentMask::bit(index);
                    continue;
                }
            };

            match store.attach_default(entity) {
                Ok(inserted) => {
                    assert!(inserted, "{:?} already in store of {:?}", entity, slot.registration);
                    added |= ComponentMask::bit(index);
                }
                Err(err) => {
                    log::warn!("failed to attach {:?} to {:?}: {}", slot.registration, entity, err);
                }
            }
        }

        entities.set_mask(entity, current | added);
        busy
    }

    fn defer_busy(&self, entity: EntityID, busy: ComponentMask, task: fn(EntityID, ComponentMask) -> Task) {
        if busy.is_empty() {
            return;
        }

        let task = task(entity, busy);
        log::debug!("stores are locked, deferring {:?}", task);
        self.defer(task);
    }

    /// Attach a component to an entity with the given value.
    ///
    /// If the entity already has the component its value is replaced. Returns
    /// false if the entity or component type is unknown, the store is locked
    /// by a guard on this thread or by a structural change elsewhere, or the
    /// store could not grow.
    pub fn insert<T: Component>(&self, entity: EntityID, ty: ComponentType<T>, value: T) -> bool {
        let slot = match self.slot(ty) {
            Some(slot) => slot,
            None => return false,
        };
        if self.borrowed_here(ty.index()).is_some() {
            log::warn!("cannot insert {:?} into {:?} while it is borrowed", slot.registration, entity);
            return false;
        }

        let mut entities = self.entities.write();
        let current = match entities.mask(entity) {
            Some(current) => current,
            None => return false,
        };

        let mut store = match slot.store.try_write() {
            Some(store) => store,
            None => {
                log::warn!("cannot insert {:?} into {:?} while it is locked", slot.registration, entity);
                return false;
            }
        };
        let store = match store.as_any_mut().downcast_mut::<ComponentStore<T>>() {
            Some(store) => store,
            None => return false,
        };

        if let Some(existing) = store.get_mut(entity) {
            *existing = value;
            return true;
        }

        match store.insert(entity, value) {
            Ok(_) => {
                entities.set_mask(entity, current | ty.mask());
                true
            }
            Err(err) => {
                log::warn!("failed to attach {:?} to {:?}: {}", slot.registration, entity, err);
                false
            }
        }
    }

    /// Replace the value of a component the entity already has.
    ///
    /// Returns false if the entity does not have the component, or this
    /// thread holds a guard on the component type's store.
    pub fn set<T: Component>(&self, entity: EntityID, ty: ComponentType<T>, value: T) -> bool {
        if self.borrowed_here(ty.index()).is_some() {
            log::warn!("cannot set {:?} on {:?} while it is borrowed", ty, entity);
            return false;
        }

        match self.component_mut(entity, ty) {
            Some(mut existing) => {
                *existing = value;
                true
            }
            None => false,
        }
    }

    /// Detach components from an entity immediately.
    ///
    /// Components the entity does not have are skipped. Components whose store
    /// is locked are detached once the current frame is over.
    pub fn detach(&self, entity: EntityID, mask: impl Into<ComponentMask>) {
        let mut entities = self.entities.write();
        let busy = self.detach_locked(&mut entities, entity, mask.into(), false);
        drop(entities);
        self.defer_busy(entity, busy, Task::DetachComponents);
    }

    /// Detach components, returning the ones skipped because their store was
    /// locked. With `wait` set the store locks are waited for instead.
    fn detach_locked(&self, entities: &mut EntityRegistry, entity: EntityID, mask: ComponentMask, wait: bool) -> ComponentMask {
        let current = match entities.mask(entity) {
            Some(current) => current,
            None => return ComponentMask::EMPTY,
        };

        let mut removed = ComponentMask::EMPTY;
        let mut busy = ComponentMask::EMPTY;
        for index in mask & current {
            let slot = match self.components.get(index) {
                Some(slot) => slot,
                None => continue,
            };
            let store = if wait {
                Some(slot.store.write())
            } else {
                slot.store.try_write()
            };
            let mut store = match store {
                Some(store) => store,
                None => {
                    busy |= ComponentMask::bit(index);
                    continue;
                }
            };

            let found = store.detach(entity);
            assert!(found, "{:?} missing from store of {:?}", entity, slot.registration);
            removed |= ComponentMask::bit(index);
        }

        entities.set_mask(entity, current.without(removed));
        busy
    }

    /// Detach components from an entity once the current frame is over.
    pub fn detach_deferred(&self, entity: EntityID, mask: impl Into<ComponentMask>) {
        self.defer(Task::DetachComponents(entity, mask.into()));
    }

    /// Get a component of an entity.
    ///
    /// The returned guard holds the component type's store for reading.
    /// Several read guards of one store may be held by the same thread.
    ///
    /// # Panics
    ///
    /// Panics if this thread holds a `component_mut` guard of the same type.
    pub fn component<T: Component>(&self, entity: EntityID, ty: ComponentType<T>) -> Option<ComponentRef<'_, T>> {
        let lock = self.read_store(ty)?;
        let guard = RwLockReadGuard::try_map(lock, |store| {
            store.as_any()
                .downcast_ref::<ComponentStore<T>>()?
                .get(entity)
        }).ok()?;
        Some(ComponentRef::new(guard, BorrowToken::new(self.key(), ty.index(), Access::Read)))
    }

    /// Get a mutable reference to a component of an entity.
    ///
    /// The returned guard holds the component type's store for writing.
    ///
    /// # Panics
    ///
    /// Panics if this thread already holds a guard of the same type.
    pub fn component_mut<T: Component>(&self, entity: EntityID, ty: ComponentType<T>) -> Option<ComponentRefMut<'_, T>> {
        let slot = self.slot(ty)?;
        if let Some(access) = self.borrowed_here(ty.index()) {
            panic!("{:?} is already borrowed ({:?}) by this thread", slot.registration, access);
        }

        let guard = RwLockWriteGuard::try_map(slot.store.write(), |store| {
            store.as_any_mut()
                .downcast_mut::<ComponentStore<T>>()?
                .get_mut(entity)
        }).ok()?;
        Some(ComponentRefMut::new(guard, BorrowToken::new(self.key(), ty.index(), Access::Write)))
    }

    /// Borrow the whole store of a component type.
    ///
    /// # Panics
    ///
    /// Panics if this thread holds a `component_mut` guard of the same type.
    pub fn store<T: Component>(&self, ty: ComponentType<T>) -> Option<ComponentRef<'_, ComponentStore<T>>> {
        let lock = self.read_store(ty)?;
        let guard = RwLockReadGuard::try_map(lock, |store| {
            store.as_any().downcast_ref::<ComponentStore<T>>()
        }).ok()?;
        Some(ComponentRef::new(guard, BorrowToken::new(self.key(), ty.index(), Access::Read)))
    }

    fn read_store<T: Component>(&self, ty: ComponentType<T>) -> Option<RwLockReadGuard<'_, Box<dyn ErasedStore>>> {
        let slot = self.slot(ty)?;
        match self.borrowed_here(ty.index()) {
            Some(Access::Write) => panic!("{:?} is already borrowed mutably by this thread", slot.registration),
            Some(Access::Read) => Some(slot.store.read_recursive()),
            None => Some(slot.store.read()),
        }
    }

    // Entities

    /// Create a new entity with default-valued components.
    ///
    /// Bits of `mask` naming no registered component type are ignored.
    pub fn create_entity(&self, mask: impl Into<ComponentMask>) -> Result<EntityID> {
        let mut entities = self.entities.write();
        let id = entities.allocate()?;
        let busy = self.attach_locked(&mut entities, id, mask.into(), false);
        drop(entities);
        self.defer_busy(id, busy, Task::AttachComponents);
        Ok(id)
    }

    /// Destroy an entity once the current frame is over.
    pub fn destroy_entity(&self, entity: EntityID) {
        self.defer(Task::DestroyEntity(entity));
    }

    fn destroy_now(&mut self, entity: EntityID) {
        let entities = self.entities.get_mut();
        let mask = match entities.mask(entity) {
            Some(mask) => mask,
            None => return,
        };

        for index in mask {
            let found = self.components[index].store.get_mut().detach(entity);
            assert!(found, "{:?} missing from store #{}", entity, index);
        }
        entities.remove(entity);
    }

    /// Returns true if the entity exists.
    pub fn contains(&self, entity: EntityID) -> bool {
        self.entities.read().contains(entity)
    }

    /// Return the component mask of an entity, or `None` if it does not exist.
    ///
    /// An entity with no components has the empty mask, which is distinct
    /// from `None`.
    pub fn mask(&self, entity: EntityID) -> Option<ComponentMask> {
        self.entities.read().mask(entity)
    }

    /// Return the number of live entities.
    pub fn entity_count(&self) -> usize {
        self.entities.read().len()
    }

    /// Return the IDs of all live entities in creation order.
    pub fn entities(&self) -> Vec<EntityID> {
        self.entities.read().entries().iter().map(|e| e.id()).collect()
    }

    // Systems

    /// Enable a system once the current frame is over.
    ///
    /// The system is run every frame with the entities matching `query`, split
    /// over at most `max_threads` threads. Systems with lower `order` run first.
    pub fn enable_system(
        &self,
        system: impl System + 'static,
        query: Query,
        max_threads: usize,
        order: i32,
    ) -> SystemToken {
        let token = SystemToken(self.next_system.fetch_add(1, atomic::Ordering::Relaxed));
        let descriptor = SystemDescriptor::new(token, Arc::new(system), query, max_threads, order);
        self.defer(Task::EnableSystem(descriptor));
        token
    }

    /// Disable a system once the current frame is over.
    pub fn disable_system(&self, token: SystemToken) {
        self.defer(Task::DisableSystem(token));
    }

    /// Return the enabled systems in execution order.
    pub fn systems(&self) -> &[SystemDescriptor] {
        self.systems.as_slice()
    }

    // Tasks

    /// Queue a task to be applied once the current frame is over.
    pub fn defer(&self, task: Task) {
        self.tasks.push(task);
    }

    /// Return the number of queued tasks.
    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Apply all queued tasks in the order they were queued.
    ///
    /// `run_frame` does this after every frame. Calling it directly is useful
    /// for making systems enabled up front part of the very first frame.
    pub fn apply_deferred(&mut self) {
        while let Some(task) = self.tasks.pop() {
            self.apply_task(task);
        }
    }

    fn apply_task(&mut self, task: Task) {
        log::trace!("applying {:?}", task);

        match task {
            Task::DestroyEntity(entity) => self.destroy_now(entity),
            Task::AttachComponents(entity, mask) => {
                let mut entities = self.entities.write();
                self.attach_locked(&mut entities, entity, mask, true);
            }
            Task::DetachComponents(entity, mask) => {
                let mut entities = self.entities.write();
                self.detach_locked(&mut entities, entity, mask, true);
            }
            Task::EnableSystem(descriptor) => {
                log::debug!("enabled {:?}", descriptor);
                self.systems.insert(descriptor);
            }
            Task::DisableSystem(token) => {
                if let Some(descriptor) = self.systems.remove(token) {
                    log::debug!("disabled {:?}", descriptor);
                }
            }
        }
    }
}

impl Default for World {
    fn default() -> Self {
        World::new()
    }
}

impl Debug for World {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("entities", &self.entity_count())
            .field("components", &self.registrations().collect::<Vec<_>>())
            .field("systems", &self.systems.len())
            .field("pending_tasks", &self.tasks.len())
            .finish()
    }
}
