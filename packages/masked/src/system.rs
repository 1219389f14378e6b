//! Systems, their queries and the ordered registry the scheduler runs.

use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use crate::component::ComponentMask;
use crate::entity::EntityID;
use crate::world::World;

/// An ECS system.
///
/// A system is run once per frame with the entities matching its query. When
/// a system is allowed more than one thread, `run` may be called concurrently
/// with disjoint batches of the same frame's matches.
pub trait System: Send + Sync {
    /// Update the system with one batch of matching entities.
    ///
    /// Structural changes made through the world are allowed from a system
    /// running on the control thread. Systems running on worker threads should
    /// only touch the payloads of their own entities, and use the deferred
    /// variants for everything else.
    fn run(&self, world: &World, batch: Batch<'_>);
}

impl<S: System + ?Sized> System for Arc<S> {
    fn run(&self, world: &World, batch: Batch<'_>) {
        (**self).run(world, batch)
    }
}

/// A `System` backed by a closure.
pub struct FnSystem<F>(F);

impl<F> System for FnSystem<F>
    where F: Fn(&World, Batch<'_>) + Send + Sync
{
    fn run(&self, world: &World, batch: Batch<'_>) {
        (self.0)(world, batch)
    }
}

/// Create a system from a closure.
pub fn from_fn<F>(f: F) -> FnSystem<F>
    where F: Fn(&World, Batch<'_>) + Send + Sync
{
    FnSystem(f)
}

/// The entities a system is run with.
///
/// `entities()[i]` has the mask `masks()[i]`, as read when the batch was built.
/// Run-once systems always receive an empty batch.
#[derive(Clone, Copy, Debug)]
pub struct Batch<'a> {
    entities: &'a [EntityID],
    masks: &'a [ComponentMask],
    delta_time: f32,
}

impl<'a> Batch<'a> {
    /// Create a batch from parallel entity and mask slices.
    pub fn new(entities: &'a [EntityID], masks: &'a [ComponentMask], delta_time: f32) -> Batch<'a> {
        assert_eq!(entities.len(), masks.len(), "batch slices must be parallel");
        Batch {
            entities,
            masks,
            delta_time,
        }
    }

    /// Create a batch with no entities.
    pub fn empty(delta_time: f32) -> Batch<'a> {
        Batch::new(&[], &[], delta_time)
    }

    /// Return the matched entities.
    pub fn entities(&self) -> &'a [EntityID] {
        self.entities
    }

    /// Return the masks of the matched entities.
    pub fn masks(&self) -> &'a [ComponentMask] {
        self.masks
    }

    /// Return the number of entities in the batch.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns true if the batch has no entities.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Return the time step the frame was run with.
    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }

    /// Iterate over entity and mask pairs.
    pub fn iter(&self) -> impl Iterator<Item=(EntityID, ComponentMask)> + 'a {
        self.entities.iter().cloned().zip(self.masks.iter().cloned())
    }
}

/// How a query's mask is compared with an entity's mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Comparison {
    /// Match entities with at least one of the query's components.
    Any,
    /// Match entities with every one of the query's components.
    All,
    /// Match no entities; run the system exactly once per frame.
    RunOnce,
}

/// The selection of entities a system runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Query {
    mask: ComponentMask,
    comparison: Comparison,
}

impl Query {
    /// Create a query from a mask and comparison mode.
    pub fn new(mask: impl Into<ComponentMask>, comparison: Comparison) -> Query {
        Query {
            mask: mask.into(),
            comparison,
        }
    }

    /// Match entities with any of the components in `mask`.
    pub fn any(mask: impl Into<ComponentMask>) -> Query {
        Query::new(mask, Comparison::Any)
    }

    /// Match entities with all of the components in `mask`.
    pub fn all(mask: impl Into<ComponentMask>) -> Query {
        Query::new(mask, Comparison::All)
    }

    /// Ignore entities and run once per frame.
    pub fn run_once() -> Query {
        Query::new(ComponentMask::EMPTY, Comparison::RunOnce)
    }

    /// Return the query mask.
    pub fn mask(&self) -> ComponentMask {
        self.mask
    }

    /// Return the comparison mode.
    pub fn comparison(&self) -> Comparison {
        self.comparison
    }

    /// Returns true for run-once queries.
    pub fn is_run_once(&self) -> bool {
        self.comparison == Comparison::RunOnce
    }

    /// Returns true if an entity with `mask` is selected by this query.
    pub fn matches(&self, mask: ComponentMask) -> bool {
        match self.comparison {
            Comparison::Any => mask.intersects(self.mask),
            Comparison::All => mask.contains(self.mask),
            Comparison::RunOnce => false,
        }
    }
}

/// A token which identifies an enabled system.
///
/// Tokens are unique per `World`. Enabling the same system twice yields two
/// tokens and two schedule entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SystemToken(pub(crate) u64);

/// A system together with its scheduling requirements.
#[derive(Clone)]
pub struct SystemDescriptor {
    token: SystemToken,
    system: Arc<dyn System>,
    query: Query,
    max_threads: usize,
    order: i32,
}

impl SystemDescriptor {
    pub(crate) fn new(
        token: SystemToken,
        system: Arc<dyn System>,
        query: Query,
        max_threads: usize,
        order: i32,
    ) -> SystemDescriptor {
        SystemDescriptor {
            token,
            system,
            query,
            max_threads,
            order,
        }
    }

    /// Return the token this system was enabled with.
    pub fn token(&self) -> SystemToken {
        self.token
    }

    /// Return the system.
    pub fn system(&self) -> &Arc<dyn System> {
        &self.system
    }

    /// Return the query selecting this system's entities.
    pub fn query(&self) -> Query {
        self.query
    }

    /// Return the maximum number of threads the system may be split over.
    pub fn max_threads(&self) -> usize {
        self.max_threads
    }

    /// Return the execution order. Lower orders run first.
    pub fn order(&self) -> i32 {
        self.order
    }

    /// Return the number of threads to split `matches` entities over.
    pub fn effective_threads(&self, matches: usize) -> usize {
        self.max_threads.min(matches).max(1)
    }
}

impl Debug for SystemDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemDescriptor")
            .field("token", &self.token)
            .field("query", &self.query)
            .field("max_threads", &self.max_threads)
            .field("order", &self.order)
            .finish()
    }
}

/// The enabled systems, sorted by execution order.
///
/// Systems with equal orders run in the order they were enabled.
#[derive(Debug, Default)]
pub struct SystemRegistry {
    systems: Vec<SystemDescriptor>,
}

impl SystemRegistry {
    /// Create a new empty `SystemRegistry`.
    pub fn new() -> SystemRegistry {
        SystemRegistry {
            systems: Vec::new(),
        }
    }

    /// Return the number of enabled systems.
    pub fn len(&self) -> usize {
        self.systems.len()
    }

    /// Returns true if no systems are enabled.
    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    /// Return the systems in execution order.
    pub fn as_slice(&self) -> &[SystemDescriptor] {
        &self.systems
    }

    /// Iterate over the systems in execution order.
    pub fn iter(&self) -> std::slice::Iter<'_, SystemDescriptor> {
        self.systems.iter()
    }

    /// Insert a system after every system of the same or lower order.
    pub fn insert(&mut self, descriptor: SystemDescriptor) {
        let idx = self.systems.partition_point(|s| s.order <= descriptor.order);
        self.systems.insert(idx, descriptor);
    }

    /// Remove the system with the given token.
    ///
    /// Returns the removed descriptor, if there was one.
    pub fn remove(&mut self, token: SystemToken) -> Option<SystemDescriptor> {
        let idx = self.systems.iter().position(|s| s.token == token)?;
        Some(self.systems.remove(idx))
    }
}
