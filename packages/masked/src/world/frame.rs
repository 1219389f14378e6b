//! Running a frame: systems in order, then the deferred tasks.

use std::ops::Range;

use crate::component::ComponentMask;
use crate::entity::EntityID;
use crate::system::{Batch, SystemDescriptor};
use crate::world::World;

/// Contiguous, non-overlapping ranges splitting `len` items into `parts`.
///
/// Every index in `0..len` is covered exactly once. The first `len % parts`
/// ranges are one item longer than the rest. `parts` is clamped to
/// `1..=len`, so an empty input yields a single empty range.
#[derive(Clone, Debug)]
pub struct SliceRanges {
    start: usize,
    base: usize,
    extra: usize,
    remaining: usize,
}

impl SliceRanges {
    /// Split `len` items over `parts` slices.
    pub fn new(len: usize, parts: usize) -> SliceRanges {
        let parts = parts.min(len).max(1);
        SliceRanges {
            start: 0,
            base: len / parts,
            extra: len % parts,
            remaining: parts,
        }
    }
}

impl Iterator for SliceRanges {
    type Item = Range<usize>;

    fn next(&mut self) -> Option<Range<usize>> {
        if self.remaining == 0 {
            return None;
        }

        let mut size = self.base;
        if self.extra > 0 {
            self.extra -= 1;
            size += 1;
        }

        let range = self.start..self.start + size;
        self.start = range.end;
        self.remaining -= 1;
        Some(range)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for SliceRanges {}

impl World {
    /// Run every enabled system once, then apply the deferred tasks.
    ///
    /// The set of entities systems are matched against is fixed when the frame
    /// starts: entities created during the frame are first seen by the next
    /// one, and entities destroyed during the frame are still seen by every
    /// system of this one. Component masks are read fresh for each system, so
    /// immediate attaches and detaches are visible to later systems.
    pub fn run_frame(&mut self, delta_time: f32) {
        {
            let world: &World = self;
            let snapshot_len = world.entities.read().len();
            let mut entities = Vec::with_capacity(snapshot_len);
            let mut masks = Vec::with_capacity(snapshot_len);

            for descriptor in world.systems.iter() {
                if descriptor.query().is_run_once() {
                    log::trace!("running {:?} once", descriptor.token());
                    descriptor.system().run(world, Batch::empty(delta_time));
                    continue;
                }

                entities.clear();
                masks.clear();
                world.collect_matches(descriptor, snapshot_len, &mut entities, &mut masks);
                world.dispatch(descriptor, &entities, &masks, delta_time);
            }
        }

        self.apply_deferred();
    }

    fn collect_matches(
        &self,
        descriptor: &SystemDescriptor,
        snapshot_len: usize,
        entities: &mut Vec<EntityID>,
        masks: &mut Vec<ComponentMask>,
    ) {
        let registry = self.entities.read();
        assert!(registry.len() >= snapshot_len, "entities removed during a frame");

        let query = descriptor.query();
        for entry in &registry.entries()[..snapshot_len] {
            if query.matches(entry.mask()) {
                entities.push(entry.id());
                masks.push(entry.mask());
            }
        }
    }

    fn dispatch(
        &self,
        descriptor: &SystemDescriptor,
        entities: &[EntityID],
        masks: &[ComponentMask],
        delta_time: f32,
    ) {
        let system = descriptor.system();
        let threads = descriptor.effective_threads(entities.len());
        log::trace!("running {:?} on {} entities over {} threads",
                    descriptor.token(), entities.len(), threads);

        if threads <= 1 {
            system.run(self, Batch::new(entities, masks, delta_time));
            return;
        }

        match self.worker_pool() {
            Some(pool) => pool.in_place_scope(|scope| {
                for range in SliceRanges::new(entities.len(), threads) {
                    let batch = Batch::new(&entities[range.clone()], &masks[range], delta_time);
                    scope.spawn(move |_| system.run(self, batch));
                }
            }),
            None => {
                for range in SliceRanges::new(entities.len(), threads) {
                    system.run(self, Batch::new(&entities[range.clone()], &masks[range], delta_time));
                }
            }
        }
    }

    fn worker_pool(&self) -> Option<&rayon::ThreadPool> {
        self.pool.get_or_init(|| {
            let threads = self.config.resolve_worker_threads();
            let name = self.config.get_thread_name().to_string();
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(move |i| format!("{} #{}", name, i))
                .build();

            match pool {
                Ok(pool) => Some(pool),
                Err(err) => {
                    log::error!("Cannot build worker pool ({err}), running slices on the control thread");
                    None
                }
            }
        }).as_ref()
    }
}

#[cfg(test)]
mod test {
    use std::sync::{Arc, Once};

    use parking_lot::Mutex;

    use super::*;
    use crate::component::ComponentType;
    use crate::system::{from_fn, Query};
    use crate::world::WorldConfig;

    static SET_LOGGER_ONCE: Once = Once::new();

    fn init_logger() {
        SET_LOGGER_ONCE.call_once(|| {
            let _ = env_logger::builder().is_test(true).try_init();
        });
    }

    #[derive(Debug, Default, Clone, Copy, PartialEq)]
    struct A(u32);

    #[derive(Debug, Default, Clone, Copy, PartialEq)]
    struct B(u32);

    fn world() -> (World, ComponentType<A>, ComponentType<B>) {
        init_logger();
        let mut world = World::with_config(WorldConfig::new().worker_threads(4));
        let a = world.register::<A>().unwrap();
        let b = world.register::<B>().unwrap();
        (world, a, b)
    }

    /// Enable a system which records every batch it is run with.
    fn recorder(world: &mut World, query: Query, max_threads: usize, order: i32) -> Arc<Mutex<Vec<Vec<EntityID>>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        world.enable_system(from_fn(move |_, batch| {
            sink.lock().push(batch.entities().to_vec());
        }), query, max_threads, order);
        world.apply_deferred();
        seen
    }

    fn flatten(batches: &[Vec<EntityID>]) -> Vec<EntityID> {
        let mut all: Vec<_> = batches.iter().flatten().cloned().collect();
        all.sort();
        all
    }

    #[test]
    fn test_slice_ranges_cover_once() {
        for parts in 1..=4 {
            for len in 0..=(2 * parts + 3) {
                let ranges: Vec<_> = SliceRanges::new(len, parts).collect();
                assert_eq!(ranges.len(), parts.min(len).max(1));

                let mut next = 0;
                for range in &ranges {
                    assert_eq!(range.start, next);
                    if len > 0 {
                        assert!(!range.is_empty());
                    }
                    next = range.end;
                }
                assert_eq!(next, len);

                let longest = ranges.iter().map(|r| r.len()).max().unwrap();
                let shortest = ranges.iter().map(|r| r.len()).min().unwrap();
                assert!(longest - shortest <= 1);
            }
        }
    }

    #[test]
    fn test_all_query_scenario() {
        let (mut world, a, b) = world();
        let e1 = world.create_entity(ComponentMask::EMPTY).unwrap();
        world.attach(e1, a);
        *world.component_mut(e1, a).unwrap() = A(7);
        world.create_entity(b).unwrap();

        let seen = recorder(&mut world, Query::all(a), 1, 0);
        world.run_frame(0.016);

        assert_eq!(*seen.lock(), vec![vec![e1]]);
        assert_eq!(*world.component(e1, a).unwrap(), A(7));
    }

    #[test]
    fn test_any_and_all_scenario() {
        let (mut world, a, b) = world();
        let only_a = world.create_entity(a).unwrap();
        let only_b = world.create_entity(b).unwrap();
        let both = world.create_entity(a | b).unwrap();
        world.create_entity(ComponentMask::EMPTY).unwrap();

        let any = recorder(&mut world, Query::any(a | b), 1, 0);
        let all = recorder(&mut world, Query::all(a | b), 1, 1);
        world.run_frame(0.0);

        assert_eq!(*any.lock(), vec![vec![only_a, only_b, both]]);
        assert_eq!(*all.lock(), vec![vec![both]]);
    }

    #[test]
    fn test_run_once_ignores_entities() {
        let (mut world, a, _) = world();
        for _ in 0..5 {
            world.create_entity(a).unwrap();
        }

        let seen = recorder(&mut world, Query::run_once(), 8, 0);
        world.run_frame(0.0);
        world.run_frame(0.0);

        assert_eq!(*seen.lock(), vec![Vec::<EntityID>::new(), Vec::new()]);
    }

    #[test]
    fn test_query_system_runs_without_matches() {
        let (mut world, a, _) = world();
        let seen = recorder(&mut world, Query::all(a), 4, 0);
        world.run_frame(0.0);

        assert_eq!(*seen.lock(), vec![Vec::<EntityID>::new()]);
    }

    #[test]
    fn test_destroy_visible_until_next_frame() {
        let (mut world, a, _) = world();
        let e1 = world.create_entity(a).unwrap();
        let e2 = world.create_entity(a).unwrap();

        let seen = recorder(&mut world, Query::all(a), 1, 0);
        world.destroy_entity(e1);
        world.run_frame(0.0);
        world.run_frame(0.0);

        assert_eq!(*seen.lock(), vec![vec![e1, e2], vec![e2]]);
        assert_eq!(world.component_count(a), 1);
        assert_eq!(world.entity_count(), 1);
    }

    #[test]
    fn test_destroy_from_system() {
        let (mut world, a, b) = world();
        let e1 = world.create_entity(a | b).unwrap();
        let e2 = world.create_entity(a).unwrap();

        world.enable_system(from_fn(move |world, batch| {
            for e in batch.entities() {
                if *e == e1 {
                    world.destroy_entity(*e);
                }
            }
        }), Query::all(a), 1, 0);
        let later = recorder(&mut world, Query::any(a), 1, 1);

        world.run_frame(0.0);
        assert!(!world.contains(e1));
        assert_eq!(world.component_count(a), 1);
        assert_eq!(world.component_count(b), 0);
        assert_eq!(*later.lock(), vec![vec![e1, e2]]);
    }

    #[test]
    fn test_created_entities_wait_for_next_frame() {
        let (mut world, a, _) = world();
        let first = world.create_entity(a).unwrap();

        world.enable_system(from_fn(move |world, _| {
            world.create_entity(a).unwrap();
        }), Query::run_once(), 1, 0);
        let seen = recorder(&mut world, Query::all(a), 1, 1);

        world.run_frame(0.0);
        assert_eq!(*seen.lock(), vec![vec![first]]);
        assert_eq!(world.entity_count(), 2);

        world.run_frame(0.0);
        assert_eq!(seen.lock()[1].len(), 2);
    }

    #[test]
    fn test_immediate_attach_visible_to_later_systems() {
        let (mut world, a, b) = world();
        let e = world.create_entity(a).unwrap();

        world.enable_system(from_fn(move |world, batch| {
            for e in batch.entities() {
                world.attach(*e, b);
            }
        }), Query::all(a), 1, 0);
        let seen = recorder(&mut world, Query::all(b), 1, 1);

        world.run_frame(0.0);
        assert_eq!(*seen.lock(), vec![vec![e]]);
    }

    #[test]
    fn test_immediate_detach_visible_to_later_systems() {
        let (mut world, a, b) = world();
        let kept = world.create_entity(a | b).unwrap();
        let stripped = world.create_entity(a | b).unwrap();

        world.enable_system(from_fn(move |world, batch| {
            for e in batch.entities() {
                if *e == stripped {
                    world.detach(*e, b);
                }
            }
        }), Query::all(a), 1, 0);
        let seen = recorder(&mut world, Query::all(b), 1, 1);

        world.run_frame(0.0);
        assert_eq!(*seen.lock(), vec![vec![kept]]);
        assert_eq!(world.mask(stripped), Some(a.mask()));
    }

    #[test]
    fn test_detach_while_reading_payload() {
        let (mut world, a, b) = world();
        let alive = world.create_entity(a | b).unwrap();
        let dead = world.create_entity(a | b).unwrap();
        world.set(alive, a, A(3));

        world.enable_system(from_fn(move |world, batch| {
            for e in batch.entities() {
                if let Some(health) = world.component(*e, a) {
                    if health.0 == 0 {
                        world.detach(*e, a | b);
                    }
                }
            }
        }), Query::all(a), 1, 0);
        let seen = recorder(&mut world, Query::all(b), 1, 1);

        world.run_frame(0.0);
        assert_eq!(*seen.lock(), vec![vec![alive]]);
        assert_eq!(world.mask(dead), Some(ComponentMask::EMPTY));
        assert_eq!(world.component_count(a), 1);
        assert_eq!(world.pending_tasks(), 0);
    }

    #[test]
    fn test_threaded_detach_while_reading_payload() {
        let (mut world, a, _) = world();
        let entities: Vec<_> = (0..32).map(|_| world.create_entity(a).unwrap()).collect();

        world.enable_system(from_fn(move |world, batch| {
            for e in batch.entities() {
                if let Some(value) = world.component(*e, a) {
                    if value.0 == 0 && e.id() % 2 == 0 {
                        world.detach(*e, a);
                    }
                }
            }
        }), Query::all(a), 4, 0);
        world.apply_deferred();
        world.run_frame(0.0);

        for e in entities {
            assert_eq!(world.mask(e).unwrap().has_bit(a.index()), e.id() % 2 == 1);
        }
        assert_eq!(world.component_count(a), 16);
    }

    #[test]
    fn test_threaded_writes_from_frame_snapshot() {
        let (mut world, a, b) = world();
        let entities: Vec<_> = (0..24).map(|_| world.create_entity(a | b).unwrap()).collect();
        for e in &entities {
            world.set(*e, a, A(e.id() as u32));
        }

        let snapshot = Arc::new(Mutex::new(Vec::new()));
        let sink = snapshot.clone();
        world.enable_system(from_fn(move |world, _| {
            let store = world.store(a).unwrap();
            *sink.lock() = store.iter().map(|(_, v)| v.0).collect::<Vec<_>>();
        }), Query::run_once(), 1, -1);

        // Every entity writes the sum of the values all entities had at the
        // start of the frame, and zeroes its own value.
        let source = snapshot.clone();
        world.enable_system(from_fn(move |world, batch| {
            let total: u32 = source.lock().iter().sum();
            for e in batch.entities() {
                world.set(*e, b, B(total));
                world.set(*e, a, A(0));
            }
        }), Query::all(a | b), 4, 0);
        world.apply_deferred();
        world.run_frame(0.0);

        let expected: u32 = entities.iter().map(|e| e.id() as u32).sum();
        for e in &entities {
            assert_eq!(*world.component(*e, b).unwrap(), B(expected));
            assert_eq!(*world.component(*e, a).unwrap(), A(0));
        }
    }

    #[test]
    fn test_systems_run_in_order() {
        let (mut world, _, _) = world();
        let log = Arc::new(Mutex::new(Vec::new()));

        for order in [3, -2, 7, 0] {
            let log = log.clone();
            world.enable_system(from_fn(move |_, _| log.lock().push(order)), Query::run_once(), 1, order);
        }
        world.apply_deferred();
        world.run_frame(0.0);

        assert_eq!(*log.lock(), vec![-2, 0, 3, 7]);
    }

    #[test]
    fn test_enable_during_frame_takes_effect_next_frame() {
        let (mut world, _, _) = world();
        let count = Arc::new(Mutex::new(0));

        let inner = count.clone();
        world.enable_system(from_fn(move |world, _| {
            let inner = inner.clone();
            world.enable_system(from_fn(move |_, _| *inner.lock() += 1), Query::run_once(), 1, 10);
        }), Query::run_once(), 1, 0);
        world.apply_deferred();

        world.run_frame(0.0);
        assert_eq!(*count.lock(), 0);
        assert_eq!(world.systems().len(), 2);

        world.run_frame(0.0);
        assert_eq!(*count.lock(), 1);
    }

    #[test]
    fn test_disable_during_frame() {
        let (mut world, _, _) = world();
        let seen = recorder(&mut world, Query::run_once(), 1, 5);
        let token = world.systems()[0].token();

        world.enable_system(from_fn(move |world, _| world.disable_system(token)), Query::run_once(), 1, 0);
        world.apply_deferred();

        world.run_frame(0.0);
        world.run_frame(0.0);
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_threaded_slices_cover_matches() {
        for max_threads in [2usize, 3, 4] {
            for count in 0..=(2 * max_threads + 1) {
                let (mut world, a, b) = world();
                let mut expected = Vec::new();
                for n in 0..count {
                    let e = world.create_entity(a).unwrap();
                    expected.push(e);
                    if n % 2 == 0 {
                        world.create_entity(b).unwrap();
                    }
                }

                let seen = recorder(&mut world, Query::all(a), max_threads, 0);
                world.run_frame(0.0);

                let batches = seen.lock();
                assert_eq!(batches.len(), max_threads.min(count).max(1));
                assert_eq!(flatten(&batches), expected);
            }
        }
    }

    #[test]
    fn test_threaded_payload_writes() {
        let (mut world, a, _) = world();
        let entities: Vec<_> = (0..64).map(|_| world.create_entity(a).unwrap()).collect();

        world.enable_system(from_fn(move |world, batch| {
            for e in batch.entities() {
                world.component_mut(*e, a).unwrap().0 += e.id() as u32;
            }
        }), Query::all(a), 4, 0);
        world.apply_deferred();
        world.run_frame(0.0);
        world.run_frame(0.0);

        for e in entities {
            assert_eq!(world.component(e, a).unwrap().0, 2 * e.id() as u32);
        }
    }

    #[test]
    fn test_threaded_deferred_tasks() {
        let (mut world, a, b) = world();
        let entities: Vec<_> = (0..20).map(|_| world.create_entity(a | b).unwrap()).collect();

        world.enable_system(from_fn(move |world, batch| {
            for e in batch.entities() {
                if e.id() % 2 == 0 {
                    world.destroy_entity(*e);
                } else {
                    world.detach_deferred(*e, b);
                }
            }
        }), Query::all(a), 4, 0);
        world.apply_deferred();
        world.run_frame(0.0);

        assert_eq!(world.entity_count(), 10);
        assert_eq!(world.component_count(a), 10);
        assert_eq!(world.component_count(b), 0);
        for e in entities {
            assert_eq!(world.contains(e), e.id() % 2 == 1);
        }
        assert_eq!(world.pending_tasks(), 0);
    }

    #[test]
    fn test_delta_time_is_forwarded() {
        let (mut world, _, _) = world();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        world.enable_system(from_fn(move |_, batch| sink.lock().push(batch.delta_time())), Query::run_once(), 1, 0);
        world.apply_deferred();

        world.run_frame(0.25);
        world.run_frame(0.5);
        assert_eq!(*seen.lock(), vec![0.25, 0.5]);
    }
}
