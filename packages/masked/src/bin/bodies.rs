use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use parking_lot::RwLock;

use masked::{Batch, ComponentType, EntityID, Query, System, World, WorldConfig};

const G: f32 = 10.0;
const TIME_STEP: f32 = 1.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct Position(f32, f32);

#[derive(Debug, Clone, Copy, Default)]
pub struct Velocity(f32, f32);

#[derive(Debug, Clone, Copy, Default)]
pub struct Mass(f32);

/// Positions and masses as they were when the frame started.
type Snapshot = Arc<RwLock<Vec<(EntityID, Position, Mass)>>>;

struct TakeSnapshot {
    position: ComponentType<Position>,
    mass: ComponentType<Mass>,
    snapshot: Snapshot,
}

impl System for TakeSnapshot {
    fn run(&self, world: &World, _batch: Batch<'_>) {
        let mut snapshot = self.snapshot.write();
        snapshot.clear();

        let (positions, masses) = match (world.store(self.position), world.store(self.mass)) {
            (Some(p), Some(m)) => (p, m),
            _ => return,
        };

        for (id, position) in positions.iter() {
            if let Some(mass) = masses.get(id) {
                snapshot.push((id, *position, *mass));
            }
        }
    }
}

struct ApplyAcceleration {
    velocity: ComponentType<Velocity>,
    mass: ComponentType<Mass>,
    snapshot: Snapshot,
}

impl System for ApplyAcceleration {
    fn run(&self, world: &World, batch: Batch<'_>) {
        let previous = self.snapshot.read();

        for id_a in batch.entities().iter().cloned() {
            let (Position(x_a, y_a), Mass(m_a)) = match previous.binary_search_by_key(&id_a, |(id, _, _)| *id) {
                Ok(idx) => (previous[idx].1, previous[idx].2),
                Err(_) => continue,
            };

            if m_a <= 0.0 {
                continue;
            }

            let mut vx_a = 0f32;
            let mut vy_a = 0f32;
            let mut collided = false;

            for (id_b, Position(x_b, y_b), Mass(m_b)) in previous.iter().cloned() {
                if id_b == id_a || m_b < 0.00001 {
                    continue;
                }

                let dx = x_b - x_a;
                let dy = y_b - y_a;
                let r2 = dx * dx + dy * dy;

                // Bodies are overlapped!
                if r2 < 0.0005 {
                    collided = true;
                    continue;
                }

                let a = (G * m_b) / r2;
                let r = r2.sqrt();
                vx_a += TIME_STEP * ((dx * a) / r);
                vy_a += TIME_STEP * ((dy * a) / r);
            }

            world.set(id_a, self.velocity, Velocity(vx_a, vy_a));
            if collided {
                world.set(id_a, self.mass, Mass(0.0));
            }
        }
    }
}

struct ApplyVelocity {
    position: ComponentType<Position>,
    velocity: ComponentType<Velocity>,
}

impl System for ApplyVelocity {
    fn run(&self, world: &World, batch: Batch<'_>) {
        for id in batch.entities().iter().cloned() {
            let Velocity(vx, vy) = match world.component(id, self.velocity) {
                Some(v) => *v,
                None => continue,
            };

            if let Some(mut position) = world.component_mut(id, self.position) {
                position.0 += TIME_STEP * vx;
                position.1 += TIME_STEP * vy;
            }
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut world = World::with_config(WorldConfig::default().thread_name("bodies"));
    let position = world.register::<Position>()?;
    let velocity = world.register::<Velocity>()?;
    let mass = world.register::<Mass>()?;

    // Populate world!
    {
        const SQRT_NUM_ENTITIES: usize = 8;
        const SCALE: f32 = 2.0 / ((SQRT_NUM_ENTITIES - 1) as f32);

        for x in 0..SQRT_NUM_ENTITIES {
            for y in 0..SQRT_NUM_ENTITIES {
                let x = ((x as f32) * SCALE) - 1.0;
                let y = ((y as f32) * SCALE) - 1.0;

                let vx = y * 0.003;
                let vy = -x * 0.003;

                let id = world.create_entity(position | velocity | mass)?;
                world.set(id, mass, Mass(0.00001));
                world.set(id, position, Position(x, y));
                world.set(id, velocity, Velocity(vx, vy));
            }
        }
    }

    let snapshot = Snapshot::default();
    world.enable_system(
        TakeSnapshot { position, mass, snapshot: snapshot.clone() },
        Query::run_once(), 1, -1);
    world.enable_system(
        ApplyAcceleration { velocity, mass, snapshot },
        Query::all(position | velocity | mass), 8, 0);
    world.enable_system(
        ApplyVelocity { position, velocity },
        Query::all(position | velocity), 4, 1);
    world.apply_deferred();

    const SIZE: (i32, i32) = (500, 500);
    const OFFSET: (f32, f32) = (250.0, 250.0);
    const SCALE: (f32, f32) = (200.0, 200.0);
    const NUM_ITER: usize = 100;

    let mut dest = std::io::stdout();
    let mut last_positions: HashMap<EntityID, (f32, f32)> = HashMap::new();

    write!(&mut dest, "<?xml version=\"1.0\" standalone=\"no\"?>\n")?;
    write!(&mut dest, "<!DOCTYPE svg PUBLIC \"-//W3C//DTD SVG 1.0//EN\" \"http://www.w3.org/TR/2001/REC-SVG-20010904/DTD/svg10.dtd\">\n")?;
    write!(&mut dest, "<svg xmlns=\"http://www.w3.org/2000/svg\" height=\"{}\" width=\"{}\">", SIZE.0, SIZE.1)?;
    write!(&mut dest, "<rect width=\"100%\" height=\"100%\" fill=\"black\"/>")?;

    for _ in 0..NUM_ITER {
        for _ in 0..10usize {
            world.run_frame(TIME_STEP);
        }

        // Render result!
        for id in world.entities() {
            let (Position(x, y), Velocity(vx, vy)) = match (world.component(id, position), world.component(id, velocity)) {
                (Some(p), Some(v)) => (*p, *v),
                _ => continue,
            };
            let v2 = (vx * vx + vy * vy).sqrt();
            let a = 1.0 - (v2 / 0.03).max(0.0).min(0.7);

            if let Some((lx, ly)) = last_positions.get(&id) {
                let x1 = lx * SCALE.0 + OFFSET.0;
                let y1 = ly * SCALE.1 + OFFSET.1;
                let x2 = x * SCALE.0 + OFFSET.0;
                let y2 = y * SCALE.1 + OFFSET.1;

                write!(&mut dest,
                       "<line x1=\"{}\" y1=\"{}\" x2=\"{}\" y2=\"{}\" style=\"stroke:rgba(255,0,0,{});stroke-width:1\" />",
                       x1, y1, x2, y2, a)?;
            }

            last_positions.insert(id, (x, y));
        }
    }

    write!(&mut dest, "</svg>")?;
    Ok(())
}
