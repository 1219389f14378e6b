use masked::{Query, World};
use masked::system::from_fn;

#[derive(Debug, Clone, Copy, Default)]
pub struct MyComponent(i32);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut world = World::new();
    let my_component = world.register::<MyComponent>()?;

    world.enable_system(from_fn(move |world, batch| {
        for entity in batch.entities() {
            if entity.id() % 12 == 11 {
                world.destroy_entity(*entity);
            }
        }
    }), Query::all(my_component), 8, 0);
    world.apply_deferred();

    for _ in 0..8 {
        for _ in 0..512 {
            let entity = world.create_entity(my_component)?;
            world.set(entity, my_component, MyComponent(32));
        }

        world.run_frame(1.0);
    }

    println!("world: {:?}", world);
    Ok(())
}
