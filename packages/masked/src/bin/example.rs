use masked::{ComponentMask, Query, World};
use masked::system::from_fn;

#[derive(Debug, Clone, Copy, Default)]
pub struct MyComponent(i32);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut world = World::new();
    let my_component = world.register::<MyComponent>()?;

    let entity = world.create_entity(ComponentMask::EMPTY)?;
    world.insert(entity, my_component, MyComponent(3));

    world.enable_system(from_fn(move |world, batch| {
        for entity in batch.entities() {
            if let Some(mut c) = world.component_mut(*entity, my_component) {
                c.0 += 1;
            }
        }
    }), Query::all(my_component), 1, 0);
    world.apply_deferred();
    world.run_frame(1.0);

    println!("world: {:?}", world);
    println!("entity: {:?}", entity);

    let mask = world.mask(entity).unwrap_or_default();
    for index in mask {
        println!("component: {:?}", world.registration(index));
    }
    println!("value: {:?}", world.component(entity, my_component).as_deref());

    Ok(())
}
