//! Example demonstrating the scene graph: a small orbiting system
//!
//! Usage: `scenegraph [config.ron]`

use scenegraph::prelude::*;

/// Spins its entity about the Y axis
struct Spin {
    radians_per_second: f32,
}

impl Component for Spin {
    fn on_update(&mut self, world: &mut World, ctx: ComponentContext, dt: f32) {
        let transform = world.transform_id(ctx.entity);
        world
            .transforms_mut()
            .rotate_y_by(transform, self.radians_per_second * dt);
    }
}

/// Logs when its entity enters or leaves the scene
struct Announcer;

impl Component for Announcer {
    fn on_added_to_scene(&mut self, world: &mut World, ctx: ComponentContext) {
        log::info!("{} entered the scene", world.name(ctx.entity).unwrap_or("<unnamed>"));
    }

    fn on_removed_from_scene(&mut self, world: &mut World, ctx: ComponentContext) {
        log::info!("{} left the scene", world.name(ctx.entity).unwrap_or("<unnamed>"));
    }
}

fn load_config() -> WorldConfig {
    let Some(path) = std::env::args().nth(1) else {
        return WorldConfig::default();
    };
    match WorldConfig::load_ron(&path) {
        Ok(config) => {
            log::info!("Loaded config from {path}");
            config
        }
        Err(e) => {
            log::warn!("Falling back to default config: {e}");
            WorldConfig::default()
        }
    }
}

fn main() {
    env_logger::init();

    let mut world = World::with_config(load_config());
    let scene = world.create_scene("solar system");

    let sun = world.create_named_entity("sun");
    let earth = world.create_named_entity("earth");
    let moon = world.create_named_entity("moon");
    world.add_child(sun, earth);
    world.add_child(earth, moon);

    let earth_transform = world.transform_id(earth);
    let moon_transform = world.transform_id(moon);
    world
        .transforms_mut()
        .set_position(earth_transform, Vec3::new(10.0, 0.0, 0.0));
    world
        .transforms_mut()
        .set_position(moon_transform, Vec3::new(2.0, 0.0, 0.0));
    world.transforms_mut().set_opacity(moon_transform, 0.8);

    world.attach(sun, Spin {
        radians_per_second: 0.5,
    });
    world.attach(earth, Spin {
        radians_per_second: 2.0,
    });
    for body in [sun, earth, moon] {
        world.attach(body, Announcer);
    }

    let redraws = std::rc::Rc::new(std::cell::Cell::new(0_u32));
    let counter = std::rc::Rc::clone(&redraws);
    world
        .transforms_mut()
        .changed_event_mut(earth_transform)
        .connect(move |_| counter.set(counter.get() + 1));

    world.add_to_scene(scene, sun);

    let dt = 1.0 / 60.0;
    for frame in 0..120 {
        world.update_scene(scene, dt);
        if frame % 30 == 0 {
            log::info!(
                "frame {frame}: moon at {:?}",
                world.transforms().world_position(moon_transform)
            );
        }
    }

    println!(
        "moon world position: {:?}, opacity {:.2}",
        world.transforms().world_position(moon_transform),
        world.transforms().world_opacity(moon_transform)
    );
    println!("earth transform invalidated {} times", redraws.get());
    println!("{}", world.stats().format_stats());

    match world.to_json(sun) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Snapshot error: {e}"),
    }

    world.remove_from_scene(sun);
}
