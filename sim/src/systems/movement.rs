//! Movement system - walks units along their paths one tile at a time.

use crate::components::*;
use crate::config::SimConfig;
use bevy_ecs::prelude::*;

/// Simulation time, advanced once per tick before the schedule runs.
#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct SimClock {
    pub tick: u64,
    /// Seconds of simulated time since start.
    pub time: f32,
    /// Length of the current tick in seconds.
    pub dt: f32,
}

impl SimClock {
    pub fn advance(&mut self, dt: f32) {
        self.tick += 1;
        self.dt = dt;
        self.time += dt;
    }
}

/// Interpolate the render position toward the next waypoint.
///
/// A unit needs `move_window_secs` to cross one tile. Once the window has
/// elapsed the logical tile snaps to the waypoint and the path advances.
pub fn movement_system(
    clock: Res<SimClock>,
    config: Res<SimConfig>,
    mut query: Query<(&mut Position, &mut Movement)>,
) {
    let window = config.move_window_secs;
    for (mut position, mut movement) in query.iter_mut() {
        let Some(next) = movement.next_waypoint() else {
            position.last_update = clock.time;
            continue;
        };

        let elapsed = clock.time - position.last_update;
        let t = (elapsed / window).clamp(0.0, 1.0);
        if t >= 1.0 {
            position.snap_to(next, clock.time);
            movement.advance();
        } else {
            let from = position.tile;
            position.render_x = from.x as f32 + (next.x - from.x) as f32 * t;
            position.render_y = from.y as f32 + (next.y - from.y) as f32 * t;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_ticks(world: &mut World, ticks: usize, dt: f32) {
        let mut schedule = Schedule::default();
        schedule.add_systems(movement_system);
        for _ in 0..ticks {
            world.resource_mut::<SimClock>().advance(dt);
            schedule.run(world);
        }
    }

    #[test]
    fn test_unit_walks_its_path() {
        let mut world = World::new();
        world.insert_resource(SimClock::default());
        world.insert_resource(SimConfig {
            move_window_secs: 0.25,
            ..Default::default()
        });

        let mut movement = Movement::default();
        movement.assign(vec![Tile::new(1, 0), Tile::new(2, 1)]);
        let unit = world.spawn((Position::at(Tile::new(0, 0)), movement)).id();

        run_ticks(&mut world, 1, 0.125);
        let position = world.get::<Position>(unit).unwrap();
        assert_eq!(position.tile, Tile::new(0, 0));
        assert!((position.render_x - 0.5).abs() < 1e-4);

        run_ticks(&mut world, 1, 0.125);
        assert_eq!(world.get::<Position>(unit).unwrap().tile, Tile::new(1, 0));

        run_ticks(&mut world, 2, 0.125);
        let position = world.get::<Position>(unit).unwrap();
        assert_eq!(position.tile, Tile::new(2, 1));
        assert_eq!((position.render_x, position.render_y), (2.0, 1.0));
        assert!(world.get::<Movement>(unit).unwrap().is_idle());
    }

    #[test]
    fn test_idle_unit_stays_put() {
        let mut world = World::new();
        world.insert_resource(SimClock::default());
        world.insert_resource(SimConfig::default());
        let unit = world.spawn((Position::at(Tile::new(4, 4)), Movement::default())).id();

        run_ticks(&mut world, 5, 0.125);
        let position = world.get::<Position>(unit).unwrap();
        assert_eq!(position.tile, Tile::new(4, 4));
        assert!((position.last_update - 0.625).abs() < 1e-4);
    }
}
