//! Lifecycle systems - remove the dead and forget about them.

use crate::components::*;
use crate::store::EntityIndex;
use bevy_ecs::prelude::*;
use tracing::debug;

/// Despawn every entity whose health reached zero and retire its id.
pub fn purge_system(
    mut commands: Commands,
    mut index: ResMut<EntityIndex>,
    query: Query<(Entity, &SimId, &Health, &Kind)>,
) {
    for (entity, id, health, kind) in query.iter() {
        if health.is_alive() {
            continue;
        }
        debug!(id = %id, kind = ?kind.tag(), "entity destroyed");
        index.remove(*id);
        commands.entity(entity).despawn();
    }
}

/// Clear handles that point at despawned entities.
///
/// Runs after the purge has been applied, so a handle either resolves to a
/// live entity or is dropped here.
pub fn stale_reference_system(
    mut commands: Commands,
    alive: Query<(), With<SimId>>,
    mut kinds: Query<&mut Kind>,
    orders: Query<(Entity, &AttackOrder)>,
) {
    for mut kind in kinds.iter_mut() {
        let stale = kind.worker().is_some_and(|worker| {
            worker.target_resource.is_some_and(|e| !alive.contains(e))
                || worker.home_base.is_some_and(|e| !alive.contains(e))
        });
        if !stale {
            continue;
        }
        if let Some(worker) = kind.worker_mut() {
            if worker.target_resource.is_some_and(|e| !alive.contains(e)) {
                worker.target_resource = None;
            }
            if worker.home_base.is_some_and(|e| !alive.contains(e)) {
                worker.home_base = None;
            }
        }
    }

    for (entity, order) in orders.iter() {
        if !alive.contains(order.target) {
            commands.entity(entity).remove::<AttackOrder>();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EntityStore;

    fn schedule() -> Schedule {
        let mut schedule = Schedule::default();
        schedule.add_systems((purge_system, stale_reference_system).chain());
        schedule
    }

    #[test]
    fn test_dead_entities_are_purged_and_ids_retired() {
        let mut store = EntityStore::new();
        let alive = store.create(Blueprint::combat_unit(Faction::Terran, Tile::new(0, 0)));
        let dead = store.create(Blueprint::combat_unit(Faction::Zerg, Tile::new(1, 0)).with_health(0));

        schedule().run(store.world_mut());
        assert!(store.contains(alive));
        assert!(!store.contains(dead));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_handles_to_purged_entities_are_cleared() {
        let mut store = EntityStore::new();
        let field = store.create(Blueprint::resource(Tile::new(2, 2), 0));
        let base = store.create(Blueprint::building(Faction::Terran, Tile::new(0, 0), &[], 200));
        let worker = store.create(Blueprint::worker(Faction::Terran, Tile::new(1, 1), store.entity(base)));
        let raider = store.create(Blueprint::combat_unit(Faction::Zerg, Tile::new(3, 3)));

        let field_entity = store.entity(field).unwrap();
        let worker_entity = store.entity(worker).unwrap();
        let raider_entity = store.entity(raider).unwrap();
        if let Some(state) = store.world_mut().get_mut::<Kind>(worker_entity).unwrap().worker_mut() {
            state.target_resource = Some(field_entity);
        }
        store
            .world_mut()
            .entity_mut(raider_entity)
            .insert(AttackOrder { target: field_entity });

        schedule().run(store.world_mut());

        let state = *store.view(worker).unwrap().kind.worker().unwrap();
        assert_eq!(state.target_resource, None);
        assert_eq!(state.home_base, store.entity(base));
        assert!(store.world().get::<AttackOrder>(raider_entity).is_none());
    }
}
