//! Combat system - resolves standing attack orders.
//!
//! Two phases, like every tick-based damage model here:
//!
//! 1. **Gather** - walk attackers in id order, validate each order and
//!    collect a hit for every target in Manhattan range.
//! 2. **Apply** - add up the hits and subtract them from health.
//!
//! Damage is applied after all attackers have been evaluated, so two units
//! that kill each other on the same tick both land their hit.
//!
//! An attacker that has stopped walking while its target is out of range
//! loses the order, which frees it to pick a new target.

use crate::components::*;
use bevy_ecs::prelude::*;
use std::collections::BTreeMap;
use tracing::debug;

/// Why an attack order stopped being valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dropped {
    TargetGone,
    Friendly,
    Resource,
    Unarmed,
    OutOfReach,
}

pub fn combat_system(
    mut commands: Commands,
    mut attackers: Query<(Entity, &SimId, &Position, &Faction, &Kind, &AttackOrder, Option<&mut Movement>)>,
    targets: Query<(&Position, &Faction, &Kind)>,
    mut healths: Query<&mut Health>,
) {
    let mut order: Vec<(SimId, Entity)> = attackers.iter().map(|(e, id, ..)| (*id, e)).collect();
    order.sort();

    // Gather
    let mut hits: BTreeMap<Entity, i32> = BTreeMap::new();
    for (attacker_id, attacker) in order {
        let Ok((_, _, position, faction, kind, attack, movement)) = attackers.get_mut(attacker) else {
            continue;
        };

        let verdict = match (kind.combat(), targets.get(attack.target)) {
            (None, _) => Err(Dropped::Unarmed),
            (_, Err(_)) => Err(Dropped::TargetGone),
            (Some(_), Ok((_, target_faction, _))) if target_faction == faction => Err(Dropped::Friendly),
            (Some(_), Ok((_, _, target_kind))) if target_kind.is_resource() => Err(Dropped::Resource),
            (Some(stats), Ok((target_position, _, _))) => Ok((stats, target_position.tile)),
        };

        match verdict {
            Err(reason) => {
                debug!(attacker = %attacker_id, ?reason, "attack order dropped");
                commands.entity(attacker).remove::<AttackOrder>();
            }
            Ok((stats, target_tile)) => {
                if position.tile.manhattan(target_tile) <= stats.range {
                    *hits.entry(attack.target).or_insert(0) += stats.damage;
                    // Stand and fight once in range.
                    if let Some(mut movement) = movement {
                        if !movement.is_idle() {
                            movement.clear();
                        }
                    }
                } else if movement.map_or(true, |m| m.is_idle()) {
                    debug!(attacker = %attacker_id, reason = ?Dropped::OutOfReach, "attack order dropped");
                    commands.entity(attacker).remove::<AttackOrder>();
                }
            }
        }
    }

    // Apply
    for (target, damage) in hits {
        if let Ok(mut health) = healths.get_mut(target) {
            health.damage(damage);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EntityStore;

    fn schedule() -> Schedule {
        let mut schedule = Schedule::default();
        schedule.add_systems(combat_system);
        schedule
    }

    fn order(store: &mut EntityStore, attacker: SimId, target: SimId) {
        let target = store.entity(target).unwrap();
        let attacker = store.entity(attacker).unwrap();
        store.world_mut().entity_mut(attacker).insert(AttackOrder { target });
    }

    #[test]
    fn test_hits_in_range_only() {
        let mut store = EntityStore::new();
        let marine = store.create(Blueprint::combat_unit(Faction::Terran, Tile::new(2, 2)));
        let near = store.create(Blueprint::combat_unit(Faction::Zerg, Tile::new(3, 2)));
        let far = store.create(Blueprint::combat_unit(Faction::Zerg, Tile::new(3, 3)));
        let mut schedule = schedule();

        order(&mut store, marine, far);
        schedule.run(store.world_mut());
        assert_eq!(store.view(far).unwrap().health.value, 40);

        order(&mut store, marine, near);
        schedule.run(store.world_mut());
        assert_eq!(store.view(near).unwrap().health.value, 34);
    }

    #[test]
    fn test_mutual_hits_land_same_tick() {
        let mut store = EntityStore::new();
        let a = store.create(Blueprint::combat_unit(Faction::Terran, Tile::new(0, 0)).with_health(6));
        let b = store.create(Blueprint::armed_worker(Faction::Zerg, Tile::new(1, 0), None).with_health(6));
        order(&mut store, a, b);
        order(&mut store, b, a);

        schedule().run(store.world_mut());
        assert_eq!(store.view(a).unwrap().health.value, 0);
        assert_eq!(store.view(b).unwrap().health.value, 0);
    }

    #[test]
    fn test_invalid_orders_are_removed() {
        let mut store = EntityStore::new();
        let marine = store.create(Blueprint::combat_unit(Faction::Terran, Tile::new(0, 0)));
        let friend = store.create(Blueprint::combat_unit(Faction::Terran, Tile::new(1, 0)));
        let field = store.create(Blueprint::resource(Tile::new(0, 1), 100));
        let mut schedule = schedule();

        for target in [friend, field] {
            order(&mut store, marine, target);
            schedule.run(store.world_mut());
            let entity = store.entity(marine).unwrap();
            assert!(store.world().get::<AttackOrder>(entity).is_none());
        }
        assert_eq!(store.view(friend).unwrap().health.value, 40);
        assert_eq!(store.view(field).unwrap().health.value, 100);
    }

    #[test]
    fn test_idle_attacker_forgets_target_out_of_range() {
        let mut store = EntityStore::new();
        let idle = store.create(Blueprint::combat_unit(Faction::Zerg, Tile::new(4, 4)));
        let chasing = store.create(Blueprint::combat_unit(Faction::Zerg, Tile::new(4, 8)));
        let runner = store.create(Blueprint::combat_unit(Faction::Terran, Tile::new(12, 12)));
        let chasing_entity = store.entity(chasing).unwrap();
        store
            .world_mut()
            .get_mut::<Movement>(chasing_entity)
            .unwrap()
            .assign(vec![Tile::new(5, 9), Tile::new(6, 10)]);
        order(&mut store, idle, runner);
        order(&mut store, chasing, runner);

        schedule().run(store.world_mut());
        let idle_entity = store.entity(idle).unwrap();
        assert!(store.world().get::<AttackOrder>(idle_entity).is_none());
        assert!(store.world().get::<AttackOrder>(chasing_entity).is_some());
        assert_eq!(store.view(runner).unwrap().health.value, 40);
    }

    #[test]
    fn test_attacker_stops_when_in_range() {
        let mut store = EntityStore::new();
        let marine = store.create(Blueprint::combat_unit(Faction::Protoss, Tile::new(4, 4)));
        let target = store.create(Blueprint::building(Faction::Zerg, Tile::new(5, 4), &[], 200));
        let entity = store.entity(marine).unwrap();
        store
            .world_mut()
            .get_mut::<Movement>(entity)
            .unwrap()
            .assign(vec![Tile::new(5, 5)]);
        order(&mut store, marine, target);

        schedule().run(store.world_mut());
        assert!(store.view(marine).unwrap().movement.unwrap().is_idle());
        assert_eq!(store.view(target).unwrap().health.value, 194);
    }
}
