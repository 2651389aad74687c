//! Economy system - workers harvest minerals and carry them home.

use crate::components::*;
use crate::config::SimConfig;
use crate::error::OrderError;
use crate::spatial::SpatialGrid;
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Manhattan distance at which a worker can mine or unload.
pub const REACH: i32 = 1;

/// Minerals banked per faction.
#[derive(Resource, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Treasury {
    minerals: [i32; 3],
}

impl Treasury {
    pub fn new(starting: i32) -> Self {
        Self {
            minerals: [starting; 3],
        }
    }

    pub fn minerals(&self, faction: Faction) -> i32 {
        self.minerals[faction.index()]
    }

    pub fn deposit(&mut self, faction: Faction, amount: i32) {
        self.minerals[faction.index()] += amount;
    }

    /// Deduct `cost`, or leave the balance alone if it cannot be afforded.
    pub fn spend(&mut self, faction: Faction, cost: i32) -> Result<(), OrderError> {
        let available = self.minerals[faction.index()];
        if available < cost {
            return Err(OrderError::InsufficientMinerals { available, cost });
        }
        self.minerals[faction.index()] = available - cost;
        Ok(())
    }
}

impl Default for Treasury {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Harvest from target resources and deposit full loads at the home base.
///
/// Workers are processed in id order so two workers draining the same field
/// resolve identically on every run.
pub fn gather_system(
    config: Res<SimConfig>,
    grid: Res<SpatialGrid>,
    mut treasury: ResMut<Treasury>,
    mut units: Query<(Entity, &SimId, &Position, &Faction, &mut Kind)>,
    mut healths: Query<&mut Health>,
) {
    let capacity = config.worker_capacity;

    let mut workers: Vec<(SimId, Entity, Tile, Faction, Worker)> = units
        .iter()
        .filter_map(|(entity, id, position, faction, kind)| {
            kind.worker()
                .map(|worker| (*id, entity, position.tile, *faction, *worker))
        })
        .collect();
    workers.sort_by_key(|w| w.0);

    for (id, entity, tile, faction, mut worker) in workers {
        if worker.target_resource.is_none() && !worker.is_full(capacity) {
            worker.target_resource = grid
                .query_range(tile, REACH)
                .into_iter()
                .find(|e| e.kind == KindTag::Resource)
                .map(|e| e.entity);
        }

        if let Some(target) = worker.target_resource {
            let in_reach = units
                .get(target)
                .map(|(_, _, position, _, kind)| {
                    kind.is_resource() && position.tile.manhattan(tile) <= REACH
                })
                .unwrap_or(false);
            if in_reach && !worker.is_full(capacity) {
                if let Ok(mut health) = healths.get_mut(target) {
                    let amount = config
                        .harvest_per_tick
                        .min(capacity - worker.carried_amount)
                        .min(health.value.max(0));
                    if amount > 0 {
                        health.damage(amount);
                        worker.carried_amount += amount;
                        worker.is_carrying = true;
                    }
                }
            }
        }

        if worker.is_carrying && (worker.is_full(capacity) || worker.target_resource.is_none()) {
            let home_in_reach = worker
                .home_base
                .and_then(|base| units.get(base).ok())
                .map(|(_, _, position, _, _)| position.tile.manhattan(tile) <= REACH)
                .unwrap_or(false);
            if home_in_reach {
                let amount = worker.unload();
                treasury.deposit(faction, amount);
                worker.target_resource = None;
                debug!(worker = %id, ?faction, amount, total = treasury.minerals(faction), "cargo deposited");
            }
        }

        if let Ok((_, _, _, _, mut kind)) = units.get_mut(entity) {
            if let Some(slot) = kind.worker_mut() {
                if *slot != worker {
                    *slot = worker;
                }
            }
        }
    }
}
