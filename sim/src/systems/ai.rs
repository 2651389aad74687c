//! AI decision loop for computer-controlled factions.
//!
//! The controller snapshots the world into a read-only [`WorldView`], asks a
//! [`Policy`] for one [`Action`] per controlled unit in id order, and only
//! then applies the actions through [`Orders`], the same path player commands
//! take. Policies therefore never see a half-updated world.

use crate::components::*;
use crate::config::{AiConfig, SimConfig};
use crate::orders::Orders;
use crate::spatial::SpatialGrid;
use crate::store::EntityStore;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, trace};

/// What a policy wants one unit to do this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Idle,
    Gather { resource: SimId },
    ReturnCargo,
    MoveTo(Tile),
    Attack { target: SimId },
}

/// Read-only facts about one entity.
#[derive(Debug, Clone, Copy)]
pub struct UnitView {
    pub id: SimId,
    pub tile: Tile,
    pub faction: Faction,
    pub kind: KindTag,
    pub health: i32,
    pub worker: Option<Worker>,
    pub combat: Option<CombatStats>,
    /// No path to follow.
    pub idle: bool,
    /// Holds a standing attack order.
    pub attacking: bool,
}

/// Everything a policy may look at.
pub struct WorldView<'a> {
    units: Vec<UnitView>,
    grid: &'a SpatialGrid,
    /// Cargo at which a worker counts as full.
    pub worker_capacity: i32,
}

impl<'a> WorldView<'a> {
    pub fn new(store: &'a EntityStore) -> Option<Self> {
        let world = store.world();
        let grid = world.get_resource::<SpatialGrid>()?;
        let worker_capacity = world
            .get_resource::<SimConfig>()
            .map_or(SimConfig::default().worker_capacity, |c| c.worker_capacity);

        let mut units = Vec::with_capacity(store.len());
        store.for_each(|id, view| {
            units.push(UnitView {
                id,
                tile: view.position.tile,
                faction: view.faction,
                kind: view.kind.tag(),
                health: view.health.value,
                worker: view.kind.worker().copied(),
                combat: view.kind.combat(),
                idle: view.movement.map_or(true, Movement::is_idle),
                attacking: world.get::<AttackOrder>(view.entity).is_some(),
            });
        });
        Some(Self {
            units,
            grid,
            worker_capacity,
        })
    }

    /// All entities, in id order.
    pub fn units(&self) -> &[UnitView] {
        &self.units
    }

    pub fn unit(&self, id: SimId) -> Option<&UnitView> {
        self.units
            .binary_search_by_key(&id, |u| u.id)
            .ok()
            .map(|i| &self.units[i])
    }

    pub fn grid(&self) -> &SpatialGrid {
        self.grid
    }

    /// Closest mineral field by Manhattan distance, lowest id on ties.
    pub fn nearest_resource(&self, from: Tile) -> Option<SimId> {
        self.units
            .iter()
            .filter(|u| u.kind == KindTag::Resource && u.health > 0)
            .min_by_key(|u| (u.tile.manhattan(from), u.id))
            .map(|u| u.id)
    }

    /// Closest enemy non-resource within `range` of `unit`.
    pub fn nearest_enemy_in_range(&self, unit: &UnitView, range: i32) -> Option<SimId> {
        self.grid
            .query_range(unit.tile, range)
            .into_iter()
            .filter(|e| e.faction != unit.faction && e.kind != KindTag::Resource)
            .find(|e| self.unit(e.id).is_some_and(|u| u.health > 0))
            .map(|e| e.id)
    }
}

/// Decision-making strategy for AI units.
pub trait Policy {
    fn decide(&mut self, unit: SimId, view: &WorldView) -> Action;
}

/// Randomised gather-and-skirmish behaviour.
///
/// - Idle, empty workers go mining with probability `gather_chance`.
/// - Loaded workers with nothing left to mine head home.
/// - Armed units without orders attack an enemy in range with
///   probability `attack_chance`.
pub struct ScriptedPolicy {
    rng: ChaCha8Rng,
    gather_chance: f64,
    attack_chance: f64,
}

impl ScriptedPolicy {
    pub fn new(seed: u64, config: &AiConfig) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            gather_chance: config.gather_chance,
            attack_chance: config.attack_chance,
        }
    }
}

impl Policy for ScriptedPolicy {
    fn decide(&mut self, unit: SimId, view: &WorldView) -> Action {
        let Some(me) = view.unit(unit) else {
            return Action::Idle;
        };
        if !me.idle {
            return Action::Idle;
        }

        if let Some(worker) = me.worker {
            let full = worker.is_full(view.worker_capacity);
            if worker.is_carrying && (full || worker.target_resource.is_none()) {
                return Action::ReturnCargo;
            }
            if !worker.is_carrying
                && worker.target_resource.is_none()
                && self.rng.gen_bool(self.gather_chance)
            {
                if let Some(resource) = view.nearest_resource(me.tile) {
                    return Action::Gather { resource };
                }
            }
        }

        if let Some(stats) = me.combat {
            if !me.attacking && self.rng.gen_bool(self.attack_chance) {
                if let Some(target) = view.nearest_enemy_in_range(me, stats.range) {
                    return Action::Attack { target };
                }
            }
        }

        Action::Idle
    }
}

/// Drives every mobile unit of its factions through a policy.
pub struct AiController {
    policy: Box<dyn Policy + Send>,
    factions: Vec<Faction>,
}

impl AiController {
    pub fn new(policy: Box<dyn Policy + Send>, factions: Vec<Faction>) -> Self {
        Self { policy, factions }
    }

    /// Scripted policy for the factions named in the config.
    pub fn scripted(config: &SimConfig) -> Self {
        Self::new(
            Box::new(ScriptedPolicy::new(config.seed, &config.ai)),
            config.ai.factions.clone(),
        )
    }

    pub fn factions(&self) -> &[Faction] {
        &self.factions
    }

    /// Decide for every controlled unit, then apply. Returns actions applied.
    pub fn run(&mut self, store: &mut EntityStore) -> usize {
        let decisions: Vec<(SimId, Action)> = {
            let Some(view) = WorldView::new(store) else {
                return 0;
            };
            let controlled: Vec<SimId> = view
                .units()
                .iter()
                .filter(|u| u.kind.is_mobile() && self.factions.contains(&u.faction))
                .map(|u| u.id)
                .collect();
            controlled
                .into_iter()
                .map(|id| (id, self.policy.decide(id, &view)))
                .filter(|(_, action)| *action != Action::Idle)
                .collect()
        };
        if decisions.is_empty() {
            return 0;
        }

        let mut orders = Orders::new(store);
        let mut applied = 0;
        for (id, action) in decisions {
            trace!(unit = %id, ?action, "ai decision");
            let result = match action {
                Action::Idle => Ok(()),
                Action::Gather { resource } => orders.gather(id, resource),
                Action::ReturnCargo => orders.return_cargo(id),
                Action::MoveTo(tile) => orders.move_to(id, tile),
                Action::Attack { target } => orders.attack_entity(id, target),
            };
            match result {
                Ok(()) => applied += 1,
                Err(e) => debug!(unit = %id, ?action, error = %e, "ai action skipped"),
            }
        }
        applied
    }
}
