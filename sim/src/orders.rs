//! Orders: the only way commands and the AI change what units are doing.
//!
//! Every failure is an [`OrderError`] and leaves the world unchanged; callers
//! log it and move on.

use bevy_ecs::prelude::*;
use tracing::debug;

use crate::components::*;
use crate::config::SimConfig;
use crate::error::OrderError;
use crate::net::protocol::{CommandKind, CommandRecord};
use crate::pathfinding::{find_path, Obstacles};
use crate::store::EntityStore;
use crate::systems::economy::{Treasury, REACH};
use crate::systems::movement::SimClock;

/// Applies orders against one store, reusing one obstacle map for the batch.
///
/// Buildings are the only obstacles and orders never create buildings, so the
/// map stays valid for every order in the batch.
pub struct Orders<'s> {
    store: &'s mut EntityStore,
    obstacles: Obstacles,
}

impl<'s> Orders<'s> {
    pub fn new(store: &'s mut EntityStore) -> Self {
        let (width, height) = {
            let config = store.world().resource::<SimConfig>();
            (config.map_width, config.map_height)
        };
        let obstacles = Obstacles::from_world(store.world_mut(), width, height);
        Self { store, obstacles }
    }

    pub fn store(&self) -> &EntityStore {
        self.store
    }

    pub fn obstacles(&self) -> &Obstacles {
        &self.obstacles
    }

    /// Apply a wire command.
    pub fn apply(&mut self, command: &CommandRecord) -> Result<(), OrderError> {
        match command.kind {
            CommandKind::Move => self.move_to(command.entity, command.target),
            CommandKind::Produce => self.produce(command.entity, command.target).map(|_| ()),
            CommandKind::Attack => self.attack(command.entity, command.target),
        }
    }

    fn resolve(&self, id: SimId) -> Result<Entity, OrderError> {
        self.store.entity(id).ok_or(OrderError::UnknownEntity(id))
    }

    fn tile_of(&self, entity: Entity) -> Option<Tile> {
        self.store.world().get::<Position>(entity).map(|p| p.tile)
    }

    fn now(&self) -> f32 {
        self.store.world().resource::<SimClock>().time
    }

    /// Pathfind to `goal` and hand the path to the unit.
    fn walk(&mut self, id: SimId, entity: Entity, goal: Tile) -> Result<(), OrderError> {
        if !self.obstacles.in_bounds(goal) {
            return Err(OrderError::OutOfBounds(goal));
        }
        if self.store.world().get::<Movement>(entity).is_none() {
            return Err(OrderError::NotMobile(id));
        }
        let from = self.tile_of(entity).ok_or(OrderError::UnknownEntity(id))?;
        let path = find_path(from, goal, &self.obstacles).ok_or(OrderError::NoPath { from, to: goal })?;

        let now = self.now();
        let world = self.store.world_mut();
        if let Some(mut movement) = world.get_mut::<Movement>(entity) {
            movement.assign(path);
        }
        if let Some(mut position) = world.get_mut::<Position>(entity) {
            position.last_update = now;
        }
        Ok(())
    }

    /// Move a unit. A worker sent onto a mineral field starts mining it.
    pub fn move_to(&mut self, id: SimId, goal: Tile) -> Result<(), OrderError> {
        let entity = self.resolve(id)?;
        self.walk(id, entity, goal)?;

        let field = self
            .store
            .at_tile(goal)
            .into_iter()
            .filter_map(|other| self.store.entity(other))
            .find(|e| self.store.world().get::<Kind>(*e).is_some_and(Kind::is_resource));

        let mut unit = self.store.world_mut().entity_mut(entity);
        unit.remove::<AttackOrder>();
        if let (Some(field), Some(mut kind)) = (field, unit.get_mut::<Kind>()) {
            if let Some(worker) = kind.worker_mut() {
                worker.target_resource = Some(field);
            }
        }
        Ok(())
    }

    /// Build the first unit kind a building can make, next to it.
    ///
    /// A target other than the spawn tile acts as a rally point.
    pub fn produce(&mut self, id: SimId, rally: Tile) -> Result<SimId, OrderError> {
        let entity = self.resolve(id)?;
        let (kind, faction, tile) = {
            let view = self.store.view(id).ok_or(OrderError::UnknownEntity(id))?;
            let kind = view
                .kind
                .building()
                .and_then(|b| b.producible.iter().next().copied())
                .filter(|tag| tag.is_mobile())
                .ok_or(OrderError::CannotProduce(id))?;
            (kind, view.faction, view.position.tile)
        };
        let spawn = self.free_tile_near(tile).ok_or(OrderError::NoFreeTile(id))?;

        let cost = self.store.world().resource::<SimConfig>().production_cost;
        self.store
            .world_mut()
            .resource_mut::<Treasury>()
            .spend(faction, cost)?;

        let blueprint = match kind {
            KindTag::Worker => Blueprint::worker(faction, spawn, Some(entity)),
            KindTag::ArmedWorker => Blueprint::armed_worker(faction, spawn, Some(entity)),
            _ => Blueprint::combat_unit(faction, spawn),
        };
        let unit = self.store.create(blueprint);
        debug!(building = %id, unit = %unit, ?kind, %spawn, "unit produced");

        if rally != spawn {
            if let Err(e) = self.move_to(unit, rally) {
                debug!(unit = %unit, error = %e, "rally point ignored");
            }
        }
        Ok(unit)
    }

    /// `(x+1, y)` if free, otherwise the first free 8-neighbour.
    fn free_tile_near(&self, tile: Tile) -> Option<Tile> {
        let preferred = Tile::new(tile.x + 1, tile.y);
        let ring = (-1..=1)
            .flat_map(|dx| (-1..=1).map(move |dy| Tile::new(tile.x + dx, tile.y + dy)))
            .filter(|t| *t != tile);
        std::iter::once(preferred)
            .chain(ring)
            .find(|t| self.obstacles.is_walkable(*t) && self.store.at_tile(*t).is_empty())
    }

    /// Attack the first enemy standing on `tile`.
    pub fn attack(&mut self, id: SimId, tile: Tile) -> Result<(), OrderError> {
        let faction = self.store.view(id).ok_or(OrderError::UnknownEntity(id))?.faction;
        let target = self
            .store
            .at_tile(tile)
            .into_iter()
            .find(|other| {
                self.store
                    .view(*other)
                    .is_some_and(|v| v.faction != faction && !v.kind.is_resource())
            })
            .ok_or(OrderError::NoTarget(tile))?;
        self.attack_entity(id, target)
    }

    /// Attack a specific entity, walking toward it if out of range.
    pub fn attack_entity(&mut self, id: SimId, target: SimId) -> Result<(), OrderError> {
        let entity = self.resolve(id)?;
        let target_entity = self.resolve(target)?;
        let (stats, from) = {
            let view = self.store.view(id).ok_or(OrderError::UnknownEntity(id))?;
            (view.kind.combat().ok_or(OrderError::NotArmed(id))?, view.position.tile)
        };
        let goal = self.tile_of(target_entity).ok_or(OrderError::UnknownEntity(target))?;

        self.store
            .world_mut()
            .entity_mut(entity)
            .insert(AttackOrder { target: target_entity });

        if from.manhattan(goal) > stats.range {
            let approach = if self.obstacles.is_walkable(goal) {
                Some(goal)
            } else {
                self.nearest_walkable_around(goal, from, stats.range)
            };
            let result = approach
                .ok_or(OrderError::NoFreeTile(target))
                .and_then(|tile| self.walk(id, entity, tile));
            if let Err(e) = result {
                debug!(attacker = %id, target = %target, error = %e, "cannot approach target");
            }
        }
        Ok(())
    }

    /// Send a worker to mine a field.
    pub fn gather(&mut self, id: SimId, resource: SimId) -> Result<(), OrderError> {
        let entity = self.resolve(id)?;
        let field = self.resolve(resource)?;
        let field_tile = match self.store.view(resource) {
            Some(view) if view.kind.is_resource() => view.position.tile,
            _ => return Err(OrderError::NoTarget(self.tile_of(field).unwrap_or_default())),
        };
        let from = {
            let view = self.store.view(id).ok_or(OrderError::UnknownEntity(id))?;
            if view.kind.worker().is_none() {
                return Err(OrderError::NotAWorker(id));
            }
            view.position.tile
        };

        if from.manhattan(field_tile) > REACH {
            self.walk(id, entity, field_tile)?;
        }
        if let Some(mut kind) = self.store.world_mut().get_mut::<Kind>(entity) {
            if let Some(worker) = kind.worker_mut() {
                worker.target_resource = Some(field);
            }
        }
        Ok(())
    }

    /// Walk a loaded worker back next to its home base.
    pub fn return_cargo(&mut self, id: SimId) -> Result<(), OrderError> {
        let entity = self.resolve(id)?;
        let (home, from) = {
            let view = self.store.view(id).ok_or(OrderError::UnknownEntity(id))?;
            let worker = view.kind.worker().ok_or(OrderError::NotAWorker(id))?;
            (worker.home_base, view.position.tile)
        };
        let base_tile = home
            .and_then(|base| self.tile_of(base))
            .ok_or(OrderError::NoFreeTile(id))?;
        if from.manhattan(base_tile) <= REACH {
            return Ok(());
        }
        let goal = self
            .nearest_walkable_around(base_tile, from, REACH)
            .ok_or(OrderError::NoFreeTile(id))?;
        self.walk(id, entity, goal)
    }

    /// Walkable tile within Manhattan `range` of `center`, closest to `from`.
    fn nearest_walkable_around(&self, center: Tile, from: Tile, range: i32) -> Option<Tile> {
        let range = range.max(1);
        let mut best: Option<Tile> = None;
        for dx in -range..=range {
            for dy in -range..=range {
                let tile = Tile::new(center.x + dx, center.y + dy);
                if tile == center || tile.manhattan(center) > range || !self.obstacles.is_walkable(tile) {
                    continue;
                }
                if best.map_or(true, |b| tile.manhattan(from) < b.manhattan(from)) {
                    best = Some(tile);
                }
            }
        }
        best
    }
}
