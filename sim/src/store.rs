//! Entity storage.
//!
//! `EntityStore` owns the ECS `World` that holds every component, plus an
//! index from the wire-visible [`SimId`] to the ECS [`Entity`] handle.
//! Ids are handed out monotonically and never reused, so iterating the index
//! in ascending order visits entities in creation order.

use crate::components::*;
use crate::error::SimError;
use bevy_ecs::prelude::*;
use std::collections::BTreeMap;

/// Id index stored as a resource so systems can retire ids as they despawn.
#[derive(Resource, Debug, Default)]
pub struct EntityIndex {
    next: u32,
    by_id: BTreeMap<SimId, Entity>,
}

impl EntityIndex {
    pub fn get(&self, id: SimId) -> Option<Entity> {
        self.by_id.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Live ids in creation order.
    pub fn ids(&self) -> impl Iterator<Item = SimId> + '_ {
        self.by_id.keys().copied()
    }

    pub fn next_id(&self) -> SimId {
        SimId(self.next)
    }

    fn allocate(&mut self) -> SimId {
        let id = SimId(self.next);
        self.next += 1;
        id
    }

    /// Reserve an externally chosen id, keeping future ids above it.
    fn claim(&mut self, id: SimId) -> bool {
        if self.by_id.contains_key(&id) {
            return false;
        }
        self.next = self.next.max(id.0.saturating_add(1));
        true
    }

    fn insert(&mut self, id: SimId, entity: Entity) {
        self.by_id.insert(id, entity);
    }

    pub(crate) fn remove(&mut self, id: SimId) -> Option<Entity> {
        self.by_id.remove(&id)
    }
}

/// Owner of all simulated entities and their components.
pub struct EntityStore {
    world: World,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::from_world(World::new())
    }

    /// Wrap an existing world, installing the id index if it is missing.
    pub fn from_world(mut world: World) -> Self {
        if world.get_resource::<EntityIndex>().is_none() {
            world.insert_resource(EntityIndex::default());
        }
        Self { world }
    }

    /// Create an entity with a fresh id.
    pub fn create(&mut self, blueprint: Blueprint) -> SimId {
        let id = self.world.resource_mut::<EntityIndex>().allocate();
        self.spawn(id, blueprint);
        id
    }

    /// Create an entity under an id chosen elsewhere (a replication mirror).
    pub fn create_with_id(&mut self, id: SimId, blueprint: Blueprint) -> Result<Entity, SimError> {
        if !self.world.resource_mut::<EntityIndex>().claim(id) {
            return Err(SimError::DuplicateId(id));
        }
        Ok(self.spawn(id, blueprint))
    }

    fn spawn(&mut self, id: SimId, blueprint: Blueprint) -> Entity {
        let mobile = blueprint.is_mobile();
        let mut entity = self.world.spawn((id, blueprint.into_bundle()));
        if mobile {
            entity.insert(Movement::default());
        }
        let entity = entity.id();
        self.world.resource_mut::<EntityIndex>().insert(id, entity);
        entity
    }

    /// Remove an entity and every component it has. Returns false if unknown.
    pub fn destroy(&mut self, id: SimId) -> bool {
        match self.world.resource_mut::<EntityIndex>().remove(id) {
            Some(entity) => self.world.despawn(entity),
            None => false,
        }
    }

    /// ECS handle for an id, or `None` once destroyed.
    pub fn entity(&self, id: SimId) -> Option<Entity> {
        self.index().get(id)
    }

    /// Id behind a handle, or `None` if the handle is stale.
    pub fn id_of(&self, entity: Entity) -> Option<SimId> {
        self.world.get::<SimId>(entity).copied()
    }

    pub fn contains(&self, id: SimId) -> bool {
        self.entity(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.index().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index().is_empty()
    }

    /// Live ids in creation order.
    pub fn ids(&self) -> Vec<SimId> {
        self.index().ids().collect()
    }

    /// Visit every live entity in creation order.
    pub fn for_each(&self, mut f: impl FnMut(SimId, EntityView<'_>)) {
        for (id, entity) in &self.index().by_id {
            if let Some(view) = self.view_of(*entity) {
                f(*id, view);
            }
        }
    }

    /// Read-only view of one entity.
    pub fn view(&self, id: SimId) -> Option<EntityView<'_>> {
        self.view_of(self.entity(id)?)
    }

    fn view_of(&self, entity: Entity) -> Option<EntityView<'_>> {
        Some(EntityView {
            entity,
            position: self.world.get::<Position>(entity)?,
            health: self.world.get::<Health>(entity)?,
            faction: *self.world.get::<Faction>(entity)?,
            kind: self.world.get::<Kind>(entity)?,
            movement: self.world.get::<Movement>(entity),
        })
    }

    /// Ids of entities standing on `tile`, in creation order.
    pub fn at_tile(&self, tile: Tile) -> Vec<SimId> {
        let mut found = Vec::new();
        self.for_each(|id, view| {
            if view.position.tile == tile {
                found.push(id);
            }
        });
        found
    }

    pub fn index(&self) -> &EntityIndex {
        self.world.resource::<EntityIndex>()
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Borrowed components of a single entity.
#[derive(Debug, Clone, Copy)]
pub struct EntityView<'w> {
    pub entity: Entity,
    pub position: &'w Position,
    pub health: &'w Health,
    pub faction: Faction,
    pub kind: &'w Kind,
    pub movement: Option<&'w Movement>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_monotonic_and_never_reused() {
        let mut store = EntityStore::new();
        let a = store.create(Blueprint::combat_unit(Faction::Terran, Tile::new(0, 0)));
        let b = store.create(Blueprint::combat_unit(Faction::Zerg, Tile::new(1, 0)));
        assert!(b > a);

        assert!(store.destroy(b));
        let c = store.create(Blueprint::combat_unit(Faction::Zerg, Tile::new(2, 0)));
        assert!(c > b, "destroyed id must not be handed out again");
    }

    #[test]
    fn test_lookup_after_destroy_fails_cleanly() {
        let mut store = EntityStore::new();
        let id = store.create(Blueprint::resource(Tile::new(3, 3), 100));
        let entity = store.entity(id).unwrap();

        assert!(store.destroy(id));
        assert!(!store.destroy(id));
        assert!(store.entity(id).is_none());
        assert!(store.view(id).is_none());
        assert!(store.id_of(entity).is_none());
        assert!(store.world().get::<Health>(entity).is_none());
    }

    #[test]
    fn test_for_each_in_insertion_order() {
        let mut store = EntityStore::new();
        let ids: Vec<_> = (0..5)
            .map(|i| store.create(Blueprint::resource(Tile::new(i, 0), 10)))
            .collect();
        store.destroy(ids[2]);

        let mut seen = Vec::new();
        store.for_each(|id, _| seen.push(id));
        assert_eq!(seen, vec![ids[0], ids[1], ids[3], ids[4]]);
    }

    #[test]
    fn test_create_with_id_advances_counter() {
        let mut store = EntityStore::new();
        store
            .create_with_id(SimId(7), Blueprint::mirror(KindTag::Worker, Faction::Terran, Tile::new(3, 3)))
            .unwrap();
        assert!(store
            .create_with_id(SimId(7), Blueprint::mirror(KindTag::Worker, Faction::Terran, Tile::new(3, 3)))
            .is_err());
        let next = store.create(Blueprint::resource(Tile::new(0, 0), 10));
        assert_eq!(next, SimId(8));
    }

    #[test]
    fn test_only_units_get_movement() {
        let mut store = EntityStore::new();
        let unit = store.create(Blueprint::worker(Faction::Terran, Tile::new(0, 0), None));
        let base = store.create(Blueprint::building(Faction::Terran, Tile::new(5, 5), &[], 200));
        assert!(store.view(unit).unwrap().movement.is_some());
        assert!(store.view(base).unwrap().movement.is_none());
        assert_eq!(store.at_tile(Tile::new(5, 5)), vec![base]);
    }
}
