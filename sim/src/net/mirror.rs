//! Conversion between the entity store and STATE snapshots.

use tracing::{debug, warn};

use super::protocol::EntityRecord;
use crate::components::{Blueprint, Faction, Kind, Movement, Position};
use crate::store::EntityStore;

/// What applying a snapshot changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotDelta {
    pub created: usize,
    pub updated: usize,
    pub destroyed: usize,
}

impl SnapshotDelta {
    pub fn is_empty(&self) -> bool {
        self.created == 0 && self.updated == 0 && self.destroyed == 0
    }
}

/// Snapshot of every live entity, in id order.
pub fn snapshot_records(store: &EntityStore) -> Vec<EntityRecord> {
    let mut records = Vec::with_capacity(store.len());
    store.for_each(|id, view| {
        records.push(EntityRecord {
            id,
            tile: view.position.tile,
            faction: view.faction,
            kind: view.kind.tag(),
        });
    });
    records
}

/// Make the store mirror a server snapshot.
///
/// Unknown ids are created, known ids take the record's tile, faction and
/// kind, and ids absent from the snapshot are destroyed. Applying the same
/// snapshot twice leaves the store untouched the second time.
pub fn apply_snapshot(store: &mut EntityStore, records: &[EntityRecord], now: f32) -> SnapshotDelta {
    let mut delta = SnapshotDelta::default();
    let mut present = std::collections::BTreeSet::new();

    for record in records {
        if !present.insert(record.id) {
            warn!(id = %record.id, "duplicate id in snapshot, later record ignored");
            continue;
        }
        match store.entity(record.id) {
            None => {
                let blueprint = Blueprint::mirror(record.kind, record.faction, record.tile);
                match store.create_with_id(record.id, blueprint) {
                    Ok(_) => delta.created += 1,
                    Err(e) => warn!(id = %record.id, error = %e, "could not mirror entity"),
                }
            }
            Some(entity) => {
                if update_entity(store, entity, record, now) {
                    delta.updated += 1;
                }
            }
        }
    }

    for id in store.ids() {
        if !present.contains(&id) && store.destroy(id) {
            delta.destroyed += 1;
        }
    }

    if !delta.is_empty() {
        debug!(?delta, "snapshot applied");
    }
    delta
}

fn update_entity(
    store: &mut EntityStore,
    entity: bevy_ecs::entity::Entity,
    record: &EntityRecord,
    now: f32,
) -> bool {
    let world = store.world_mut();
    let Ok(mut entry) = world.get_entity_mut(entity) else {
        return false;
    };
    let mut changed = false;

    if let Some(mut position) = entry.get_mut::<Position>() {
        if position.tile != record.tile {
            position.snap_to(record.tile, now);
            changed = true;
        }
    }
    if let Some(mut faction) = entry.get_mut::<Faction>() {
        if *faction != record.faction {
            *faction = record.faction;
            changed = true;
        }
    }
    let kind_changed = entry
        .get::<Kind>()
        .map_or(true, |kind| kind.tag() != record.kind);
    if kind_changed {
        entry.insert(Kind::from_tag(record.kind));
        if record.kind.is_mobile() {
            entry.insert(Movement::default());
        } else {
            entry.remove::<Movement>();
        }
        changed = true;
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Faction, KindTag, SimId, Tile};

    fn record(id: u32, x: i32, y: i32, kind: KindTag) -> EntityRecord {
        EntityRecord {
            id: SimId(id),
            tile: Tile::new(x, y),
            faction: Faction::Terran,
            kind,
        }
    }

    #[test]
    fn test_new_id_is_mirrored() {
        let mut client = EntityStore::new();
        let delta = apply_snapshot(&mut client, &[record(7, 3, 3, KindTag::Worker)], 0.0);
        assert_eq!(delta.created, 1);

        let view = client.view(SimId(7)).unwrap();
        assert_eq!(view.position.tile, Tile::new(3, 3));
        assert_eq!(view.faction, Faction::Terran);
        assert_eq!(view.kind.tag(), KindTag::Worker);
    }

    #[test]
    fn test_apply_twice_is_idempotent() {
        let snapshot = vec![
            record(0, 5, 5, KindTag::Building),
            record(1, 10, 10, KindTag::Resource),
            record(2, 6, 6, KindTag::Worker),
        ];
        let mut client = EntityStore::new();
        apply_snapshot(&mut client, &snapshot, 0.0);
        let first = snapshot_records(&client);

        let delta = apply_snapshot(&mut client, &snapshot, 1.0);
        assert!(delta.is_empty());
        assert_eq!(snapshot_records(&client), first);
        assert_eq!(first, snapshot);
        assert_eq!(client.view(SimId(2)).unwrap().position.last_update, 0.0);
    }

    #[test]
    fn test_update_and_destroy() {
        let mut client = EntityStore::new();
        apply_snapshot(
            &mut client,
            &[record(1, 0, 0, KindTag::Worker), record(2, 4, 4, KindTag::CombatUnit)],
            0.0,
        );

        let mut moved = record(1, 1, 0, KindTag::ArmedWorker);
        moved.faction = Faction::Zerg;
        let delta = apply_snapshot(&mut client, &[moved], 0.5);
        assert_eq!(delta, SnapshotDelta { created: 0, updated: 1, destroyed: 1 });

        let view = client.view(SimId(1)).unwrap();
        assert_eq!(view.position.tile, Tile::new(1, 0));
        assert_eq!(view.faction, Faction::Zerg);
        assert!(view.kind.combat().is_some());
        assert!(!client.contains(SimId(2)));
    }

    #[test]
    fn test_server_snapshot_in_id_order() {
        let mut server = EntityStore::new();
        server.create(Blueprint::resource(Tile::new(9, 9), 100));
        server.create(Blueprint::combat_unit(Faction::Protoss, Tile::new(1, 2)));
        let records = snapshot_records(&server);
        assert_eq!(records.len(), 2);
        assert!(records[0].id < records[1].id);
        assert_eq!(records[1].faction, Faction::Protoss);
    }
}
