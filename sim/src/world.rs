//! Serializable world snapshot.
//!
//! The `WorldSnapshot` struct is a JSON-friendly view of the whole simulation
//! for debugging and host inspection. It is not the replication format; peers
//! exchange the binary STATE frames in [`crate::net::protocol`].

use crate::components::*;
use crate::store::EntityStore;
use crate::systems::economy::Treasury;
use serde::{Deserialize, Serialize};

/// Snapshot of a single entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: u32,
    pub faction: Faction,
    pub kind: KindTag,
    pub x: i32,
    pub y: i32,
    pub render_x: f32,
    pub render_y: f32,
    pub health: i32,
    /// Remaining waypoints, zero when idle or immobile.
    pub path_len: usize,
    pub carried: Option<i32>,
}

/// Minerals held by one faction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactionSnapshot {
    pub faction: Faction,
    pub minerals: i32,
}

/// Complete simulation state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub tick: u64,
    pub time: f32,
    pub entities: Vec<EntitySnapshot>,
    pub factions: Vec<FactionSnapshot>,
}

impl WorldSnapshot {
    pub fn from_store(store: &EntityStore, tick: u64, time: f32) -> Self {
        let mut entities = Vec::with_capacity(store.len());
        store.for_each(|id, view| {
            entities.push(EntitySnapshot {
                id: id.0,
                faction: view.faction,
                kind: view.kind.tag(),
                x: view.position.tile.x,
                y: view.position.tile.y,
                render_x: view.position.render_x,
                render_y: view.position.render_y,
                health: view.health.value,
                path_len: view
                    .movement
                    .map_or(0, |m| m.path.len().saturating_sub(m.path_index)),
                carried: view.kind.worker().map(|w| w.carried_amount),
            });
        });

        let factions = store
            .world()
            .get_resource::<Treasury>()
            .map(|treasury| {
                Faction::ALL
                    .iter()
                    .map(|&faction| FactionSnapshot {
                        faction,
                        minerals: treasury.minerals(faction),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            tick,
            time,
            entities,
            factions,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn entity(&self, id: SimId) -> Option<&EntitySnapshot> {
        self.entities.iter().find(|e| e.id == id.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_json_shape() {
        let mut store = EntityStore::new();
        store.world_mut().insert_resource(Treasury::new(50));
        let drone = store.create(Blueprint::worker(Faction::Zerg, Tile::new(2, 3), None));

        let snapshot = WorldSnapshot::from_store(&store, 4, 0.5);
        let json = snapshot.to_json().unwrap();
        assert!(json.contains("\"faction\":\"zerg\""));
        assert!(json.contains("\"kind\":\"Worker\""));

        let parsed: WorldSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, snapshot);
        assert_eq!(parsed.entity(drone).unwrap().carried, Some(0));
        assert_eq!(parsed.factions.len(), 3);
    }
}
