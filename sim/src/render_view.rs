//! Render view for frame-rate collaborators.
//!
//! The renderer only needs to know where to draw what. Each live entity is
//! reduced to a [`RenderItem`]; hosts that prefer one contiguous array can
//! take the flat `f32` form instead.
//!
//! # Flat Buffer Layout
//!
//! ```text
//! [0]                      item_count (as f32)
//! [1 + i * STRIDE + 0]     render_x
//! [1 + i * STRIDE + 1]     render_y
//! [1 + i * STRIDE + 2]     kind_tag    (0=Worker 1=Building 2=Resource 3=CombatUnit 4=ArmedWorker)
//! [1 + i * STRIDE + 3]     faction_tag (0=Terran 1=Zerg 2=Protoss)
//! ```
//!
//! Items appear in entity id order, so the buffer is identical for identical
//! worlds.

use crate::store::EntityStore;
use serde::{Deserialize, Serialize};

/// Number of f32 values per item in the flat buffer.
pub const STRIDE: usize = 4;

/// Number of f32 values in the buffer header.
pub const HEADER_SIZE: usize = 1;

/// What to draw for one entity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RenderItem {
    pub render_x: f32,
    pub render_y: f32,
    pub kind_tag: u8,
    pub faction_tag: u8,
}

/// One item per live entity, in id order.
pub fn render_items(store: &EntityStore) -> Vec<RenderItem> {
    let mut items = Vec::with_capacity(store.len());
    store.for_each(|_, view| {
        items.push(RenderItem {
            render_x: view.position.render_x,
            render_y: view.position.render_y,
            kind_tag: view.kind.tag().to_u8(),
            faction_tag: view.faction.tag(),
        });
    });
    items
}

/// Pack items into the flat buffer described above.
pub fn to_flat_buffer(items: &[RenderItem]) -> Vec<f32> {
    let mut buffer = Vec::with_capacity(HEADER_SIZE + items.len() * STRIDE);
    buffer.push(items.len() as f32);
    for item in items {
        buffer.push(item.render_x);
        buffer.push(item.render_y);
        buffer.push(item.kind_tag as f32);
        buffer.push(item.faction_tag as f32);
    }
    buffer
}

/// Item count stored in a flat buffer header.
pub fn item_count(buffer: &[f32]) -> usize {
    buffer.first().map_or(0, |n| *n as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Blueprint, Faction, KindTag, Tile};

    #[test]
    fn test_flat_buffer_layout() {
        let mut store = EntityStore::new();
        store.create(Blueprint::building(Faction::Terran, Tile::new(5, 5), &[KindTag::Worker], 200));
        store.create(Blueprint::armed_worker(Faction::Zerg, Tile::new(16, 13), None));

        let items = render_items(&store);
        let buffer = to_flat_buffer(&items);
        assert_eq!(buffer.len(), HEADER_SIZE + 2 * STRIDE);
        assert_eq!(item_count(&buffer), 2);
        assert_eq!(&buffer[1..5], &[5.0, 5.0, 1.0, 0.0]);
        assert_eq!(&buffer[5..9], &[16.0, 13.0, 4.0, 1.0]);
    }

    #[test]
    fn test_empty_world() {
        let buffer = to_flat_buffer(&render_items(&EntityStore::new()));
        assert_eq!(buffer, vec![0.0]);
        assert_eq!(item_count(&[]), 0);
    }
}
