//! Spatial partitioning for tile-range queries.
//!
//! The map is split into square cells of `cell_size` tiles, stored row-major.
//! The grid is derived state: it is cleared and refilled from the ECS once
//! per tick, before anything that reads it.

use crate::components::{Faction, Kind, KindTag, Position, SimId, Tile};
use crate::error::SimError;
use bevy_ecs::prelude::*;

/// Entry in a spatial cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpatialEntry {
    pub entity: Entity,
    pub id: SimId,
    pub tile: Tile,
    pub faction: Faction,
    pub kind: KindTag,
}

impl SpatialEntry {
    /// Order inside a cell: row, then column, then id.
    fn sort_key(&self) -> (i32, i32, SimId) {
        (self.tile.y, self.tile.x, self.id)
    }
}

/// Uniform grid over the tile map.
#[derive(Resource, Debug)]
pub struct SpatialGrid {
    /// Cell size in tiles.
    pub cell_size: i32,
    cols: i32,
    rows: i32,
    cells: Vec<Vec<SpatialEntry>>,
    count: usize,
}

impl SpatialGrid {
    /// Cell size for a map: a tenth of its longer side, never below `min_cell_size`.
    pub fn cell_size_for(map_width: i32, map_height: i32, min_cell_size: i32) -> i32 {
        min_cell_size.max(map_width.max(map_height) / 10).max(1)
    }

    /// Allocate a grid covering `map_width` x `map_height` tiles.
    pub fn new(map_width: i32, map_height: i32, min_cell_size: i32) -> Result<Self, SimError> {
        let cell_size = Self::cell_size_for(map_width, map_height, min_cell_size);
        let cols = ((map_width.max(1) + cell_size - 1) / cell_size).max(1);
        let rows = ((map_height.max(1) + cell_size - 1) / cell_size).max(1);
        let len = (cols as usize) * (rows as usize);

        let mut cells = Vec::new();
        cells
            .try_reserve_exact(len)
            .map_err(|source| SimError::Allocation { cells: len, source })?;
        cells.resize_with(len, Vec::new);

        Ok(Self {
            cell_size,
            cols,
            rows,
            cells,
            count: 0,
        })
    }

    /// Grid dimensions in cells.
    pub fn dimensions(&self) -> (i32, i32) {
        (self.cols, self.rows)
    }

    /// Cell containing a tile. Off-map tiles fall into the nearest edge cell.
    #[inline]
    pub fn cell_of(&self, tile: Tile) -> (i32, i32) {
        (
            (tile.x.max(0) / self.cell_size).min(self.cols - 1),
            (tile.y.max(0) / self.cell_size).min(self.rows - 1),
        )
    }

    #[inline]
    fn slot(&self, cell: (i32, i32)) -> usize {
        (cell.1 * self.cols + cell.0) as usize
    }

    /// Empty every cell, keeping allocations.
    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            cell.clear();
        }
        self.count = 0;
    }

    /// Insert an entry, keeping its cell sorted.
    pub fn insert(&mut self, entry: SpatialEntry) {
        let slot = self.slot(self.cell_of(entry.tile));
        let cell = &mut self.cells[slot];
        let at = cell.partition_point(|e| e.sort_key() < entry.sort_key());
        cell.insert(at, entry);
        self.count += 1;
    }

    /// Entries of the cell containing tile `(x, y)`.
    pub fn cells_at(&self, x: i32, y: i32) -> &[SpatialEntry] {
        &self.cells[self.slot(self.cell_of(Tile::new(x, y)))]
    }

    /// Entries standing exactly on `tile`.
    pub fn entities_at_tile(&self, tile: Tile) -> Vec<SpatialEntry> {
        self.cells_at(tile.x, tile.y)
            .iter()
            .filter(|e| e.tile == tile)
            .copied()
            .collect()
    }

    /// Entries inside the inclusive rectangle spanned by two corners, by id.
    pub fn select_region(&self, a: Tile, b: Tile) -> Vec<SpatialEntry> {
        let min = Tile::new(a.x.min(b.x), a.y.min(b.y));
        let max = Tile::new(a.x.max(b.x), a.y.max(b.y));
        let mut found = self.collect_cells(min, max, |e| {
            (min.x..=max.x).contains(&e.tile.x) && (min.y..=max.y).contains(&e.tile.y)
        });
        found.sort_by_key(|e| e.id);
        found
    }

    /// Entries within Manhattan `range` of `center`, nearest first, ties by id.
    pub fn query_range(&self, center: Tile, range: i32) -> Vec<SpatialEntry> {
        if range < 0 {
            return Vec::new();
        }
        let min = Tile::new(center.x - range, center.y - range);
        let max = Tile::new(center.x + range, center.y + range);
        let mut found = self.collect_cells(min, max, |e| e.tile.manhattan(center) <= range);
        found.sort_by_key(|e| (e.tile.manhattan(center), e.id));
        found
    }

    fn collect_cells(
        &self,
        min: Tile,
        max: Tile,
        keep: impl Fn(&SpatialEntry) -> bool,
    ) -> Vec<SpatialEntry> {
        let (cx0, cy0) = self.cell_of(min);
        let (cx1, cy1) = self.cell_of(max);
        let mut found = Vec::new();
        for cy in cy0..=cy1 {
            for cx in cx0..=cx1 {
                found.extend(self.cells[self.slot((cx, cy))].iter().filter(|e| keep(e)).copied());
            }
        }
        found
    }

    /// Every cell with its coordinates, row-major.
    pub fn all_cells(&self) -> impl Iterator<Item = ((i32, i32), &[SpatialEntry])> {
        let cols = self.cols;
        self.cells
            .iter()
            .enumerate()
            .map(move |(i, cell)| (((i as i32) % cols, (i as i32) / cols), cell.as_slice()))
    }

    pub fn total_count(&self) -> usize {
        self.count
    }
}

/// Rebuild the grid from every live entity.
pub fn spatial_grid_update_system(
    mut grid: ResMut<SpatialGrid>,
    query: Query<(Entity, &SimId, &Position, &Faction, &Kind)>,
) {
    grid.clear();
    for (entity, id, position, faction, kind) in query.iter() {
        grid.insert(SpatialEntry {
            entity,
            id: *id,
            tile: position.tile,
            faction: *faction,
            kind: kind.tag(),
        });
    }
}
