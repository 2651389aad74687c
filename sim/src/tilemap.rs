//! Ground tiles of the map.
//!
//! Terrain is cosmetic: it never blocks movement or changes speed. It exists
//! so the renderer has something to draw under the units, and it is generated
//! from the config seed so every peer sees the same ground.

use bevy_ecs::prelude::*;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::components::Tile;

/// Share of tiles that come out as grass.
const GRASS_CHANCE: f64 = 0.75;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerrainType {
    #[default]
    Grass,
    Dirt,
}

impl TerrainType {
    pub fn tag(self) -> u8 {
        match self {
            TerrainType::Grass => 0,
            TerrainType::Dirt => 1,
        }
    }
}

/// Row-major terrain grid.
#[derive(Resource, Debug, Clone, Serialize, Deserialize)]
pub struct TileMap {
    pub width: i32,
    pub height: i32,
    terrain: Vec<TerrainType>,
}

impl TileMap {
    /// All-grass map.
    pub fn flat(width: i32, height: i32) -> Self {
        let len = (width.max(0) as usize) * (height.max(0) as usize);
        Self {
            width,
            height,
            terrain: vec![TerrainType::Grass; len],
        }
    }

    /// Random grass and dirt, reproducible from `seed`.
    pub fn generate(width: i32, height: i32, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut map = Self::flat(width, height);
        for cell in &mut map.terrain {
            *cell = if rng.gen_bool(GRASS_CHANCE) {
                TerrainType::Grass
            } else {
                TerrainType::Dirt
            };
        }
        map
    }

    pub fn in_bounds(&self, tile: Tile) -> bool {
        tile.x >= 0 && tile.y >= 0 && tile.x < self.width && tile.y < self.height
    }

    /// Terrain under a tile, `None` off the map.
    pub fn terrain_at(&self, tile: Tile) -> Option<TerrainType> {
        if !self.in_bounds(tile) {
            return None;
        }
        self.terrain
            .get((tile.y * self.width + tile.x) as usize)
            .copied()
    }

    /// Clamp a tile onto the map.
    pub fn clamp(&self, tile: Tile) -> Tile {
        Tile::new(
            tile.x.clamp(0, (self.width - 1).max(0)),
            tile.y.clamp(0, (self.height - 1).max(0)),
        )
    }

    /// Terrain tags row by row, for renderers.
    pub fn rows(&self) -> impl Iterator<Item = &[TerrainType]> {
        self.terrain.chunks(self.width.max(1) as usize)
    }
}
