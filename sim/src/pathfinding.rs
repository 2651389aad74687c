//! A* pathfinding over the tile map.
//!
//! Eight-way moves, every step costs 1, Manhattan heuristic. The open set is a
//! min-heap keyed by `(f, discovery order)` so equal-cost ties always resolve
//! the same way on every peer.

use crate::components::{Kind, Position, Tile};
use bevy_ecs::prelude::*;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

/// Map bounds plus the set of impassable tiles.
#[derive(Debug, Clone, Default)]
pub struct Obstacles {
    width: i32,
    height: i32,
    blocked: HashSet<Tile>,
}

impl Obstacles {
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            width,
            height,
            blocked: HashSet::new(),
        }
    }

    /// Every building tile in the world is blocked.
    pub fn from_world(world: &mut World, width: i32, height: i32) -> Self {
        let mut obstacles = Self::new(width, height);
        let mut query = world.query::<(&Position, &Kind)>();
        for (position, kind) in query.iter(world) {
            if kind.is_building() {
                obstacles.block(position.tile);
            }
        }
        obstacles
    }

    pub fn block(&mut self, tile: Tile) {
        self.blocked.insert(tile);
    }

    pub fn is_blocked(&self, tile: Tile) -> bool {
        self.blocked.contains(&tile)
    }

    pub fn in_bounds(&self, tile: Tile) -> bool {
        tile.x >= 0 && tile.y >= 0 && tile.x < self.width && tile.y < self.height
    }

    /// In bounds and not blocked.
    pub fn is_walkable(&self, tile: Tile) -> bool {
        self.in_bounds(tile) && !self.is_blocked(tile)
    }
}

/// Shortest 8-connected path from `start` to `goal`.
///
/// The returned path excludes `start` and ends at `goal`; `start == goal`
/// yields an empty path even on a blocked tile. `None` when the goal is
/// blocked, either end is off the map, or no route exists.
pub fn find_path(start: Tile, goal: Tile, obstacles: &Obstacles) -> Option<Vec<Tile>> {
    if !obstacles.in_bounds(start) || !obstacles.in_bounds(goal) {
        return None;
    }
    if start == goal {
        return Some(Vec::new());
    }
    if obstacles.is_blocked(goal) {
        return None;
    }

    let mut open = BinaryHeap::new();
    let mut g_score: HashMap<Tile, i32> = HashMap::new();
    let mut parent: HashMap<Tile, Tile> = HashMap::new();
    let mut closed: HashSet<Tile> = HashSet::new();
    let mut seq: u64 = 0;

    g_score.insert(start, 0);
    open.push(Reverse((start.manhattan(goal), seq, start)));

    while let Some(Reverse((_, _, current))) = open.pop() {
        if current == goal {
            return Some(reconstruct(&parent, start, goal));
        }
        if !closed.insert(current) {
            continue;
        }
        let g = g_score.get(&current).copied().unwrap_or(i32::MAX);

        for dx in -1..=1 {
            for dy in -1..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let next = Tile::new(current.x + dx, current.y + dy);
                if !obstacles.is_walkable(next) || closed.contains(&next) {
                    continue;
                }
                let tentative = g + 1;
                if tentative < g_score.get(&next).copied().unwrap_or(i32::MAX) {
                    g_score.insert(next, tentative);
                    parent.insert(next, current);
                    seq += 1;
                    open.push(Reverse((tentative + next.manhattan(goal), seq, next)));
                }
            }
        }
    }

    None
}

fn reconstruct(parent: &HashMap<Tile, Tile>, start: Tile, goal: Tile) -> Vec<Tile> {
    let mut path = vec![goal];
    let mut current = goal;
    while let Some(&prev) = parent.get(&current) {
        if prev == start {
            break;
        }
        path.push(prev);
        current = prev;
    }
    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Blueprint, Faction};
    use crate::store::EntityStore;
    use proptest::prelude::*;

    #[test]
    fn test_start_equals_goal_is_empty() {
        let obstacles = Obstacles::new(20, 15);
        assert_eq!(find_path(Tile::new(4, 4), Tile::new(4, 4), &obstacles), Some(Vec::new()));
    }

    #[test]
    fn test_start_equals_goal_on_blocked_tile() {
        let mut obstacles = Obstacles::new(20, 15);
        obstacles.block(Tile::new(4, 4));
        assert_eq!(find_path(Tile::new(4, 4), Tile::new(4, 4), &obstacles), Some(Vec::new()));
        assert_eq!(find_path(Tile::new(20, 4), Tile::new(20, 4), &obstacles), None);
    }

    #[test]
    fn test_straight_line() {
        let obstacles = Obstacles::new(20, 15);
        let path = find_path(Tile::new(0, 0), Tile::new(3, 0), &obstacles).unwrap();
        assert_eq!(path.len(), 3);
        assert_eq!(path.last(), Some(&Tile::new(3, 0)));
        assert!(!path.contains(&Tile::new(0, 0)));
    }

    #[test]
    fn test_detour_around_building() {
        let mut store = EntityStore::new();
        store.create(Blueprint::building(Faction::Terran, Tile::new(5, 5), &[], 200));
        let obstacles = Obstacles::from_world(store.world_mut(), 20, 15);

        let path = find_path(Tile::new(0, 0), Tile::new(10, 5), &obstacles).unwrap();
        assert_eq!(path.last(), Some(&Tile::new(10, 5)));
        assert!(!path.contains(&Tile::new(5, 5)));

        let mut prev = Tile::new(0, 0);
        for step in &path {
            assert!(prev.is_adjacent8(*step));
            prev = *step;
        }
    }

    #[test]
    fn test_blocked_goal_and_out_of_bounds() {
        let mut obstacles = Obstacles::new(20, 15);
        obstacles.block(Tile::new(3, 3));
        assert_eq!(find_path(Tile::new(0, 0), Tile::new(3, 3), &obstacles), None);
        assert_eq!(find_path(Tile::new(0, 0), Tile::new(20, 0), &obstacles), None);
        assert_eq!(find_path(Tile::new(-1, 0), Tile::new(2, 0), &obstacles), None);
    }

    #[test]
    fn test_walled_off_goal_has_no_path() {
        let mut obstacles = Obstacles::new(10, 10);
        for y in 0..10 {
            obstacles.block(Tile::new(5, y));
        }
        assert_eq!(find_path(Tile::new(0, 0), Tile::new(9, 9), &obstacles), None);
    }

    #[test]
    fn test_path_is_deterministic() {
        let mut obstacles = Obstacles::new(20, 15);
        for y in 2..12 {
            obstacles.block(Tile::new(8, y));
        }
        let first = find_path(Tile::new(1, 7), Tile::new(15, 7), &obstacles);
        for _ in 0..5 {
            assert_eq!(find_path(Tile::new(1, 7), Tile::new(15, 7), &obstacles), first);
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(128))]

        #[test]
        fn prop_paths_are_connected_and_avoid_obstacles(
            walls in proptest::collection::vec((0i32..20, 0i32..15), 0..60),
            start in (0i32..20, 0i32..15),
            goal in (0i32..20, 0i32..15),
        ) {
            let start = Tile::new(start.0, start.1);
            let goal = Tile::new(goal.0, goal.1);
            let mut obstacles = Obstacles::new(20, 15);
            for (x, y) in walls {
                let tile = Tile::new(x, y);
                if tile != start {
                    obstacles.block(tile);
                }
            }

            if let Some(path) = find_path(start, goal, &obstacles) {
                if start == goal {
                    prop_assert!(path.is_empty());
                } else {
                    prop_assert_eq!(path.last().copied(), Some(goal));
                }
                let mut prev = start;
                for step in &path {
                    prop_assert!(prev.is_adjacent8(*step));
                    prop_assert!(obstacles.is_walkable(*step));
                    prev = *step;
                }
                // Optimal under uniform 8-way cost.
                let chebyshev = (goal.x - start.x).abs().max((goal.y - start.y).abs());
                prop_assert!(path.len() as i32 >= chebyshev);
            }
        }
    }
}
