//! ECS Components for the RTS simulation.
//!
//! Components are pure data containers attached to entities.
//! All game logic lives in systems that query these components.

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ============================================================================
// SPATIAL COMPONENTS
// ============================================================================

/// One cell of the integer tile map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tile {
    pub x: i32,
    pub y: i32,
}

impl Tile {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Manhattan distance, the range metric for attacks and gathering.
    pub fn manhattan(&self, other: Tile) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }

    /// True when `other` is one of the 8 surrounding tiles.
    pub fn is_adjacent8(&self, other: Tile) -> bool {
        let dx = (self.x - other.x).abs();
        let dy = (self.y - other.y).abs();
        dx <= 1 && dy <= 1 && (dx, dy) != (0, 0)
    }
}

impl std::fmt::Display for Tile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Logical tile plus a smoothed render position.
#[derive(Component, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Position {
    pub tile: Tile,
    pub render_x: f32,
    pub render_y: f32,
    /// Simulation time at which the current interpolation step started.
    pub last_update: f32,
}

impl Position {
    pub fn at(tile: Tile) -> Self {
        Self {
            tile,
            render_x: tile.x as f32,
            render_y: tile.y as f32,
            last_update: 0.0,
        }
    }

    /// Move the logical tile and snap the render position onto it.
    pub fn snap_to(&mut self, tile: Tile, now: f32) {
        self.tile = tile;
        self.render_x = tile.x as f32;
        self.render_y = tile.y as f32;
        self.last_update = now;
    }
}

/// Waypoints for a mobile entity.
///
/// Invariant: `path_index < path.len()`, or `path` is empty and `path_index == 0`.
#[derive(Component, Debug, Clone, Default, Serialize, Deserialize)]
pub struct Movement {
    pub path: Vec<Tile>,
    pub path_index: usize,
}

impl Movement {
    pub fn is_idle(&self) -> bool {
        self.path.is_empty()
    }

    pub fn next_waypoint(&self) -> Option<Tile> {
        self.path.get(self.path_index).copied()
    }

    /// Final tile of the current path.
    pub fn destination(&self) -> Option<Tile> {
        self.path.last().copied()
    }

    pub fn assign(&mut self, path: Vec<Tile>) {
        self.path = path;
        self.path_index = 0;
    }

    pub fn clear(&mut self) {
        self.path.clear();
        self.path_index = 0;
    }

    /// Step past the current waypoint, clearing the path after the last one.
    pub fn advance(&mut self) {
        self.path_index += 1;
        if self.path_index >= self.path.len() {
            self.clear();
        }
    }
}

// ============================================================================
// IDENTITY COMPONENTS
// ============================================================================

/// Opaque, monotonically increasing entity id shared across peers.
///
/// Never reused: a destroyed id stays retired for the lifetime of the store.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SimId(pub u32);

impl std::fmt::Display for SimId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Faction/side identifier.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Faction {
    #[default]
    Terran,
    Zerg,
    Protoss,
}

impl Faction {
    pub const ALL: [Faction; 3] = [Faction::Terran, Faction::Zerg, Faction::Protoss];

    pub fn tag(self) -> u8 {
        match self {
            Faction::Terran => 0,
            Faction::Zerg => 1,
            Faction::Protoss => 2,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Faction::Terran),
            1 => Some(Faction::Zerg),
            2 => Some(Faction::Protoss),
            _ => None,
        }
    }

    pub fn index(self) -> usize {
        self.tag() as usize
    }
}

// ============================================================================
// COMBAT COMPONENTS
// ============================================================================

/// Hit points. The entity is destroyed when `value <= 0`.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    pub value: i32,
}

impl Health {
    pub fn new(value: i32) -> Self {
        Self { value }
    }

    pub fn is_alive(&self) -> bool {
        self.value > 0
    }

    pub fn damage(&mut self, amount: i32) {
        self.value -= amount;
    }
}

impl Default for Health {
    fn default() -> Self {
        Self::new(40)
    }
}

/// Offensive stats for anything that can attack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatStats {
    pub damage: i32,
    /// Manhattan range in tiles.
    pub range: i32,
}

impl Default for CombatStats {
    fn default() -> Self {
        Self { damage: 6, range: 1 }
    }
}

/// Standing intent to hit `target` whenever it is in range.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttackOrder {
    pub target: Entity,
}

// ============================================================================
// KIND COMPONENTS
// ============================================================================

/// Harvesting state of a worker.
///
/// `target_resource` and `home_base` are generation-checked handles; the
/// stale-reference system clears them once they stop resolving.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Worker {
    pub is_carrying: bool,
    pub carried_amount: i32,
    pub target_resource: Option<Entity>,
    pub home_base: Option<Entity>,
}

impl Worker {
    pub fn homed_at(base: Entity) -> Self {
        Self {
            home_base: Some(base),
            ..Default::default()
        }
    }

    pub fn is_full(&self, capacity: i32) -> bool {
        self.carried_amount >= capacity
    }

    /// Hand over the cargo, returning how much was carried.
    pub fn unload(&mut self) -> i32 {
        let amount = self.carried_amount;
        self.carried_amount = 0;
        self.is_carrying = false;
        amount
    }
}

/// Production capabilities of a structure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Building {
    pub producible: BTreeSet<KindTag>,
}

impl Building {
    pub fn producing(kinds: impl IntoIterator<Item = KindTag>) -> Self {
        Self {
            producible: kinds.into_iter().collect(),
        }
    }
}

/// Wire tag for [`Kind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KindTag {
    Worker,
    Building,
    Resource,
    CombatUnit,
    ArmedWorker,
}

impl KindTag {
    pub fn to_u8(self) -> u8 {
        match self {
            KindTag::Worker => 0,
            KindTag::Building => 1,
            KindTag::Resource => 2,
            KindTag::CombatUnit => 3,
            KindTag::ArmedWorker => 4,
        }
    }

    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(KindTag::Worker),
            1 => Some(KindTag::Building),
            2 => Some(KindTag::Resource),
            3 => Some(KindTag::CombatUnit),
            4 => Some(KindTag::ArmedWorker),
            _ => None,
        }
    }

    /// Units walk; buildings and resources do not.
    pub fn is_mobile(self) -> bool {
        matches!(self, KindTag::Worker | KindTag::CombatUnit | KindTag::ArmedWorker)
    }
}

/// What an entity is. Exactly one per live entity.
#[derive(Component, Debug, Clone, PartialEq, Eq)]
pub enum Kind {
    Worker(Worker),
    CombatUnit(CombatStats),
    /// A worker that can also fight.
    ArmedWorker { worker: Worker, combat: CombatStats },
    Building(Building),
    Resource,
}

impl Kind {
    pub fn tag(&self) -> KindTag {
        match self {
            Kind::Worker(_) => KindTag::Worker,
            Kind::CombatUnit(_) => KindTag::CombatUnit,
            Kind::ArmedWorker { .. } => KindTag::ArmedWorker,
            Kind::Building(_) => KindTag::Building,
            Kind::Resource => KindTag::Resource,
        }
    }

    /// Default kind for a tag, used when a mirror learns of a new entity.
    pub fn from_tag(tag: KindTag) -> Self {
        match tag {
            KindTag::Worker => Kind::Worker(Worker::default()),
            KindTag::CombatUnit => Kind::CombatUnit(CombatStats::default()),
            KindTag::ArmedWorker => Kind::ArmedWorker {
                worker: Worker::default(),
                combat: CombatStats::default(),
            },
            KindTag::Building => Kind::Building(Building::default()),
            KindTag::Resource => Kind::Resource,
        }
    }

    pub fn worker(&self) -> Option<&Worker> {
        match self {
            Kind::Worker(worker) | Kind::ArmedWorker { worker, .. } => Some(worker),
            _ => None,
        }
    }

    pub fn worker_mut(&mut self) -> Option<&mut Worker> {
        match self {
            Kind::Worker(worker) | Kind::ArmedWorker { worker, .. } => Some(worker),
            _ => None,
        }
    }

    pub fn combat(&self) -> Option<CombatStats> {
        match self {
            Kind::CombatUnit(combat) | Kind::ArmedWorker { combat, .. } => Some(*combat),
            _ => None,
        }
    }

    pub fn building(&self) -> Option<&Building> {
        match self {
            Kind::Building(building) => Some(building),
            _ => None,
        }
    }

    pub fn is_building(&self) -> bool {
        matches!(self, Kind::Building(_))
    }

    pub fn is_resource(&self) -> bool {
        matches!(self, Kind::Resource)
    }
}

// ============================================================================
// BLUEPRINTS
// ============================================================================

/// Bundle for spawning a complete entity (everything but its id).
#[derive(Bundle)]
pub struct EntityBundle {
    pub position: Position,
    pub health: Health,
    pub faction: Faction,
    pub kind: Kind,
}

/// Description of an entity to create.
#[derive(Debug, Clone)]
pub struct Blueprint {
    pub tile: Tile,
    pub faction: Faction,
    pub kind: Kind,
    pub health: Health,
}

impl Blueprint {
    pub fn worker(faction: Faction, tile: Tile, home_base: Option<Entity>) -> Self {
        Self {
            tile,
            faction,
            kind: Kind::Worker(Worker {
                home_base,
                ..Default::default()
            }),
            health: Health::new(40),
        }
    }

    pub fn armed_worker(faction: Faction, tile: Tile, home_base: Option<Entity>) -> Self {
        Self {
            tile,
            faction,
            kind: Kind::ArmedWorker {
                worker: Worker {
                    home_base,
                    ..Default::default()
                },
                combat: CombatStats::default(),
            },
            health: Health::new(40),
        }
    }

    pub fn combat_unit(faction: Faction, tile: Tile) -> Self {
        Self {
            tile,
            faction,
            kind: Kind::CombatUnit(CombatStats::default()),
            health: Health::new(40),
        }
    }

    pub fn building(faction: Faction, tile: Tile, producible: &[KindTag], health: i32) -> Self {
        Self {
            tile,
            faction,
            kind: Kind::Building(Building::producing(producible.iter().copied())),
            health: Health::new(health),
        }
    }

    /// Mineral field. Its health is the amount left to mine.
    pub fn resource(tile: Tile, amount: i32) -> Self {
        Self {
            tile,
            faction: Faction::Terran,
            kind: Kind::Resource,
            health: Health::new(amount),
        }
    }

    /// Minimal entity for a tag, as seen by a replication mirror.
    pub fn mirror(tag: KindTag, faction: Faction, tile: Tile) -> Self {
        let health = match tag {
            KindTag::Building => 100,
            KindTag::Resource => 1000,
            _ => 40,
        };
        Self {
            tile,
            faction,
            kind: Kind::from_tag(tag),
            health: Health::new(health),
        }
    }

    pub fn with_health(mut self, value: i32) -> Self {
        self.health = Health::new(value);
        self
    }

    pub fn is_mobile(&self) -> bool {
        self.kind.tag().is_mobile()
    }

    pub(crate) fn into_bundle(self) -> EntityBundle {
        EntityBundle {
            position: Position::at(self.tile),
            health: self.health,
            faction: self.faction,
            kind: self.kind,
        }
    }
}
