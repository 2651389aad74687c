//! RTS Simulation Core
//!
//! A fixed-timestep ECS simulation for a small real-time-strategy game, with
//! grid pathfinding, a scripted AI, and server-to-client state replication.
//! Uses `bevy_ecs` for the entity-component-system architecture.

pub mod api;
pub mod components;
pub mod config;
pub mod error;
pub mod host;
pub mod net;
pub mod orders;
pub mod pathfinding;
pub mod render_view;
pub mod spatial;
pub mod store;
pub mod systems;
pub mod tilemap;
pub mod world;

pub use api::SimulationLoop;
pub use components::*;
pub use config::{AiConfig, Role, SimConfig};
pub use error::{ConfigError, NetError, OrderError, ProtocolError, SimError};
pub use host::{InputHandler, NullRenderer, Renderer, ScriptedInput};
pub use net::{CommandKind, CommandRecord, EntityRecord};
pub use pathfinding::{find_path, Obstacles};
pub use render_view::RenderItem;
pub use spatial::{SpatialEntry, SpatialGrid};
pub use store::{EntityStore, EntityView};
pub use systems::*;
pub use tilemap::{TerrainType, TileMap};
pub use world::WorldSnapshot;
