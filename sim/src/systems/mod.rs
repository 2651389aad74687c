//! ECS Systems for the RTS simulation.
//!
//! Systems contain the game logic that operates on components.
//!
//! ## Tick Order
//!
//! Everything runs on one thread in a fixed, chained order:
//!
//! 1. `spatial_grid_update_system` - Rebuilds the spatial grid
//! 2. `movement_system` - Walks units along their paths
//! 3. `gather_system` - Harvests minerals and deposits cargo
//! 4. `combat_system` - Resolves attack orders
//! 5. `purge_system` - Despawns entities at zero health
//! 6. `stale_reference_system` - Clears handles to despawned entities
//!
//! The AI is not a system: it runs after the schedule through
//! [`ai::AiController`], which applies its decisions via [`crate::orders`].

pub mod ai;
pub mod combat;
pub mod economy;
pub mod lifecycle;
pub mod movement;

pub use ai::*;
pub use combat::*;
pub use economy::*;
pub use lifecycle::*;
pub use movement::*;
