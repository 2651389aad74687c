//! Public API for the simulation.
//!
//! [`SimulationLoop`] owns the entity store, the system schedule and the
//! network role, and runs the per-tick sequence:
//!
//! 1. Accept pending connections
//! 2. Drain inbound messages (commands are queued, snapshots applied)
//! 3. Apply queued commands (a client forwards them instead)
//! 4. Rebuild the spatial grid
//! 5. Integrate movement
//! 6. Resolve gathering, then combat
//! 7. Purge the dead and clear stale references
//! 8. Run the AI
//! 9. Broadcast STATE (a client flushes queued commands instead)
//!
//! ## Fixed Timestep
//!
//! The simulation runs at `tick_rate_hz`. `step(dt)` accumulates frame time
//! and runs as many ticks as fit, so behaviour does not depend on frame rate.

use crate::components::*;
use crate::config::{Role, SimConfig};
use crate::error::SimError;
use crate::host::{InputHandler, Renderer};
use crate::net::{
    apply_snapshot, snapshot_records, Client, CommandRecord, Inbound, NetLimits, Replicator, Server,
};
use crate::orders::Orders;
use crate::render_view::{render_items, RenderItem};
use crate::spatial::{spatial_grid_update_system, SpatialGrid};
use crate::store::EntityStore;
use crate::systems::*;
use crate::tilemap::TileMap;
use crate::world::WorldSnapshot;
use bevy_ecs::prelude::*;
use bevy_ecs::schedule::ExecutorKind;
use std::collections::VecDeque;
use std::net::SocketAddr;
use tracing::{debug, info};

/// The main simulation container.
pub struct SimulationLoop {
    store: EntityStore,
    schedule: Schedule,
    role: Role,
    replicator: Option<Replicator>,
    ai: Option<AiController>,
    commands: VecDeque<CommandRecord>,
    fixed_dt: f32,
    time_accumulator: f32,
}

impl SimulationLoop {
    /// Standalone authoritative simulation with no networking.
    pub fn new_local(config: SimConfig) -> Result<Self, SimError> {
        config.validate()?;
        Self::build(config, Role::Server, None)
    }

    /// Authoritative simulation listening for clients on `config.address()`.
    pub fn new_server(config: SimConfig) -> Result<Self, SimError> {
        config.validate()?;
        let server = Server::bind(config.address(), NetLimits::from_config(&config))?;
        Self::build(config, Role::Server, Some(Replicator::Server(server)))
    }

    /// Mirror of the server at `config.address()`.
    pub fn new_client(config: SimConfig) -> Result<Self, SimError> {
        config.validate()?;
        let client = Client::connect(config.address(), NetLimits::from_config(&config))?;
        Self::build(config, Role::Client, Some(Replicator::Client(client)))
    }

    /// Server or client according to `config.role`.
    pub fn start(config: SimConfig) -> Result<Self, SimError> {
        match config.role {
            Role::Server => Self::new_server(config),
            Role::Client => Self::new_client(config),
        }
    }

    fn build(config: SimConfig, role: Role, replicator: Option<Replicator>) -> Result<Self, SimError> {
        let grid = SpatialGrid::new(config.map_width, config.map_height, config.min_cell_size)?;
        let ai = (role == Role::Server).then(|| AiController::scripted(&config));

        let mut store = EntityStore::new();
        let world = store.world_mut();
        world.insert_resource(grid);
        world.insert_resource(SimClock::default());
        world.insert_resource(Treasury::new(config.starting_minerals));
        world.insert_resource(TileMap::generate(config.map_width, config.map_height, config.seed));

        let mut schedule = Schedule::default();
        schedule.set_executor_kind(ExecutorKind::SingleThreaded);
        match role {
            Role::Server => {
                schedule.add_systems(
                    (
                        spatial_grid_update_system,
                        movement_system,
                        gather_system,
                        combat_system,
                        purge_system,
                        stale_reference_system,
                    )
                        .chain(),
                );
            }
            Role::Client => {
                schedule.add_systems((spatial_grid_update_system, movement_system).chain());
            }
        }

        let fixed_dt = config.fixed_timestep();
        info!(
            ?role,
            width = config.map_width,
            height = config.map_height,
            tick_rate = config.tick_rate_hz,
            "simulation created"
        );
        world.insert_resource(config);

        Ok(Self {
            store,
            schedule,
            role,
            replicator,
            ai,
            commands: VecDeque::new(),
            fixed_dt,
            time_accumulator: 0.0,
        })
    }

    /// Populate the starting scenario: one Terran base with a worker and a
    /// barracks, a mineral field, and one AI-driven Zerg hive.
    pub fn spawn_default_world(&mut self) {
        let map = self.store.world().resource::<TileMap>().clone();
        let at = |x: i32, y: i32| map.clamp(Tile::new(x, y));

        let command_center = self.store.create(Blueprint::building(
            Faction::Terran,
            at(5, 5),
            &[KindTag::Worker],
            200,
        ));
        self.store.create(Blueprint::resource(at(10, 10), 1000));
        let home = self.store.entity(command_center);
        self.store.create(Blueprint::worker(Faction::Terran, at(6, 6), home));
        self.store.create(Blueprint::building(
            Faction::Terran,
            at(7, 7),
            &[KindTag::CombatUnit],
            100,
        ));
        let hatchery = self.store.create(Blueprint::building(
            Faction::Zerg,
            at(15, 12),
            &[KindTag::ArmedWorker],
            200,
        ));
        let hive = self.store.entity(hatchery);
        self.store.create(Blueprint::armed_worker(Faction::Zerg, at(16, 13), hive));
        info!(entities = self.store.len(), "default world spawned");
    }

    /// Queue a command for the next tick.
    pub fn enqueue(&mut self, command: CommandRecord) {
        self.commands.push_back(command);
    }

    /// Advance by `dt` seconds of frame time. Returns how many ticks ran.
    pub fn step(&mut self, dt: f32) -> u32 {
        self.time_accumulator += dt;
        let mut ticks = 0;
        while self.time_accumulator >= self.fixed_dt {
            self.tick();
            self.time_accumulator -= self.fixed_dt;
            ticks += 1;
        }
        ticks
    }

    /// One host frame: collect input, advance, draw.
    pub fn frame(&mut self, dt: f32, input: &mut dyn InputHandler, renderer: &mut dyn Renderer) -> u32 {
        for command in input.poll_commands() {
            self.enqueue(command);
        }
        let ticks = self.step(dt);
        renderer.draw(&self.render_items());
        ticks
    }

    /// Run exactly one fixed tick.
    pub fn tick(&mut self) {
        let dt = self.fixed_dt;
        self.store.world_mut().resource_mut::<SimClock>().advance(dt);

        if let Some(replicator) = self.replicator.as_mut() {
            replicator.accept();
            let now = self.store.world().resource::<SimClock>().time;
            for inbound in replicator.poll() {
                match inbound {
                    Inbound::Command { peer, command } => {
                        debug!(%peer, entity = %command.entity, kind = ?command.kind, "command received");
                        self.commands.push_back(command);
                    }
                    Inbound::Snapshot(records) => {
                        apply_snapshot(&mut self.store, &records, now);
                    }
                }
            }
        }

        self.apply_commands();
        self.schedule.run(self.store.world_mut());

        if let Some(ai) = self.ai.as_mut() {
            ai.run(&mut self.store);
        }

        if let Some(replicator) = self.replicator.as_mut() {
            if replicator.is_server() {
                replicator.broadcast_state(&snapshot_records(&self.store));
            } else {
                replicator.flush();
            }
        }
    }

    fn apply_commands(&mut self) {
        if self.commands.is_empty() {
            return;
        }
        if self.role == Role::Client {
            if let Some(replicator) = self.replicator.as_mut() {
                for command in self.commands.drain(..) {
                    replicator.send_command(command);
                }
            }
            return;
        }

        let mut orders = Orders::new(&mut self.store);
        for command in self.commands.drain(..) {
            if let Err(e) = orders.apply(&command) {
                debug!(entity = %command.entity, kind = ?command.kind, error = %e, "command ignored");
            }
        }
    }

    /// Get a snapshot of the current simulation state.
    pub fn snapshot(&self) -> WorldSnapshot {
        let clock = self.clock();
        WorldSnapshot::from_store(&self.store, clock.tick, clock.time)
    }

    /// Get snapshot as JSON string.
    pub fn snapshot_json(&self) -> Result<String, serde_json::Error> {
        self.snapshot().to_json()
    }

    pub fn render_items(&self) -> Vec<RenderItem> {
        render_items(&self.store)
    }

    fn clock(&self) -> SimClock {
        *self.store.world().resource::<SimClock>()
    }

    pub fn current_tick(&self) -> u64 {
        self.clock().tick
    }

    pub fn current_time(&self) -> f32 {
        self.clock().time
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn config(&self) -> &SimConfig {
        self.store.world().resource::<SimConfig>()
    }

    pub fn treasury(&self) -> &Treasury {
        self.store.world().resource::<Treasury>()
    }

    pub fn tile_map(&self) -> &TileMap {
        self.store.world().resource::<TileMap>()
    }

    pub fn spatial_grid(&self) -> &SpatialGrid {
        self.store.world().resource::<SpatialGrid>()
    }

    /// Address the server is listening on, if this is a networked server.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self.replicator.as_ref()? {
            Replicator::Server(server) => server.local_addr().ok(),
            Replicator::Client(_) => None,
        }
    }

    pub fn replicator(&self) -> Option<&Replicator> {
        self.replicator.as_ref()
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut EntityStore {
        &mut self.store
    }

    /// Replace the AI, or switch it off with `None`.
    pub fn set_ai(&mut self, ai: Option<AiController>) {
        self.ai = ai;
    }
}
