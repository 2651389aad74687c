//! Simulation and network configuration.
//!
//! Loaded once at startup from TOML; every field has a default so an empty
//! file is a valid config. The host binary layers command-line overrides on
//! top before calling [`SimConfig::validate`].

use crate::components::Faction;
use crate::error::ConfigError;
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which side of the replication protocol this process plays.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Authoritative simulation, broadcasts STATE every tick.
    #[default]
    Server,
    /// Pure mirror of a server, forwards commands.
    Client,
}

/// Tuning for the scripted AI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// Chance per tick that an idle worker is sent to gather.
    pub gather_chance: f64,
    /// Chance per tick that an armed unit picks a target in range.
    pub attack_chance: f64,
    /// Factions driven by the AI on the server.
    pub factions: Vec<Faction>,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            gather_chance: 0.10,
            attack_chance: 0.05,
            factions: vec![Faction::Zerg],
        }
    }
}

/// Configuration for the simulation and its network role.
#[derive(Resource, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub role: Role,
    pub host: String,
    pub port: u16,
    /// Map width in tiles.
    pub map_width: i32,
    /// Map height in tiles.
    pub map_height: i32,
    /// Fixed simulation rate, independent of the frame rate.
    pub tick_rate_hz: u32,
    /// Seed for map generation and the AI.
    pub seed: u64,
    /// Lower bound for spatial grid cell size, in tiles.
    pub min_cell_size: i32,
    /// Seconds a unit takes to cross one tile.
    pub move_window_secs: f32,
    /// Resource health removed per tick by one gathering worker.
    pub harvest_per_tick: i32,
    /// Cargo a worker carries before it must return.
    pub worker_capacity: i32,
    /// Mineral cost of a PRODUCE command.
    pub production_cost: i32,
    pub starting_minerals: i32,
    /// Largest accepted frame payload.
    pub max_frame_bytes: usize,
    /// Unsent bytes queued for one peer before it is dropped.
    pub max_outbox_bytes: usize,
    pub ai: AiConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            role: Role::Server,
            host: "127.0.0.1".to_string(),
            port: 12345,
            map_width: 20,
            map_height: 15,
            tick_rate_hz: 30,
            seed: 0x5eed,
            min_cell_size: 2,
            move_window_secs: 0.25,
            harvest_per_tick: 8,
            worker_capacity: 40,
            production_cost: 50,
            starting_minerals: 50,
            max_frame_bytes: 1 << 20,
            max_outbox_bytes: 4 << 20,
            ai: AiConfig::default(),
        }
    }
}

impl SimConfig {
    /// Parse a TOML document. Missing keys fall back to defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Reject settings the simulation cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.map_width <= 0 || self.map_height <= 0 {
            return Err(ConfigError::Invalid(format!(
                "map must be at least 1x1, got {}x{}",
                self.map_width, self.map_height
            )));
        }
        if self.tick_rate_hz == 0 {
            return Err(ConfigError::Invalid("tick_rate_hz must be positive".into()));
        }
        if self.min_cell_size <= 0 {
            return Err(ConfigError::Invalid("min_cell_size must be positive".into()));
        }
        if !(self.move_window_secs > 0.0) {
            return Err(ConfigError::Invalid("move_window_secs must be positive".into()));
        }
        for (name, chance) in [
            ("ai.gather_chance", self.ai.gather_chance),
            ("ai.attack_chance", self.ai.attack_chance),
        ] {
            if !(0.0..=1.0).contains(&chance) {
                return Err(ConfigError::Invalid(format!("{name} must be within 0..=1")));
            }
        }
        if self.max_frame_bytes == 0 {
            return Err(ConfigError::Invalid("max_frame_bytes must be positive".into()));
        }
        Ok(())
    }

    /// Fixed timestep in seconds.
    pub fn fixed_timestep(&self) -> f32 {
        1.0 / self.tick_rate_hz as f32
    }

    /// `host:port` for binding or connecting.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_is_default() {
        let config = SimConfig::from_toml_str("").unwrap();
        assert_eq!(config.role, Role::Server);
        assert_eq!(config.map_width, 20);
        assert_eq!(config.map_height, 15);
        assert_eq!(config.ai.factions, vec![Faction::Zerg]);
    }

    #[test]
    fn test_toml_overrides() {
        let config = SimConfig::from_toml_str(
            r#"
            role = "client"
            host = "10.0.0.2"
            port = 4000
            map_width = 64
            map_height = 48
            tick_rate_hz = 20

            [ai]
            factions = ["zerg", "protoss"]
            "#,
        )
        .unwrap();
        assert_eq!(config.role, Role::Client);
        assert_eq!(config.address(), "10.0.0.2:4000");
        assert_eq!(config.map_width, 64);
        assert!((config.fixed_timestep() - 0.05).abs() < 1e-6);
        assert_eq!(config.ai.factions, vec![Faction::Zerg, Faction::Protoss]);
        assert!((config.ai.gather_chance - 0.10).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(SimConfig::from_toml_str("tick_rate_hz = 0").is_err());
        assert!(SimConfig::from_toml_str("map_width = -3").is_err());
        assert!(SimConfig::from_toml_str("[ai]\ngather_chance = 1.5").is_err());
        assert!(SimConfig::from_toml_str("role = \"observer\"").is_err());
    }
}
