//! # RTS Node
//!
//! Headless host for the simulation core. Runs either the authoritative
//! server or a mirroring client at the configured tick rate.
//!
//! ## Usage
//!
//! ```bash
//! rts_node --role server --port 12345
//! rts_node --role client --host 127.0.0.1 --port 12345
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use rts_sim::{
    CommandRecord, InputHandler, RenderItem, Renderer, Role, SimConfig, SimulationLoop,
};
use tracing::{debug, info};
use tracing_subscriber::prelude::*;

/// Command-line options layered over the config file.
#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    role: Option<Role>,
    host: Option<String>,
    port: Option<u16>,
    map_width: Option<i32>,
    map_height: Option<i32>,
    tick_rate: Option<u32>,
    ticks: Option<u64>,
    dump_json: bool,
    help: bool,
}

impl Args {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut parsed = Args::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            let mut value = |name: &str| {
                args.next()
                    .with_context(|| format!("{name} needs a value"))
            };
            match arg.as_str() {
                "--config" | "-c" => parsed.config = Some(value("--config")?.into()),
                "--role" | "-r" => {
                    parsed.role = Some(match value("--role")?.as_str() {
                        "server" => Role::Server,
                        "client" => Role::Client,
                        other => bail!("unknown role '{other}', expected server or client"),
                    })
                }
                "--host" => parsed.host = Some(value("--host")?),
                "--port" | "-p" => parsed.port = Some(value("--port")?.parse().context("invalid --port")?),
                "--map-width" => {
                    parsed.map_width = Some(value("--map-width")?.parse().context("invalid --map-width")?)
                }
                "--map-height" => {
                    parsed.map_height = Some(value("--map-height")?.parse().context("invalid --map-height")?)
                }
                "--tick-rate" | "-t" => {
                    parsed.tick_rate = Some(value("--tick-rate")?.parse().context("invalid --tick-rate")?)
                }
                "--ticks" | "-n" => parsed.ticks = Some(value("--ticks")?.parse().context("invalid --ticks")?),
                "--dump-json" => parsed.dump_json = true,
                "--help" | "-h" => parsed.help = true,
                other => bail!("unknown argument '{other}' (try --help)"),
            }
        }
        Ok(parsed)
    }

    /// Config file (or defaults) with command-line overrides applied.
    fn into_config(self) -> Result<SimConfig> {
        let mut config = match &self.config {
            Some(path) => SimConfig::load(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => SimConfig::default(),
        };
        if let Some(role) = self.role {
            config.role = role;
        }
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(width) = self.map_width {
            config.map_width = width;
        }
        if let Some(height) = self.map_height {
            config.map_height = height;
        }
        if let Some(rate) = self.tick_rate {
            config.tick_rate_hz = rate;
        }
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

fn print_help() {
    println!("Usage: rts_node [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -c, --config <FILE>        TOML config file");
    println!("  -r, --role <ROLE>          server or client (default: server)");
    println!("      --host <HOST>          Address to bind or connect to (default: 127.0.0.1)");
    println!("  -p, --port <PORT>          TCP port (default: 12345)");
    println!("      --map-width <TILES>    Map width (default: 20)");
    println!("      --map-height <TILES>   Map height (default: 15)");
    println!("  -t, --tick-rate <HZ>       Simulation rate (default: 30)");
    println!("  -n, --ticks <N>            Stop after N ticks");
    println!("      --dump-json            Print the final world as JSON");
    println!("  -h, --help                 Show this help");
}

/// Logs a one-line summary of what would be drawn, once per second.
struct LogRenderer {
    frames: u64,
    every: u64,
}

impl Renderer for LogRenderer {
    fn draw(&mut self, items: &[RenderItem]) {
        self.frames += 1;
        if self.frames % self.every == 0 {
            let mut per_faction = [0usize; 3];
            for item in items {
                if let Some(slot) = per_faction.get_mut(item.faction_tag as usize) {
                    *slot += 1;
                }
            }
            debug!(
                frame = self.frames,
                terran = per_faction[0],
                zerg = per_faction[1],
                protoss = per_faction[2],
                "frame"
            );
        }
    }
}

/// No player at the keyboard.
struct IdleInput;

impl InputHandler for IdleInput {
    fn poll_commands(&mut self) -> Vec<CommandRecord> {
        Vec::new()
    }
}

fn main() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse(std::env::args().skip(1))?;
    if args.help {
        print_help();
        return Ok(());
    }
    let max_ticks = args.ticks;
    let dump_json = args.dump_json;
    let config = args.into_config()?;

    let role = config.role;
    let address = config.address();
    let tick_rate = config.tick_rate_hz;
    let mut sim = SimulationLoop::start(config)
        .with_context(|| format!("starting {role:?} on {address}"))?;
    if role == Role::Server {
        sim.spawn_default_world();
    }
    info!(?role, %address, tick_rate, "node running");

    let frame = Duration::from_secs_f64(1.0 / f64::from(tick_rate));
    let mut renderer = LogRenderer {
        frames: 0,
        every: u64::from(tick_rate),
    };
    let mut input = IdleInput;
    let start = Instant::now();
    let mut last = start;

    loop {
        if max_ticks.is_some_and(|max| sim.current_tick() >= max) {
            break;
        }
        let now = Instant::now();
        let dt = now.duration_since(last).as_secs_f32();
        last = now;
        sim.frame(dt, &mut input, &mut renderer);

        let elapsed = now.elapsed();
        if elapsed < frame {
            thread::sleep(frame - elapsed);
        }
    }

    info!(
        ticks = sim.current_tick(),
        uptime_secs = start.elapsed().as_secs_f64(),
        entities = sim.store().len(),
        "node stopped"
    );
    if dump_json {
        println!("{}", sim.snapshot_json().context("serializing world")?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<Args> {
        Args::parse(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_overrides_apply_on_defaults() {
        let config = args(&["--role", "client", "--port", "4000", "--tick-rate", "20"])
            .unwrap()
            .into_config()
            .unwrap();
        assert_eq!(config.role, Role::Client);
        assert_eq!(config.port, 4000);
        assert_eq!(config.tick_rate_hz, 20);
        assert_eq!(config.map_width, 20);
    }

    #[test]
    fn test_bad_arguments_are_errors() {
        assert!(args(&["--role", "observer"]).is_err());
        assert!(args(&["--port"]).is_err());
        assert!(args(&["--port", "abc"]).is_err());
        assert!(args(&["--bogus"]).is_err());
        assert!(args(&["--tick-rate", "0"]).unwrap().into_config().is_err());
    }

    #[test]
    fn test_flags() {
        let parsed = args(&["--dump-json", "-n", "90", "-h"]).unwrap();
        assert!(parsed.dump_json);
        assert!(parsed.help);
        assert_eq!(parsed.ticks, Some(90));
    }
}
