//! Error taxonomy for the simulation core.
//!
//! Nothing here is process-fatal except [`SimError::Allocation`]; every other
//! error is handled where it happens and logged.

use crate::components::{SimId, Tile};
use thiserror::Error;

/// Malformed or unexpected frame on a connection. The connection is dropped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },
    #[error("empty frame payload")]
    EmptyPayload,
    #[error("unknown message tag {0}")]
    UnknownTag(u8),
    #[error("payload of {len} bytes is not a whole number of {record} byte records")]
    BadLength { len: usize, record: usize },
    #[error("unknown faction tag {0}")]
    BadFaction(u8),
    #[error("unknown kind tag {0}")]
    BadKind(u8),
    #[error("unknown command kind {0}")]
    BadCommand(u8),
    #[error("{0} message is not valid in this direction")]
    UnexpectedMessage(&'static str),
}

/// Connection-level failures. None of them stop the simulation.
#[derive(Debug, Error)]
pub enum NetError {
    #[error("peer disconnected")]
    PeerDisconnected,
    #[error("peer send queue over {0} bytes")]
    Backpressure(usize),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why an order (command or AI action) was a no-op.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrderError {
    #[error("unknown entity {0}")]
    UnknownEntity(SimId),
    #[error("entity {0} cannot move")]
    NotMobile(SimId),
    #[error("entity {0} cannot attack")]
    NotArmed(SimId),
    #[error("entity {0} is not a worker")]
    NotAWorker(SimId),
    #[error("entity {0} cannot produce")]
    CannotProduce(SimId),
    #[error("no path from {from} to {to}")]
    NoPath { from: Tile, to: Tile },
    #[error("faction has {available} minerals, needs {cost}")]
    InsufficientMinerals { available: i32, cost: i32 },
    #[error("no free tile next to entity {0}")]
    NoFreeTile(SimId),
    #[error("no enemy at {0}")]
    NoTarget(Tile),
    #[error("tile {0} is outside the map")]
    OutOfBounds(Tile),
}

/// Configuration could not be loaded or is inconsistent.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Errors surfaced while building or running the simulation.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("spatial grid allocation of {cells} cells failed: {source}")]
    Allocation {
        cells: usize,
        #[source]
        source: std::collections::TryReserveError,
    },
    #[error("entity id {0} already exists")]
    DuplicateId(SimId),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("network setup failed: {0}")]
    Net(#[from] std::io::Error),
}
