//! State replication between one server and any number of clients.

pub mod mirror;
pub mod protocol;
pub mod replicator;

pub use mirror::{apply_snapshot, snapshot_records, SnapshotDelta};
pub use protocol::{CommandKind, CommandRecord, EntityRecord, FrameDecoder, Message};
pub use replicator::{Client, Connection, Inbound, NetLimits, PeerId, PeerStatus, Replicator, Server};
