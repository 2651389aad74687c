//! # Wire Protocol
//!
//! Every frame is a `u32` big-endian payload length followed by the payload.
//! The first payload byte is the message tag:
//!
//! | Tag | Message | Body |
//! |-----|---------|------|
//! | 0 | STATE | N x `id:u32 x:i32 y:i32 faction:u8 kind:u8` (14 bytes each) |
//! | 1 | CMD | `timestamp:u32 kind:u8 entity:u32 x:i32 y:i32` (17 bytes) |
//!
//! All integers are big-endian.

use crate::components::{Faction, KindTag, SimId, Tile};
use crate::error::ProtocolError;

/// Length prefix size.
pub const HEADER_BYTES: usize = 4;
pub const TAG_STATE: u8 = 0;
pub const TAG_COMMAND: u8 = 1;
/// Size of one STATE record.
pub const STATE_RECORD_BYTES: usize = 14;
/// Size of the CMD body.
pub const COMMAND_BYTES: usize = 17;

/// One entity as seen in a STATE snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityRecord {
    pub id: SimId,
    pub tile: Tile,
    pub faction: Faction,
    pub kind: KindTag,
}

/// Command verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Move,
    Produce,
    Attack,
}

impl CommandKind {
    pub fn to_u8(self) -> u8 {
        match self {
            CommandKind::Move => 0,
            CommandKind::Produce => 1,
            CommandKind::Attack => 2,
        }
    }

    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(CommandKind::Move),
            1 => Some(CommandKind::Produce),
            2 => Some(CommandKind::Attack),
            _ => None,
        }
    }
}

/// An order for one entity, from a player, a client, or the AI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandRecord {
    /// Sender-side timestamp. Informational only.
    pub timestamp: u32,
    pub kind: CommandKind,
    pub entity: SimId,
    pub target: Tile,
}

impl CommandRecord {
    pub fn new(kind: CommandKind, entity: SimId, target: Tile) -> Self {
        Self {
            timestamp: 0,
            kind,
            entity,
            target,
        }
    }

    pub fn at(mut self, timestamp: u32) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    State(Vec<EntityRecord>),
    Command(CommandRecord),
}

impl Message {
    pub fn name(&self) -> &'static str {
        match self {
            Message::State(_) => "STATE",
            Message::Command(_) => "CMD",
        }
    }
}

// ============================================================================
// ENCODING
// ============================================================================

/// Encode a message as a complete frame, length prefix included.
pub fn encode(message: &Message) -> Vec<u8> {
    let body_len = match message {
        Message::State(records) => records.len() * STATE_RECORD_BYTES,
        Message::Command(_) => COMMAND_BYTES,
    };
    let payload_len = 1 + body_len;
    let mut out = Vec::with_capacity(HEADER_BYTES + payload_len);
    out.extend_from_slice(&(payload_len as u32).to_be_bytes());

    match message {
        Message::State(records) => {
            out.push(TAG_STATE);
            for record in records {
                out.extend_from_slice(&record.id.0.to_be_bytes());
                out.extend_from_slice(&record.tile.x.to_be_bytes());
                out.extend_from_slice(&record.tile.y.to_be_bytes());
                out.push(record.faction.tag());
                out.push(record.kind.to_u8());
            }
        }
        Message::Command(command) => {
            out.push(TAG_COMMAND);
            out.extend_from_slice(&command.timestamp.to_be_bytes());
            out.push(command.kind.to_u8());
            out.extend_from_slice(&command.entity.0.to_be_bytes());
            out.extend_from_slice(&command.target.x.to_be_bytes());
            out.extend_from_slice(&command.target.y.to_be_bytes());
        }
    }
    out
}

// ============================================================================
// DECODING
// ============================================================================

/// Big-endian cursor over a payload whose length was already checked.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(&self.data[self.pos..self.pos + N]);
        self.pos += N;
        bytes
    }

    fn u8(&mut self) -> u8 {
        self.take::<1>()[0]
    }

    fn u32(&mut self) -> u32 {
        u32::from_be_bytes(self.take())
    }

    fn i32(&mut self) -> i32 {
        i32::from_be_bytes(self.take())
    }
}

/// Decode one payload (tag byte onward, no length prefix).
pub fn decode_payload(payload: &[u8]) -> Result<Message, ProtocolError> {
    let (&tag, body) = payload.split_first().ok_or(ProtocolError::EmptyPayload)?;
    match tag {
        TAG_STATE => {
            if body.len() % STATE_RECORD_BYTES != 0 {
                return Err(ProtocolError::BadLength {
                    len: body.len(),
                    record: STATE_RECORD_BYTES,
                });
            }
            let mut reader = Reader::new(body);
            let mut records = Vec::with_capacity(body.len() / STATE_RECORD_BYTES);
            for _ in 0..body.len() / STATE_RECORD_BYTES {
                let id = SimId(reader.u32());
                let tile = Tile::new(reader.i32(), reader.i32());
                let faction_tag = reader.u8();
                let kind_tag = reader.u8();
                records.push(EntityRecord {
                    id,
                    tile,
                    faction: Faction::from_tag(faction_tag)
                        .ok_or(ProtocolError::BadFaction(faction_tag))?,
                    kind: KindTag::from_u8(kind_tag).ok_or(ProtocolError::BadKind(kind_tag))?,
                });
            }
            Ok(Message::State(records))
        }
        TAG_COMMAND => {
            if body.len() != COMMAND_BYTES {
                return Err(ProtocolError::BadLength {
                    len: body.len(),
                    record: COMMAND_BYTES,
                });
            }
            let mut reader = Reader::new(body);
            let timestamp = reader.u32();
            let kind_tag = reader.u8();
            let kind = CommandKind::from_u8(kind_tag).ok_or(ProtocolError::BadCommand(kind_tag))?;
            let entity = SimId(reader.u32());
            let target = Tile::new(reader.i32(), reader.i32());
            Ok(Message::Command(CommandRecord {
                timestamp,
                kind,
                entity,
                target,
            }))
        }
        other => Err(ProtocolError::UnknownTag(other)),
    }
}

/// Reassembles frames from an arbitrarily chunked byte stream.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    max_frame_bytes: usize,
}

impl FrameDecoder {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_frame_bytes,
        }
    }

    /// Append received bytes.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Bytes received but not yet consumed.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Pop the next complete message, `Ok(None)` if more bytes are needed.
    ///
    /// An oversized length prefix is rejected before its payload arrives.
    pub fn next_message(&mut self) -> Result<Option<Message>, ProtocolError> {
        if self.buffer.len() < HEADER_BYTES {
            return Ok(None);
        }
        let mut header = [0u8; HEADER_BYTES];
        header.copy_from_slice(&self.buffer[..HEADER_BYTES]);
        let len = u32::from_be_bytes(header) as usize;
        if len > self.max_frame_bytes {
            return Err(ProtocolError::FrameTooLarge {
                len,
                max: self.max_frame_bytes,
            });
        }
        if self.buffer.len() < HEADER_BYTES + len {
            return Ok(None);
        }
        let message = decode_payload(&self.buffer[HEADER_BYTES..HEADER_BYTES + len]);
        self.buffer.drain(..HEADER_BYTES + len);
        message.map(Some)
    }
}
