//! # Replicator
//!
//! Non-blocking TCP transport for the two replication roles.
//!
//! - The server accepts any number of clients, receives CMD frames from them
//!   and broadcasts a full STATE snapshot every tick.
//! - A client connects to one server, forwards CMD frames and receives STATE.
//!
//! No call here ever blocks a tick: every socket is non-blocking and
//! `WouldBlock` simply ends the current poll or flush.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};

use tracing::{debug, info, warn};

use super::protocol::{encode, CommandRecord, EntityRecord, FrameDecoder, Message};
use crate::config::SimConfig;
use crate::error::{NetError, ProtocolError};

/// Size of the stack buffer used per read call.
const READ_CHUNK: usize = 4096;

/// Per-connection limits.
#[derive(Debug, Clone, Copy)]
pub struct NetLimits {
    pub max_frame_bytes: usize,
    pub max_outbox_bytes: usize,
}

impl NetLimits {
    pub fn from_config(config: &SimConfig) -> Self {
        Self {
            max_frame_bytes: config.max_frame_bytes,
            max_outbox_bytes: config.max_outbox_bytes,
        }
    }
}

impl Default for NetLimits {
    fn default() -> Self {
        Self::from_config(&SimConfig::default())
    }
}

/// Transport statistics for one connection.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConnectionStats {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

/// A framed, buffered byte stream.
///
/// Outgoing frames are queued in an outbox and written as far as the socket
/// accepts; the rest waits for the next flush.
pub struct Connection<S> {
    stream: S,
    decoder: FrameDecoder,
    outbox: Vec<u8>,
    max_outbox_bytes: usize,
    stats: ConnectionStats,
}

impl<S: Read + Write> Connection<S> {
    pub fn new(stream: S, limits: NetLimits) -> Self {
        Self {
            stream,
            decoder: FrameDecoder::new(limits.max_frame_bytes),
            outbox: Vec::new(),
            max_outbox_bytes: limits.max_outbox_bytes,
            stats: ConnectionStats::default(),
        }
    }

    /// Queue an encoded frame. Fails if the peer is too far behind.
    pub fn queue(&mut self, frame: &[u8]) -> Result<(), NetError> {
        if self.outbox.len() + frame.len() > self.max_outbox_bytes {
            return Err(NetError::Backpressure(self.outbox.len()));
        }
        self.outbox.extend_from_slice(frame);
        self.stats.frames_sent += 1;
        Ok(())
    }

    /// Queue and immediately try to flush.
    pub fn send(&mut self, message: &Message) -> Result<(), NetError> {
        self.queue(&encode(message))?;
        self.flush()
    }

    /// Write as much of the outbox as the socket takes right now.
    pub fn flush(&mut self) -> Result<(), NetError> {
        let mut written = 0;
        let result = loop {
            if written == self.outbox.len() {
                break Ok(());
            }
            match self.stream.write(&self.outbox[written..]) {
                Ok(0) => break Err(NetError::PeerDisconnected),
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break Ok(()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => break Err(classify(e)),
            }
        };
        self.outbox.drain(..written);
        self.stats.bytes_sent += written as u64;
        result
    }

    /// Read everything available and decode complete frames into `out`.
    ///
    /// Frames that arrived before an end-of-stream are still delivered; the
    /// disconnect is reported afterwards.
    pub fn receive(&mut self, out: &mut Vec<Message>) -> Result<(), NetError> {
        let mut chunk = [0u8; READ_CHUNK];
        let mut closed = None;
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    closed = Some(NetError::PeerDisconnected);
                    break;
                }
                Ok(n) => {
                    self.stats.bytes_received += n as u64;
                    self.decoder.extend(&chunk[..n]);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    closed = Some(classify(e));
                    break;
                }
            }
        }
        while let Some(message) = self.decoder.next_message()? {
            self.stats.frames_received += 1;
            out.push(message);
        }
        match closed {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Bytes still waiting in the outbox.
    pub fn backlog(&self) -> usize {
        self.outbox.len()
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }
}

fn classify(e: io::Error) -> NetError {
    match e.kind() {
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => NetError::PeerDisconnected,
        _ => NetError::Io(e),
    }
}

/// Server-assigned peer number, stable for the lifetime of the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub u32);

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "peer{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerStatus {
    Online,
    Offline,
}

/// One accepted client.
pub struct Peer {
    pub id: PeerId,
    pub addr: SocketAddr,
    pub status: PeerStatus,
    connection: Option<Connection<TcpStream>>,
}

impl Peer {
    fn drop_connection(&mut self, err: &NetError) {
        match err {
            NetError::PeerDisconnected => info!(peer = %self.id, addr = %self.addr, "peer disconnected"),
            other => warn!(peer = %self.id, addr = %self.addr, error = %other, "dropping peer"),
        }
        self.connection = None;
        self.status = PeerStatus::Offline;
    }
}

/// Something that arrived over the network during a poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Command { peer: PeerId, command: CommandRecord },
    Snapshot(Vec<EntityRecord>),
}

// ============================================================================
// SERVER
// ============================================================================

/// Authoritative side: accepts clients, collects commands, broadcasts state.
pub struct Server {
    listener: TcpListener,
    peers: Vec<Peer>,
    next_peer: u32,
    limits: NetLimits,
}

impl Server {
    pub fn bind(addr: impl ToSocketAddrs, limits: NetLimits) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        info!(addr = %listener.local_addr()?, "server listening");
        Ok(Self {
            listener,
            peers: Vec::new(),
            next_peer: 0,
            limits,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept every pending connection. Returns how many were accepted.
    pub fn accept(&mut self) -> usize {
        let mut accepted = 0;
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    if let Err(e) = stream.set_nonblocking(true).and_then(|_| stream.set_nodelay(true)) {
                        warn!(%addr, error = %e, "failed to configure client socket");
                        continue;
                    }
                    let id = PeerId(self.next_peer);
                    self.next_peer += 1;
                    info!(peer = %id, %addr, "client connected");
                    self.peers.push(Peer {
                        id,
                        addr,
                        status: PeerStatus::Online,
                        connection: Some(Connection::new(stream, self.limits)),
                    });
                    accepted += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    break;
                }
            }
        }
        accepted
    }

    /// Drain commands from every online peer, in peer order then receipt order.
    ///
    /// Peers that went offline since the previous poll are forgotten first.
    pub fn poll(&mut self) -> Vec<Inbound> {
        self.peers.retain(|peer| peer.status == PeerStatus::Online);
        let mut inbound = Vec::new();
        let mut messages = Vec::new();
        for peer in &mut self.peers {
            let Some(connection) = peer.connection.as_mut() else {
                continue;
            };
            messages.clear();
            let result = connection.receive(&mut messages);
            let mut failure = result.err();
            for message in messages.drain(..) {
                match message {
                    Message::Command(command) => inbound.push(Inbound::Command {
                        peer: peer.id,
                        command,
                    }),
                    Message::State(_) => {
                        failure = Some(ProtocolError::UnexpectedMessage("STATE").into());
                        break;
                    }
                }
            }
            if let Some(err) = failure {
                peer.drop_connection(&err);
            }
        }
        inbound
    }

    /// Send one STATE frame to every online peer.
    pub fn broadcast_state(&mut self, records: &[EntityRecord]) {
        let frame = encode(&Message::State(records.to_vec()));
        for peer in &mut self.peers {
            let Some(connection) = peer.connection.as_mut() else {
                continue;
            };
            if let Err(err) = connection.queue(&frame).and_then(|_| connection.flush()) {
                peer.drop_connection(&err);
            }
        }
    }

    /// Retry writes left queued by an earlier broadcast.
    pub fn flush(&mut self) {
        for peer in &mut self.peers {
            let Some(connection) = peer.connection.as_mut() else {
                continue;
            };
            if let Err(err) = connection.flush() {
                peer.drop_connection(&err);
            }
        }
    }

    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }

    pub fn online_count(&self) -> usize {
        self.peers
            .iter()
            .filter(|p| p.status == PeerStatus::Online)
            .count()
    }
}

// ============================================================================
// CLIENT
// ============================================================================

/// Mirror side: forwards commands and receives snapshots.
pub struct Client<S = TcpStream> {
    addr: SocketAddr,
    connection: Option<Connection<S>>,
}

impl Client {
    /// Connect (blocking), then switch the socket to non-blocking.
    pub fn connect(addr: impl ToSocketAddrs, limits: NetLimits) -> io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        let addr = stream.peer_addr()?;
        info!(%addr, "connected to server");
        Ok(Self::from_connection(addr, Connection::new(stream, limits)))
    }
}

impl<S: Read + Write> Client<S> {
    pub(crate) fn from_connection(addr: SocketAddr, connection: Connection<S>) -> Self {
        Self {
            addr,
            connection: Some(connection),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Drain snapshots from the server.
    pub fn poll(&mut self) -> Vec<Inbound> {
        let Some(connection) = self.connection.as_mut() else {
            return Vec::new();
        };
        let mut messages = Vec::new();
        let mut failure = connection.receive(&mut messages).err();
        let mut inbound = Vec::with_capacity(messages.len());
        for message in messages {
            match message {
                Message::State(records) => inbound.push(Inbound::Snapshot(records)),
                Message::Command(_) => {
                    failure = Some(ProtocolError::UnexpectedMessage("CMD").into());
                    break;
                }
            }
        }
        if let Some(err) = failure {
            self.disconnect(&err);
        }
        inbound
    }

    /// Forward one command to the server.
    pub fn send_command(&mut self, command: CommandRecord) {
        let Some(connection) = self.connection.as_mut() else {
            debug!(entity = %command.entity, "not connected, command dropped");
            return;
        };
        if let Err(err) = connection.send(&Message::Command(command)) {
            self.disconnect(&err);
        }
    }

    /// Retry writing anything still queued.
    pub fn flush(&mut self) {
        if let Some(connection) = self.connection.as_mut() {
            if let Err(err) = connection.flush() {
                self.disconnect(&err);
            }
        }
    }

    /// Command bytes the socket has not taken yet.
    pub fn backlog(&self) -> usize {
        self.connection.as_ref().map_or(0, Connection::backlog)
    }

    fn disconnect(&mut self, err: &NetError) {
        match err {
            NetError::PeerDisconnected => info!(addr = %self.addr, "server disconnected"),
            other => warn!(addr = %self.addr, error = %other, "dropping server connection"),
        }
        self.connection = None;
    }
}

// ============================================================================
// ROLE
// ============================================================================

/// The network side of one process.
pub enum Replicator {
    Server(Server),
    Client(Client),
}

impl Replicator {
    pub fn accept(&mut self) {
        if let Replicator::Server(server) = self {
            server.accept();
        }
    }

    pub fn poll(&mut self) -> Vec<Inbound> {
        match self {
            Replicator::Server(server) => server.poll(),
            Replicator::Client(client) => client.poll(),
        }
    }

    /// Server only; a client never broadcasts.
    pub fn broadcast_state(&mut self, records: &[EntityRecord]) {
        if let Replicator::Server(server) = self {
            server.broadcast_state(records);
        }
    }

    /// Client only; the server queues its own commands locally.
    pub fn send_command(&mut self, command: CommandRecord) {
        if let Replicator::Client(client) = self {
            client.send_command(command);
        }
    }

    /// Push out whatever earlier writes left queued.
    pub fn flush(&mut self) {
        match self {
            Replicator::Server(server) => server.flush(),
            Replicator::Client(client) => client.flush(),
        }
    }

    pub fn is_server(&self) -> bool {
        matches!(self, Replicator::Server(_))
    }

    /// A server is always up; a client until it loses the server.
    pub fn is_connected(&self) -> bool {
        match self {
            Replicator::Server(_) => true,
            Replicator::Client(client) => client.is_connected(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Faction, KindTag, SimId, Tile};
    use crate::net::protocol::CommandKind;
    use std::thread;
    use std::time::Duration;

    /// A socket whose send buffer is always full.
    struct Stalled;

    impl Read for Stalled {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::ErrorKind::WouldBlock.into())
        }
    }

    impl Write for Stalled {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::WouldBlock.into())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// A socket the peer already closed, with some bytes left to read.
    struct Closing(io::Cursor<Vec<u8>>);

    impl Read for Closing {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.0.read(buf)
        }
    }

    impl Write for Closing {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Ok(0)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// A socket that takes `chunk` bytes, then reports a full buffer once.
    struct Trickle {
        accepted: Vec<u8>,
        chunk: usize,
        blocked: bool,
    }

    impl Read for Trickle {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::ErrorKind::WouldBlock.into())
        }
    }

    impl Write for Trickle {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.blocked {
                self.blocked = false;
                return Err(io::ErrorKind::WouldBlock.into());
            }
            self.blocked = true;
            let n = buf.len().min(self.chunk);
            self.accepted.extend_from_slice(&buf[..n]);
            Ok(n)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn record(id: u32) -> EntityRecord {
        EntityRecord {
            id: SimId(id),
            tile: Tile::new(id as i32, 1),
            faction: Faction::Terran,
            kind: KindTag::Worker,
        }
    }

    fn retry<T>(mut f: impl FnMut() -> Option<T>) -> Option<T> {
        for _ in 0..200 {
            if let Some(value) = f() {
                return Some(value);
            }
            thread::sleep(Duration::from_millis(5));
        }
        None
    }

    #[test]
    fn test_backpressure_when_peer_stalls() {
        let limits = NetLimits {
            max_frame_bytes: 1024,
            max_outbox_bytes: 64,
        };
        let mut connection = Connection::new(Stalled, limits);
        let frame = encode(&Message::State(vec![record(1), record(2)]));
        assert_eq!(frame.len(), 33);

        connection.queue(&frame).unwrap();
        connection.flush().unwrap();
        assert_eq!(connection.backlog(), 33);
        assert!(matches!(connection.queue(&frame), Err(NetError::Backpressure(33))));
    }

    #[test]
    fn test_frames_before_eof_are_delivered() {
        let mut bytes = encode(&Message::State(vec![record(4)]));
        bytes.extend_from_slice(&[0, 0]);
        let mut connection = Connection::new(Closing(io::Cursor::new(bytes)), NetLimits::default());

        let mut out = Vec::new();
        let result = connection.receive(&mut out);
        assert!(matches!(result, Err(NetError::PeerDisconnected)));
        assert_eq!(out, vec![Message::State(vec![record(4)])]);
        assert!(matches!(connection.flush(), Ok(())));
    }

    #[test]
    fn test_loopback_command_and_state() {
        let mut server = Server::bind("127.0.0.1:0", NetLimits::default()).unwrap();
        let addr = server.local_addr().unwrap();
        let mut client = Client::connect(addr, NetLimits::default()).unwrap();

        assert!(retry(|| (server.accept() > 0).then_some(())).is_some());
        assert_eq!(server.online_count(), 1);

        let command = CommandRecord::new(CommandKind::Move, SimId(3), Tile::new(2, 2)).at(17);
        client.send_command(command);
        let got = retry(|| {
            let inbound = server.poll();
            (!inbound.is_empty()).then_some(inbound)
        })
        .unwrap();
        assert_eq!(
            got,
            vec![Inbound::Command {
                peer: PeerId(0),
                command
            }]
        );

        server.broadcast_state(&[record(1), record(2)]);
        let got = retry(|| {
            let inbound = client.poll();
            (!inbound.is_empty()).then_some(inbound)
        })
        .unwrap();
        assert_eq!(got, vec![Inbound::Snapshot(vec![record(1), record(2)])]);
    }

    #[test]
    fn test_malformed_frame_drops_only_that_peer() {
        let mut server = Server::bind("127.0.0.1:0", NetLimits::default()).unwrap();
        let addr = server.local_addr().unwrap();
        let mut rogue = TcpStream::connect(addr).unwrap();
        let _good = Client::connect(addr, NetLimits::default()).unwrap();
        assert!(retry(|| {
            server.accept();
            (server.peers().len() == 2).then_some(())
        })
        .is_some());

        rogue.write_all(&[0, 0, 0, 1, 42]).unwrap();
        let dropped = retry(|| {
            server.poll();
            (server.online_count() == 1).then_some(())
        });
        assert!(dropped.is_some());
        assert_eq!(server.peers()[0].status, PeerStatus::Offline);
        assert_eq!(server.peers()[1].status, PeerStatus::Online);

        server.poll();
        assert_eq!(server.peers().len(), 1);
        assert_eq!(server.peers()[0].id, PeerId(1));
    }

    #[test]
    fn test_client_flush_finishes_a_partial_command() {
        let stream = Trickle {
            accepted: Vec::new(),
            chunk: 8,
            blocked: false,
        };
        let addr: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let mut client = Client::from_connection(addr, Connection::new(stream, NetLimits::default()));
        let command = CommandRecord::new(CommandKind::Move, SimId(2), Tile::new(2, 2));
        let frame = encode(&Message::Command(command));

        client.send_command(command);
        assert_eq!(client.backlog(), frame.len() - 8);

        client.flush();
        client.flush();
        assert_eq!(client.backlog(), 0);
        assert!(client.is_connected());
        let connection = client.connection.as_ref().unwrap();
        assert_eq!(connection.get_ref().accepted, frame);
    }

    #[test]
    fn test_client_sees_server_shutdown() {
        let mut server = Server::bind("127.0.0.1:0", NetLimits::default()).unwrap();
        let mut client = Client::connect(server.local_addr().unwrap(), NetLimits::default()).unwrap();
        assert!(retry(|| (server.accept() > 0).then_some(())).is_some());
        drop(server);

        let gone = retry(|| {
            client.poll();
            (!client.is_connected()).then_some(())
        });
        assert!(gone.is_some());
        client.send_command(CommandRecord::new(CommandKind::Move, SimId(0), Tile::new(0, 0)));
    }
}
