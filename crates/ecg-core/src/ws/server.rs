//! WebSocket socket server
//!
//! The server owns the connection registry and drives every connection from a
//! single non-blocking [`SocketServer::tick`]. Each tick accepts pending
//! streams, pulls whatever bytes arrived, advances the handshake or decodes
//! frames, flushes outbound queues and finally removes peers that are gone.
//!
//! Nothing here waits. A peer that cannot keep up loses frames; a peer whose
//! transport fails is removed on the following tick.

use core::net::SocketAddr;

use heapless::Vec;
use log::{debug, info, trace, warn};

use super::event::{ClientId, EventHandler, ServerEvent};
use super::frame::{self, CloseCode, FrameError, FrameHeader, Opcode};
use super::handshake::{self, HandshakeError};
use super::transport::{ConnHandle, Transport};
use crate::config::ServerConfig;

/// Registry capacity. Further connections are closed as soon as they arrive.
pub const MAX_CLIENTS: usize = 4;

/// Bytes buffered from a peer before they are parsed.
pub const RX_BUFFER_LEN: usize = 1024;

/// Outbound bytes queued per peer.
pub const TX_BUFFER_LEN: usize = 256;

/// Largest fragmented text message that can be reassembled.
pub const MESSAGE_BUFFER_LEN: usize = 256;

const READ_CHUNK_LEN: usize = 256;

/// Receive buffer refills per connection per tick. Input beyond this waits
/// for the next tick so one busy peer cannot stall the others.
const MAX_READ_ROUNDS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Waiting for a complete upgrade request.
    Handshake,
    Open,
    /// Removed at the end of the tick once the outbound queue was flushed.
    Closing,
}

/// Registry entry as seen from outside the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientInfo {
    pub id: ClientId,
    pub remote: SocketAddr,
    /// Handshake completed; the peer receives broadcasts.
    pub active: bool,
}

/// Per-peer protocol state that frame handling mutates.
#[derive(Debug, Default)]
struct Session {
    tx: Vec<u8, TX_BUFFER_LEN>,
    message: Vec<u8, MESSAGE_BUFFER_LEN>,
    /// Opcode of the fragmented message in progress.
    fragment: Option<Opcode>,
    dropped_frames: u32,
}

#[derive(Debug)]
struct Connection {
    id: ClientId,
    handle: ConnHandle,
    remote: SocketAddr,
    phase: Phase,
    /// `Connected` was emitted, so `Disconnected` must follow.
    announced: bool,
    hung_up: bool,
    rx: Vec<u8, RX_BUFFER_LEN>,
    session: Session,
}

impl Connection {
    fn new(id: ClientId, handle: ConnHandle, remote: SocketAddr) -> Self {
        Self {
            id,
            handle,
            remote,
            phase: Phase::Handshake,
            announced: false,
            hung_up: false,
            rx: Vec::new(),
            session: Session::default(),
        }
    }

    fn info(&self) -> ClientInfo {
        ClientInfo {
            id: self.id,
            remote: self.remote,
            active: self.phase == Phase::Open,
        }
    }

    /// Queue a close frame and stop processing input.
    fn fail(&mut self, error: FrameError) {
        warn!("[{}] Protocol error: {}", self.id, error);
        self.close_with(error.close_code());
    }

    fn close_with(&mut self, code: CloseCode) {
        enqueue_frame(&mut self.session, self.id, Opcode::Close, &code.to_payload());
        self.rx.clear();
        self.phase = Phase::Closing;
    }
}

enum Flow {
    Continue,
    /// The peer sent a close frame and it was echoed.
    Closed,
}

/// WebSocket server over a non-blocking [`Transport`].
pub struct SocketServer<T, H> {
    transport: T,
    handler: H,
    port: u16,
    connections: Vec<Connection, MAX_CLIENTS>,
    next_id: u32,
}

impl<T, H> SocketServer<T, H>
where
    T: Transport,
    H: EventHandler,
{
    pub fn new(transport: T, handler: H, config: &ServerConfig) -> Self {
        info!("WebSocket server listening on port {}", config.port);
        Self {
            transport,
            handler,
            port: config.port,
            connections: Vec::new(),
            next_id: 0,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Advance accept, read and write state for every connection.
    ///
    /// Events are delivered to the handler before this returns.
    pub fn tick(&mut self) {
        self.accept_pending();

        for conn in self.connections.iter_mut() {
            if conn.phase == Phase::Closing {
                continue;
            }
            service(conn, &mut self.transport, &mut self.handler);
        }

        self.reap();
    }

    /// Queue `text` as one text frame for every active peer.
    ///
    /// Returns how many peers the frame was queued for. Peers whose queue is
    /// full skip this frame.
    pub fn broadcast_text(&mut self, text: &str) -> usize {
        let mut header = [0u8; frame::MAX_SERVER_HEADER_LEN];
        let header_len = frame::encode_header(Opcode::Text, text.len(), &mut header);

        let mut queued = 0;
        for conn in self.connections.iter_mut() {
            if conn.phase != Phase::Open {
                continue;
            }
            if enqueue(
                &mut conn.session,
                conn.id,
                &[&header[..header_len], text.as_bytes()],
            ) {
                queued += 1;
            }
            flush(conn, &mut self.transport);
        }
        queued
    }

    /// Queue a text frame for one active peer.
    pub fn send_text(&mut self, id: ClientId, text: &str) -> bool {
        let Some(conn) = self
            .connections
            .iter_mut()
            .find(|conn| conn.id == id && conn.phase == Phase::Open)
        else {
            return false;
        };

        let queued = enqueue_frame(&mut conn.session, conn.id, Opcode::Text, text.as_bytes());
        flush(conn, &mut self.transport);
        queued
    }

    /// Send a normal close to a peer. It is removed on the next tick.
    pub fn disconnect(&mut self, id: ClientId) -> bool {
        let Some(conn) = self
            .connections
            .iter_mut()
            .find(|conn| conn.id == id && conn.phase != Phase::Closing)
        else {
            return false;
        };

        if conn.phase == Phase::Open {
            conn.close_with(CloseCode::Normal);
        } else {
            conn.phase = Phase::Closing;
        }
        flush(conn, &mut self.transport);
        true
    }

    pub fn clients(&self) -> impl Iterator<Item = ClientInfo> + '_ {
        self.connections.iter().map(Connection::info)
    }

    /// Peers that completed the handshake and receive broadcasts.
    pub fn active_count(&self) -> usize {
        self.connections
            .iter()
            .filter(|conn| conn.phase == Phase::Open)
            .count()
    }

    pub fn remote_addr(&self, id: ClientId) -> Option<SocketAddr> {
        self.find(id).map(|conn| conn.remote)
    }

    /// Frames skipped for a peer because its queue was full.
    pub fn dropped_frames(&self, id: ClientId) -> Option<u32> {
        self.find(id).map(|conn| conn.session.dropped_frames)
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn find(&self, id: ClientId) -> Option<&Connection> {
        self.connections.iter().find(|conn| conn.id == id)
    }

    fn accept_pending(&mut self) {
        while let Some((handle, remote)) = self.transport.poll_accept() {
            if self.connections.is_full() {
                warn!(
                    "Rejecting {}: all {} client slots are in use",
                    remote, MAX_CLIENTS
                );
                self.transport.close(handle);
                continue;
            }

            let id = ClientId(self.next_id);
            self.next_id = self.next_id.wrapping_add(1);
            debug!("[{}] TCP connection from {}", id, remote);

            if self.connections.push(Connection::new(id, handle, remote)).is_err() {
                self.transport.close(handle);
            }
        }
    }

    /// Drop closing connections, emitting `Disconnected` for announced ones.
    fn reap(&mut self) {
        let transport = &mut self.transport;
        let handler = &mut self.handler;

        self.connections.retain(|conn| {
            if conn.phase != Phase::Closing {
                return true;
            }
            transport.close(conn.handle);
            if conn.announced {
                handler.on_event(ServerEvent::Disconnected { id: conn.id });
            } else {
                debug!("[{}] Dropped before the handshake completed", conn.id);
            }
            false
        });
    }
}

/// One tick's worth of work for a live connection.
fn service<T, H>(conn: &mut Connection, transport: &mut T, handler: &mut H)
where
    T: Transport,
    H: EventHandler,
{
    for _ in 0..MAX_READ_ROUNDS {
        let read = pull(conn, transport);

        match conn.phase {
            Phase::Handshake => advance_handshake(conn, handler),
            Phase::Open => advance_frames(conn, handler),
            Phase::Closing => {}
        }

        if read == 0 || conn.phase == Phase::Closing {
            break;
        }
    }

    flush(conn, transport);

    if conn.hung_up {
        conn.phase = Phase::Closing;
    }
}

/// Move pending bytes into the receive buffer. Returns how many were read.
fn pull<T: Transport>(conn: &mut Connection, transport: &mut T) -> usize {
    let mut chunk = [0u8; READ_CHUNK_LEN];
    let mut total = 0;

    while !conn.hung_up {
        let room = (conn.rx.capacity() - conn.rx.len()).min(READ_CHUNK_LEN);
        if room == 0 {
            break;
        }

        match transport.read(conn.handle, &mut chunk[..room]) {
            Ok(0) => break,
            Ok(n) => {
                let _ = conn.rx.extend_from_slice(&chunk[..n]);
                total += n;
            }
            Err(e) => {
                debug!("[{}] Read ended: {}", conn.id, e);
                conn.hung_up = true;
            }
        }
    }

    total
}

fn advance_handshake<H: EventHandler>(conn: &mut Connection, handler: &mut H) {
    let Some(end) = handshake::find_request_end(&conn.rx) else {
        if conn.rx.is_full() {
            reject(conn, HandshakeError::TooLarge(RX_BUFFER_LEN));
        }
        return;
    };

    let accept = match handshake::parse_upgrade_request(&conn.rx[..end]) {
        Ok(request) => {
            debug!("[{}] Upgrade request for {}", conn.id, request.path);
            handshake::accept_key(request.key)
        }
        Err(e) => {
            reject(conn, e);
            return;
        }
    };

    let response = handshake::switching_protocols(&accept);
    if !enqueue(&mut conn.session, conn.id, &[response.as_bytes()]) {
        conn.phase = Phase::Closing;
        return;
    }

    drain_front(&mut conn.rx, end);
    conn.phase = Phase::Open;
    conn.announced = true;
    handler.on_event(ServerEvent::Connected {
        id: conn.id,
        remote: conn.remote,
    });
}

fn reject(conn: &mut Connection, error: HandshakeError) {
    warn!("[{}] Rejected upgrade from {}: {}", conn.id, conn.remote, error);
    enqueue(&mut conn.session, conn.id, &[error.rejection()]);
    conn.rx.clear();
    conn.phase = Phase::Closing;
}

/// Decode and handle every complete frame in the receive buffer.
fn advance_frames<H: EventHandler>(conn: &mut Connection, handler: &mut H) {
    while conn.phase == Phase::Open {
        let header = match frame::decode_header(&conn.rx) {
            Ok(Some(header)) => header,
            Ok(None) => break,
            Err(e) => return conn.fail(e),
        };

        let Some(mask) = header.mask else {
            return conn.fail(FrameError::Unmasked);
        };
        if header.frame_len() > RX_BUFFER_LEN as u64 {
            return conn.fail(FrameError::TooLarge(header.payload_len));
        }

        let frame_len = header.frame_len() as usize;
        if conn.rx.len() < frame_len {
            break;
        }

        frame::apply_mask(&mut conn.rx[header.header_len..frame_len], mask);
        let payload = &conn.rx[header.header_len..frame_len];

        match handle_frame(&mut conn.session, conn.id, handler, &header, payload) {
            Ok(Flow::Continue) => drain_front(&mut conn.rx, frame_len),
            Ok(Flow::Closed) => {
                conn.rx.clear();
                conn.phase = Phase::Closing;
            }
            Err(e) => conn.fail(e),
        }
    }
}

fn handle_frame<H: EventHandler>(
    session: &mut Session,
    id: ClientId,
    handler: &mut H,
    header: &FrameHeader,
    payload: &[u8],
) -> Result<Flow, FrameError> {
    trace!(
        "[{}] {:?} frame, {} bytes, fin={}",
        id,
        header.opcode,
        payload.len(),
        header.fin
    );

    match header.opcode {
        Opcode::Text | Opcode::Binary => {
            if session.fragment.is_some() {
                return Err(FrameError::InterleavedMessage);
            }
            if header.fin {
                deliver(id, handler, header.opcode, payload)?;
            } else {
                session.message.clear();
                session
                    .message
                    .extend_from_slice(payload)
                    .map_err(|_| FrameError::TooLarge(payload.len() as u64))?;
                session.fragment = Some(header.opcode);
            }
        }
        Opcode::Continuation => {
            let Some(opcode) = session.fragment else {
                return Err(FrameError::UnexpectedContinuation);
            };
            let total = session.message.len() + payload.len();
            session
                .message
                .extend_from_slice(payload)
                .map_err(|_| FrameError::TooLarge(total as u64))?;
            if header.fin {
                session.fragment = None;
                let result = deliver(id, handler, opcode, &session.message);
                session.message.clear();
                result?;
            }
        }
        Opcode::Ping => {
            enqueue_frame(session, id, Opcode::Pong, payload);
        }
        Opcode::Pong => {}
        Opcode::Close => {
            let echo = match payload.len() {
                0 => &[][..],
                1 => return Err(FrameError::BadClosePayload),
                _ => &payload[..2],
            };
            debug!("[{}] Close requested by peer", id);
            enqueue_frame(session, id, Opcode::Close, echo);
            return Ok(Flow::Closed);
        }
    }

    Ok(Flow::Continue)
}

/// Hand a complete message to the handler.
fn deliver<H: EventHandler>(
    id: ClientId,
    handler: &mut H,
    opcode: Opcode,
    payload: &[u8],
) -> Result<(), FrameError> {
    if opcode == Opcode::Binary {
        debug!("[{}] Ignoring binary message of {} bytes", id, payload.len());
        return Ok(());
    }

    core::str::from_utf8(payload).map_err(|_| FrameError::InvalidUtf8)?;
    handler.on_event(ServerEvent::TextReceived { id, payload });
    Ok(())
}

/// Write as much of the outbound queue as the transport takes.
fn flush<T: Transport>(conn: &mut Connection, transport: &mut T) {
    while !conn.session.tx.is_empty() {
        match transport.write(conn.handle, &conn.session.tx) {
            Ok(0) => break,
            Ok(n) => drain_front(&mut conn.session.tx, n),
            Err(e) => {
                debug!("[{}] Write failed: {}", conn.id, e);
                conn.session.tx.clear();
                conn.phase = Phase::Closing;
                break;
            }
        }
    }
}

/// Append `parts` to the outbound queue as one unit, or not at all.
fn enqueue(session: &mut Session, id: ClientId, parts: &[&[u8]]) -> bool {
    let len: usize = parts.iter().map(|part| part.len()).sum();
    if session.tx.capacity() - session.tx.len() < len {
        session.dropped_frames = session.dropped_frames.saturating_add(1);
        debug!("[{}] Outbound queue full, dropping {} bytes", id, len);
        return false;
    }

    for part in parts {
        let _ = session.tx.extend_from_slice(part);
    }
    true
}

fn enqueue_frame(session: &mut Session, id: ClientId, opcode: Opcode, payload: &[u8]) -> bool {
    let mut header = [0u8; frame::MAX_SERVER_HEADER_LEN];
    let header_len = frame::encode_header(opcode, payload.len(), &mut header);
    enqueue(session, id, &[&header[..header_len], payload])
}

/// Remove the first `n` bytes, shifting the rest to the front.
fn drain_front<const N: usize>(buf: &mut Vec<u8, N>, n: usize) {
    let n = n.min(buf.len());
    let remaining = buf.len() - n;
    buf.copy_within(n.., 0);
    buf.truncate(remaining);
}
