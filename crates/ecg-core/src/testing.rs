//! In-memory fakes shared by the unit tests

use alloc::collections::VecDeque;
use alloc::string::String;
use alloc::vec::Vec;
use core::net::{IpAddr, Ipv4Addr, SocketAddr};

use embedded_hal_async::delay::DelayNs;

use crate::ws::frame::{self, Opcode};
use crate::ws::handshake;
use crate::ws::{ClientId, ConnHandle, EventHandler, LinkError, ServerEvent, Transport};

pub const CLIENT_KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";
pub const CLIENT_MASK: [u8; 4] = [0x37, 0xFA, 0x21, 0x3D];

pub fn peer(last_octet: u8, port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 168, 1, last_octet)), port)
}

#[derive(Debug, Default)]
pub struct FakeStream {
    pub inbound: VecDeque<u8>,
    pub outbound: Vec<u8>,
    pub peer_closed: bool,
    pub server_closed: bool,
    /// Writes fail with `Reset` once set.
    pub broken: bool,
    /// Bytes the peer will still accept; `None` means unlimited.
    pub write_budget: Option<usize>,
    /// Replayed without end once `inbound` runs dry.
    pub endless: Vec<u8>,
    /// Calls to `read`.
    pub reads: usize,
}

#[derive(Debug, Default)]
pub struct FakeTransport {
    pending: VecDeque<(ConnHandle, SocketAddr)>,
    pub streams: Vec<FakeStream>,
}

impl FakeTransport {
    /// Open a TCP connection from `remote`; the server sees it on its next tick.
    pub fn connect(&mut self, remote: SocketAddr) -> ConnHandle {
        let handle = ConnHandle(self.streams.len());
        self.streams.push(FakeStream::default());
        self.pending.push_back((handle, remote));
        handle
    }

    pub fn stream(&self, handle: ConnHandle) -> &FakeStream {
        &self.streams[handle.0]
    }

    pub fn stream_mut(&mut self, handle: ConnHandle) -> &mut FakeStream {
        &mut self.streams[handle.0]
    }

    pub fn send(&mut self, handle: ConnHandle, bytes: &[u8]) {
        self.stream_mut(handle).inbound.extend(bytes.iter().copied());
    }

    pub fn hang_up(&mut self, handle: ConnHandle) {
        self.stream_mut(handle).peer_closed = true;
    }

    pub fn take_outbound(&mut self, handle: ConnHandle) -> Vec<u8> {
        core::mem::take(&mut self.stream_mut(handle).outbound)
    }
}

impl Transport for FakeTransport {
    fn poll_accept(&mut self) -> Option<(ConnHandle, SocketAddr)> {
        self.pending.pop_front()
    }

    fn read(&mut self, handle: ConnHandle, buf: &mut [u8]) -> Result<usize, LinkError> {
        let stream = self.stream_mut(handle);
        stream.reads += 1;
        if stream.server_closed {
            return Err(LinkError::Closed);
        }
        while !stream.endless.is_empty() && stream.inbound.len() < buf.len() {
            stream.inbound.extend(stream.endless.iter().copied());
        }
        let count = buf.len().min(stream.inbound.len());
        if count == 0 && stream.peer_closed {
            return Err(LinkError::Closed);
        }
        for (slot, byte) in buf.iter_mut().zip(stream.inbound.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }

    fn write(&mut self, handle: ConnHandle, data: &[u8]) -> Result<usize, LinkError> {
        let stream = self.stream_mut(handle);
        if stream.broken || stream.server_closed {
            return Err(LinkError::Reset);
        }
        let count = match stream.write_budget.as_mut() {
            Some(budget) => {
                let count = data.len().min(*budget);
                *budget -= count;
                count
            }
            None => data.len(),
        };
        stream.outbound.extend_from_slice(&data[..count]);
        Ok(count)
    }

    fn close(&mut self, handle: ConnHandle) {
        self.stream_mut(handle).server_closed = true;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    Connected(ClientId, SocketAddr),
    Disconnected(ClientId),
    Text(ClientId, String),
}

/// Event handler that keeps an owned copy of every event.
#[derive(Debug, Default)]
pub struct Recorder {
    pub events: Vec<Recorded>,
}

impl EventHandler for Recorder {
    fn on_event(&mut self, event: ServerEvent<'_>) {
        let recorded = match event {
            ServerEvent::Connected { id, remote } => Recorded::Connected(id, remote),
            ServerEvent::Disconnected { id } => Recorded::Disconnected(id),
            ServerEvent::TextReceived { id, payload } => {
                Recorded::Text(id, String::from_utf8_lossy(payload).into_owned())
            }
        };
        self.events.push(recorded);
    }
}

/// Delay that returns immediately and remembers what it was asked for.
#[derive(Debug, Default)]
pub struct RecordingDelay {
    pub calls_ms: Vec<u32>,
}

impl DelayNs for RecordingDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.calls_ms.push(ns / 1_000_000);
        embassy_futures::yield_now().await;
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.calls_ms.push(ms);
        embassy_futures::yield_now().await;
    }
}

/// Upgrade request as a browser would send it.
pub fn upgrade_request() -> Vec<u8> {
    alloc::format!(
        "GET / HTTP/1.1\r\n\
         Host: 192.168.1.50:81\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {}\r\n\
         Sec-WebSocket-Version: 13\r\n\r\n",
        CLIENT_KEY
    )
    .into_bytes()
}

/// A masked client frame.
pub fn client_frame(opcode: Opcode, payload: &[u8], fin: bool) -> Vec<u8> {
    let mut header = [0u8; frame::MAX_SERVER_HEADER_LEN];
    let header_len = frame::encode_header(opcode, payload.len(), &mut header);
    if !fin {
        header[0] &= 0x7F;
    }
    header[1] |= 0x80;

    let mut bytes = Vec::from(&header[..header_len]);
    bytes.extend_from_slice(&CLIENT_MASK);
    let start = bytes.len();
    bytes.extend_from_slice(payload);
    frame::apply_mask(&mut bytes[start..], CLIENT_MASK);
    bytes
}

/// Split server output into an optional HTTP response head and the frames
/// that follow it.
pub fn parse_server_output(bytes: &[u8]) -> (Option<String>, Vec<(Opcode, Vec<u8>)>) {
    let (head, mut rest) = if bytes.starts_with(b"HTTP/1.1") {
        let end = handshake::find_request_end(bytes).expect("complete response head");
        (
            Some(String::from_utf8_lossy(&bytes[..end]).into_owned()),
            &bytes[end..],
        )
    } else {
        (None, bytes)
    };

    let mut frames = Vec::new();
    while !rest.is_empty() {
        let header = frame::decode_header(rest)
            .expect("valid server frame")
            .expect("complete server frame");
        assert!(header.mask.is_none(), "server frames are never masked");
        let end = header.frame_len() as usize;
        frames.push((header.opcode, Vec::from(&rest[header.header_len..end])));
        rest = &rest[end..];
    }
    (head, frames)
}

/// Text frames in server output, as strings.
pub fn texts(frames: &[(Opcode, Vec<u8>)]) -> Vec<String> {
    frames
        .iter()
        .filter(|(opcode, _)| *opcode == Opcode::Text)
        .map(|(_, payload)| String::from_utf8_lossy(payload).into_owned())
        .collect()
}
