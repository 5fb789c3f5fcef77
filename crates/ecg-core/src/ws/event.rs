//! Server events and their handlers

use core::fmt;
use core::net::SocketAddr;

use log::info;

/// Identifier the server assigns to a peer when it connects.
///
/// Identifiers increase monotonically; a peer that reconnects gets a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId(pub u32);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Something that happened to a peer during a processing tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerEvent<'a> {
    /// The upgrade completed; the peer now receives broadcasts.
    Connected { id: ClientId, remote: SocketAddr },
    /// The peer is gone and its identifier was dropped from the registry.
    Disconnected { id: ClientId },
    /// A complete text message arrived. `payload` is valid UTF-8.
    TextReceived { id: ClientId, payload: &'a [u8] },
}

impl ServerEvent<'_> {
    pub fn id(&self) -> ClientId {
        match self {
            Self::Connected { id, .. }
            | Self::Disconnected { id }
            | Self::TextReceived { id, .. } => *id,
        }
    }
}

/// Receives server events synchronously from inside the processing tick.
pub trait EventHandler {
    fn on_event(&mut self, event: ServerEvent<'_>);
}

impl<F> EventHandler for F
where
    F: FnMut(ServerEvent<'_>),
{
    fn on_event(&mut self, event: ServerEvent<'_>) {
        self(event)
    }
}

/// Logs every event and otherwise ignores it. Peers cannot control the
/// device, so this is the handler the firmware runs with.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&mut self, event: ServerEvent<'_>) {
        match event {
            ServerEvent::Connected { id, remote } => {
                info!("[{}] Connected from {}", id, remote.ip())
            }
            ServerEvent::Disconnected { id } => info!("[{}] Disconnected!", id),
            ServerEvent::TextReceived { id, payload } => {
                let text = core::str::from_utf8(payload).unwrap_or("<invalid utf-8>");
                info!("[{}] Text: {}", id, text)
            }
        }
    }
}
