//! Minimal WebSocket server (RFC 6455, server role)

pub mod event;
pub mod frame;
pub mod handshake;
pub mod server;
pub mod transport;

pub use event::{ClientId, EventHandler, LoggingHandler, ServerEvent};
pub use server::{ClientInfo, MAX_CLIENTS, SocketServer};
pub use transport::{ConnHandle, LinkError, Transport};
