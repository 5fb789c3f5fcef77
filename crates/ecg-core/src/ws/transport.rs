//! Non-blocking byte transport underneath the socket server

use core::net::SocketAddr;

use thiserror_no_std::Error;

/// Transport-side slot of one open stream.
///
/// Handles are only meaningful to the transport that issued them and may be
/// reused after [`Transport::close`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnHandle(pub usize);

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    #[error("connection closed by peer")]
    Closed,
    #[error("connection reset")]
    Reset,
}

/// Stream transport driven by the server's processing tick.
///
/// Every method must return without waiting: reads and writes move only what
/// is available or fits right now.
pub trait Transport {
    /// Take one newly established inbound connection, if any is pending.
    fn poll_accept(&mut self) -> Option<(ConnHandle, SocketAddr)>;

    /// Read whatever has arrived. `Ok(0)` means nothing is pending yet; an
    /// orderly shutdown by the peer is reported as [`LinkError::Closed`].
    fn read(&mut self, handle: ConnHandle, buf: &mut [u8]) -> Result<usize, LinkError>;

    /// Write as much of `data` as fits without blocking and return the count.
    fn write(&mut self, handle: ConnHandle, data: &[u8]) -> Result<usize, LinkError>;

    /// Close the stream and release its slot.
    fn close(&mut self, handle: ConnHandle);
}
