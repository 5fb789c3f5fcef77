//! RFC 6455 frame headers
//!
//! Only what a server needs: decoding client headers (which carry a masking
//! key) and encoding unmasked, unfragmented server frames.

use thiserror_no_std::Error;

/// Longest header a server frame needs (2 bytes + 64-bit length).
pub const MAX_SERVER_HEADER_LEN: usize = 10;

/// Largest payload a control frame may carry.
pub const MAX_CONTROL_PAYLOAD: u64 = 125;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl Opcode {
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0x0 => Some(Self::Continuation),
            0x1 => Some(Self::Text),
            0x2 => Some(Self::Binary),
            0x8 => Some(Self::Close),
            0x9 => Some(Self::Ping),
            0xA => Some(Self::Pong),
            _ => None,
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            Self::Continuation => 0x0,
            Self::Text => 0x1,
            Self::Binary => 0x2,
            Self::Close => 0x8,
            Self::Ping => 0x9,
            Self::Pong => 0xA,
        }
    }

    pub fn is_control(self) -> bool {
        matches!(self, Self::Close | Self::Ping | Self::Pong)
    }
}

/// Status codes sent in close frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    Normal,
    GoingAway,
    ProtocolError,
    InvalidPayload,
    MessageTooBig,
}

impl CloseCode {
    pub fn code(self) -> u16 {
        match self {
            Self::Normal => 1000,
            Self::GoingAway => 1001,
            Self::ProtocolError => 1002,
            Self::InvalidPayload => 1007,
            Self::MessageTooBig => 1009,
        }
    }

    /// Close frame payload carrying this code.
    pub fn to_payload(self) -> [u8; 2] {
        self.code().to_be_bytes()
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("reserved bits set without a negotiated extension")]
    ReservedBits,
    #[error("unknown opcode {0}")]
    UnknownOpcode(u8),
    #[error("control frame is fragmented")]
    FragmentedControl,
    #[error("control frame payload of {0} bytes")]
    ControlTooLong(u64),
    #[error("client frame is not masked")]
    Unmasked,
    #[error("close frame payload of one byte")]
    BadClosePayload,
    #[error("continuation frame without a message in progress")]
    UnexpectedContinuation,
    #[error("new message started before the previous one finished")]
    InterleavedMessage,
    #[error("64-bit payload length with the most significant bit set")]
    LengthOverflow,
    #[error("message of {0} bytes does not fit the receive buffer")]
    TooLarge(u64),
    #[error("text message is not valid UTF-8")]
    InvalidUtf8,
}

impl FrameError {
    /// Close status to send before dropping the peer.
    pub fn close_code(&self) -> CloseCode {
        match self {
            Self::TooLarge(_) => CloseCode::MessageTooBig,
            Self::InvalidUtf8 => CloseCode::InvalidPayload,
            _ => CloseCode::ProtocolError,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub fin: bool,
    pub opcode: Opcode,
    pub mask: Option<[u8; 4]>,
    pub payload_len: u64,
    /// Bytes taken by the header itself, including the masking key.
    pub header_len: usize,
}

impl FrameHeader {
    /// Header plus payload.
    ///
    /// Saturates, so an absurd announced length still compares as too large.
    pub fn frame_len(&self) -> u64 {
        self.payload_len.saturating_add(self.header_len as u64)
    }
}

/// Decode the frame header at the start of `buf`.
///
/// Returns `Ok(None)` while the header is still incomplete.
pub fn decode_header(buf: &[u8]) -> Result<Option<FrameHeader>, FrameError> {
    let &[first, second, ..] = buf else {
        return Ok(None);
    };

    if first & 0x70 != 0 {
        return Err(FrameError::ReservedBits);
    }

    let fin = first & 0x80 != 0;
    let opcode =
        Opcode::from_bits(first & 0x0F).ok_or(FrameError::UnknownOpcode(first & 0x0F))?;

    let (payload_len, mut header_len) = match second & 0x7F {
        126 => {
            let Some(bytes) = buf.get(2..4).and_then(|b| <[u8; 2]>::try_from(b).ok()) else {
                return Ok(None);
            };
            (u64::from(u16::from_be_bytes(bytes)), 4)
        }
        127 => {
            let Some(bytes) = buf.get(2..10).and_then(|b| <[u8; 8]>::try_from(b).ok()) else {
                return Ok(None);
            };
            let len = u64::from_be_bytes(bytes);
            if len & (1 << 63) != 0 {
                return Err(FrameError::LengthOverflow);
            }
            (len, 10)
        }
        len => (u64::from(len), 2),
    };

    if opcode.is_control() {
        if !fin {
            return Err(FrameError::FragmentedControl);
        }
        if payload_len > MAX_CONTROL_PAYLOAD {
            return Err(FrameError::ControlTooLong(payload_len));
        }
    }

    let mask = if second & 0x80 != 0 {
        let Some(key) = buf
            .get(header_len..header_len + 4)
            .and_then(|b| <[u8; 4]>::try_from(b).ok())
        else {
            return Ok(None);
        };
        header_len += 4;
        Some(key)
    } else {
        None
    };

    Ok(Some(FrameHeader {
        fin,
        opcode,
        mask,
        payload_len,
        header_len,
    }))
}

/// Encode the header of a final, unmasked server frame into `out`.
///
/// Returns the number of header bytes written.
pub fn encode_header(
    opcode: Opcode,
    payload_len: usize,
    out: &mut [u8; MAX_SERVER_HEADER_LEN],
) -> usize {
    out[0] = 0x80 | opcode.bits();

    if payload_len < 126 {
        out[1] = payload_len as u8;
        2
    } else if let Ok(len) = u16::try_from(payload_len) {
        out[1] = 126;
        out[2..4].copy_from_slice(&len.to_be_bytes());
        4
    } else {
        out[1] = 127;
        out[2..10].copy_from_slice(&(payload_len as u64).to_be_bytes());
        10
    }
}

/// XOR `payload` with the client's masking key. Applying it twice restores
/// the original bytes.
pub fn apply_mask(payload: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}
