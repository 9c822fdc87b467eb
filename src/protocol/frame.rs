//! Frame layout shared by host and drive:
//!
//! ```text
//! 0x10 0x02 | kind | sequence | length | payload[length] | trailer | crc
//! ```
//!
//! The trailer echoes the sequence byte. The CRC-8/Maxim covers every byte
//! before it, header included.

use bytes::{Buf, BytesMut};

use super::crc::{crc8_maxim, verify};
use crate::utils::error::FrameError;

pub const HEADER: [u8; 2] = [0x10, 0x02];

const KIND_OFFSET: usize = 2;
const SEQUENCE_OFFSET: usize = 3;
const LENGTH_OFFSET: usize = 4;
const PREFIX_LEN: usize = 5;
const SUFFIX_LEN: usize = 2;

pub const MIN_FRAME_LEN: usize = PREFIX_LEN + SUFFIX_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Request,
    Reply,
    Handshake,
    Ack,
}

impl FrameKind {
    pub fn to_byte(self) -> u8 {
        match self {
            FrameKind::Request => 0x40,
            FrameKind::Reply => 0xC0,
            FrameKind::Handshake => 0x80,
            FrameKind::Ack => 0x06,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x40 => Some(FrameKind::Request),
            0xC0 => Some(FrameKind::Reply),
            0x80 => Some(FrameKind::Handshake),
            0x06 => Some(FrameKind::Ack),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    pub sequence: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(kind: FrameKind, sequence: u8, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            sequence,
            payload: payload.into(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, FrameError> {
        encode(self.kind, self.sequence, &self.payload)
    }
}

pub fn encode(kind: FrameKind, sequence: u8, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    let length = u8::try_from(payload.len()).map_err(|_| FrameError::PayloadTooLong(payload.len()))?;

    let mut bytes = Vec::with_capacity(MIN_FRAME_LEN + payload.len());
    bytes.extend_from_slice(&HEADER);
    bytes.push(kind.to_byte());
    bytes.push(sequence);
    bytes.push(length);
    bytes.extend_from_slice(payload);
    bytes.push(sequence);

    let crc = crc8_maxim(&bytes);
    bytes.push(crc);
    Ok(bytes)
}

/// Total length of the frame starting at `raw[0]`, as declared by its length byte.
pub fn declared_len(raw: &[u8]) -> Result<usize, FrameError> {
    let header_bytes = raw.len().min(HEADER.len());
    if raw[..header_bytes] != HEADER[..header_bytes] {
        return Err(FrameError::BadHeader);
    }

    if raw.len() < PREFIX_LEN {
        return Err(FrameError::Truncated {
            needed: MIN_FRAME_LEN,
            available: raw.len(),
        });
    }

    let total = PREFIX_LEN + raw[LENGTH_OFFSET] as usize + SUFFIX_LEN;
    if raw.len() < total {
        return Err(FrameError::Truncated {
            needed: total,
            available: raw.len(),
        });
    }

    Ok(total)
}

/// Parses one frame from the front of `raw`. Bytes past the CRC are ignored.
pub fn decode(raw: &[u8]) -> Result<Frame, FrameError> {
    let total = declared_len(raw)?;
    let body = &raw[..total];

    if !verify(body) {
        return Err(FrameError::CrcMismatch {
            calculated: crc8_maxim(&body[..total - 1]),
            received: body[total - 1],
        });
    }

    let sequence = body[SEQUENCE_OFFSET];
    let length = body[LENGTH_OFFSET] as usize;
    let trailer = body[PREFIX_LEN + length];
    if trailer != sequence {
        return Err(FrameError::TrailerMismatch { sequence, trailer });
    }

    let kind_byte = body[KIND_OFFSET];
    let kind = FrameKind::from_byte(kind_byte).ok_or(FrameError::UnknownKind(kind_byte))?;

    Ok(Frame {
        kind,
        sequence,
        payload: body[PREFIX_LEN..PREFIX_LEN + length].to_vec(),
    })
}

/// Reassembles frames from the arbitrary chunks a serial line delivers.
#[derive(Debug, Default)]
pub struct FrameReader {
    buffer: BytesMut,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Next complete frame in the buffer, or `None` until more bytes arrive.
    /// A frame that fails validation is consumed and returned as an error.
    pub fn next_frame(&mut self) -> Option<Result<Frame, FrameError>> {
        self.skip_to_header();

        match declared_len(&self.buffer) {
            Ok(total) => {
                let result = decode(&self.buffer[..total]);
                match result {
                    // The length byte itself may be the damaged one: only the header is known bad
                    Err(FrameError::CrcMismatch { .. }) => self.buffer.advance(HEADER.len()),
                    _ => self.buffer.advance(total),
                }
                Some(result)
            }
            Err(FrameError::Truncated { .. }) => None,
            Err(e) => {
                self.buffer.advance(1);
                Some(Err(e))
            }
        }
    }

    /// Abandons a frame that is still waiting for bytes when another header is
    /// already buffered behind it. Returns the abandoned frame's truncation.
    pub fn resync(&mut self) -> Option<FrameError> {
        self.skip_to_header();
        if self.buffer.len() <= HEADER.len() {
            return None;
        }

        let next = self.buffer[1..]
            .windows(HEADER.len())
            .position(|w| w == HEADER)?
            + 1;
        let needed = match declared_len(&self.buffer) {
            Err(FrameError::Truncated { needed, .. }) => needed,
            _ => MIN_FRAME_LEN,
        };
        self.buffer.advance(next);
        Some(FrameError::Truncated {
            needed,
            available: next,
        })
    }

    /// Empties the buffer, reporting the truncation if it held the start of a frame.
    pub fn flush_partial(&mut self) -> Option<FrameError> {
        self.skip_to_header();
        let partial = if self.buffer.len() >= HEADER.len() {
            declared_len(&self.buffer).err()
        } else {
            None
        };
        self.buffer.clear();
        partial
    }

    fn skip_to_header(&mut self) {
        match self.buffer.windows(HEADER.len()).position(|w| w == HEADER) {
            Some(0) => {}
            Some(pos) => self.buffer.advance(pos),
            None => {
                // Keep a trailing DLE: it may be the first half of the next header.
                let keep = usize::from(self.buffer.last() == Some(&HEADER[0]));
                let drop = self.buffer.len() - keep;
                self.buffer.advance(drop);
            }
        }
    }
}
