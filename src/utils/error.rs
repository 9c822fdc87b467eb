use thiserror::Error;

/// Layout failures reported by the frame codec.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("CRC mismatch: calculated 0x{calculated:02X}, received 0x{received:02X}")]
    CrcMismatch { calculated: u8, received: u8 },

    #[error("Missing frame header")]
    BadHeader,

    #[error("Trailer 0x{trailer:02X} does not echo sequence 0x{sequence:02X}")]
    TrailerMismatch { sequence: u8, trailer: u8 },

    #[error("Unknown frame kind 0x{0:02X}")]
    UnknownKind(u8),

    #[error("Payload of {0} bytes does not fit the length byte")]
    PayloadTooLong(usize),
}

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Timeout occurred")]
    Timeout,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Link closed")]
    Closed,
}

impl From<serialport::Error> for LinkError {
    fn from(err: serialport::Error) -> Self {
        LinkError::ConnectionError(err.to_string())
    }
}

/// Per-request failures. None of these tear the session down.
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("No reply within {0} ms")]
    Timeout(u64),

    #[error("Invalid frame: {0}")]
    Frame(#[from] FrameError),

    #[error("Sequence mismatch: expected {expected}, received {received}")]
    SequenceMismatch { expected: u8, received: u8 },

    #[error("Unexpected frame kind 0x{0:02X} while awaiting reply")]
    UnexpectedKind(u8),

    #[error("Reply payload must be 2 bytes, got {0}")]
    BadPayload(usize),

    #[error("Link error: {0}")]
    Link(LinkError),
}

impl From<LinkError> for RequestError {
    fn from(err: LinkError) -> Self {
        match err {
            // Deadline accounting happens in the session; a bare link timeout has no budget attached.
            LinkError::Timeout => RequestError::Timeout(0),
            other => RequestError::Link(other),
        }
    }
}

#[derive(Error, Debug)]
pub enum HandshakeError {
    #[error("No handshake reply within {0} ms")]
    Timeout(u64),

    #[error("Invalid handshake frame: {0}")]
    Frame(#[from] FrameError),

    #[error("Unexpected frame kind 0x{0:02X} during handshake")]
    UnexpectedKind(u8),

    #[error("Link error: {0}")]
    Link(#[from] LinkError),
}

/// Run-level failures. Only these stop the iteration controller.
#[derive(Error, Debug)]
pub enum PollError {
    #[error("Handshake failed: {0}")]
    HandshakeFailure(#[from] HandshakeError),

    #[error("Session has no synchronized counter")]
    NotSynchronized,

    #[error("Output error: {0}")]
    Output(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<std::io::Error> for PollError {
    fn from(err: std::io::Error) -> Self {
        PollError::Output(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for PollError {
    fn from(err: serde_json::Error) -> Self {
        PollError::Output(format!("JSON error: {}", err))
    }
}
