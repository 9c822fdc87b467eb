pub mod crc;
pub mod frame;
pub mod sequence;
pub mod session;
pub mod handshake;

pub use crc::{crc8_maxim, verify};
pub use frame::{decode, encode, Frame, FrameKind, FrameReader};
pub use handshake::perform_handshake;
pub use sequence::{CounterDirection, SequenceRule, SequenceTracker, TrackerState, Validation};
pub use session::ConnectionSession;
