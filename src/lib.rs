//! Drive Parameter Polling Library
//!
//! Polls a fixed table of drive channels over a serial link that uses
//! CRC-8/Maxim checked frames and a rolling reply counter seeded by a
//! handshake. Collected readings are handed to pluggable formatters and
//! senders (console, CSV/JSON file, UDP).

pub mod cli;
pub mod config;
pub mod devices;
pub mod link;
pub mod output;
pub mod protocol;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use devices::{default_channels, ChannelSpec, Multiplier, ParameterRecord, ScaledValue};
pub use link::{SerialTransport, Transport};
pub use output::{CsvFormatter, DataSender, JsonFormatter, LineFormatter, RecordFormatter};
pub use protocol::{crc8_maxim, ConnectionSession, Frame, FrameKind, SequenceRule};
pub use services::{ChannelDispatcher, PollReport, PollService, PollStats};
pub use utils::error::{FrameError, HandshakeError, LinkError, PollError, RequestError};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
