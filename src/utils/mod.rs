pub mod error;

pub use error::{FrameError, HandshakeError, LinkError, PollError, RequestError};
