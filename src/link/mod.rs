pub mod transport;
pub mod serial;
#[cfg(test)]
pub mod mock;

pub use transport::Transport;
pub use serial::SerialTransport;
