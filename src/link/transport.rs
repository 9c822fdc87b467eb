use async_trait::async_trait;
use std::time::Duration;

use crate::utils::error::LinkError;

/// Duplex byte channel to the drive. The protocol engine never opens or
/// configures ports; it only writes frames and reads whatever bytes arrive.
#[async_trait]
pub trait Transport: Send {
    async fn write(&mut self, bytes: &[u8]) -> Result<(), LinkError>;

    /// Waits up to `timeout` for at least one byte and returns at most `max_bytes`.
    /// Returns [`LinkError::Timeout`] when nothing arrives in time.
    async fn read(&mut self, max_bytes: usize, timeout: Duration) -> Result<Vec<u8>, LinkError>;

    async fn close(&mut self) -> Result<(), LinkError>;
}
