use log::{debug, info, warn};
use std::time::Duration;
use tokio::time::Instant;

use super::frame::{Frame, FrameReader};
use super::sequence::{SequenceRule, SequenceTracker};
use crate::link::Transport;
use crate::utils::error::{FrameError, LinkError};

const READ_CHUNK: usize = 64;

/// One live connection to the drive: the transport handle, the receive
/// buffer and the sequence state. Owned by exactly one controller.
pub struct ConnectionSession<T: Transport> {
    transport: T,
    reader: FrameReader,
    tracker: SequenceTracker,
    handshakes: u32,
    unanswered: bool,
}

impl<T: Transport> ConnectionSession<T> {
    pub fn new(transport: T, rule: SequenceRule) -> Self {
        Self {
            transport,
            reader: FrameReader::new(),
            tracker: SequenceTracker::new(rule),
            handshakes: 0,
            unanswered: false,
        }
    }

    pub fn tracker(&self) -> &SequenceTracker {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut SequenceTracker {
        &mut self.tracker
    }

    pub fn handshakes(&self) -> u32 {
        self.handshakes
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    pub(crate) fn record_handshake(&mut self) {
        self.handshakes += 1;
        self.unanswered = false;
    }

    /// Marks that the last request got no reply in time, so its answer may still arrive.
    pub fn mark_unanswered(&mut self) {
        self.unanswered = true;
    }

    pub fn has_unanswered(&self) -> bool {
        self.unanswered
    }

    pub fn take_unanswered(&mut self) -> bool {
        std::mem::replace(&mut self.unanswered, false)
    }

    /// Drops anything buffered from earlier exchanges.
    pub fn discard_input(&mut self) {
        if self.reader.buffered() > 0 {
            debug!("🧹 Discarding {} buffered bytes", self.reader.buffered());
        }
        self.reader.clear();
    }

    /// Moves whatever the transport already holds into the buffer without waiting.
    pub async fn fill_pending(&mut self) -> Result<usize, LinkError> {
        let mut total = 0;
        loop {
            match self.transport.read(READ_CHUNK, Duration::ZERO).await {
                Ok(chunk) if !chunk.is_empty() => {
                    debug!("📥 RAW RECV (pending): {}", hex::encode_upper(&chunk));
                    total += chunk.len();
                    self.reader.push(&chunk);
                }
                Ok(_) | Err(LinkError::Timeout) => return Ok(total),
                Err(e) => return Err(e),
            }
        }
    }

    /// Next complete frame already in the buffer, without touching the transport.
    pub fn next_buffered(&mut self) -> Option<Result<Frame, FrameError>> {
        let result = self.reader.next_frame()?;
        match &result {
            Ok(frame) => debug!(
                "📥 RECV {:?} seq {} payload {}",
                frame.kind,
                frame.sequence,
                hex::encode_upper(&frame.payload)
            ),
            Err(e) => warn!("⚠️ Discarded invalid frame: {}", e),
        }
        Some(result)
    }

    pub async fn send_frame<E>(&mut self, frame: &Frame) -> Result<(), E>
    where
        E: From<FrameError> + From<LinkError>,
    {
        let bytes = frame.to_bytes()?;
        self.transport.write(&bytes).await?;
        debug!("📤 SENT {:?} seq {}: {}", frame.kind, frame.sequence, hex::encode_upper(&bytes));
        Ok(())
    }

    /// Next frame off the wire, waiting until `deadline`.
    ///
    /// The outer error is a link failure or the deadline passing with nothing
    /// usable buffered. The inner error is a frame that arrived but failed
    /// validation; it has already been removed from the buffer.
    pub async fn receive(&mut self, deadline: Instant) -> Result<Result<Frame, FrameError>, LinkError> {
        loop {
            if let Some(result) = self.next_buffered() {
                return Ok(result);
            }

            let now = Instant::now();
            let read = if now >= deadline {
                Err(LinkError::Timeout)
            } else {
                self.transport.read(READ_CHUNK, deadline - now).await
            };

            match read {
                Ok(chunk) => {
                    debug!("📥 RAW RECV: {}", hex::encode_upper(&chunk));
                    self.reader.push(&chunk);
                }
                Err(LinkError::Timeout) => {
                    // Stalled frame with another header behind it: move on to that one
                    if let Some(e) = self.reader.resync() {
                        warn!("⚠️ Abandoned stalled frame: {}", e);
                        continue;
                    }
                    // A frame that started but never completed is reported as truncated
                    if let Some(e) = self.reader.flush_partial() {
                        warn!("⚠️ Discarded incomplete frame: {}", e);
                        return Ok(Err(e));
                    }
                    return Err(LinkError::Timeout);
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn close(mut self) -> Result<(), LinkError> {
        self.reader.clear();
        self.transport.close().await?;
        info!("🔌 Session closed after {} handshake(s)", self.handshakes);
        Ok(())
    }
}
