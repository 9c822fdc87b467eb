use log::{debug, info, warn};
use std::time::Duration;
use tokio::time::Instant;

use crate::devices::{payload, ChannelSpec, ParameterRecord};
use crate::link::Transport;
use crate::protocol::{ConnectionSession, Frame, FrameKind, Validation};
use crate::utils::error::{LinkError, RequestError};

const READ_PARAMETER: u8 = 0x0B;
const SUB_COMMAND: u8 = 0x01;
const ELEMENT_COUNT: u16 = 1;

/// How long to look for a second reply after a request that followed a timeout.
const LATE_REPLY_SETTLE: Duration = Duration::from_millis(100);

/// Request payload: read command, sub-command, channel id and element count, big-endian.
pub fn request_payload(channel_id: u16) -> [u8; 6] {
    let [id_high, id_low] = channel_id.to_be_bytes();
    let [count_high, count_low] = ELEMENT_COUNT.to_be_bytes();
    [READ_PARAMETER, SUB_COMMAND, id_high, id_low, count_high, count_low]
}

/// Issues one parameter request and correlates its reply. Exactly one
/// attempt per call; the caller decides what to do with failures.
#[derive(Debug, Clone)]
pub struct ChannelDispatcher {
    timeout: Duration,
    settle: Duration,
}

impl ChannelDispatcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            settle: LATE_REPLY_SETTLE.min(timeout),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Consumes replies that turned up after their request timed out.
    ///
    /// Each one is acknowledged and its counter checked, so the tracker follows
    /// the drive, but its value is dropped. Call before reading the expected
    /// counter for the next request.
    pub async fn absorb_late_replies<T: Transport>(&self, session: &mut ConnectionSession<T>) -> usize {
        if let Err(e) = session.fill_pending().await {
            warn!("⚠️ Could not drain pending input: {}", e);
        }

        let mut absorbed = 0;
        while let Some(result) = session.next_buffered() {
            match result {
                Ok(frame) if frame.kind == FrameKind::Reply => {
                    self.absorb(session, &frame).await;
                    absorbed += 1;
                }
                Ok(frame) => debug!("Dropping stray {:?} frame seq {}", frame.kind, frame.sequence),
                Err(_) => {}
            }
        }
        session.discard_input();

        if absorbed > 0 {
            session.take_unanswered();
        }
        absorbed
    }

    pub async fn request<T: Transport>(
        &self,
        session: &mut ConnectionSession<T>,
        channel: &ChannelSpec,
        expected_sequence: u8,
        iteration: u32,
    ) -> Result<ParameterRecord, RequestError> {
        session.discard_input();

        let request = Frame::new(
            FrameKind::Request,
            expected_sequence,
            request_payload(channel.channel_id).to_vec(),
        );
        session.send_frame::<RequestError>(&request).await?;

        let mut reply = match self.await_reply(session, self.timeout).await {
            Ok(frame) => frame,
            Err(e) => {
                if matches!(e, RequestError::Timeout(_)) {
                    session.mark_unanswered();
                }
                return Err(e);
            }
        };

        if session.take_unanswered() {
            reply = self.settle_after_timeout(session, reply).await;
        }

        // Every intact reply is acknowledged, whether or not its counter is usable
        session
            .send_frame::<RequestError>(&Frame::new(FrameKind::Ack, reply.sequence, Vec::new()))
            .await?;

        if let Validation::Rejected { expected } = session.tracker_mut().validate(reply.sequence) {
            return Err(RequestError::SequenceMismatch {
                expected,
                received: reply.sequence,
            });
        }

        let raw: [u8; 2] = reply
            .payload
            .as_slice()
            .try_into()
            .map_err(|_| RequestError::BadPayload(reply.payload.len()))?;

        Ok(ParameterRecord::new(
            iteration,
            channel,
            payload::decode(raw, channel.multiplier),
        ))
    }

    /// The previous request went unanswered, so `first` may be its late reply.
    /// If a second reply carrying the following counter shows up, `first` was
    /// late: it is absorbed and the second one answers this request.
    async fn settle_after_timeout<T: Transport>(
        &self,
        session: &mut ConnectionSession<T>,
        first: Frame,
    ) -> Frame {
        let Ok(second) = self.await_reply(session, self.settle).await else {
            return first;
        };

        let rule = session.tracker().rule();
        if second.sequence == rule.next(first.sequence) {
            info!(
                "🕰️ Reply seq {} answered the previous request; using seq {}",
                first.sequence, second.sequence
            );
            self.absorb(session, &first).await;
            second
        } else {
            warn!(
                "⚠️ Dropping extra reply seq {} after seq {}",
                second.sequence, first.sequence
            );
            self.acknowledge(session, &second).await;
            first
        }
    }

    async fn acknowledge<T: Transport>(&self, session: &mut ConnectionSession<T>, frame: &Frame) {
        let ack = Frame::new(FrameKind::Ack, frame.sequence, Vec::new());
        if let Err(e) = session.send_frame::<RequestError>(&ack).await {
            warn!("⚠️ Failed to acknowledge reply seq {}: {}", frame.sequence, e);
        }
    }

    async fn absorb<T: Transport>(&self, session: &mut ConnectionSession<T>, frame: &Frame) {
        self.acknowledge(session, frame).await;

        match session.tracker_mut().validate(frame.sequence) {
            Validation::Accepted => info!("🕰️ Late reply seq {} absorbed, value dropped", frame.sequence),
            Validation::Rejected { expected } => warn!(
                "⚠️ Late reply seq {} does not follow counter (expected {})",
                frame.sequence, expected
            ),
        }
    }

    async fn await_reply<T: Transport>(
        &self,
        session: &mut ConnectionSession<T>,
        wait: Duration,
    ) -> Result<Frame, RequestError> {
        let deadline = Instant::now() + wait;

        loop {
            match session.receive(deadline).await {
                Ok(Ok(frame)) => match frame.kind {
                    FrameKind::Reply => return Ok(frame),
                    FrameKind::Ack => debug!("Drive acknowledged request seq {}", frame.sequence),
                    other => return Err(RequestError::UnexpectedKind(other.to_byte())),
                },
                Ok(Err(e)) => return Err(RequestError::Frame(e)),
                Err(LinkError::Timeout) => return Err(RequestError::Timeout(wait.as_millis() as u64)),
                Err(e) => return Err(RequestError::Link(e)),
            }
        }
    }
}
