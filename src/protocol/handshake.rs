use log::{debug, error, info, warn};
use std::time::Duration;
use tokio::time::Instant;

use super::frame::{Frame, FrameKind};
use super::session::ConnectionSession;
use crate::link::Transport;
use crate::utils::error::{HandshakeError, LinkError};

/// Payload of the confirmation the host sends once it has the seed.
pub const CONFIRM_PAYLOAD: [u8; 2] = [0x00, 0x00];

/// Seeds the session's sequence tracker from the drive.
///
/// Sends a handshake request, waits for the drive's handshake frame, takes its
/// sequence byte as the counter seed and confirms with an ack that echoes it.
/// Any failure here leaves the tracker untouched.
pub async fn perform_handshake<T: Transport>(
    session: &mut ConnectionSession<T>,
    timeout: Duration,
) -> Result<u8, HandshakeError> {
    info!("🤝 Starting handshake (timeout {} ms)", timeout.as_millis());
    session.discard_input();

    session
        .send_frame::<HandshakeError>(&Frame::new(FrameKind::Handshake, 0, Vec::new()))
        .await?;

    let deadline = Instant::now() + timeout;
    let reply = loop {
        match session.receive(deadline).await {
            Ok(Ok(frame)) => match frame.kind {
                FrameKind::Handshake => break frame,
                FrameKind::Ack => debug!("Skipping drive ack during handshake"),
                FrameKind::Reply => warn!("⚠️ Skipping stray reply seq {} during handshake", frame.sequence),
                other => {
                    error!("❌ HANDSHAKE: unexpected {:?} frame", other);
                    return Err(HandshakeError::UnexpectedKind(other.to_byte()));
                }
            },
            Ok(Err(e)) => {
                error!("❌ HANDSHAKE: invalid frame: {}", e);
                return Err(HandshakeError::Frame(e));
            }
            Err(LinkError::Timeout) => {
                warn!("⏰ Handshake timeout");
                return Err(HandshakeError::Timeout(timeout.as_millis() as u64));
            }
            Err(e) => return Err(HandshakeError::Link(e)),
        }
    };

    let seed = reply.sequence;
    session.tracker_mut().synchronize(seed);

    session
        .send_frame::<HandshakeError>(&Frame::new(FrameKind::Ack, seed, CONFIRM_PAYLOAD.to_vec()))
        .await?;
    session.record_handshake();

    info!("✅ HANDSHAKE: counter seeded with {}", seed);
    Ok(seed)
}
