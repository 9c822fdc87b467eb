//! In-memory drive simulator used by the protocol tests.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::transport::Transport;
use crate::protocol::frame::{decode, encode, Frame, FrameKind};
use crate::protocol::sequence::SequenceRule;
use crate::utils::error::LinkError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Never answer the request.
    Silent,
    /// Answer with the last byte flipped.
    CorruptCrc,
    /// Answer with a counter the host cannot expect; the drive's own counter does not move.
    StaleSequence,
    /// Answer with a counter that skips ahead; the drive's own counter moves there.
    SkipSequence,
    /// Send only the first half of the reply.
    Truncated,
    /// Answer only after the host has given up waiting, before its next request.
    Late,
    /// Answer only once the host's next frame has arrived, just ahead of the answer to that frame.
    AfterNextRequest,
}

pub struct ScriptedDrive {
    rule: SequenceRule,
    counter: u8,
    handshake_seed: Option<u8>,
    corrupt_handshake: bool,
    ack_requests: bool,
    chunk_size: usize,
    value_for: Box<dyn Fn(u16, usize) -> u16 + Send>,
    faults: HashMap<usize, Fault>,
    requests_seen: usize,
    outbox: VecDeque<u8>,
    held_until_timeout: Vec<u8>,
    held_until_write: Vec<u8>,
    closed: Arc<AtomicBool>,
    pub sent: Vec<Frame>,
}

impl ScriptedDrive {
    pub fn new(handshake_seed: u8) -> Self {
        Self {
            rule: SequenceRule::default(),
            counter: handshake_seed,
            handshake_seed: Some(handshake_seed),
            corrupt_handshake: false,
            ack_requests: true,
            chunk_size: usize::MAX,
            value_for: Box::new(|_, _| 10860),
            faults: HashMap::new(),
            requests_seen: 0,
            outbox: VecDeque::new(),
            held_until_timeout: Vec::new(),
            held_until_write: Vec::new(),
            closed: Arc::new(AtomicBool::new(false)),
            sent: Vec::new(),
        }
    }

    pub fn mute() -> Self {
        let mut drive = Self::new(0);
        drive.handshake_seed = None;
        drive
    }

    pub fn with_rule(mut self, rule: SequenceRule) -> Self {
        self.rule = rule;
        self
    }

    pub fn with_values(mut self, f: impl Fn(u16, usize) -> u16 + Send + 'static) -> Self {
        self.value_for = Box::new(f);
        self
    }

    /// Fault applied to the n-th request (1-based) the drive receives.
    pub fn with_fault(mut self, request_ordinal: usize, fault: Fault) -> Self {
        self.faults.insert(request_ordinal, fault);
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn without_request_acks(mut self) -> Self {
        self.ack_requests = false;
        self
    }

    pub fn with_corrupt_handshake(mut self) -> Self {
        self.corrupt_handshake = true;
        self
    }

    /// Stays readable after the drive has been moved into a session.
    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        self.closed.clone()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn frames_of(&self, kind: FrameKind) -> Vec<&Frame> {
        self.sent.iter().filter(|f| f.kind == kind).collect()
    }

    fn queue(&mut self, bytes: &[u8]) {
        self.outbox.extend(bytes.iter().copied());
    }

    fn queue_frame(&mut self, kind: FrameKind, sequence: u8, payload: &[u8]) {
        let bytes = encode(kind, sequence, payload).unwrap();
        self.queue(&bytes);
    }

    fn on_request(&mut self, request: &Frame) {
        self.requests_seen += 1;
        let channel_id = u16::from_be_bytes([request.payload[2], request.payload[3]]);
        let fault = self.faults.get(&self.requests_seen).copied();

        if fault == Some(Fault::Silent) {
            return;
        }
        if self.ack_requests {
            self.queue_frame(FrameKind::Ack, request.sequence, &[]);
        }

        let value = (self.value_for)(channel_id, self.requests_seen).to_be_bytes();
        let sequence = match fault {
            Some(Fault::StaleSequence) => self.counter,
            Some(Fault::SkipSequence) => {
                self.counter = self.rule.next(self.rule.next(self.counter));
                self.counter
            }
            _ => {
                self.counter = self.rule.next(self.counter);
                self.counter
            }
        };

        let mut reply = encode(FrameKind::Reply, sequence, &value).unwrap();
        match fault {
            Some(Fault::CorruptCrc) => {
                let last = reply.len() - 1;
                reply[last] ^= 0xFF;
            }
            Some(Fault::Truncated) => reply.truncate(reply.len() / 2),
            _ => {}
        }
        match fault {
            Some(Fault::Late) => self.held_until_timeout.extend_from_slice(&reply),
            Some(Fault::AfterNextRequest) => self.held_until_write.extend_from_slice(&reply),
            _ => self.queue(&reply),
        }
    }
}

#[async_trait]
impl Transport for ScriptedDrive {
    async fn write(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        if self.is_closed() {
            return Err(LinkError::Closed);
        }
        let frame = decode(bytes).expect("host wrote an invalid frame");
        self.sent.push(frame.clone());

        let held = std::mem::take(&mut self.held_until_write);
        self.queue(&held);

        match frame.kind {
            FrameKind::Handshake => {
                if let Some(seed) = self.handshake_seed {
                    self.counter = seed;
                    let mut reply = encode(FrameKind::Handshake, seed, &[]).unwrap();
                    if self.corrupt_handshake {
                        let last = reply.len() - 1;
                        reply[last] ^= 0x55;
                    }
                    self.queue(&reply);
                }
            }
            FrameKind::Request => self.on_request(&frame),
            FrameKind::Ack | FrameKind::Reply => {}
        }
        Ok(())
    }

    async fn read(&mut self, max_bytes: usize, _timeout: Duration) -> Result<Vec<u8>, LinkError> {
        if self.is_closed() {
            return Err(LinkError::Closed);
        }
        if self.outbox.is_empty() {
            // Whatever was held back lands just after this deadline
            let held = std::mem::take(&mut self.held_until_timeout);
            self.queue(&held);
            return Err(LinkError::Timeout);
        }
        let n = self.outbox.len().min(max_bytes).min(self.chunk_size);
        Ok(self.outbox.drain(..n).collect())
    }

    async fn close(&mut self) -> Result<(), LinkError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
