use log::{debug, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterDirection {
    Ascending,
    Descending,
}

/// How the drive advances its reply counter: one step per round trip,
/// wrapping inside `[floor, ceiling]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceRule {
    pub floor: u8,
    pub ceiling: u8,
    pub direction: CounterDirection,
}

impl Default for SequenceRule {
    fn default() -> Self {
        Self {
            floor: 4,
            ceiling: 7,
            direction: CounterDirection::Ascending,
        }
    }
}

impl SequenceRule {
    pub fn next(&self, current: u8) -> u8 {
        match self.direction {
            CounterDirection::Ascending => {
                if current >= self.ceiling || current < self.floor {
                    self.floor
                } else {
                    current + 1
                }
            }
            CounterDirection::Descending => {
                if current <= self.floor || current > self.ceiling {
                    self.ceiling
                } else {
                    current - 1
                }
            }
        }
    }

    pub fn is_valid(&self) -> bool {
        self.floor < self.ceiling
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Unsynchronized,
    Synchronized,
    /// A mismatch was seen since the last handshake.
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    Accepted,
    Rejected { expected: u8 },
}

/// Rolling counter state for one session. Only a handshake seeds it, and
/// only a matching reply advances it.
#[derive(Debug, Clone)]
pub struct SequenceTracker {
    rule: SequenceRule,
    state: TrackerState,
    last_good: Option<u8>,
}

impl SequenceTracker {
    pub fn new(rule: SequenceRule) -> Self {
        Self {
            rule,
            state: TrackerState::Unsynchronized,
            last_good: None,
        }
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn rule(&self) -> SequenceRule {
        self.rule
    }

    pub fn last_good(&self) -> Option<u8> {
        self.last_good
    }

    pub fn synchronize(&mut self, seed: u8) {
        debug!("🔢 Sequence seeded with {}", seed);
        self.last_good = Some(seed);
        self.state = TrackerState::Synchronized;
    }

    /// Counter value the next reply must carry. `None` before the first handshake.
    pub fn expected(&self) -> Option<u8> {
        self.last_good.map(|c| self.rule.next(c))
    }

    pub fn validate(&mut self, received: u8) -> Validation {
        let Some(expected) = self.expected() else {
            warn!("⚠️ Reply counter {} received before handshake", received);
            return Validation::Rejected { expected: 0 };
        };

        if received == expected {
            self.last_good = Some(received);
            Validation::Accepted
        } else {
            if self.state != TrackerState::Stale {
                warn!("⚠️ Sequence tracker stale: expected {}, received {}", expected, received);
            }
            self.state = TrackerState::Stale;
            Validation::Rejected { expected }
        }
    }
}
