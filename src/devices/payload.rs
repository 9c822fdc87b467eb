use serde::{Serialize, Serializer};
use std::fmt;

use super::channel::Multiplier;

/// A scaled reading. Fractional values are kept as exact hundredths so that
/// `10860 x 0.01` is `108.60` and never `108.59999`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaledValue {
    Integer(u16),
    Hundredths(u32),
}

impl ScaledValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            ScaledValue::Integer(v) => f64::from(v),
            ScaledValue::Hundredths(h) => f64::from(h) / 100.0,
        }
    }
}

impl fmt::Display for ScaledValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ScaledValue::Integer(v) => write!(f, "{}", v),
            ScaledValue::Hundredths(h) => write!(f, "{}.{:02}", h / 100, h % 100),
        }
    }
}

impl Serialize for ScaledValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match *self {
            ScaledValue::Integer(v) => serializer.serialize_u16(v),
            ScaledValue::Hundredths(_) => serializer.serialize_f64(self.as_f64()),
        }
    }
}

pub fn scale(raw: u16, multiplier: Multiplier) -> ScaledValue {
    match multiplier {
        Multiplier::One => ScaledValue::Integer(raw),
        Multiplier::Tenth => ScaledValue::Hundredths(u32::from(raw) * 10),
        Multiplier::Hundredth => ScaledValue::Hundredths(u32::from(raw)),
    }
}

/// Payloads are unsigned 16-bit big-endian readings.
pub fn decode(raw: [u8; 2], multiplier: Multiplier) -> ScaledValue {
    scale(u16::from_be_bytes(raw), multiplier)
}
