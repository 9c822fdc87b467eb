use serde::{Deserialize, Serialize};
use std::fmt;

/// Scale factor applied to a raw reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub enum Multiplier {
    One,
    Tenth,
    Hundredth,
}

impl TryFrom<f64> for Multiplier {
    type Error = String;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        const EPSILON: f64 = 1e-9;
        if (value - 1.0).abs() < EPSILON {
            Ok(Multiplier::One)
        } else if (value - 0.1).abs() < EPSILON {
            Ok(Multiplier::Tenth)
        } else if (value - 0.01).abs() < EPSILON {
            Ok(Multiplier::Hundredth)
        } else {
            Err(format!("unsupported multiplier {} (expected 1, 0.1 or 0.01)", value))
        }
    }
}

impl From<Multiplier> for f64 {
    fn from(multiplier: Multiplier) -> Self {
        match multiplier {
            Multiplier::One => 1.0,
            Multiplier::Tenth => 0.1,
            Multiplier::Hundredth => 0.01,
        }
    }
}

impl fmt::Display for Multiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", f64::from(*self))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Integer,
    Decimal2,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSpec {
    pub channel_id: u16,
    pub name: String,
    pub unit: String,
    pub multiplier: Multiplier,
}

impl ChannelSpec {
    pub fn new(channel_id: u16, name: &str, unit: &str, multiplier: Multiplier) -> Self {
        Self {
            channel_id,
            name: name.to_string(),
            unit: unit.to_string(),
            multiplier,
        }
    }

    pub fn output_kind(&self) -> OutputKind {
        match self.multiplier {
            Multiplier::One => OutputKind::Integer,
            Multiplier::Tenth | Multiplier::Hundredth => OutputKind::Decimal2,
        }
    }
}

/// The drive's parameter table, in polling order.
pub fn default_channels() -> Vec<ChannelSpec> {
    use Multiplier::*;

    vec![
        ChannelSpec::new(1, "Output Freq", "Hz", Hundredth),
        ChannelSpec::new(25, "Freq Ref.", "Hz", Hundredth),
        ChannelSpec::new(2, "Motor shaft speed", "rpm", One),
        ChannelSpec::new(3, "Motor Current", "A", Hundredth),
        ChannelSpec::new(4, "Motor Torque", "%", Tenth),
        ChannelSpec::new(5, "Motor Power", "%", Tenth),
        ChannelSpec::new(6, "Motor Voltage", "V", Tenth),
        ChannelSpec::new(9, "Motor Temperature", "°C", One),
        ChannelSpec::new(7, "DC-link Voltage", "V", One),
        ChannelSpec::new(8, "Unit Temperature", "°C", One),
        ChannelSpec::new(1825, "Board Temp", "°C", One),
        ChannelSpec::new(1899, "Service counter", "h", One),
    ]
}
