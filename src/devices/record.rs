use chrono::{DateTime, Utc};
use serde::Serialize;

use super::channel::ChannelSpec;
use super::payload::ScaledValue;

/// One validated reading. Created right after a reply passes CRC and
/// sequence checks and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterRecord {
    pub iteration: u32,
    pub channel_id: u16,
    pub channel_name: String,
    #[serde(rename = "payload")]
    pub scaled_payload: ScaledValue,
    pub unit: String,
    pub captured_at: DateTime<Utc>,
}

impl ParameterRecord {
    pub fn new(iteration: u32, channel: &ChannelSpec, scaled_payload: ScaledValue) -> Self {
        Self {
            iteration,
            channel_id: channel.channel_id,
            channel_name: channel.name.clone(),
            scaled_payload,
            unit: channel.unit.clone(),
            captured_at: Utc::now(),
        }
    }
}
