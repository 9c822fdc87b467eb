pub mod channel;
pub mod payload;
pub mod record;

pub use channel::{default_channels, ChannelSpec, Multiplier, OutputKind};
pub use payload::ScaledValue;
pub use record::ParameterRecord;
