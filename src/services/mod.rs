pub mod dispatcher;
pub mod poll_service;

pub use dispatcher::ChannelDispatcher;
pub use poll_service::{PollReport, PollService, PollStats};
