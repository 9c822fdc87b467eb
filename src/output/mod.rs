pub mod formatters;
pub mod senders;

pub use formatters::{ConsoleFormatter, CsvFormatter, JsonFormatter, LineFormatter, RecordFormatter};
pub use senders::{ConsoleSender, DataSender, FileSender, UdpSender};
