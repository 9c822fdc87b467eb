use log::{error, info, warn};
use serde::Serialize;
use std::time::Duration;
use tokio::time::sleep;
use uuid::Uuid;

use super::dispatcher::ChannelDispatcher;
use crate::config::{Config, OutputFormat};
use crate::devices::{ChannelSpec, ParameterRecord};
use crate::link::Transport;
use crate::output::{
    ConsoleFormatter, ConsoleSender, CsvFormatter, DataSender, FileSender, JsonFormatter,
    LineFormatter, RecordFormatter, UdpSender,
};
use crate::protocol::{perform_handshake, ConnectionSession, SequenceRule, TrackerState};
use crate::utils::error::{FrameError, PollError, RequestError};

/// Per-run counters, one bucket per failure kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PollStats {
    pub successes: u32,
    pub timeouts: u32,
    pub crc_errors: u32,
    pub malformed: u32,
    pub sequence_errors: u32,
    pub other_errors: u32,
    pub handshakes: u32,
}

impl PollStats {
    pub fn record_success(&mut self) {
        self.successes += 1;
    }

    pub fn record_failure(&mut self, err: &RequestError) {
        match err {
            RequestError::Timeout(_) => self.timeouts += 1,
            RequestError::Frame(FrameError::CrcMismatch { .. }) => self.crc_errors += 1,
            RequestError::Frame(_) | RequestError::BadPayload(_) => self.malformed += 1,
            RequestError::SequenceMismatch { .. } => self.sequence_errors += 1,
            RequestError::UnexpectedKind(_) | RequestError::Link(_) => self.other_errors += 1,
        }
    }

    pub fn failures(&self) -> u32 {
        self.timeouts + self.crc_errors + self.malformed + self.sequence_errors + self.other_errors
    }
}

#[derive(Debug, Clone)]
pub struct PollReport {
    pub run_id: Uuid,
    pub records: Vec<ParameterRecord>,
    pub stats: PollStats,
}

/// Runs the configured number of iterations over one session and hands the
/// collected records to the output senders.
pub struct PollService {
    channels: Vec<ChannelSpec>,
    iterations: u32,
    iteration_delay: Duration,
    handshake_timeout: Duration,
    resync_on_stale: bool,
    rule: SequenceRule,
    dispatcher: ChannelDispatcher,
    formatter: Box<dyn RecordFormatter>,
    senders: Vec<Box<dyn DataSender>>,
}

impl PollService {
    /// Polling core only: console formatter, no senders.
    pub fn new(config: &Config) -> Self {
        Self {
            channels: config.channels.clone(),
            iterations: config.iterations,
            iteration_delay: config.iteration_delay(),
            handshake_timeout: config.handshake_timeout(),
            resync_on_stale: config.resync_on_stale,
            rule: config.sequence,
            dispatcher: ChannelDispatcher::new(config.request_timeout()),
            formatter: Box::new(ConsoleFormatter),
            senders: Vec::new(),
        }
    }

    /// Polling core plus the formatter and senders named in `config.output`.
    pub fn from_config(config: &Config) -> Self {
        let mut service = Self::new(config);
        let output = &config.output;

        let formatter: Box<dyn RecordFormatter> = match output.format {
            OutputFormat::Console => Box::new(ConsoleFormatter),
            OutputFormat::Csv => Box::new(CsvFormatter),
            OutputFormat::Json => Box::new(JsonFormatter),
            OutputFormat::Line => Box::new(LineFormatter::new(
                &output.summary_prefix,
                config.channels.iter().map(|c| c.channel_id).collect(),
            )),
        };
        service.set_formatter(formatter);

        match (&output.format, &output.file) {
            (OutputFormat::Console, _) | (_, None) => service.add_sender(Box::new(ConsoleSender)),
            (_, Some(path)) => service.add_sender(Box::new(FileSender::new(path, output.append))),
        }
        if let Some(target) = &output.udp_target {
            let sender = UdpSender::new(target).datagram_per_line(output.format == OutputFormat::Line);
            service.add_sender(Box::new(sender));
        }

        service
    }

    pub fn add_sender(&mut self, sender: Box<dyn DataSender>) {
        info!("📤 Added {} sender to {}", sender.sender_type(), sender.destination());
        self.senders.push(sender);
    }

    pub fn set_formatter(&mut self, formatter: Box<dyn RecordFormatter>) {
        self.formatter = formatter;
    }

    pub fn channels(&self) -> &[ChannelSpec] {
        &self.channels
    }

    pub async fn run<T: Transport>(&self, transport: T) -> Result<PollReport, PollError> {
        let run_id = Uuid::new_v4();
        info!(
            "🚀 Poll run {}: {} iteration(s) x {} channel(s)",
            run_id,
            self.iterations,
            self.channels.len()
        );

        let mut session = ConnectionSession::new(transport, self.rule);
        if let Err(e) = perform_handshake(&mut session, self.handshake_timeout).await {
            error!("❌ Initial handshake failed, aborting run: {}", e);
            Self::shutdown(session).await;
            return Err(PollError::HandshakeFailure(e));
        }

        let mut records = Vec::with_capacity(self.iterations as usize * self.channels.len());
        let mut stats = PollStats::default();

        for iteration in 1..=self.iterations {
            if self.resync_on_stale && session.tracker().state() == TrackerState::Stale {
                warn!("🔄 Counter out of step, repeating handshake before iteration {}", iteration);
                if let Err(e) = perform_handshake(&mut session, self.handshake_timeout).await {
                    error!("❌ Re-handshake failed, aborting run: {}", e);
                    Self::shutdown(session).await;
                    return Err(PollError::HandshakeFailure(e));
                }
            }

            info!("🔁 Iteration {}/{}", iteration, self.iterations);
            let before = records.len();

            for channel in &self.channels {
                self.dispatcher.absorb_late_replies(&mut session).await;

                let Some(expected) = session.tracker().expected() else {
                    Self::shutdown(session).await;
                    return Err(PollError::NotSynchronized);
                };

                match self.dispatcher.request(&mut session, channel, expected, iteration).await {
                    Ok(record) => {
                        info!(
                            "📊 [{}] {} = {} {}",
                            record.channel_id, record.channel_name, record.scaled_payload, record.unit
                        );
                        stats.record_success();
                        records.push(record);
                    }
                    Err(e) => {
                        Self::log_failure(channel, &e);
                        stats.record_failure(&e);
                    }
                }
            }

            info!(
                "✅ Iteration {} collected {}/{} channel(s)",
                iteration,
                records.len() - before,
                self.channels.len()
            );

            if iteration < self.iterations && !self.iteration_delay.is_zero() {
                sleep(self.iteration_delay).await;
            }
        }

        stats.handshakes = session.handshakes();
        Self::shutdown(session).await;

        info!(
            "🏁 Run {} finished: {} record(s), {} failure(s) (timeout {}, crc {}, malformed {}, sequence {}, other {}), {} handshake(s)",
            run_id,
            records.len(),
            stats.failures(),
            stats.timeouts,
            stats.crc_errors,
            stats.malformed,
            stats.sequence_errors,
            stats.other_errors,
            stats.handshakes
        );

        let report = PollReport { run_id, records, stats };
        self.publish(&report).await?;
        Ok(report)
    }

    /// Formats the report once and passes it to every sender. All senders are
    /// tried; the first failure is returned.
    pub async fn publish(&self, report: &PollReport) -> Result<(), PollError> {
        if self.senders.is_empty() {
            return Ok(());
        }

        let data = self.formatter.format(report)?;
        let mut first_error = None;

        for sender in &self.senders {
            match sender.send(&data).await {
                Ok(()) => info!("✅ Data sent via {} to {}", sender.sender_type(), sender.destination()),
                Err(e) => {
                    error!(
                        "❌ Failed to send via {} to {}: {}",
                        sender.sender_type(),
                        sender.destination(),
                        e
                    );
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn log_failure(channel: &ChannelSpec, err: &RequestError) {
        let id = channel.channel_id;
        let name = &channel.name;
        match err {
            RequestError::Timeout(ms) => warn!("⏰ [{}] {}: no reply within {} ms", id, name, ms),
            RequestError::Frame(FrameError::CrcMismatch { .. }) => {
                error!("❌ [{}] {}: CRC error: {}", id, name, err)
            }
            RequestError::Frame(FrameError::Truncated { .. }) => {
                warn!("✂️ [{}] {}: truncated reply: {}", id, name, err)
            }
            RequestError::SequenceMismatch { .. } => {
                warn!("🔢 [{}] {}: reply discarded: {}", id, name, err)
            }
            _ => error!("❌ [{}] {}: {}", id, name, err),
        }
    }

    async fn shutdown<T: Transport>(session: ConnectionSession<T>) {
        if let Err(e) = session.close().await {
            warn!("⚠️ Failed to close link cleanly: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{payload, ScaledValue};
    use crate::link::mock::{Fault, ScriptedDrive};
    use crate::protocol::CounterDirection;
    use std::sync::atomic::Ordering;
    use crate::utils::error::HandshakeError;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    fn test_config(iterations: u32) -> Config {
        Config {
            iterations,
            iteration_delay_ms: 0,
            handshake_timeout_ms: 100,
            request_timeout_ms: 100,
            ..Config::default()
        }
    }

    struct CaptureSender {
        sent: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl DataSender for CaptureSender {
        async fn send(&self, data: &str) -> Result<(), PollError> {
            self.sent.lock().unwrap().push(data.to_string());
            Ok(())
        }

        fn sender_type(&self) -> &str {
            "capture"
        }

        fn destination(&self) -> &str {
            "memory"
        }
    }

    #[tokio::test]
    async fn test_full_run_collects_every_channel() {
        let config = test_config(10);
        let drive = ScriptedDrive::new(4).with_values(|channel_id, ordinal| {
            if channel_id == 1 {
                10000 + ordinal as u16
            } else {
                ordinal as u16
            }
        });

        let closed = drive.closed_flag();

        let report = PollService::new(&config).run(drive).await.unwrap();

        assert!(closed.load(Ordering::SeqCst));
        assert_eq!(report.records.len(), 120);
        assert_eq!(report.stats.successes, 120);
        assert_eq!(report.stats.failures(), 0);
        assert_eq!(report.stats.handshakes, 1);

        let expected_order: Vec<u16> = config.channels.iter().map(|c| c.channel_id).collect();
        for (i, chunk) in report.records.chunks(12).enumerate() {
            let ids: Vec<u16> = chunk.iter().map(|r| r.channel_id).collect();
            assert_eq!(ids, expected_order);
            assert!(chunk.iter().all(|r| r.iteration == i as u32 + 1));
        }

        let output_freq: Vec<&ParameterRecord> =
            report.records.iter().filter(|r| r.channel_id == 1).collect();
        assert_eq!(output_freq.len(), 10);
        for (i, record) in output_freq.iter().enumerate() {
            let raw = 10000 + (i * 12 + 1) as u32;
            assert_eq!(record.channel_name, "Output Freq");
            assert_eq!(record.scaled_payload, ScaledValue::Hundredths(raw));
            assert!((record.scaled_payload.as_f64() - f64::from(raw) / 100.0).abs() < 1e-9);
        }
    }

    #[tokio::test]
    async fn test_silent_channel_is_skipped() {
        let drive = ScriptedDrive::new(4).with_fault(3, Fault::Silent);

        let report = PollService::new(&test_config(2)).run(drive).await.unwrap();

        assert_eq!(report.records.len(), 23);
        assert_eq!(report.stats.timeouts, 1);
        let first: Vec<u16> = report
            .records
            .iter()
            .filter(|r| r.iteration == 1)
            .map(|r| r.channel_id)
            .collect();
        assert_eq!(first.len(), 11);
        assert!(!first.contains(&2));
        assert!(first.contains(&3));
    }

    #[tokio::test]
    async fn test_lost_reply_triggers_rehandshake() {
        // The drive advances past a corrupted reply the host never accepted.
        // Replies are rejected until the drive's counter wraps round to the
        // value the host still expects.
        let drive = ScriptedDrive::new(4).with_fault(1, Fault::CorruptCrc);

        let report = PollService::new(&test_config(2)).run(drive).await.unwrap();

        assert_eq!(report.stats.crc_errors, 1);
        assert_eq!(report.stats.sequence_errors, 3);
        assert_eq!(report.stats.handshakes, 2);
        assert_eq!(report.records.len(), 20);
        assert_eq!(report.records.iter().filter(|r| r.iteration == 1).count(), 8);
        assert_eq!(report.records[0].channel_id, 4);
    }

    #[tokio::test]
    async fn test_stale_tracker_kept_without_resync() {
        let mut config = test_config(2);
        config.resync_on_stale = false;
        let drive = ScriptedDrive::new(4).with_fault(1, Fault::CorruptCrc);

        let report = PollService::new(&config).run(drive).await.unwrap();

        assert_eq!(report.stats.handshakes, 1);
        assert_eq!(report.stats.sequence_errors, 3);
        assert_eq!(report.records.len(), 20);
    }

    #[tokio::test]
    async fn test_handshake_timeout_aborts_run() {
        let drive = ScriptedDrive::mute();
        let closed = drive.closed_flag();

        let err = PollService::new(&test_config(10)).run(drive).await.unwrap_err();

        assert!(matches!(err, PollError::HandshakeFailure(HandshakeError::Timeout(100))));
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_corrupt_handshake_aborts_run() {
        let err = PollService::new(&test_config(10))
            .run(ScriptedDrive::new(4).with_corrupt_handshake())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PollError::HandshakeFailure(HandshakeError::Frame(FrameError::CrcMismatch { .. }))
        ));
    }

    #[tokio::test]
    async fn test_report_published_as_csv() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let mut service = PollService::new(&test_config(1));
        service.set_formatter(Box::new(CsvFormatter));
        service.add_sender(Box::new(CaptureSender { sent: sent.clone() }));

        service.run(ScriptedDrive::new(7)).await.unwrap();

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let lines: Vec<&str> = sent[0].lines().collect();
        assert_eq!(lines.len(), 13);
        assert_eq!(lines[0], "iteration,channel_id,channel_name,payload,unit");
        assert_eq!(lines[1], "1,1,Output Freq,108.60,Hz");
        assert_eq!(lines[3], "1,2,Motor shaft speed,10860,rpm");
    }

    fn assert_values_match_channels(config: &Config, report: &PollReport) {
        for record in &report.records {
            let channel = config
                .channels
                .iter()
                .find(|c| c.channel_id == record.channel_id)
                .unwrap();
            assert_eq!(record.scaled_payload, payload::scale(record.channel_id, channel.multiplier));
        }
    }

    #[tokio::test]
    async fn test_late_reply_not_recorded_for_next_channel() {
        let config = test_config(2);
        let drive = ScriptedDrive::new(4)
            .with_values(|id, _| id)
            .with_fault(1, Fault::Late);

        let report = PollService::new(&config).run(drive).await.unwrap();

        assert_eq!(report.stats.timeouts, 1);
        assert_eq!(report.stats.sequence_errors, 0);
        assert_eq!(report.stats.handshakes, 1);
        assert_eq!(report.records.len(), 23);
        assert_values_match_channels(&config, &report);
    }

    #[tokio::test]
    async fn test_reply_crossing_next_request_not_recorded_for_it() {
        let config = test_config(2);
        let drive = ScriptedDrive::new(4)
            .with_values(|id, _| id)
            .with_fault(5, Fault::AfterNextRequest);

        let report = PollService::new(&config).run(drive).await.unwrap();

        assert_eq!(report.stats.timeouts, 1);
        assert_eq!(report.stats.sequence_errors, 0);
        assert_eq!(report.records.len(), 23);
        assert!(!report.records.iter().any(|r| r.iteration == 1 && r.channel_id == 4));
        assert_values_match_channels(&config, &report);
    }

    #[tokio::test]
    async fn test_descending_counter_run() {
        let mut config = test_config(3);
        config.sequence.direction = CounterDirection::Descending;
        let drive = ScriptedDrive::new(4)
            .with_rule(config.sequence)
            .with_values(|id, _| id);

        let report = PollService::new(&config).run(drive).await.unwrap();

        assert_eq!(report.records.len(), 36);
        assert_eq!(report.stats.failures(), 0);
        assert_eq!(report.stats.handshakes, 1);
        assert_values_match_channels(&config, &report);
    }

    #[tokio::test]
    async fn test_descending_host_against_ascending_drive_resyncs_each_iteration() {
        let mut config = test_config(2);
        config.sequence.direction = CounterDirection::Descending;

        let report = PollService::new(&config).run(ScriptedDrive::new(5)).await.unwrap();

        // Seed 5: the drive sends 6, 7, 4, 5, ... while the host expects 4 first
        assert_eq!(report.stats.handshakes, 2);
        assert!(report.stats.sequence_errors > 0);
    }

    #[test]
    fn test_stats_buckets() {
        let mut stats = PollStats::default();
        stats.record_failure(&RequestError::Timeout(5000));
        stats.record_failure(&RequestError::Frame(FrameError::CrcMismatch { calculated: 1, received: 2 }));
        stats.record_failure(&RequestError::Frame(FrameError::Truncated { needed: 9, available: 4 }));
        stats.record_failure(&RequestError::SequenceMismatch { expected: 5, received: 4 });
        stats.record_failure(&RequestError::UnexpectedKind(0x80));

        assert_eq!(stats.timeouts, 1);
        assert_eq!(stats.crc_errors, 1);
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.sequence_errors, 1);
        assert_eq!(stats.other_errors, 1);
        assert_eq!(stats.failures(), 5);
    }
}
