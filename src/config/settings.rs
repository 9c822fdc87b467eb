use clap::ArgMatches;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::devices::{default_channels, ChannelSpec};
use crate::protocol::SequenceRule;
use crate::utils::error::PollError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Connection settings
    pub serial_port: String,
    pub baud_rate: u32,
    pub handshake_timeout_ms: u64,
    pub request_timeout_ms: u64,

    // Polling settings
    pub iterations: u32,
    pub iteration_delay_ms: u64,
    pub resync_on_stale: bool,
    pub sequence: SequenceRule,

    pub output: OutputConfig,

    // Kept last so the TOML tables render after the plain keys
    pub channels: Vec<ChannelSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub file: Option<String>,
    pub append: bool,
    pub summary_prefix: String,
    pub udp_target: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Console,
    Csv,
    Json,
    Line,
}

impl FromStr for OutputFormat {
    type Err = PollError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "console" => Ok(OutputFormat::Console),
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            "line" => Ok(OutputFormat::Line),
            other => Err(PollError::ConfigError(format!("Unknown output format: {}", other))),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Csv,
            file: Some("./data/parameters.csv".to_string()),
            append: false,
            summary_prefix: "VAC;PUMP1".to_string(),
            udp_target: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serial_port: "/dev/ttyUSB0".to_string(),
            baud_rate: 57600,
            handshake_timeout_ms: 1000,
            request_timeout_ms: 5000,
            iterations: 10,
            iteration_delay_ms: 1000,
            resync_on_stale: true,
            sequence: SequenceRule::default(),
            output: OutputConfig::default(),
            channels: default_channels(),
        }
    }
}

fn parse_arg<T: FromStr>(matches: &ArgMatches, name: &str) -> Result<Option<T>, PollError>
where
    T::Err: std::fmt::Display,
{
    matches
        .get_one::<String>(name)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| PollError::ConfigError(format!("Invalid --{} '{}': {}", name, raw, e)))
        })
        .transpose()
}

impl Config {
    /// File (if `--config` is given) or defaults, then command-line overrides.
    pub fn from_matches(matches: &ArgMatches) -> Result<Self, PollError> {
        let mut config = match matches.get_one::<String>("config") {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if let Some(port) = matches.get_one::<String>("port") {
            config.serial_port = port.clone();
        }
        if let Some(baud) = parse_arg(matches, "baud")? {
            config.baud_rate = baud;
        }
        if let Some(iterations) = parse_arg(matches, "iterations")? {
            config.iterations = iterations;
        }
        if let Some(delay) = parse_arg(matches, "delay-ms")? {
            config.iteration_delay_ms = delay;
        }
        if let Some(timeout) = parse_arg(matches, "timeout-ms")? {
            config.request_timeout_ms = timeout;
        }
        if let Some(format) = parse_arg(matches, "format")? {
            config.output.format = format;
        }
        if let Some(file) = matches.get_one::<String>("output-file") {
            config.output.file = Some(file.clone());
        }
        if let Some(target) = matches.get_one::<String>("udp") {
            config.output.udp_target = Some(target.clone());
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, PollError> {
        let path = path.as_ref();
        info!("📄 Loading configuration from {}", path.display());

        let content = std::fs::read_to_string(path)
            .map_err(|e| PollError::ConfigError(format!("Cannot read {}: {}", path.display(), e)))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| PollError::ConfigError(format!("Invalid TOML in {}: {}", path.display(), e)))?;

        debug!("Loaded {} channels from {}", config.channels.len(), path.display());
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), PollError> {
        // Create directory if it doesn't exist
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| PollError::ConfigError(format!("Cannot serialise configuration: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), PollError> {
        if self.iterations == 0 {
            return Err(PollError::ConfigError("iterations must be at least 1".to_string()));
        }
        if !self.sequence.is_valid() {
            return Err(PollError::ConfigError(format!(
                "sequence floor {} must be below ceiling {}",
                self.sequence.floor, self.sequence.ceiling
            )));
        }
        if self.channels.is_empty() {
            return Err(PollError::ConfigError("channel table is empty".to_string()));
        }

        let mut seen = HashSet::new();
        for channel in &self.channels {
            if !seen.insert(channel.channel_id) {
                return Err(PollError::ConfigError(format!(
                    "duplicate channel id {}",
                    channel.channel_id
                )));
            }
        }
        Ok(())
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn iteration_delay(&self) -> Duration {
        Duration::from_millis(self.iteration_delay_ms)
    }
}
