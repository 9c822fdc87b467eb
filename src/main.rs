use anyhow::{Context, Result};
use env_logger::Env;
use log::{error, info};

use drive_poll::cli::{build_cli, handle_subcommands};
use drive_poll::{Config, PollService, SerialTransport, VERSION};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let matches = build_cli().get_matches();
    // Global options given after the subcommand land in its matches
    let option_matches = matches.subcommand().map_or(&matches, |(_, sub)| sub);
    let config = Config::from_matches(option_matches).context("Failed to load configuration")?;

    if handle_subcommands(&matches, &config)? {
        return Ok(());
    }

    info!("🖥️  drive-poll {}", VERSION);
    info!(
        "📡 {} channel(s), {} iteration(s), {} ms between iterations, {} ms reply timeout",
        config.channels.len(),
        config.iterations,
        config.iteration_delay_ms,
        config.request_timeout_ms
    );

    let transport = SerialTransport::open(&config.serial_port, config.baud_rate)
        .with_context(|| format!("Cannot open {}", config.serial_port))?;

    let service = PollService::from_config(&config);
    match service.run(transport).await {
        Ok(report) => {
            info!(
                "✅ Collected {} record(s) in run {}",
                report.records.len(),
                report.run_id
            );
            Ok(())
        }
        Err(e) => {
            error!("❌ Poll run failed: {}", e);
            Err(e.into())
        }
    }
}
