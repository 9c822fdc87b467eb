use anyhow::{bail, Context, Result};
use clap::ArgMatches;
use log::info;

use crate::config::Config;
use crate::devices::ChannelSpec;
use crate::protocol::crc8_maxim;

/// Runs the one-shot subcommands. Returns `false` when the caller should
/// go on to poll.
pub fn handle_subcommands(matches: &ArgMatches, config: &Config) -> Result<bool> {
    if matches.subcommand_matches("channels").is_some() {
        print!("{}", format_channel_table(&config.channels));
        return Ok(true);
    }

    if let Some(matches) = matches.subcommand_matches("crc") {
        let input: Vec<&str> = matches
            .get_many::<String>("bytes")
            .map(|values| values.map(String::as_str).collect())
            .unwrap_or_default();
        let crc = crc_of_hex(&input.join(" "))?;
        println!("CRC-8/Maxim: 0x{:02X}", crc);
        return Ok(true);
    }

    if let Some(matches) = matches.subcommand_matches("init-config") {
        let Some(path) = matches.get_one::<String>("path") else {
            bail!("init-config needs a path");
        };
        info!("📝 Writing configuration to {}", path);
        config
            .save_to_file(path)
            .with_context(|| format!("Failed to write {}", path))?;
        println!("✅ Configuration written to {}", path);
        return Ok(true);
    }

    Ok(false)
}

/// CRC of a hex string; whitespace, `0x` prefixes and `:` separators are ignored.
pub fn crc_of_hex(input: &str) -> Result<u8> {
    let cleaned: String = input
        .split(|c: char| c.is_whitespace() || c == ':')
        .map(|part| part.trim_start_matches("0x").trim_start_matches("0X"))
        .collect();
    let bytes = hex::decode(&cleaned).with_context(|| format!("'{}' is not valid hex", input))?;
    Ok(crc8_maxim(&bytes))
}

pub fn format_channel_table(channels: &[ChannelSpec]) -> String {
    let mut output = format!(
        "📋 Channel table ({})\n{:>5}  {:<20} {:<5} {:>10}\n",
        channels.len(),
        "id",
        "name",
        "unit",
        "multiplier"
    );
    for channel in channels {
        output.push_str(&format!(
            "{:>5}  {:<20} {:<5} {:>10}\n",
            channel.channel_id, channel.name, channel.unit, channel.multiplier
        ));
    }
    output
}
