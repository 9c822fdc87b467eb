use clap::{Arg, ArgAction, Command};

pub fn build_cli() -> Command {
    Command::new("drive-poll")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Polls drive parameters over a counter-synchronized serial link")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("TOML configuration file")
                .global(true),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("Serial port, e.g. /dev/ttyUSB0 or COM3")
                .global(true),
        )
        .arg(Arg::new("baud").long("baud").value_name("RATE").global(true))
        .arg(
            Arg::new("iterations")
                .short('n')
                .long("iterations")
                .value_name("COUNT")
                .help("Number of passes over the channel table")
                .global(true),
        )
        .arg(
            Arg::new("delay-ms")
                .long("delay-ms")
                .value_name("MS")
                .help("Pause between iterations")
                .global(true),
        )
        .arg(
            Arg::new("timeout-ms")
                .long("timeout-ms")
                .value_name("MS")
                .help("Per-request reply timeout")
                .global(true),
        )
        .arg(
            Arg::new("format")
                .short('f')
                .long("format")
                .value_name("FORMAT")
                .value_parser(["console", "csv", "json", "line"])
                .global(true),
        )
        .arg(
            Arg::new("output-file")
                .short('o')
                .long("output-file")
                .value_name("FILE")
                .global(true),
        )
        .arg(
            Arg::new("udp")
                .long("udp")
                .value_name("HOST:PORT")
                .help("Also send the formatted report as a UDP datagram")
                .global(true),
        )
        .subcommand(Command::new("poll").about("Run the polling iterations (default)"))
        .subcommand(Command::new("channels").about("Print the channel table"))
        .subcommand(
            Command::new("crc")
                .about("Print the CRC-8/Maxim of hex bytes")
                .arg(Arg::new("bytes").required(true).action(ArgAction::Append)),
        )
        .subcommand(
            Command::new("init-config")
                .about("Write the default configuration")
                .arg(Arg::new("path").required(true)),
        )
}
