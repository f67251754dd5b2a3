use clap::{ArgAction, Parser, Subcommand};
use commands::{CrcOptions, QueryOptions, RelayOptions, WriteOptions};
use labdrive::error::LabResult;

mod commands;

#[derive(Parser, Debug, Clone)]
#[command(version, long_about = None)]
struct Cli {
    /// More logging: -v for debug, -vv to trace every byte
    #[clap(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Send a command and print the reply
    #[command(name = "query", alias = "q")]
    Query(QueryOptions),

    /// Send a command without reading a reply
    #[command(name = "write", alias = "w")]
    Write(WriteOptions),

    /// Append or check a Modbus CRC16, offline
    #[command(name = "crc")]
    Crc(CrcOptions),

    /// Drive a K8090 style relay card
    #[command(name = "relay", alias = "r")]
    Relay(RelayOptions),
}

fn main() -> LabResult<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    match cli.command {
        Command::Query(opts) => commands::handle_query(opts)?,
        Command::Write(opts) => commands::handle_write(opts)?,
        Command::Crc(opts) => commands::handle_crc(opts)?,
        Command::Relay(opts) => commands::handle_relay(opts)?,
    }

    Ok(())
}
