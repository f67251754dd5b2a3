use std::time::Duration;

use clap::{Args, ValueEnum};
use labdrive::{
    error::{LabError, LabResult},
    interface::{Adapter, AdapterSettings, InterfaceType, SerialParams, TcpParams, open_adapter},
    protocols::{
        self,
        relay::{self, RelayBoard},
    },
    util::{format_hex_bytes, parse_hex_bytes},
};
use tracing::info;

#[derive(Args, Debug, Clone)]
pub(crate) struct ConnectionOptions {
    /// Serial port
    #[clap(short, long, conflicts_with = "tcp")]
    serial: Option<String>,

    /// Baud rate
    #[clap(short, long)]
    baudrate: Option<u32>,

    /// Socket address as host:port
    #[clap(short, long)]
    tcp: Option<String>,

    /// Timeout in milliseconds
    #[clap(long, default_value_t = 2000)]
    timeout: u64,

    /// Line termination, escapes like \r\n are understood
    #[clap(long)]
    termination: Option<String>,
}

impl ConnectionOptions {
    fn interface(&self, default_baud: Option<u32>) -> LabResult<InterfaceType> {
        match (&self.serial, &self.tcp) {
            (Some(port), _) => Ok(InterfaceType::Serial(SerialParams {
                port: port.clone(),
                baud: self.baudrate.or(default_baud),
            })),
            (None, Some(address)) => {
                let (host, port) = address.rsplit_once(':').ok_or_else(|| {
                    LabError::Configuration(format!("Expected host:port, got {:?}", address))
                })?;
                let port = port
                    .parse()
                    .map_err(|e| LabError::Configuration(format!("Bad port {:?}: {}", port, e)))?;
                Ok(InterfaceType::Tcp(TcpParams {
                    host: host.to_string(),
                    port,
                }))
            }
            (None, None) => Err(LabError::Configuration(
                "Give either --serial or --tcp".to_string(),
            )),
        }
    }

    fn settings(&self) -> AdapterSettings {
        let mut settings = AdapterSettings {
            timeout: Duration::from_millis(self.timeout),
            ..AdapterSettings::default()
        };
        if let Some(termination) = &self.termination {
            let termination = unescape(termination);
            settings.read_termination = termination.clone();
            settings.write_termination = termination;
        }
        settings
    }

    fn open(&self, default_baud: Option<u32>) -> LabResult<Box<dyn Adapter>> {
        let interface = self.interface(default_baud)?;
        info!("Connecting to {}", interface.resource_name());
        open_adapter(&interface, &self.settings())
    }
}

fn unescape(text: &str) -> String {
    text.replace("\\r", "\r").replace("\\n", "\n").replace("\\t", "\t")
}

#[derive(Args, Debug, Clone)]
pub(crate) struct QueryOptions {
    #[command(flatten)]
    connection: ConnectionOptions,

    /// Command to send, e.g. "*IDN?"
    command: String,
}

pub(crate) fn handle_query(opts: QueryOptions) -> LabResult<()> {
    let mut adapter = opts.connection.open(None)?;
    let reply = adapter.ask(&opts.command)?;
    println!("{}", reply);
    adapter.close()
}

#[derive(Args, Debug, Clone)]
pub(crate) struct WriteOptions {
    #[command(flatten)]
    connection: ConnectionOptions,

    /// Command to send
    command: String,
}

pub(crate) fn handle_write(opts: WriteOptions) -> LabResult<()> {
    let mut adapter = opts.connection.open(None)?;
    adapter.write(&opts.command)?;
    adapter.close()
}

#[derive(Args, Debug, Clone)]
pub(crate) struct CrcOptions {
    /// Frame bytes in hex, e.g. "01 03 01 0A 00 02"
    data: String,

    /// Treat the last two bytes as a CRC and check them
    #[clap(short, long, default_value_t = false)]
    check: bool,
}

pub(crate) fn handle_crc(opts: CrcOptions) -> LabResult<()> {
    let mut frame = parse_hex_bytes(&opts.data)?;
    if opts.check {
        protocols::check_crc(&frame)?;
        println!("CRC OK");
    } else {
        protocols::append_crc(&mut frame);
        println!("{}", format_hex_bytes(&frame));
    }
    Ok(())
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RelayAction {
    On,
    Off,
    Toggle,
    Status,
    Firmware,
}

#[derive(Args, Debug, Clone)]
pub(crate) struct RelayOptions {
    #[command(flatten)]
    connection: ConnectionOptions,

    /// What to do
    #[arg(value_enum)]
    action: RelayAction,

    /// Relays to act on, numbered from 1
    relays: Vec<u8>,
}

pub(crate) fn handle_relay(opts: RelayOptions) -> LabResult<()> {
    let mask = relay::relay_mask(opts.relays.iter().copied())?;
    let mut board = RelayBoard::new(opts.connection.open(Some(relay::BAUD_RATE))?);

    match opts.action {
        RelayAction::On => board.switch_on(mask)?,
        RelayAction::Off => board.switch_off(mask)?,
        RelayAction::Toggle => board.toggle(mask)?,
        RelayAction::Status => {
            let status = board.status()?;
            println!("on:     {:?}", relay::relays_in(status.current));
            println!("timers: {:?}", relay::relays_in(status.timers));
        }
        RelayAction::Firmware => {
            let version = board.firmware_version()?;
            println!("firmware {} week {}", version.year, version.week);
        }
    }

    board.close()
}
