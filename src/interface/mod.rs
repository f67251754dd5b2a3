pub mod mock;
pub mod serialport;
pub mod tcp;

use std::time::Duration;

use crate::constants::{
    DEFAULT_BAUD_RATE, DEFAULT_READ_TERMINATION, DEFAULT_TIMEOUT_MS, DEFAULT_WRITE_TERMINATION,
};
use crate::error::LabResult;

/// Synchronous transport to one instrument.
///
/// Every call blocks until it completes or the transport times out. Nothing
/// is retried here.
pub trait Adapter: Send {
    /// Send a command, appending the write termination
    fn write(&mut self, command: &str) -> LabResult<()>;

    /// Send raw bytes as they are
    fn write_bytes(&mut self, data: &[u8]) -> LabResult<()>;

    /// Read one reply up to the read termination, which is stripped
    fn read(&mut self) -> LabResult<String>;

    /// Read exactly `count` raw bytes
    fn read_bytes(&mut self, count: usize) -> LabResult<Vec<u8>>;

    /// Write a command and read its reply
    fn ask(&mut self, command: &str) -> LabResult<String> {
        self.write(command)?;
        self.read()
    }

    /// Discard any input the device sent that was not read yet
    fn flush_read_buffer(&mut self) -> LabResult<()>;

    fn close(&mut self) -> LabResult<()> {
        Ok(())
    }
}

impl<A: Adapter + ?Sized> Adapter for Box<A> {
    fn write(&mut self, command: &str) -> LabResult<()> {
        (**self).write(command)
    }

    fn write_bytes(&mut self, data: &[u8]) -> LabResult<()> {
        (**self).write_bytes(data)
    }

    fn read(&mut self) -> LabResult<String> {
        (**self).read()
    }

    fn read_bytes(&mut self, count: usize) -> LabResult<Vec<u8>> {
        (**self).read_bytes(count)
    }

    fn ask(&mut self, command: &str) -> LabResult<String> {
        (**self).ask(command)
    }

    fn flush_read_buffer(&mut self) -> LabResult<()> {
        (**self).flush_read_buffer()
    }

    fn close(&mut self) -> LabResult<()> {
        (**self).close()
    }
}

/// Settings common to every transport.
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterSettings {
    pub timeout: Duration,
    pub read_termination: String,
    pub write_termination: String,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        AdapterSettings {
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            read_termination: DEFAULT_READ_TERMINATION.to_owned(),
            write_termination: DEFAULT_WRITE_TERMINATION.to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialParams {
    pub port: String,
    pub baud: Option<u32>,
}

impl SerialParams {
    pub fn baud_rate(&self) -> u32 {
        self.baud.unwrap_or(DEFAULT_BAUD_RATE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpParams {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterfaceType {
    Serial(SerialParams),
    Tcp(TcpParams),
}

impl InterfaceType {
    /// Resource string in VISA style, e.g. `ASRL/dev/ttyUSB0::INSTR`.
    pub fn resource_name(&self) -> String {
        match self {
            InterfaceType::Serial(params) => format!("ASRL{}::INSTR", params.port),
            InterfaceType::Tcp(params) => {
                format!("TCPIP::{}::{}::SOCKET", params.host, params.port)
            }
        }
    }
}

/// Open the transport described by `interface`.
pub fn open_adapter(
    interface: &InterfaceType,
    settings: &AdapterSettings,
) -> LabResult<Box<dyn Adapter>> {
    let adapter: Box<dyn Adapter> = match interface {
        InterfaceType::Serial(params) => Box::new(serialport::SerialPortAdapter::new(
            &params.port,
            params.baud_rate(),
            settings.clone(),
        )?),
        InterfaceType::Tcp(params) => Box::new(tcp::TcpAdapter::connect(
            &params.host,
            params.port,
            settings.clone(),
        )?),
    };
    Ok(adapter)
}

/// Terminated reads over any byte stream, keeping bytes that arrive after
/// the termination for the next read.
pub(crate) struct TerminatedReader {
    pending: Vec<u8>,
}

impl TerminatedReader {
    pub(crate) fn new() -> Self {
        TerminatedReader {
            pending: Vec::new(),
        }
    }

    pub(crate) fn clear(&mut self) {
        self.pending.clear();
    }

    /// Pull chunks from `fill` until `termination` shows up. An empty
    /// termination returns whatever the first chunk holds.
    pub(crate) fn read_until(
        &mut self,
        termination: &[u8],
        mut fill: impl FnMut(&mut [u8]) -> LabResult<usize>,
    ) -> LabResult<Vec<u8>> {
        let mut chunk = vec![0u8; crate::constants::MAX_RESPONSE_SIZE];
        loop {
            if !termination.is_empty() {
                if let Some(pos) = find(&self.pending, termination) {
                    let mut line: Vec<u8> = self.pending.drain(..pos + termination.len()).collect();
                    line.truncate(pos);
                    return Ok(line);
                }
            } else if !self.pending.is_empty() {
                return Ok(std::mem::take(&mut self.pending));
            }
            let n = fill(&mut chunk)?;
            self.pending.extend_from_slice(&chunk[..n]);
        }
    }

    /// Pull chunks from `fill` until `count` bytes are available.
    pub(crate) fn read_exact(
        &mut self,
        count: usize,
        mut fill: impl FnMut(&mut [u8]) -> LabResult<usize>,
    ) -> LabResult<Vec<u8>> {
        let mut chunk = vec![0u8; crate::constants::MAX_RESPONSE_SIZE];
        while self.pending.len() < count {
            let n = fill(&mut chunk)?;
            self.pending.extend_from_slice(&chunk[..n]);
        }
        Ok(self.pending.drain(..count).collect())
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
