use tracing::trace;

use super::{Adapter, AdapterSettings, TerminatedReader};
use crate::error::{LabError, LabResult};
use std::io::{Read, Write};

pub type BaudRate = u32;

/// Serial port transport
pub struct SerialPortAdapter {
    serial_port: Box<dyn ::serialport::SerialPort>,
    settings: AdapterSettings,
    reader: TerminatedReader,
}

impl SerialPortAdapter {
    pub fn new(port: &str, baud: BaudRate, settings: AdapterSettings) -> LabResult<SerialPortAdapter> {
        let serial_port = ::serialport::new(port, baud)
            .timeout(settings.timeout)
            .open()
            .map_err(|e| LabError::Communication(format!("Could not open {}: {:?}", port, e)))?;

        Ok(SerialPortAdapter {
            serial_port,
            settings,
            reader: TerminatedReader::new(),
        })
    }

    fn fill(serial_port: &mut Box<dyn ::serialport::SerialPort>, buf: &mut [u8]) -> LabResult<usize> {
        match serial_port.read(buf) {
            Ok(0) => Err(LabError::Timeout("serial port returned no data".to_string())),
            Ok(n) => {
                trace!("Received bytes {:?}", &buf[..n]);
                Ok(n)
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                Err(LabError::Timeout(format!("serial read: {}", e)))
            }
            Err(e) => Err(LabError::Communication(format!("{:?}", e))),
        }
    }
}

impl Adapter for SerialPortAdapter {
    fn write(&mut self, command: &str) -> LabResult<()> {
        let line = format!("{}{}", command, self.settings.write_termination);
        trace!("Write {:?}", line);
        self.serial_port
            .write_all(line.as_bytes())
            .map_err(|e| LabError::Communication(format!("{:?}", e)))
    }

    fn write_bytes(&mut self, data: &[u8]) -> LabResult<()> {
        trace!("Sent bytes {:?}", data);
        self.serial_port
            .write_all(data)
            .map_err(|e| LabError::Communication(format!("{:?}", e)))
    }

    fn read(&mut self) -> LabResult<String> {
        let port = &mut self.serial_port;
        let line = self
            .reader
            .read_until(self.settings.read_termination.as_bytes(), |buf| {
                Self::fill(port, buf)
            })?;
        String::from_utf8(line).map_err(|e| LabError::Communication(format!("Invalid UTF-8 reply: {}", e)))
    }

    fn read_bytes(&mut self, count: usize) -> LabResult<Vec<u8>> {
        let port = &mut self.serial_port;
        self.reader.read_exact(count, |buf| Self::fill(port, buf))
    }

    fn flush_read_buffer(&mut self) -> LabResult<()> {
        self.reader.clear();
        self.serial_port
            .clear(::serialport::ClearBuffer::Input)
            .map_err(|e| {
                LabError::Communication(format!("Failed to flush receive buffer, {}", e))
            })
    }
}
