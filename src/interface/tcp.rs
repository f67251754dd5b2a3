use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;

use tracing::{debug, trace};

use super::{Adapter, AdapterSettings, TerminatedReader};
use crate::error::{LabError, LabResult};

/// Raw socket transport, e.g. the SCPI port 5025 of LXI instruments
pub struct TcpAdapter {
    stream: TcpStream,
    settings: AdapterSettings,
    reader: TerminatedReader,
}

impl TcpAdapter {
    pub fn connect(host: &str, port: u16, settings: AdapterSettings) -> LabResult<TcpAdapter> {
        let stream = TcpStream::connect((host, port))
            .map_err(|e| LabError::Communication(format!("Could not connect to {}:{}: {}", host, port, e)))?;
        stream
            .set_read_timeout(Some(settings.timeout))
            .and_then(|_| stream.set_write_timeout(Some(settings.timeout)))
            .and_then(|_| stream.set_nodelay(true))
            .map_err(|e| LabError::Communication(format!("{:?}", e)))?;
        debug!("Connected to {}:{}", host, port);

        Ok(TcpAdapter {
            stream,
            settings,
            reader: TerminatedReader::new(),
        })
    }

    fn fill(stream: &mut TcpStream, buf: &mut [u8]) -> LabResult<usize> {
        match stream.read(buf) {
            Ok(0) => Err(LabError::Communication("Connection closed by peer".to_string())),
            Ok(n) => {
                trace!("Received bytes {:?}", &buf[..n]);
                Ok(n)
            }
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                Err(LabError::Timeout(format!("socket read: {}", e)))
            }
            Err(e) => Err(LabError::Communication(format!("{:?}", e))),
        }
    }

    fn send(&mut self, data: &[u8]) -> LabResult<()> {
        self.stream.write_all(data).map_err(|e| match e.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => {
                LabError::Timeout(format!("socket write: {}", e))
            }
            _ => LabError::Communication(format!("{:?}", e)),
        })
    }
}

impl Adapter for TcpAdapter {
    fn write(&mut self, command: &str) -> LabResult<()> {
        let line = format!("{}{}", command, self.settings.write_termination);
        trace!("Write {:?}", line);
        self.send(line.as_bytes())
    }

    fn write_bytes(&mut self, data: &[u8]) -> LabResult<()> {
        trace!("Sent bytes {:?}", data);
        self.send(data)
    }

    fn read(&mut self) -> LabResult<String> {
        let stream = &mut self.stream;
        let line = self
            .reader
            .read_until(self.settings.read_termination.as_bytes(), |buf| {
                Self::fill(stream, buf)
            })?;
        String::from_utf8(line).map_err(|e| LabError::Communication(format!("Invalid UTF-8 reply: {}", e)))
    }

    fn read_bytes(&mut self, count: usize) -> LabResult<Vec<u8>> {
        let stream = &mut self.stream;
        self.reader.read_exact(count, |buf| Self::fill(stream, buf))
    }

    fn flush_read_buffer(&mut self) -> LabResult<()> {
        self.reader.clear();
        self.stream
            .set_nonblocking(true)
            .map_err(|e| LabError::Communication(format!("{:?}", e)))?;
        let mut scratch = [0u8; crate::constants::MAX_RESPONSE_SIZE];
        let drained = loop {
            match self.stream.read(&mut scratch) {
                Ok(0) => break Ok(()),
                Ok(n) => trace!("Discarded {} unread bytes", n),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break Ok(()),
                Err(e) => break Err(LabError::Communication(format!("{:?}", e))),
            }
        };
        self.stream
            .set_nonblocking(false)
            .map_err(|e| LabError::Communication(format!("{:?}", e)))?;
        drained
    }

    fn close(&mut self) -> LabResult<()> {
        self.stream
            .shutdown(std::net::Shutdown::Both)
            .map_err(|e| LabError::Communication(format!("{:?}", e)))
    }
}
