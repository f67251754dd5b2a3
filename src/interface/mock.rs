use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::trace;

use super::Adapter;
use crate::error::{LabError, LabResult};

/// One transfer seen by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exchange {
    Write(Vec<u8>),
    Read(Vec<u8>),
}

#[derive(Debug, Default)]
struct Expectation {
    command: Option<Vec<u8>>,
    reply: Option<Vec<u8>>,
}

#[derive(Debug, Default)]
struct MockState {
    expected: VecDeque<Expectation>,
    input: VecDeque<u8>,
    log: Vec<Exchange>,
    closed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MockAdapter {
    state: Arc<Mutex<MockState>>,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> LabResult<MutexGuard<'_, MockState>> {
        self.state
            .lock()
            .map_err(|_| LabError::Communication("Mock adapter state poisoned".to_string()))
    }

    fn push(&self, expectation: Expectation) {
        if let Ok(mut state) = self.lock() {
            state.expected.push_back(expectation);
        }
    }

    /// Expect `command`, answering with `reply`.
    pub fn expect_ask(self, command: &str, reply: &str) -> Self {
        self.push(Expectation {
            command: Some(command.as_bytes().to_vec()),
            reply: Some(reply.as_bytes().to_vec()),
        });
        self
    }

    /// Expect `command` with no reply.
    pub fn expect_write(self, command: &str) -> Self {
        self.push(Expectation {
            command: Some(command.as_bytes().to_vec()),
            reply: None,
        });
        self
    }

    /// Expect raw bytes, optionally answering with raw bytes.
    pub fn expect_bytes(self, command: &[u8], reply: Option<&[u8]>) -> Self {
        self.push(Expectation {
            command: Some(command.to_vec()),
            reply: reply.map(<[u8]>::to_vec),
        });
        self
    }

    /// Bytes the device sends without being asked, e.g. status frames.
    pub fn inject_unsolicited(&self, data: &[u8]) {
        if let Ok(mut state) = self.lock() {
            state.input.extend(data.iter().copied());
        }
    }

    pub fn log(&self) -> Vec<Exchange> {
        self.lock().map(|s| s.log.clone()).unwrap_or_default()
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.log()
            .into_iter()
            .filter_map(|e| match e {
                Exchange::Write(data) => Some(data),
                Exchange::Read(_) => None,
            })
            .collect()
    }

    /// Commands written so far, as text.
    pub fn written_commands(&self) -> Vec<String> {
        self.writes()
            .into_iter()
            .map(|w| String::from_utf8_lossy(&w).into_owned())
            .collect()
    }

    pub fn read_count(&self) -> usize {
        self.log()
            .iter()
            .filter(|e| matches!(e, Exchange::Read(_)))
            .count()
    }

    /// Expectations not consumed yet.
    pub fn remaining(&self) -> usize {
        self.lock().map(|s| s.expected.len()).unwrap_or(0)
    }

    pub fn is_closed(&self) -> bool {
        self.lock().map(|s| s.closed).unwrap_or(false)
    }

    fn accept(&self, data: &[u8]) -> LabResult<()> {
        let mut state = self.lock()?;
        trace!("Mock received {:?}", data);
        state.log.push(Exchange::Write(data.to_vec()));
        let expectation = state.expected.pop_front().ok_or_else(|| {
            LabError::Communication(format!(
                "Unexpected write {:?}",
                String::from_utf8_lossy(data)
            ))
        })?;
        if let Some(expected) = &expectation.command {
            if expected.as_slice() != data {
                return Err(LabError::Communication(format!(
                    "Expected {:?}, got {:?}",
                    String::from_utf8_lossy(expected),
                    String::from_utf8_lossy(data)
                )));
            }
        }
        if let Some(reply) = expectation.reply {
            state.input.extend(reply);
        }
        Ok(())
    }
}

impl Adapter for MockAdapter {
    fn write(&mut self, command: &str) -> LabResult<()> {
        self.accept(command.as_bytes())
    }

    fn write_bytes(&mut self, data: &[u8]) -> LabResult<()> {
        self.accept(data)
    }

    fn read(&mut self) -> LabResult<String> {
        let mut state = self.lock()?;
        if state.input.is_empty() {
            return Err(LabError::Timeout("Mock adapter has nothing to read".to_string()));
        }
        let reply: Vec<u8> = state.input.drain(..).collect();
        state.log.push(Exchange::Read(reply.clone()));
        String::from_utf8(reply).map_err(|e| LabError::Communication(format!("Invalid UTF-8 reply: {}", e)))
    }

    fn read_bytes(&mut self, count: usize) -> LabResult<Vec<u8>> {
        let mut state = self.lock()?;
        if state.input.len() < count {
            return Err(LabError::Timeout(format!(
                "Mock adapter holds {} of {} requested bytes",
                state.input.len(),
                count
            )));
        }
        let data: Vec<u8> = state.input.drain(..count).collect();
        state.log.push(Exchange::Read(data.clone()));
        Ok(data)
    }

    fn flush_read_buffer(&mut self) -> LabResult<()> {
        self.lock()?.input.clear();
        Ok(())
    }

    fn close(&mut self) -> LabResult<()> {
        self.lock()?.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_asks_are_answered_in_order() {
        let mock = MockAdapter::new()
            .expect_ask("*IDN?", "ACME,1000,42,1.0")
            .expect_write("*RST");
        let mut adapter = mock.clone();
        assert_eq!(adapter.ask("*IDN?").unwrap(), "ACME,1000,42,1.0");
        adapter.write("*RST").unwrap();
        assert_eq!(mock.remaining(), 0);
        assert_eq!(mock.written_commands(), vec!["*IDN?", "*RST"]);
        assert_eq!(mock.read_count(), 1);
    }

    #[test]
    fn unexpected_commands_fail() {
        let mut adapter = MockAdapter::new().expect_write("OUTP 1");
        assert!(adapter.write("OUTP 0").is_err());
        assert!(adapter.write("OUTP 1").is_err());
    }

    #[test]
    fn empty_input_times_out() {
        let mut adapter = MockAdapter::new();
        assert!(matches!(adapter.read(), Err(LabError::Timeout(_))));
        assert!(matches!(adapter.read_bytes(2), Err(LabError::Timeout(_))));
    }

    #[test]
    fn flush_discards_unsolicited_input() {
        let mut adapter = MockAdapter::new();
        adapter.inject_unsolicited(&[1, 2, 3]);
        adapter.flush_read_buffer().unwrap();
        assert!(adapter.read_bytes(1).is_err());
    }
}
