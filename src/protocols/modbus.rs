use tracing::{debug, trace};

use super::{append_crc, check_crc};
use crate::error::{DeviceError, LabError, LabResult};
use crate::interface::Adapter;

const EXCEPTION_FLAG: u8 = 0x80;
const MAX_READ_REGISTERS: u16 = 125;
const MAX_WRITE_REGISTERS: u16 = 123;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionCode {
    ReadRegisters = 0x03,
    WriteRegister = 0x06,
    Echo = 0x08,
    WriteRegisters = 0x10,
}

impl TryFrom<u8> for FunctionCode {
    type Error = LabError;

    fn try_from(code: u8) -> LabResult<Self> {
        match code {
            0x03 => Ok(FunctionCode::ReadRegisters),
            0x06 => Ok(FunctionCode::WriteRegister),
            0x08 => Ok(FunctionCode::Echo),
            0x10 => Ok(FunctionCode::WriteRegisters),
            other => Err(LabError::Framing(format!(
                "Unknown function code {:#04x}",
                other
            ))),
        }
    }
}

fn exception_message(code: u8) -> &'static str {
    match code {
        1 => "Illegal function",
        2 => "Illegal data address",
        3 => "Illegal data value",
        4 => "Server device failure",
        5 => "Acknowledge",
        6 => "Server device busy",
        _ => "Unknown exception",
    }
}

/// Register access to one device on a Modbus-RTU style bus, as used by
/// TC038D temperature controllers.
///
/// The client holds only the device address. The connection is passed per
/// call, so several devices can share one adapter.
#[derive(Debug, Clone, Copy)]
pub struct ModbusClient {
    address: u8,
}

impl ModbusClient {
    pub fn new(address: u8) -> Self {
        ModbusClient { address }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Sends one request and returns the reply data between the function code
    /// and the CRC.
    pub fn request(
        &self,
        adapter: &mut dyn Adapter,
        function: FunctionCode,
        payload: &[u8],
    ) -> LabResult<Vec<u8>> {
        let mut frame = Vec::with_capacity(payload.len() + 4);
        frame.push(self.address);
        frame.push(function as u8);
        frame.extend_from_slice(payload);
        append_crc(&mut frame);
        trace!("Modbus request {:02X?}", frame);
        adapter.write_bytes(&frame)?;

        let mut reply = adapter.read_bytes(2)?;
        let code = reply[1];
        if code == function as u8 | EXCEPTION_FLAG {
            reply.extend(adapter.read_bytes(3)?);
            check_crc(&reply)?;
            let exception = reply[2];
            debug!("Device {} raised exception {}", reply[0], exception);
            return Err(LabError::DeviceReported(vec![DeviceError {
                code: exception as i64,
                message: exception_message(exception).to_string(),
            }]));
        }
        if code != function as u8 {
            return Err(LabError::Framing(format!(
                "Reply function code {:#04x} does not match request {:#04x}",
                code, function as u8
            )));
        }
        match function {
            FunctionCode::ReadRegisters => {
                let count = adapter.read_bytes(1)?;
                reply.extend(&count);
                reply.extend(adapter.read_bytes(count[0] as usize + 2)?);
            }
            FunctionCode::WriteRegister | FunctionCode::Echo | FunctionCode::WriteRegisters => {
                reply.extend(adapter.read_bytes(6)?);
            }
        }
        trace!("Modbus reply {:02X?}", reply);

        let body = check_crc(&reply)?;
        if body[0] != self.address {
            return Err(LabError::Framing(format!(
                "Reply from address {} to a request for {}",
                body[0], self.address
            )));
        }
        Ok(body[2..].to_vec())
    }

    pub fn read_registers(&self, adapter: &mut dyn Adapter, register: u16, count: u16) -> LabResult<Vec<u16>> {
        if count == 0 || count > MAX_READ_REGISTERS {
            return Err(LabError::Validation(format!("Cannot read {} registers at once", count)));
        }
        let mut payload = register.to_be_bytes().to_vec();
        payload.extend_from_slice(&count.to_be_bytes());
        let data = self.request(adapter, FunctionCode::ReadRegisters, &payload)?;

        let (&byte_count, values) = data
            .split_first()
            .ok_or_else(|| LabError::Framing("Empty register reply".to_string()))?;
        if byte_count as usize != 2 * count as usize || values.len() != byte_count as usize {
            return Err(LabError::Framing(format!(
                "Expected {} registers, reply carries {} bytes",
                count, byte_count
            )));
        }
        Ok(values
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect())
    }

    pub fn write_register(&self, adapter: &mut dyn Adapter, register: u16, value: u16) -> LabResult<()> {
        let mut payload = register.to_be_bytes().to_vec();
        payload.extend_from_slice(&value.to_be_bytes());
        let data = self.request(adapter, FunctionCode::WriteRegister, &payload)?;
        expect_echo(&payload, &data)
    }

    pub fn write_registers(&self, adapter: &mut dyn Adapter, register: u16, values: &[u16]) -> LabResult<()> {
        let count = u16::try_from(values.len())
            .ok()
            .filter(|c| (1..=MAX_WRITE_REGISTERS).contains(c))
            .ok_or_else(|| LabError::Validation(format!("Cannot write {} registers at once", values.len())))?;
        let mut payload = register.to_be_bytes().to_vec();
        payload.extend_from_slice(&count.to_be_bytes());
        payload.push((count * 2) as u8);
        for value in values {
            payload.extend_from_slice(&value.to_be_bytes());
        }
        let data = self.request(adapter, FunctionCode::WriteRegisters, &payload)?;
        expect_echo(&payload[..4], &data)
    }

    /// Loopback test: the device returns `data` unchanged.
    pub fn echo(&self, adapter: &mut dyn Adapter, data: u16) -> LabResult<u16> {
        let mut payload = vec![0x00, 0x00];
        payload.extend_from_slice(&data.to_be_bytes());
        let reply = self.request(adapter, FunctionCode::Echo, &payload)?;
        expect_echo(&payload, &reply)?;
        Ok(data)
    }

    /// Reads 32-bit values stored in two registers each, high word first.
    pub fn read_i32(&self, adapter: &mut dyn Adapter, register: u16, count: u16) -> LabResult<Vec<i32>> {
        let words = count
            .checked_mul(2)
            .ok_or_else(|| LabError::Validation(format!("Cannot read {} 32-bit values at once", count)))?;
        let words = self.read_registers(adapter, register, words)?;
        Ok(words
            .chunks_exact(2)
            .map(|pair| (((pair[0] as u32) << 16) | pair[1] as u32) as i32)
            .collect())
    }

    pub fn write_i32s(&self, adapter: &mut dyn Adapter, register: u16, values: &[i32]) -> LabResult<()> {
        let words: Vec<u16> = values
            .iter()
            .flat_map(|v| {
                let v = *v as u32;
                [(v >> 16) as u16, v as u16]
            })
            .collect();
        self.write_registers(adapter, register, &words)
    }
}

fn expect_echo(sent: &[u8], received: &[u8]) -> LabResult<()> {
    if sent != received {
        return Err(LabError::Framing(format!(
            "Device acknowledged {:02X?} instead of {:02X?}",
            received, sent
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::mock::MockAdapter;

    #[test]
    fn registers_are_read_big_endian() {
        let mut mock = MockAdapter::new().expect_bytes(
            &[0x01, 0x03, 0x01, 0x0A, 0x00, 0x02, 0xE5, 0xF5],
            Some(&[0x01, 0x03, 0x04, 0x00, 0x00, 0x01, 0xF4, 0xFA, 0x24]),
        );
        let client = ModbusClient::new(1);
        assert_eq!(client.read_registers(&mut mock, 0x010A, 2).unwrap(), vec![0, 500]);
    }

    #[test]
    fn signed_values_span_two_registers() {
        let mut mock = MockAdapter::new().expect_bytes(
            &[0x01, 0x03, 0x01, 0x0A, 0x00, 0x02, 0xE5, 0xF5],
            Some(&[0x01, 0x03, 0x04, 0xFF, 0xFF, 0xFF, 0xFE, 0x3A, 0x67]),
        );
        assert_eq!(ModbusClient::new(1).read_i32(&mut mock, 0x010A, 1).unwrap(), vec![-2]);
    }

    #[test]
    fn writes_check_the_acknowledgement() {
        let mut mock = MockAdapter::new()
            .expect_bytes(
                &[0x01, 0x10, 0x01, 0x0A, 0x00, 0x02, 0x04, 0x00, 0x00, 0x01, 0xF4, 0x7E, 0x57],
                Some(&[0x01, 0x10, 0x01, 0x0A, 0x00, 0x02, 0x60, 0x36]),
            )
            .expect_bytes(
                &[0x01, 0x06, 0x00, 0x0A, 0x01, 0xF4, 0xA9, 0xDF],
                Some(&[0x01, 0x06, 0x00, 0x0A, 0x01, 0xF4, 0xA9, 0xDF]),
            )
            .expect_bytes(
                &[0x01, 0x08, 0x00, 0x00, 0x12, 0x34, 0xED, 0x7C],
                Some(&[0x01, 0x08, 0x00, 0x00, 0x12, 0x34, 0xED, 0x7C]),
            );
        let client = ModbusClient::new(1);
        client.write_i32s(&mut mock, 0x010A, &[500]).unwrap();
        client.write_register(&mut mock, 0x000A, 500).unwrap();
        assert_eq!(client.echo(&mut mock, 0x1234).unwrap(), 0x1234);
        assert_eq!(mock.remaining(), 0);
    }

    #[test]
    fn exceptions_are_reported_by_the_device() {
        let mut mock = MockAdapter::new().expect_bytes(
            &[0x01, 0x03, 0x01, 0x0A, 0x00, 0x02, 0xE5, 0xF5],
            Some(&[0x01, 0x83, 0x02, 0xC0, 0xF1]),
        );
        match ModbusClient::new(1).read_registers(&mut mock, 0x010A, 2) {
            Err(LabError::DeviceReported(errors)) => {
                assert_eq!(errors[0].code, 2);
                assert_eq!(errors[0].message, "Illegal data address");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn replies_from_other_devices_are_framing_errors() {
        let mut mock = MockAdapter::new().expect_bytes(
            &[0x01, 0x03, 0x01, 0x0A, 0x00, 0x02, 0xE5, 0xF5],
            Some(&[0x02, 0x03, 0x04, 0x00, 0x00, 0x01, 0xF4, 0xC9, 0x24]),
        );
        assert!(matches!(
            ModbusClient::new(1).read_registers(&mut mock, 0x010A, 2),
            Err(LabError::Framing(_))
        ));
    }

    #[test]
    fn corrupted_replies_fail_the_crc() {
        let mut mock = MockAdapter::new().expect_bytes(
            &[0x01, 0x03, 0x01, 0x0A, 0x00, 0x02, 0xE5, 0xF5],
            Some(&[0x01, 0x03, 0x04, 0x00, 0x00, 0x01, 0xF5, 0xFA, 0x24]),
        );
        assert!(matches!(
            ModbusClient::new(1).read_registers(&mut mock, 0x010A, 2),
            Err(LabError::CrcMismatch { .. })
        ));
    }

    #[test]
    fn oversized_requests_never_reach_the_wire() {
        let mut mock = MockAdapter::new();
        let client = ModbusClient::new(1);
        for count in [0, 126, u16::MAX] {
            assert!(matches!(
                client.read_registers(&mut mock, 0, count),
                Err(LabError::Validation(_))
            ));
        }
        assert!(matches!(client.read_i32(&mut mock, 0, 40000), Err(LabError::Validation(_))));
        assert!(matches!(client.read_i32(&mut mock, 0, 63), Err(LabError::Validation(_))));
        assert!(matches!(
            client.write_registers(&mut mock, 0, &[0; 124]),
            Err(LabError::Validation(_))
        ));
        assert!(mock.log().is_empty());
    }

    #[test]
    fn function_codes_round_trip_from_bytes() {
        assert_eq!(FunctionCode::try_from(0x10).unwrap(), FunctionCode::WriteRegisters);
        assert!(FunctionCode::try_from(0x04).is_err());
    }
}
