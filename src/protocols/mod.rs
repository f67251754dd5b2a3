pub mod modbus;
pub mod relay;

use crc::{CRC_16_MODBUS, Crc};

use crate::error::{LabError, LabResult};

const MODBUS: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// CRC16 as used by Modbus RTU: init 0xFFFF, reflected polynomial 0x8005.
pub fn crc16(data: &[u8]) -> u16 {
    MODBUS.checksum(data)
}

/// Appends the CRC of `frame`, low byte first.
pub fn append_crc(frame: &mut Vec<u8>) {
    let crc = crc16(frame);
    frame.extend_from_slice(&crc.to_le_bytes());
}

/// Checks the trailing CRC of `frame` and returns the frame without it.
pub fn check_crc(frame: &[u8]) -> LabResult<&[u8]> {
    let Some(split) = frame.len().checked_sub(2) else {
        return Err(LabError::Framing(format!(
            "Frame of {} bytes has no CRC",
            frame.len()
        )));
    };
    let (body, trailer) = frame.split_at(split);
    let computed = crc16(body);
    let received = u16::from_le_bytes([trailer[0], trailer[1]]);
    if computed != received {
        return Err(LabError::CrcMismatch { computed, received });
    }
    Ok(body)
}
