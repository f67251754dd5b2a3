use tracing::{debug, trace};

use crate::error::{LabError, LabResult};
use crate::interface::Adapter;

/// Fixed line speed of the card's USB serial bridge.
pub const BAUD_RATE: u32 = 19200;
pub const PACKET_LEN: usize = 7;
pub const STX: u8 = 0x04;
pub const ETX: u8 = 0x0F;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SwitchOn = 0x11,
    SwitchOff = 0x12,
    Toggle = 0x14,
    QueryRelays = 0x18,
    SetButtonMode = 0x21,
    QueryButtonMode = 0x22,
    StartTimer = 0x41,
    SetTimer = 0x42,
    QueryTimer = 0x44,
    ButtonStatus = 0x50,
    RelayStatus = 0x51,
    FactoryDefaults = 0x66,
    JumperStatus = 0x70,
    FirmwareVersion = 0x71,
}

/// `1 + 0xFF - (sum & 0xFF)`, i.e. the two's complement of the byte sum.
pub fn make_checksum(command: u8, mask: u8, param1: u8, param2: u8) -> u8 {
    [STX, command, mask, param1, param2]
        .iter()
        .fold(0u8, |sum, b| sum.wrapping_add(*b))
        .wrapping_neg()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet {
    pub command: u8,
    pub mask: u8,
    pub param1: u8,
    pub param2: u8,
}

impl Packet {
    pub fn new(command: Command, mask: u8, param1: u8, param2: u8) -> Self {
        Packet {
            command: command as u8,
            mask,
            param1,
            param2,
        }
    }

    pub fn encode(&self) -> [u8; PACKET_LEN] {
        [
            STX,
            self.command,
            self.mask,
            self.param1,
            self.param2,
            make_checksum(self.command, self.mask, self.param1, self.param2),
            ETX,
        ]
    }

    /// Sentinels are checked before the checksum.
    pub fn decode(frame: &[u8]) -> LabResult<Packet> {
        let frame: &[u8; PACKET_LEN] = frame.try_into().map_err(|_| {
            LabError::Framing(format!(
                "Expected a {} byte packet, got {} bytes",
                PACKET_LEN,
                frame.len()
            ))
        })?;
        let [stx, command, mask, param1, param2, received, etx] = *frame;
        if stx != STX || etx != ETX {
            return Err(LabError::Framing(format!(
                "Bad packet sentinels {:#04x}/{:#04x}",
                stx, etx
            )));
        }
        let expected = make_checksum(command, mask, param1, param2);
        if expected != received {
            return Err(LabError::ChecksumMismatch { expected, received });
        }
        Ok(Packet {
            command,
            mask,
            param1,
            param2,
        })
    }
}

/// Mask with one bit per relay, relay 1 being bit 0.
pub fn relay_mask(relays: impl IntoIterator<Item = u8>) -> LabResult<u8> {
    relays.into_iter().try_fold(0u8, |mask, relay| match relay {
        1..=8 => Ok(mask | 1 << (relay - 1)),
        other => Err(LabError::Validation(format!(
            "Relay {} is not in 1..=8",
            other
        ))),
    })
}

/// Relay numbers whose bit is set in `mask`.
pub fn relays_in(mask: u8) -> Vec<u8> {
    (1..=8).filter(|r| mask & (1 << (r - 1)) != 0).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayStatus {
    pub previous: u8,
    pub current: u8,
    pub timers: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonModes {
    pub momentary: u8,
    pub toggle: u8,
    pub timed: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareVersion {
    pub year: u16,
    pub week: u8,
}

pub struct RelayBoard {
    adapter: Box<dyn Adapter>,
}

impl RelayBoard {
    pub fn new(adapter: impl Adapter + 'static) -> Self {
        RelayBoard {
            adapter: Box::new(adapter),
        }
    }

    pub fn send(&mut self, packet: Packet) -> LabResult<()> {
        self.adapter.flush_read_buffer()?;
        let frame = packet.encode();
        trace!("Relay packet {:02X?}", frame);
        self.adapter.write_bytes(&frame)
    }

    /// Sends `packet` and reads the reply, which must carry `reply`.
    pub fn query(&mut self, packet: Packet, reply: Command) -> LabResult<Packet> {
        self.send(packet)?;
        let received = Packet::decode(&self.adapter.read_bytes(PACKET_LEN)?)?;
        if received.command != reply as u8 {
            return Err(LabError::Framing(format!(
                "Expected reply {:#04x}, got {:#04x}",
                reply as u8, received.command
            )));
        }
        Ok(received)
    }

    pub fn switch_on(&mut self, mask: u8) -> LabResult<()> {
        debug!("Switching on relays {:?}", relays_in(mask));
        self.send(Packet::new(Command::SwitchOn, mask, 0, 0))
    }

    pub fn switch_off(&mut self, mask: u8) -> LabResult<()> {
        debug!("Switching off relays {:?}", relays_in(mask));
        self.send(Packet::new(Command::SwitchOff, mask, 0, 0))
    }

    pub fn toggle(&mut self, mask: u8) -> LabResult<()> {
        self.send(Packet::new(Command::Toggle, mask, 0, 0))
    }

    pub fn status(&mut self) -> LabResult<RelayStatus> {
        let reply = self.query(Packet::new(Command::QueryRelays, 0, 0, 0), Command::RelayStatus)?;
        Ok(RelayStatus {
            previous: reply.mask,
            current: reply.param1,
            timers: reply.param2,
        })
    }

    pub fn button_modes(&mut self) -> LabResult<ButtonModes> {
        let reply = self.query(
            Packet::new(Command::QueryButtonMode, 0, 0, 0),
            Command::QueryButtonMode,
        )?;
        Ok(ButtonModes {
            momentary: reply.mask,
            toggle: reply.param1,
            timed: reply.param2,
        })
    }

    pub fn set_button_mode(&mut self, modes: ButtonModes) -> LabResult<()> {
        self.send(Packet::new(
            Command::SetButtonMode,
            modes.momentary,
            modes.toggle,
            modes.timed,
        ))
    }

    /// Starts the timers of `mask`. A `delay` of 0 uses each relay's preset.
    pub fn start_timer(&mut self, mask: u8, delay: u16) -> LabResult<()> {
        let [high, low] = delay.to_be_bytes();
        self.send(Packet::new(Command::StartTimer, mask, high, low))
    }

    /// Presets the timer delay of `mask`, in seconds.
    pub fn set_timer(&mut self, mask: u8, delay: u16) -> LabResult<()> {
        let [high, low] = delay.to_be_bytes();
        self.send(Packet::new(Command::SetTimer, mask, high, low))
    }

    /// Timer of one relay: the preset delay, or the time left when
    /// `remaining` is set.
    pub fn query_timer(&mut self, relay: u8, remaining: bool) -> LabResult<u16> {
        let reply = self.query(
            Packet::new(Command::QueryTimer, relay_mask([relay])?, remaining as u8, 0),
            Command::QueryTimer,
        )?;
        Ok(u16::from_be_bytes([reply.param1, reply.param2]))
    }

    pub fn factory_defaults(&mut self) -> LabResult<()> {
        self.send(Packet::new(Command::FactoryDefaults, 0, 0, 0))
    }

    /// True when the jumper disables the on-board buttons.
    pub fn jumper_status(&mut self) -> LabResult<bool> {
        let reply = self.query(
            Packet::new(Command::JumperStatus, 0, 0, 0),
            Command::JumperStatus,
        )?;
        Ok(reply.param1 != 0)
    }

    pub fn firmware_version(&mut self) -> LabResult<FirmwareVersion> {
        let reply = self.query(
            Packet::new(Command::FirmwareVersion, 0, 0, 0),
            Command::FirmwareVersion,
        )?;
        Ok(FirmwareVersion {
            year: 2000 + reply.param1 as u16,
            week: reply.param2,
        })
    }

    pub fn close(mut self) -> LabResult<()> {
        self.adapter.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::mock::MockAdapter;

    #[test]
    fn checksum_matches_reference_packet() {
        assert_eq!(make_checksum(0x71, 0x00, 0x00, 0x00), 0x8B);
        assert_eq!(
            Packet::new(Command::FirmwareVersion, 0, 0, 0).encode(),
            [0x04, 0x71, 0x00, 0x00, 0x00, 0x8B, 0x0F]
        );
    }

    #[test]
    fn sentinels_are_checked_before_the_checksum() {
        assert!(matches!(
            Packet::decode(&[0x05, 0x71, 0x00, 0x00, 0x00, 0x00, 0x0F]),
            Err(LabError::Framing(_))
        ));
        assert!(matches!(
            Packet::decode(&[0x04, 0x71, 0x00, 0x00]),
            Err(LabError::Framing(_))
        ));
        assert!(matches!(
            Packet::decode(&[0x04, 0x71, 0x01, 0x00, 0x00, 0x8B, 0x0F]),
            Err(LabError::ChecksumMismatch {
                expected: 0x8A,
                received: 0x8B
            })
        ));
    }

    #[test]
    fn masks_name_relays_from_one() {
        assert_eq!(relay_mask([1, 3, 8]).unwrap(), 0b1000_0101);
        assert!(relay_mask([0]).is_err());
        assert_eq!(relays_in(0b1000_0101), vec![1, 3, 8]);
    }

    #[test]
    fn queries_skip_unsolicited_status_frames() {
        let reply = Packet::new(Command::RelayStatus, 0x01, 0x03, 0x00).encode();
        let mock = MockAdapter::new().expect_bytes(
            &Packet::new(Command::QueryRelays, 0, 0, 0).encode(),
            Some(&reply),
        );
        mock.inject_unsolicited(&Packet::new(Command::ButtonStatus, 1, 1, 0).encode());
        let mut board = RelayBoard::new(mock.clone());
        assert_eq!(
            board.status().unwrap(),
            RelayStatus {
                previous: 0x01,
                current: 0x03,
                timers: 0x00
            }
        );
    }

    #[test]
    fn replies_must_answer_the_query() {
        let wrong = Packet::new(Command::JumperStatus, 0, 1, 0).encode();
        let mock = MockAdapter::new().expect_bytes(
            &Packet::new(Command::FirmwareVersion, 0, 0, 0).encode(),
            Some(&wrong),
        );
        let mut board = RelayBoard::new(mock);
        assert!(matches!(board.firmware_version(), Err(LabError::Framing(_))));
    }

    #[test]
    fn timers_carry_the_delay_big_endian() {
        let mock = MockAdapter::new().expect_bytes(&[0x04, 0x41, 0x02, 0x01, 0x2C, 0x8C, 0x0F], None);
        let mut board = RelayBoard::new(mock.clone());
        board.start_timer(relay_mask([2]).unwrap(), 300).unwrap();
        assert_eq!(mock.remaining(), 0);
    }
}
