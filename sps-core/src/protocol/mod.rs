mod error;
mod frame;
mod response;

pub use error::{ParseResult, ProtocolError};
pub use frame::{checksum, destuff, encode_response, stuff};
pub use response::{ResponseHeader, parse_measurements, parse_serial_number};

// frame structure : delimiter(1) + address(1) + command(1) + state/len... + checksum(1) + delimiter(1)

pub const FRAME_DELIMITER: u8 = 0x7E;
pub const ESCAPE: u8 = 0x7D;
pub const DEVICE_ADDRESS: u8 = 0x00;

/// Delimiter, address, command, state and length bytes of a response.
pub const RESPONSE_HEADER_SIZE: usize = 5;
/// Checksum and closing delimiter of a measurement response.
pub const MEASUREMENT_TRAILER_SIZE: usize = 2;
/// NUL terminator, checksum and closing delimiter of a serial-number response.
pub const SERIAL_TRAILER_SIZE: usize = 3;

pub const MEASUREMENT_FIELDS: usize = 10;
pub const MEASUREMENT_PAYLOAD_SIZE: usize = MEASUREMENT_FIELDS * 4;

/// Bytes that must be buffered before a measurement response is read.
pub const MEASUREMENT_RESPONSE_SIZE: usize =
    RESPONSE_HEADER_SIZE + MEASUREMENT_PAYLOAD_SIZE + MEASUREMENT_TRAILER_SIZE;
/// Bytes that must be buffered before a serial-number response is read.
pub const SERIAL_RESPONSE_MIN_SIZE: usize = 7;

const START_FAN: [u8; 8] = [0x7E, 0x00, 0x00, 0x02, 0x01, 0x03, 0xF9, 0x7E];
const STOP_FAN: [u8; 6] = [0x7E, 0x00, 0x01, 0x00, 0xFE, 0x7E];
const READ_MEASUREMENTS: [u8; 6] = [0x7E, 0x00, 0x03, 0x00, 0xFC, 0x7E];
const READ_SERIAL_NUMBER: [u8; 7] = [0x7E, 0x00, 0xD0, 0x01, 0x03, 0x2B, 0x7E];

/// Commands understood by the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    StartFan = 0x00,
    StopFan = 0x01,
    ReadMeasurements = 0x03,
    ReadSerialNumber = 0xD0,
}

impl TryFrom<u8> for Command {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Command::StartFan),
            0x01 => Ok(Command::StopFan),
            0x03 => Ok(Command::ReadMeasurements),
            0xD0 => Ok(Command::ReadSerialNumber),
            _ => Err(value),
        }
    }
}

impl Command {
    pub const fn opcode(self) -> u8 {
        self as u8
    }

    /// Minimum number of buffered bytes that make up this command's
    /// response, or `None` when the response is never read.
    pub const fn response_size(self) -> Option<usize> {
        match self {
            Command::StartFan | Command::StopFan => None,
            Command::ReadMeasurements => Some(MEASUREMENT_RESPONSE_SIZE),
            Command::ReadSerialNumber => Some(SERIAL_RESPONSE_MIN_SIZE),
        }
    }
}

/// Returns the fixed wire frame for `cmd`.
///
/// The trailing checksum bytes are part of the templates and are never
/// recomputed.
pub const fn build_command(cmd: Command) -> &'static [u8] {
    match cmd {
        Command::StartFan => &START_FAN,
        Command::StopFan => &STOP_FAN,
        Command::ReadMeasurements => &READ_MEASUREMENTS,
        Command::ReadSerialNumber => &READ_SERIAL_NUMBER,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Command; 4] = [
        Command::StartFan,
        Command::StopFan,
        Command::ReadMeasurements,
        Command::ReadSerialNumber,
    ];

    #[test]
    fn command_templates_are_constant() {
        for cmd in ALL {
            let first = build_command(cmd).to_vec();
            for _ in 0..3 {
                assert_eq!(build_command(cmd), first.as_slice());
            }
        }
        assert_eq!(
            build_command(Command::StartFan),
            &[0x7E, 0x00, 0x00, 0x02, 0x01, 0x03, 0xF9, 0x7E]
        );
        assert_eq!(
            build_command(Command::ReadSerialNumber),
            &[0x7E, 0x00, 0xD0, 0x01, 0x03, 0x2B, 0x7E]
        );
    }

    #[test]
    fn templates_are_delimited_and_carry_matching_checksum() {
        for cmd in ALL {
            let frame = build_command(cmd);
            let last = frame.len() - 1;
            assert_eq!(frame[0], FRAME_DELIMITER);
            assert_eq!(frame[last], FRAME_DELIMITER);
            assert_eq!(frame[2], cmd.opcode());
            assert_eq!(frame[last - 1], checksum(&frame[1..last - 1]));
            assert!(!frame[1..last].contains(&FRAME_DELIMITER));
        }
    }

    #[test]
    fn opcode_round_trips_through_try_from() {
        for cmd in ALL {
            assert_eq!(Command::try_from(cmd.opcode()), Ok(cmd));
        }
        assert_eq!(Command::try_from(0x56), Err(0x56));
    }

    #[test]
    fn only_reads_expect_a_response() {
        assert_eq!(Command::StartFan.response_size(), None);
        assert_eq!(Command::StopFan.response_size(), None);
        assert_eq!(Command::ReadMeasurements.response_size(), Some(47));
        assert_eq!(Command::ReadSerialNumber.response_size(), Some(7));
    }
}
