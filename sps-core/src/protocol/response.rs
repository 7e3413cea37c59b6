use super::error::{ParseResult, ProtocolError};
use super::*;
use crate::Measurement;

/// Fixed header of a de-stuffed response frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub address: u8,
    pub command: u8,
    /// Device state byte. Non-zero values are error codes reported by the sensor.
    pub state: u8,
    pub length: u8,
}

impl ResponseHeader {
    pub fn parse(frame: &[u8]) -> ParseResult<Self> {
        if frame.len() < RESPONSE_HEADER_SIZE {
            return Err(ProtocolError::FrameTooShort {
                needed: RESPONSE_HEADER_SIZE,
                available: frame.len(),
            });
        }

        Ok(Self {
            address: frame[1],
            command: frame[2],
            state: frame[3],
            length: frame[4],
        })
    }

    pub fn is_error(&self) -> bool {
        self.state != 0
    }
}

fn payload(frame: &[u8], trailer: usize) -> ParseResult<&[u8]> {
    let needed = RESPONSE_HEADER_SIZE + trailer;
    if frame.len() < needed {
        return Err(ProtocolError::FrameTooShort {
            needed,
            available: frame.len(),
        });
    }
    if frame.last() != Some(&FRAME_DELIMITER) {
        return Err(ProtocolError::Unterminated);
    }

    Ok(&frame[RESPONSE_HEADER_SIZE..frame.len() - trailer])
}

/// Decodes a de-stuffed measurement response into ten big-endian floats.
pub fn parse_measurements(frame: &[u8]) -> ParseResult<Measurement> {
    let data = payload(frame, MEASUREMENT_TRAILER_SIZE)?;

    if data.len() != MEASUREMENT_PAYLOAD_SIZE {
        return Err(ProtocolError::PayloadLength {
            expected: MEASUREMENT_PAYLOAD_SIZE,
            actual: data.len(),
        });
    }

    let mut values = [0f32; MEASUREMENT_FIELDS];
    for (value, chunk) in values.iter_mut().zip(data.chunks_exact(4)) {
        *value = f32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }

    Ok(Measurement::from_values(values))
}

/// Decodes a de-stuffed serial-number response into its ASCII text.
pub fn parse_serial_number(frame: &[u8]) -> ParseResult<String> {
    let data = payload(frame, SERIAL_TRAILER_SIZE)?;

    // trailer is NUL, checksum, delimiter
    if frame[frame.len() - SERIAL_TRAILER_SIZE] != 0x00 {
        return Err(ProtocolError::MissingNul);
    }

    if !data.is_ascii() {
        return Err(ProtocolError::NotAscii);
    }

    Ok(data.iter().map(|b| *b as char).collect())
}
