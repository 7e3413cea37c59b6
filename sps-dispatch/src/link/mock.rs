use std::collections::VecDeque;
use std::io;

use rand::Rng;
use sps_core::protocol::{Command, encode_response};
use tracing::debug;

use super::SerialLink;

/// State byte the sensor reports when asked for data while its fan is off.
const STATE_NOT_RUNNING: u8 = 0x43;

/// Simulated sensor that answers commands with well-formed response frames.
///
/// Responses become visible a few bytes at a time, so callers have to wait
/// for them the same way they would on a real port.
pub struct MockSensorLink {
    serial: String,
    fan_running: bool,
    /// Bytes written by the sensor but not yet visible to the reader.
    in_flight: VecDeque<u8>,
    /// Bytes visible in the input buffer.
    received: VecDeque<u8>,
    /// Bytes moved from `in_flight` to `received` per availability check.
    chunk: usize,
    /// Every command frame written to the link.
    pub written: Vec<Vec<u8>>,
}

impl MockSensorLink {
    pub fn new(serial: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            fan_running: false,
            in_flight: VecDeque::new(),
            received: VecDeque::new(),
            chunk: usize::MAX,
            written: Vec::new(),
        }
    }

    /// Deliver responses `chunk` bytes per availability check.
    pub fn with_chunk_size(mut self, chunk: usize) -> Self {
        self.chunk = chunk.max(1);
        self
    }

    pub fn fan_running(&self) -> bool {
        self.fan_running
    }

    fn respond(&mut self, command: Command) {
        let frame = match command {
            Command::StartFan => {
                self.fan_running = true;
                encode_response(command.opcode(), 0x00, &[])
            }
            Command::StopFan => {
                self.fan_running = false;
                encode_response(command.opcode(), 0x00, &[])
            }
            Command::ReadMeasurements if !self.fan_running => {
                encode_response(command.opcode(), STATE_NOT_RUNNING, &[])
            }
            Command::ReadMeasurements => {
                let data: Vec<u8> = random_values()
                    .iter()
                    .flat_map(|v| v.to_be_bytes())
                    .collect();
                encode_response(command.opcode(), 0x00, &data)
            }
            Command::ReadSerialNumber => {
                let mut data = self.serial.as_bytes().to_vec();
                data.push(0x00);
                encode_response(command.opcode(), 0x00, &data)
            }
        };

        self.in_flight.extend(frame);
    }
}

fn random_values() -> [f32; 10] {
    let mut rng = rand::rng();
    let pm1: f32 = rng.random_range(1.0..20.0);
    let pm2_5 = pm1 + rng.random_range(0.0..10.0);
    let pm4 = pm2_5 + rng.random_range(0.0..5.0);
    let pm10 = pm4 + rng.random_range(0.0..5.0);
    let bin0_5: f32 = rng.random_range(5.0..120.0);
    let bin1 = bin0_5 + rng.random_range(0.0..20.0);
    let bin2_5 = bin1 + rng.random_range(0.0..5.0);
    let bin4 = bin2_5 + rng.random_range(0.0..1.0);
    let bin10 = bin4 + rng.random_range(0.0..0.5);
    let typical_size = rng.random_range(0.3..1.5);

    [
        pm1,
        pm2_5,
        pm4,
        pm10,
        bin0_5,
        bin1,
        bin2_5,
        bin4,
        bin10,
        typical_size,
    ]
}

impl SerialLink for MockSensorLink {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.written.push(bytes.to_vec());

        let opcode = bytes
            .get(2)
            .copied()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "short command frame"))?;

        match Command::try_from(opcode) {
            Ok(command) => self.respond(command),
            Err(unknown) => debug!(opcode = unknown, "Mock sensor ignoring unknown command"),
        }

        Ok(())
    }

    fn bytes_to_read(&mut self) -> io::Result<usize> {
        let n = self.chunk.min(self.in_flight.len());
        self.received.extend(self.in_flight.drain(..n));
        Ok(self.received.len())
    }

    fn read_bytes(&mut self, count: usize) -> io::Result<Vec<u8>> {
        if count > self.received.len() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "not enough data"));
        }
        Ok(self.received.drain(..count).collect())
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.received.clear();
        self.in_flight.clear();
        Ok(())
    }
}
