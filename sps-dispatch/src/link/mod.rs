pub mod mock;

use std::io::{self, Read, Write};
use std::time::Duration;

use serialport::{ClearBuffer, DataBits, Parity, SerialPort, StopBits};

pub const BAUD_RATE: u32 = 115_200;
pub const READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Byte-level access to one sensor connection.
///
/// Implementations are owned by exactly one session; nothing else writes to
/// the underlying device.
pub trait SerialLink: Send + 'static {
    /// Write a complete command frame.
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Number of received bytes waiting in the input buffer.
    fn bytes_to_read(&mut self) -> io::Result<usize>;

    /// Read exactly `count` bytes from the input buffer.
    fn read_bytes(&mut self, count: usize) -> io::Result<Vec<u8>>;

    /// Discard anything waiting in the input buffer.
    fn clear_input(&mut self) -> io::Result<()>;
}

impl SerialLink for Box<dyn SerialPort> {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        Write::write_all(self, bytes)?;
        Write::flush(self)
    }

    fn bytes_to_read(&mut self) -> io::Result<usize> {
        let count = SerialPort::bytes_to_read(&**self)?;
        Ok(count as usize)
    }

    fn read_bytes(&mut self, count: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; count];
        Read::read_exact(self, &mut buf)?;
        Ok(buf)
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.clear(ClearBuffer::Input)?;
        Ok(())
    }
}

impl SerialLink for Box<dyn SerialLink> {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).write_all(bytes)
    }

    fn bytes_to_read(&mut self) -> io::Result<usize> {
        (**self).bytes_to_read()
    }

    fn read_bytes(&mut self, count: usize) -> io::Result<Vec<u8>> {
        (**self).read_bytes(count)
    }

    fn clear_input(&mut self) -> io::Result<()> {
        (**self).clear_input()
    }
}

/// Open a sensor port with the fixed line settings of the protocol.
pub fn open(path: &str) -> io::Result<Box<dyn SerialPort>> {
    let port = serialport::new(path, BAUD_RATE)
        .data_bits(DataBits::Eight)
        .stop_bits(StopBits::One)
        .parity(Parity::None)
        .timeout(READ_TIMEOUT)
        .open()?;
    Ok(port)
}

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("failed to enumerate serial ports: {0}")]
    Enumerate(#[from] serialport::Error),
}

/// Candidate sensor ports present right now.
///
/// Explicit `ports` win; otherwise every enumerated port whose name starts
/// with `prefix` is returned, sorted by name.
pub fn discover_ports(prefix: &str, ports: &[String]) -> Result<Vec<String>, DiscoveryError> {
    if !ports.is_empty() {
        return Ok(ports.to_vec());
    }

    let names = serialport::available_ports()?
        .into_iter()
        .map(|info| info.port_name)
        .collect();

    Ok(filter_ports(names, prefix))
}

fn filter_ports(mut names: Vec<String>, prefix: &str) -> Vec<String> {
    names.retain(|name| name.starts_with(prefix));
    names.sort();
    names.dedup();
    names
}
