use std::io;
use std::time::Duration;

use sps_core::Measurement;
use sps_core::protocol::{
    Command, ProtocolError, ResponseHeader, build_command, destuff, parse_measurements,
    parse_serial_number,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::link::SerialLink;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("serial device unavailable: {0}")]
    DeviceUnavailable(#[from] io::Error),

    #[error("timed out waiting for {needed} response bytes, {available} available")]
    ResponseTimeout { needed: usize, available: usize },

    #[error("cancelled while waiting for a response")]
    Cancelled,

    #[error("session is closed")]
    Closed,

    #[error("{0}")]
    MalformedFrame(#[from] ProtocolError),
}

impl SessionError {
    /// Whether the sensor behind this session can no longer be used.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SessionError::MalformedFrame(_))
    }
}

/// How long to wait for response bytes to show up.
#[derive(Debug, Clone)]
pub struct WaitPolicy {
    /// Pause between two availability checks.
    pub poll_interval: Duration,
    /// Give up after this many checks. `None` waits forever.
    pub max_polls: Option<u32>,
    /// Aborts an in-flight wait.
    pub cancel: CancellationToken,
}

impl WaitPolicy {
    pub fn new(poll_interval: Duration, timeout: Option<Duration>) -> Self {
        let max_polls = timeout.map(|timeout| {
            if poll_interval.is_zero() {
                1
            } else {
                (timeout.as_millis() / poll_interval.as_millis().max(1)).clamp(1, u32::MAX as u128)
                    as u32
            }
        });

        Self {
            poll_interval,
            max_polls,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), None)
    }
}

/// One open connection to a sensor.
pub struct SensorSession<L: SerialLink> {
    port: String,
    link: Option<L>,
    wait: WaitPolicy,
}

impl<L: SerialLink> SensorSession<L> {
    pub fn new(port: impl Into<String>, link: L, wait: WaitPolicy) -> Self {
        Self {
            port: port.into(),
            link: Some(link),
            wait,
        }
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn is_open(&self) -> bool {
        self.link.is_some()
    }

    /// Make in-flight waits abort once `cancel` fires.
    pub fn set_cancellation(&mut self, cancel: CancellationToken) {
        self.wait.cancel = cancel;
    }

    /// Borrow the underlying link, for inspection.
    pub fn link(&self) -> Option<&L> {
        self.link.as_ref()
    }

    fn link_mut(&mut self) -> Result<&mut L, SessionError> {
        self.link.as_mut().ok_or(SessionError::Closed)
    }

    /// Start the fan. The sensor's acknowledgement is not read.
    pub fn start(&mut self) -> Result<(), SessionError> {
        self.link_mut()?
            .write_all(build_command(Command::StartFan))?;
        Ok(())
    }

    /// Stop the fan. The sensor's acknowledgement is not read.
    pub fn stop(&mut self) -> Result<(), SessionError> {
        self.link_mut()?.write_all(build_command(Command::StopFan))?;
        Ok(())
    }

    pub fn read_measurements(&mut self) -> Result<Measurement, SessionError> {
        let frame = self.request(Command::ReadMeasurements)?;
        Ok(parse_measurements(&frame)?)
    }

    pub fn read_serial_number(&mut self) -> Result<String, SessionError> {
        let frame = self.request(Command::ReadSerialNumber)?;
        Ok(parse_serial_number(&frame)?)
    }

    /// Release the connection. Calling it again does nothing.
    pub fn close(&mut self) {
        if self.link.take().is_some() {
            debug!(port = %self.port, "Serial connection closed");
        }
    }

    /// Send `command`, wait for its response and return it de-stuffed.
    fn request(&mut self, command: Command) -> Result<Vec<u8>, SessionError> {
        let needed = command.response_size().unwrap_or(0);
        let wait = self.wait.clone();
        let port = self.port.clone();
        let link = self.link_mut()?;

        link.clear_input()?;
        link.write_all(build_command(command))?;

        let mut polls = 0u32;
        let mut available = link.bytes_to_read()?;
        while available < needed {
            if wait.cancel.is_cancelled() {
                return Err(SessionError::Cancelled);
            }
            if let Some(max) = wait.max_polls {
                if polls >= max {
                    return Err(SessionError::ResponseTimeout { needed, available });
                }
            }

            debug!(%port, available, needed, "Waiting for response");
            std::thread::sleep(wait.poll_interval);
            polls += 1;
            available = link.bytes_to_read()?;
        }

        let raw = link.read_bytes(available)?;
        let frame = destuff(&raw);

        if let Ok(header) = ResponseHeader::parse(&frame) {
            if header.is_error() {
                warn!(
                    %port,
                    command = ?command,
                    state = header.state,
                    "Sensor reported an error state"
                );
            }
        }

        Ok(frame)
    }
}

impl<L: SerialLink> Drop for SensorSession<L> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use sps_core::protocol::encode_response;

    use super::*;

    /// Link that serves one canned response, a few bytes per check.
    struct ScriptedLink {
        response: Vec<u8>,
        visible: usize,
        step: usize,
        writes: Vec<Vec<u8>>,
        clears: usize,
        checks: usize,
    }

    impl ScriptedLink {
        fn new(response: Vec<u8>, step: usize) -> Self {
            Self {
                response,
                visible: 0,
                step,
                writes: Vec::new(),
                clears: 0,
                checks: 0,
            }
        }
    }

    impl SerialLink for ScriptedLink {
        fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
            self.writes.push(bytes.to_vec());
            Ok(())
        }

        fn bytes_to_read(&mut self) -> io::Result<usize> {
            self.checks += 1;
            self.visible = (self.visible + self.step).min(self.response.len());
            Ok(self.visible)
        }

        fn read_bytes(&mut self, count: usize) -> io::Result<Vec<u8>> {
            Ok(self.response[..count].to_vec())
        }

        fn clear_input(&mut self) -> io::Result<()> {
            self.clears += 1;
            Ok(())
        }
    }

    struct BrokenLink;

    impl SerialLink for BrokenLink {
        fn write_all(&mut self, _: &[u8]) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"))
        }

        fn bytes_to_read(&mut self) -> io::Result<usize> {
            Ok(0)
        }

        fn read_bytes(&mut self, _: usize) -> io::Result<Vec<u8>> {
            Ok(Vec::new())
        }

        fn clear_input(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn fast_wait() -> WaitPolicy {
        WaitPolicy::new(Duration::ZERO, None)
    }

    fn measurement_response(values: [f32; 10]) -> Vec<u8> {
        let data: Vec<u8> = values.iter().flat_map(|v| v.to_be_bytes()).collect();
        encode_response(0x03, 0x00, &data)
    }

    #[test]
    fn read_measurements_waits_for_full_response() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 0.5];
        let link = ScriptedLink::new(measurement_response(values), 10);
        let mut session = SensorSession::new("/dev/ttyUSB0", link, fast_wait());

        let measurement = session.read_measurements().unwrap();
        assert_eq!(measurement.values(), values);

        let link = session.link().unwrap();
        assert_eq!(link.clears, 1);
        assert_eq!(link.writes, vec![build_command(Command::ReadMeasurements).to_vec()]);
        assert!(link.checks >= 5);
    }

    #[test]
    fn start_and_stop_write_their_templates() {
        let mut session = SensorSession::new("p", ScriptedLink::new(Vec::new(), 1), fast_wait());
        session.start().unwrap();
        session.stop().unwrap();

        let link = session.link().unwrap();
        assert_eq!(link.clears, 0);
        assert_eq!(
            link.writes,
            vec![
                build_command(Command::StartFan).to_vec(),
                build_command(Command::StopFan).to_vec()
            ]
        );
    }

    #[test]
    fn serial_number_is_read() {
        let response = encode_response(0xD0, 0x00, b"E0F3A1B2\0");
        let mut session = SensorSession::new("p", ScriptedLink::new(response, 64), fast_wait());
        assert_eq!(session.read_serial_number().unwrap(), "E0F3A1B2");
    }

    #[test]
    fn serial_number_read_mid_frame_is_malformed() {
        let response = encode_response(0xD0, 0x00, b"8C2A6B1F0E1D4C3B\0");
        let mut session = SensorSession::new("p", ScriptedLink::new(response, 10), fast_wait());

        let err = session.read_serial_number().unwrap_err();
        assert!(matches!(
            err,
            SessionError::MalformedFrame(ProtocolError::Unterminated)
        ));
        assert!(!err.is_fatal());
    }

    #[test]
    fn short_measurement_response_is_malformed() {
        let response = encode_response(0x03, 0x00, &[0u8; 41]);
        let mut session = SensorSession::new("p", ScriptedLink::new(response, 64), fast_wait());

        let err = session.read_measurements().unwrap_err();
        assert!(matches!(err, SessionError::MalformedFrame(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn bounded_wait_times_out() {
        let wait = WaitPolicy {
            poll_interval: Duration::ZERO,
            max_polls: Some(3),
            cancel: CancellationToken::new(),
        };
        let mut session = SensorSession::new("p", ScriptedLink::new(vec![0x7E; 4], 1), wait);

        let err = session.read_measurements().unwrap_err();
        assert!(matches!(
            err,
            SessionError::ResponseTimeout {
                needed: 47,
                available: 4
            }
        ));
        assert!(err.is_fatal());
    }

    #[test]
    fn cancelled_wait_stops() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let wait = fast_wait().with_cancellation(cancel);
        let mut session = SensorSession::new("p", ScriptedLink::new(Vec::new(), 1), wait);

        assert!(matches!(
            session.read_serial_number(),
            Err(SessionError::Cancelled)
        ));
    }

    #[test]
    fn write_failure_is_device_unavailable() {
        let mut session = SensorSession::new("p", BrokenLink, fast_wait());
        let err = session.start().unwrap_err();
        assert!(matches!(err, SessionError::DeviceUnavailable(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn close_is_idempotent() {
        let mut session = SensorSession::new("p", ScriptedLink::new(Vec::new(), 1), fast_wait());
        session.close();
        session.close();

        assert!(!session.is_open());
        assert!(matches!(session.start(), Err(SessionError::Closed)));
    }

    #[test]
    fn timeout_converts_to_poll_count() {
        let wait = WaitPolicy::new(Duration::from_millis(500), Some(Duration::from_secs(10)));
        assert_eq!(wait.max_polls, Some(20));
        assert_eq!(WaitPolicy::default().max_polls, None);
    }
}
