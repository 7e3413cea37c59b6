use std::time::Duration;

use jiff::Zoned;
use sps_core::{Measurement, Reading, SensorName};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::link::SerialLink;
use crate::session::{SensorSession, SessionError};

/// Time the fan runs before a measurement is trusted.
pub const WARMUP: Duration = Duration::from_secs(20);

/// Where a sensor is in its read cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Fan off, waiting for the next sampling interval.
    Idle,
    /// Fan started, waiting out the warmup.
    Warming,
    /// Warmup elapsed, measurement in progress.
    Sampling,
}

/// Timing state of one sensor. Owned and mutated by its controller only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorState {
    /// Epoch second of the last completed reading; `None` before the first.
    pub last_sample: Option<i64>,
    /// Epoch second the fan was last started.
    pub fan_on: i64,
    pub phase: Phase,
}

impl Default for SensorState {
    fn default() -> Self {
        Self {
            last_sample: None,
            fan_on: 0,
            phase: Phase::Idle,
        }
    }
}

impl SensorState {
    pub fn is_fan_running(&self) -> bool {
        self.phase != Phase::Idle
    }
}

/// Result of one poll.
#[derive(Debug)]
pub enum PollOutcome {
    /// Sampling interval not yet elapsed; nothing was done.
    Waiting,
    /// Fan is running and the warmup has not elapsed yet.
    Warming,
    /// A read cycle completed.
    Emitted(Reading),
}

/// Drives one sensor through warmup, measurement and idle.
pub struct SensorController<L: SerialLink> {
    session: SensorSession<L>,
    name: SensorName,
    state: SensorState,
    interval: i64,
    /// Fatal error held back so the reading completed alongside it is
    /// still emitted. Returned by the next poll.
    deferred: Option<SessionError>,
}

impl<L: SerialLink> SensorController<L> {
    pub fn new(session: SensorSession<L>, interval: Duration) -> Self {
        Self {
            session,
            name: SensorName::Unresolved,
            state: SensorState::default(),
            interval: interval.as_secs() as i64,
            deferred: None,
        }
    }

    pub fn attach_cancellation(&mut self, cancel: CancellationToken) {
        self.session.set_cancellation(cancel);
    }

    pub fn port(&self) -> &str {
        self.session.port()
    }

    pub fn name(&self) -> &SensorName {
        &self.name
    }

    pub fn state(&self) -> &SensorState {
        &self.state
    }

    pub fn session(&self) -> &SensorSession<L> {
        &self.session
    }

    /// Advance the cycle to `now`.
    ///
    /// Errors returned from here are fatal for this sensor; malformed
    /// responses are absorbed.
    pub fn poll(&mut self, now: &Zoned) -> Result<PollOutcome, SessionError> {
        if let Some(e) = self.deferred.take() {
            return Err(e);
        }

        let now_secs = now.timestamp().as_second();

        if let Some(last) = self.state.last_sample {
            if now_secs - last < self.interval {
                return Ok(PollOutcome::Waiting);
            }
        }

        if self.state.phase == Phase::Idle {
            self.session.start()?;
            self.state.fan_on = now_secs;
            self.state.phase = Phase::Warming;
            debug!(port = %self.port(), "Fan started");
        }

        if !self.name.is_resolved() {
            self.resolve_name()?;
        }

        if now_secs - self.state.fan_on < WARMUP.as_secs() as i64 {
            return Ok(PollOutcome::Warming);
        }

        self.state.phase = Phase::Sampling;
        let measurement = match self.session.read_measurements() {
            Ok(measurement) => measurement,
            Err(SessionError::MalformedFrame(e)) => {
                warn!(sensor = %self.name, error = %e, "Malformed measurement frame, recording zeros");
                Measurement::zeroed()
            }
            Err(e) => return Err(e),
        };

        let reading = Reading::new(&self.name, now.clone(), measurement);
        self.state.last_sample = Some(now_secs);
        match self.session.stop() {
            Ok(()) => self.state.phase = Phase::Idle,
            Err(e) => self.deferred = Some(e),
        }

        Ok(PollOutcome::Emitted(reading))
    }

    fn resolve_name(&mut self) -> Result<(), SessionError> {
        match self.session.read_serial_number() {
            Ok(serial) if !serial.is_empty() => {
                self.name = SensorName::from_serial(&serial);
                info!(port = %self.port(), sensor = %self.name, "Sensor identified");
            }
            Ok(_) => debug!(port = %self.port(), "Empty serial number, will retry"),
            Err(SessionError::MalformedFrame(e)) => {
                debug!(port = %self.port(), error = %e, "Malformed serial number, will retry");
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Stop a running fan and release the connection.
    pub fn shutdown(&mut self) {
        if self.state.is_fan_running() && self.session.is_open() {
            if let Err(e) = self.session.stop() {
                warn!(port = %self.port(), error = %e, "Failed to stop fan on shutdown");
            }
            self.state.phase = Phase::Idle;
        }
        self.session.close();
    }
}
