use std::sync::Arc;
use std::time::Duration;

use jiff::Zoned;
use jiff::tz::TimeZone;
use sps_core::Reading;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn};

use crate::controller::{PollOutcome, SensorController};
use crate::link::SerialLink;
use crate::session::SessionError;
use crate::sink::ReadingSink;

const READING_QUEUE_DEPTH: usize = 64;

/// Source of the current local time.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Zoned;
}

/// Wall clock in a fixed time zone.
pub struct SystemClock {
    tz: TimeZone,
}

impl SystemClock {
    pub fn new(tz: TimeZone) -> Self {
        Self { tz }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Zoned {
        Zoned::now().with_time_zone(self.tz.clone())
    }
}

/// Why a sensor worker stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    Cancelled,
    Failed,
    ChannelClosed,
}

/// Summary of a finished dispatcher run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Readings received from sensors.
    pub readings: usize,
    /// Sensors removed from polling after a fatal error.
    pub failed_sensors: usize,
    /// Individual sink deliveries that failed.
    pub sink_errors: usize,
}

/// Polls every registered sensor and forwards completed readings to the
/// configured sinks.
///
/// Each sensor runs on its own blocking worker, which is the only owner of
/// its controller and serial link. Readings reach the sinks through a single
/// channel, so the readings of one sensor keep their order.
pub struct Dispatcher<L: SerialLink> {
    controllers: Vec<SensorController<L>>,
    sinks: Vec<Box<dyn ReadingSink>>,
    clock: Arc<dyn Clock>,
    tick: Duration,
}

impl<L: SerialLink> Dispatcher<L> {
    pub fn new(clock: Arc<dyn Clock>, tick: Duration) -> Self {
        Self {
            controllers: Vec::new(),
            sinks: Vec::new(),
            clock,
            tick,
        }
    }

    pub fn register(&mut self, controller: SensorController<L>) {
        self.controllers.push(controller);
    }

    pub fn add_sink(&mut self, sink: Box<dyn ReadingSink>) {
        self.sinks.push(sink);
    }

    pub fn sensor_count(&self) -> usize {
        self.controllers.len()
    }

    /// Run until every sensor worker has stopped, either through `cancel`
    /// or a fatal sensor error.
    pub async fn run(self, cancel: CancellationToken) -> DispatchStats {
        let (tx, mut rx) = mpsc::channel(READING_QUEUE_DEPTH);
        let mut handles = Vec::with_capacity(self.controllers.len());

        info!(
            sensors = self.controllers.len(),
            sinks = self.sinks.len(),
            "Dispatcher started"
        );

        for mut controller in self.controllers {
            controller.attach_cancellation(cancel.clone());
            let tx = tx.clone();
            let clock = Arc::clone(&self.clock);
            let cancel = cancel.clone();
            let tick = self.tick;

            handles.push(tokio::task::spawn_blocking(move || {
                run_sensor(controller, tx, clock, cancel, tick)
            }));
        }
        drop(tx);

        let mut stats = DispatchStats::default();

        // The channel closes once every worker has dropped its sender.
        while let Some(reading) = rx.recv().await {
            stats.readings += 1;
            stats.sink_errors += forward(&self.sinks, &reading).await;
        }

        for handle in handles {
            match handle.await {
                Ok(WorkerExit::Failed) => stats.failed_sensors += 1,
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, "Sensor worker panicked");
                    stats.failed_sensors += 1;
                }
            }
        }

        info!(
            readings = stats.readings,
            failed_sensors = stats.failed_sensors,
            sink_errors = stats.sink_errors,
            "Dispatcher stopped"
        );
        stats
    }
}

/// Hand `reading` to every sink in turn. Returns the number of failures.
async fn forward(sinks: &[Box<dyn ReadingSink>], reading: &Reading) -> usize {
    let mut failures = 0;

    for sink in sinks {
        if let Err(e) = sink.accept(reading).await {
            warn!(
                sink = sink.name(),
                sensor = %reading.sensor,
                error = %e,
                "Sink unavailable, reading not delivered"
            );
            failures += 1;
        }
    }

    failures
}

fn run_sensor<L: SerialLink>(
    mut controller: SensorController<L>,
    tx: mpsc::Sender<Reading>,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
    tick: Duration,
) -> WorkerExit {
    let span = info_span!("sensor", port = %controller.port());
    let _guard = span.enter();
    info!("Sensor worker started");

    let exit = loop {
        if cancel.is_cancelled() {
            break WorkerExit::Cancelled;
        }

        match controller.poll(&clock.now()) {
            Ok(PollOutcome::Emitted(reading)) => {
                info!(sensor = %reading.sensor, "Reading complete");
                if tx.blocking_send(reading).is_err() {
                    break WorkerExit::ChannelClosed;
                }
            }
            Ok(PollOutcome::Warming | PollOutcome::Waiting) => std::thread::sleep(tick),
            Err(SessionError::Cancelled) => break WorkerExit::Cancelled,
            Err(e) => {
                error!(sensor = %controller.name(), error = %e, "Sensor failed, removing it from polling");
                break WorkerExit::Failed;
            }
        }
    };

    controller.shutdown();
    info!(?exit, "Sensor worker stopped");
    exit
}
