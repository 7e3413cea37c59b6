pub mod config;
pub mod controller;
pub mod dispatcher;
pub mod link;
pub mod session;
pub mod sink;

pub use config::{Config, MqttConfig, SamplingConfig, SensorsConfig, StorageConfig, TelemetryConfig};
pub use controller::{Phase, PollOutcome, SensorController, SensorState};
pub use dispatcher::{Clock, DispatchStats, Dispatcher, SystemClock};
pub use link::SerialLink;
pub use link::mock::MockSensorLink;
pub use session::{SensorSession, SessionError, WaitPolicy};
pub use sink::csv::CsvSink;
pub use sink::memory::MemorySink;
pub use sink::mqtt::MqttSink;
pub use sink::{ReadingSink, SinkError};
