use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use sps_core::{Reading, ReadingId};

use super::{ReadingSink, SinkError};

/// In-memory storage sink.
/// Keeps every reading for the lifetime of the process; meant for dry runs
/// and tests.
#[derive(Clone, Default)]
pub struct MemorySink {
    readings: Arc<Mutex<HashMap<ReadingId, Reading>>>,
}

impl<T> From<PoisonError<T>> for SinkError {
    fn from(err: PoisonError<T>) -> Self {
        SinkError::Poisoned(err.to_string())
    }
}

impl MemorySink {
    pub fn get(&self, id: ReadingId) -> Result<Option<Reading>, SinkError> {
        let map = self.readings.lock()?;
        Ok(map.get(&id).cloned())
    }

    pub fn len(&self) -> Result<usize, SinkError> {
        Ok(self.readings.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, SinkError> {
        Ok(self.len()? == 0)
    }

    /// All readings of one sensor, oldest first.
    pub fn readings_for(&self, sensor: &str) -> Result<Vec<Reading>, SinkError> {
        let map = self.readings.lock()?;

        let mut readings: Vec<Reading> = map
            .values()
            .filter(|r| &*r.sensor == sensor)
            .cloned()
            .collect();
        readings.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

        Ok(readings)
    }

    /// Names of every sensor that produced at least one reading.
    pub fn sensors(&self) -> Result<Vec<String>, SinkError> {
        let map = self.readings.lock()?;

        let mut names: Vec<String> = map.values().map(|r| r.sensor.to_string()).collect();
        names.sort();
        names.dedup();

        Ok(names)
    }
}

#[async_trait]
impl ReadingSink for MemorySink {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn accept(&self, reading: &Reading) -> Result<(), SinkError> {
        let mut map = self.readings.lock()?;
        map.insert(reading.id, reading.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use jiff::Timestamp;
    use jiff::tz::TimeZone;
    use sps_core::{Measurement, SensorName};

    use super::*;

    fn reading(name: &SensorName, second: i64) -> Reading {
        let timestamp = Timestamp::from_second(second)
            .unwrap()
            .to_zoned(TimeZone::UTC);
        Reading::new(name, timestamp, Measurement::zeroed())
    }

    #[tokio::test]
    async fn stores_readings_by_id() -> Result<(), SinkError> {
        let sink = MemorySink::default();
        let reading = reading(&SensorName::from_serial("X"), 10);
        let id = reading.id;

        sink.accept(&reading).await?;

        assert_eq!(sink.len()?, 1);
        let stored = sink.get(id)?.expect("reading should be stored");
        assert_eq!(stored.timestamp, reading.timestamp);
        Ok(())
    }

    #[tokio::test]
    async fn readings_for_sensor_are_ordered() -> Result<(), SinkError> {
        let sink = MemorySink::default();
        let a = SensorName::from_serial("A");
        let b = SensorName::from_serial("B");

        sink.accept(&reading(&a, 30)).await?;
        sink.accept(&reading(&b, 20)).await?;
        sink.accept(&reading(&a, 10)).await?;

        let seconds: Vec<i64> = sink
            .readings_for("SPS_A")?
            .iter()
            .map(|r| r.timestamp.timestamp().as_second())
            .collect();
        assert_eq!(seconds, vec![10, 30]);
        assert_eq!(sink.sensors()?, vec!["SPS_A".to_string(), "SPS_B".to_string()]);
        Ok(())
    }
}
