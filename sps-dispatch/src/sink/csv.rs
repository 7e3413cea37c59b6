use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sps_core::Reading;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::info;

use super::{ReadingSink, SinkError};

/// Month bucket directory name, e.g. `Jun2020`.
const BUCKET_FORMAT: &str = "%b%Y";

/// Appends each reading as one CSV line to `<dir>/<month>/<sensor>.csv`.
pub struct CsvSink {
    dir: PathBuf,
}

impl CsvSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File that `reading` is appended to.
    pub fn path_for(&self, reading: &Reading) -> PathBuf {
        self.dir
            .join(reading.timestamp.strftime(BUCKET_FORMAT).to_string())
            .join(format!("{}.csv", reading.sensor))
    }
}

#[async_trait]
impl ReadingSink for CsvSink {
    fn name(&self) -> &'static str {
        "csv"
    }

    async fn accept(&self, reading: &Reading) -> Result<(), SinkError> {
        let path = self.path_for(reading);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut line = reading.csv_line();
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        info!(path = ?path, line = line.trim_end(), "Recorded reading");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use jiff::Timestamp;
    use jiff::tz::TimeZone;
    use sps_core::{Measurement, SensorName};

    use super::*;

    fn reading(serial: &str, second: i64) -> Reading {
        let timestamp = Timestamp::from_second(second)
            .unwrap()
            .to_zoned(TimeZone::UTC);
        Reading::new(
            &SensorName::from_serial(serial),
            timestamp,
            Measurement::from_values([1.0; 10]),
        )
    }

    #[tokio::test]
    async fn appends_lines_to_monthly_sensor_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path());

        let first = reading("A1", 1_592_140_000);
        let second = reading("A1", 1_592_140_060);
        sink.accept(&first).await.unwrap();
        sink.accept(&second).await.unwrap();

        let path = dir.path().join("Jun2020").join("SPS_A1.csv");
        assert_eq!(sink.path_for(&first), path);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines, vec![first.csv_line(), second.csv_line()]);
    }

    #[tokio::test]
    async fn each_sensor_gets_its_own_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path());

        sink.accept(&reading("A1", 1_592_140_000)).await.unwrap();
        sink.accept(&reading("B2", 1_592_140_000)).await.unwrap();

        assert!(dir.path().join("Jun2020/SPS_A1.csv").exists());
        assert!(dir.path().join("Jun2020/SPS_B2.csv").exists());
    }
}
