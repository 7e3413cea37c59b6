pub mod protocol;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

// We use `Box<str>` for names that never grow after construction.
type BoxStr = Box<str>;

/// Display name used until a sensor reports its serial number.
pub const PLACEHOLDER_NAME: &str = "SPS30";

/// Timestamp layout used in CSV lines and telemetry records.
pub const TIME_FORMAT: &str = "%m/%d/%y %H:%M:%S";

/// Unique identifier for a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReadingId(pub Ulid);

impl ReadingId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for ReadingId {
    fn default() -> Self {
        Self::new()
    }
}

/// Identity of one sensor as shown in readings.
///
/// A sensor starts out `Unresolved` and becomes `Resolved` once its serial
/// number has been read. There is no way back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorName {
    Unresolved,
    Resolved(BoxStr),
}

impl SensorName {
    pub fn from_serial(serial: &str) -> Self {
        SensorName::Resolved(format!("SPS_{serial}").into_boxed_str())
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, SensorName::Resolved(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            SensorName::Unresolved => PLACEHOLDER_NAME,
            SensorName::Resolved(name) => name,
        }
    }
}

impl std::fmt::Display for SensorName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decoded set of sensor values, in wire order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Mass concentration PM1.0 in µg/m³.
    pub pm1: f32,
    /// Mass concentration PM2.5 in µg/m³.
    pub pm2_5: f32,
    /// Mass concentration PM4.0 in µg/m³.
    pub pm4: f32,
    /// Mass concentration PM10 in µg/m³.
    pub pm10: f32,
    /// Number concentration of particles 0.3 to 0.5 µm, in #/cm³.
    pub bin0_5: f32,
    /// Number concentration of particles 0.3 to 1.0 µm, in #/cm³.
    pub bin1: f32,
    /// Number concentration of particles 0.3 to 2.5 µm, in #/cm³.
    pub bin2_5: f32,
    /// Number concentration of particles 0.3 to 4.0 µm, in #/cm³.
    pub bin4: f32,
    /// Number concentration of particles 0.3 to 10 µm, in #/cm³.
    pub bin10: f32,
    /// Typical particle size in µm.
    pub typical_size: f32,
}

impl Measurement {
    /// Record keys for each field, in wire order.
    pub const LABELS: [&'static str; 10] = [
        "PM1", "PM25", "PM4", "PM10", "b0305", "b031", "b0325", "b034", "b0310", "tsize",
    ];

    /// All fields zero; stands in for a reading whose frame could not be decoded.
    pub fn zeroed() -> Self {
        Self::default()
    }

    pub fn from_values(v: [f32; 10]) -> Self {
        Self {
            pm1: v[0],
            pm2_5: v[1],
            pm4: v[2],
            pm10: v[3],
            bin0_5: v[4],
            bin1: v[5],
            bin2_5: v[6],
            bin4: v[7],
            bin10: v[8],
            typical_size: v[9],
        }
    }

    pub fn values(&self) -> [f32; 10] {
        [
            self.pm1,
            self.pm2_5,
            self.pm4,
            self.pm10,
            self.bin0_5,
            self.bin1,
            self.bin2_5,
            self.bin4,
            self.bin10,
            self.typical_size,
        ]
    }

    /// Values formatted with two decimals.
    pub fn formatted(&self) -> [String; 10] {
        self.values().map(|v| format!("{v:.2}"))
    }
}

/// A completed, timestamped set of measurements for one sensor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reading {
    /// Unique id for this reading.
    pub id: ReadingId,
    /// Display name of the sensor at the time of the reading.
    pub sensor: BoxStr,
    /// Local time the reading was taken.
    pub timestamp: jiff::Zoned,
    /// Decoded values.
    pub measurement: Measurement,
}

impl Reading {
    pub fn new(sensor: &SensorName, timestamp: jiff::Zoned, measurement: Measurement) -> Self {
        Self {
            id: ReadingId::new(),
            sensor: sensor.as_str().into(),
            timestamp,
            measurement,
        }
    }

    pub fn formatted_time(&self) -> String {
        self.timestamp.strftime(TIME_FORMAT).to_string()
    }

    /// Name, time and the ten formatted values, in record order.
    pub fn fields(&self) -> Vec<String> {
        let mut fields = Vec::with_capacity(12);
        fields.push(self.sensor.to_string());
        fields.push(self.formatted_time());
        fields.extend(self.measurement.formatted());
        fields
    }

    /// The comma-separated line appended to the sensor's storage file.
    pub fn csv_line(&self) -> String {
        self.fields().join(",")
    }
}
