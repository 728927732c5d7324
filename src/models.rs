use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Per-sensor egg counts for one sampling minute, keyed by sensor name.
pub type SensorCounts = BTreeMap<String, u64>;

/// One decoded store entry: the house it came from, the minute-granularity
/// timestamp recovered from the record key, and the raw sensor counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampedReading {
    pub house: String,
    pub timestamp: NaiveDateTime,
    pub sensors: SensorCounts,
}

impl TimestampedReading {
    /// Total eggs across all sensors for this minute.
    pub fn total(&self) -> u64 {
        self.sensors.values().sum()
    }
}

/// One point in a minute or hour series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub label: String,
    pub eggs: u64,
}

/// All points of one calendar day, in time-of-day order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySeries {
    pub date: String,
    pub points: Vec<SeriesPoint>,
}

/// One sensor-mode output row: a minute label plus per-sensor totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorRow {
    pub label: String,
    pub counts: SensorCounts,
}

/// Sensor-mode output: rows in chronological order, column names in the
/// order the sensors were first seen while scanning the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorTable {
    pub sensors: Vec<String>,
    pub rows: Vec<SensorRow>,
}

/// Free-text device log line recovered from the LOG keyspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub house: String,
    pub timestamp: NaiveDateTime,
    pub message: String,
}

/// Aggregation step for a feed or export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Minute,
    Hour,
    Sensor,
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "minute" => Ok(Granularity::Minute),
            "hour" => Ok(Granularity::Hour),
            "sensor" => Ok(Granularity::Sensor),
            other => Err(format!(
                "unknown granularity {other:?}, expected minute, hour or sensor"
            )),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Granularity::Minute => "minute",
            Granularity::Hour => "hour",
            Granularity::Sensor => "sensor",
        };
        f.write_str(name)
    }
}
