use std::collections::BTreeMap;

use chrono::{Duration, NaiveDateTime, Timelike};

use crate::models::{
    DailySeries, Granularity, SensorCounts, SensorRow, SensorTable, SeriesPoint,
    TimestampedReading,
};
use crate::window::InstantRange;

const DATE_LABEL: &str = "%d-%m-%Y";

/// Output of one aggregation pass, shaped by the requested granularity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregatedSeries {
    Minute(Vec<DailySeries>),
    Hour(Vec<DailySeries>),
    Sensor(SensorTable),
}

impl AggregatedSeries {
    /// The well-formed zero-data output for a granularity; used when a
    /// window resolves empty and no dense skeleton exists.
    pub fn empty(granularity: Granularity) -> Self {
        match granularity {
            Granularity::Minute => AggregatedSeries::Minute(Vec::new()),
            Granularity::Hour => AggregatedSeries::Hour(Vec::new()),
            Granularity::Sensor => AggregatedSeries::Sensor(SensorTable::default()),
        }
    }

    pub fn bucket_count(&self) -> usize {
        match self {
            AggregatedSeries::Minute(series) | AggregatedSeries::Hour(series) => {
                series.iter().map(|day| day.points.len()).sum()
            }
            AggregatedSeries::Sensor(table) => table.rows.len(),
        }
    }

    pub fn total_eggs(&self) -> u64 {
        match self {
            AggregatedSeries::Minute(series) | AggregatedSeries::Hour(series) => series
                .iter()
                .flat_map(|day| &day.points)
                .map(|point| point.eggs)
                .sum(),
            AggregatedSeries::Sensor(table) => table
                .rows
                .iter()
                .map(|row| row.counts.values().sum::<u64>())
                .sum(),
        }
    }
}

pub fn aggregate(
    readings: &[TimestampedReading],
    range: &InstantRange,
    granularity: Granularity,
) -> AggregatedSeries {
    match granularity {
        Granularity::Minute => AggregatedSeries::Minute(minute_series(readings, range)),
        Granularity::Hour => AggregatedSeries::Hour(hour_series(readings, range)),
        Granularity::Sensor => AggregatedSeries::Sensor(sensor_table(readings, range)),
    }
}

/// Dense per-minute series: every minute boundary in the range appears
/// exactly once, zero-filled where no readings landed, grouped by day.
pub fn minute_series(readings: &[TimestampedReading], range: &InstantRange) -> Vec<DailySeries> {
    dense_series(readings, range, Step::Minute)
}

/// Dense per-hour series, same skeleton contract as [`minute_series`].
pub fn hour_series(readings: &[TimestampedReading], range: &InstantRange) -> Vec<DailySeries> {
    dense_series(readings, range, Step::Hour)
}

/// Sparse per-sensor rows keyed by minute. Entries colliding on the same
/// minute merge additively, since one minute may carry several device
/// pushes. Columns keep first-discovery order.
pub fn sensor_table(readings: &[TimestampedReading], range: &InstantRange) -> SensorTable {
    let mut sensors: Vec<String> = Vec::new();
    let mut rows: BTreeMap<NaiveDateTime, SensorCounts> = BTreeMap::new();

    for reading in readings {
        if !range.contains(reading.timestamp) {
            continue;
        }
        let row = rows.entry(Step::Minute.truncate(reading.timestamp)).or_default();
        for (name, count) in &reading.sensors {
            if !sensors.iter().any(|seen| seen == name) {
                sensors.push(name.clone());
            }
            *row.entry(name.clone()).or_default() += count;
        }
    }

    SensorTable {
        sensors,
        rows: rows
            .into_iter()
            .map(|(slot, counts)| SensorRow {
                label: slot.format("%d-%m-%Y %H:%M").to_string(),
                counts,
            })
            .collect(),
    }
}

#[derive(Clone, Copy)]
enum Step {
    Minute,
    Hour,
}

impl Step {
    fn width(self) -> Duration {
        match self {
            Step::Minute => Duration::minutes(1),
            Step::Hour => Duration::hours(1),
        }
    }

    fn truncate(self, instant: NaiveDateTime) -> NaiveDateTime {
        let minute_floor = instant
            - Duration::seconds(i64::from(instant.second()))
            - Duration::nanoseconds(i64::from(instant.nanosecond()));
        match self {
            Step::Minute => minute_floor,
            Step::Hour => minute_floor - Duration::minutes(i64::from(instant.minute())),
        }
    }

    fn align_up(self, instant: NaiveDateTime) -> NaiveDateTime {
        let floor = self.truncate(instant);
        if floor < instant {
            floor + self.width()
        } else {
            floor
        }
    }

    fn label(self, instant: NaiveDateTime) -> String {
        match self {
            Step::Minute => instant.format("%H:%M").to_string(),
            Step::Hour => instant.format("%H:00").to_string(),
        }
    }
}

fn dense_series(
    readings: &[TimestampedReading],
    range: &InstantRange,
    step: Step,
) -> Vec<DailySeries> {
    let mut totals: BTreeMap<NaiveDateTime, u64> = BTreeMap::new();
    for reading in readings {
        if !range.contains(reading.timestamp) {
            continue;
        }
        *totals.entry(step.truncate(reading.timestamp)).or_default() += reading.total();
    }

    let mut series: Vec<DailySeries> = Vec::new();
    let mut cursor = step.align_up(range.start());
    while cursor <= range.end() {
        let date = cursor.format(DATE_LABEL).to_string();
        if series.last().map(|day| day.date != date).unwrap_or(true) {
            series.push(DailySeries {
                date,
                points: Vec::new(),
            });
        }
        let eggs = totals.get(&cursor).copied().unwrap_or(0);
        if let Some(day) = series.last_mut() {
            day.points.push(SeriesPoint {
                label: step.label(cursor),
                eggs,
            });
        }
        cursor = cursor + step.width();
    }
    series
}
