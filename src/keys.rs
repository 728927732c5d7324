use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use thiserror::Error;

use crate::models::{SensorCounts, TimestampedReading};
use crate::window::InstantRange;

/// Houses follow the `Pabellon_<N>` convention.
pub const HOUSE_PREFIX: &str = "Pabellon_";

const TIMESTAMP_FIELDS: usize = 5;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("key has fewer than {TIMESTAMP_FIELDS} timestamp components")]
    TooShort,
    #[error("house segment {0:?} does not follow the {HOUSE_PREFIX}<N> convention")]
    BadHouse(String),
    #[error("non-numeric timestamp field {0:?}")]
    NonNumeric(String),
    #[error("calendar fields out of range")]
    OutOfRange,
}

pub fn is_house_name(name: &str) -> bool {
    match name.strip_prefix(HOUSE_PREFIX) {
        Some(number) => !number.is_empty() && number.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}

/// Decodes a compound record key `<house>-<dd>-<mm>-<yyyy>-<HH>-<mm>` into
/// its house and minute-granularity timestamp. The month is stored 1-based,
/// as `chrono` expects it. Keys that fail the grammar or carry impossible
/// calendar fields are rejected; callers drop such records.
pub fn parse_record_key(key: &str) -> Result<(String, NaiveDateTime), KeyError> {
    let parts: Vec<&str> = key.split('-').collect();
    if parts.len() < TIMESTAMP_FIELDS + 1 {
        return Err(KeyError::TooShort);
    }

    let (house_parts, timestamp_parts) = parts.split_at(parts.len() - TIMESTAMP_FIELDS);
    let house = house_parts.join("-");
    if !is_house_name(&house) {
        return Err(KeyError::BadHouse(house));
    }

    let mut fields = [0u32; TIMESTAMP_FIELDS];
    for (slot, raw) in fields.iter_mut().zip(timestamp_parts) {
        *slot = raw
            .parse()
            .map_err(|_| KeyError::NonNumeric((*raw).to_string()))?;
    }

    let [day, month, year, hour, minute] = fields;
    let date = NaiveDate::from_ymd_opt(year as i32, month, day).ok_or(KeyError::OutOfRange)?;
    let time = NaiveTime::from_hms_opt(hour, minute, 0).ok_or(KeyError::OutOfRange)?;
    Ok((house, NaiveDateTime::new(date, time)))
}

/// Decodes one raw store entry, dropping it on a malformed key.
pub fn decode_entry(key: &str, sensors: SensorCounts) -> Option<TimestampedReading> {
    match parse_record_key(key) {
        Ok((house, timestamp)) => Some(TimestampedReading {
            house,
            timestamp,
            sensors,
        }),
        Err(err) => {
            log::debug!("dropping record {key:?}: {err}");
            None
        }
    }
}

pub fn format_record_key(house: &str, timestamp: NaiveDateTime) -> String {
    format!("{house}-{}", timestamp.format("%d-%m-%Y-%H-%M"))
}

/// Lexicographic key bounds covering an instant range, when they exist.
///
/// Keys encode the day before the month, so key order only matches
/// chronological order while month and year stay fixed. Windows that cross
/// a month boundary get no bounds and fall back to scanning the whole
/// house; the record filter makes the precise cut either way.
pub fn key_bounds(house: &str, range: &InstantRange) -> Option<(String, String)> {
    let (start, end) = (range.start(), range.end());
    if start.year() != end.year() || start.month() != end.month() {
        return None;
    }
    Some((format_record_key(house, start), format_record_key(house, end)))
}
