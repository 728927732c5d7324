use std::io::Write;

use crate::models::{DailySeries, SensorTable};

/// `day,time,eggs`, one row per minute bucket.
pub fn write_minute_csv<W: Write>(writer: W, series: &[DailySeries]) -> csv::Result<()> {
    write_day_series(writer, "time", series)
}

/// `day,hour,eggs`, one row per hour bucket.
pub fn write_hour_csv<W: Write>(writer: W, series: &[DailySeries]) -> csv::Result<()> {
    write_day_series(writer, "hour", series)
}

fn write_day_series<W: Write>(
    writer: W,
    label_column: &str,
    series: &[DailySeries],
) -> csv::Result<()> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(["day", label_column, "eggs"])?;
    for day in series {
        for point in &day.points {
            let eggs = point.eggs.to_string();
            out.write_record([day.date.as_str(), point.label.as_str(), eggs.as_str()])?;
        }
    }
    out.flush()?;
    Ok(())
}

/// `time,<sensor1>,<sensor2>,...` with one row per sensor-mode bucket;
/// sensors missing from a row export as 0.
pub fn write_sensor_csv<W: Write>(writer: W, table: &SensorTable) -> csv::Result<()> {
    let mut out = csv::Writer::from_writer(writer);

    let mut header = Vec::with_capacity(table.sensors.len() + 1);
    header.push("time".to_string());
    header.extend(table.sensors.iter().cloned());
    out.write_record(&header)?;

    for row in &table.rows {
        let mut record = Vec::with_capacity(header.len());
        record.push(row.label.clone());
        for sensor in &table.sensors {
            record.push(row.counts.get(sensor).copied().unwrap_or(0).to_string());
        }
        out.write_record(&record)?;
    }
    out.flush()?;
    Ok(())
}
