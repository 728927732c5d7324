use anyhow::Context;
use async_trait::async_trait;
use log::{debug, warn};
use serde_json::json;
use sqlx::postgres::PgListener;
use sqlx::{PgPool, Row};
use tokio::sync::mpsc;

use crate::keys;
use crate::models::SensorCounts;
use crate::store::{RawEntry, StoreError, StoreEvent, TelemetryStore};

/// NOTIFY channel fed by the trigger in migrations/0001_init.sql; the
/// payload is the house whose data changed.
const NOTIFY_CHANNEL: &str = "henhouse_readings";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let readings = vec![
        (
            "Pabellon_1-17-07-2025-14-30",
            json!({ "SensorA": 3, "SensorB": 1, "SensorC": 0, "SensorD": 2, "SensorE": 1, "SensorF": 0 }),
        ),
        (
            "Pabellon_1-17-07-2025-14-31",
            json!({ "SensorA": 1, "SensorB": 2, "SensorC": 1, "SensorD": 0, "SensorE": 0, "SensorF": 1 }),
        ),
        (
            "Pabellon_1-17-07-2025-15-02",
            json!({ "SensorA": 0, "SensorB": 4, "SensorC": 2, "SensorD": 1, "SensorE": 3, "SensorF": 0 }),
        ),
        (
            "Pabellon_2-17-07-2025-14-30",
            json!({ "SensorA": 2, "SensorB": 0, "SensorC": 3, "SensorD": 1, "SensorE": 0, "SensorF": 2 }),
        ),
        (
            "Pabellon_2-17-07-2025-14-45",
            json!({ "SensorA": 1, "SensorB": 1, "SensorC": 0, "SensorD": 4, "SensorE": 2, "SensorF": 1 }),
        ),
    ];

    for (key, sensors) in readings {
        let (house, _) = keys::parse_record_key(key)
            .with_context(|| format!("seed key {key} must parse"))?;
        sqlx::query(
            r#"
            INSERT INTO henhouse_telemetry.readings (record_key, house, sensors)
            VALUES ($1, $2, $3)
            ON CONFLICT (record_key) DO NOTHING
            "#,
        )
        .bind(key)
        .bind(house)
        .bind(sensors)
        .execute(pool)
        .await?;
    }

    let logs = vec![
        (
            "Pabellon_1-17-07-2025-14-35",
            "Equipo reiniciado tras corte de energía",
        ),
        (
            "Pabellon_2-17-07-2025-14-50",
            "Sensor C sin lectura por 5 minutos",
        ),
    ];

    for (key, message) in logs {
        sqlx::query(
            r#"
            INSERT INTO henhouse_telemetry.device_logs (record_key, message)
            VALUES ($1, $2)
            ON CONFLICT (record_key) DO NOTHING
            "#,
        )
        .bind(key)
        .bind(message)
        .execute(pool)
        .await?;
    }

    Ok(())
}

/// Postgres-backed implementation of the store boundary. Readings and logs
/// are written by the upstream devices; this client only reads them and
/// listens on the trigger-fed NOTIFY channel for the change feed.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn decode_counts(key: &str, value: serde_json::Value) -> Option<SensorCounts> {
    match serde_json::from_value(value) {
        Ok(counts) => Some(counts),
        Err(err) => {
            debug!("dropping record {key:?}: bad sensor payload: {err}");
            None
        }
    }
}

#[async_trait]
impl TelemetryStore for PgStore {
    async fn fetch_range(
        &self,
        house: &str,
        bounds: Option<(&str, &str)>,
    ) -> Result<Vec<RawEntry>, StoreError> {
        let mut sql = String::from(
            "SELECT record_key, sensors FROM henhouse_telemetry.readings WHERE house = $1",
        );
        if bounds.is_some() {
            sql.push_str(" AND record_key >= $2 AND record_key <= $3");
        }
        sql.push_str(" ORDER BY record_key");

        let mut query = sqlx::query(&sql).bind(house);
        if let Some((start, end)) = bounds {
            query = query.bind(start).bind(end);
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::read)?;
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let key: String = row.get("record_key");
                let counts = decode_counts(&key, row.get("sensors"))?;
                Some((key, counts))
            })
            .collect())
    }

    async fn fetch_last(&self, house: &str, limit: u32) -> Result<Vec<RawEntry>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT record_key, sensors FROM henhouse_telemetry.readings
            WHERE house = $1
            ORDER BY record_key DESC
            LIMIT $2
            "#,
        )
        .bind(house)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::read)?;

        let mut entries: Vec<RawEntry> = rows
            .into_iter()
            .filter_map(|row| {
                let key: String = row.get("record_key");
                let counts = decode_counts(&key, row.get("sensors"))?;
                Some((key, counts))
            })
            .collect();
        entries.reverse();
        Ok(entries)
    }

    async fn list_houses(&self) -> Result<Vec<String>, StoreError> {
        let rows =
            sqlx::query("SELECT DISTINCT house FROM henhouse_telemetry.readings ORDER BY house")
                .fetch_all(&self.pool)
                .await
                .map_err(StoreError::read)?;
        Ok(rows.into_iter().map(|row| row.get("house")).collect())
    }

    async fn fetch_last_logs(&self, limit: u32) -> Result<Vec<(String, String)>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT record_key, message FROM henhouse_telemetry.device_logs
            ORDER BY record_key DESC
            LIMIT $1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::read)?;

        let mut entries: Vec<(String, String)> = rows
            .into_iter()
            .map(|row| (row.get("record_key"), row.get("message")))
            .collect();
        entries.reverse();
        Ok(entries)
    }

    async fn changes(&self, house: &str) -> Result<mpsc::Receiver<StoreEvent>, StoreError> {
        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .map_err(StoreError::subscribe)?;
        listener
            .listen(NOTIFY_CHANNEL)
            .await
            .map_err(StoreError::subscribe)?;

        let (tx, rx) = mpsc::channel(16);
        let house = house.to_string();
        tokio::spawn(async move {
            loop {
                match listener.recv().await {
                    Ok(notification) => {
                        if notification.payload() != house {
                            continue;
                        }
                        if tx.send(StoreEvent { house: house.clone() }).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        // The listener reconnects on its own; stay alive and
                        // resume once it does.
                        warn!("notification stream error: {err}");
                        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                    }
                }
            }
        });
        Ok(rx)
    }
}
