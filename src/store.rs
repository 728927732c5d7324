use std::fmt;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::models::SensorCounts;

/// One raw store entry: the compound record key and its sensor counts.
pub type RawEntry = (String, SensorCounts);

/// Emitted on the change feed whenever a house's data changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEvent {
    pub house: String,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store read failed: {0}")]
    Read(String),
    #[error("store subscription failed: {0}")]
    Subscribe(String),
}

impl StoreError {
    pub(crate) fn read(err: impl fmt::Display) -> Self {
        StoreError::Read(err.to_string())
    }

    pub(crate) fn subscribe(err: impl fmt::Display) -> Self {
        StoreError::Subscribe(err.to_string())
    }
}

/// Client boundary to the external telemetry store. The store is owned and
/// written by the upstream devices; this system only reads it. Injected
/// explicitly wherever it is consumed, never reached through a global.
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// Entries for one house in lexicographic key order, optionally limited
    /// to an inclusive key range.
    async fn fetch_range(
        &self,
        house: &str,
        bounds: Option<(&str, &str)>,
    ) -> Result<Vec<RawEntry>, StoreError>;

    /// The last `limit` entries for a house, ascending key order.
    async fn fetch_last(&self, house: &str, limit: u32) -> Result<Vec<RawEntry>, StoreError>;

    /// Top-level house identifiers present in the store.
    async fn list_houses(&self) -> Result<Vec<String>, StoreError>;

    /// The last `limit` device log lines, ascending key order.
    async fn fetch_last_logs(&self, limit: u32) -> Result<Vec<(String, String)>, StoreError>;

    /// Change feed scoped to one house. Events arrive in the order the
    /// store emits them; the receiver closes when the feed is detached.
    async fn changes(&self, house: &str) -> Result<mpsc::Receiver<StoreEvent>, StoreError>;
}
