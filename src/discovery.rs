use log::warn;

use crate::keys;
use crate::models::TimestampedReading;
use crate::store::TelemetryStore;

/// Houses known to the store that follow the naming convention.
/// Best-effort: a read failure yields an empty list, which callers must
/// treat as "unknown", not "definitively zero".
pub async fn list_houses(store: &dyn TelemetryStore) -> Vec<String> {
    match store.list_houses().await {
        Ok(houses) => houses
            .into_iter()
            .filter(|house| keys::is_house_name(house))
            .collect(),
        Err(err) => {
            warn!("house discovery failed: {err}");
            Vec::new()
        }
    }
}

/// The most recent decodable reading for a house.
pub async fn latest_reading(
    store: &dyn TelemetryStore,
    house: &str,
) -> Option<TimestampedReading> {
    match store.fetch_last(house, 1).await {
        Ok(entries) => entries
            .into_iter()
            .rev()
            .find_map(|(key, counts)| keys::decode_entry(&key, counts)),
        Err(err) => {
            warn!("latest reading fetch failed for {house}: {err}");
            None
        }
    }
}

/// Sensor names for a house, read from one sample record. Best-effort.
pub async fn list_sensors(store: &dyn TelemetryStore, house: &str) -> Vec<String> {
    match latest_reading(store, house).await {
        Some(reading) => reading.sensors.into_keys().collect(),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SensorCounts;
    use crate::store::testing::MemoryStore;

    fn counts(pairs: &[(&str, u64)]) -> SensorCounts {
        pairs
            .iter()
            .map(|(name, count)| (name.to_string(), *count))
            .collect()
    }

    #[tokio::test]
    async fn lists_houses_present_in_the_store() {
        let store = MemoryStore::new();
        store.insert_reading("Pabellon_1-17-07-2025-14-30", counts(&[("SensorA", 1)]));
        store.insert_reading("Pabellon_2-17-07-2025-14-30", counts(&[("SensorA", 1)]));

        assert_eq!(list_houses(&store).await, vec!["Pabellon_1", "Pabellon_2"]);
    }

    #[tokio::test]
    async fn discovery_failure_yields_empty_list() {
        let store = MemoryStore::new();
        store.insert_reading("Pabellon_1-17-07-2025-14-30", counts(&[("SensorA", 1)]));
        store.set_failing(true);

        assert!(list_houses(&store).await.is_empty());
        assert!(list_sensors(&store, "Pabellon_1").await.is_empty());
        assert!(latest_reading(&store, "Pabellon_1").await.is_none());
    }

    #[tokio::test]
    async fn sensors_come_from_the_latest_record() {
        let store = MemoryStore::new();
        store.insert_reading("Pabellon_1-17-07-2025-14-30", counts(&[("SensorA", 1)]));
        store.insert_reading(
            "Pabellon_1-17-07-2025-14-45",
            counts(&[("SensorA", 2), ("SensorB", 0)]),
        );

        assert_eq!(
            list_sensors(&store, "Pabellon_1").await,
            vec!["SensorA", "SensorB"]
        );
        let latest = latest_reading(&store, "Pabellon_1").await.unwrap();
        assert_eq!(latest.total(), 2);
    }
}
