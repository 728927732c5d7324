use log::{debug, warn};

use crate::keys;
use crate::models::LogEntry;
use crate::store::TelemetryStore;

/// Tail the last `limit` device log lines, newest first, optionally scoped
/// to one house. Best-effort: a read failure yields an empty list.
pub async fn recent_logs(
    store: &dyn TelemetryStore,
    house: Option<&str>,
    limit: u32,
) -> Vec<LogEntry> {
    let raw = match store.fetch_last_logs(limit).await {
        Ok(raw) => raw,
        Err(err) => {
            warn!("log tail failed: {err}");
            return Vec::new();
        }
    };

    let mut entries: Vec<LogEntry> = raw
        .into_iter()
        .filter_map(|(key, message)| decode_log(&key, message))
        .filter(|entry| house.map_or(true, |scoped| entry.house == scoped))
        .collect();
    entries.reverse();
    entries
}

fn decode_log(key: &str, message: String) -> Option<LogEntry> {
    match keys::parse_record_key(key) {
        Ok((house, timestamp)) => Some(LogEntry {
            house,
            timestamp,
            message,
        }),
        Err(err) => {
            debug!("dropping log entry {key:?}: {err}");
            None
        }
    }
}

/// Display form, e.g. `Pabellón 6 (23-07-2025 23:42): Equipo reiniciado`.
pub fn format_entry(entry: &LogEntry) -> String {
    let number = entry
        .house
        .strip_prefix(keys::HOUSE_PREFIX)
        .unwrap_or(&entry.house);
    format!(
        "Pabellón {} ({}): {}",
        number,
        entry.timestamp.format("%d-%m-%Y %H:%M"),
        entry.message
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::MemoryStore;

    #[tokio::test]
    async fn tails_newest_first_and_scopes_by_house() {
        let store = MemoryStore::new();
        store.insert_log("Pabellon_1-17-07-2025-14-35", "Equipo reiniciado");
        store.insert_log("Pabellon_2-17-07-2025-14-50", "Sensor C sin lectura");
        store.insert_log("Pabellon_1-17-07-2025-15-10", "Conteo normalizado");
        store.insert_log("not-a-key", "descartado");

        // The tail is ordered by key, so houses group before time.
        let all = recent_logs(&store, None, 100).await;
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].house, "Pabellon_2");
        assert_eq!(all[1].message, "Conteo normalizado");
        assert_eq!(all[2].message, "Equipo reiniciado");

        let scoped = recent_logs(&store, Some("Pabellon_2"), 100).await;
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].house, "Pabellon_2");
    }

    #[tokio::test]
    async fn read_failure_yields_empty_list() {
        let store = MemoryStore::new();
        store.insert_log("Pabellon_1-17-07-2025-14-35", "Equipo reiniciado");
        store.set_failing(true);
        assert!(recent_logs(&store, None, 100).await.is_empty());
    }

    #[test]
    fn formats_entries_for_display() {
        let entry = decode_log("Pabellon_6-23-07-2025-23-42", "Equipo reiniciado".to_string())
            .unwrap();
        assert_eq!(
            format_entry(&entry),
            "Pabellón 6 (23-07-2025 23:42): Equipo reiniciado"
        );
    }
}
