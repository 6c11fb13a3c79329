//! JSON export of the crawl database
//!
//! The export opens its own read connection, so it can run against a
//! database an active crawl is writing to without holding up workers.

use crate::storage::SqliteStore;
use std::fs;
use std::path::Path;

/// Writes the full crawl state (hosts, pages, findings) as a single JSON
/// document. Returns the number of exported hosts.
pub fn write_export(database_path: &Path, export_path: &Path) -> crate::Result<usize> {
    let store = SqliteStore::open(database_path)?;
    let document = store.export_document()?;
    let host_count = document.hosts.len();

    let json = serde_json::to_string_pretty(&document)?;
    fs::write(export_path, json)?;

    tracing::info!(
        path = %export_path.display(),
        hosts = host_count,
        "Export written"
    );
    Ok(host_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{
        FetchCycle, FindingKind, FrontierTransition, NewFinding, PageOutcome, Store,
    };
    use tempfile::TempDir;

    fn seeded_database(dir: &TempDir) -> std::path::PathBuf {
        let db_path = dir.path().join("crawl.db");
        let mut store = SqliteStore::open(&db_path).unwrap();
        store
            .enqueue_address("http://a.onion/", "a.onion")
            .unwrap();
        store.mark_in_flight("http://a.onion/").unwrap();
        store
            .record_fetch_cycle(&FetchCycle {
                address: "http://a.onion/".to_string(),
                host: "a.onion".to_string(),
                outcome: PageOutcome::Ok,
                status_code: Some(200),
                content_hash: Some("cafe".to_string()),
                byte_size: 10,
                fetch_ms: 5,
                title: Some("Front".to_string()),
                findings: vec![NewFinding {
                    kind: FindingKind::Email,
                    matched_text: "admin@a.example".to_string(),
                    byte_offset: 0,
                }],
                discovered: Vec::new(),
                transition: FrontierTransition::Done,
            })
            .unwrap();
        db_path
    }

    #[test]
    fn test_export_writes_parseable_json() {
        let dir = TempDir::new().unwrap();
        let db_path = seeded_database(&dir);
        let export_path = dir.path().join("report.json");

        let hosts = write_export(&db_path, &export_path).unwrap();
        assert_eq!(hosts, 1);

        let raw = std::fs::read_to_string(&export_path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["hosts"][0]["host"], "a.onion");
        assert_eq!(parsed["hosts"][0]["pages"][0]["outcome"], "ok");
        assert_eq!(
            parsed["hosts"][0]["pages"][0]["findings"][0]["kind"],
            "email"
        );
        assert!(parsed["generated_at"].is_string());
    }

    #[test]
    fn test_export_of_empty_database() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("empty.db");
        drop(SqliteStore::open(&db_path).unwrap());
        let export_path = dir.path().join("report.json");

        let hosts = write_export(&db_path, &export_path).unwrap();
        assert_eq!(hosts, 0);

        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&export_path).unwrap()).unwrap();
        assert_eq!(parsed["hosts"].as_array().unwrap().len(), 0);
    }
}
