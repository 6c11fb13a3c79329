//! Database statistics for the `--stats` mode and end-of-run summaries

use crate::storage::{FrontierState, HostRecord, SqliteStore, Store};
use std::fmt;
use std::path::Path;

const TOP_HOSTS: u32 = 10;

/// Aggregated view of a crawl database
#[derive(Debug)]
pub struct StatsReport {
    pub hosts: u64,
    pub pages: u64,
    pub findings: u64,
    pub frontier_pending: u64,
    pub frontier_in_flight: u64,
    pub frontier_done: u64,
    pub frontier_failed: u64,
    pub top_hosts: Vec<HostRecord>,
}

/// Reads the statistics from a database file
pub fn collect_stats(database_path: &Path) -> crate::Result<StatsReport> {
    let store = SqliteStore::open(database_path)?;
    let frontier = store.frontier_counts()?;
    let count = |state| frontier.get(&state).copied().unwrap_or(0);

    Ok(StatsReport {
        hosts: store.count_hosts()?,
        pages: store.count_pages()?,
        findings: store.count_findings()?,
        frontier_pending: count(FrontierState::Pending),
        frontier_in_flight: count(FrontierState::InFlight),
        frontier_done: count(FrontierState::Done),
        frontier_failed: count(FrontierState::Failed),
        top_hosts: store.hosts_by_trust(TOP_HOSTS)?,
    })
}

impl fmt::Display for StatsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Hosts discovered:   {}", self.hosts)?;
        writeln!(f, "Pages fetched:      {}", self.pages)?;
        writeln!(f, "Findings extracted: {}", self.findings)?;
        writeln!(
            f,
            "Frontier:           {} pending, {} in flight, {} done, {} failed",
            self.frontier_pending, self.frontier_in_flight, self.frontier_done, self.frontier_failed
        )?;
        if !self.top_hosts.is_empty() {
            writeln!(f, "Top hosts by trust:")?;
            for host in &self.top_hosts {
                writeln!(
                    f,
                    "  {:.3}  {}  ({}/{} fetches ok)",
                    host.trust_score, host.host, host.fetch_successes, host.fetch_attempts
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FetchCycle, FrontierTransition, PageOutcome};
    use tempfile::TempDir;

    #[test]
    fn test_stats_on_empty_database() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("empty.db");
        drop(SqliteStore::open(&db_path).unwrap());

        let stats = collect_stats(&db_path).unwrap();
        assert_eq!(stats.hosts, 0);
        assert_eq!(stats.pages, 0);
        assert_eq!(stats.frontier_pending, 0);
        assert!(stats.top_hosts.is_empty());
    }

    #[test]
    fn test_stats_after_one_cycle() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("crawl.db");
        {
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
                    content_hash: None,
                    byte_size: 0,
                    fetch_ms: 1,
                    title: None,
                    findings: Vec::new(),
                    discovered: vec![("http://b.onion/".to_string(), "b.onion".to_string())],
                    transition: FrontierTransition::Done,
                })
                .unwrap();
        }

        let stats = collect_stats(&db_path).unwrap();
        assert_eq!(stats.hosts, 1);
        assert_eq!(stats.pages, 1);
        assert_eq!(stats.frontier_done, 1);
        assert_eq!(stats.frontier_pending, 1);
        assert_eq!(stats.top_hosts.len(), 1);

        let rendered = stats.to_string();
        assert!(rendered.contains("a.onion"));
        assert!(rendered.contains("1 pending"));
    }
}
