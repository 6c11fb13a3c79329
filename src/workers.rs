//! Concurrent fetch workers
//!
//! Each worker loops over the shared frontier: dequeue an address, fetch
//! it through the proxy, analyze the body, and commit the whole cycle to
//! the store in one transaction. Workers hold no state of their own; a
//! worker crash loses at most the single in-flight fetch, which a later
//! run retries.

use crate::addr::extract_host;
use crate::analyzer::Analyzer;
use crate::frontier::{CourtesyLedger, Dequeue, Frontier, FrontierEntry};
use crate::storage::{
    FetchCycle, FrontierTransition, NewFinding, PageOutcome, SqliteStore, Store,
};
use crate::supervisor::CrawlState;
use crate::transport::{FetchOutcome, ProxyTransport};
use crate::trust;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use url::Url;

/// How long a worker sleeps when every pending host is inside its
/// courtesy interval
const COURTESY_WAIT: Duration = Duration::from_millis(250);

/// How long a worker sleeps when the queue is empty but other workers
/// are still in flight and may discover new links
const IDLE_WAIT: Duration = Duration::from_millis(500);

/// Consecutive store failures after which a worker asks the whole crawl
/// to drain rather than keep burning fetches it cannot persist
const MAX_STORE_ERRORS: u32 = 3;

/// Shared handles every worker operates on
pub struct WorkerContext<T: ?Sized> {
    pub store: Arc<Mutex<SqliteStore>>,
    pub frontier: Arc<Mutex<Frontier>>,
    pub ledger: Arc<CourtesyLedger>,
    pub analyzer: Arc<Analyzer>,
    pub transport: Arc<T>,
    pub state: Arc<CrawlState>,
    pub retry_bound: u32,
}

impl<T: ?Sized> Clone for WorkerContext<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            frontier: Arc::clone(&self.frontier),
            ledger: Arc::clone(&self.ledger),
            analyzer: Arc::clone(&self.analyzer),
            transport: Arc::clone(&self.transport),
            state: Arc::clone(&self.state),
            retry_bound: self.retry_bound,
        }
    }
}

/// Spawns the worker tasks. The returned handles complete when the
/// frontier is exhausted, the page budget is spent, or a stop is
/// requested.
pub fn spawn_workers<T>(count: u32, ctx: WorkerContext<T>) -> Vec<JoinHandle<()>>
where
    T: ProxyTransport + ?Sized + 'static,
{
    (0..count)
        .map(|id| {
            let ctx = ctx.clone();
            tokio::spawn(run_worker(id, ctx))
        })
        .collect()
}

async fn run_worker<T>(id: u32, ctx: WorkerContext<T>)
where
    T: ProxyTransport + ?Sized,
{
    tracing::debug!(worker = id, "Worker started");
    let mut consecutive_store_errors = 0u32;

    loop {
        if ctx.state.stop_requested() {
            break;
        }

        let dequeued = {
            let mut frontier = lock(&ctx.frontier);
            frontier.dequeue(&ctx.ledger)
        };

        let entry = match dequeued {
            Dequeue::Entry(entry) => entry,
            Dequeue::NotReady => {
                tokio::time::sleep(COURTESY_WAIT).await;
                continue;
            }
            Dequeue::Empty => {
                let idle = lock(&ctx.frontier).is_idle();
                if idle {
                    break;
                }
                // Another worker may still discover links
                tokio::time::sleep(IDLE_WAIT).await;
                continue;
            }
        };

        if !ctx.state.try_reserve_page() {
            ctx.ledger.unclaim(&entry.host);
            lock(&ctx.frontier).release(entry);
            tracing::info!(worker = id, "Page budget exhausted, requesting stop");
            ctx.state.request_stop();
            break;
        }

        let marked = lock(&ctx.store).mark_in_flight(&entry.address);
        if let Err(e) = marked {
            tracing::warn!(worker = id, address = %entry.address, error = %e,
                "Failed to mark address in flight");
            ctx.state.release_page();
            ctx.ledger.unclaim(&entry.host);
            lock(&ctx.frontier).release(entry);
            consecutive_store_errors += 1;
            if consecutive_store_errors >= MAX_STORE_ERRORS {
                tracing::error!(worker = id, "Persistent store failures, draining crawl");
                ctx.state.request_stop();
                break;
            }
            tokio::time::sleep(IDLE_WAIT).await;
            continue;
        }

        tracing::debug!(worker = id, address = %entry.address, retry = entry.retry_count,
            "Fetching");
        // Restart the courtesy clock at the request itself, not at the
        // dequeue that claimed the host
        ctx.ledger.touch(&entry.host);
        let outcome = ctx.transport.fetch(&entry.address).await;
        let cycle = build_cycle(&entry, outcome, &ctx.analyzer, ctx.retry_bound);

        let committed = lock(&ctx.store).record_fetch_cycle(&cycle);
        match committed {
            Ok(newly_enqueued) => {
                consecutive_store_errors = 0;

                let absorbed: Vec<(String, String)> = cycle
                    .discovered
                    .iter()
                    .filter(|(address, _)| newly_enqueued.contains(address))
                    .cloned()
                    .collect();

                {
                    let mut frontier = lock(&ctx.frontier);
                    frontier.absorb(&absorbed);
                    frontier.complete(&entry, cycle.transition);
                }

                ctx.state.record_page(cycle.outcome, cycle.findings.len() as u64);
                if cycle.transition == FrontierTransition::Retry {
                    ctx.state.record_retry();
                }
                tracing::info!(worker = id, address = %entry.address,
                    outcome = cycle.outcome.to_db_string(),
                    findings = cycle.findings.len(),
                    discovered = absorbed.len(),
                    "Fetch cycle committed");

                rescore_host(&ctx.store, &cycle.host);
            }
            Err(e) => {
                tracing::error!(worker = id, address = %entry.address, error = %e,
                    "Failed to commit fetch cycle");
                // The durable row stays in_flight; the next run reclaims it
                lock(&ctx.frontier).complete(&entry, FrontierTransition::Failed);
                consecutive_store_errors += 1;
                if consecutive_store_errors >= MAX_STORE_ERRORS {
                    tracing::error!(worker = id, "Persistent store failures, draining crawl");
                    ctx.state.request_stop();
                    break;
                }
            }
        }
    }

    tracing::debug!(worker = id, "Worker finished");
}

/// Recomputes and persists the trust score of a host from its stored
/// aggregates. Scoring failures are logged and never fail the cycle.
fn rescore_host(store: &Arc<Mutex<SqliteStore>>, host: &str) {
    let mut store = lock(store);
    match store.host_aggregate(host) {
        Ok(Some(aggregate)) => {
            let score = trust::score(&aggregate, Utc::now());
            if let Err(e) = store.update_trust_score(host, score) {
                tracing::warn!(%host, error = %e, "Failed to persist trust score");
            }
        }
        Ok(None) => {}
        Err(e) => tracing::warn!(%host, error = %e, "Failed to load host aggregates"),
    }
}

/// Builds the atomic fetch-cycle record from a transport outcome.
///
/// Pure with respect to its inputs, which keeps the policy decisions
/// (what counts as success, when to retry, what gets analyzed)
/// independently testable.
pub fn build_cycle(
    entry: &FrontierEntry,
    outcome: FetchOutcome,
    analyzer: &Analyzer,
    retry_bound: u32,
) -> FetchCycle {
    let mut cycle = FetchCycle {
        address: entry.address.clone(),
        host: entry.host.clone(),
        outcome: PageOutcome::Error,
        status_code: None,
        content_hash: None,
        byte_size: 0,
        fetch_ms: 0,
        title: None,
        findings: Vec::new(),
        discovered: Vec::new(),
        transition: retry_or_fail(entry.retry_count, retry_bound),
    };

    match outcome {
        FetchOutcome::Fetched(page) => {
            cycle.status_code = Some(page.status);
            cycle.byte_size = page.body.len() as u64;
            cycle.fetch_ms = page.elapsed.as_millis() as u64;

            if !(200..300).contains(&page.status) {
                // Recorded as an error page; retried up to the bound
                return cycle;
            }

            cycle.outcome = PageOutcome::Ok;
            cycle.transition = FrontierTransition::Done;
            cycle.content_hash = Some(hex::encode(Sha256::digest(&page.body)));

            // Missing Content-Type is treated as HTML; hidden services
            // are sloppy about headers
            let is_html = page
                .content_type
                .as_deref()
                .map(|ct| ct.contains("html") || ct.contains("xml"))
                .unwrap_or(true);
            if !is_html {
                return cycle;
            }

            let analysis = analyzer.analyze(&page.body, &page.headers, &entry.address);
            cycle.title = analysis.title;
            cycle.findings = analysis
                .findings
                .into_iter()
                .map(|f| NewFinding {
                    kind: f.kind,
                    matched_text: f.matched_text,
                    byte_offset: f.byte_offset,
                })
                .collect();
            cycle.discovered = analysis
                .links
                .into_iter()
                .filter_map(|link| {
                    let parsed = Url::parse(&link).ok()?;
                    let host = extract_host(&parsed).ok()?;
                    Some((link, host))
                })
                .collect();
        }
        FetchOutcome::Timeout => cycle.outcome = PageOutcome::Timeout,
        FetchOutcome::Refused => cycle.outcome = PageOutcome::Refused,
        FetchOutcome::Error(reason) => {
            tracing::debug!(address = %entry.address, %reason, "Transport error");
            cycle.outcome = PageOutcome::Error;
        }
    }

    cycle
}

fn retry_or_fail(retry_count: u32, retry_bound: u32) -> FrontierTransition {
    if retry_count < retry_bound {
        FrontierTransition::Retry
    } else {
        FrontierTransition::Failed
    }
}

/// Locks a mutex, recovering the data from a panicked worker rather than
/// cascading the poison
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::FetchedPage;

    fn entry(retries: u32) -> FrontierEntry {
        FrontierEntry {
            address: "http://workertesthost4arbitrarypadding2to56characters.onion/".to_string(),
            host: "workertesthost4arbitrarypadding2to56characters.onion".to_string(),
            retry_count: retries,
        }
    }

    fn fetched(status: u16, content_type: &str, body: &[u8]) -> FetchOutcome {
        FetchOutcome::Fetched(FetchedPage {
            status,
            content_type: Some(content_type.to_string()),
            headers: vec![("content-type".to_string(), content_type.to_string())],
            body: body.to_vec(),
            elapsed: Duration::from_millis(42),
        })
    }

    #[test]
    fn test_ok_html_page_is_analyzed() {
        let analyzer = Analyzer::new().unwrap();
        let body = br#"<html><head><title>Shop</title></head>
            <body>admin@shop.example <a href="/items">items</a></body></html>"#;
        let cycle = build_cycle(&entry(0), fetched(200, "text/html", body), &analyzer, 2);

        assert_eq!(cycle.outcome, PageOutcome::Ok);
        assert_eq!(cycle.transition, FrontierTransition::Done);
        assert_eq!(cycle.status_code, Some(200));
        assert_eq!(cycle.title.as_deref(), Some("Shop"));
        assert!(!cycle.findings.is_empty());
        assert_eq!(cycle.discovered.len(), 1);
        assert!(cycle.content_hash.is_some());
        assert_eq!(cycle.fetch_ms, 42);
    }

    #[test]
    fn test_non_html_success_records_empty_page() {
        let analyzer = Analyzer::new().unwrap();
        let cycle = build_cycle(
            &entry(0),
            fetched(200, "application/octet-stream", b"admin@shop.example"),
            &analyzer,
            2,
        );

        assert_eq!(cycle.outcome, PageOutcome::Ok);
        assert_eq!(cycle.transition, FrontierTransition::Done);
        assert!(cycle.findings.is_empty());
        assert!(cycle.discovered.is_empty());
    }

    #[test]
    fn test_http_error_retries_below_bound() {
        let analyzer = Analyzer::new().unwrap();
        let cycle = build_cycle(&entry(0), fetched(503, "text/html", b""), &analyzer, 2);

        assert_eq!(cycle.outcome, PageOutcome::Error);
        assert_eq!(cycle.status_code, Some(503));
        assert_eq!(cycle.transition, FrontierTransition::Retry);
        assert!(cycle.findings.is_empty());
    }

    #[test]
    fn test_http_error_fails_at_bound() {
        let analyzer = Analyzer::new().unwrap();
        let cycle = build_cycle(&entry(2), fetched(503, "text/html", b""), &analyzer, 2);
        assert_eq!(cycle.transition, FrontierTransition::Failed);
    }

    #[test]
    fn test_timeout_maps_to_timeout_outcome() {
        let analyzer = Analyzer::new().unwrap();
        let cycle = build_cycle(&entry(0), FetchOutcome::Timeout, &analyzer, 2);

        assert_eq!(cycle.outcome, PageOutcome::Timeout);
        assert_eq!(cycle.status_code, None);
        assert_eq!(cycle.transition, FrontierTransition::Retry);
    }

    #[test]
    fn test_refused_maps_to_refused_outcome() {
        let analyzer = Analyzer::new().unwrap();
        let cycle = build_cycle(&entry(1), FetchOutcome::Refused, &analyzer, 2);
        assert_eq!(cycle.outcome, PageOutcome::Refused);
        assert_eq!(cycle.transition, FrontierTransition::Retry);
    }

    #[test]
    fn test_transport_error_at_bound_is_terminal() {
        let analyzer = Analyzer::new().unwrap();
        let cycle = build_cycle(
            &entry(2),
            FetchOutcome::Error("circuit collapsed".to_string()),
            &analyzer,
            2,
        );
        assert_eq!(cycle.outcome, PageOutcome::Error);
        assert_eq!(cycle.transition, FrontierTransition::Failed);
    }

    #[test]
    fn test_content_hash_is_sha256_hex() {
        let analyzer = Analyzer::new().unwrap();
        let cycle = build_cycle(&entry(0), fetched(200, "text/html", b"abc"), &analyzer, 2);
        assert_eq!(
            cycle.content_hash.as_deref(),
            Some("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
    }
}
