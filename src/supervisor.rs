//! Crawl supervision: lifecycle, seeding, shutdown
//!
//! The supervisor owns a crawl run end to end: open the store, rebuild
//! the frontier, inject seeds, probe the proxy, spawn the worker pool,
//! and drain it again on interrupt or budget exhaustion. Workers observe
//! the run only through the shared [`CrawlState`].

use crate::addr::{extract_host, normalize_addr};
use crate::analyzer::Analyzer;
use crate::config::{validate, Config, OutputConfig};
use crate::frontier::{CourtesyLedger, Frontier};
use crate::storage::{FrontierState, PageOutcome, SqliteStore, Store};
use crate::transport::{ProxyTransport, TorTransport};
use crate::workers::{spawn_workers, WorkerContext};
use crate::{ConfigError, VeilError};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Lifecycle phase of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Seeding,
    Running,
    Draining,
    Stopped,
}

impl std::fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Seeding => "seeding",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Shared run counters and the stop signal.
///
/// The page budget is enforced by reservation: a worker reserves a slot
/// before fetching, so the number of fetches can never exceed the budget
/// no matter how many workers race for the last slots.
pub struct CrawlState {
    page_budget: u64,
    pages_reserved: AtomicU64,
    pages_fetched: AtomicU64,
    pages_succeeded: AtomicU64,
    pages_retried: AtomicU64,
    findings_extracted: AtomicU64,
    stop: AtomicBool,
}

impl CrawlState {
    pub fn new(page_budget: u64) -> Self {
        Self {
            page_budget,
            pages_reserved: AtomicU64::new(0),
            pages_fetched: AtomicU64::new(0),
            pages_succeeded: AtomicU64::new(0),
            pages_retried: AtomicU64::new(0),
            findings_extracted: AtomicU64::new(0),
            stop: AtomicBool::new(false),
        }
    }

    /// Reserves one fetch against the budget; fails once spent
    pub fn try_reserve_page(&self) -> bool {
        self.pages_reserved
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |reserved| {
                (reserved < self.page_budget).then_some(reserved + 1)
            })
            .is_ok()
    }

    /// Returns an unused reservation (the fetch never happened)
    pub fn release_page(&self) {
        self.pages_reserved.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn record_page(&self, outcome: PageOutcome, findings: u64) {
        self.pages_fetched.fetch_add(1, Ordering::Relaxed);
        if outcome.is_success() {
            self.pages_succeeded.fetch_add(1, Ordering::Relaxed);
        }
        self.findings_extracted.fetch_add(findings, Ordering::Relaxed);
    }

    /// Counts an address sent back to the queue after a failed fetch
    pub fn record_retry(&self) {
        self.pages_retried.fetch_add(1, Ordering::Relaxed);
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> CrawlSnapshot {
        CrawlSnapshot {
            page_budget: self.page_budget,
            pages_fetched: self.pages_fetched.load(Ordering::Relaxed),
            pages_succeeded: self.pages_succeeded.load(Ordering::Relaxed),
            pages_retried: self.pages_retried.load(Ordering::Relaxed),
            findings_extracted: self.findings_extracted.load(Ordering::Relaxed),
            stop_requested: self.stop_requested(),
        }
    }
}

/// Point-in-time view of the run counters
#[derive(Debug, Clone)]
pub struct CrawlSnapshot {
    pub page_budget: u64,
    pub pages_fetched: u64,
    pub pages_succeeded: u64,
    pub pages_retried: u64,
    pub findings_extracted: u64,
    pub stop_requested: bool,
}

/// Final accounting of one crawl run
#[derive(Debug)]
pub struct CrawlReport {
    pub snapshot: CrawlSnapshot,
    pub hosts: u64,
    pub pages: u64,
    pub findings: u64,
    pub frontier_counts: HashMap<FrontierState, u64>,
    pub elapsed: Duration,
    /// Whether the run passed through the draining phase (interrupt or
    /// budget exhaustion) rather than exhausting the frontier
    pub drained: bool,
}

/// Removes an existing database (with its WAL sidecars) and opens a
/// fresh store, or just opens the existing one
pub fn open_store(output: &OutputConfig, reset: bool) -> crate::Result<SqliteStore> {
    let path = Path::new(&output.database_path);
    if reset && path.exists() {
        tracing::warn!(path = %output.database_path, "Resetting database");
        std::fs::remove_file(path)?;
        for suffix in ["-wal", "-shm"] {
            let sidecar = format!("{}{}", output.database_path, suffix);
            let sidecar = Path::new(&sidecar);
            if sidecar.exists() {
                std::fs::remove_file(sidecar)?;
            }
        }
    }
    Ok(SqliteStore::open(path)?)
}

/// Drives one crawl run through its lifecycle
pub struct Supervisor {
    config: Config,
    state: SupervisorState,
}

impl Supervisor {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: SupervisorState::Idle,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    fn transition(&mut self, next: SupervisorState) {
        tracing::info!(from = %self.state, to = %next, "Supervisor state change");
        self.state = next;
    }

    /// Runs a full crawl against the real Tor transport
    pub async fn run(self, reset: bool) -> crate::Result<CrawlReport> {
        validate(&self.config)?;
        let store = open_store(&self.config.output, reset)?;
        let timeout = Duration::from_secs(self.config.crawler.request_timeout_secs);
        let transport = TorTransport::connect(&self.config.proxy, timeout).await?;
        self.run_with_transport(store, Arc::new(transport)).await
    }

    /// Runs a full crawl against any transport (tests drive this with a
    /// scripted one)
    pub async fn run_with_transport<T>(
        mut self,
        store: SqliteStore,
        transport: Arc<T>,
    ) -> crate::Result<CrawlReport>
    where
        T: ProxyTransport + ?Sized + 'static,
    {
        let started = Instant::now();
        let store = Arc::new(Mutex::new(store));

        // Rebuild the frontier from whatever a previous run left behind
        let snapshot = lock(&store).load_frontier_snapshot()?;
        let resumed_pending = snapshot
            .iter()
            .filter(|r| r.state == FrontierState::Pending)
            .count();
        let frontier = Arc::new(Mutex::new(Frontier::resume(snapshot)));
        if resumed_pending > 0 {
            tracing::info!(pending = resumed_pending, "Resumed frontier from database");
        }

        self.transition(SupervisorState::Seeding);
        self.seed(&store, &frontier)?;

        if lock(&frontier).is_idle() {
            tracing::warn!("Nothing to crawl: frontier is empty after seeding");
            self.transition(SupervisorState::Stopped);
            return self.report(&store, &CrawlState::new(0), started, false);
        }

        let analyzer = Analyzer::new()?;
        let state = Arc::new(CrawlState::new(self.config.crawler.page_budget));
        let ledger = Arc::new(CourtesyLedger::new(Duration::from_millis(
            self.config.crawler.courtesy_interval_ms,
        )));

        let ctx = WorkerContext {
            store: Arc::clone(&store),
            frontier,
            ledger,
            analyzer: Arc::new(analyzer),
            transport,
            state: Arc::clone(&state),
            retry_bound: self.config.crawler.retry_bound,
        };

        self.transition(SupervisorState::Running);
        let workers = spawn_workers(self.config.crawler.workers, ctx);

        let interrupt_state = Arc::clone(&state);
        let interrupt = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received, draining in-flight fetches");
                interrupt_state.request_stop();
            }
        });

        // Watch the stop flag while the workers wind down, so the run is
        // observably draining (not still running) once a stop is requested
        let join_all = async {
            for handle in workers {
                if let Err(e) = handle.await {
                    tracing::error!(error = %e, "Worker task panicked");
                }
            }
        };
        tokio::pin!(join_all);
        loop {
            tokio::select! {
                _ = &mut join_all => break,
                _ = tokio::time::sleep(Duration::from_millis(50)) => {
                    if self.state == SupervisorState::Running && state.stop_requested() {
                        self.transition(SupervisorState::Draining);
                    }
                }
            }
        }
        interrupt.abort();

        // A stop that lands after the last poll still counts as a drain
        if self.state == SupervisorState::Running && state.stop_requested() {
            self.transition(SupervisorState::Draining);
        }
        let drained = self.state == SupervisorState::Draining;
        self.transition(SupervisorState::Stopped);

        self.report(&store, &state, started, drained)
    }

    /// Injects configured seeds into the frontier. An invalid seed is a
    /// configuration error and aborts the run before any fetch.
    fn seed(
        &self,
        store: &Arc<Mutex<SqliteStore>>,
        frontier: &Arc<Mutex<Frontier>>,
    ) -> crate::Result<()> {
        let mut enqueued = 0usize;
        for seed in &self.config.seeds {
            let url = normalize_addr(seed).map_err(|e| {
                VeilError::Config(ConfigError::InvalidSeed {
                    seed: seed.clone(),
                    reason: e.to_string(),
                })
            })?;
            let host = extract_host(&url)?;

            let mut store = lock(store);
            let mut frontier = lock(frontier);
            if frontier.enqueue_checked(&mut *store, url.as_str(), &host)? {
                enqueued += 1;
            } else {
                tracing::debug!(seed = url.as_str(), "Seed already known, skipping");
            }
        }
        tracing::info!(
            configured = self.config.seeds.len(),
            enqueued,
            "Seeding complete"
        );
        Ok(())
    }

    fn report(
        &self,
        store: &Arc<Mutex<SqliteStore>>,
        state: &CrawlState,
        started: Instant,
        drained: bool,
    ) -> crate::Result<CrawlReport> {
        let store = lock(store);
        Ok(CrawlReport {
            snapshot: state.snapshot(),
            hosts: store.count_hosts()?,
            pages: store.count_pages()?,
            findings: store.count_findings()?,
            frontier_counts: store.frontier_counts()?,
            elapsed: started.elapsed(),
            drained,
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
