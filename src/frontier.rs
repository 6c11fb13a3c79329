//! In-memory crawl frontier
//!
//! The frontier is the FIFO queue of pending addresses plus the set of
//! addresses currently being fetched. It is a cache over the durable
//! frontier table: every entry here has a row there, and after a crash
//! the whole structure is rebuilt from a store snapshot.

use crate::storage::{FrontierRecord, FrontierState, FrontierTransition, Store, StoreResult};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// One dequeued unit of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    pub address: String,
    pub host: String,
    pub retry_count: u32,
}

/// Result of a dequeue attempt
#[derive(Debug)]
pub enum Dequeue {
    /// An entry whose host passed the courtesy check
    Entry(FrontierEntry),
    /// Entries are pending but every candidate host was contacted too
    /// recently
    NotReady,
    /// Nothing pending
    Empty,
}

/// Per-host courtesy spacing.
///
/// `try_claim` is check-and-record in one step; callers invoke it inside
/// the frontier's critical section so two workers can never both claim
/// the same host within one interval.
pub struct CourtesyLedger {
    interval: Duration,
    last_dispatch: Mutex<HashMap<String, Instant>>,
}

impl CourtesyLedger {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_dispatch: Mutex::new(HashMap::new()),
        }
    }

    /// Claims the host for an immediate dispatch if its courtesy interval
    /// has elapsed. A successful claim records the dispatch time.
    pub fn try_claim(&self, host: &str) -> bool {
        let now = Instant::now();
        let mut ledger = match self.last_dispatch.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match ledger.get(host) {
            Some(last) if now.duration_since(*last) < self.interval => false,
            _ => {
                ledger.insert(host.to_string(), now);
                true
            }
        }
    }

    /// Re-records the dispatch time for a claimed host. Workers call this
    /// right before the fetch goes out, so the interval spaces actual
    /// requests rather than dequeue decisions.
    pub fn touch(&self, host: &str) {
        let mut ledger = match self.last_dispatch.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        ledger.insert(host.to_string(), Instant::now());
    }

    /// Cancels a claim whose fetch never happened, so the host is
    /// immediately claimable again. Safe because a successful claim
    /// implies any earlier dispatch was already a full interval ago.
    pub fn unclaim(&self, host: &str) {
        let mut ledger = match self.last_dispatch.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        ledger.remove(host);
    }
}

/// FIFO frontier with restart-safe deduplication.
///
/// The `seen` set mirrors the durable frontier table so most duplicate
/// link discoveries are rejected without touching the store.
pub struct Frontier {
    pending: VecDeque<FrontierEntry>,
    in_flight: HashSet<String>,
    seen: HashSet<String>,
}

impl Frontier {
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            in_flight: HashSet::new(),
            seen: HashSet::new(),
        }
    }

    /// Rebuilds the frontier from a store snapshot. Terminal rows
    /// populate only the seen set; pending rows are queued in discovery
    /// order. The snapshot has already reset crashed `in_flight` rows to
    /// pending, so none appear here.
    pub fn resume(snapshot: Vec<FrontierRecord>) -> Self {
        let mut frontier = Self::new();
        for record in snapshot {
            frontier.seen.insert(record.address.clone());
            if record.state == FrontierState::Pending {
                frontier.pending.push_back(FrontierEntry {
                    address: record.address,
                    host: record.host,
                    retry_count: record.retry_count,
                });
            }
        }
        frontier
    }

    /// Enqueues an address if it has never been seen, writing the durable
    /// row first. Returns whether it was newly enqueued.
    pub fn enqueue_checked(
        &mut self,
        store: &mut dyn Store,
        address: &str,
        host: &str,
    ) -> StoreResult<bool> {
        if self.seen.contains(address) {
            return Ok(false);
        }
        // The store can still reject it: another run may have seen the
        // address before this process started
        let inserted = store.enqueue_address(address, host)?;
        self.seen.insert(address.to_string());
        if inserted {
            self.pending.push_back(FrontierEntry {
                address: address.to_string(),
                host: host.to_string(),
                retry_count: 0,
            });
        }
        Ok(inserted)
    }

    /// Absorbs addresses the store reports as newly inserted during a
    /// fetch-cycle commit. Their durable rows already exist.
    pub fn absorb(&mut self, addresses: &[(String, String)]) {
        for (address, host) in addresses {
            if self.seen.insert(address.clone()) {
                self.pending.push_back(FrontierEntry {
                    address: address.clone(),
                    host: host.clone(),
                    retry_count: 0,
                });
            }
        }
    }

    /// Dequeues the oldest pending entry whose host passes the courtesy
    /// check. Skipped entries keep their queue positions.
    pub fn dequeue(&mut self, ledger: &CourtesyLedger) -> Dequeue {
        if self.pending.is_empty() {
            return Dequeue::Empty;
        }

        let position = self
            .pending
            .iter()
            .position(|entry| ledger.try_claim(&entry.host));

        match position {
            Some(idx) => {
                // remove() preserves the order of the remaining entries
                match self.pending.remove(idx) {
                    Some(entry) => {
                        self.in_flight.insert(entry.address.clone());
                        Dequeue::Entry(entry)
                    }
                    None => Dequeue::Empty,
                }
            }
            None => Dequeue::NotReady,
        }
    }

    /// Applies the frontier transition of a completed fetch cycle. The
    /// durable row was already transitioned by the store commit.
    pub fn complete(&mut self, entry: &FrontierEntry, transition: FrontierTransition) {
        self.in_flight.remove(&entry.address);
        if transition == FrontierTransition::Retry {
            self.pending.push_back(FrontierEntry {
                address: entry.address.clone(),
                host: entry.host.clone(),
                retry_count: entry.retry_count + 1,
            });
        }
    }

    /// Returns an entry to the front of the queue without completing it
    /// (used when a worker dequeues but cannot proceed, e.g. the page
    /// budget ran out between dequeue and fetch)
    pub fn release(&mut self, entry: FrontierEntry) {
        self.in_flight.remove(&entry.address);
        self.pending.push_front(entry);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// True when no work remains and none is in progress anywhere
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.in_flight.is_empty()
    }

    pub fn has_seen(&self, address: &str) -> bool {
        self.seen.contains(address)
    }
}

impl Default for Frontier {
    fn default() -> Self {
        Self::new()
    }
}
