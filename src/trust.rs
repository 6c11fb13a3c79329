//! Trust scoring for discovered hosts
//!
//! A trust score is a pure function of a host's stored aggregates; it can
//! be recomputed from the database at any time and two runs over the same
//! data produce the same score. Scores live in `[0.0, 1.0]` with `0.5` as
//! the neutral point a host decays toward when it goes stale.

use crate::storage::{FindingKind, HostAggregate};
use chrono::{DateTime, Utc};

/// Weight of the fetch success ratio
const SUCCESS_WEIGHT: f64 = 0.4;
/// Weight of the page-volume component, saturating at [`VOLUME_CAP`] pages
const VOLUME_WEIGHT: f64 = 0.2;
const VOLUME_CAP: u64 = 10;
/// Contribution of each distinct high-value finding kind
const KIND_WEIGHT: f64 = 0.1;
/// Days of idleness that halve the distance from neutral
const STALENESS_HALF_LIFE_DAYS: f64 = 30.0;

const NEUTRAL: f64 = 0.5;

fn kind_weight(kind: FindingKind) -> f64 {
    match kind {
        FindingKind::Secret
        | FindingKind::CryptoAddress
        | FindingKind::SocialHandle
        | FindingKind::Email => KIND_WEIGHT,
        // Ambient signals, not deliberate content
        FindingKind::LeakedIp | FindingKind::TechFingerprint => KIND_WEIGHT / 2.0,
    }
}

/// Computes the trust score for a host from its stored aggregates.
///
/// `now` is passed in rather than read from the clock so the scorer stays
/// deterministic under test.
pub fn score(aggregate: &HostAggregate, now: DateTime<Utc>) -> f64 {
    let success_ratio = if aggregate.fetch_attempts == 0 {
        0.0
    } else {
        aggregate.fetch_successes as f64 / aggregate.fetch_attempts as f64
    };

    let volume = aggregate.fetch_successes.min(VOLUME_CAP) as f64 / VOLUME_CAP as f64;

    let kinds: f64 = aggregate
        .finding_kinds
        .iter()
        .map(|&kind| kind_weight(kind))
        .sum();

    let raw = (SUCCESS_WEIGHT * success_ratio + VOLUME_WEIGHT * volume + kinds).clamp(0.0, 1.0);

    // Stale hosts drift back toward neutral rather than keeping a score
    // earned long ago
    let idle_days = (now - aggregate.last_seen).num_seconds().max(0) as f64 / 86_400.0;
    let freshness = 1.0 / (1.0 + idle_days / STALENESS_HALF_LIFE_DAYS);

    (NEUTRAL + (raw - NEUTRAL) * freshness).clamp(0.0, 1.0)
}
