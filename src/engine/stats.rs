// Cache statistics — membership counts, memory estimate, hit and fetch counters.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    pub cached_count: usize,
    pub loaded_count: usize,
    pub failed_count: usize,
    pub in_flight_count: usize,
    pub estimated_memory_bytes: u64,
    /// Total `load` calls.
    pub requests: u64,
    /// Loads answered from the cache without suspending.
    pub hits: u64,
    /// Loads that joined an already running fetch.
    pub coalesced: u64,
    /// Underlying fetch attempts, retries included.
    pub fetches: u64,
    /// Loads whose fetch ultimately failed.
    pub fetch_failures: u64,
}

impl CacheStats {
    /// Share of requests served without starting a fetch.
    pub fn hit_rate(&self) -> f64 {
        if self.requests > 0 {
            (self.hits + self.coalesced) as f64 / self.requests as f64
        } else {
            0.0
        }
    }
}

pub struct CacheCounters {
    requests: AtomicU64,
    hits: AtomicU64,
    coalesced: AtomicU64,
    fetches: AtomicU64,
    fetch_failures: AtomicU64,
}

impl CacheCounters {
    pub fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
            fetches: AtomicU64::new(0),
            fetch_failures: AtomicU64::new(0),
        }
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch(&self) {
        self.fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the counters into `stats`, leaving the membership fields untouched.
    pub fn fill(&self, stats: &mut CacheStats) {
        stats.requests = self.requests.load(Ordering::Relaxed);
        stats.hits = self.hits.load(Ordering::Relaxed);
        stats.coalesced = self.coalesced.load(Ordering::Relaxed);
        stats.fetches = self.fetches.load(Ordering::Relaxed);
        stats.fetch_failures = self.fetch_failures.load(Ordering::Relaxed);
    }
}

impl Default for CacheCounters {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_basic() {
        let counters = CacheCounters::new();
        for _ in 0..4 {
            counters.record_request();
        }
        counters.record_hit();
        counters.record_coalesced();
        counters.record_fetch();
        counters.record_fetch();
        counters.record_failure();

        let mut stats = CacheStats {
            cached_count: 3,
            ..Default::default()
        };
        counters.fill(&mut stats);

        assert_eq!(stats.cached_count, 3);
        assert_eq!(stats.requests, 4);
        assert_eq!(stats.fetches, 2);
        assert_eq!(stats.fetch_failures, 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_hit_rate_without_requests() {
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }
}
