// In-memory sprite cache with request coalescing and permanent-failure memory.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, info, warn};

use super::stats::{CacheCounters, CacheStats};
use crate::config::CacheConfig;
use crate::error::LoadError;
use crate::source::traits::{Sprite, SpriteSource};

pub type LoadResult = std::result::Result<Arc<Sprite>, LoadError>;

type OutcomeSlot = watch::Receiver<Option<LoadResult>>;

struct Flight {
    /// Identifies this attempt so a settle after `clear_one` can tell it was discarded.
    ticket: u64,
    outcome: OutcomeSlot,
}

#[derive(Default)]
struct CacheState {
    cache: HashMap<String, Arc<Sprite>>,
    in_flight: HashMap<String, Flight>,
    loaded: HashSet<String>,
    failed: HashSet<String>,
}

/// A load that has been started or answered but not awaited yet.
///
/// Obtained from [`SpriteCache::begin`]. Owns everything it needs, so it can be
/// moved into a task.
pub enum PendingLoad {
    Ready(LoadResult),
    Waiting { key: String, outcome: OutcomeSlot },
}

impl PendingLoad {
    pub async fn wait(self) -> LoadResult {
        match self {
            Self::Ready(result) => result,
            Self::Waiting { key, mut outcome } => {
                let settled = match outcome.wait_for(Option::is_some).await {
                    Ok(slot) => (*slot).clone(),
                    Err(_) => None,
                };
                settled.unwrap_or_else(|| {
                    Err(LoadError::load_failed(
                        &key,
                        anyhow!("fetch task ended without a result"),
                    ))
                })
            }
        }
    }
}

/// Settles one fetch exactly once. If the fetch task unwinds or is aborted
/// before finishing, the key is marked failed on drop.
struct FetchSettler {
    state: Arc<Mutex<CacheState>>,
    counters: Arc<CacheCounters>,
    key: String,
    ticket: u64,
    tx: Option<watch::Sender<Option<LoadResult>>>,
}

impl FetchSettler {
    fn finish(mut self, outcome: LoadResult) {
        self.publish(outcome);
    }

    fn publish(&mut self, outcome: LoadResult) {
        let Some(tx) = self.tx.take() else {
            return;
        };
        SpriteCache::settle(&self.state, &self.counters, &self.key, self.ticket, &outcome);
        // Waiters may all be gone; the cache state is already updated.
        let _ = tx.send(Some(outcome));
    }
}

impl Drop for FetchSettler {
    fn drop(&mut self) {
        if self.tx.is_some() {
            warn!("sprite {} fetch task ended without settling", self.key);
            let outcome = Err(LoadError::load_failed(
                &self.key,
                anyhow!("fetch task ended without a result"),
            ));
            self.publish(outcome);
        }
    }
}

pub struct SpriteCache {
    source: Arc<dyn SpriteSource>,
    state: Arc<Mutex<CacheState>>,
    counters: Arc<CacheCounters>,
    fetch_semaphore: Arc<Semaphore>,
    next_ticket: AtomicU64,
    max_retries: u32,
    retry_backoff: Duration,
}

impl SpriteCache {
    pub fn new(source: Arc<dyn SpriteSource>) -> Self {
        Self::with_config(source, &CacheConfig::default())
    }

    pub fn with_config(source: Arc<dyn SpriteSource>, config: &CacheConfig) -> Self {
        Self {
            source,
            state: Arc::new(Mutex::new(CacheState::default())),
            counters: Arc::new(CacheCounters::new()),
            fetch_semaphore: Arc::new(Semaphore::new(config.max_concurrent_fetches.max(1))),
            next_ticket: AtomicU64::new(0),
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    /// Load a sprite, joining an in-flight fetch for the same key if there is one.
    ///
    /// Cached keys resolve without suspending. Keys that failed before resolve to
    /// [`LoadError::PreviouslyFailed`] without touching the source.
    pub async fn load(&self, key: &str) -> LoadResult {
        self.begin(key).wait().await
    }

    /// Start a load without awaiting it.
    ///
    /// The underlying fetch runs on its own task and settles the cache state even
    /// if the returned [`PendingLoad`] is dropped. Must be called within a tokio
    /// runtime.
    pub fn begin(&self, key: &str) -> PendingLoad {
        self.counters.record_request();

        let mut state = self.state.lock();

        if let Some(sprite) = state.cache.get(key) {
            self.counters.record_hit();
            return PendingLoad::Ready(Ok(Arc::clone(sprite)));
        }

        if let Some(flight) = state.in_flight.get(key) {
            self.counters.record_coalesced();
            debug!("sprite {} joined in-flight fetch", key);
            return PendingLoad::Waiting {
                key: key.to_string(),
                outcome: flight.outcome.clone(),
            };
        }

        if state.failed.contains(key) {
            debug!("sprite {} previously failed, not retrying", key);
            return PendingLoad::Ready(Err(LoadError::PreviouslyFailed {
                key: key.to_string(),
            }));
        }

        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = watch::channel(None);
        state.in_flight.insert(
            key.to_string(),
            Flight {
                ticket,
                outcome: rx.clone(),
            },
        );
        drop(state);

        self.spawn_fetch(key.to_string(), ticket, tx);

        PendingLoad::Waiting {
            key: key.to_string(),
            outcome: rx,
        }
    }

    fn spawn_fetch(&self, key: String, ticket: u64, tx: watch::Sender<Option<LoadResult>>) {
        let source = Arc::clone(&self.source);
        let state = Arc::clone(&self.state);
        let counters = Arc::clone(&self.counters);
        let semaphore = Arc::clone(&self.fetch_semaphore);
        let max_retries = self.max_retries;
        let retry_backoff = self.retry_backoff;

        let settler = FetchSettler {
            state,
            counters: Arc::clone(&counters),
            key,
            ticket,
            tx: Some(tx),
        };

        tokio::spawn(async move {
            let outcome = Self::fetch_with_retry(
                &settler.key,
                source.as_ref(),
                &semaphore,
                &counters,
                max_retries,
                retry_backoff,
            )
            .await
            .map(Arc::new)
            .map_err(|e| LoadError::load_failed(&settler.key, e));

            settler.finish(outcome);
        });
    }

    async fn fetch_with_retry(
        key: &str,
        source: &dyn SpriteSource,
        semaphore: &Semaphore,
        counters: &CacheCounters,
        max_retries: u32,
        retry_backoff: Duration,
    ) -> Result<Sprite> {
        let _permit = semaphore.acquire().await.map_err(|e| anyhow!("{}", e))?;

        let mut attempt = 0u32;
        loop {
            counters.record_fetch();

            match source.fetch(key).await {
                Ok(sprite) => {
                    debug!("sprite {} fetched ({} bytes)", key, sprite.data.len());
                    return Ok(sprite);
                }
                Err(e) if attempt < max_retries => {
                    warn!("sprite {} fetch failed (attempt {}): {}", key, attempt, e);
                    tokio::time::sleep(retry_backoff * (attempt + 1)).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!("sprite {} fetch failed after {} attempts: {}", key, attempt + 1, e);
                    return Err(e);
                }
            }
        }
    }

    fn settle(
        state: &Mutex<CacheState>,
        counters: &CacheCounters,
        key: &str,
        ticket: u64,
        outcome: &LoadResult,
    ) {
        if outcome.is_err() {
            counters.record_failure();
        }

        let mut state = state.lock();

        if state.in_flight.get(key).map(|f| f.ticket) != Some(ticket) {
            debug!("sprite {} was cleared while loading, result discarded", key);
            return;
        }
        state.in_flight.remove(key);

        match outcome {
            Ok(sprite) => {
                state.failed.remove(key);
                state.cache.insert(key.to_string(), Arc::clone(sprite));
                state.loaded.insert(key.to_string());
            }
            Err(_) => {
                state.cache.remove(key);
                state.loaded.remove(key);
                state.failed.insert(key.to_string());
            }
        }
    }

    /// Load every key concurrently and wait for all of them to settle.
    ///
    /// Never fails as a whole. Returns the sprites that loaded, in request order;
    /// failures are logged.
    pub async fn preload_many<I, S>(&self, keys: I) -> Vec<Arc<Sprite>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        // Start every fetch before awaiting any of them.
        let pending: Vec<(String, PendingLoad)> = keys
            .into_iter()
            .map(|key| {
                let key = key.as_ref().to_string();
                let load = self.begin(&key);
                (key, load)
            })
            .collect();

        let total = pending.len();
        let mut loaded = Vec::with_capacity(total);
        let mut failed = Vec::new();

        for (key, load) in pending {
            match load.wait().await {
                Ok(sprite) => loaded.push(sprite),
                Err(e) => {
                    debug!("preload of {} failed: {}", key, e);
                    failed.push(key);
                }
            }
        }

        if failed.is_empty() {
            info!("preloaded {}/{} sprites", loaded.len(), total);
        } else {
            warn!(
                "preloaded {}/{} sprites, failed: {}",
                loaded.len(),
                total,
                failed.join(", ")
            );
        }

        loaded
    }

    pub fn get_cached(&self, key: &str) -> Option<Arc<Sprite>> {
        self.state.lock().cache.get(key).cloned()
    }

    pub fn is_loaded(&self, key: &str) -> bool {
        self.state.lock().loaded.contains(key)
    }

    pub fn is_failed(&self, key: &str) -> bool {
        self.state.lock().failed.contains(key)
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        self.state.lock().in_flight.contains_key(key)
    }

    /// Forget everything about `key`. A fetch still running for it is left to
    /// finish, but its result is discarded.
    pub fn clear_one(&self, key: &str) {
        let mut state = self.state.lock();
        state.cache.remove(key);
        state.in_flight.remove(key);
        state.loaded.remove(key);
        state.failed.remove(key);
    }

    pub fn clear_all(&self) {
        let mut state = self.state.lock();
        state.cache.clear();
        state.in_flight.clear();
        state.loaded.clear();
        state.failed.clear();
        info!("sprite cache cleared");
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = {
            let state = self.state.lock();
            CacheStats {
                cached_count: state.cache.len(),
                loaded_count: state.loaded.len(),
                failed_count: state.failed.len(),
                in_flight_count: state.in_flight.len(),
                estimated_memory_bytes: state
                    .cache
                    .values()
                    .fold(0u64, |acc, s| acc.saturating_add(s.estimated_bytes())),
                ..Default::default()
            }
        };
        self.counters.fill(&mut stats);
        stats
    }

    /// Give every failed key one fresh attempt.
    pub async fn retry_failed(&self) -> Vec<Arc<Sprite>> {
        let keys: Vec<String> = {
            let mut state = self.state.lock();
            state.failed.drain().collect()
        };

        if keys.is_empty() {
            debug!("no failed sprites to retry");
            return Vec::new();
        }

        info!("retrying {} failed sprites", keys.len());
        self.preload_many(keys).await
    }
}
