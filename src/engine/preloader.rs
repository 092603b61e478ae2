// Batch preloader — drives the sprite cache over a whole manifest and reports progress.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::cache::SpriteCache;
use super::manifest::{extract_paths, Manifest, SpriteEntry};
use crate::source::traits::Sprite;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreloadStats {
    pub total: usize,
    pub loaded: usize,
    pub failed: usize,
}

impl PreloadStats {
    pub fn settled(&self) -> usize {
        self.loaded + self.failed
    }

    /// Fraction of entries settled. An empty run counts as finished.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.settled() as f64 / self.total as f64
        }
    }
}

/// Point-in-time view returned by [`BatchPreloader::progress`].
#[derive(Debug, Clone, PartialEq)]
pub struct PreloadProgress {
    pub progress: f64,
    pub loaded: usize,
    pub failed: usize,
    pub total: usize,
    pub complete: bool,
}

/// Passed to the progress callback after each sprite settles.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub current: usize,
    pub total: usize,
    pub loaded: usize,
    pub failed: usize,
    pub current_path: String,
    pub progress: f64,
    /// Set when this sprite failed.
    pub error: Option<String>,
}

enum RunState {
    Idle,
    Preloading {
        run: u64,
        done: watch::Receiver<bool>,
    },
    Complete,
}

struct PreloadInner {
    state: RunState,
    entries: Vec<SpriteEntry>,
    stats: PreloadStats,
    /// Bumped on every new run and every reset.
    epoch: u64,
}

enum Start {
    Join(watch::Receiver<bool>),
    AlreadyComplete(PreloadStats),
    Run {
        run: u64,
        done: watch::Sender<bool>,
        entries: Vec<SpriteEntry>,
    },
}

/// Clears the preloading state when a run ends, including when its future is dropped.
struct RunGuard<'a> {
    inner: &'a Mutex<PreloadInner>,
    run: u64,
    done: watch::Sender<bool>,
    completed: bool,
}

impl RunGuard<'_> {
    fn is_current(&self, inner: &PreloadInner) -> bool {
        matches!(inner.state, RunState::Preloading { run, .. } if run == self.run)
    }

    fn complete(mut self) {
        self.completed = true;
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        {
            let mut inner = self.inner.lock();
            if self.is_current(&inner) {
                inner.state = if self.completed {
                    RunState::Complete
                } else {
                    debug!("preload run {} abandoned before completion", self.run);
                    RunState::Idle
                };
            }
        }
        let _ = self.done.send(true);
    }
}

pub struct BatchPreloader {
    cache: Arc<SpriteCache>,
    inner: Mutex<PreloadInner>,
}

impl BatchPreloader {
    pub fn new(cache: Arc<SpriteCache>) -> Self {
        Self {
            cache,
            inner: Mutex::new(PreloadInner {
                state: RunState::Idle,
                entries: Vec::new(),
                stats: PreloadStats::default(),
                epoch: 0,
            }),
        }
    }

    pub fn cache(&self) -> &Arc<SpriteCache> {
        &self.cache
    }

    /// Extract loadable sprites from `manifest` and record them as the current entries.
    ///
    /// While a run is active the recorded entries stay those of the run.
    pub fn extract_paths(&self, manifest: &Manifest) -> Vec<SpriteEntry> {
        let entries = extract_paths(manifest);
        let mut inner = self.inner.lock();
        if matches!(inner.state, RunState::Preloading { .. }) {
            debug!("preload running, keeping its extracted entries");
        } else {
            inner.entries = entries.clone();
        }
        entries
    }

    pub async fn preload_all(&self, manifest: &Manifest) -> PreloadStats {
        self.preload_all_with_progress(manifest, |_| {}).await
    }

    /// Preload every image in `manifest`, calling `on_progress` as each one settles.
    ///
    /// A call made while a run is active joins that run instead of starting another.
    /// Once a run for the same entries is complete, further calls return its stats
    /// without loading anything. Partial failure still completes; check
    /// [`PreloadStats::failed`].
    pub async fn preload_all_with_progress<F>(&self, manifest: &Manifest, mut on_progress: F) -> PreloadStats
    where
        F: FnMut(&ProgressEvent) + Send,
    {
        let extracted = extract_paths(manifest);

        let start = {
            let mut inner = self.inner.lock();
            let joining = match &inner.state {
                RunState::Preloading { done, .. } => Some(done.clone()),
                _ => None,
            };

            if let Some(done) = joining {
                Start::Join(done)
            } else if matches!(inner.state, RunState::Complete) && inner.entries == extracted {
                Start::AlreadyComplete(inner.stats)
            } else {
                let run = inner.epoch;
                inner.epoch += 1;
                let (tx, rx) = watch::channel(false);
                inner.state = RunState::Preloading { run, done: rx };
                inner.stats = PreloadStats {
                    total: extracted.len(),
                    loaded: 0,
                    failed: 0,
                };
                inner.entries = extracted.clone();
                Start::Run {
                    run,
                    done: tx,
                    entries: extracted,
                }
            }
        };

        let (run, done, entries) = match start {
            Start::Join(mut done) => {
                debug!("preload already running, joining it");
                let _ = done.wait_for(|finished| *finished).await;
                return self.stats();
            }
            Start::AlreadyComplete(stats) => {
                debug!("preload already complete, skipping");
                return stats;
            }
            Start::Run { run, done, entries } => (run, done, entries),
        };

        let guard = RunGuard {
            inner: &self.inner,
            run,
            done,
            completed: false,
        };

        let mut stats = PreloadStats {
            total: entries.len(),
            loaded: 0,
            failed: 0,
        };

        if entries.is_empty() {
            info!("manifest has no sprites to preload");
            guard.complete();
            return stats;
        }

        info!("preloading {} sprites", stats.total);

        let mut tasks = JoinSet::new();
        for entry in &entries {
            let load = self.cache.begin(&entry.path);
            let path = entry.path.clone();
            tasks.spawn(async move { (path, load.wait().await) });
        }

        while let Some(joined) = tasks.join_next().await {
            let (path, error) = match joined {
                Ok((path, Ok(_))) => (path, None),
                Ok((path, Err(e))) => (path, Some(e.to_string())),
                Err(e) => {
                    warn!("preload wait task failed: {}", e);
                    (String::new(), Some(e.to_string()))
                }
            };

            if error.is_some() {
                stats.failed += 1;
            } else {
                stats.loaded += 1;
            }

            {
                let mut inner = self.inner.lock();
                if guard.is_current(&inner) {
                    inner.stats = stats;
                }
            }

            let event = ProgressEvent {
                current: stats.settled(),
                total: stats.total,
                loaded: stats.loaded,
                failed: stats.failed,
                current_path: path,
                progress: stats.fraction(),
                error,
            };
            on_progress(&event);
        }

        if stats.failed > 0 {
            warn!(
                "preload complete with failures: {}/{} loaded, {} failed",
                stats.loaded, stats.total, stats.failed
            );
        } else {
            info!("preload complete: {}/{} loaded", stats.loaded, stats.total);
        }

        guard.complete();
        stats
    }

    pub fn progress(&self) -> PreloadProgress {
        let inner = self.inner.lock();
        let stats = inner.stats;
        PreloadProgress {
            progress: stats.fraction(),
            loaded: stats.loaded,
            failed: stats.failed,
            total: stats.total,
            complete: stats.total == 0 || matches!(inner.state, RunState::Complete),
        }
    }

    pub fn stats(&self) -> PreloadStats {
        self.inner.lock().stats
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.inner.lock().state, RunState::Complete)
    }

    pub fn is_preloading_active(&self) -> bool {
        matches!(self.inner.lock().state, RunState::Preloading { .. })
    }

    pub fn list_extracted(&self) -> Vec<SpriteEntry> {
        self.inner.lock().entries.clone()
    }

    /// Retry the failed sprites through the cache's own retry path.
    ///
    /// Does nothing when the last run had no failures or a run is still active.
    /// Afterwards the counters are recounted from cache membership.
    pub async fn retry_failed(&self) -> Vec<Arc<Sprite>> {
        let epoch = {
            let mut inner = self.inner.lock();
            if inner.stats.failed == 0 {
                info!("no failed sprites to retry");
                return Vec::new();
            }
            if matches!(inner.state, RunState::Preloading { .. }) {
                warn!("preload still running, retry skipped");
                return Vec::new();
            }
            inner.state = RunState::Idle;
            inner.stats.failed = 0;
            inner.epoch
        };

        let retried = self.cache.retry_failed().await;

        let mut inner = self.inner.lock();
        if inner.epoch != epoch || !matches!(inner.state, RunState::Idle) {
            debug!("preloader changed during retry, counters left as is");
            return retried;
        }

        let loaded = inner
            .entries
            .iter()
            .filter(|e| self.cache.is_loaded(&e.path))
            .count();
        let failed = inner
            .entries
            .iter()
            .filter(|e| self.cache.is_failed(&e.path))
            .count();
        inner.stats.loaded = loaded;
        inner.stats.failed = failed;
        inner.state = RunState::Complete;

        info!(
            "retry finished: {}/{} loaded, {} still failed",
            loaded, inner.stats.total, failed
        );
        retried
    }

    /// Return to the initial state. A running fetch is not cancelled; its run
    /// simply stops updating this preloader.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = RunState::Idle;
        inner.entries.clear();
        inner.stats = PreloadStats::default();
        inner.epoch += 1;
        debug!("preloader reset");
    }
}
