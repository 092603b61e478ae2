use anyhow::Result;
use serde::Deserialize;

/// Bytes used by one decoded RGBA pixel.
pub const BYTES_PER_PIXEL: u64 = 4;

/// Default number of underlying fetches allowed to run at once.
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 6;

/// Default base delay between fetch retries (500 ms, grows linearly per attempt).
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;

/// Tuning for the sprite cache's fetch path.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of fetches running against the source at once.
    pub max_concurrent_fetches: usize,
    /// Extra attempts after the first failed fetch of one load.
    pub max_retries: u32,
    /// Base backoff between attempts in milliseconds.
    pub retry_backoff_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
            max_retries: 0,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
        }
    }
}

/// Top-level configuration for an embedding application.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PreloadConfig {
    pub cache: CacheConfig,
    /// Base URL for the HTTP source. Sprite paths are appended to it.
    pub base_url: Option<String>,
    /// Root directory for the filesystem source.
    pub asset_dir: Option<String>,
}

impl PreloadConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
