//! Per-key load errors.

use std::sync::Arc;

use thiserror::Error;

/// Failure of a single sprite load. Never escalates to a whole batch.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    /// The key failed earlier and has not been cleared or retried since.
    #[error("sprite {key} previously failed to load")]
    PreviouslyFailed { key: String },

    /// The underlying fetch failed. The cause is shared by every coalesced waiter.
    #[error("failed to load sprite {key}: {cause}")]
    LoadFailed {
        key: String,
        cause: Arc<anyhow::Error>,
    },
}

impl LoadError {
    pub fn key(&self) -> &str {
        match self {
            Self::PreviouslyFailed { key } | Self::LoadFailed { key, .. } => key,
        }
    }

    pub(crate) fn load_failed(key: &str, cause: anyhow::Error) -> Self {
        Self::LoadFailed {
            key: key.to_string(),
            cause: Arc::new(cause),
        }
    }
}
