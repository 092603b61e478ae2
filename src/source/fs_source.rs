use std::path::{Component, Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use super::traits::{Sprite, SpriteSource};
use crate::detect::format::read_dimensions;

/// Reads sprites from a directory on the local filesystem.
pub struct FsSpriteSource {
    root: PathBuf,
}

impl FsSpriteSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Map a sprite path onto the root directory, rejecting escapes via `..`.
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(anyhow!("sprite path escapes asset root: {}", path));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl SpriteSource for FsSpriteSource {
    async fn fetch(&self, path: &str) -> Result<Sprite> {
        let full = self.resolve(path)?;
        let data = tokio::fs::read(&full)
            .await
            .with_context(|| format!("reading {}", full.display()))?;

        let dims = read_dimensions(&data);
        debug!("fs sprite {} read ({} bytes, dims={:?})", path, data.len(), dims);

        Ok(Sprite::new(
            path,
            dims.map(|(w, _)| w),
            dims.map(|(_, h)| h),
            Bytes::from(data),
        ))
    }
}
