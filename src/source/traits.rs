use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

use crate::config::BYTES_PER_PIXEL;

/// A loaded image resource. The pixel payload is kept encoded.
#[derive(Debug, Clone)]
pub struct Sprite {
    pub path: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub data: Bytes,
}

impl Sprite {
    pub fn new(path: impl Into<String>, width: Option<u32>, height: Option<u32>, data: Bytes) -> Self {
        Self {
            path: path.into(),
            width,
            height,
            data,
        }
    }

    /// Decoded RGBA footprint. Unknown dimensions count as 0; saturates at `u64::MAX`.
    pub fn estimated_bytes(&self) -> u64 {
        let width = self.width.unwrap_or(0) as u64;
        let height = self.height.unwrap_or(0) as u64;
        width.saturating_mul(height).saturating_mul(BYTES_PER_PIXEL)
    }
}

/// Where sprites come from. The only point of actual I/O.
#[async_trait]
pub trait SpriteSource: Send + Sync {
    async fn fetch(&self, path: &str) -> Result<Sprite>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimated_bytes() {
        let sprite = Sprite::new("a.png", Some(10), Some(20), Bytes::new());
        assert_eq!(sprite.estimated_bytes(), 800);

        let unknown = Sprite::new("b.png", Some(10), None, Bytes::new());
        assert_eq!(unknown.estimated_bytes(), 0);
    }

    #[test]
    fn test_estimated_bytes_saturates() {
        let huge = Sprite::new("huge.png", Some(u32::MAX), Some(u32::MAX), Bytes::new());
        assert_eq!(huge.estimated_bytes(), u64::MAX);
    }
}
