pub mod config;
pub mod detect;
pub mod engine;
pub mod error;
pub mod source;
pub mod telemetry;

pub use engine::cache::{LoadResult, PendingLoad, SpriteCache};
pub use engine::manifest::{extract_paths, AssetDescriptor, AssetKind, Manifest, SpriteEntry};
pub use engine::preloader::{BatchPreloader, PreloadProgress, PreloadStats, ProgressEvent};
pub use engine::stats::CacheStats;
pub use error::LoadError;
pub use source::traits::{Sprite, SpriteSource};
