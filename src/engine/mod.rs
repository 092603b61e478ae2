// Engine — sprite cache lifecycle and manifest-wide preload orchestration.

pub mod cache;
pub mod manifest;
pub mod preloader;
pub mod stats;
