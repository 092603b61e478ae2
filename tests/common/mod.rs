// Shared test fixtures: a scriptable in-memory sprite source and image header builders.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, ImageFormat, RgbImage, RgbaImage};
use parking_lot::Mutex;

use sprite_preload::{Sprite, SpriteSource};

/// Deterministic source. Every path succeeds with a 10x20 sprite unless scripted otherwise.
pub struct FakeSource {
    calls: Mutex<HashMap<String, usize>>,
    failing: Mutex<HashSet<String>>,
    flaky: Mutex<HashMap<String, usize>>,
    panicking: Mutex<HashSet<String>>,
    dims: Mutex<HashMap<String, (u32, u32)>>,
    latency: Duration,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::with_latency(Duration::ZERO)
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            flaky: Mutex::new(HashMap::new()),
            panicking: Mutex::new(HashSet::new()),
            dims: Mutex::new(HashMap::new()),
            latency,
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Make every fetch of `path` fail until [`FakeSource::heal`].
    pub fn fail(&self, path: &str) {
        self.failing.lock().insert(path.to_string());
    }

    pub fn heal(&self, path: &str) {
        self.failing.lock().remove(path);
    }

    /// Fail the next `times` fetches of `path`, then succeed.
    pub fn fail_times(&self, path: &str, times: usize) {
        self.flaky.lock().insert(path.to_string(), times);
    }

    /// Panic inside the next fetch of `path`, then behave normally.
    pub fn panic_once(&self, path: &str) {
        self.panicking.lock().insert(path.to_string());
    }

    /// Report `width`x`height` for `path` instead of the default 10x20.
    pub fn set_dims(&self, path: &str, width: u32, height: u32) {
        self.dims.lock().insert(path.to_string(), (width, height));
    }

    pub fn calls(&self, path: &str) -> usize {
        self.calls.lock().get(path).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }

    /// Highest number of fetches observed running at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpriteSource for FakeSource {
    async fn fetch(&self, path: &str) -> Result<Sprite> {
        *self.calls.lock().entry(path.to_string()).or_insert(0) += 1;

        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(active, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.panicking.lock().remove(path) {
            panic!("fake source panicked on {}", path);
        }
        if self.failing.lock().contains(path) {
            return Err(anyhow!("fake fetch error for {}", path));
        }
        {
            let mut flaky = self.flaky.lock();
            if let Some(remaining) = flaky.get_mut(path) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(anyhow!("transient fetch error for {}", path));
                }
            }
        }

        let (width, height) = self.dims.lock().get(path).copied().unwrap_or((10, 20));
        Ok(Sprite::new(path, Some(width), Some(height), Bytes::from_static(b"fake")))
    }
}

/// Encode a blank `width`x`height` image in `format`.
pub fn encoded_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let image = match format {
        ImageFormat::Jpeg | ImageFormat::Bmp => DynamicImage::ImageRgb8(RgbImage::new(width, height)),
        _ => DynamicImage::ImageRgba8(RgbaImage::new(width, height)),
    };
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, format).unwrap();
    out.into_inner()
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    encoded_image(width, height, ImageFormat::Png)
}
