use std::collections::HashMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Client, RequestBuilder};
use tracing::{debug, warn};

use super::traits::{Sprite, SpriteSource};
use crate::detect::format::read_dimensions;

pub struct HttpSpriteSource {
    client: Client,
    base_url: RwLock<String>,
    headers: RwLock<HashMap<String, String>>,
}

impl HttpSpriteSource {
    pub fn new(base_url: String, headers: HashMap<String, String>) -> Self {
        Self {
            client: Client::new(),
            base_url: RwLock::new(base_url),
            headers: RwLock::new(headers),
        }
    }

    /// Update the base URL and headers (e.g. after token refresh).
    pub fn update_auth(&self, new_base_url: String, new_headers: HashMap<String, String>) {
        if !new_base_url.trim().is_empty() {
            *self.base_url.write() = new_base_url;
        }
        if !new_headers.is_empty() {
            *self.headers.write() = new_headers;
        }
    }

    /// Resolve a sprite path against the base URL. Absolute URLs pass through.
    pub fn resolve(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let base = self.base_url.read();
        format!(
            "{}/{}",
            base.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn build_request(&self, url: &str) -> RequestBuilder {
        let headers = self.headers.read().clone();

        let mut req = self.client.get(url);
        for (k, v) in &headers {
            req = req.header(k.as_str(), v.as_str());
        }
        req
    }
}

#[async_trait]
impl SpriteSource for HttpSpriteSource {
    async fn fetch(&self, path: &str) -> Result<Sprite> {
        let url = self.resolve(path);
        let resp = self.build_request(&url).send().await?;

        let status = resp.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            warn!("http sprite auth rejected status={} url={}", status.as_u16(), url);
            return Err(anyhow!("auth_rejected: HTTP {}", status.as_u16()));
        }
        if !status.is_success() {
            warn!("http sprite fetch failed status={} url={}", status.as_u16(), url);
            return Err(anyhow!("fetch failed: HTTP {} for {}", status.as_u16(), url));
        }

        let data = resp.bytes().await?;
        let dims = read_dimensions(&data);
        if dims.is_none() {
            debug!("http sprite {} has unrecognized header, dimensions unknown", path);
        }

        Ok(Sprite::new(
            path,
            dims.map(|(w, _)| w),
            dims.map(|(_, h)| h),
            data,
        ))
    }
}
