use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, info};

use crate::config::ImagesConfig;

/// Looks up an externally hosted replacement image for a vendor code.
#[async_trait]
pub trait ImageLookup: Send + Sync {
    /// The override's URL, or None if there is none or the probe failed.
    async fn resolve(&self, vendor_code: &str) -> Option<String>;
}

/// Override images kept in a git repository and served raw over HTTP.
pub struct OverrideStore {
    client: reqwest::Client,
    base_url: String,
    extension: String,
}

impl OverrideStore {
    pub fn new(config: &ImagesConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            client,
            base_url: format!(
                "{}/{}/{}/{}/images",
                config.store_root.trim_end_matches('/'),
                config.owner,
                config.repo,
                config.branch
            ),
            extension: config.extension.clone(),
        })
    }

    pub fn url_for(&self, vendor_code: &str) -> String {
        format!("{}/{}.{}", self.base_url, vendor_code, self.extension)
    }
}

#[async_trait]
impl ImageLookup for OverrideStore {
    async fn resolve(&self, vendor_code: &str) -> Option<String> {
        if vendor_code.is_empty() {
            return None;
        }
        let url = self.url_for(vendor_code);
        match self.client.head(&url).send().await {
            Ok(resp) if resp.status() == StatusCode::OK => {
                info!("Override image found for {}", vendor_code);
                Some(url)
            }
            Ok(resp) => {
                debug!("No override image for {} ({})", vendor_code, resp.status());
                None
            }
            Err(e) => {
                debug!("Override image probe failed for {}: {}", vendor_code, e);
                None
            }
        }
    }
}

/// Used when override images are switched off.
pub struct NoOverrides;

#[async_trait]
impl ImageLookup for NoOverrides {
    async fn resolve(&self, _vendor_code: &str) -> Option<String> {
        None
    }
}

/// Remembers probe results so each vendor code is probed at most once.
pub struct Memo<'a> {
    inner: &'a dyn ImageLookup,
    seen: HashMap<String, Option<String>>,
    pub found: usize,
}

impl<'a> Memo<'a> {
    pub fn new(inner: &'a dyn ImageLookup) -> Self {
        Self {
            inner,
            seen: HashMap::new(),
            found: 0,
        }
    }

    pub async fn resolve(&mut self, vendor_code: &str) -> Option<String> {
        if let Some(hit) = self.seen.get(vendor_code) {
            return hit.clone();
        }
        let result = self.inner.resolve(vendor_code).await;
        if result.is_some() {
            self.found += 1;
        }
        self.seen.insert(vendor_code.to_string(), result.clone());
        result
    }
}
