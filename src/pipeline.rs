use anyhow::Result;
use chrono::Local;
use tracing::{error, info};

use crate::browser::{BrowserSession, Page};
use crate::config::Config;
use crate::extract;
use crate::feed::{self, Synthesizer};
use crate::images::{ImageLookup, NoOverrides, OverrideStore};
use crate::model::{Collection, Product};
use crate::registry::{self, Registry};

/// What one run did, for the closing log line and the CLI.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub extracted: usize,
    pub skipped: usize,
    pub collections: usize,
    pub registry: usize,
    /// None when the progress file could not be written.
    pub saved: Option<usize>,
    pub offers: usize,
    pub feed_collections: usize,
    pub overrides: usize,
    pub published: bool,
}

pub fn image_lookup(config: &Config) -> Result<Box<dyn ImageLookup>> {
    if config.images.enabled {
        Ok(Box::new(OverrideStore::new(&config.images)?))
    } else {
        Ok(Box::new(NoOverrides))
    }
}

/// Full run: crawl with a real browser, then merge, save and publish.
/// The browser is shut down whether or not the run succeeded.
pub async fn run(config: &Config) -> Result<RunSummary> {
    let images = image_lookup(config)?;
    let session = BrowserSession::launch(&config.browser).await?;
    let result = crawl_and_publish(session.page(), images.as_ref(), config).await;
    session.shutdown().await;
    result
}

pub async fn crawl_and_publish<P: Page>(
    page: &P,
    images: &dyn ImageLookup,
    config: &Config,
) -> Result<RunSummary> {
    let extraction = extract::extract(page, config).await?;

    let registry = Registry::new(config.output.progress_path());
    let existing = registry.load();
    let before = existing.len();
    let extracted = extraction.products.len();
    let merged = registry::merge(existing, extraction.products);
    info!(
        "Registry: {} before, {} after merging {} extracted",
        before,
        merged.len(),
        extracted
    );

    let saved = match registry.save(&merged) {
        Ok(n) => Some(n),
        Err(e) => {
            error!("Failed to save progress: {:#}", e);
            None
        }
    };

    let mut summary = publish_feed(&merged, &extraction.collections, images, config).await?;
    summary.extracted = extracted;
    summary.skipped = extraction.skipped.len();
    summary.collections = extraction.collections.len();
    summary.saved = saved;
    Ok(summary)
}

/// Rebuild the feed from the persisted registry alone, without crawling.
pub async fn rebuild_feed(config: &Config) -> Result<RunSummary> {
    let images = image_lookup(config)?;
    let products = Registry::new(config.output.progress_path()).load();
    publish_feed(&products, &[], images.as_ref(), config).await
}

async fn publish_feed(
    products: &[Product],
    collections: &[Collection],
    images: &dyn ImageLookup,
    config: &Config,
) -> Result<RunSummary> {
    let synth = Synthesizer {
        config: &config.feed,
        catalog_url: &config.site.catalog_url,
        images,
    };
    let feed = synth
        .build(products, collections, Local::now().naive_local())
        .await?;

    let published = match feed::publish(&config.output.feed_path(), &feed.xml) {
        Ok(()) => true,
        Err(e) => {
            error!("Failed to publish feed, previous version kept: {:#}", e);
            false
        }
    };

    Ok(RunSummary {
        registry: products.len(),
        offers: feed.offers,
        feed_collections: feed.collections,
        overrides: feed.overrides,
        published,
        ..Default::default()
    })
}
