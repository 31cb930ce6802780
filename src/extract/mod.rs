pub mod cards;
pub mod collections;

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::browser::Page;
use crate::config::Config;
use crate::model::{Collection, Product};
use cards::{CardOutcome, SkipReason};

/// Everything one pass over the catalog page produced.
#[derive(Debug, Default)]
pub struct Extraction {
    pub products: Vec<Product>,
    pub collections: Vec<Collection>,
    /// Card index and the reason it was dropped.
    pub skipped: Vec<(usize, SkipReason)>,
    pub cards_seen: usize,
}

impl Extraction {
    pub fn skip_counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for (_, reason) in &self.skipped {
            *counts.entry(reason.label()).or_insert(0) += 1;
        }
        counts
    }
}

/// Load the catalog, discover collections, scroll until every card has
/// rendered, then read the cards. Only a failed navigation is fatal.
pub async fn extract<P: Page>(page: &P, config: &Config) -> Result<Extraction> {
    let site = &config.site;
    let browser = &config.browser;

    info!("Loading catalog {}", site.catalog_url);
    page.goto(&site.catalog_url, browser.navigation_timeout())
        .await
        .context("Failed to open catalog")?;
    page.settle(browser.settle()).await;

    let collections = collections::extract(page, site, browser.selector_timeout()).await;
    info!("Found {} collections", collections.len());

    let scrolls = scroll_until_stable(page, browser.scroll_pause(), browser.max_scrolls).await;
    debug!("Scrolled {} times", scrolls);

    let found = page
        .query_all(&site.selectors.card)
        .await
        .context("Failed to list product cards")?;
    info!("Found {} product cards", found.len());

    let mut extraction = Extraction {
        collections,
        cards_seen: found.len(),
        ..Default::default()
    };
    for (i, card) in found.iter().enumerate() {
        match cards::read(card, site, config.stable_fallback_codes).await {
            CardOutcome::Accepted(p) => extraction.products.push(p),
            CardOutcome::Skipped(reason) => {
                debug!("Card #{} skipped: {}", i, reason);
                extraction.skipped.push((i, reason));
            }
        }
    }

    info!(
        "Extracted {} products from {} cards ({} skipped)",
        extraction.products.len(),
        extraction.cards_seen,
        extraction.skipped.len()
    );
    for (reason, n) in extraction.skip_counts() {
        info!("  skipped [{}]: {}", reason, n);
    }
    Ok(extraction)
}

/// Scroll to the bottom until the document stops growing or `max_scrolls`
/// is hit. Returns the number of scrolls performed.
pub async fn scroll_until_stable<P: Page>(page: &P, pause: Duration, max_scrolls: usize) -> usize {
    let mut last = match page.scroll_height().await {
        Ok(h) => h,
        Err(e) => {
            warn!("Cannot read page height, skipping lazy-load scroll: {}", e);
            return 0;
        }
    };

    for i in 0..max_scrolls {
        if let Err(e) = page.scroll_to_bottom().await {
            warn!("Scroll failed: {}", e);
            return i;
        }
        page.settle(pause).await;
        let height = match page.scroll_height().await {
            Ok(h) => h,
            Err(e) => {
                warn!("Cannot read page height: {}", e);
                return i + 1;
            }
        };
        if height <= last {
            return i + 1;
        }
        last = height;
    }
    warn!("Page still growing after {} scrolls", max_scrolls);
    max_scrolls
}
