use std::fmt;
use std::sync::LazyLock;

use anyhow::Result;
use chrono::Utc;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::browser::Element;
use crate::config::SiteConfig;
use crate::ident;
use crate::model::Product;

static DIGITS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

/// Why a product card did not become a product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NoBuyButton,
    Unavailable,
    MissingName,
    MissingLink,
    NotAProductLink(String),
    Failed(String),
}

impl SkipReason {
    pub fn label(&self) -> &'static str {
        match self {
            SkipReason::NoBuyButton => "no buy button",
            SkipReason::Unavailable => "unavailable",
            SkipReason::MissingName => "missing name",
            SkipReason::MissingLink => "missing link",
            SkipReason::NotAProductLink(_) => "not a product link",
            SkipReason::Failed(_) => "read failed",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotAProductLink(link) => write!(f, "{}: {}", self.label(), link),
            SkipReason::Failed(e) => write!(f, "{}: {}", self.label(), e),
            _ => f.write_str(self.label()),
        }
    }
}

#[derive(Debug)]
pub enum CardOutcome {
    Accepted(Product),
    Skipped(SkipReason),
}

/// Read one product card. Never fails: errors while reading become
/// `SkipReason::Failed` so the caller can move on to the next card.
pub async fn read<E: Element>(card: &E, site: &SiteConfig, stable_codes: bool) -> CardOutcome {
    match try_read(card, site, stable_codes).await {
        Ok(outcome) => outcome,
        Err(e) => CardOutcome::Skipped(SkipReason::Failed(format!("{:#}", e))),
    }
}

async fn try_read<E: Element>(card: &E, site: &SiteConfig, stable_codes: bool) -> Result<CardOutcome> {
    let sel = &site.selectors;

    let Some(button) = card.query(&sel.buy_button).await? else {
        return Ok(CardOutcome::Skipped(SkipReason::NoBuyButton));
    };
    let class = button.attr("class").await?.unwrap_or_default();
    let label = button.text().await?.unwrap_or_default();
    if class.split_whitespace().any(|c| c == site.disabled_class) || label.trim() == site.unavailable_label {
        return Ok(CardOutcome::Skipped(SkipReason::Unavailable));
    }

    let name = child_text(card, &sel.name).await?;
    if name.is_empty() {
        return Ok(CardOutcome::Skipped(SkipReason::MissingName));
    }

    let link = child_attr(card, &sel.link, "href").await?.unwrap_or_default();
    if link.is_empty() {
        return Ok(CardOutcome::Skipped(SkipReason::MissingLink));
    }
    if !is_product_link(&link, &site.catalog_url) {
        return Ok(CardOutcome::Skipped(SkipReason::NotAProductLink(link)));
    }

    let sku = child_text(card, &sel.sku).await?;
    let sku = sku.strip_prefix(site.sku_prefix.as_str()).unwrap_or(&sku).trim();
    let vendor_code = if sku.is_empty() {
        fallback_code(&name, &link, stable_codes)
    } else {
        sku.to_string()
    };

    let price = match card.query(&sel.price).await? {
        Some(el) => {
            let attr = el.attr(&sel.price_attr).await?;
            let text = el.text().await?.unwrap_or_default();
            parse_price(attr.as_deref(), &text)
        }
        None => "0".to_string(),
    };

    let image = image_url(card, &sel.image, &sel.image_lazy_attr).await?;
    let second = image_url(card, &sel.second_image, &sel.image_lazy_attr).await?;
    let additional_images = if !second.is_empty() && second != image {
        vec![second]
    } else {
        Vec::new()
    };

    let description = child_text(card, &sel.description).await?;

    let collection_id = card
        .attr(&sel.collection_attr)
        .await?
        .map(|raw| ident::normalize(raw.split(',').next().unwrap_or_default()))
        .unwrap_or_default();

    Ok(CardOutcome::Accepted(Product {
        vendor_code,
        name,
        link,
        price,
        image,
        additional_images,
        description,
        collection_id,
    }))
}

async fn child_text<E: Element>(el: &E, selector: &str) -> Result<String> {
    Ok(match el.query(selector).await? {
        Some(child) => child.text().await?.unwrap_or_default().trim().to_string(),
        None => String::new(),
    })
}

async fn child_attr<E: Element>(el: &E, selector: &str, attr: &str) -> Result<Option<String>> {
    Ok(match el.query(selector).await? {
        Some(child) => child.attr(attr).await?.map(|v| v.trim().to_string()),
        None => None,
    })
}

/// Lazy-load attribute first, then the regular `src`.
async fn image_url<E: Element>(card: &E, selector: &str, lazy_attr: &str) -> Result<String> {
    let Some(img) = card.query(selector).await? else {
        return Ok(String::new());
    };
    for attr in [lazy_attr, "src"] {
        if let Some(v) = img.attr(attr).await? {
            let v = v.trim();
            if !v.is_empty() {
                return Ok(v.to_string());
            }
        }
    }
    Ok(String::new())
}

/// Catalog root, bare "#" anchors and "#order" cart actions are not product pages.
pub fn is_product_link(link: &str, catalog_url: &str) -> bool {
    let link = link.trim();
    let root = catalog_url.trim().trim_end_matches('/');
    !(link.trim_end_matches('/') == root || link.ends_with('#') || link.contains("#order"))
}

/// Prefer the machine-readable price; otherwise take the first digit run of
/// the displayed text with all (including non-breaking) spaces removed.
pub fn parse_price(attr: Option<&str>, text: &str) -> String {
    if let Some(a) = attr.map(str::trim).filter(|a| !a.is_empty()) {
        let zero = a.parse::<f64>().map(|v| v == 0.0).unwrap_or(false);
        if !zero {
            return a.to_string();
        }
    }
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    DIGITS_RE
        .find(&compact)
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| "0".to_string())
}

/// Vendor code for cards without a visible SKU.
pub fn fallback_code(name: &str, link: &str, stable: bool) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update(b"\n");
    hasher.update(link.as_bytes());
    if !stable {
        hasher.update(Utc::now().to_rfc3339().as_bytes());
    }
    let digest = hex::encode(hasher.finalize());
    format!("AUTO-{}", &digest[..12])
}
