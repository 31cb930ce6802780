use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Everything a run needs: where to crawl, how to drive the browser, where
/// override images live, where output goes and the fixed feed metadata.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    pub site: SiteConfig,
    pub browser: BrowserConfig,
    pub images: ImagesConfig,
    pub output: OutputConfig,
    pub feed: FeedConfig,
    /// Derive fallback vendor codes from name + link only. When false the
    /// current time is mixed in, so the same product gets a new code each run.
    pub stable_fallback_codes: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site: SiteConfig::default(),
            browser: BrowserConfig::default(),
            images: ImagesConfig::default(),
            output: OutputConfig::default(),
            feed: FeedConfig::default(),
            stable_fallback_codes: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SiteConfig {
    pub catalog_url: String,
    /// Query key used to rebuild a collection page URL.
    pub store_part_param: String,
    pub sku_prefix: String,
    pub all_collection_label: String,
    pub unavailable_label: String,
    pub disabled_class: String,
    pub selectors: Selectors,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            catalog_url: "https://pinkypunk.ru/catalog".into(),
            store_part_param: "tfc_storepartuid[757983339]".into(),
            sku_prefix: "Артикул:".into(),
            all_collection_label: "Все".into(),
            unavailable_label: "Нет в наличии".into(),
            disabled_class: "t-store__prod-popup__btn_disabled".into(),
            selectors: Selectors::default(),
        }
    }
}

/// CSS selectors and attribute names read from the storefront markup.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Selectors {
    pub collection_switch: String,
    pub collection_switch_all: String,
    pub collection_uid_attr: String,
    pub collection_link_attr: String,
    pub card: String,
    pub buy_button: String,
    pub name: String,
    pub sku: String,
    pub link: String,
    pub price: String,
    pub price_attr: String,
    pub image: String,
    pub image_lazy_attr: String,
    pub second_image: String,
    pub description: String,
    pub collection_attr: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            collection_switch: ".js-store-parts-switcher".into(),
            collection_switch_all: ".t-store__parts-switch-btn-all".into(),
            collection_uid_attr: "data-storepart-uid".into(),
            collection_link_attr: "data-storepart-link".into(),
            card: ".js-product.t-store__card".into(),
            buy_button: ".js-store-prod-btn2".into(),
            name: ".js-store-prod-name".into(),
            sku: ".js-store-prod-sku".into(),
            link: "a[href]".into(),
            price: ".js-product-price".into(),
            price_attr: "data-product-price-def".into(),
            image: ".js-product-img".into(),
            image_lazy_attr: "data-original".into(),
            second_image: ".t-store__card__bgimg_second".into(),
            description: ".js-store-prod-descr".into(),
            collection_attr: "data-product-part-uid".into(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BrowserConfig {
    pub user_agent: String,
    pub headless: bool,
    pub navigation_timeout_ms: u64,
    pub settle_ms: u64,
    pub selector_timeout_ms: u64,
    pub scroll_pause_ms: u64,
    pub max_scrolls: usize,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .into(),
            headless: true,
            navigation_timeout_ms: 60_000,
            settle_ms: 5_000,
            selector_timeout_ms: 5_000,
            scroll_pause_ms: 2_000,
            max_scrolls: 15,
        }
    }
}

impl BrowserConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn selector_timeout(&self) -> Duration {
        Duration::from_millis(self.selector_timeout_ms)
    }

    pub fn scroll_pause(&self) -> Duration {
        Duration::from_millis(self.scroll_pause_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ImagesConfig {
    pub enabled: bool,
    pub store_root: String,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub extension: String,
    pub timeout_ms: u64,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            store_root: "https://raw.githubusercontent.com".into(),
            owner: "rmzparazit".into(),
            repo: "pink".into(),
            branch: "main".into(),
            extension: "png".into(),
            timeout_ms: 3_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub progress_file: String,
    pub feed_file: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output_pinkypunk"),
            progress_file: "progress.json".into(),
            feed_file: "pinkypunk_catalog.xml".into(),
        }
    }
}

impl OutputConfig {
    pub fn progress_path(&self) -> PathBuf {
        self.dir.join(&self.progress_file)
    }

    pub fn feed_path(&self) -> PathBuf {
        self.dir.join(&self.feed_file)
    }
}

/// Fixed shop metadata written into every feed.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FeedConfig {
    pub shop_name: String,
    pub company: String,
    pub shop_url: String,
    pub platform: String,
    pub version: String,
    pub vendor: String,
    pub currency: String,
    pub category_id: String,
    pub category_name: String,
    pub sales_notes: String,
    pub placeholder_collection_prefix: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            shop_name: "Секспедиция".into(),
            company: "Секспедиция".into(),
            shop_url: "https://pinkypunk.ru".into(),
            platform: "Tilda".into(),
            version: "1.0".into(),
            vendor: "Секспедиция".into(),
            currency: "RUB".into(),
            category_id: "1".into(),
            category_name: "Секс-игрушки".into(),
            sales_notes: "Официальный сайт Секспедиция.".into(),
            placeholder_collection_prefix: "Коллекция".into(),
        }
    }
}

impl Config {
    /// Load from a TOML file, or fall back to built-in defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?;
                toml::from_str(&content).with_context(|| "Failed to parse config file")?
            }
            None => Config::default(),
        };
        Self::validate(&config)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.site.catalog_url.trim().is_empty() {
            anyhow::bail!("site.catalog_url must not be empty");
        }
        if self.browser.max_scrolls == 0 {
            anyhow::bail!("browser.max_scrolls must be >= 1");
        }
        if self.output.feed_file.trim().is_empty() {
            anyhow::bail!("output.feed_file must not be empty");
        }
        if self.output.progress_file.trim().is_empty() {
            anyhow::bail!("output.progress_file must not be empty");
        }
        Ok(())
    }
}
