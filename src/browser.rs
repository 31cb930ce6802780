use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromeConfig};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::BrowserConfig;

const SELECTOR_POLL: Duration = Duration::from_millis(250);

/// The slice of a browser tab the extractor relies on.
#[async_trait]
pub trait Page: Send + Sync {
    type Element: Element;

    async fn goto(&self, url: &str, timeout: Duration) -> Result<()>;

    /// Fixed pause to let client-side rendering catch up.
    async fn settle(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }

    /// Wait until at least one element matches, or fail after `timeout`.
    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<()>;

    async fn scroll_height(&self) -> Result<f64>;

    async fn scroll_to_bottom(&self) -> Result<()>;

    async fn query_all(&self, selector: &str) -> Result<Vec<Self::Element>>;
}

/// A DOM element handle.
#[async_trait]
pub trait Element: Send + Sync + Sized {
    async fn text(&self) -> Result<Option<String>>;

    async fn attr(&self, name: &str) -> Result<Option<String>>;

    async fn query(&self, selector: &str) -> Result<Option<Self>>;
}

/// A headless Chromium instance plus the task pumping its CDP events.
pub struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
    page: ChromePage,
}

impl BrowserSession {
    pub async fn launch(config: &BrowserConfig) -> Result<Self> {
        let mut builder = ChromeConfig::builder().arg(format!("--user-agent={}", config.user_agent));
        if !config.headless {
            builder = builder.with_head();
        }
        let chrome_config = builder.build().map_err(anyhow::Error::msg)?;

        let (browser, mut events) = Browser::launch(chrome_config)
            .await
            .context("Failed to launch browser")?;
        let handler = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("Failed to open browser tab")?;
        info!("Browser launched");

        Ok(Self {
            browser,
            handler,
            page: ChromePage { page },
        })
    }

    pub fn page(&self) -> &ChromePage {
        &self.page
    }

    /// Close the browser and stop the event task. Never fails; problems are logged.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("Browser close failed: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            warn!("Browser process did not exit cleanly: {}", e);
        }
        self.handler.abort();
        info!("Browser closed");
    }
}

pub struct ChromePage {
    page: chromiumoxide::Page,
}

#[async_trait]
impl Page for ChromePage {
    type Element = ChromeElement;

    async fn goto(&self, url: &str, timeout: Duration) -> Result<()> {
        tokio::time::timeout(timeout, self.page.goto(url))
            .await
            .with_context(|| format!("Navigation to {} timed out", url))?
            .with_context(|| format!("Navigation to {} failed", url))?;
        Ok(())
    }

    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<()> {
        let start = Instant::now();
        loop {
            if let Ok(found) = self.page.find_elements(selector).await {
                if !found.is_empty() {
                    return Ok(());
                }
            }
            if start.elapsed() >= timeout {
                anyhow::bail!("Timed out waiting for {}", selector);
            }
            tokio::time::sleep(SELECTOR_POLL).await;
        }
    }

    async fn scroll_height(&self) -> Result<f64> {
        let height = self
            .page
            .evaluate("document.body.scrollHeight")
            .await?
            .into_value::<f64>()?;
        Ok(height)
    }

    async fn scroll_to_bottom(&self) -> Result<()> {
        self.page
            .evaluate("window.scrollTo(0, document.body.scrollHeight);")
            .await?;
        Ok(())
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<ChromeElement>> {
        let elements = self.page.find_elements(selector).await?;
        debug!("{} matched {} elements", selector, elements.len());
        Ok(elements.into_iter().map(|el| ChromeElement { el }).collect())
    }
}

pub struct ChromeElement {
    el: chromiumoxide::Element,
}

#[async_trait]
impl Element for ChromeElement {
    async fn text(&self) -> Result<Option<String>> {
        Ok(self.el.inner_text().await?)
    }

    async fn attr(&self, name: &str) -> Result<Option<String>> {
        Ok(self.el.attribute(name).await?)
    }

    async fn query(&self, selector: &str) -> Result<Option<ChromeElement>> {
        let mut found = self.el.find_elements(selector).await?;
        if found.is_empty() {
            return Ok(None);
        }
        Ok(Some(ChromeElement { el: found.swap_remove(0) }))
    }
}

#[cfg(test)]
pub mod fake {
    //! In-memory page used by extractor and pipeline tests.

    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    #[derive(Clone, Default)]
    pub struct FakeElement {
        pub text: Option<String>,
        pub attrs: HashMap<String, String>,
        pub children: HashMap<String, FakeElement>,
        pub fail: bool,
    }

    impl FakeElement {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_text(mut self, t: &str) -> Self {
            self.text = Some(t.to_string());
            self
        }

        pub fn with_attr(mut self, k: &str, v: &str) -> Self {
            self.attrs.insert(k.to_string(), v.to_string());
            self
        }

        pub fn with_child(mut self, selector: &str, el: FakeElement) -> Self {
            self.children.insert(selector.to_string(), el);
            self
        }

        /// Every read on this element errors, as a detached node would.
        pub fn broken() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl Element for FakeElement {
        async fn text(&self) -> Result<Option<String>> {
            if self.fail {
                anyhow::bail!("node detached");
            }
            Ok(self.text.clone())
        }

        async fn attr(&self, name: &str) -> Result<Option<String>> {
            if self.fail {
                anyhow::bail!("node detached");
            }
            Ok(self.attrs.get(name).cloned())
        }

        async fn query(&self, selector: &str) -> Result<Option<FakeElement>> {
            if self.fail {
                anyhow::bail!("node detached");
            }
            Ok(self.children.get(selector).cloned())
        }
    }

    /// Page whose height grows through `heights` as it is scrolled.
    #[derive(Default)]
    pub struct FakePage {
        pub elements: HashMap<String, Vec<FakeElement>>,
        pub heights: Vec<f64>,
        pub fail_navigation: bool,
        pub visited: Mutex<Vec<String>>,
        pub scrolls: Mutex<usize>,
    }

    impl FakePage {
        pub fn with(mut self, selector: &str, els: Vec<FakeElement>) -> Self {
            self.elements.insert(selector.to_string(), els);
            self
        }
    }

    #[async_trait]
    impl Page for FakePage {
        type Element = FakeElement;

        async fn goto(&self, url: &str, _timeout: Duration) -> Result<()> {
            if self.fail_navigation {
                anyhow::bail!("net::ERR_NAME_NOT_RESOLVED");
            }
            self.visited.lock().unwrap().push(url.to_string());
            Ok(())
        }

        async fn wait_for(&self, selector: &str, _timeout: Duration) -> Result<()> {
            match self.elements.get(selector) {
                Some(els) if !els.is_empty() => Ok(()),
                _ => anyhow::bail!("Timed out waiting for {}", selector),
            }
        }

        async fn scroll_height(&self) -> Result<f64> {
            let n = *self.scrolls.lock().unwrap();
            Ok(self
                .heights
                .get(n)
                .or(self.heights.last())
                .copied()
                .unwrap_or(1000.0))
        }

        async fn scroll_to_bottom(&self) -> Result<()> {
            *self.scrolls.lock().unwrap() += 1;
            Ok(())
        }

        async fn query_all(&self, selector: &str) -> Result<Vec<FakeElement>> {
            Ok(self.elements.get(selector).cloned().unwrap_or_default())
        }
    }
}
