use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};
use url::Url;

use crate::browser::{Element, Page};
use crate::config::SiteConfig;
use crate::ident;
use crate::model::Collection;

/// Read every collection switch on the catalog page except the "all" one.
///
/// Missing controls are not an error: the catalog may simply have no
/// collections, in which case the feed synthesizes them from products.
pub async fn extract<P: Page>(page: &P, site: &SiteConfig, timeout: Duration) -> Vec<Collection> {
    let sel = &site.selectors;
    let selector = format!("{}:not({})", sel.collection_switch, sel.collection_switch_all);

    if let Err(e) = page.wait_for(&selector, timeout).await {
        warn!("No collection switches found: {}", e);
        return Vec::new();
    }
    let switches = match page.query_all(&selector).await {
        Ok(s) => s,
        Err(e) => {
            warn!("Failed to list collection switches: {}", e);
            return Vec::new();
        }
    };

    let mut collections = Vec::new();
    for switch in &switches {
        match read_switch(switch, site).await {
            Ok(Some(c)) => {
                if ident::is_numeric(&c.id) {
                    info!("Collection: {} -> ID {}", c.name, c.id);
                } else {
                    warn!("Collection '{}' has no usable ID, will recover from products", c.name);
                }
                collections.push(c);
            }
            Ok(None) => {}
            Err(e) => warn!("Skipping unreadable collection switch: {}", e),
        }
    }
    collections
}

async fn read_switch<E: Element>(switch: &E, site: &SiteConfig) -> Result<Option<Collection>> {
    let name = switch.text().await?.unwrap_or_default();
    let uid = switch
        .attr(&site.selectors.collection_uid_attr)
        .await?
        .unwrap_or_default();
    let fragment = switch
        .attr(&site.selectors.collection_link_attr)
        .await?
        .unwrap_or_default();
    Ok(build(&name, &uid, &fragment, site))
}

/// Turn the raw switch attributes into a collection, or None for the
/// "all" pseudo-collection and nameless switches.
pub fn build(name: &str, uid: &str, fragment: &str, site: &SiteConfig) -> Option<Collection> {
    let name = name.trim();
    if name.is_empty() || name == site.all_collection_label {
        return None;
    }

    // The link fragment ("/c/<digits>-<slug>") carries a more reliable id than
    // the uid attribute, which is sometimes rendered in scientific notation.
    let uid = fragment
        .split_once("/c/")
        .and_then(|(_, rest)| rest.split('-').next())
        .filter(|cand| !cand.is_empty() && cand.bytes().all(|b| b.is_ascii_digit()))
        .unwrap_or(uid);

    Some(Collection {
        id: ident::normalize(uid),
        name: name.to_string(),
        url: collection_url(&site.catalog_url, &site.store_part_param, fragment),
    })
}

/// Catalog URL filtered to one store part, or the bare catalog URL when the
/// fragment carries nothing to filter on.
fn collection_url(catalog: &str, param: &str, fragment: &str) -> String {
    if !fragment.contains("/c/") {
        return catalog.trim().to_string();
    }
    let slug = fragment.rsplit('-').next().unwrap_or_default().trim();
    match Url::parse(catalog.trim()) {
        Ok(mut url) => {
            url.query_pairs_mut()
                .append_pair(param, slug)
                .append_pair("tfc_div", ":::");
            url.to_string()
        }
        Err(_) => catalog.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::{FakeElement, FakePage};

    const SWITCHES: &str = ".js-store-parts-switcher:not(.t-store__parts-switch-btn-all)";

    fn site() -> SiteConfig {
        SiteConfig::default()
    }

    #[test]
    fn id_from_fragment_wins() {
        let c = build("Sets", "4.35183164492E11", "/tproduct/c/435183164492-sets", &site()).unwrap();
        assert_eq!(c.id, "435183164492");
        assert_eq!(c.name, "Sets");
        assert!(c.url.starts_with("https://pinkypunk.ru/catalog?"));
        assert!(c.url.contains("tfc_storepartuid%5B757983339%5D=sets"));
    }

    #[test]
    fn uid_attribute_normalized_without_fragment() {
        let c = build("Sets", "4.35183164492E11", "", &site()).unwrap();
        assert_eq!(c.id, "435183164492");
        assert_eq!(c.url, "https://pinkypunk.ru/catalog");
    }

    #[test]
    fn all_switch_excluded() {
        assert!(build("Все", "1", "", &site()).is_none());
        assert!(build("  ", "1", "", &site()).is_none());
    }

    #[test]
    fn non_numeric_fragment_keeps_uid() {
        let c = build("Misc", "77", "/c/abc-misc", &site()).unwrap();
        assert_eq!(c.id, "77");
    }

    #[tokio::test]
    async fn missing_switches_degrade_to_empty() {
        let page = FakePage::default();
        let found = extract(&page, &site(), Duration::ZERO).await;
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn reads_switches_and_skips_broken_ones() {
        let page = FakePage::default().with(
            SWITCHES,
            vec![
                FakeElement::new()
                    .with_text("Sets")
                    .with_attr("data-storepart-uid", "9"),
                FakeElement::broken(),
                FakeElement::new()
                    .with_text("Vibes")
                    .with_attr("data-storepart-link", "/c/12-vibes"),
            ],
        );
        let found = extract(&page, &site(), Duration::ZERO).await;
        let ids: Vec<&str> = found.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["9", "12"]);
    }
}
