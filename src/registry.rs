use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::fsutil;
use crate::ident;
use crate::model::Product;

/// On-disk shape of the progress file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ProgressFile {
    #[serde(default)]
    products: Vec<Product>,
}

/// Durable set of every product seen so far, keyed by vendor code.
pub struct Registry {
    path: PathBuf,
}

impl Registry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read persisted products. A missing or unreadable file yields an empty
    /// registry; the run carries on as a fresh start.
    pub fn load(&self) -> Vec<Product> {
        if !self.path.exists() {
            info!("No progress file at {}, starting fresh", self.path.display());
            return Vec::new();
        }
        match self.read() {
            Ok(products) => {
                info!("Loaded {} products from {}", products.len(), self.path.display());
                products
            }
            Err(e) => {
                warn!("Ignoring unreadable progress file: {:#}", e);
                Vec::new()
            }
        }
    }

    fn read(&self) -> Result<Vec<Product>> {
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        let file: ProgressFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", self.path.display()))?;
        Ok(file
            .products
            .into_iter()
            .map(|mut p| {
                p.collection_id = ident::normalize(&p.collection_id);
                p
            })
            .collect())
    }

    /// Write the products back, dropping invalid records and repeated vendor
    /// codes (first one wins). Returns how many were written.
    pub fn save(&self, products: &[Product]) -> Result<usize> {
        let unique = dedup(products);
        let file = ProgressFile { products: unique };
        let json = serde_json::to_string_pretty(&file)?;
        fsutil::replace_atomically(&self.path, json.as_bytes(), false)?;
        info!("Progress saved: {} products", file.products.len());
        Ok(file.products.len())
    }
}

fn dedup(products: &[Product]) -> Vec<Product> {
    let mut seen = HashSet::new();
    products
        .iter()
        .filter(|p| p.is_valid() && seen.insert(p.vendor_code.clone()))
        .map(|p| Product {
            collection_id: ident::normalize(&p.collection_id),
            ..p.clone()
        })
        .collect()
}

/// Overlay `incoming` on `existing` by vendor code. Replaced products keep
/// their original position; new ones are appended in arrival order.
pub fn merge(existing: Vec<Product>, incoming: Vec<Product>) -> Vec<Product> {
    let mut merged: Vec<Product> = Vec::with_capacity(existing.len() + incoming.len());
    let mut index: HashMap<String, usize> = HashMap::new();

    for p in existing.into_iter().chain(incoming) {
        match index.get(&p.vendor_code) {
            Some(&i) => merged[i] = p,
            None => {
                index.insert(p.vendor_code.clone(), merged.len());
                merged.push(p);
            }
        }
    }
    merged
}

/// Counts shown by the `stats` command.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Stats {
    pub products: usize,
    pub with_collection: usize,
    pub with_description: usize,
    pub zero_price: usize,
    pub collections: usize,
}

pub fn stats(products: &[Product]) -> Stats {
    let collections: HashSet<&str> = products
        .iter()
        .map(|p| p.collection_id.as_str())
        .filter(|c| ident::is_numeric(c))
        .collect();
    Stats {
        products: products.len(),
        with_collection: products.iter().filter(|p| ident::is_numeric(&p.collection_id)).count(),
        with_description: products.iter().filter(|p| !p.description.is_empty()).count(),
        zero_price: products.iter().filter(|p| p.feed_price() == "0").count(),
        collections: collections.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(code: &str, price: &str) -> Product {
        Product {
            vendor_code: code.into(),
            name: format!("Toy {}", code),
            link: format!("https://x/{}", code),
            price: price.into(),
            image: String::new(),
            additional_images: vec![],
            description: String::new(),
            collection_id: String::new(),
        }
    }

    #[test]
    fn merge_overwrites_by_key() {
        let merged = merge(vec![product("A1", "10")], vec![product("A1", "20")]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].price, "20");
    }

    #[test]
    fn merge_accumulates() {
        let merged = merge(vec![product("A1", "10")], vec![product("B2", "5")]);
        let codes: Vec<&str> = merged.iter().map(|p| p.vendor_code.as_str()).collect();
        assert_eq!(codes, vec!["A1", "B2"]);
    }

    #[test]
    fn merge_keeps_position_of_replaced() {
        let merged = merge(
            vec![product("A1", "1"), product("B2", "2")],
            vec![product("C3", "3"), product("A1", "9")],
        );
        let codes: Vec<&str> = merged.iter().map(|p| p.vendor_code.as_str()).collect();
        assert_eq!(codes, vec!["A1", "B2", "C3"]);
        assert_eq!(merged[0].price, "9");
    }

    #[test]
    fn save_dedups_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        let reg = Registry::new(dir.path().join("progress.json"));
        let mut nameless = product("C3", "1");
        nameless.name.clear();
        let mut linkless = product("D4", "1");
        linkless.link.clear();
        let written = reg
            .save(&[
                product("A1", "10"),
                product("A1", "99"),
                product("", "1"),
                nameless,
                linkless,
                product("B2", "5"),
            ])
            .unwrap();
        assert_eq!(written, 2);

        let loaded = reg.load();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].vendor_code, "A1");
        assert_eq!(loaded[0].price, "10");
        assert_eq!(loaded[1].vendor_code, "B2");
    }

    #[test]
    fn load_missing_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Registry::new(dir.path().join("none.json")).load().is_empty());
    }

    #[test]
    fn load_corrupt_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(Registry::new(&path).load().is_empty());
    }

    #[test]
    fn load_normalizes_legacy_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        std::fs::write(
            &path,
            r#"{"products": [
                {"vendorCode": "A1", "name": "a", "link": "l", "price": "1", "collection_id": "4.35183164492E11"},
                {"vendorCode": "B2", "name": "b", "link": "l", "price": "1", "collection_id": 12.0}
            ]}"#,
        )
        .unwrap();
        let loaded = Registry::new(&path).load();
        assert_eq!(loaded[0].collection_id, "435183164492");
        assert_eq!(loaded[1].collection_id, "12");
    }

    #[test]
    fn save_preserves_non_ascii() {
        let dir = tempfile::tempdir().unwrap();
        let reg = Registry::new(dir.path().join("progress.json"));
        let mut p = product("A1", "10");
        p.name = "Игрушка".into();
        reg.save(&[p]).unwrap();
        let raw = std::fs::read_to_string(reg.path()).unwrap();
        assert!(raw.contains("Игрушка"));
        assert!(raw.contains("\"vendorCode\": \"A1\""));
    }

    #[test]
    fn stats_counts() {
        let mut a = product("A1", "0");
        a.collection_id = "9".into();
        a.description = "d".into();
        let mut b = product("B2", "10");
        b.collection_id = "9".into();
        let s = stats(&[a, b, product("C3", "")]);
        assert_eq!(
            s,
            Stats {
                products: 3,
                with_collection: 2,
                with_description: 1,
                zero_price: 2,
                collections: 1,
            }
        );
    }
}
