use serde::{Deserialize, Serialize};

/// One sellable item as observed on the storefront.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    #[serde(rename = "vendorCode", default)]
    pub vendor_code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub link: String,
    #[serde(default = "default_price")]
    pub price: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub additional_images: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "crate::ident::deserialize")]
    pub collection_id: String,
}

fn default_price() -> String {
    "0".to_string()
}

impl Product {
    /// A product missing any of its key fields is never persisted or emitted.
    pub fn is_valid(&self) -> bool {
        !self.vendor_code.trim().is_empty()
            && !self.name.trim().is_empty()
            && !self.link.trim().is_empty()
    }

    /// Price as written to the feed: blank prices become "0".
    pub fn feed_price(&self) -> &str {
        let p = self.price.trim();
        if p.is_empty() {
            "0"
        } else {
            p
        }
    }
}

/// A named product grouping discovered on the catalog page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    pub id: String,
    pub name: String,
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_record_normalizes_collection_id() {
        let json = r#"{
            "vendorCode": "A1",
            "name": "Toy",
            "link": "https://x/a1",
            "price": "10",
            "image": "",
            "additional_images": [],
            "description": "",
            "collection_id": 4.35183164492E11
        }"#;
        let p: Product = serde_json::from_str(json).unwrap();
        assert_eq!(p.collection_id, "435183164492");
        assert!(p.is_valid());
    }

    #[test]
    fn missing_fields_default() {
        let p: Product = serde_json::from_str(r#"{"vendorCode": "A1"}"#).unwrap();
        assert_eq!(p.price, "0");
        assert!(p.additional_images.is_empty());
        assert!(!p.is_valid());
    }

    #[test]
    fn blank_price_emits_zero() {
        let p = Product {
            vendor_code: "P1".into(),
            name: "Toy A".into(),
            link: "https://x/p1".into(),
            price: "".into(),
            image: "i1".into(),
            additional_images: vec![],
            description: String::new(),
            collection_id: String::new(),
        };
        assert_eq!(p.feed_price(), "0");
    }

    #[test]
    fn serializes_vendor_code_in_camel_case() {
        let p: Product = serde_json::from_str(r#"{"vendorCode": "A1", "collection_id": null}"#).unwrap();
        let out = serde_json::to_string(&p).unwrap();
        assert!(out.contains("\"vendorCode\":\"A1\""));
        assert!(out.contains("\"collection_id\":\"\""));
    }
}
