use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use chrono::NaiveDateTime;
use indicatif::{ProgressBar, ProgressStyle};
use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use tracing::info;

use crate::config::FeedConfig;
use crate::fsutil;
use crate::ident;
use crate::images::{ImageLookup, Memo};
use crate::model::{Collection, Product};

/// A rendered feed plus what went into it.
pub struct Feed {
    pub xml: String,
    pub offers: usize,
    pub collections: usize,
    pub overrides: usize,
}

/// Builds the marketplace XML from the registry and the discovered collections.
pub struct Synthesizer<'a> {
    pub config: &'a FeedConfig,
    /// URL given to collections that were never seen on the page.
    pub catalog_url: &'a str,
    pub images: &'a dyn ImageLookup,
}

impl Synthesizer<'_> {
    pub async fn build(
        &self,
        products: &[Product],
        discovered: &[Collection],
        generated_at: NaiveDateTime,
    ) -> Result<Feed> {
        let cfg = self.config;
        let products: Vec<&Product> = products.iter().filter(|p| p.is_valid()).collect();

        // Collections referenced by products, each with the first product seen in it.
        let mut representative: BTreeMap<&str, &Product> = BTreeMap::new();
        for p in &products {
            if ident::is_numeric(&p.collection_id) {
                representative.entry(p.collection_id.as_str()).or_insert(*p);
            }
        }
        let collections = self.final_collections(&representative, discovered);

        let mut memo = Memo::new(self.images);
        let mut w = Writer::new_with_indent(Vec::new(), b' ', 2);

        w.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        let date = generated_at.format("%Y-%m-%d %H:%M").to_string();
        w.write_event(Event::Start(
            BytesStart::new("yml_catalog").with_attributes([("date", date.as_str())]),
        ))?;
        start(&mut w, "shop")?;
        text_element(&mut w, "name", &cfg.shop_name)?;
        text_element(&mut w, "company", &cfg.company)?;
        text_element(&mut w, "url", &cfg.shop_url)?;
        text_element(&mut w, "platform", &cfg.platform)?;
        text_element(&mut w, "version", &cfg.version)?;

        start(&mut w, "currencies")?;
        w.write_event(Event::Empty(
            BytesStart::new("currency").with_attributes([("id", cfg.currency.as_str()), ("rate", "1")]),
        ))?;
        end(&mut w, "currencies")?;

        start(&mut w, "categories")?;
        w.write_event(Event::Start(
            BytesStart::new("category").with_attributes([("id", cfg.category_id.as_str())]),
        ))?;
        w.write_event(Event::Text(BytesText::from_escaped(partial_escape(&cfg.category_name))))?;
        end(&mut w, "category")?;
        end(&mut w, "categories")?;

        let pb = ProgressBar::new(products.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} offers ({per_sec})")?
                .progress_chars("=> "),
        );

        start(&mut w, "offers")?;
        for p in &products {
            let picture = memo.resolve(&p.vendor_code).await.unwrap_or_else(|| p.image.clone());
            self.write_offer(&mut w, p, &picture)?;
            pb.inc(1);
        }
        end(&mut w, "offers")?;
        pb.finish_and_clear();

        if !collections.is_empty() {
            start(&mut w, "collections")?;
            for c in collections.values() {
                let picture = match representative.get(c.id.as_str()) {
                    Some(p) => memo.resolve(&p.vendor_code).await.unwrap_or_else(|| p.image.clone()),
                    None => String::new(),
                };
                write_collection(&mut w, c, &picture)?;
            }
            end(&mut w, "collections")?;
        }

        end(&mut w, "shop")?;
        end(&mut w, "yml_catalog")?;

        let xml = String::from_utf8(w.into_inner())?;
        info!(
            "Feed built: {} offers, {} collections, {} override images",
            products.len(),
            collections.len(),
            memo.found
        );
        Ok(Feed {
            xml,
            offers: products.len(),
            collections: collections.len(),
            overrides: memo.found,
        })
    }

    /// Discovered collections that products actually use, plus a placeholder
    /// for every referenced id that was not discovered, keyed and sorted by id.
    fn final_collections(
        &self,
        referenced: &BTreeMap<&str, &Product>,
        discovered: &[Collection],
    ) -> BTreeMap<String, Collection> {
        let mut out: BTreeMap<String, Collection> = BTreeMap::new();
        for c in discovered {
            if referenced.contains_key(c.id.as_str()) && !out.contains_key(&c.id) {
                out.insert(c.id.clone(), c.clone());
            }
        }
        for id in referenced.keys() {
            if !out.contains_key(*id) {
                out.insert(
                    id.to_string(),
                    Collection {
                        id: id.to_string(),
                        name: format!("{} {}", self.config.placeholder_collection_prefix, id),
                        url: self.catalog_url.to_string(),
                    },
                );
            }
        }
        out
    }

    fn write_offer(&self, w: &mut Writer<Vec<u8>>, p: &Product, picture: &str) -> Result<()> {
        let cfg = self.config;
        w.write_event(Event::Start(BytesStart::new("offer").with_attributes([
            ("id", p.vendor_code.as_str()),
            ("available", "true"),
        ])))?;
        text_element(w, "name", &p.name)?;
        text_element(w, "vendor", &cfg.vendor)?;
        text_element(w, "vendorCode", &p.vendor_code)?;
        text_element(w, "price", p.feed_price())?;
        text_element(w, "currencyId", &cfg.currency)?;
        text_element(w, "categoryId", &cfg.category_id)?;
        if !picture.is_empty() {
            text_element(w, "picture", picture)?;
        }
        if ident::is_numeric(&p.collection_id) {
            text_element(w, "collectionId", &p.collection_id)?;
        }
        cdata_element(w, "url", &p.link)?;
        if !p.description.is_empty() {
            cdata_element(w, "description", &p.description)?;
        }
        text_element(w, "sales_notes", &cfg.sales_notes)?;
        text_element(w, "custom_label_0", &p.name)?;
        end(w, "offer")
    }
}

fn write_collection(w: &mut Writer<Vec<u8>>, c: &Collection, picture: &str) -> Result<()> {
    w.write_event(Event::Start(
        BytesStart::new("collection").with_attributes([("id", c.id.as_str())]),
    ))?;
    text_element(w, "name", &c.name)?;
    cdata_element(w, "url", &c.url)?;
    if !picture.is_empty() {
        text_element(w, "picture", picture)?;
    }
    end(w, "collection")
}

fn start(w: &mut Writer<Vec<u8>>, name: &str) -> Result<()> {
    w.write_event(Event::Start(BytesStart::new(name)))?;
    Ok(())
}

fn end(w: &mut Writer<Vec<u8>>, name: &str) -> Result<()> {
    w.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// `<name>text</name>` with `&`, `<` and `>` escaped. Quotes stay as they are.
fn text_element(w: &mut Writer<Vec<u8>>, name: &str, text: &str) -> Result<()> {
    start(w, name)?;
    w.write_event(Event::Text(BytesText::from_escaped(partial_escape(text))))?;
    end(w, name)
}

/// `<name><![CDATA[text]]></name>`, unescaped. A `]]>` inside the text is
/// split across two sections.
fn cdata_element(w: &mut Writer<Vec<u8>>, name: &str, text: &str) -> Result<()> {
    start(w, name)?;
    let mut raw = String::with_capacity(text.len() + 12);
    let mut rest = text;
    while let Some(pos) = rest.find("]]>") {
        raw.push_str("<![CDATA[");
        raw.push_str(&rest[..pos + 2]);
        raw.push_str("]]>");
        rest = &rest[pos + 2..];
    }
    raw.push_str("<![CDATA[");
    raw.push_str(rest);
    raw.push_str("]]>");
    // Written as pre-escaped text so the writer keeps it inline with the tags.
    w.write_event(Event::Text(BytesText::from_escaped(raw)))?;
    end(w, name)
}

/// Publish the feed over `path`, keeping the previous version as `.backup`.
pub fn publish(path: &Path, xml: &str) -> Result<()> {
    fsutil::replace_atomically(path, xml.as_bytes(), true)?;
    info!("Feed written: {}", path.display());
    Ok(())
}
