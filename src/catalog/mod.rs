
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::store::VectorStore;

/// Query-string marker appended to thumbnail-resolution image URLs by the
/// retailer's CDN. Stripped so stored and embedded URLs are full resolution.
const LOW_RES_SUFFIX: &str = "?f=xxs";

/// One scraped product record. Every field is optional; the scraper does not
/// guarantee any of them. Records are read-only inside the pipelines.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub product_id: Option<String>,
    pub product_number: Option<String>,
    pub product_name: Option<String>,
    pub category_name: Option<String>,
    pub subcategory_name: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub url: Option<String>,
    pub main_image_url: Option<String>,
    pub main_image_alt: Option<String>,
    pub rating_info: Option<RatingInfo>,
    #[serde(default)]
    pub quick_facts: Vec<String>,
    #[serde(default)]
    pub variants: Vec<Variant>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RatingInfo {
    pub rating: Option<f64>,
    pub review_count: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub url: Option<String>,
    pub image_url: Option<String>,
    pub selected: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    results: Vec<CategoryGroup>,
}

#[derive(Debug, Deserialize)]
struct CategoryGroup {
    category_name: Option<String>,
    subcategory_name: Option<String>,
    #[serde(default)]
    products: Vec<Product>,
}

impl Product {
    /// Canonical text representation used as embedding input.
    ///
    /// Deterministic over the present fields; absent or empty fields are
    /// skipped rather than rendered as placeholders. A product contributing
    /// nothing yields an empty string, which the ingestion pipeline treats as
    /// a skip.
    #[inline]
    pub fn embedding_text(&self) -> String {
        let mut parts: Vec<String> = Vec::new();

        if let Some(name) = present(&self.product_name) {
            parts.push(format!("Product: {name}"));
        }
        if let Some(category) = present(&self.category_name) {
            parts.push(format!("Category: {category}"));
        }
        if let Some(subcategory) = present(&self.subcategory_name) {
            parts.push(format!("Subcategory: {subcategory}"));
        }
        if let Some(description) = present(&self.description) {
            parts.push(format!("Description: {description}"));
        }
        if let Some(price) = self.price.filter(|p| *p > 0.0) {
            match present(&self.currency) {
                Some(currency) => parts.push(format!("Price: {price} {currency}")),
                None => parts.push(format!("Price: {price}")),
            }
        }
        if let Some(rating_info) = &self.rating_info {
            if let Some(rating) = rating_info.rating.filter(|r| *r > 0.0) {
                parts.push(format!("Rating: {rating}/5"));
            }
            if let Some(review_count) = rating_info.review_count.filter(|c| *c > 0) {
                parts.push(format!("Reviews: {review_count}"));
            }
        }

        let facts: Vec<&str> = self
            .quick_facts
            .iter()
            .map(|f| f.trim())
            .filter(|f| !f.is_empty())
            .collect();
        if !facts.is_empty() {
            parts.push(format!("Features: {}", facts.join(", ")));
        }

        parts.join(" ")
    }

    /// Full-resolution main image URL, if the product has a usable http(s) one.
    #[inline]
    pub fn usable_image_url(&self) -> Option<String> {
        let url = present(&self.main_image_url)?;
        if url.starts_with("http://") || url.starts_with("https://") {
            Some(clean_image_url(url))
        } else {
            None
        }
    }
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Strip the low-resolution query suffix from an image URL. Idempotent:
/// applying it twice yields the same result as applying it once.
#[inline]
pub fn clean_image_url(url: &str) -> String {
    url.strip_suffix(LOW_RES_SUFFIX).unwrap_or(url).to_string()
}

/// Load products from a scraped catalog file: a nested document with a
/// `results` list of category groups, each holding a `products` list. The
/// group's category and subcategory names are copied onto each product.
#[inline]
pub fn load_products<P: AsRef<Path>>(path: P) -> Result<Vec<Product>> {
    let path = path.as_ref();
    info!("Loading products from {}", path.display());

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read catalog file: {}", path.display()))?;
    let catalog: CatalogFile = serde_json::from_str(&content)
        .with_context(|| format!("Invalid JSON in catalog file: {}", path.display()))?;

    if catalog.results.is_empty() {
        warn!("No category groups found in {}", path.display());
    }

    let mut products = Vec::new();
    for group in catalog.results {
        for mut product in group.products {
            product.category_name = group.category_name.clone();
            product.subcategory_name = group.subcategory_name.clone();
            products.push(product);
        }
    }

    info!("Loaded {} products", products.len());
    Ok(products)
}

/// Re-derive products from an existing collection by scrolling its payloads.
#[inline]
pub fn load_from_collection<S: VectorStore + ?Sized>(
    store: &S,
    collection: &str,
) -> Result<Vec<Product>> {
    info!("Loading products from collection: {collection}");

    let payloads = store.all_payloads(collection)?;

    let mut products = Vec::with_capacity(payloads.len());
    for payload in payloads {
        match serde_json::from_value::<Product>(serde_json::Value::Object(payload)) {
            Ok(product) => products.push(product),
            Err(e) => warn!("Skipping malformed payload in {collection}: {e}"),
        }
    }

    info!("Loaded {} products from {collection}", products.len());
    Ok(products)
}

/// Keep only products carrying a usable http(s) main image URL.
#[inline]
pub fn with_usable_images(products: Vec<Product>) -> Vec<Product> {
    let total = products.len();
    let filtered: Vec<Product> = products
        .into_iter()
        .filter(|p| p.usable_image_url().is_some())
        .collect();

    info!(
        "Filtered to {} of {} products with usable images",
        filtered.len(),
        total
    );
    filtered
}
