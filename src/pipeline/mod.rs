//! Ingestion and query pipelines.
//!
//! Ingestion normalizes each product, embeds it, and buffers points into
//! fixed-size batches before writing them to the store. Per-item failures are
//! counted and skipped; a failed batch write drops that batch and the run
//! continues. Queries embed once and return ranked results, never failing the
//! caller over an embedding error.

#[cfg(test)]
mod tests;

use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{Map, Value};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::catalog::Product;
use crate::config::Config;
use crate::embeddings::{Embedder, EmbeddingInput};
use crate::store::{Point, ScoredPoint, VectorStore};
use crate::{Result, SearchError};

/// Payload key holding the canonical embedded text.
const TEXT_PAYLOAD_KEY: &str = "text";
/// Payload key holding the image URL an image point was embedded from.
const IMAGE_PAYLOAD_KEY: &str = "clip_image_url";

/// Counters for one ingestion run. `processed` are points durably written;
/// `failed` covers skipped products, embedding errors, and dropped batches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub processed: usize,
    pub failed: usize,
}

/// A ranked search hit with the payload fields the CLI displays.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub product_id: Option<String>,
    pub product_name: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub image_url: Option<String>,
    pub similarity_score: f32,
}

/// Pipelines over one vector store. Embedders are passed per call so the text
/// and image pipelines can share a single engine.
pub struct SearchEngine<'a, S: VectorStore + ?Sized> {
    store: &'a S,
    batch_size: usize,
    batch_delay: Duration,
    limit: usize,
    score_threshold: f32,
}

impl<'a, S: VectorStore + ?Sized> SearchEngine<'a, S> {
    #[inline]
    pub fn new(store: &'a S, config: &Config) -> Self {
        Self {
            store,
            batch_size: config.processing.batch_size,
            batch_delay: Duration::from_millis(config.processing.batch_delay_ms),
            limit: config.search.limit,
            score_threshold: config.search.score_threshold,
        }
    }

    #[inline]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Embed every product's canonical text and upsert the points.
    ///
    /// Products whose text representation is empty are counted as failed
    /// without calling the embedder.
    #[inline]
    pub fn build_text_embeddings(
        &self,
        embedder: &dyn Embedder,
        collection: &str,
        products: &[Product],
    ) -> Result<IngestStats> {
        info!(
            "Building text embeddings for {} products into {collection}",
            products.len()
        );

        self.ingest(collection, products, "Embedding text", |product| {
            let text = product.embedding_text();
            if text.is_empty() {
                return Err(SearchError::Embedding(
                    "Product has no embeddable fields".to_string(),
                ));
            }

            let vector = embedder.embed(&EmbeddingInput::text(text.clone()))?;
            let mut payload = product_payload(product)?;
            payload.insert(TEXT_PAYLOAD_KEY.to_string(), Value::String(text));
            Ok((vector, payload))
        })
    }

    /// Embed every product's main image and upsert the points.
    ///
    /// Products without a usable http(s) image URL are counted as failed
    /// without calling the embedder.
    #[inline]
    pub fn build_image_embeddings(
        &self,
        embedder: &dyn Embedder,
        collection: &str,
        products: &[Product],
    ) -> Result<IngestStats> {
        info!(
            "Building image embeddings for {} products into {collection}",
            products.len()
        );

        self.ingest(collection, products, "Embedding images", |product| {
            let image_url = product.usable_image_url().ok_or_else(|| {
                SearchError::Embedding("Product has no usable image URL".to_string())
            })?;
            let url = Url::parse(&image_url).map_err(|e| {
                SearchError::Embedding(format!("Invalid image URL {image_url}: {e}"))
            })?;

            let vector = embedder.embed(&EmbeddingInput::ImageUrl(url))?;
            let mut payload = product_payload(product)?;
            payload.insert(IMAGE_PAYLOAD_KEY.to_string(), Value::String(image_url));
            Ok((vector, payload))
        })
    }

    fn ingest<F>(
        &self,
        collection: &str,
        products: &[Product],
        progress_message: &str,
        mut embed_product: F,
    ) -> Result<IngestStats>
    where
        F: FnMut(&Product) -> Result<(Vec<f32>, Map<String, Value>)>,
    {
        let bar = if console::user_attended_stderr() {
            ProgressBar::new(products.len() as u64).with_style(
                ProgressStyle::with_template("{bar:40} [{pos}/{len}] {msg}")
                    .expect("style template is valid"),
            )
        } else {
            ProgressBar::hidden()
        };
        bar.set_message(progress_message.to_string());

        let mut stats = IngestStats::default();
        let mut batch: Vec<Point> = Vec::with_capacity(self.batch_size);

        for product in products {
            match embed_product(product) {
                Ok((vector, payload)) => {
                    batch.push(Point {
                        id: point_id(collection, product),
                        vector,
                        payload,
                    });
                }
                Err(e) => {
                    warn!("Skipping product {:?}: {e}", product.product_id);
                    stats.failed += 1;
                }
            }
            bar.inc(1);

            if batch.len() >= self.batch_size {
                self.flush(collection, &mut batch, &mut stats);
            }
        }
        if !batch.is_empty() {
            self.flush(collection, &mut batch, &mut stats);
        }

        bar.finish_and_clear();
        info!(
            "Ingestion into {collection} complete: {} processed, {} failed",
            stats.processed, stats.failed
        );
        Ok(stats)
    }

    /// Write one buffered batch. A failed write drops the whole batch into
    /// the failed count; later batches still run.
    fn flush(&self, collection: &str, batch: &mut Vec<Point>, stats: &mut IngestStats) {
        match self.store.upsert_points(collection, batch) {
            Ok(()) => {
                debug!("Flushed batch of {} points to {collection}", batch.len());
                stats.processed += batch.len();
            }
            Err(e) => {
                warn!("Dropping batch of {} points for {collection}: {e}", batch.len());
                stats.failed += batch.len();
            }
        }
        batch.clear();

        if !self.batch_delay.is_zero() {
            thread::sleep(self.batch_delay);
        }
    }

    /// Search a text collection with a natural-language query.
    #[inline]
    pub fn search_by_text(
        &self,
        embedder: &dyn Embedder,
        collection: &str,
        query: &str,
        limit: Option<usize>,
        score_threshold: Option<f32>,
    ) -> Result<Vec<SearchResult>> {
        self.search(
            embedder,
            collection,
            &EmbeddingInput::text(query),
            limit,
            score_threshold,
        )
    }

    /// Search an image collection with a query image, given by URL, through
    /// the multimodal model's image tower. An unparseable URL yields empty
    /// results, same as an embedding failure.
    #[inline]
    pub fn search_by_image(
        &self,
        embedder: &dyn Embedder,
        collection: &str,
        image_url: &str,
        limit: Option<usize>,
        score_threshold: Option<f32>,
    ) -> Result<Vec<SearchResult>> {
        let url = match Url::parse(image_url) {
            Ok(url) => url,
            Err(e) => {
                warn!("Invalid query image URL {image_url}: {e}");
                return Ok(Vec::new());
            }
        };

        self.search(
            embedder,
            collection,
            &EmbeddingInput::ImageUrl(url),
            limit,
            score_threshold,
        )
    }

    fn search(
        &self,
        embedder: &dyn Embedder,
        collection: &str,
        input: &EmbeddingInput,
        limit: Option<usize>,
        score_threshold: Option<f32>,
    ) -> Result<Vec<SearchResult>> {
        let vector = match embedder.embed(input) {
            Ok(vector) => vector,
            Err(e) => {
                warn!("Failed to embed query: {e}");
                return Ok(Vec::new());
            }
        };

        let hits = self.store.search(
            collection,
            &vector,
            limit.unwrap_or(self.limit),
            Some(score_threshold.unwrap_or(self.score_threshold)),
            None,
        )?;

        debug!("Search in {collection} returned {} results", hits.len());
        Ok(hits.into_iter().filter_map(to_search_result).collect())
    }
}

/// Deterministic point id: the same product written to the same collection
/// always lands on the same point, so re-ingestion updates instead of
/// duplicating. Products without an id get a random one.
fn point_id(collection: &str, product: &Product) -> Uuid {
    match &product.product_id {
        Some(product_id) => {
            let key = format!("{collection}/{product_id}");
            Uuid::new_v5(&Uuid::NAMESPACE_URL, key.as_bytes())
        }
        None => Uuid::new_v4(),
    }
}

fn product_payload(product: &Product) -> Result<Map<String, Value>> {
    match serde_json::to_value(product) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(SearchError::Catalog(
            "Product did not serialize to an object".to_string(),
        )),
        Err(e) => Err(SearchError::Catalog(format!(
            "Failed to serialize product: {e}"
        ))),
    }
}

fn to_search_result(hit: ScoredPoint) -> Option<SearchResult> {
    let payload = hit.payload?;

    let string_field = |key: &str| {
        payload
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    Some(SearchResult {
        product_id: string_field("product_id"),
        product_name: string_field("product_name"),
        category: string_field("category_name"),
        description: string_field("description"),
        price: payload.get("price").and_then(Value::as_f64),
        currency: string_field("currency"),
        image_url: string_field(IMAGE_PAYLOAD_KEY).or_else(|| string_field("main_image_url")),
        similarity_score: hit.score,
    })
}
