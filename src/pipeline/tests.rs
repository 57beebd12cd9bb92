use super::*;
use crate::catalog::Product;
use crate::store::{CollectionInfo, Distance, ScoredPoint};
use std::cell::RefCell;

/// Store double recording every upsert batch. Search applies the score
/// threshold and descending order the way the real store does.
#[derive(Default)]
struct RecordingStore {
    upserted: RefCell<Vec<Vec<Point>>>,
    fail_upsert_calls: Vec<usize>,
    hits: Vec<ScoredPoint>,
    searches: RefCell<Vec<(String, usize, Option<f32>)>>,
}

impl VectorStore for RecordingStore {
    fn list_collections(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn collection_exists(&self, _name: &str) -> Result<bool> {
        Ok(false)
    }

    fn collection_info(&self, _name: &str) -> Result<Option<CollectionInfo>> {
        Ok(None)
    }

    fn create_collection(&self, _name: &str, _vector_size: u64, _distance: Distance) -> Result<()> {
        Ok(())
    }

    fn delete_collection(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    fn upsert_points(&self, _name: &str, points: &[Point]) -> Result<()> {
        let call = self.upserted.borrow().len();
        if self.fail_upsert_calls.contains(&call) {
            self.upserted.borrow_mut().push(Vec::new());
            return Err(SearchError::Store("upsert rejected".to_string()));
        }
        self.upserted.borrow_mut().push(points.to_vec());
        Ok(())
    }

    fn search(
        &self,
        name: &str,
        _vector: &[f32],
        limit: usize,
        score_threshold: Option<f32>,
        _filter: Option<&Value>,
    ) -> Result<Vec<ScoredPoint>> {
        self.searches
            .borrow_mut()
            .push((name.to_string(), limit, score_threshold));

        let mut hits: Vec<ScoredPoint> = self
            .hits
            .iter()
            .filter(|h| score_threshold.is_none_or(|t| h.score >= t))
            .cloned()
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }

    fn all_payloads(&self, _name: &str) -> Result<Vec<Map<String, Value>>> {
        Ok(Vec::new())
    }
}

/// Embedder double recording every input it sees.
struct StubEmbedder {
    calls: RefCell<Vec<EmbeddingInput>>,
    fail: bool,
}

impl StubEmbedder {
    fn new() -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            fail: false,
        }
    }

    fn failing() -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            fail: true,
        }
    }
}

impl Embedder for StubEmbedder {
    fn embed(&self, input: &EmbeddingInput) -> Result<Vec<f32>> {
        self.calls.borrow_mut().push(input.clone());
        if self.fail {
            return Err(SearchError::Embedding("embedder offline".to_string()));
        }
        Ok(vec![1.0, 0.0, 0.0])
    }

    fn dimension(&self) -> usize {
        3
    }
}

fn named_product(id: &str, name: &str) -> Product {
    Product {
        product_id: Some(id.to_string()),
        product_name: Some(name.to_string()),
        ..Product::default()
    }
}

fn engine<'a>(store: &'a RecordingStore, batch_size: usize) -> SearchEngine<'a, RecordingStore> {
    SearchEngine::new(store, &Config::default()).with_batch_size(batch_size)
}

#[test]
fn full_batches_flush_at_batch_size() {
    let store = RecordingStore::default();
    let embedder = StubEmbedder::new();
    let products: Vec<Product> = (0..10)
        .map(|i| named_product(&format!("p{i}"), &format!("Chair {i}")))
        .collect();

    let stats = engine(&store, 4)
        .build_text_embeddings(&embedder, "furniture_products", &products)
        .expect("ingestion should succeed");

    assert_eq!(stats, IngestStats { processed: 10, failed: 0 });

    let batch_sizes: Vec<usize> = store.upserted.borrow().iter().map(Vec::len).collect();
    assert_eq!(batch_sizes, vec![4, 4, 2]);
}

#[test]
fn products_without_embeddable_fields_are_counted_failed() {
    let store = RecordingStore::default();
    let embedder = StubEmbedder::new();

    let mut products: Vec<Product> = (0..7)
        .map(|i| named_product(&format!("p{i}"), &format!("Sofa {i}")))
        .collect();
    for _ in 0..3 {
        products.push(Product {
            product_name: Some(String::new()),
            category_name: Some(String::new()),
            description: Some(String::new()),
            quick_facts: vec![String::new(), "  ".to_string()],
            ..Product::default()
        });
    }

    let stats = engine(&store, 4)
        .build_text_embeddings(&embedder, "furniture_products", &products)
        .expect("ingestion should succeed");

    assert_eq!(stats, IngestStats { processed: 7, failed: 3 });
    // Empty products never reach the embedder.
    assert_eq!(embedder.calls.borrow().len(), 7);

    let batch_sizes: Vec<usize> = store.upserted.borrow().iter().map(Vec::len).collect();
    assert_eq!(batch_sizes, vec![4, 3]);
}

#[test]
fn failed_batch_is_dropped_and_run_continues() {
    let store = RecordingStore {
        fail_upsert_calls: vec![0],
        ..RecordingStore::default()
    };
    let embedder = StubEmbedder::new();
    let products: Vec<Product> = (0..6)
        .map(|i| named_product(&format!("p{i}"), &format!("Table {i}")))
        .collect();

    let stats = engine(&store, 4)
        .build_text_embeddings(&embedder, "furniture_products", &products)
        .expect("ingestion should succeed");

    assert_eq!(stats, IngestStats { processed: 2, failed: 4 });
    assert_eq!(store.upserted.borrow().len(), 2);
}

#[test]
fn embedder_errors_are_soft_failures() {
    let store = RecordingStore::default();
    let embedder = StubEmbedder::failing();
    let products = vec![named_product("p1", "Lamp")];

    let stats = engine(&store, 4)
        .build_text_embeddings(&embedder, "furniture_products", &products)
        .expect("ingestion should succeed");

    assert_eq!(stats, IngestStats { processed: 0, failed: 1 });
    assert!(store.upserted.borrow().is_empty());
}

#[test]
fn point_ids_are_stable_across_runs() {
    let store = RecordingStore::default();
    let embedder = StubEmbedder::new();
    let products = vec![named_product("12345", "Bookshelf")];

    let text_engine = engine(&store, 4);
    text_engine
        .build_text_embeddings(&embedder, "furniture_products", &products)
        .expect("first run");
    text_engine
        .build_text_embeddings(&embedder, "furniture_products", &products)
        .expect("second run");

    let upserted = store.upserted.borrow();
    assert_eq!(upserted[0][0].id, upserted[1][0].id);

    // Same product in a different collection gets a different id.
    assert_ne!(
        point_id("furniture_products", &products[0]),
        point_id("furniture_images", &products[0])
    );
}

#[test]
fn text_payload_carries_product_fields_and_embedded_text() {
    let store = RecordingStore::default();
    let embedder = StubEmbedder::new();
    let mut product = named_product("p1", "POANG Armchair");
    product.price = Some(129.0);
    product.currency = Some("USD".to_string());

    engine(&store, 4)
        .build_text_embeddings(&embedder, "furniture_products", &[product])
        .expect("ingestion should succeed");

    let upserted = store.upserted.borrow();
    let payload = &upserted[0][0].payload;
    assert_eq!(payload["product_name"], "POANG Armchair");
    assert_eq!(payload["price"], 129.0);
    assert_eq!(
        payload["text"],
        "Product: POANG Armchair Price: 129 USD"
    );
}

#[test]
fn image_pipeline_embeds_cleaned_url() {
    let store = RecordingStore::default();
    let embedder = StubEmbedder::new();
    let mut product = named_product("p1", "Rug");
    product.main_image_url = Some("https://img.example.com/rug.jpg?f=xxs".to_string());

    let stats = engine(&store, 4)
        .build_image_embeddings(&embedder, "furniture_images", &[product])
        .expect("ingestion should succeed");

    assert_eq!(stats, IngestStats { processed: 1, failed: 0 });

    let calls = embedder.calls.borrow();
    match &calls[0] {
        EmbeddingInput::ImageUrl(url) => {
            assert_eq!(url.as_str(), "https://img.example.com/rug.jpg");
        }
        other => panic!("expected image input, got {other:?}"),
    }

    let upserted = store.upserted.borrow();
    assert_eq!(
        upserted[0][0].payload["clip_image_url"],
        "https://img.example.com/rug.jpg"
    );
}

#[test]
fn products_without_usable_images_are_counted_failed() {
    let store = RecordingStore::default();
    let embedder = StubEmbedder::new();
    let mut no_image = named_product("p1", "Desk");
    no_image.main_image_url = Some("file:///tmp/desk.jpg".to_string());

    let stats = engine(&store, 4)
        .build_image_embeddings(&embedder, "furniture_images", &[no_image])
        .expect("ingestion should succeed");

    assert_eq!(stats, IngestStats { processed: 0, failed: 1 });
    assert!(embedder.calls.borrow().is_empty());
}

fn hit(id: u64, score: f32, name: &str) -> ScoredPoint {
    let mut payload = Map::new();
    payload.insert("product_id".to_string(), format!("p{id}").into());
    payload.insert("product_name".to_string(), name.into());
    payload.insert("category_name".to_string(), "Chairs".into());
    payload.insert("price".to_string(), 49.5.into());
    ScoredPoint {
        id: crate::store::PointId::Number(id),
        score,
        payload: Some(payload),
    }
}

#[test]
fn search_filters_by_threshold_and_preserves_order() {
    let store = RecordingStore {
        hits: vec![hit(1, 0.95, "Armchair"), hit(2, 0.5, "Stool")],
        ..RecordingStore::default()
    };
    let embedder = StubEmbedder::new();

    let results = engine(&store, 4)
        .search_by_text(&embedder, "furniture_products", "cozy armchair", None, Some(0.8))
        .expect("search should succeed");

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].product_name.as_deref(), Some("Armchair"));
    assert_eq!(results[0].category.as_deref(), Some("Chairs"));
    assert!((results[0].similarity_score - 0.95).abs() < f32::EPSILON);
}

#[test]
fn search_defaults_come_from_config() {
    let store = RecordingStore::default();
    let embedder = StubEmbedder::new();

    engine(&store, 4)
        .search_by_text(&embedder, "furniture_products", "bed frame", None, None)
        .expect("search should succeed");

    let searches = store.searches.borrow();
    assert_eq!(searches[0], ("furniture_products".to_string(), 10, Some(0.7)));
}

#[test]
fn search_prefers_embedded_image_url() {
    let mut with_clip = hit(1, 0.9, "Mirror");
    if let Some(payload) = with_clip.payload.as_mut() {
        payload.insert(
            "clip_image_url".to_string(),
            "https://img.example.com/full.jpg".into(),
        );
        payload.insert(
            "main_image_url".to_string(),
            "https://img.example.com/thumb.jpg?f=xxs".into(),
        );
    }
    let store = RecordingStore {
        hits: vec![with_clip],
        ..RecordingStore::default()
    };
    let embedder = StubEmbedder::new();

    let results = engine(&store, 4)
        .search_by_image(
            &embedder,
            "furniture_images",
            "https://img.example.com/query.jpg",
            None,
            None,
        )
        .expect("search should succeed");

    assert_eq!(
        results[0].image_url.as_deref(),
        Some("https://img.example.com/full.jpg")
    );
}

#[test]
fn image_query_goes_through_the_image_pathway() {
    let store = RecordingStore::default();
    let embedder = StubEmbedder::new();

    engine(&store, 4)
        .search_by_image(
            &embedder,
            "furniture_images",
            "https://example.com/sofa.jpg",
            None,
            None,
        )
        .expect("search should succeed");

    let calls = embedder.calls.borrow();
    match &calls[0] {
        EmbeddingInput::ImageUrl(url) => {
            assert_eq!(url.as_str(), "https://example.com/sofa.jpg");
        }
        other => panic!("image query was embedded as {other:?}"),
    }
}

#[test]
fn unparseable_image_query_yields_empty_results() {
    let store = RecordingStore {
        hits: vec![hit(1, 0.95, "Armchair")],
        ..RecordingStore::default()
    };
    let embedder = StubEmbedder::new();

    let results = engine(&store, 4)
        .search_by_image(&embedder, "furniture_images", "not a url", None, None)
        .expect("search should not error");

    assert!(results.is_empty());
    assert!(embedder.calls.borrow().is_empty());
    assert!(store.searches.borrow().is_empty());
}

#[test]
fn hits_without_payload_are_skipped() {
    let store = RecordingStore {
        hits: vec![ScoredPoint {
            id: crate::store::PointId::Number(1),
            score: 0.9,
            payload: None,
        }],
        ..RecordingStore::default()
    };
    let embedder = StubEmbedder::new();

    let results = engine(&store, 4)
        .search_by_text(&embedder, "furniture_products", "anything", None, None)
        .expect("search should succeed");

    assert!(results.is_empty());
}

#[test]
fn query_embedding_failure_yields_empty_results() {
    let store = RecordingStore {
        hits: vec![hit(1, 0.95, "Armchair")],
        ..RecordingStore::default()
    };
    let embedder = StubEmbedder::failing();

    let results = engine(&store, 4)
        .search_by_text(&embedder, "furniture_products", "cozy armchair", None, None)
        .expect("search should not error");

    assert!(results.is_empty());
    assert!(store.searches.borrow().is_empty());
}
