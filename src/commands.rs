use anyhow::{Context, Result, bail};
use tracing::info;

use crate::catalog::{self, Product};
use crate::config::Config;
use crate::embeddings::{ClipClient, OpenAiClient};
use crate::pipeline::{SearchEngine, SearchResult};
use crate::store::{Distance, QdrantStore, VectorStore};

const DESCRIPTION_PREVIEW_CHARS: usize = 100;

/// Build the text-embedding collection from a scraped catalog file or an
/// existing collection's payloads.
#[inline]
pub fn build_text(
    config: &Config,
    input_file: Option<String>,
    source_collection: Option<String>,
    collection: Option<String>,
    batch_size: Option<usize>,
) -> Result<()> {
    let products = load_source(config, input_file, source_collection)?;
    let collection = collection.unwrap_or_else(|| config.collections.text.clone());

    let store = QdrantStore::new(config)?;
    store
        .recreate_collection(&collection, config.openai.vector_size, Distance::Cosine)
        .with_context(|| format!("Failed to recreate collection {collection}"))?;

    let embedder = OpenAiClient::new(&config.openai).context("Failed to create text embedder")?;
    let mut engine = SearchEngine::new(&store, config);
    if let Some(batch_size) = batch_size {
        engine = engine.with_batch_size(batch_size);
    }

    let stats = engine.build_text_embeddings(&embedder, &collection, &products)?;

    println!("Text index build complete!");
    println!("  Collection: {collection}");
    println!("  Products processed: {}", stats.processed);
    println!("  Products failed: {}", stats.failed);

    Ok(())
}

/// Build the image-embedding collection. Only products with a usable http(s)
/// main image are embedded.
#[inline]
pub fn build_image(
    config: &Config,
    input_file: Option<String>,
    source_collection: Option<String>,
    collection: Option<String>,
    batch_size: Option<usize>,
) -> Result<()> {
    let products = load_source(config, input_file, source_collection)?;
    let products = catalog::with_usable_images(products);
    let collection = collection.unwrap_or_else(|| config.collections.image.clone());

    let store = QdrantStore::new(config)?;
    store
        .recreate_collection(&collection, config.clip.vector_size, Distance::Cosine)
        .with_context(|| format!("Failed to recreate collection {collection}"))?;

    let embedder = ClipClient::new(&config.clip).context("Failed to create image embedder")?;
    let mut engine = SearchEngine::new(&store, config);
    if let Some(batch_size) = batch_size {
        engine = engine.with_batch_size(batch_size);
    }

    let stats = engine.build_image_embeddings(&embedder, &collection, &products)?;

    println!("Image index build complete!");
    println!("  Collection: {collection}");
    println!("  Products processed: {}", stats.processed);
    println!("  Products failed: {}", stats.failed);

    Ok(())
}

/// Run a text query against a text collection, or against an image
/// collection through the multimodal text tower when `use_clip` is set.
#[inline]
pub fn search_text(
    config: &Config,
    query: &str,
    collection: Option<String>,
    limit: Option<usize>,
    score_threshold: Option<f32>,
    use_clip: bool,
) -> Result<()> {
    let store = QdrantStore::new(config)?;
    let engine = SearchEngine::new(&store, config);

    let results = if use_clip {
        let collection = collection.unwrap_or_else(|| config.collections.image.clone());
        let embedder = ClipClient::new(&config.clip).context("Failed to create embedder")?;
        engine.search_by_text(&embedder, &collection, query, limit, score_threshold)?
    } else {
        let collection = collection.unwrap_or_else(|| config.collections.text.clone());
        let embedder = OpenAiClient::new(&config.openai).context("Failed to create embedder")?;
        engine.search_by_text(&embedder, &collection, query, limit, score_threshold)?
    };

    print_results(query, &results);
    Ok(())
}

/// Run a query image, given by URL, against the image collection.
#[inline]
pub fn search_image(
    config: &Config,
    image_url: &str,
    collection: Option<String>,
    limit: Option<usize>,
    score_threshold: Option<f32>,
) -> Result<()> {
    let collection = collection.unwrap_or_else(|| config.collections.image.clone());
    let store = QdrantStore::new(config)?;
    let embedder = ClipClient::new(&config.clip).context("Failed to create embedder")?;
    let engine = SearchEngine::new(&store, config);

    let results =
        engine.search_by_image(&embedder, &collection, image_url, limit, score_threshold)?;

    print_results(image_url, &results);
    Ok(())
}

/// List every collection in the store with its point count.
#[inline]
pub fn list_collections(config: &Config) -> Result<()> {
    let store = QdrantStore::new(config)?;
    let collections = store.list_collections()?;

    if collections.is_empty() {
        println!("No collections found.");
        println!("Use 'furniture-search build-text <file>' to build one.");
        return Ok(());
    }

    println!("Collections ({} total):", collections.len());
    for name in &collections {
        match store.collection_info(name)? {
            Some(info) => match info.points_count {
                Some(count) => println!("  {name}: {count} points"),
                None => println!("  {name}"),
            },
            None => println!("  {name}: (no longer exists)"),
        }
    }

    Ok(())
}

fn load_source(
    config: &Config,
    input_file: Option<String>,
    source_collection: Option<String>,
) -> Result<Vec<Product>> {
    let products = match (input_file, source_collection) {
        (Some(path), None) => catalog::load_products(&path)?,
        (None, Some(source)) => {
            let store = QdrantStore::new(config)?;
            catalog::load_from_collection(&store, &source)?
        }
        (Some(_), Some(_)) => {
            bail!("Use either an input file or --source-collection, not both")
        }
        (None, None) => bail!("An input file or --source-collection is required"),
    };

    if products.is_empty() {
        bail!("No products found in the source");
    }

    info!("Loaded {} products", products.len());
    Ok(products)
}

fn print_results(query: &str, results: &[SearchResult]) {
    if results.is_empty() {
        println!("No results found for \"{query}\".");
        return;
    }

    println!("🔍 Results for \"{query}\" ({} hits):", results.len());
    println!();

    for (rank, result) in results.iter().enumerate() {
        let name = result.product_name.as_deref().unwrap_or("(unnamed product)");
        println!(
            "{}. {} (score: {:.4})",
            rank + 1,
            name,
            result.similarity_score
        );

        if let Some(category) = &result.category {
            println!("   Category: {category}");
        }
        if let Some(price) = result.price {
            match &result.currency {
                Some(currency) => println!("   Price: {price} {currency}"),
                None => println!("   Price: {price}"),
            }
        }
        if let Some(description) = &result.description {
            println!("   {}", preview(description));
        }
        if let Some(image_url) = &result.image_url {
            println!("   Image: {image_url}");
        }
        println!();
    }
}

fn preview(description: &str) -> String {
    if description.chars().count() <= DESCRIPTION_PREVIEW_CHARS {
        return description.to_string();
    }
    let truncated: String = description.chars().take(DESCRIPTION_PREVIEW_CHARS).collect();
    format!("{truncated}...")
}
