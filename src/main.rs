use clap::{Parser, Subcommand};
use std::path::PathBuf;

use furniture_search::Result;
use furniture_search::commands::{
    build_image, build_text, list_collections, search_image, search_text,
};
use furniture_search::config::Config;

#[derive(Parser)]
#[command(name = "furniture-search")]
#[command(about = "Vector similarity search over a scraped furniture catalog")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml (defaults to the user config directory)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the text-embedding collection from a catalog file
    BuildText {
        /// Scraped catalog JSON file
        input_file: Option<String>,
        /// Read products from an existing collection instead of a file
        #[arg(long, conflicts_with = "input_file")]
        source_collection: Option<String>,
        /// Target collection name
        #[arg(long)]
        collection: Option<String>,
        /// Products per upsert batch
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Build the image-embedding collection from a catalog file
    BuildImage {
        /// Scraped catalog JSON file
        input_file: Option<String>,
        /// Read products from an existing collection instead of a file
        #[arg(long, conflicts_with = "input_file")]
        source_collection: Option<String>,
        /// Target collection name
        #[arg(long)]
        collection: Option<String>,
        /// Products per upsert batch
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Search products by text query
    SearchText {
        /// Natural-language query
        query: String,
        /// Collection to search
        #[arg(long)]
        collection: Option<String>,
        /// Maximum number of results
        #[arg(long)]
        limit: Option<usize>,
        /// Minimum similarity score
        #[arg(long)]
        threshold: Option<f32>,
        /// Search the image collection through the multimodal model
        #[arg(long)]
        use_clip: bool,
    },
    /// Search product images by a query image URL
    SearchImage {
        /// URL of the query image
        query: String,
        /// Collection to search
        #[arg(long)]
        collection: Option<String>,
        /// Maximum number of results
        #[arg(long)]
        limit: Option<usize>,
        /// Minimum similarity score
        #[arg(long)]
        threshold: Option<f32>,
    },
    /// List collections and their point counts
    ListCollections,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config = match &cli.config_dir {
        Some(dir) => Config::load(dir)?,
        None => Config::load_default()?,
    };

    match cli.command {
        Commands::BuildText {
            input_file,
            source_collection,
            collection,
            batch_size,
        } => {
            build_text(&config, input_file, source_collection, collection, batch_size)?;
        }
        Commands::BuildImage {
            input_file,
            source_collection,
            collection,
            batch_size,
        } => {
            build_image(&config, input_file, source_collection, collection, batch_size)?;
        }
        Commands::SearchText {
            query,
            collection,
            limit,
            threshold,
            use_clip,
        } => {
            search_text(&config, &query, collection, limit, threshold, use_clip)?;
        }
        Commands::SearchImage {
            query,
            collection,
            limit,
            threshold,
        } => {
            search_image(&config, &query, collection, limit, threshold)?;
        }
        Commands::ListCollections => {
            list_collections(&config)?;
        }
    }

    Ok(())
}
