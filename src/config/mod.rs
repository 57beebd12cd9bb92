
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

/// Explicit application configuration, constructed once at startup and passed
/// by reference into every component constructor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub qdrant: QdrantConfig,
    pub openai: OpenAiConfig,
    pub clip: ClipConfig,
    pub collections: CollectionsConfig,
    pub processing: ProcessingConfig,
    pub index: IndexConfig,
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QdrantConfig {
    pub url: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub vector_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClipConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub vector_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CollectionsConfig {
    pub text: String,
    pub image: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProcessingConfig {
    pub batch_size: usize,
    /// Pacing delay between batch upserts, in milliseconds. A throttle for
    /// provider rate limits, not a correctness mechanism.
    pub batch_delay_ms: u64,
}

/// Store-side index tuning knobs. Performance, not correctness; the defaults
/// match what the collections were originally built with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IndexConfig {
    pub hnsw_m: u64,
    pub hnsw_ef_construct: u64,
    pub memmap_threshold: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SearchConfig {
    pub limit: usize,
    pub score_threshold: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            qdrant: QdrantConfig::default(),
            openai: OpenAiConfig::default(),
            clip: ClipConfig::default(),
            collections: CollectionsConfig::default(),
            processing: ProcessingConfig::default(),
            index: IndexConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6333".to_string(),
            api_key: None,
        }
    }
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "text-embedding-3-small".to_string(),
            vector_size: 1536,
        }
    }
}

impl Default for ClipConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8800".to_string(),
            api_key: None,
            model: "clip-vit-large-patch14".to_string(),
            vector_size: 768,
        }
    }
}

impl Default for CollectionsConfig {
    fn default() -> Self {
        Self {
            text: "furniture_products".to_string(),
            image: "furniture_images".to_string(),
        }
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            batch_delay_ms: 0,
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            hnsw_m: 16,
            hnsw_ef_construct: 100,
            memmap_threshold: 20_000,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            limit: 10,
            score_threshold: 0.7,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Qdrant URL is required (set qdrant.url or the QDRANT_URL environment variable)")]
    MissingQdrantUrl,
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(usize),
    #[error("Invalid vector size: {0} (must be between 64 and 4096)")]
    InvalidVectorSize(u64),
    #[error("Invalid score threshold: {0} (must be between 0.0 and 1.0)")]
    InvalidScoreThreshold(f32),
    #[error("Invalid result limit: {0} (must be at least 1)")]
    InvalidLimit(usize),
    #[error("Collection name cannot be empty")]
    EmptyCollectionName,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Load configuration from `config.toml` in the given directory, apply
    /// environment overrides for endpoints and credentials, and validate.
    ///
    /// A missing file yields the defaults; a missing Qdrant URL after
    /// overrides is a hard startup failure.
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path).with_context(|| {
                format!("Failed to read config file: {}", config_path.display())
            })?;
            toml::from_str(&content).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    /// Load from the platform config directory (`furniture-search/config.toml`).
    #[inline]
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_dir()?)
    }

    #[inline]
    pub fn save<P: AsRef<Path>>(&self, config_dir: P) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        fs::create_dir_all(config_dir.as_ref()).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.as_ref().display()
            )
        })?;

        let config_path = config_dir.as_ref().join("config.toml");
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = env::var("QDRANT_URL") {
            self.qdrant.url = value;
        }
        if let Ok(value) = env::var("QDRANT_API_KEY") {
            self.qdrant.api_key = Some(value);
        }
        if let Ok(value) = env::var("OPENAI_API_KEY") {
            self.openai.api_key = Some(value);
        }
        if let Ok(value) = env::var("OPENAI_MODEL") {
            self.openai.model = value;
        }
        if let Ok(value) = env::var("CLIP_ENDPOINT") {
            self.clip.endpoint = value;
        }
        if let Ok(value) = env::var("CLIP_API_KEY") {
            self.clip.api_key = Some(value);
        }
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.qdrant.url.trim().is_empty() {
            return Err(ConfigError::MissingQdrantUrl);
        }
        Url::parse(&self.qdrant.url)
            .map_err(|_| ConfigError::InvalidUrl(self.qdrant.url.clone()))?;
        Url::parse(&self.clip.endpoint)
            .map_err(|_| ConfigError::InvalidUrl(self.clip.endpoint.clone()))?;

        if self.processing.batch_size == 0 || self.processing.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.processing.batch_size));
        }

        for size in [self.openai.vector_size, self.clip.vector_size] {
            if !(64..=4096).contains(&size) {
                return Err(ConfigError::InvalidVectorSize(size));
            }
        }

        if !(0.0..=1.0).contains(&self.search.score_threshold) {
            return Err(ConfigError::InvalidScoreThreshold(
                self.search.score_threshold,
            ));
        }

        if self.search.limit == 0 {
            return Err(ConfigError::InvalidLimit(self.search.limit));
        }

        if self.collections.text.trim().is_empty() || self.collections.image.trim().is_empty() {
            return Err(ConfigError::EmptyCollectionName);
        }

        Ok(())
    }

    pub fn qdrant_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.qdrant.url).map_err(|_| ConfigError::InvalidUrl(self.qdrant.url.clone()))
    }

    pub fn clip_endpoint(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.clip.endpoint)
            .map_err(|_| ConfigError::InvalidUrl(self.clip.endpoint.clone()))
    }
}

/// Platform config directory for the application.
#[inline]
pub fn default_config_dir() -> Result<PathBuf> {
    let base = dirs::config_dir().context("Could not determine platform config directory")?;
    Ok(base.join("furniture-search"))
}
