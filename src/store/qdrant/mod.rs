
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::Config;
use crate::store::{CollectionInfo, Distance, Point, ScoredPoint, VectorStore};
use crate::{Result, SearchError};

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const SCROLL_PAGE_SIZE: usize = 1000;

/// REST client for a remote Qdrant instance.
#[derive(Debug, Clone)]
pub struct QdrantStore {
    base_url: Url,
    api_key: Option<String>,
    hnsw_m: u64,
    hnsw_ef_construct: u64,
    memmap_threshold: u64,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct CreateCollectionRequest {
    vectors: VectorParams,
    hnsw_config: HnswConfig,
    optimizers_config: OptimizersConfig,
}

#[derive(Debug, Serialize)]
struct VectorParams {
    size: u64,
    distance: Distance,
}

#[derive(Debug, Serialize)]
struct HnswConfig {
    m: u64,
    ef_construct: u64,
}

#[derive(Debug, Serialize)]
struct OptimizersConfig {
    memmap_threshold: u64,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    points: &'a [Point],
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    limit: usize,
    with_payload: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    score_threshold: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<&'a Value>,
}

#[derive(Debug, Serialize)]
struct ScrollRequest<'a> {
    limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<&'a Value>,
    with_payload: bool,
    with_vector: bool,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct CollectionsResult {
    collections: Vec<CollectionDescription>,
}

#[derive(Debug, Deserialize)]
struct CollectionDescription {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ScrollResult {
    points: Vec<ScrolledPoint>,
    #[serde(default)]
    next_page_offset: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ScrolledPoint {
    #[serde(default)]
    payload: Option<Map<String, Value>>,
}

impl QdrantStore {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = config
            .qdrant_url()
            .map_err(|e| SearchError::Config(e.to_string()))?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        info!("Connected to vector store at {base_url}");

        Ok(Self {
            base_url,
            api_key: config.qdrant.api_key.clone(),
            hnsw_m: config.index.hnsw_m,
            hnsw_ef_construct: config.index.hnsw_ef_construct,
            memmap_threshold: config.index.memmap_threshold,
            agent,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| SearchError::Store(format!("Failed to build URL for {path}: {e}")))
    }

    fn get(&self, url: &Url) -> std::result::Result<String, ureq::Error> {
        let mut request = self.agent.get(url.as_str());
        if let Some(key) = &self.api_key {
            request = request.header("api-key", key);
        }
        request
            .call()
            .and_then(|mut resp| resp.body_mut().read_to_string())
    }

    fn put_json(&self, url: &Url, body: &str) -> std::result::Result<String, ureq::Error> {
        let mut request = self
            .agent
            .put(url.as_str())
            .header("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            request = request.header("api-key", key);
        }
        request
            .send(body)
            .and_then(|mut resp| resp.body_mut().read_to_string())
    }

    fn post_json(&self, url: &Url, body: &str) -> std::result::Result<String, ureq::Error> {
        let mut request = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            request = request.header("api-key", key);
        }
        request
            .send(body)
            .and_then(|mut resp| resp.body_mut().read_to_string())
    }

    fn delete_url(&self, url: &Url) -> std::result::Result<String, ureq::Error> {
        let mut request = self.agent.delete(url.as_str());
        if let Some(key) = &self.api_key {
            request = request.header("api-key", key);
        }
        request
            .call()
            .and_then(|mut resp| resp.body_mut().read_to_string())
    }

    fn store_error(context: &str, error: ureq::Error) -> SearchError {
        SearchError::Store(format!("{context}: {error}"))
    }
}

impl VectorStore for QdrantStore {
    #[inline]
    fn list_collections(&self) -> Result<Vec<String>> {
        let url = self.endpoint("/collections")?;
        let body = self
            .get(&url)
            .map_err(|e| Self::store_error("Failed to list collections", e))?;

        let response: ApiResponse<CollectionsResult> = serde_json::from_str(&body)
            .map_err(|e| SearchError::Store(format!("Failed to parse collections: {e}")))?;

        Ok(response
            .result
            .collections
            .into_iter()
            .map(|c| c.name)
            .collect())
    }

    #[inline]
    fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(self.list_collections()?.iter().any(|c| c == name))
    }

    #[inline]
    fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>> {
        let url = self.endpoint(&format!("/collections/{name}"))?;
        match self.get(&url) {
            Ok(body) => {
                let response: ApiResponse<CollectionInfo> = serde_json::from_str(&body)
                    .map_err(|e| {
                        SearchError::Store(format!("Failed to parse collection info: {e}"))
                    })?;
                Ok(Some(response.result))
            }
            Err(ureq::Error::StatusCode(404)) => Ok(None),
            Err(e) => Err(Self::store_error("Failed to fetch collection info", e)),
        }
    }

    #[inline]
    fn create_collection(&self, name: &str, vector_size: u64, distance: Distance) -> Result<()> {
        if self.collection_exists(name)? {
            warn!("Collection {name} already exists");
            return Ok(());
        }

        let request = CreateCollectionRequest {
            vectors: VectorParams {
                size: vector_size,
                distance,
            },
            hnsw_config: HnswConfig {
                m: self.hnsw_m,
                ef_construct: self.hnsw_ef_construct,
            },
            optimizers_config: OptimizersConfig {
                memmap_threshold: self.memmap_threshold,
            },
        };
        let body = serde_json::to_string(&request)
            .map_err(|e| SearchError::Store(format!("Failed to serialize request: {e}")))?;

        let url = self.endpoint(&format!("/collections/{name}"))?;
        self.put_json(&url, &body)
            .map_err(|e| Self::store_error(&format!("Failed to create collection {name}"), e))?;

        info!("Created collection {name} ({vector_size} dimensions, {distance:?})");
        Ok(())
    }

    #[inline]
    fn delete_collection(&self, name: &str) -> Result<()> {
        if !self.collection_exists(name)? {
            warn!("Collection {name} does not exist");
            return Ok(());
        }

        let url = self.endpoint(&format!("/collections/{name}"))?;
        self.delete_url(&url)
            .map_err(|e| Self::store_error(&format!("Failed to delete collection {name}"), e))?;

        info!("Deleted collection {name}");
        Ok(())
    }

    #[inline]
    fn upsert_points(&self, name: &str, points: &[Point]) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        let request = UpsertRequest { points };
        let body = serde_json::to_string(&request)
            .map_err(|e| SearchError::Store(format!("Failed to serialize points: {e}")))?;

        let url = self.endpoint(&format!("/collections/{name}/points?wait=true"))?;
        self.put_json(&url, &body)
            .map_err(|e| Self::store_error(&format!("Failed to upsert points to {name}"), e))?;

        info!("Upserted {} points to {name}", points.len());
        Ok(())
    }

    #[inline]
    fn search(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
        score_threshold: Option<f32>,
        filter: Option<&Value>,
    ) -> Result<Vec<ScoredPoint>> {
        let request = SearchRequest {
            vector,
            limit,
            with_payload: true,
            score_threshold,
            filter,
        };
        let body = serde_json::to_string(&request)
            .map_err(|e| SearchError::Store(format!("Failed to serialize search: {e}")))?;

        let url = self.endpoint(&format!("/collections/{name}/points/search"))?;
        let response_text = self
            .post_json(&url, &body)
            .map_err(|e| Self::store_error(&format!("Search failed in {name}"), e))?;

        let response: ApiResponse<Vec<ScoredPoint>> = serde_json::from_str(&response_text)
            .map_err(|e| SearchError::Store(format!("Failed to parse search results: {e}")))?;

        debug!("Search in {name} returned {} hits", response.result.len());
        Ok(response.result)
    }

    #[inline]
    fn all_payloads(&self, name: &str) -> Result<Vec<Map<String, Value>>> {
        let mut payloads = Vec::new();
        let mut offset: Option<Value> = None;

        loop {
            let request = ScrollRequest {
                limit: SCROLL_PAGE_SIZE,
                offset: offset.as_ref(),
                with_payload: true,
                with_vector: false,
            };
            let body = serde_json::to_string(&request)
                .map_err(|e| SearchError::Store(format!("Failed to serialize scroll: {e}")))?;

            let url = self.endpoint(&format!("/collections/{name}/points/scroll"))?;
            let response_text = self
                .post_json(&url, &body)
                .map_err(|e| Self::store_error(&format!("Failed to scroll {name}"), e))?;

            let response: ApiResponse<ScrollResult> = serde_json::from_str(&response_text)
                .map_err(|e| SearchError::Store(format!("Failed to parse scroll page: {e}")))?;

            if response.result.points.is_empty() {
                break;
            }

            payloads.extend(
                response
                    .result
                    .points
                    .into_iter()
                    .filter_map(|p| p.payload),
            );

            // A null cursor marks the final page; stopping here avoids an
            // extra zero-progress round trip.
            match response.result.next_page_offset {
                Some(next) if !next.is_null() => offset = Some(next),
                _ => break,
            }
        }

        info!("Retrieved {} payloads from {name}", payloads.len());
        Ok(payloads)
    }
}
