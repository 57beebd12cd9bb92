//! Vector collection storage.
//!
//! [`VectorStore`] is the seam between the pipelines and the remote store;
//! [`qdrant::QdrantStore`] is the production implementation. Tests swap in an
//! in-memory double.

pub mod qdrant;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

use crate::Result;

pub use qdrant::QdrantStore;

/// Distance metric a collection is configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Distance {
    Cosine,
    Euclid,
    Dot,
}

/// Identifier of a point inside a collection. The store accepts either a
/// UUID or an unsigned integer; this crate always writes UUIDs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointId {
    Uuid(Uuid),
    Number(u64),
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uuid(id) => write!(f, "{id}"),
            Self::Number(id) => write!(f, "{id}"),
        }
    }
}

/// One (id, vector, payload) record to be written into a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: Map<String, Value>,
}

/// A similarity-search hit, in the order the store returned it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScoredPoint {
    pub id: PointId,
    pub score: f32,
    #[serde(default)]
    pub payload: Option<Map<String, Value>>,
}

/// Summary information about a collection.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CollectionInfo {
    #[serde(default)]
    pub points_count: Option<u64>,
}

/// Operations over named collections in the external vector store.
///
/// Administrative tolerance ("already exists" on create, "does not exist" on
/// delete) is the implementation's responsibility; data-path errors (upsert,
/// search) propagate so callers choose their own failure policy.
pub trait VectorStore {
    fn list_collections(&self) -> Result<Vec<String>>;

    fn collection_exists(&self, name: &str) -> Result<bool>;

    fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>>;

    fn create_collection(&self, name: &str, vector_size: u64, distance: Distance) -> Result<()>;

    fn delete_collection(&self, name: &str) -> Result<()>;

    /// Delete-then-create. Both halves tolerate the collection being absent
    /// or present respectively.
    fn recreate_collection(&self, name: &str, vector_size: u64, distance: Distance) -> Result<()> {
        self.delete_collection(name)?;
        self.create_collection(name, vector_size, distance)
    }

    fn upsert_points(&self, name: &str, points: &[Point]) -> Result<()>;

    /// Similarity search. `score_threshold` is a server-side lower bound;
    /// results come back in the store's descending-score order.
    fn search(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
        score_threshold: Option<f32>,
        filter: Option<&Value>,
    ) -> Result<Vec<ScoredPoint>>;

    /// Scroll the whole collection and return every point's payload.
    fn all_payloads(&self, name: &str) -> Result<Vec<Map<String, Value>>>;
}
