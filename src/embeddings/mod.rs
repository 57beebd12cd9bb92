//! Embedding providers.
//!
//! Two interchangeable backends implement [`Embedder`]: a hosted
//! text-embedding API ([`openai`]) and a multimodal image/text inference
//! service ([`clip`]). Inputs are an explicit tagged union, so an image is an
//! image because the caller said so, not because a string happened to start
//! with "http".

pub mod clip;
pub mod openai;

use url::Url;

use crate::Result;

pub use clip::ClipClient;
pub use openai::OpenAiClient;

/// Input to an embedding provider.
#[derive(Debug, Clone, PartialEq)]
pub enum EmbeddingInput {
    Text(String),
    ImageUrl(Url),
}

impl EmbeddingInput {
    #[inline]
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self::Text(text.into())
    }
}

/// A provider converting text or an image reference into a fixed-length
/// vector. Errors are explicit; the pipelines decide whether a failed
/// embedding is fatal (it never is, per item).
pub trait Embedder {
    fn embed(&self, input: &EmbeddingInput) -> Result<Vec<f32>>;

    /// Dimensionality of the vectors this provider produces. Must match the
    /// target collection's configured size or upserts are rejected.
    fn dimension(&self) -> usize;
}

/// L2-normalize a vector. A zero vector is returned unchanged.
#[inline]
pub fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}
