//! Relevance classification
//!
//! Decides whether a piece of discovered content is worth keeping and
//! following. Two interchangeable strategies implement `RelevanceClassifier`:
//! - `KeywordStrategy`: Aho–Corasick match over a comma-separated keyword list
//! - `SemanticStrategy`: cosine similarity between a query embedding and the
//!   content embedding from an external embedding service
//!
//! Callers hold an `Arc<dyn RelevanceClassifier>` and never branch on the
//! concrete strategy.

mod embedding;
mod keyword;
mod semantic;

pub use embedding::{cosine_similarity, EmbeddingClient, HttpEmbeddingClient};
pub use keyword::KeywordStrategy;
pub use semantic::{truncate_to_token_budget, SemanticStrategy};

use crate::config::RelevanceConfig;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result of classifying one content item
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub is_relevant: bool,
    pub score: f32,
    pub threshold: f32,
    /// Content embedding, when the strategy computed one
    pub embedding: Option<Vec<f32>>,
}

/// Errors raised while classifying content
#[derive(Debug, Error)]
pub enum RelevanceError {
    #[error("Embedding request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Embedding service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Embedding service returned {got} embeddings for {expected} inputs")]
    EmbeddingCount { expected: usize, got: usize },

    #[error("Keyword list is empty")]
    NoKeywords,

    #[error("Failed to build keyword matcher: {0}")]
    Matcher(#[from] aho_corasick::BuildError),
}

/// A strategy that scores content for relevance
///
/// Errors from collaborators are surfaced to the caller and never retried here.
#[async_trait]
pub trait RelevanceClassifier: Send + Sync {
    /// Classifies a piece of text
    async fn classify(&self, content: &str) -> Result<Verdict, RelevanceError>;

    /// Strategy name for logs
    fn name(&self) -> &'static str;
}

/// Builds the configured strategy
///
/// The semantic strategy embeds its query here, so construction performs
/// one request against the embedding service.
///
/// # Arguments
///
/// * `config` - The relevance section of the configuration
/// * `http` - Client used to reach the embedding service
pub async fn build_classifier(
    config: &RelevanceConfig,
    http: reqwest::Client,
) -> Result<Arc<dyn RelevanceClassifier>, RelevanceError> {
    match config {
        RelevanceConfig::Keyword { keywords } => {
            Ok(Arc::new(KeywordStrategy::from_list(keywords)?))
        }
        RelevanceConfig::Semantic {
            query,
            threshold,
            embedding_url,
            max_tokens,
        } => {
            let embedder = Arc::new(HttpEmbeddingClient::new(http, embedding_url));
            let strategy =
                SemanticStrategy::new(embedder, query, *threshold, *max_tokens).await?;
            Ok(Arc::new(strategy))
        }
    }
}
