use crate::relevance::{
    cosine_similarity, EmbeddingClient, RelevanceClassifier, RelevanceError, Verdict,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Rough characters-per-token ratio for budget truncation
const CHARS_PER_TOKEN: usize = 4;

/// Similarity-threshold classifier over embeddings
pub struct SemanticStrategy {
    embedder: Arc<dyn EmbeddingClient>,
    query_embedding: Vec<f32>,
    threshold: f32,
    max_tokens: usize,
}

impl SemanticStrategy {
    /// Embeds `query` once and keeps the vector for every later comparison
    pub async fn new(
        embedder: Arc<dyn EmbeddingClient>,
        query: &str,
        threshold: f32,
        max_tokens: usize,
    ) -> Result<Self, RelevanceError> {
        let query_embedding = embed_one(embedder.as_ref(), query.to_string()).await?;
        tracing::debug!(
            "Semantic relevance ready: {} dimensions, threshold {}",
            query_embedding.len(),
            threshold
        );

        Ok(Self {
            embedder,
            query_embedding,
            threshold,
            max_tokens,
        })
    }
}

#[async_trait]
impl RelevanceClassifier for SemanticStrategy {
    async fn classify(&self, content: &str) -> Result<Verdict, RelevanceError> {
        let text = truncate_to_token_budget(content, self.max_tokens);
        let embedding = embed_one(self.embedder.as_ref(), text.to_string()).await?;
        let score = cosine_similarity(&self.query_embedding, &embedding);

        Ok(Verdict {
            is_relevant: score >= self.threshold,
            score,
            threshold: self.threshold,
            embedding: Some(embedding),
        })
    }

    fn name(&self) -> &'static str {
        "semantic"
    }
}

async fn embed_one(embedder: &dyn EmbeddingClient, text: String) -> Result<Vec<f32>, RelevanceError> {
    let mut embeddings = embedder.get_embeddings(&[text]).await?;
    match embeddings.pop() {
        Some(embedding) if embeddings.is_empty() => Ok(embedding),
        _ => Err(RelevanceError::EmbeddingCount {
            expected: 1,
            got: embeddings.len() + 1,
        }),
    }
}

/// Cuts text to roughly `max_tokens` tokens, on a character boundary
pub fn truncate_to_token_budget(text: &str, max_tokens: usize) -> &str {
    let max_chars = max_tokens.saturating_mul(CHARS_PER_TOKEN);
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
