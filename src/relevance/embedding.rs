use crate::relevance::RelevanceError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;

/// External service turning texts into embedding vectors
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Returns one embedding per input text, in input order
    async fn get_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RelevanceError>;
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    inputs: &'a [String],
}

/// Embedding client for a text-embeddings HTTP server
///
/// Posts `{"inputs": [...]}` to `<base>/embed` and expects a JSON array of
/// float arrays back.
#[derive(Debug, Clone)]
pub struct HttpEmbeddingClient {
    client: Client,
    endpoint: String,
}

impl HttpEmbeddingClient {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}/embed", base_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    async fn get_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RelevanceError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&EmbedRequest { inputs: texts })
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(RelevanceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let embeddings: Vec<Vec<f32>> = response.json().await?;
        if embeddings.len() != texts.len() {
            return Err(RelevanceError::EmbeddingCount {
                expected: texts.len(),
                got: embeddings.len(),
            });
        }

        Ok(embeddings)
    }
}

/// Cosine similarity `dot(a, b) / (|a| * |b|)`
///
/// Returns 0 when either vector has zero norm or the dimensions differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a.sqrt() * norm_b.sqrt())) as f32
}
