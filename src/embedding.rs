//! Embedding collaborator: an Ollama-style HTTP client, a per-run query
//! memo, and the f32 blob/cosine helpers shared with the vector store.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

pub const DEFAULT_EMBED_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "nomic-embed-text:v1.5";

/// Models evaluated when the caller does not narrow the list.
pub const DEFAULT_MODELS: &[&str] = &[
    "snowflake-arctic-embed:22m",
    "nomic-embed-text:v1.5",
    "embeddinggemma:300m",
    "snowflake-arctic-embed2:568m",
    "qwen3-embedding:4b",
];

const EMBED_TIMEOUT: Duration = Duration::from_secs(180);

/// Maps (model, text) to a fixed-length vector. The one seam the
/// orchestrator needs behind a trait, so tests never touch the network.
pub trait EmbeddingProvider {
    fn embed_batch(&self, model: &str, inputs: &[String]) -> Result<Vec<Vec<f32>>>;
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Blocking client for the `POST /api/embed` endpoint.
pub struct HttpEmbeddingClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl HttpEmbeddingClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(EMBED_TIMEOUT)
            .build()
            .context("failed to build embedding http client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

impl EmbeddingProvider for HttpEmbeddingClient {
    fn embed_batch(&self, model: &str, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/api/embed", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&EmbedRequest {
                model,
                input: inputs,
            })
            .send()
            .with_context(|| format!("embedding request to {url} failed"))?
            .error_for_status()
            .with_context(|| format!("embedding service rejected request for model '{model}'"))?;

        let payload: EmbedResponse = response
            .json()
            .with_context(|| format!("invalid embedding response for model '{model}'"))?;

        if payload.embeddings.len() != inputs.len() {
            bail!(
                "embedding service returned {} vectors for {} inputs (model '{model}')",
                payload.embeddings.len(),
                inputs.len()
            );
        }
        Ok(payload.embeddings)
    }
}

/// Per-run memo keyed by (model, exact text). This is the only mutable
/// shared state in the system; it lives for one orchestration run.
#[derive(Default)]
pub struct QueryEmbeddingCache {
    entries: HashMap<(String, String), Vec<f32>>,
}

impl QueryEmbeddingCache {
    /// Embed one query text, reusing the cached vector when the same
    /// (model, text) pair was embedded earlier in this run. The vector is
    /// checked against the model's registered dimension before caching.
    pub fn embed_query(
        &mut self,
        provider: &dyn EmbeddingProvider,
        model: &str,
        text: &str,
        dims: usize,
    ) -> Result<Vec<f32>> {
        let key = (model.to_string(), text.to_string());
        if let Some(vector) = self.entries.get(&key) {
            return Ok(vector.clone());
        }

        let mut vectors = provider.embed_batch(model, &[text.to_string()])?;
        let vector = vectors.pop().unwrap_or_default();
        if vector.len() != dims {
            bail!(
                "model '{model}' expected {dims} dims but got {}",
                vector.len()
            );
        }

        self.entries.insert(key, vector.clone());
        Ok(vector)
    }
}

pub fn encode_embedding_blob(values: &[f32]) -> Vec<u8> {
    let mut out = Vec::<u8>::with_capacity(values.len() * 4);
    for value in values {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

pub fn decode_embedding_blob(blob: &[u8], expected_dim: usize) -> Option<Vec<f32>> {
    if expected_dim == 0 || blob.len() != expected_dim.saturating_mul(4) {
        return None;
    }

    let mut out = Vec::<f32>::with_capacity(expected_dim);
    for chunk in blob.chunks_exact(4) {
        out.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }
    Some(out)
}

pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f64 {
    if left.len() != right.len() || left.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0_f64;
    let mut left_norm = 0.0_f64;
    let mut right_norm = 0.0_f64;
    for (left_value, right_value) in left.iter().zip(right.iter()) {
        let l = f64::from(*left_value);
        let r = f64::from(*right_value);
        dot += l * r;
        left_norm += l * l;
        right_norm += r * r;
    }

    if left_norm <= 0.0 || right_norm <= 0.0 {
        return 0.0;
    }
    dot / (left_norm.sqrt() * right_norm.sqrt())
}

/// Cosine distance as the vector store orders by: `1 - similarity`, lower
/// is closer.
pub fn cosine_distance(left: &[f32], right: &[f32]) -> f64 {
    1.0 - cosine_similarity(left, right)
}
