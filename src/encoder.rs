use async_trait::async_trait;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{RecommenderError, Result};

/// Maps UTF-8 text to a fixed-width dense vector. Implementations must be
/// deterministic under a fixed model identity.
#[async_trait]
pub trait TextEncoder: Send + Sync {
    fn dim(&self) -> usize;
    async fn encode(&self, text: &str) -> Result<Vec<f32>>;
}

/// Deterministic token-hashing encoder (FNV-1a bucket counts, L2 normalized).
/// The model id is folded into the hash so distinct model identities produce
/// distinct vector spaces.
pub struct HashingEncoder {
    dim: usize,
    seed: u32,
    model_id: String,
}

impl HashingEncoder {
    pub fn new(dim: usize, model_id: &str) -> Self {
        Self {
            dim,
            seed: fnv1a(model_id.as_bytes(), 0x811c9dc5),
            model_id: model_id.to_string(),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[async_trait]
impl TextEncoder for HashingEncoder {
    fn dim(&self) -> usize {
        self.dim
    }

    async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dim];
        let lower = text.to_lowercase();
        for token in lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let h = fnv1a(token.as_bytes(), self.seed);
            vector[(h as usize) % self.dim] += 1.0;
        }
        l2_normalize(&mut vector);
        Ok(vector)
    }
}

fn fnv1a(bytes: &[u8], seed: u32) -> u32 {
    let mut h = if seed == 0 { 0x811c9dc5 } else { seed };
    for &b in bytes {
        h ^= b as u32;
        h = h.wrapping_mul(16777619);
    }
    h
}

fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Client for a remote embeddings service.
pub struct RemoteEncoder {
    http: reqwest::Client,
    base_url: String,
    model_id: String,
    dim: usize,
}

impl RemoteEncoder {
    pub fn new(base_url: String, model_id: String, dim: usize, timeout_ms: u64) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .build()
            .expect("failed to build http client");
        Self {
            http,
            base_url,
            model_id,
            dim,
        }
    }
}

#[async_trait]
impl TextEncoder for RemoteEncoder {
    fn dim(&self) -> usize {
        self.dim
    }

    async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/embed", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({ "model": self.model_id, "text": text });
        let response = self.http.post(&url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(RecommenderError::StoreFault(format!(
                "embeddings service error: {}",
                response.status()
            )));
        }
        let payload: serde_json::Value = response.json().await?;
        let vector: Vec<f32> = payload
            .get("vector")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|x| x.as_f64()).map(|f| f as f32).collect())
            .ok_or_else(|| {
                RecommenderError::StoreFault("embeddings service returned no vector".to_string())
            })?;
        if vector.len() != self.dim {
            return Err(RecommenderError::ShapeMismatch {
                expected: self.dim,
                actual: vector.len(),
            });
        }
        Ok(vector)
    }
}

/// Selects the encoder backend from configuration.
pub fn build_encoder(cfg: &Config) -> Arc<dyn TextEncoder> {
    match &cfg.embeddings_service_url {
        Some(url) => Arc::new(RemoteEncoder::new(
            url.clone(),
            cfg.embedding_model_id.clone(),
            cfg.embedding_dim,
            cfg.embeddings_timeout_ms,
        )),
        None => Arc::new(HashingEncoder::new(
            cfg.embedding_dim,
            &cfg.embedding_model_id,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn encoding_is_deterministic() {
        let encoder = HashingEncoder::new(64, "hashing-v1");
        let a = encoder.encode("the quick brown fox").await.unwrap();
        let b = encoder.encode("the quick brown fox").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn distinct_model_ids_produce_distinct_spaces() {
        let v1 = HashingEncoder::new(64, "hashing-v1")
            .encode("graph recommendations")
            .await
            .unwrap();
        let v2 = HashingEncoder::new(64, "hashing-v2")
            .encode("graph recommendations")
            .await
            .unwrap();
        assert_ne!(v1, v2);
    }

    #[tokio::test]
    async fn vectors_are_unit_norm_for_non_empty_text() {
        let encoder = HashingEncoder::new(32, "hashing-v1");
        let v = encoder.encode("one two three").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn empty_text_encodes_to_the_zero_vector() {
        let encoder = HashingEncoder::new(32, "hashing-v1");
        let v = encoder.encode("").await.unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }
}
