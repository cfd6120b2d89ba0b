use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::embedding::{EmbeddingBuilder, PostWeights, ThreadWeights, UserWeights};
use crate::error::{RecommenderError, Result};
use crate::models::collections;
use crate::store::DocumentStore;
use crate::vector::{argsort_topk, cosine};

/// Cosine-similarity engine over cached neighborhood embeddings.
///
/// A missing requesting user yields an empty list rather than an error;
/// candidates that cannot be embedded are skipped.
pub struct EmbeddingEngine {
    store: Arc<dyn DocumentStore>,
    builder: Arc<EmbeddingBuilder>,
}

impl EmbeddingEngine {
    pub fn new(store: Arc<dyn DocumentStore>, builder: Arc<EmbeddingBuilder>) -> Self {
        Self { store, builder }
    }

    pub async fn recommend_users(
        &self,
        user_id: &str,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let root = match self
            .builder
            .user_embedding(user_id, UserWeights::default(), cancel)
            .await
        {
            Ok(vector) => vector,
            Err(RecommenderError::NotFound(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut ids = Vec::new();
        let mut scores = Vec::new();
        for candidate in self.candidate_ids(collections::USERS).await? {
            if candidate == user_id {
                continue;
            }
            match self
                .builder
                .user_embedding(&candidate, UserWeights::default(), cancel)
                .await
            {
                Ok(vector) => {
                    scores.push(cosine(&root, &vector));
                    ids.push(candidate);
                }
                Err(RecommenderError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(top_ids(ids, &scores, limit))
    }

    pub async fn recommend_posts(
        &self,
        user_id: &str,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let root = match self
            .builder
            .user_embedding(user_id, UserWeights::default(), cancel)
            .await
        {
            Ok(vector) => vector,
            Err(RecommenderError::NotFound(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut ids = Vec::new();
        let mut scores = Vec::new();
        for candidate in self.candidate_ids(collections::POSTS).await? {
            match self
                .builder
                .post_embedding(&candidate, PostWeights::default(), cancel)
                .await
            {
                Ok(vector) => {
                    scores.push(cosine(&root, &vector));
                    ids.push(candidate);
                }
                Err(RecommenderError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(top_ids(ids, &scores, limit))
    }

    pub async fn recommend_threads(
        &self,
        user_id: &str,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let root = match self
            .builder
            .user_embedding(user_id, UserWeights::default(), cancel)
            .await
        {
            Ok(vector) => vector,
            Err(RecommenderError::NotFound(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut ids = Vec::new();
        let mut scores = Vec::new();
        for candidate in self.candidate_ids(collections::THREADS).await? {
            match self
                .builder
                .thread_embedding(&candidate, ThreadWeights::default(), cancel)
                .await
            {
                Ok(vector) => {
                    scores.push(cosine(&root, &vector));
                    ids.push(candidate);
                }
                Err(RecommenderError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(top_ids(ids, &scores, limit))
    }

    async fn candidate_ids(&self, collection: &str) -> Result<Vec<String>> {
        let records = self
            .store
            .find(collection, serde_json::json!({}), &["embedding"])
            .await?;
        Ok(records
            .into_iter()
            .filter_map(|record| {
                record
                    .get("_id")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string())
            })
            .collect())
    }
}

fn top_ids(ids: Vec<String>, scores: &[f64], limit: usize) -> Vec<String> {
    argsort_topk(scores, limit)
        .into_iter()
        .map(|index| ids[index].clone())
        .collect()
}
