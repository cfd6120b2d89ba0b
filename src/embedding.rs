use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::{Duration, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::encoder::TextEncoder;
use crate::error::{RecommenderError, Result};
use crate::models::{collections, NamedEntity, Post, Thread, User};
use crate::store::DocumentStore;
use crate::vector::{scaled_avg, validate_weights};

const WRITE_LOCK_STRIPES: usize = 64;

#[derive(Debug, Clone, Copy)]
pub struct UserWeights {
    pub interests: f64,
    pub description: f64,
    pub follows: f64,
}

impl Default for UserWeights {
    fn default() -> Self {
        Self {
            interests: 0.4,
            description: 0.2,
            follows: 0.4,
        }
    }
}

impl UserWeights {
    pub fn validate(&self) -> Result<()> {
        validate_weights(&[self.interests, self.description, self.follows])
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PostWeights {
    pub keys: f64,
    pub title: f64,
    pub content: f64,
    pub author: f64,
}

impl Default for PostWeights {
    fn default() -> Self {
        Self {
            keys: 0.35,
            title: 0.35,
            content: 0.2,
            author: 0.1,
        }
    }
}

impl PostWeights {
    pub fn validate(&self) -> Result<()> {
        validate_weights(&[self.keys, self.title, self.content, self.author])
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ThreadWeights {
    pub owner: f64,
    pub name: f64,
    pub members: f64,
    pub posts: f64,
}

impl Default for ThreadWeights {
    fn default() -> Self {
        Self {
            owner: 0.1,
            name: 0.1,
            members: 0.4,
            posts: 0.4,
        }
    }
}

impl ThreadWeights {
    pub fn validate(&self) -> Result<()> {
        validate_weights(&[self.owner, self.name, self.members, self.posts])
    }
}

/// Computes and caches neighborhood embeddings for users, posts, threads,
/// interests and keys.
///
/// Cached vectors live on the owning document under `embedding` and are
/// reused while fresh. The user composition is self-referential through
/// follows; an operation-scoped reentrance set breaks cycles by substituting
/// the base user embedding (interest and description terms renormalized) for
/// any user already on the computation stack.
pub struct EmbeddingBuilder {
    store: Arc<dyn DocumentStore>,
    encoder: Arc<dyn TextEncoder>,
    ttl: Duration,
    write_locks: Vec<Mutex<()>>,
}

impl EmbeddingBuilder {
    pub fn new(store: Arc<dyn DocumentStore>, encoder: Arc<dyn TextEncoder>, ttl_hours: i64) -> Self {
        Self {
            store,
            encoder,
            ttl: Duration::hours(ttl_hours),
            write_locks: (0..WRITE_LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    pub fn dim(&self) -> usize {
        self.encoder.dim()
    }

    pub async fn user_embedding(
        &self,
        id: &str,
        weights: UserWeights,
        cancel: &CancellationToken,
    ) -> Result<Vec<f32>> {
        weights.validate()?;
        let mut stack = HashSet::new();
        self.user_inner(id, weights, &mut stack, cancel).await
    }

    pub async fn post_embedding(
        &self,
        id: &str,
        weights: PostWeights,
        cancel: &CancellationToken,
    ) -> Result<Vec<f32>> {
        weights.validate()?;
        let mut stack = HashSet::new();
        self.post_inner(id, weights, &mut stack, cancel).await
    }

    pub async fn thread_embedding(
        &self,
        id: &str,
        weights: ThreadWeights,
        cancel: &CancellationToken,
    ) -> Result<Vec<f32>> {
        weights.validate()?;
        let mut stack = HashSet::new();

        if cancel.is_cancelled() {
            return Err(RecommenderError::Cancelled);
        }
        let thread: Thread = self.fetch(collections::THREADS, id).await?;
        if let Some(cached) = &thread.embedding {
            if cached.is_fresh(self.ttl, Utc::now()) && cached.vector.len() == self.dim() {
                return Ok(cached.vector.clone());
            }
        }

        let mut pairs: Vec<(f64, Vec<f32>)> = Vec::new();
        if let Some(owner) = &thread.id_owner {
            match self
                .user_inner(owner, UserWeights::default(), &mut stack, cancel)
                .await
            {
                Ok(vector) => pairs.push((weights.owner, vector)),
                Err(RecommenderError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        let name = thread.name.as_deref().unwrap_or("");
        let encoded = self
            .encoder
            .encode(&format!("Discussion name:\n{}", name))
            .await?;
        pairs.push((weights.name, encoded));

        let mut member_vectors: Vec<(f64, Vec<f32>)> = Vec::new();
        for member in &thread.members {
            if cancel.is_cancelled() {
                return Err(RecommenderError::Cancelled);
            }
            match self
                .user_inner(member, UserWeights::default(), &mut stack, cancel)
                .await
            {
                Ok(vector) => member_vectors.push((1.0, vector)),
                Err(RecommenderError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        if !member_vectors.is_empty() {
            pairs.push((weights.members, scaled_avg(&member_vectors)?));
        }

        let mut post_vectors: Vec<(f64, Vec<f32>)> = Vec::new();
        let posts = self
            .store
            .find(
                collections::POSTS,
                serde_json::json!({ "id_thread": id }),
                &[],
            )
            .await?;
        for record in posts {
            if cancel.is_cancelled() {
                return Err(RecommenderError::Cancelled);
            }
            let Some(post_id) = record.get("_id").and_then(|v| v.as_str()) else {
                continue;
            };
            match self
                .post_inner(post_id, PostWeights::default(), &mut stack, cancel)
                .await
            {
                Ok(vector) => post_vectors.push((1.0, vector)),
                Err(RecommenderError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        if !post_vectors.is_empty() {
            pairs.push((weights.posts, scaled_avg(&post_vectors)?));
        }

        let vector = scaled_avg(&pairs)?;
        self.write_cache(collections::THREADS, id, &vector).await?;
        Ok(vector)
    }

    pub async fn interest_embedding(&self, id: &str) -> Result<Vec<f32>> {
        self.named_embedding(collections::INTERESTS, id).await
    }

    pub async fn key_embedding(&self, id: &str) -> Result<Vec<f32>> {
        self.named_embedding(collections::KEYS, id).await
    }

    fn user_inner<'a>(
        &'a self,
        id: &'a str,
        weights: UserWeights,
        stack: &'a mut HashSet<String>,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Vec<f32>>> {
        async move {
            if cancel.is_cancelled() {
                return Err(RecommenderError::Cancelled);
            }
            let user: User = self.fetch(collections::USERS, id).await?;
            if let Some(cached) = &user.embedding {
                if cached.is_fresh(self.ttl, Utc::now()) && cached.vector.len() == self.dim() {
                    return Ok(cached.vector.clone());
                }
            }
            // Reentry through the follow graph: fall back to the base
            // composition so the recursion terminates.
            if stack.contains(id) {
                return self.base_user_embedding(&user, weights).await;
            }
            stack.insert(id.to_string());
            let composed = self.compose_user(&user, weights, stack, cancel).await;
            stack.remove(id);
            let vector = composed?;
            self.write_cache(collections::USERS, id, &vector).await?;
            Ok(vector)
        }
        .boxed()
    }

    async fn compose_user(
        &self,
        user: &User,
        weights: UserWeights,
        stack: &mut HashSet<String>,
        cancel: &CancellationToken,
    ) -> Result<Vec<f32>> {
        let mut pairs: Vec<(f64, Vec<f32>)> = Vec::new();
        if let Some(mean) = self.interest_mean(&user.interests).await? {
            pairs.push((weights.interests, mean));
        }
        let description = user.description.as_deref().unwrap_or("");
        pairs.push((weights.description, self.encoder.encode(description).await?));

        let mut follow_vectors: Vec<(f64, Vec<f32>)> = Vec::new();
        for followed in &user.follow {
            if cancel.is_cancelled() {
                return Err(RecommenderError::Cancelled);
            }
            match self.user_inner(followed, weights, stack, cancel).await {
                Ok(vector) => follow_vectors.push((1.0, vector)),
                Err(RecommenderError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        if !follow_vectors.is_empty() {
            pairs.push((weights.follows, scaled_avg(&follow_vectors)?));
        }
        scaled_avg(&pairs)
    }

    /// User embedding without the follow term, remaining weights renormalized
    /// to sum to 1. Not cached: it is a partial value only used to break
    /// cycles.
    async fn base_user_embedding(&self, user: &User, weights: UserWeights) -> Result<Vec<f32>> {
        let denom = weights.interests + weights.description;
        let (w_interests, w_description) = if denom > 0.0 {
            (weights.interests / denom, weights.description / denom)
        } else {
            (0.5, 0.5)
        };
        let mut pairs: Vec<(f64, Vec<f32>)> = Vec::new();
        if let Some(mean) = self.interest_mean(&user.interests).await? {
            pairs.push((w_interests, mean));
        }
        let description = user.description.as_deref().unwrap_or("");
        pairs.push((w_description, self.encoder.encode(description).await?));
        scaled_avg(&pairs)
    }

    async fn interest_mean(&self, interest_ids: &[String]) -> Result<Option<Vec<f32>>> {
        let mut vectors: Vec<(f64, Vec<f32>)> = Vec::new();
        for interest_id in interest_ids {
            match self.interest_embedding(interest_id).await {
                Ok(vector) => vectors.push((1.0, vector)),
                Err(RecommenderError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        if vectors.is_empty() {
            return Ok(None);
        }
        Ok(Some(scaled_avg(&vectors)?))
    }

    fn post_inner<'a>(
        &'a self,
        id: &'a str,
        weights: PostWeights,
        stack: &'a mut HashSet<String>,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Vec<f32>>> {
        async move {
            if cancel.is_cancelled() {
                return Err(RecommenderError::Cancelled);
            }
            let post: Post = self.fetch(collections::POSTS, id).await?;
            if let Some(cached) = &post.embedding {
                if cached.is_fresh(self.ttl, Utc::now()) && cached.vector.len() == self.dim() {
                    return Ok(cached.vector.clone());
                }
            }

            let mut pairs: Vec<(f64, Vec<f32>)> = Vec::new();
            let mut key_vectors: Vec<(f64, Vec<f32>)> = Vec::new();
            for key_id in &post.keys {
                match self.key_embedding(key_id).await {
                    Ok(vector) => key_vectors.push((1.0, vector)),
                    Err(RecommenderError::NotFound(_)) => {}
                    Err(e) => return Err(e),
                }
            }
            if !key_vectors.is_empty() {
                pairs.push((weights.keys, scaled_avg(&key_vectors)?));
            }

            let title = post.title.as_deref().unwrap_or("");
            pairs.push((
                weights.title,
                self.encoder.encode(&format!("Title:\n{}", title)).await?,
            ));
            let content = post.content.as_deref().unwrap_or("");
            pairs.push((
                weights.content,
                self.encoder
                    .encode(&format!("Content:\n{}", content))
                    .await?,
            ));

            if let Some(author) = &post.id_author {
                match self
                    .user_inner(author, UserWeights::default(), stack, cancel)
                    .await
                {
                    Ok(vector) => pairs.push((weights.author, vector)),
                    Err(RecommenderError::NotFound(_)) => {}
                    Err(e) => return Err(e),
                }
            }

            let vector = scaled_avg(&pairs)?;
            self.write_cache(collections::POSTS, id, &vector).await?;
            Ok(vector)
        }
        .boxed()
    }

    async fn named_embedding(&self, collection: &str, id: &str) -> Result<Vec<f32>> {
        let entity: NamedEntity = self.fetch(collection, id).await?;
        if let Some(cached) = &entity.embedding {
            if cached.is_fresh(self.ttl, Utc::now()) && cached.vector.len() == self.dim() {
                return Ok(cached.vector.clone());
            }
        }
        let vector = self
            .encoder
            .encode(entity.name.as_deref().unwrap_or(""))
            .await?;
        self.write_cache(collection, id, &vector).await?;
        Ok(vector)
    }

    async fn fetch<T: serde::de::DeserializeOwned>(&self, collection: &str, id: &str) -> Result<T> {
        let record = self
            .store
            .get(collection, id)
            .await?
            .ok_or_else(|| RecommenderError::NotFound(format!("{}/{}", collection, id)))?;
        serde_json::from_value(record)
            .map_err(|e| RecommenderError::StoreFault(format!("{} decode: {}", collection, e)))
    }

    /// Competing writers for the same record are serialized through a striped
    /// lock; the write itself is a single-document overwrite, so last writer
    /// wins with a consistent value.
    async fn write_cache(&self, collection: &str, id: &str, vector: &[f32]) -> Result<()> {
        let stripe = {
            let mut hasher = DefaultHasher::new();
            collection.hash(&mut hasher);
            id.hash(&mut hasher);
            (hasher.finish() as usize) % WRITE_LOCK_STRIPES
        };
        let _guard = self.write_locks[stripe].lock().await;
        self.store
            .update_embedding(collection, id, vector, Utc::now())
            .await
    }
}
