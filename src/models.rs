use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Embedding cached on the owning document under the `embedding` key.
/// `date` is an ISO-8601 timestamp; entries older than the TTL are stale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedEmbedding {
    pub date: String,
    pub vector: Vec<f32>,
}

impl CachedEmbedding {
    pub fn new(vector: Vec<f32>, timestamp: DateTime<Utc>) -> Self {
        Self {
            date: timestamp.to_rfc3339(),
            vector,
        }
    }

    pub fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        match DateTime::parse_from_rfc3339(&self.date) {
            Ok(created) => now.signed_duration_since(created.with_timezone(&Utc)) < ttl,
            Err(_) => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub follow: Vec<String>,
    #[serde(default)]
    pub blocked: Vec<String>,
    #[serde(default)]
    pub embedding: Option<CachedEmbedding>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub id_thread: Option<String>,
    #[serde(default)]
    pub id_author: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub likes: Vec<String>,
    #[serde(default)]
    pub comments: Vec<String>,
    #[serde(default)]
    pub embedding: Option<CachedEmbedding>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub id_owner: Option<String>,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub admins: Vec<String>,
    #[serde(default)]
    pub embedding: Option<CachedEmbedding>,
}

/// Interests and keys (tags) share the same shape: a named node with an
/// optional cached embedding of the name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedEntity {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub embedding: Option<CachedEmbedding>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub extend: Vec<String>,
}

/// Collection namespaces in the document store.
pub mod collections {
    pub const USERS: &str = "users";
    pub const POSTS: &str = "posts";
    pub const THREADS: &str = "threads";
    pub const INTERESTS: &str = "interests";
    pub const KEYS: &str = "keys";
    pub const ROLES: &str = "roles";
}
