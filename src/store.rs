use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use bson::{doc, Document};
use chrono::{DateTime, Utc};
use futures::stream::TryStreamExt;
use mongodb::options::FindOptions;
use mongodb::{Client, Collection, Database};
use serde_json::Value;

use crate::error::{RecommenderError, Result};

/// Transport-fault backoff schedule in milliseconds. One pass through the
/// schedule, then the fault surfaces as `StoreFault`.
pub(crate) const RETRY_BACKOFF_MS: [u64; 2] = [100, 400];

/// Read/write access to the JSON-like records backing the social graph.
///
/// `get` returns `Ok(None)` for unknown ids (non-retryable by definition);
/// transport faults are retried per `RETRY_BACKOFF_MS` before surfacing.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>>;

    /// Equality-filtered scan. `projection` limits the returned fields
    /// (the `_id` field is always included); empty means full documents.
    async fn find(&self, collection: &str, filter: Value, projection: &[&str])
        -> Result<Vec<Value>>;

    /// Atomic overwrite of the `embedding` sub-document.
    async fn update_embedding(
        &self,
        collection: &str,
        id: &str,
        vector: &[f32],
        timestamp: DateTime<Utc>,
    ) -> Result<()>;
}

#[derive(Clone)]
pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    pub async fn connect(uri: &str, database: &str) -> Result<Self> {
        let client = Client::with_uri_str(uri).await?;
        let db = client.database(database);
        tracing::info!(database = %database, "connected to document store");
        Ok(Self { db })
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.db.collection::<Document>(name)
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        let coll = self.collection(collection);
        let filter = doc! { "_id": id };
        let mut attempt = 0;
        let found = loop {
            match coll.find_one(filter.clone(), None).await {
                Ok(found) => break found,
                Err(e) if attempt < RETRY_BACKOFF_MS.len() => {
                    tracing::warn!(collection = %collection, error = %e, "document read failed, retrying");
                    tokio::time::sleep(std::time::Duration::from_millis(RETRY_BACKOFF_MS[attempt]))
                        .await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        };
        match found {
            Some(document) => Ok(Some(serde_json::to_value(document).map_err(|e| {
                RecommenderError::StoreFault(format!("document decode: {}", e))
            })?)),
            None => Ok(None),
        }
    }

    async fn find(
        &self,
        collection: &str,
        filter: Value,
        projection: &[&str],
    ) -> Result<Vec<Value>> {
        let coll = self.collection(collection);
        let filter_doc = bson::to_document(&filter)
            .map_err(|e| RecommenderError::StoreFault(format!("filter encode: {}", e)))?;
        let options = if projection.is_empty() {
            None
        } else {
            let mut fields = doc! { "_id": 1 };
            for field in projection {
                fields.insert(*field, 1);
            }
            Some(FindOptions::builder().projection(fields).build())
        };
        let mut attempt = 0;
        let mut cursor = loop {
            match coll.find(filter_doc.clone(), options.clone()).await {
                Ok(cursor) => break cursor,
                Err(e) if attempt < RETRY_BACKOFF_MS.len() => {
                    tracing::warn!(collection = %collection, error = %e, "document scan failed, retrying");
                    tokio::time::sleep(std::time::Duration::from_millis(RETRY_BACKOFF_MS[attempt]))
                        .await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        };
        let mut records = Vec::new();
        while let Some(document) = cursor.try_next().await? {
            records.push(serde_json::to_value(document).map_err(|e| {
                RecommenderError::StoreFault(format!("document decode: {}", e))
            })?);
        }
        Ok(records)
    }

    async fn update_embedding(
        &self,
        collection: &str,
        id: &str,
        vector: &[f32],
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        let coll = self.collection(collection);
        let values: Vec<f64> = vector.iter().map(|v| *v as f64).collect();
        let update = doc! {
            "$set": {
                "embedding": {
                    "date": timestamp.to_rfc3339(),
                    "vector": values,
                }
            }
        };
        let filter = doc! { "_id": id };
        let mut attempt = 0;
        loop {
            match coll.update_one(filter.clone(), update.clone(), None).await {
                Ok(_) => return Ok(()),
                Err(e) if attempt < RETRY_BACKOFF_MS.len() => {
                    tracing::warn!(collection = %collection, id = %id, error = %e, "embedding write failed, retrying");
                    tokio::time::sleep(std::time::Duration::from_millis(RETRY_BACKOFF_MS[attempt]))
                        .await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// In-memory store for tests and fixtures. Counts reads so tests can assert
/// that guard failures never touch the store.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, HashMap<String, Value>>>,
    reads: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, collection: &str, id: &str, mut record: Value) {
        if let Some(map) = record.as_object_mut() {
            map.insert("_id".to_string(), Value::String(id.to_string()));
        }
        self.collections
            .write()
            .expect("memory store poisoned")
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), record);
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn matches(record: &Value, filter: &Value) -> bool {
        match filter.as_object() {
            Some(map) => map
                .iter()
                .all(|(key, expected)| record.get(key) == Some(expected)),
            None => true,
        }
    }

    fn project(record: &Value, projection: &[&str]) -> Value {
        if projection.is_empty() {
            return record.clone();
        }
        let mut out = serde_json::Map::new();
        if let Some(map) = record.as_object() {
            if let Some(id) = map.get("_id") {
                out.insert("_id".to_string(), id.clone());
            }
            for field in projection {
                if let Some(value) = map.get(*field) {
                    out.insert((*field).to_string(), value.clone());
                }
            }
        }
        Value::Object(out)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let collections = self.collections.read().expect("memory store poisoned");
        Ok(collections
            .get(collection)
            .and_then(|records| records.get(id))
            .cloned())
    }

    async fn find(
        &self,
        collection: &str,
        filter: Value,
        projection: &[&str],
    ) -> Result<Vec<Value>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let collections = self.collections.read().expect("memory store poisoned");
        let mut records: Vec<(String, Value)> = collections
            .get(collection)
            .map(|all| {
                all.iter()
                    .filter(|(_, record)| Self::matches(record, &filter))
                    .map(|(id, record)| (id.clone(), Self::project(record, projection)))
                    .collect()
            })
            .unwrap_or_default();
        // Deterministic iteration order for fixtures
        records.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(records.into_iter().map(|(_, record)| record).collect())
    }

    async fn update_embedding(
        &self,
        collection: &str,
        id: &str,
        vector: &[f32],
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        let mut collections = self.collections.write().expect("memory store poisoned");
        let record = collections
            .get_mut(collection)
            .and_then(|records| records.get_mut(id))
            .ok_or_else(|| RecommenderError::NotFound(format!("{}/{}", collection, id)))?;
        if let Some(map) = record.as_object_mut() {
            map.insert(
                "embedding".to_string(),
                serde_json::json!({
                    "date": timestamp.to_rfc3339(),
                    "vector": vector,
                }),
            );
        }
        Ok(())
    }
}
