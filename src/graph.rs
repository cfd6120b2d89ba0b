use std::collections::HashSet;

use neo4rs::{query, BoltList, BoltMap, BoltNull, BoltType, Graph, Query};
use serde_json::Value;

use crate::config::Config;
use crate::error::{RecommenderError, Result};
use crate::store::RETRY_BACKOFF_MS;

/// Uniqueness constraints for the projected graph view. Node label plus key
/// property form the unique identifier of every projected entity.
pub const CONSTRAINTS: [&str; 6] = [
    "CREATE CONSTRAINT IF NOT EXISTS FOR (u:User) REQUIRE u.id IS UNIQUE",
    "CREATE CONSTRAINT IF NOT EXISTS FOR (p:Post) REQUIRE p.id IS UNIQUE",
    "CREATE CONSTRAINT IF NOT EXISTS FOR (t:Thread) REQUIRE t.id IS UNIQUE",
    "CREATE CONSTRAINT IF NOT EXISTS FOR (k:Key) REQUIRE k.id IS UNIQUE",
    "CREATE CONSTRAINT IF NOT EXISTS FOR (i:Interest) REQUIRE i.id IS UNIQUE",
    "CREATE CONSTRAINT IF NOT EXISTS FOR (r:Role) REQUIRE r.name IS UNIQUE",
];

/// Thin wrapper over the bolt driver. Every call runs as its own short-lived
/// logical session drawn from the driver's pool; transport faults are retried
/// per the shared backoff schedule before surfacing as `StoreFault`.
#[derive(Clone)]
pub struct GraphClient {
    inner: Graph,
}

impl GraphClient {
    pub async fn connect(cfg: &Config) -> Result<Self> {
        let inner = Graph::new(&cfg.neo4j_uri, &cfg.neo4j_user, &cfg.neo4j_password).await?;
        tracing::info!(uri = %cfg.neo4j_uri, "connected to graph store");
        Ok(Self { inner })
    }

    pub async fn ensure_constraints(&self) -> Result<()> {
        for constraint in CONSTRAINTS {
            self.run(|| query(constraint)).await?;
        }
        tracing::info!(count = CONSTRAINTS.len(), "graph constraints ensured");
        Ok(())
    }

    /// Executes a write query, discarding any rows.
    pub async fn run<F>(&self, build: F) -> Result<()>
    where
        F: Fn() -> Query,
    {
        let mut attempt = 0;
        loop {
            match self.inner.run(build()).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < RETRY_BACKOFF_MS.len() => {
                    tracing::warn!(error = %e, "graph write failed, retrying");
                    tokio::time::sleep(std::time::Duration::from_millis(RETRY_BACKOFF_MS[attempt]))
                        .await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Executes a read query and collects one string column.
    pub async fn collect_ids<F>(&self, build: F, column: &str) -> Result<Vec<String>>
    where
        F: Fn() -> Query,
    {
        let mut attempt = 0;
        loop {
            match self.try_collect_ids(build(), column).await {
                Ok(ids) => return Ok(ids),
                Err(e) if attempt < RETRY_BACKOFF_MS.len() => {
                    tracing::warn!(error = %e, "graph read failed, retrying");
                    tokio::time::sleep(std::time::Duration::from_millis(RETRY_BACKOFF_MS[attempt]))
                        .await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn collect_id_set<F>(&self, build: F, column: &str) -> Result<HashSet<String>>
    where
        F: Fn() -> Query,
    {
        Ok(self.collect_ids(build, column).await?.into_iter().collect())
    }

    async fn try_collect_ids(&self, q: Query, column: &str) -> Result<Vec<String>> {
        let mut stream = self.inner.execute(q).await?;
        let mut ids = Vec::new();
        while let Some(row) = stream.next().await? {
            let id: String = row
                .get(column)
                .map_err(|e| RecommenderError::StoreFault(format!("row decode: {}", e)))?;
            ids.push(id);
        }
        Ok(ids)
    }
}

/// Converts JSON values into bolt parameters (`SET n += $props` payloads).
pub fn json_to_bolt(value: &Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(BoltNull),
        Value::Bool(b) => (*b).into(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.into()
            } else {
                n.as_f64().unwrap_or(0.0).into()
            }
        }
        Value::String(s) => s.clone().into(),
        Value::Array(items) => {
            let mut list = BoltList::new();
            for item in items {
                list.push(json_to_bolt(item));
            }
            BoltType::List(list)
        }
        Value::Object(map) => {
            let mut bolt = BoltMap::new();
            for (key, item) in map {
                bolt.put(key.clone().into(), json_to_bolt(item));
            }
            BoltType::Map(bolt)
        }
    }
}
