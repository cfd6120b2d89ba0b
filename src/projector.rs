use std::sync::Arc;

use neo4rs::query;
use serde_json::Value;

use crate::error::{RecommenderError, Result};
use crate::graph::{json_to_bolt, GraphClient};
use crate::models::{collections, Post, Role, Thread, User};
use crate::store::DocumentStore;

/// Projection order. Edges are MERGEd between already-existing endpoints, so
/// roles, interests and keys precede users, users precede threads, and
/// threads precede posts.
pub const STEP_ORDER: [&str; 6] = ["roles", "interests", "keys", "users", "threads", "posts"];

#[derive(Debug)]
pub struct StepReport {
    pub step: &'static str,
    pub records: usize,
}

#[derive(Debug, Default)]
pub struct SyncReport {
    pub steps: Vec<StepReport>,
}

/// Rebuilds the graph view from the document store.
///
/// Every statement uses MERGE, so repeated runs over identical input are
/// idempotent. Dangling references are skipped: the MATCH guard on edge
/// creation simply matches nothing. A failing statement aborts the run with
/// the step name and the offending record id; the partial graph is left in
/// place for the next run to converge.
pub struct Projector {
    store: Arc<dyn DocumentStore>,
    graph: GraphClient,
}

impl Projector {
    pub fn new(store: Arc<dyn DocumentStore>, graph: GraphClient) -> Self {
        Self { store, graph }
    }

    pub async fn run(&self, erase: bool) -> Result<SyncReport> {
        self.graph
            .ensure_constraints()
            .await
            .map_err(|e| step_error("constraints", "-", e))?;
        if erase {
            self.graph
                .run(|| query("MATCH (n) DETACH DELETE n"))
                .await
                .map_err(|e| step_error("erase", "-", e))?;
            tracing::info!("graph erased for full rebuild");
        }
        let mut report = SyncReport::default();
        report.steps.push(StepReport {
            step: "roles",
            records: self.sync_roles().await?,
        });
        report.steps.push(StepReport {
            step: "interests",
            records: self.sync_interests().await?,
        });
        report.steps.push(StepReport {
            step: "keys",
            records: self.sync_keys().await?,
        });
        report.steps.push(StepReport {
            step: "users",
            records: self.sync_users().await?,
        });
        report.steps.push(StepReport {
            step: "threads",
            records: self.sync_threads().await?,
        });
        report.steps.push(StepReport {
            step: "posts",
            records: self.sync_posts().await?,
        });
        tracing::info!("graph projection completed");
        Ok(report)
    }

    async fn sync_roles(&self) -> Result<usize> {
        let records = self.scan("roles", collections::ROLES).await?;
        let mut count = 0;
        for record in records {
            let role: Role = parse_record("roles", &record)?;
            let props = node_props(&record, &["_id", "name", "extend"]);
            let name = role.name.clone();
            self.graph
                .run(|| {
                    query("MERGE (r:Role {name: $name}) SET r += $props")
                        .param("name", name.clone())
                        .param("props", json_to_bolt(&props))
                })
                .await
                .map_err(|e| step_error("roles", &role.name, e))?;
            for extended in &role.extend {
                let (from, to) = (role.name.clone(), extended.clone());
                self.graph
                    .run(|| {
                        query(
                            "MATCH (r1:Role {name: $from}) \
                             MATCH (r2:Role {name: $to}) \
                             MERGE (r1)-[:EXTENDS]->(r2)",
                        )
                        .param("from", from.clone())
                        .param("to", to.clone())
                    })
                    .await
                    .map_err(|e| step_error("roles", &role.name, e))?;
            }
            count += 1;
        }
        tracing::info!(step = "roles", records = count, "projection step completed");
        Ok(count)
    }

    async fn sync_interests(&self) -> Result<usize> {
        self.sync_named("interests", collections::INTERESTS, "Interest")
            .await
    }

    async fn sync_keys(&self) -> Result<usize> {
        self.sync_named("keys", collections::KEYS, "Key").await
    }

    async fn sync_named(
        &self,
        step: &'static str,
        collection: &str,
        label: &str,
    ) -> Result<usize> {
        let records = self.scan(step, collection).await?;
        let mut count = 0;
        for record in records {
            let id = record_id(step, &record)?;
            let props = node_props(&record, &["_id", "embedding"]);
            let statement = format!("MERGE (n:{} {{id: $id}}) SET n += $props", label);
            self.graph
                .run(|| {
                    query(&statement)
                        .param("id", id.clone())
                        .param("props", json_to_bolt(&props))
                })
                .await
                .map_err(|e| step_error(step, &id, e))?;
            count += 1;
        }
        tracing::info!(step = step, records = count, "projection step completed");
        Ok(count)
    }

    async fn sync_users(&self) -> Result<usize> {
        let records = self.scan("users", collections::USERS).await?;
        let mut count = 0;
        for record in records {
            let user: User = parse_record("users", &record)?;
            let props = node_props(
                &record,
                &[
                    "_id",
                    "role",
                    "follow",
                    "blocked",
                    "interests",
                    "password",
                    "embedding",
                ],
            );
            let id = user.id.clone();
            self.graph
                .run(|| {
                    query("MERGE (u:User {id: $id}) SET u += $props")
                        .param("id", id.clone())
                        .param("props", json_to_bolt(&props))
                })
                .await
                .map_err(|e| step_error("users", &user.id, e))?;
            if let Some(role) = &user.role {
                self.edge(
                    "users",
                    &user.id,
                    "MATCH (u:User {id: $from}) \
                     MATCH (r:Role {name: $to}) \
                     MERGE (u)-[:HAS_ROLE]->(r)",
                    &user.id,
                    role,
                )
                .await?;
            }
            for followed in &user.follow {
                // follow and block are irreflexive
                if followed == &user.id {
                    continue;
                }
                self.edge(
                    "users",
                    &user.id,
                    "MATCH (u1:User {id: $from}) \
                     MATCH (u2:User {id: $to}) \
                     MERGE (u1)-[:FOLLOWS]->(u2)",
                    &user.id,
                    followed,
                )
                .await?;
            }
            for blocked in &user.blocked {
                if blocked == &user.id {
                    continue;
                }
                self.edge(
                    "users",
                    &user.id,
                    "MATCH (u1:User {id: $from}) \
                     MATCH (u2:User {id: $to}) \
                     MERGE (u1)-[:BLOCKS]->(u2)",
                    &user.id,
                    blocked,
                )
                .await?;
            }
            for interest in &user.interests {
                self.edge(
                    "users",
                    &user.id,
                    "MATCH (u:User {id: $from}) \
                     MATCH (i:Interest {id: $to}) \
                     MERGE (u)-[:INTERESTED_BY]->(i)",
                    &user.id,
                    interest,
                )
                .await?;
            }
            count += 1;
        }
        tracing::info!(step = "users", records = count, "projection step completed");
        Ok(count)
    }

    async fn sync_threads(&self) -> Result<usize> {
        let records = self.scan("threads", collections::THREADS).await?;
        let mut count = 0;
        for record in records {
            let thread: Thread = parse_record("threads", &record)?;
            let props = node_props(
                &record,
                &["_id", "id_owner", "members", "admins", "embedding"],
            );
            let id = thread.id.clone();
            self.graph
                .run(|| {
                    query("MERGE (t:Thread {id: $id}) SET t += $props")
                        .param("id", id.clone())
                        .param("props", json_to_bolt(&props))
                })
                .await
                .map_err(|e| step_error("threads", &thread.id, e))?;
            if let Some(owner) = &thread.id_owner {
                self.edge(
                    "threads",
                    &thread.id,
                    "MATCH (u:User {id: $from}) \
                     MATCH (t:Thread {id: $to}) \
                     MERGE (u)-[:OWNS]->(t)",
                    owner,
                    &thread.id,
                )
                .await?;
            }
            for member in &thread.members {
                self.edge(
                    "threads",
                    &thread.id,
                    "MATCH (u:User {id: $from}) \
                     MATCH (t:Thread {id: $to}) \
                     MERGE (u)-[:MEMBER_OF]->(t)",
                    member,
                    &thread.id,
                )
                .await?;
            }
            for admin in &thread.admins {
                self.edge(
                    "threads",
                    &thread.id,
                    "MATCH (u:User {id: $from}) \
                     MATCH (t:Thread {id: $to}) \
                     MERGE (u)-[:ADMIN_OF]->(t)",
                    admin,
                    &thread.id,
                )
                .await?;
            }
            count += 1;
        }
        tracing::info!(step = "threads", records = count, "projection step completed");
        Ok(count)
    }

    async fn sync_posts(&self) -> Result<usize> {
        let records = self.scan("posts", collections::POSTS).await?;
        let mut count = 0;
        for record in records {
            let post: Post = parse_record("posts", &record)?;
            let props = node_props(
                &record,
                &[
                    "_id",
                    "id_thread",
                    "id_author",
                    "keys",
                    "likes",
                    "comments",
                    "embedding",
                ],
            );
            let id = post.id.clone();
            self.graph
                .run(|| {
                    query("MERGE (p:Post {id: $id}) SET p += $props")
                        .param("id", id.clone())
                        .param("props", json_to_bolt(&props))
                })
                .await
                .map_err(|e| step_error("posts", &post.id, e))?;
            if let Some(author) = &post.id_author {
                self.edge(
                    "posts",
                    &post.id,
                    "MATCH (u:User {id: $from}) \
                     MATCH (p:Post {id: $to}) \
                     MERGE (u)-[:WRITED_BY]->(p)",
                    author,
                    &post.id,
                )
                .await?;
            }
            if let Some(thread) = &post.id_thread {
                self.edge(
                    "posts",
                    &post.id,
                    "MATCH (p:Post {id: $from}) \
                     MATCH (t:Thread {id: $to}) \
                     MERGE (p)-[:POSTED_IN]->(t)",
                    &post.id,
                    thread,
                )
                .await?;
            }
            for key in &post.keys {
                self.edge(
                    "posts",
                    &post.id,
                    "MATCH (p:Post {id: $from}) \
                     MATCH (k:Key {id: $to}) \
                     MERGE (p)-[:HAS_KEY]->(k)",
                    &post.id,
                    key,
                )
                .await?;
            }
            for liker in &post.likes {
                self.edge(
                    "posts",
                    &post.id,
                    "MATCH (u:User {id: $from}) \
                     MATCH (p:Post {id: $to}) \
                     MERGE (u)-[:LIKES]->(p)",
                    liker,
                    &post.id,
                )
                .await?;
            }
            for commenter in &post.comments {
                self.edge(
                    "posts",
                    &post.id,
                    "MATCH (u:User {id: $from}) \
                     MATCH (p:Post {id: $to}) \
                     MERGE (u)-[:HAS_COMMENT]->(p)",
                    commenter,
                    &post.id,
                )
                .await?;
            }
            count += 1;
        }
        tracing::info!(step = "posts", records = count, "projection step completed");
        Ok(count)
    }

    async fn scan(&self, step: &'static str, collection: &str) -> Result<Vec<Value>> {
        self.store
            .find(collection, serde_json::json!({}), &[])
            .await
            .map_err(|e| step_error(step, "-", e))
    }

    async fn edge(
        &self,
        step: &'static str,
        record_id: &str,
        statement: &str,
        from: &str,
        to: &str,
    ) -> Result<()> {
        let (from, to) = (from.to_string(), to.to_string());
        self.graph
            .run(|| {
                query(statement)
                    .param("from", from.clone())
                    .param("to", to.clone())
            })
            .await
            .map_err(|e| step_error(step, record_id, e))
    }
}

fn step_error(step: &str, id: &str, e: RecommenderError) -> RecommenderError {
    RecommenderError::ProjectorStep {
        step: step.to_string(),
        id: id.to_string(),
        message: e.to_string(),
    }
}

fn parse_record<T: serde::de::DeserializeOwned>(step: &str, record: &Value) -> Result<T> {
    let id = record
        .get("_id")
        .and_then(|v| v.as_str())
        .unwrap_or("<unknown>")
        .to_string();
    serde_json::from_value(record.clone()).map_err(|e| {
        step_error(
            step,
            &id,
            RecommenderError::StoreFault(format!("decode: {}", e)),
        )
    })
}

fn record_id(step: &str, record: &Value) -> Result<String> {
    record
        .get("_id")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            step_error(
                step,
                "<unknown>",
                RecommenderError::InvalidParam("record missing _id".to_string()),
            )
        })
}

/// Node properties for `SET n += $props`: relationship-bearing and cache
/// fields are excluded, nested documents are not representable as node
/// properties and are dropped.
fn node_props(record: &Value, exclude: &[&str]) -> Value {
    let mut out = serde_json::Map::new();
    if let Some(map) = record.as_object() {
        for (key, value) in map {
            if exclude.contains(&key.as_str()) || value.is_object() {
                continue;
            }
            out.insert(key.clone(), value.clone());
        }
    }
    Value::Object(out)
}
