use std::collections::HashSet;

use neo4rs::query;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{RecommenderError, Result};
use crate::graph::GraphClient;
use crate::vector::{rank_ids, validate_weights};

const USER_FOLLOWS: &str =
    "MATCH (u:User {id: $id})-[:FOLLOWS]->(v:User) RETURN v.id AS id";
const USER_INTERESTS: &str =
    "MATCH (u:User {id: $id})-[:INTERESTED_BY]->(i:Interest) RETURN i.id AS id";
const USER_TAGS: &str =
    "MATCH (u:User {id: $id})-[:WRITED_BY]->(p:Post)-[:HAS_KEY]->(k:Key) RETURN DISTINCT k.id AS id";
const POST_TAGS: &str = "MATCH (p:Post {id: $id})-[:HAS_KEY]->(k:Key) RETURN k.id AS id";
const POST_AUTHOR: &str =
    "MATCH (u:User)-[:WRITED_BY]->(p:Post {id: $id}) RETURN u.id AS id LIMIT 1";
const USER_CANDIDATES: &str =
    "MATCH (v:User) WHERE v.id <> $id RETURN v.id AS id ORDER BY id LIMIT $limit";
const POST_CANDIDATES: &str =
    "MATCH (p:Post) RETURN p.id AS id ORDER BY id SKIP $skip LIMIT $limit";

#[derive(Debug, Clone, Copy)]
pub struct JaccardUserParams {
    pub follow_weight: f64,
    pub interest_weight: f64,
    /// Candidate sampling bound applied before scoring.
    pub candidate_limit: i64,
    pub limit: usize,
}

impl Default for JaccardUserParams {
    fn default() -> Self {
        Self {
            follow_weight: 0.4,
            interest_weight: 0.6,
            candidate_limit: 20,
            limit: 10,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct JaccardPostParams {
    pub skip: i64,
    pub limit: i64,
    /// Seeds the shuffle pass; entropy-seeded when absent.
    pub seed: Option<u64>,
}

impl Default for JaccardPostParams {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: 10,
            seed: None,
        }
    }
}

/// Jaccard similarity over id sets; 0 when the union is empty.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Combined user score. The weighted sum is halved; ranking parity for
/// existing clients depends on that exact scale.
pub fn user_score(
    follows_jaccard: f64,
    interests_jaccard: f64,
    follow_weight: f64,
    interest_weight: f64,
) -> f64 {
    (follows_jaccard * follow_weight + interests_jaccard * interest_weight) / 2.0
}

/// Walks the ranked list once; each index has an independent 0.2 chance of
/// receiving the current tail element.
pub fn shuffle_pass<R: Rng>(ids: &mut Vec<String>, rng: &mut R) {
    for index in 0..ids.len() {
        if rng.gen::<f64>() >= 0.8 {
            if let Some(last) = ids.pop() {
                ids.insert(index, last);
            }
        }
    }
}

/// Jaccard-similarity engine over the projected graph.
pub struct JaccardEngine {
    graph: GraphClient,
}

impl JaccardEngine {
    pub fn new(graph: GraphClient) -> Self {
        Self { graph }
    }

    pub async fn recommend_users(
        &self,
        user_id: &str,
        params: JaccardUserParams,
    ) -> Result<Vec<String>> {
        validate_weights(&[params.follow_weight, params.interest_weight])?;
        let user_follows = self.id_set(USER_FOLLOWS, user_id).await?;
        let user_interests = self.id_set(USER_INTERESTS, user_id).await?;
        let id = user_id.to_string();
        let candidates = self
            .graph
            .collect_ids(
                || {
                    query(USER_CANDIDATES)
                        .param("id", id.clone())
                        .param("limit", params.candidate_limit)
                },
                "id",
            )
            .await?;

        let mut scored = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let follows = self.id_set(USER_FOLLOWS, &candidate).await?;
            let interests = self.id_set(USER_INTERESTS, &candidate).await?;
            let score = user_score(
                jaccard(&user_follows, &follows),
                jaccard(&user_interests, &interests),
                params.follow_weight,
                params.interest_weight,
            );
            scored.push((candidate, score));
        }
        Ok(rank_ids(scored, params.limit))
    }

    pub async fn recommend_posts(
        &self,
        user_id: &str,
        params: JaccardPostParams,
    ) -> Result<Vec<String>> {
        let candidates = self
            .graph
            .collect_ids(
                || {
                    query(POST_CANDIDATES)
                        .param("skip", params.skip)
                        .param("limit", params.limit)
                },
                "id",
            )
            .await?;

        let user_tags = self.id_set(USER_TAGS, user_id).await?;
        let mut scored = Vec::with_capacity(candidates.len());
        if user_tags.is_empty() {
            // No authored tags yet: fall back to comparing interests with
            // each post's author.
            let user_interests = self.id_set(USER_INTERESTS, user_id).await?;
            for candidate in candidates {
                let author = self.post_author(&candidate).await?;
                let score = match author {
                    Some(author_id) => {
                        let author_interests = self.id_set(USER_INTERESTS, &author_id).await?;
                        jaccard(&user_interests, &author_interests)
                    }
                    None => 0.0,
                };
                scored.push((candidate, score));
            }
        } else {
            for candidate in candidates {
                let post_tags = self.id_set(POST_TAGS, &candidate).await?;
                scored.push((candidate, jaccard(&user_tags, &post_tags)));
            }
        }

        let count = scored.len();
        let mut ranked = rank_ids(scored, count);
        let mut rng = match params.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        shuffle_pass(&mut ranked, &mut rng);
        Ok(ranked)
    }

    pub async fn recommend_threads(&self, _user_id: &str, _limit: usize) -> Result<Vec<String>> {
        Err(RecommenderError::InvalidParam(
            "the JA engine does not rank threads".to_string(),
        ))
    }

    async fn id_set(&self, statement: &'static str, id: &str) -> Result<HashSet<String>> {
        let id = id.to_string();
        self.graph
            .collect_id_set(|| query(statement).param("id", id.clone()), "id")
            .await
    }

    async fn post_author(&self, post_id: &str) -> Result<Option<String>> {
        let id = post_id.to_string();
        let authors = self
            .graph
            .collect_ids(|| query(POST_AUTHOR).param("id", id.clone()), "id")
            .await?;
        Ok(authors.into_iter().next())
    }
}
