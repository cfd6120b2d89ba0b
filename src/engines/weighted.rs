use neo4rs::query;

use crate::error::Result;
use crate::graph::GraphClient;
use crate::vector::validate_weights;

/// Scores users both parties follow (mutual targets) and shared interests.
pub const USERS_QUERY: &str = "\
MATCH (u:User {id: $user_id}) \
MATCH (v:User) WHERE v.id <> $user_id \
OPTIONAL MATCH (u)-[:INTERESTED_BY]->(i:Interest)<-[:INTERESTED_BY]-(v) \
WITH u, v, count(DISTINCT i) AS common_interests \
OPTIONAL MATCH (u)-[:FOLLOWS]->(f:User)<-[:FOLLOWS]-(v) \
WITH v, common_interests, count(DISTINCT f) AS common_follows \
RETURN v.id AS id, \
       ($follow_weight * common_follows + $interest_weight * common_interests) AS score \
ORDER BY score DESC, id ASC \
LIMIT $limit";

/// Interest overlap joins on id equality: tags and interests are distinct
/// node kinds sharing one id space.
pub const POSTS_QUERY: &str = "\
MATCH (p:Post) \
OPTIONAL MATCH (u:User {id: $user_id})-[:INTERESTED_BY]->(i:Interest), (p)-[:HAS_KEY]->(k:Key) \
WHERE i.id = k.id \
WITH p, count(DISTINCT k) AS interest_score \
OPTIONAL MATCH (u2:User {id: $user_id})-[r:LIKES|HAS_COMMENT]->(p) \
WITH p, interest_score, count(r) AS interaction_score \
RETURN p.id AS id, \
       ($interest_weight * interest_score + $interaction_weight * interaction_score) AS score \
ORDER BY score DESC, id ASC \
LIMIT $limit";

/// Thread tag edges are not produced by the projector, so the interest term
/// counts zero matches. The term stays in the query so the behavior is an
/// empty overlap, not an error.
pub const THREADS_QUERY: &str = "\
MATCH (t:Thread) \
OPTIONAL MATCH (u:User {id: $user_id})-[:MEMBER_OF]->(t)<-[:MEMBER_OF]-(v:User) \
WHERE v.id <> $user_id \
WITH t, count(DISTINCT v) AS member_score \
OPTIONAL MATCH (u2:User {id: $user_id})-[:INTERESTED_BY]->(i:Interest), (t)-[:HAS_KEY]->(k:Key) \
WHERE i.id = k.id \
WITH t, member_score, count(DISTINCT k) AS interest_score \
RETURN t.id AS id, \
       ($member_weight * member_score + $interest_weight * interest_score) AS score \
ORDER BY score DESC, id ASC \
LIMIT $limit";

#[derive(Debug, Clone, Copy)]
pub struct WeightedUserParams {
    pub follow_weight: f64,
    pub interest_weight: f64,
    pub limit: i64,
}

impl Default for WeightedUserParams {
    fn default() -> Self {
        Self {
            follow_weight: 0.5,
            interest_weight: 0.5,
            limit: 10,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WeightedPostParams {
    pub interest_weight: f64,
    pub interaction_weight: f64,
    pub limit: i64,
}

impl Default for WeightedPostParams {
    fn default() -> Self {
        Self {
            interest_weight: 0.7,
            interaction_weight: 0.3,
            limit: 10,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WeightedThreadParams {
    pub member_weight: f64,
    pub interest_weight: f64,
    pub limit: i64,
}

impl Default for WeightedThreadParams {
    fn default() -> Self {
        Self {
            member_weight: 0.6,
            interest_weight: 0.4,
            limit: 10,
        }
    }
}

/// Weighted-count engine: scoring is pushed into the graph store as
/// parameterized queries; the result arrives already ranked.
pub struct WeightedCountEngine {
    graph: GraphClient,
}

impl WeightedCountEngine {
    pub fn new(graph: GraphClient) -> Self {
        Self { graph }
    }

    pub async fn recommend_users(
        &self,
        user_id: &str,
        params: WeightedUserParams,
    ) -> Result<Vec<String>> {
        validate_weights(&[params.follow_weight, params.interest_weight])?;
        let id = user_id.to_string();
        self.graph
            .collect_ids(
                || {
                    query(USERS_QUERY)
                        .param("user_id", id.clone())
                        .param("follow_weight", params.follow_weight)
                        .param("interest_weight", params.interest_weight)
                        .param("limit", params.limit)
                },
                "id",
            )
            .await
    }

    pub async fn recommend_posts(
        &self,
        user_id: &str,
        params: WeightedPostParams,
    ) -> Result<Vec<String>> {
        validate_weights(&[params.interest_weight, params.interaction_weight])?;
        let id = user_id.to_string();
        self.graph
            .collect_ids(
                || {
                    query(POSTS_QUERY)
                        .param("user_id", id.clone())
                        .param("interest_weight", params.interest_weight)
                        .param("interaction_weight", params.interaction_weight)
                        .param("limit", params.limit)
                },
                "id",
            )
            .await
    }

    pub async fn recommend_threads(
        &self,
        user_id: &str,
        params: WeightedThreadParams,
    ) -> Result<Vec<String>> {
        validate_weights(&[params.member_weight, params.interest_weight])?;
        let id = user_id.to_string();
        self.graph
            .collect_ids(
                || {
                    query(THREADS_QUERY)
                        .param("user_id", id.clone())
                        .param("member_weight", params.member_weight)
                        .param("interest_weight", params.interest_weight)
                        .param("limit", params.limit)
                },
                "id",
            )
            .await
    }
}
