use recommender_service::engines::weighted::{POSTS_QUERY, THREADS_QUERY, USERS_QUERY};
use recommender_service::graph::CONSTRAINTS;
use recommender_service::projector::STEP_ORDER;

#[test]
fn constraints_cover_every_projected_label() {
    assert_eq!(CONSTRAINTS.len(), 6);
    for label in ["User", "Post", "Thread", "Key", "Interest"] {
        let needle = format!(":{})", label);
        assert!(
            CONSTRAINTS
                .iter()
                .any(|c| c.contains(&needle) && c.contains(".id IS UNIQUE")),
            "missing id constraint for {label}"
        );
    }
    assert!(CONSTRAINTS
        .iter()
        .any(|c| c.contains(":Role") && c.contains(".name IS UNIQUE")));
    for constraint in CONSTRAINTS {
        assert!(constraint.starts_with("CREATE CONSTRAINT IF NOT EXISTS"));
    }
}

#[test]
fn projection_steps_run_leaves_before_dependents() {
    assert_eq!(
        STEP_ORDER,
        ["roles", "interests", "keys", "users", "threads", "posts"]
    );
}

#[test]
fn weighted_queries_are_parameterized_and_ranked() {
    for query in [USERS_QUERY, POSTS_QUERY, THREADS_QUERY] {
        assert!(query.contains("$user_id"));
        assert!(query.contains("$limit"));
        assert!(query.contains("ORDER BY score DESC, id ASC"));
        // Parameterized only: no single-quoted literals anywhere.
        assert!(!query.contains('\''));
    }
}

#[test]
fn weighted_user_query_counts_mutual_targets() {
    assert!(USERS_QUERY.contains("(u)-[:FOLLOWS]->(f:User)<-[:FOLLOWS]-(v)"));
    assert!(USERS_QUERY.contains("common_follows"));
    assert!(USERS_QUERY.contains("common_interests"));
    assert!(USERS_QUERY.contains("v.id <> $user_id"));
}

#[test]
fn weighted_post_query_keeps_zero_overlap_candidates() {
    // All posts stay in the candidate set; overlap terms are optional so a
    // post with no shared tags scores 0 instead of dropping out.
    assert!(POSTS_QUERY.starts_with("MATCH (p:Post)"));
    assert!(POSTS_QUERY.contains("OPTIONAL MATCH"));
    assert!(POSTS_QUERY.contains("LIKES|HAS_COMMENT"));
    assert!(POSTS_QUERY.contains("i.id = k.id"));
}

#[test]
fn weighted_thread_query_tolerates_missing_tag_edges() {
    assert!(THREADS_QUERY.starts_with("MATCH (t:Thread)"));
    assert!(THREADS_QUERY.contains("MEMBER_OF"));
    assert!(THREADS_QUERY.contains("OPTIONAL MATCH"));
}
