use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use recommender_service::embedding::{EmbeddingBuilder, UserWeights};
use recommender_service::encoder::{HashingEncoder, TextEncoder};
use recommender_service::engines::EmbeddingEngine;
use recommender_service::error::RecommenderError;
use recommender_service::store::{DocumentStore, MemoryStore};
use recommender_service::vector::scaled_avg;

const DIM: usize = 32;

fn encoder() -> Arc<HashingEncoder> {
    Arc::new(HashingEncoder::new(DIM, "test-model"))
}

fn builder_with(store: Arc<MemoryStore>) -> EmbeddingBuilder {
    EmbeddingBuilder::new(store, encoder(), 2)
}

fn seed_interest(store: &MemoryStore, id: &str, name: &str) {
    store.insert("interests", id, json!({ "name": name }));
}

#[tokio::test]
async fn repeated_calls_return_identical_vectors() {
    let store = Arc::new(MemoryStore::new());
    seed_interest(&store, "i1", "rust");
    store.insert(
        "users",
        "u1",
        json!({
            "description": "systems programmer",
            "interests": ["i1"],
            "follow": [],
        }),
    );
    let builder = builder_with(store);
    let cancel = CancellationToken::new();

    let first = builder
        .user_embedding("u1", UserWeights::default(), &cancel)
        .await
        .expect("first");
    let second = builder
        .user_embedding("u1", UserWeights::default(), &cancel)
        .await
        .expect("second");

    assert_eq!(first.len(), DIM);
    assert_eq!(first, second);
}

#[tokio::test]
async fn fresh_cached_vector_is_returned_verbatim() {
    let store = Arc::new(MemoryStore::new());
    let sentinel = vec![0.5f32; DIM];
    store.insert(
        "users",
        "u1",
        json!({
            "description": "anything",
            "embedding": {
                "date": Utc::now().to_rfc3339(),
                "vector": sentinel,
            },
        }),
    );
    let builder = builder_with(store);
    let cancel = CancellationToken::new();

    let out = builder
        .user_embedding("u1", UserWeights::default(), &cancel)
        .await
        .expect("cached");
    assert_eq!(out, vec![0.5f32; DIM]);
}

#[tokio::test]
async fn stale_cached_vector_is_recomputed_and_overwritten() {
    let store = Arc::new(MemoryStore::new());
    let sentinel = vec![0.5f32; DIM];
    let stale = (Utc::now() - Duration::hours(3)).to_rfc3339();
    store.insert(
        "users",
        "u1",
        json!({
            "description": "late night gardener",
            "embedding": { "date": stale, "vector": sentinel },
        }),
    );
    let builder = builder_with(store.clone());
    let cancel = CancellationToken::new();

    let out = builder
        .user_embedding("u1", UserWeights::default(), &cancel)
        .await
        .expect("recompute");
    assert_ne!(out, vec![0.5f32; DIM]);

    // The overwritten cache now carries the recomputed vector.
    let record = store.get("users", "u1").await.expect("get").expect("doc");
    let cached: Vec<f32> = record["embedding"]["vector"]
        .as_array()
        .expect("vector")
        .iter()
        .map(|v| v.as_f64().unwrap() as f32)
        .collect();
    assert_eq!(cached, out);
}

#[tokio::test]
async fn missing_root_user_is_surfaced() {
    let store = Arc::new(MemoryStore::new());
    let builder = builder_with(store);
    let cancel = CancellationToken::new();

    let err = builder
        .user_embedding("ghost", UserWeights::default(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, RecommenderError::NotFound(_)));
}

#[tokio::test]
async fn dangling_neighbors_are_skipped() {
    let store = Arc::new(MemoryStore::new());
    store.insert(
        "users",
        "u1",
        json!({
            "description": "collector of broken links",
            "interests": ["missing-interest"],
            "follow": ["missing-user"],
        }),
    );
    let builder = builder_with(store);
    let cancel = CancellationToken::new();

    let out = builder
        .user_embedding("u1", UserWeights::default(), &cancel)
        .await
        .expect("skips dangling references");
    assert_eq!(out.len(), DIM);
}

#[tokio::test]
async fn invalid_weights_fail_before_any_store_access() {
    let store = Arc::new(MemoryStore::new());
    store.insert("users", "u1", json!({ "description": "x" }));
    let builder = builder_with(store.clone());
    let cancel = CancellationToken::new();

    let bad = UserWeights {
        interests: 0.5,
        description: 0.5,
        follows: 0.5,
    };
    let err = builder.user_embedding("u1", bad, &cancel).await.unwrap_err();
    assert!(matches!(err, RecommenderError::InvalidWeights(_)));
    assert_eq!(store.read_count(), 0);
}

#[tokio::test]
async fn cancelled_operations_stop_early() {
    let store = Arc::new(MemoryStore::new());
    store.insert("users", "u1", json!({ "description": "x" }));
    let builder = builder_with(store);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = builder
        .user_embedding("u1", UserWeights::default(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, RecommenderError::Cancelled));
}

// Mutual follow cycle: the recursion must terminate, with the reentrant call
// replaced by the base composition (interest and description weights
// renormalized, no follow term).
#[tokio::test]
async fn mutual_follow_cycle_terminates_with_base_fallback() {
    let store = Arc::new(MemoryStore::new());
    seed_interest(&store, "i1", "rust");
    seed_interest(&store, "i2", "music");
    store.insert(
        "users",
        "u1",
        json!({
            "description": "systems programmer",
            "interests": ["i1"],
            "follow": ["u2"],
        }),
    );
    store.insert(
        "users",
        "u2",
        json!({
            "description": "guitar player",
            "interests": ["i2"],
            "follow": ["u1"],
        }),
    );
    let builder = builder_with(store);
    let cancel = CancellationToken::new();

    let actual = builder
        .user_embedding("u1", UserWeights::default(), &cancel)
        .await
        .expect("terminates");

    let enc = encoder();
    let e_i1 = enc.encode("rust").await.unwrap();
    let e_i2 = enc.encode("music").await.unwrap();
    let e_d1 = enc.encode("systems programmer").await.unwrap();
    let e_d2 = enc.encode("guitar player").await.unwrap();

    let base_u1 = scaled_avg(&[
        (0.4 / 0.6, scaled_avg(&[(1.0, e_i1.clone())]).unwrap()),
        (0.2 / 0.6, e_d1.clone()),
    ])
    .unwrap();
    let e_u2 = scaled_avg(&[
        (0.4, scaled_avg(&[(1.0, e_i2)]).unwrap()),
        (0.2, e_d2),
        (0.4, scaled_avg(&[(1.0, base_u1)]).unwrap()),
    ])
    .unwrap();
    let expected = scaled_avg(&[
        (0.4, scaled_avg(&[(1.0, e_i1)]).unwrap()),
        (0.2, e_d1),
        (0.4, scaled_avg(&[(1.0, e_u2)]).unwrap()),
    ])
    .unwrap();

    assert_eq!(actual, expected);
}

#[tokio::test]
async fn embedding_engine_returns_empty_for_unknown_user() {
    let store = Arc::new(MemoryStore::new());
    store.insert("users", "u2", json!({ "description": "present" }));
    let builder = Arc::new(builder_with(store.clone()));
    let engine = EmbeddingEngine::new(store, builder);
    let cancel = CancellationToken::new();

    let out = engine
        .recommend_users("u0", 10, &cancel)
        .await
        .expect("missing root is not an error");
    assert!(out.is_empty());
}

#[tokio::test]
async fn embedding_engine_excludes_the_requester_and_ranks() {
    let store = Arc::new(MemoryStore::new());
    seed_interest(&store, "i1", "rust");
    seed_interest(&store, "i2", "gardening");
    store.insert(
        "users",
        "u1",
        json!({ "description": "writes rust all day", "interests": ["i1"] }),
    );
    store.insert(
        "users",
        "u2",
        json!({ "description": "writes rust all day", "interests": ["i1"] }),
    );
    store.insert(
        "users",
        "u3",
        json!({ "description": "prize winning roses", "interests": ["i2"] }),
    );
    let builder = Arc::new(builder_with(store.clone()));
    let engine = EmbeddingEngine::new(store, builder);
    let cancel = CancellationToken::new();

    let out = engine.recommend_users("u1", 10, &cancel).await.expect("ok");
    assert!(!out.contains(&"u1".to_string()));
    assert_eq!(out.len(), 2);
    // u2 mirrors u1 exactly and must outrank the gardener.
    assert_eq!(out[0], "u2");
}

#[tokio::test]
async fn thread_embeddings_compose_members_and_posts() {
    let store = Arc::new(MemoryStore::new());
    seed_interest(&store, "i1", "rust");
    store.insert("keys", "k1", json!({ "name": "async" }));
    store.insert(
        "users",
        "u1",
        json!({ "description": "maintainer", "interests": ["i1"] }),
    );
    store.insert(
        "threads",
        "t1",
        json!({ "name": "async runtimes", "id_owner": "u1", "members": ["u1"] }),
    );
    store.insert(
        "posts",
        "p1",
        json!({
            "id_thread": "t1",
            "id_author": "u1",
            "title": "waker internals",
            "content": "how polling actually works",
            "keys": ["k1"],
        }),
    );
    let builder = builder_with(store);
    let cancel = CancellationToken::new();

    let out = builder
        .thread_embedding("t1", Default::default(), &cancel)
        .await
        .expect("thread embedding");
    assert_eq!(out.len(), DIM);
}
