use recommender_service::error::RecommenderError;
use recommender_service::vector::{
    argsort_topk, cosine, rank_ids, scaled_avg, validate_weights,
};

#[test]
fn scaled_avg_single_pair_is_identity() {
    let v = vec![0.25f32, -1.5, 3.0];
    let out = scaled_avg(&[(1.0, v.clone())]).expect("ok");
    assert_eq!(out, v);
}

#[test]
fn scaled_avg_divides_by_pair_count_not_weight_sum() {
    // Two pairs with weights 0.5 each: numerator is the weighted sum, the
    // denominator is 2 (pair count), so the result is a quarter of the sum.
    let a = vec![2.0f32, 4.0];
    let b = vec![6.0f32, 8.0];
    let out = scaled_avg(&[(0.5, a), (0.5, b)]).expect("ok");
    assert_eq!(out, vec![2.0, 3.0]);
}

#[test]
fn scaled_avg_rejects_empty_input() {
    let err = scaled_avg(&[]).unwrap_err();
    assert!(matches!(err, RecommenderError::InvalidParam(_)));
}

#[test]
fn scaled_avg_rejects_mixed_dimensions() {
    let err = scaled_avg(&[(0.5, vec![1.0, 2.0]), (0.5, vec![1.0])]).unwrap_err();
    assert!(matches!(
        err,
        RecommenderError::ShapeMismatch {
            expected: 2,
            actual: 1
        }
    ));
}

#[test]
fn cosine_of_parallel_vectors_is_one() {
    let u = vec![1.0f32, 2.0, 3.0];
    let v = vec![2.0f32, 4.0, 6.0];
    assert!((cosine(&u, &v) - 1.0).abs() < 1e-9);
}

#[test]
fn cosine_of_orthogonal_vectors_is_zero() {
    let u = vec![1.0f32, 0.0];
    let v = vec![0.0f32, 1.0];
    assert_eq!(cosine(&u, &v), 0.0);
}

#[test]
fn cosine_with_undefined_norm_is_zero() {
    let zero = vec![0.0f32, 0.0];
    let v = vec![1.0f32, 2.0];
    assert_eq!(cosine(&zero, &v), 0.0);
    assert_eq!(cosine(&v, &zero), 0.0);
}

#[test]
fn cosine_with_mismatched_dimensions_is_zero() {
    assert_eq!(cosine(&[1.0, 2.0], &[1.0]), 0.0);
}

#[test]
fn argsort_topk_orders_descending_with_index_tie_break() {
    let scores = vec![0.5, 0.9, 0.5, 0.1];
    assert_eq!(argsort_topk(&scores, 4), vec![1, 0, 2, 3]);
}

#[test]
fn argsort_topk_length_is_min_of_k_and_candidates() {
    let scores = vec![0.3, 0.2, 0.1];
    assert_eq!(argsort_topk(&scores, 2).len(), 2);
    assert_eq!(argsort_topk(&scores, 10).len(), 3);
    assert!(argsort_topk(&[], 5).is_empty());
}

#[test]
fn rank_ids_breaks_ties_by_ascending_id() {
    let scored = vec![
        ("b".to_string(), 0.5),
        ("a".to_string(), 0.5),
        ("c".to_string(), 0.9),
    ];
    assert_eq!(rank_ids(scored, 10), vec!["c", "a", "b"]);
}

#[test]
fn rank_ids_truncates_to_limit() {
    let scored = vec![
        ("a".to_string(), 0.1),
        ("b".to_string(), 0.2),
        ("c".to_string(), 0.3),
    ];
    assert_eq!(rank_ids(scored, 2), vec!["c", "b"]);
}

#[test]
fn validate_weights_accepts_exact_tuples() {
    assert!(validate_weights(&[0.4, 0.6]).is_ok());
    assert!(validate_weights(&[0.35, 0.35, 0.2, 0.1]).is_ok());
    assert!(validate_weights(&[1.0, 0.0]).is_ok());
}

#[test]
fn validate_weights_rejects_bad_sums_and_negatives() {
    assert!(matches!(
        validate_weights(&[0.7, 0.5]).unwrap_err(),
        RecommenderError::InvalidWeights(_)
    ));
    assert!(matches!(
        validate_weights(&[1.5, -0.5]).unwrap_err(),
        RecommenderError::InvalidWeights(_)
    ));
}
