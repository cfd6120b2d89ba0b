use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::SeedableRng;

use recommender_service::engines::jaccard::{jaccard, shuffle_pass, user_score};
use recommender_service::vector::rank_ids;

fn set(ids: &[&str]) -> HashSet<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

#[test]
fn jaccard_of_empty_union_is_zero() {
    assert_eq!(jaccard(&set(&[]), &set(&[])), 0.0);
}

#[test]
fn jaccard_is_symmetric_and_bounded() {
    let a = set(&["x", "y", "z"]);
    let b = set(&["y", "z", "w"]);
    let ab = jaccard(&a, &b);
    assert_eq!(ab, jaccard(&b, &a));
    assert!((0.0..=1.0).contains(&ab));
    assert_eq!(ab, 0.5);
}

#[test]
fn user_scores_stay_in_unit_interval() {
    for follows in [0.0, 0.5, 1.0] {
        for interests in [0.0, 0.5, 1.0] {
            let score = user_score(follows, interests, 0.4, 0.6);
            assert!((0.0..=1.0).contains(&score));
        }
    }
}

// Fixture: u1 follows {u2, u3} with interest {i1}; u2 follows {u3, u4} with
// interests {i1, i2}; u3 follows {u4} with interest {i3}; u4 follows nothing
// with interest {i1}. Equal weights rank u4 first on pure interest overlap.
#[test]
fn equal_weight_ranking_prefers_interest_overlap() {
    let follows_u1 = set(&["u2", "u3"]);
    let interests_u1 = set(&["i1"]);

    let candidates = [
        ("u2", set(&["u3", "u4"]), set(&["i1", "i2"])),
        ("u3", set(&["u4"]), set(&["i3"])),
        ("u4", set(&[]), set(&["i1"])),
    ];

    let mut scored = Vec::new();
    for (id, follows, interests) in &candidates {
        let score = user_score(
            jaccard(&follows_u1, follows),
            jaccard(&interests_u1, interests),
            0.5,
            0.5,
        );
        scored.push((id.to_string(), score));
    }

    let by_id: std::collections::HashMap<_, _> = scored.iter().cloned().collect();
    assert!((by_id["u2"] - (0.5 * (1.0 / 3.0) + 0.5 * 0.5) / 2.0).abs() < 1e-12);
    assert!((by_id["u4"] - 0.25).abs() < 1e-12);
    assert!(by_id["u3"] < by_id["u2"]);

    assert_eq!(rank_ids(scored, 10), vec!["u4", "u2", "u3"]);
}

#[test]
fn shuffle_is_reproducible_under_a_seed() {
    let base: Vec<String> = (0..20).map(|i| format!("p{:02}", i)).collect();

    let mut first = base.clone();
    shuffle_pass(&mut first, &mut StdRng::seed_from_u64(42));

    let mut second = base.clone();
    shuffle_pass(&mut second, &mut StdRng::seed_from_u64(42));

    assert_eq!(first, second);
}

#[test]
fn shuffle_preserves_length_and_membership() {
    let base: Vec<String> = (0..50).map(|i| format!("p{:02}", i)).collect();
    let mut shuffled = base.clone();
    shuffle_pass(&mut shuffled, &mut StdRng::seed_from_u64(7));

    assert_eq!(shuffled.len(), base.len());
    let mut sorted = shuffled.clone();
    sorted.sort();
    assert_eq!(sorted, base);
}

#[test]
fn different_seeds_can_disagree() {
    let base: Vec<String> = (0..50).map(|i| format!("p{:02}", i)).collect();

    let mut a = base.clone();
    shuffle_pass(&mut a, &mut StdRng::seed_from_u64(1));
    let mut b = base;
    shuffle_pass(&mut b, &mut StdRng::seed_from_u64(2));

    // Not guaranteed in general, but stable for these fixed seeds.
    assert_ne!(a, b);
}
