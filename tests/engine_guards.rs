use recommender_service::engines::EngineKind;
use recommender_service::error::RecommenderError;
use recommender_service::vector::validate_weights;

#[test]
fn engine_codes_resolve() {
    assert_eq!("JA".parse::<EngineKind>().unwrap(), EngineKind::Jaccard);
    assert_eq!(
        "MC".parse::<EngineKind>().unwrap(),
        EngineKind::WeightedCount
    );
    assert_eq!("EM".parse::<EngineKind>().unwrap(), EngineKind::Embedding);
}

#[test]
fn unknown_engine_codes_are_invalid_params() {
    for bad in ["ja", "em", "XX", ""] {
        let err = bad.parse::<EngineKind>().unwrap_err();
        assert!(matches!(err, RecommenderError::InvalidParam(_)));
    }
}

// The weight guard runs before any store access, so a request like
// (follow_weight=0.7, interest_weight=0.5) must die at validation.
#[test]
fn overweight_tuple_is_rejected() {
    let err = validate_weights(&[0.7, 0.5]).unwrap_err();
    assert!(matches!(err, RecommenderError::InvalidWeights(_)));
}

#[test]
fn tolerance_is_tight() {
    assert!(validate_weights(&[0.5, 0.5 + 5e-10]).is_ok());
    assert!(validate_weights(&[0.5, 0.5 + 5e-9]).is_err());
}
