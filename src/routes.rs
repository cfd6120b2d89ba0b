use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, Method};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::AuthService;
use crate::engines::{
    EngineKind, Engines, JaccardPostParams, JaccardUserParams, WeightedPostParams,
    WeightedThreadParams, WeightedUserParams,
};
use crate::error::{RecommenderError, Result};

const DEFAULT_LIMIT: usize = 10;
const MAX_LIMIT: usize = 100;

#[derive(Clone)]
pub struct AppState {
    pub engines: Arc<Engines>,
    pub auth: Arc<AuthService>,
    pub service_mode: String,
    pub request_timeout: Duration,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
        .allow_origin(Any);

    Router::new()
        .route("/recommend/{engine}/users", get(recommend_users))
        .route("/recommend/{engine}/posts", get(recommend_posts))
        .route("/recommend/{engine}/threads", get(recommend_threads))
        .route("/health", get(health))
        .route("/token", post(token))
        .route("/me", get(me))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
pub struct RecommendQuery {
    pub user_id: Option<String>,
    pub follow_weight: Option<f64>,
    pub interest_weight: Option<f64>,
    pub interaction_weight: Option<f64>,
    pub member_weight: Option<f64>,
    pub limit: Option<usize>,
    pub skip: Option<i64>,
    pub seed: Option<u64>,
    pub candidate_limit: Option<i64>,
}

async fn recommend_users(
    State(state): State<AppState>,
    Path(engine): Path<String>,
    headers: HeaderMap,
    Query(params): Query<RecommendQuery>,
) -> Result<Json<Value>> {
    state.auth.verify_bearer(bearer(&headers))?;
    let kind: EngineKind = engine.parse()?;
    let user_id = require_user_id(&params)?;
    let limit = validate_limit(params.limit)?;
    let cancel = CancellationToken::new();
    let ids = with_deadline(state.request_timeout, &cancel, async {
        match kind {
            EngineKind::Jaccard => {
                let defaults = JaccardUserParams::default();
                state
                    .engines
                    .jaccard
                    .recommend_users(
                        &user_id,
                        JaccardUserParams {
                            follow_weight: params.follow_weight.unwrap_or(defaults.follow_weight),
                            interest_weight: params
                                .interest_weight
                                .unwrap_or(defaults.interest_weight),
                            candidate_limit: params
                                .candidate_limit
                                .unwrap_or(defaults.candidate_limit),
                            limit,
                        },
                    )
                    .await
            }
            EngineKind::WeightedCount => {
                let defaults = WeightedUserParams::default();
                state
                    .engines
                    .weighted
                    .recommend_users(
                        &user_id,
                        WeightedUserParams {
                            follow_weight: params.follow_weight.unwrap_or(defaults.follow_weight),
                            interest_weight: params
                                .interest_weight
                                .unwrap_or(defaults.interest_weight),
                            limit: limit as i64,
                        },
                    )
                    .await
            }
            EngineKind::Embedding => {
                state
                    .engines
                    .embedding
                    .recommend_users(&user_id, limit, &cancel)
                    .await
            }
        }
    })
    .await?;
    Ok(Json(json!({ "recommended_users": ids })))
}

async fn recommend_posts(
    State(state): State<AppState>,
    Path(engine): Path<String>,
    headers: HeaderMap,
    Query(params): Query<RecommendQuery>,
) -> Result<Json<Value>> {
    state.auth.verify_bearer(bearer(&headers))?;
    let kind: EngineKind = engine.parse()?;
    let user_id = require_user_id(&params)?;
    let limit = validate_limit(params.limit)?;
    let cancel = CancellationToken::new();
    let ids = with_deadline(state.request_timeout, &cancel, async {
        match kind {
            EngineKind::Jaccard => {
                state
                    .engines
                    .jaccard
                    .recommend_posts(
                        &user_id,
                        JaccardPostParams {
                            skip: params.skip.unwrap_or(0),
                            limit: limit as i64,
                            seed: params.seed,
                        },
                    )
                    .await
            }
            EngineKind::WeightedCount => {
                let defaults = WeightedPostParams::default();
                state
                    .engines
                    .weighted
                    .recommend_posts(
                        &user_id,
                        WeightedPostParams {
                            interest_weight: params
                                .interest_weight
                                .unwrap_or(defaults.interest_weight),
                            interaction_weight: params
                                .interaction_weight
                                .unwrap_or(defaults.interaction_weight),
                            limit: limit as i64,
                        },
                    )
                    .await
            }
            EngineKind::Embedding => {
                state
                    .engines
                    .embedding
                    .recommend_posts(&user_id, limit, &cancel)
                    .await
            }
        }
    })
    .await?;
    Ok(Json(json!({ "recommended_posts": ids })))
}

async fn recommend_threads(
    State(state): State<AppState>,
    Path(engine): Path<String>,
    headers: HeaderMap,
    Query(params): Query<RecommendQuery>,
) -> Result<Json<Value>> {
    state.auth.verify_bearer(bearer(&headers))?;
    let kind: EngineKind = engine.parse()?;
    let user_id = require_user_id(&params)?;
    let limit = validate_limit(params.limit)?;
    let cancel = CancellationToken::new();
    let ids = with_deadline(state.request_timeout, &cancel, async {
        match kind {
            EngineKind::Jaccard => {
                state
                    .engines
                    .jaccard
                    .recommend_threads(&user_id, limit)
                    .await
            }
            EngineKind::WeightedCount => {
                let defaults = WeightedThreadParams::default();
                state
                    .engines
                    .weighted
                    .recommend_threads(
                        &user_id,
                        WeightedThreadParams {
                            member_weight: params.member_weight.unwrap_or(defaults.member_weight),
                            interest_weight: params
                                .interest_weight
                                .unwrap_or(defaults.interest_weight),
                            limit: limit as i64,
                        },
                    )
                    .await
            }
            EngineKind::Embedding => {
                state
                    .engines
                    .embedding
                    .recommend_threads(&user_id, limit, &cancel)
                    .await
            }
        }
    })
    .await?;
    Ok(Json(json!({ "recommended_threads": ids })))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let status = if state.auth.no_auth() {
        "debug"
    } else {
        state.service_mode.as_str()
    };
    Json(json!({ "status": status }))
}

#[derive(Debug, Deserialize)]
struct TokenRequest {
    username: String,
    password: String,
}

async fn token(
    State(state): State<AppState>,
    Form(request): Form<TokenRequest>,
) -> Result<Json<Value>> {
    let access_token = state
        .auth
        .issue_token(&request.username, &request.password)
        .await?;
    Ok(Json(json!({
        "access_token": access_token,
        "token_type": "bearer",
    })))
}

async fn me(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Value>> {
    match state.auth.verify_bearer(bearer(&headers))? {
        Some(claims) => {
            let user = state.auth.current_user(&claims).await?;
            Ok(Json(user))
        }
        None => Ok(Json(json!({ "logged_in_as": Value::Null }))),
    }
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok())
}

fn require_user_id(params: &RecommendQuery) -> Result<String> {
    params
        .user_id
        .clone()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| RecommenderError::InvalidParam("missing user_id parameter".to_string()))
}

fn validate_limit(limit: Option<usize>) -> Result<usize> {
    let limit = limit.unwrap_or(DEFAULT_LIMIT);
    if limit == 0 || limit > MAX_LIMIT {
        return Err(RecommenderError::InvalidParam(format!(
            "limit must be between 1 and {}",
            MAX_LIMIT
        )));
    }
    Ok(limit)
}

/// Enforces the per-request deadline. On expiry the operation's cancellation
/// token fires so in-flight embedding walks stop at their next checkpoint.
async fn with_deadline<F>(
    timeout: Duration,
    cancel: &CancellationToken,
    operation: F,
) -> Result<Vec<String>>
where
    F: Future<Output = Result<Vec<String>>>,
{
    match tokio::time::timeout(timeout, operation).await {
        Ok(result) => result,
        Err(_) => {
            cancel.cancel();
            Err(RecommenderError::Timeout)
        }
    }
}
