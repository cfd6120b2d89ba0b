use std::sync::Arc;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::error::{RecommenderError, Result};
use crate::models::collections;
use crate::store::DocumentStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
}

/// Token issue/verify collaborator for the facade. With `NO_AUTH` set the
/// bearer check becomes a pass-through.
pub struct AuthService {
    store: Arc<dyn DocumentStore>,
    secret: String,
    algorithm: Algorithm,
    expire: Duration,
    no_auth: bool,
}

impl AuthService {
    pub fn new(cfg: &Config, store: Arc<dyn DocumentStore>) -> Result<Self> {
        let algorithm = cfg.jwt_algorithm.parse::<Algorithm>().map_err(|_| {
            RecommenderError::InvalidParam(format!(
                "unsupported JWT algorithm '{}'",
                cfg.jwt_algorithm
            ))
        })?;
        Ok(Self {
            store,
            secret: cfg.jwt_secret_key.clone(),
            algorithm,
            expire: Duration::minutes(cfg.access_token_expire_minutes),
            no_auth: cfg.no_auth,
        })
    }

    pub fn no_auth(&self) -> bool {
        self.no_auth
    }

    pub async fn issue_token(&self, username: &str, password: &str) -> Result<String> {
        let users = self
            .store
            .find(
                collections::USERS,
                serde_json::json!({ "username": username }),
                &[],
            )
            .await?;
        let user = users
            .into_iter()
            .next()
            .ok_or_else(|| RecommenderError::Unauthorized("incorrect username or password".to_string()))?;
        let stored = user
            .get("password")
            .and_then(|v| v.as_str())
            .ok_or_else(|| RecommenderError::Unauthorized("incorrect username or password".to_string()))?;
        if digest(password) != stored {
            return Err(RecommenderError::Unauthorized(
                "incorrect username or password".to_string(),
            ));
        }
        let claims = Claims {
            sub: username.to_string(),
            exp: (Utc::now() + self.expire).timestamp(),
        };
        encode(
            &Header::new(self.algorithm),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| RecommenderError::Unauthorized(format!("token encode: {}", e)))
    }

    /// Validates the bearer header. Returns `None` when auth is bypassed.
    pub fn verify_bearer(&self, header: Option<&str>) -> Result<Option<Claims>> {
        if self.no_auth {
            return Ok(None);
        }
        let header = header.ok_or_else(|| {
            RecommenderError::Unauthorized("missing authorization header".to_string())
        })?;
        let token = header.strip_prefix("Bearer ").ok_or_else(|| {
            RecommenderError::Unauthorized("malformed authorization header".to_string())
        })?;
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::new(self.algorithm),
        )
        .map_err(|_| {
            RecommenderError::Unauthorized("could not validate credentials".to_string())
        })?;
        Ok(Some(data.claims))
    }

    /// Resolves the token subject to its user document, with credential and
    /// cache fields stripped.
    pub async fn current_user(&self, claims: &Claims) -> Result<Value> {
        let users = self
            .store
            .find(
                collections::USERS,
                serde_json::json!({ "username": claims.sub }),
                &[],
            )
            .await?;
        let mut user = users.into_iter().next().ok_or_else(|| {
            RecommenderError::Unauthorized("could not validate credentials".to_string())
        })?;
        if let Some(map) = user.as_object_mut() {
            map.remove("password");
            map.remove("embedding");
        }
        Ok(user)
    }
}

/// SHA-256 hex digest used for the delegated credential check.
pub fn digest(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}
