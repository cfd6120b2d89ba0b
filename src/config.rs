use std::env;

#[derive(Clone, Debug)]
pub struct Config {
    pub mongo_uri: String,
    pub mongo_db: String,
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,
    pub jwt_secret_key: String,
    pub jwt_algorithm: String,
    pub access_token_expire_minutes: i64,
    pub no_auth: bool,
    pub embedding_ttl_hours: i64,
    pub embedding_model_id: String,
    pub embedding_dim: usize,
    // When set, text encoding is delegated to a remote embeddings service
    pub embeddings_service_url: Option<String>,
    pub embeddings_timeout_ms: u64,
    pub server_port: u16,
    pub request_timeout_secs: u64,
    pub service_mode: String,
}

impl Config {
    pub fn from_env() -> Self {
        let mongo_uri =
            env::var("MONGO_URI").unwrap_or_else(|_| "mongodb://localhost:27017".to_string());
        let mongo_db = env::var("MONGO_DB").unwrap_or_else(|_| "watif".to_string());
        let neo4j_uri =
            env::var("NEO4J_URI").unwrap_or_else(|_| "bolt://localhost:7687".to_string());
        let mut neo4j_user = env::var("NEO4J_USER").unwrap_or_else(|_| "neo4j".to_string());
        let mut neo4j_password = env::var("NEO4J_PASSWORD").unwrap_or_else(|_| "neo4j".to_string());
        // NEO4J_AUTH carries "user/password" (docker image convention) and wins when present
        if let Ok(auth) = env::var("NEO4J_AUTH") {
            if let Some((user, password)) = auth.split_once('/') {
                neo4j_user = user.to_string();
                neo4j_password = password.to_string();
            }
        }
        let jwt_secret_key = env::var("JWT_SECRET_KEY")
            .unwrap_or_else(|_| uuid::Uuid::new_v4().simple().to_string());
        let jwt_algorithm = env::var("JWT_ALGORITHM").unwrap_or_else(|_| "HS256".to_string());
        let access_token_expire_minutes = env::var("ACCESS_TOKEN_EXPIRE_MINUTES")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(30);
        let no_auth = env::var("NO_AUTH").map(|v| !v.is_empty()).unwrap_or(false);
        let embedding_ttl_hours = env::var("EMBEDDING_TTL_HOURS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(2);
        let embedding_model_id =
            env::var("EMBEDDING_MODEL_ID").unwrap_or_else(|_| "hashing-v1".to_string());
        let embedding_dim = env::var("EMBEDDING_DIM")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(384);
        let embeddings_service_url = env::var("EMBEDDINGS_SERVICE_URL").ok();
        let embeddings_timeout_ms = env::var("EMBEDDINGS_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(1500);
        let server_port = env::var("SERVER_PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(8000);
        let request_timeout_secs = env::var("REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(30);
        let service_mode = env::var("SERVICE_MODE").unwrap_or_else(|_| "healthy".to_string());
        Self {
            mongo_uri,
            mongo_db,
            neo4j_uri,
            neo4j_user,
            neo4j_password,
            jwt_secret_key,
            jwt_algorithm,
            access_token_expire_minutes,
            no_auth,
            embedding_ttl_hours,
            embedding_model_id,
            embedding_dim,
            embeddings_service_url,
            embeddings_timeout_ms,
            server_port,
            request_timeout_secs,
            service_mode,
        }
    }
}
