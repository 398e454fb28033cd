#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::http::{Request, Response};
use http_body_util::BodyExt;
use serde_json::Value;

use tenancy_api::auth::{TenantIdentity, TokenService};
use tenancy_api::config::{AppConfig, DatabaseConfig, SecurityConfig};
use tenancy_api::database::DatabaseManager;

pub const TEST_SECRET: &str = "integration-test-secret";

pub fn security() -> SecurityConfig {
    SecurityConfig {
        jwt_secret: TEST_SECRET.to_string(),
        jwt_expiry_hours: 1,
        jwt_issuer: "tenancy-api".to_string(),
        token_header: "authorization".to_string(),
        token_prefix: "Bearer".to_string(),
        password_hash_cost: 4,
    }
}

pub fn token_service() -> Arc<TokenService> {
    Arc::new(TokenService::from_config(&security()))
}

pub fn identity(schema: &str, tenant_id: i64) -> TenantIdentity {
    TenantIdentity {
        principal_name: format!("admin@{schema}"),
        schema_name: schema.to_string(),
        tenant_id,
        tenant_display_name: schema.trim_start_matches("tenant_").to_string(),
        roles: ["TENANT_ADMIN".to_string()].into_iter().collect(),
    }
}

pub fn token_for(schema: &str, tenant_id: i64) -> String {
    token_service()
        .issue(&identity(schema, tenant_id))
        .expect("issue test token")
        .token
}

pub fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::empty()).expect("build request")
}

pub fn post_json(uri: &str, token: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).expect("build request")
}

pub async fn body_json(response: Response<Body>) -> Result<Value> {
    let bytes = response.into_body().collect().await?.to_bytes();
    serde_json::from_slice(&bytes).context("response body is not JSON")
}

/// Postgres used by database-backed tests. Those tests return early (and
/// pass) when it is not set.
pub fn test_database_url() -> Option<String> {
    match std::env::var("TEST_DATABASE_URL") {
        Ok(url) if !url.trim().is_empty() => Some(url),
        _ => {
            eprintln!("TEST_DATABASE_URL not set, skipping database test");
            None
        }
    }
}

pub fn database_config(url: String, max_connections: u32) -> DatabaseConfig {
    DatabaseConfig {
        url,
        max_connections,
        acquire_timeout_secs: 5,
        default_schema: "public".to_string(),
        test_before_acquire: true,
    }
}

pub async fn connect(max_connections: u32) -> Result<Option<DatabaseManager>> {
    let Some(url) = test_database_url() else {
        return Ok(None);
    };
    let manager = DatabaseManager::connect(&database_config(url, max_connections)).await?;
    Ok(Some(manager))
}

pub fn migrations_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("migrations")
}

/// Full application config pointed at the test database.
pub fn app_config(url: String) -> AppConfig {
    let mut config = AppConfig::from_env();
    config.database = database_config(url, 5);
    config.security = security();
    config.migrations.root_dir = migrations_dir();
    config.api.request_timeout_secs = 30;
    config
}

/// Short random suffix so parallel and repeated runs never collide.
pub fn unique_suffix() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..10].to_string()
}
