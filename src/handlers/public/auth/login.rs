// handlers/public/auth/login.rs - POST /auth/login handler

use axum::{extract::State, Json};
use serde::Deserialize;

use crate::app::AppState;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::LoginOutcome;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// POST /auth/login - Authenticate and receive a tenant identity token
///
/// Expected Output:
/// ```json
/// {
///   "success": true,
///   "data": {
///     "token": "eyJhbGciOiJIUzI1NiI...",
///     "expires_at": "2026-01-01T00:00:00Z",
///     "expires_in": 86400,
///     "identity": { "schema_name": "tenant_acme", ... }
///   }
/// }
/// ```
pub async fn login_post(State(state): State<AppState>, Json(request): Json<LoginRequest>) -> ApiResult<LoginOutcome> {
    let outcome = state.auth.login(&request.username, &request.password).await?;
    Ok(ApiResponse::success(outcome))
}
