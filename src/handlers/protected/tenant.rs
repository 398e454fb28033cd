use axum::{extract::State, Extension};
use serde::Serialize;

use crate::app::AppState;
use crate::auth::TenantIdentity;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub tenant_id: i64,
    pub resolved_schema: String,
    pub search_path: String,
}

/// GET /api/tenant/session - Opens a database session the way business code
/// does and reports which schema the connection is actually bound to.
pub async fn session_get(
    State(state): State<AppState>,
    Extension(identity): Extension<TenantIdentity>,
) -> ApiResult<SessionInfo> {
    let resolved_schema = state.sessions.resolver().resolve();

    let search_path = state
        .sessions
        .with_session(|conn| {
            Box::pin(async move {
                sqlx::query_scalar::<_, String>("SELECT current_setting('search_path')")
                    .fetch_one(conn)
                    .await
                    .map_err(ApiError::from)
            })
        })
        .await?;

    Ok(ApiResponse::success(SessionInfo {
        tenant_id: identity.tenant_id,
        resolved_schema,
        search_path,
    }))
}
