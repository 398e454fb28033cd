//! Request boundary.
//!
//! [`tenant_boundary`] wraps every request: it opens a fresh tenant context
//! slot (with the application's fallback schema), binds it from a verified
//! token when one is presented, and lets the
//! slot's guard clear it once the rest of the pipeline is done with the
//! request (or drops it on error, panic or timeout).

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::auth::{TenantIdentity, TokenService};
use crate::error::ApiError;
use crate::tenant::context::{self, TenantScope};
use crate::tenant::TenantResolver;

/// What the boundary needs from the application.
#[derive(Clone)]
pub struct BoundaryState {
    pub tokens: Arc<TokenService>,
    pub default_schema: Arc<str>,
}

impl BoundaryState {
    pub fn new(tokens: Arc<TokenService>, resolver: &TenantResolver) -> Self {
        Self {
            tokens,
            default_schema: Arc::from(resolver.default_schema()),
        }
    }
}

pub async fn tenant_boundary(State(state): State<BoundaryState>, request: Request, next: Next) -> Response {
    context::scope_with_default(state.default_schema, bind_and_run(state.tokens, request, next)).await
}

async fn bind_and_run(tokens: Arc<TokenService>, mut request: Request, next: Next) -> Response {
    // Only the header is consulted; query, path and body never pick the tenant.
    let token = match tokens.extract(request.headers()) {
        Ok(Some(token)) => token,
        Ok(None) => return next.run(request).await,
        Err(e) => return ApiError::from(e).into_response(),
    };

    let identity = match tokens.verify(&token) {
        Ok(identity) => identity,
        Err(e) => return ApiError::from(e).into_response(),
    };

    let _guard = match context::set(TenantScope {
        schema_name: identity.schema_name.clone(),
        tenant_id: Some(identity.tenant_id),
        tenant_name: Some(identity.tenant_display_name.clone()),
    }) {
        Ok(guard) => guard,
        Err(e) => {
            tracing::error!("Tenant context unavailable: {}", e);
            return ApiError::internal_server_error("Request context error").into_response();
        }
    };

    tracing::debug!(schema = %identity.schema_name, tenant_id = identity.tenant_id, "tenant context bound");
    request.extensions_mut().insert(identity);
    next.run(request).await
}

/// Rejects requests that reached a protected route without a verified
/// identity.
pub async fn require_identity(request: Request, next: Next) -> Response {
    if request.extensions().get::<TenantIdentity>().is_none() {
        return ApiError::unauthorized("Authentication required").into_response();
    }
    next.run(request).await
}
