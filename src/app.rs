use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::auth::TokenService;
use crate::config::AppConfig;
use crate::database::{ConnectionRouter, DatabaseManager, MigrationCatalog, TenantSessions};
use crate::handlers;
use crate::middleware::{require_identity, tenant_boundary, BoundaryState};
use crate::services::{AuthService, ProvisioningService};
use crate::tenant::TenantResolver;

/// Everything handlers need, cloned into each request.
#[derive(Clone)]
pub struct AppState {
    pub database: DatabaseManager,
    pub tokens: Arc<TokenService>,
    pub sessions: TenantSessions,
    pub provisioning: ProvisioningService,
    pub auth: AuthService,
}

impl AppState {
    pub fn new(config: &AppConfig, database: DatabaseManager) -> Self {
        let router = ConnectionRouter::new(database.pool().clone(), database.default_schema());
        let resolver = TenantResolver::new(database.default_schema());
        let tokens = Arc::new(TokenService::from_config(&config.security));

        Self {
            sessions: TenantSessions::new(router.clone(), resolver),
            provisioning: ProvisioningService::new(
                router.clone(),
                MigrationCatalog::new(&config.migrations.root_dir),
                config.security.password_hash_cost,
            ),
            auth: AuthService::new(router, Arc::clone(&tokens)),
            tokens,
            database,
        }
    }
}

pub fn app(state: AppState, config: &AppConfig) -> Router {
    let routes = Router::new()
        // Public
        .route("/", get(root))
        .route("/health", get(health))
        .merge(auth_public_routes())
        // Protected
        .merge(protected_routes())
        .with_state(state.clone());

    let routes = with_tenant_boundary(
        routes,
        Arc::clone(&state.tokens),
        state.sessions.resolver(),
        Duration::from_secs(config.api.request_timeout_secs),
    )
    .layer(cors_layer(&config.api.cors_origins));

    if config.api.enable_request_logging {
        routes.layer(TraceLayer::new_for_http())
    } else {
        routes
    }
}

/// Wraps `routes` in the request boundary, with panic catching and the
/// request timeout outside it so both still unwind through the boundary.
/// Unbound requests fall back to `resolver`'s default schema.
pub fn with_tenant_boundary(
    routes: Router,
    tokens: Arc<TokenService>,
    resolver: &TenantResolver,
    timeout: Duration,
) -> Router {
    routes
        .layer(middleware::from_fn_with_state(
            BoundaryState::new(tokens, resolver),
            tenant_boundary,
        ))
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::new(timeout))
}

fn auth_public_routes() -> Router<AppState> {
    use handlers::public::auth;

    Router::new()
        .route("/auth/register", post(auth::register_post))
        .route("/auth/login", post(auth::login_post))
}

fn protected_routes() -> Router<AppState> {
    use handlers::protected::{auth, tenant};

    Router::new()
        .route("/api/auth/whoami", get(auth::whoami))
        .route("/api/tenant/session", get(tenant::session_get))
        .route_layer(middleware::from_fn(require_identity))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn root() -> Json<Value> {
    Json(json!({
        "success": true,
        "data": {
            "name": "Tenancy API",
            "version": env!("CARGO_PKG_VERSION"),
            "endpoints": {
                "health": "/health (public)",
                "register": "POST /auth/register (public - tenant onboarding)",
                "login": "POST /auth/login (public - token acquisition)",
                "whoami": "GET /api/auth/whoami (protected)",
                "session": "GET /api/tenant/session (protected)",
            }
        }
    }))
}

async fn health(axum::extract::State(state): axum::extract::State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match state.database.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok"
                }
            })),
        ),
        Err(e) => {
            tracing::warn!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "error": "database unavailable",
                    "code": "SERVICE_UNAVAILABLE",
                    "data": {
                        "status": "degraded",
                        "timestamp": now
                    }
                })),
            )
        }
    }
}
