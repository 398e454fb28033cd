mod common;

use std::time::Duration;

use anyhow::Result;
use axum::{
    http::StatusCode,
    middleware,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tower::ServiceExt;

use tenancy_api::error::ApiError;
use tenancy_api::middleware::require_identity;
use tenancy_api::tenant::{current_schema, current_tenant_schema, TenantResolver};
use tenancy_api::with_tenant_boundary;

async fn echo_schema() -> Json<Value> {
    Json(json!({
        "schema": current_schema(),
        "resolved": TenantResolver::new("public").resolve(),
    }))
}

async fn fail() -> Result<Json<Value>, ApiError> {
    Err(ApiError::internal_server_error("handler failed"))
}

async fn boom() -> Json<Value> {
    panic!("handler panicked")
}

async fn slow() -> Json<Value> {
    tokio::time::sleep(Duration::from_secs(5)).await;
    Json(json!({ "late": true }))
}

async fn nested() -> Json<Value> {
    // Deep call chains reach the tenant through the accessor, never a parameter.
    async fn repository_layer() -> String {
        tokio::task::yield_now().await;
        current_tenant_schema()
    }
    Json(json!({ "schema": repository_layer().await }))
}

fn test_app() -> Router {
    test_app_with_default("public")
}

fn test_app_with_default(default_schema: &str) -> Router {
    let routes = Router::new()
        .route("/schema", get(echo_schema).post(echo_schema))
        .route("/fail", get(fail))
        .route("/panic", get(boom))
        .route("/slow", get(slow))
        .route("/nested", get(nested))
        .merge(
            Router::new()
                .route("/api/schema", get(echo_schema))
                .route_layer(middleware::from_fn(require_identity)),
        );
    with_tenant_boundary(
        routes,
        common::token_service(),
        &TenantResolver::new(default_schema),
        Duration::from_millis(100),
    )
}

async fn schema_unbound(app: &Router) -> Result<Value> {
    let response = app.clone().oneshot(common::get("/schema", None)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    common::body_json(response).await
}

#[tokio::test]
async fn token_binds_the_request_context() -> Result<()> {
    let app = test_app();
    let token = common::token_for("tenant_a", 1);

    let response = app.oneshot(common::get("/schema", Some(&token))).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = common::body_json(response).await?;
    assert_eq!(body["schema"], "tenant_a");
    assert_eq!(body["resolved"], "tenant_a");
    Ok(())
}

#[tokio::test]
async fn nested_code_sees_the_same_tenant() -> Result<()> {
    let app = test_app();
    let token = common::token_for("tenant_a", 1);

    let body = common::body_json(app.oneshot(common::get("/nested", Some(&token))).await?).await?;
    assert_eq!(body["schema"], "tenant_a");
    Ok(())
}

#[tokio::test]
async fn request_parameters_never_choose_the_tenant() -> Result<()> {
    let app = test_app();
    let token = common::token_for("tenant_a", 1);

    let request = common::post_json(
        "/schema?tenantSchema=tenant_b&tenantId=2",
        Some(&token),
        &json!({ "tenantSchema": "tenant_b", "tenantDbId": 2 }),
    );
    let body = common::body_json(app.oneshot(request).await?).await?;
    assert_eq!(body["schema"], "tenant_a");
    Ok(())
}

#[tokio::test]
async fn missing_token_falls_back_to_default_schema() -> Result<()> {
    let app = test_app();
    let body = schema_unbound(&app).await?;
    assert_eq!(body["schema"], Value::Null);
    assert_eq!(body["resolved"], "public");
    Ok(())
}

#[tokio::test]
async fn unbound_requests_use_the_application_default_schema() -> Result<()> {
    let app = test_app_with_default("registry");

    let body = common::body_json(app.clone().oneshot(common::get("/nested", None)).await?).await?;
    assert_eq!(body["schema"], "registry");

    let token = common::token_for("tenant_a", 1);
    let body = common::body_json(app.oneshot(common::get("/nested", Some(&token))).await?).await?;
    assert_eq!(body["schema"], "tenant_a");
    Ok(())
}

#[tokio::test]
async fn bad_tokens_are_rejected_before_the_handler() -> Result<()> {
    let app = test_app();

    let mut other = common::security();
    other.jwt_secret = "not-the-server-secret".to_string();
    let forged = tenancy_api::auth::TokenService::from_config(&other)
        .issue(&common::identity("tenant_a", 1))?
        .token;

    let now = Utc::now().timestamp();
    let expired = encode(
        &Header::default(),
        &json!({
            "sub": "admin@tenant_a",
            "tenantSchema": "tenant_a",
            "tenantDbId": 1,
            "tenantName": "a",
            "roles": [],
            "iss": "tenancy-api",
            "iat": now - 7200,
            "exp": now - 3600,
        }),
        &EncodingKey::from_secret(common::TEST_SECRET.as_bytes()),
    )?;

    for token in [forged.as_str(), expired.as_str(), "garbage"] {
        let response = app.clone().oneshot(common::get("/schema", Some(token))).await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = common::body_json(response).await?;
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "UNAUTHORIZED");
        assert!(body.get("schema").is_none());
    }

    let wrong_prefix = axum::http::Request::builder()
        .uri("/schema")
        .header("authorization", "Token abc.def.ghi")
        .body(axum::body::Body::empty())?;
    let response = app.oneshot(wrong_prefix).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn protected_routes_require_an_identity() -> Result<()> {
    let app = test_app();

    let response = app.clone().oneshot(common::get("/api/schema", None)).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let token = common::token_for("tenant_a", 1);
    let response = app.oneshot(common::get("/api/schema", Some(&token))).await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

// All requests share one runtime thread, so any context that outlived its
// request would show up in the unbound request that follows it.
#[tokio::test]
async fn context_is_empty_after_success_error_panic_and_timeout() -> Result<()> {
    let app = test_app();
    let token = common::token_for("tenant_a", 1);

    let response = app.clone().oneshot(common::get("/schema", Some(&token))).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(schema_unbound(&app).await?["schema"], Value::Null);

    let response = app.clone().oneshot(common::get("/fail", Some(&token))).await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(schema_unbound(&app).await?["schema"], Value::Null);

    let response = app.clone().oneshot(common::get("/panic", Some(&token))).await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(schema_unbound(&app).await?["schema"], Value::Null);

    let response = app.clone().oneshot(common::get("/slow", Some(&token))).await?;
    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    assert_eq!(schema_unbound(&app).await?["schema"], Value::Null);

    // And nothing leaked into the test task itself.
    assert_eq!(current_schema(), None);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_requests_keep_their_own_tenant() -> Result<()> {
    let app = test_app();

    let mut handles = Vec::new();
    for i in 0..16 {
        let app = app.clone();
        handles.push(tokio::spawn(async move {
            let schema = format!("tenant_t{i}");
            let token = common::token_for(&schema, i);
            let response = app.oneshot(common::get("/nested", Some(&token))).await?;
            let body = common::body_json(response).await?;
            anyhow::ensure!(body["schema"] == schema.as_str(), "request {i} saw {}", body["schema"]);
            Ok::<_, anyhow::Error>(())
        }));
    }
    for handle in handles {
        handle.await??;
    }
    Ok(())
}
