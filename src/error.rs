// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::auth::TokenError;
use crate::database::{DatabaseError, RouterError};
use crate::services::{AuthError, ProvisioningError, ProvisioningStage};

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),
    ValidationError { message: String, field: Option<String> },

    // 401 Unauthorized
    Unauthorized(String),

    // 403 Forbidden
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict
    Conflict { message: String, field: Option<String> },

    // 500 Internal Server Error
    InternalServerError(String),

    /// Tenant metadata committed but its schema could not be built.
    ProvisioningIncomplete {
        tenant_id: i64,
        schema_name: String,
        stage: ProvisioningStage,
    },

    // 503 Service Unavailable
    ServiceUnavailable(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::ValidationError { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ProvisioningIncomplete { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::ValidationError { message, .. } => message,
            ApiError::Unauthorized(msg) => msg,
            ApiError::Forbidden(msg) => msg,
            ApiError::NotFound(msg) => msg,
            ApiError::Conflict { message, .. } => message,
            ApiError::InternalServerError(msg) => msg,
            ApiError::ProvisioningIncomplete { .. } => {
                "Tenant was registered but its infrastructure could not be provisioned; contact support"
            }
            ApiError::ServiceUnavailable(msg) => msg,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::ValidationError { .. } => "VALIDATION_ERROR",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict { .. } => "CONFLICT",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::ProvisioningIncomplete { .. } => "PROVISIONING_INCOMPLETE",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        let mut body = json!({
            "success": false,
            "error": self.message(),
            "code": self.error_code()
        });

        match self {
            ApiError::ValidationError { field: Some(field), .. } | ApiError::Conflict { field: Some(field), .. } => {
                body["field"] = json!(field);
            }
            ApiError::ProvisioningIncomplete {
                tenant_id,
                schema_name,
                stage,
            } => {
                body["tenantId"] = json!(tenant_id);
                body["schemaName"] = json!(schema_name);
                body["stage"] = json!(stage);
            }
            _ => {}
        }

        body
    }
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn validation_error(message: impl Into<String>, field: Option<String>) -> Self {
        ApiError::ValidationError {
            message: message.into(),
            field,
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>, field: Option<String>) -> Self {
        ApiError::Conflict {
            message: message.into(),
            field,
        }
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

// Token problems all look alike to the caller; the kind is only logged.
impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Encoding(msg) => {
                tracing::error!("Token encoding error: {}", msg);
                ApiError::internal_server_error("Could not issue token")
            }
            other => {
                tracing::warn!("Rejected token: {}", other);
                ApiError::unauthorized("Invalid or expired token")
            }
        }
    }
}

impl From<RouterError> for ApiError {
    fn from(err: RouterError) -> Self {
        match err {
            RouterError::Acquire(e) => {
                tracing::error!("Connection acquire error: {}", e);
                ApiError::service_unavailable("Database temporarily unavailable")
            }
            other => {
                tracing::error!("Connection routing error: {}", other);
                ApiError::internal_server_error("An error occurred while processing your request")
            }
        }
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        tracing::error!("Database error: {}", err);
        ApiError::service_unavailable("Database temporarily unavailable")
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        // Don't expose internal SQL errors to clients
        tracing::error!("SQLx error: {}", err);
        ApiError::internal_server_error("Database error occurred")
    }
}

impl From<ProvisioningError> for ApiError {
    fn from(err: ProvisioningError) -> Self {
        match err {
            ProvisioningError::InvalidField { field, message } => {
                ApiError::validation_error(format!("Invalid {field}: {message}"), Some(field.to_string()))
            }
            ProvisioningError::DuplicateField(field) => {
                ApiError::conflict(format!("{field} is already taken"), Some(field.to_string()))
            }
            ProvisioningError::FailedAfterMetadataCommitted {
                tenant_id,
                schema_name,
                stage,
                reason,
            } => {
                tracing::error!(tenant_id, schema = %schema_name, %stage, "Provisioning incomplete: {}", reason);
                ApiError::ProvisioningIncomplete {
                    tenant_id,
                    schema_name,
                    stage,
                }
            }
            ProvisioningError::TenantNotFound(id) => ApiError::not_found(format!("Tenant {id} not found")),
            ProvisioningError::Router(e) => e.into(),
            ProvisioningError::Database(e) => e.into(),
            other => {
                tracing::error!("Provisioning error: {}", other);
                ApiError::internal_server_error("Tenant registration failed")
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => ApiError::unauthorized("Invalid username or password"),
            AuthError::TenantUnavailable(_) => ApiError::forbidden("Tenant is not available"),
            AuthError::Token(e) => e.into(),
            AuthError::Router(e) => e.into(),
            AuthError::Database(e) => e.into(),
            AuthError::Password(e) => {
                tracing::error!("Password verification error: {}", e);
                ApiError::internal_server_error("Login failed")
            }
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status_code(), Json(self.to_json())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_errors_become_generic_unauthorized() {
        for err in [
            TokenError::InvalidToken,
            TokenError::ExpiredToken,
            TokenError::MalformedToken("missing tenantSchema".to_string()),
        ] {
            let api: ApiError = err.into();
            assert_eq!(api.status_code(), StatusCode::UNAUTHORIZED);
            assert_eq!(api.message(), "Invalid or expired token");
        }
    }

    #[test]
    fn duplicate_field_is_conflict_naming_the_field() {
        let api: ApiError = ProvisioningError::DuplicateField("schemaName").into();
        assert_eq!(api.status_code(), StatusCode::CONFLICT);
        let body = api.to_json();
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "CONFLICT");
        assert_eq!(body["field"], "schemaName");
    }

    #[test]
    fn incomplete_provisioning_is_distinct() {
        let api: ApiError = ProvisioningError::FailedAfterMetadataCommitted {
            tenant_id: 7,
            schema_name: "tenant_acme".to_string(),
            stage: ProvisioningStage::Migrate,
            reason: "syntax error".to_string(),
        }
        .into();
        assert_eq!(api.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = api.to_json();
        assert_eq!(body["code"], "PROVISIONING_INCOMPLETE");
        assert_eq!(body["tenantId"], 7);
        assert_eq!(body["schemaName"], "tenant_acme");
        assert_eq!(body["stage"], "migrate");
        // internal reason stays in the logs
        assert!(!body.to_string().contains("syntax error"));
    }

    #[test]
    fn switch_failure_hides_detail() {
        let api: ApiError = RouterError::SchemaSwitchFailed {
            schema: "tenant_acme".to_string(),
            reason: "schema does not exist".to_string(),
        }
        .into();
        assert_eq!(api.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!api.to_json().to_string().contains("tenant_acme"));
    }
}
