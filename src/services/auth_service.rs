use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::auth::password::{verify_password, PasswordError};
use crate::auth::{IssuedToken, TenantIdentity, TokenError, TokenService};
use crate::database::repository::UserRepository;
use crate::database::{ConnectionRouter, RouterError};
use crate::types::TenantStatus;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("tenant '{0}' is not available")]
    TenantUnavailable(String),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error(transparent)]
    Router(#[from] RouterError),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    #[serde(flatten)]
    pub token: IssuedToken,
    pub identity: TenantIdentity,
}

/// Verifies credentials against the shared principal table and issues
/// tenant identity tokens.
#[derive(Clone)]
pub struct AuthService {
    router: ConnectionRouter,
    tokens: Arc<TokenService>,
}

impl AuthService {
    pub fn new(router: ConnectionRouter, tokens: Arc<TokenService>) -> Self {
        Self { router, tokens }
    }

    /// The tenant must be active with its infrastructure in place; a
    /// half-provisioned tenant cannot log in.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginOutcome, AuthError> {
        let row = {
            let mut conn = self.router.acquire_generic().await?;
            UserRepository::find_login(&mut conn, username.trim()).await?
        };

        // Unknown users and wrong passwords look the same to the caller.
        let Some(row) = row else {
            warn!("login rejected: unknown principal");
            return Err(AuthError::InvalidCredentials);
        };
        if !verify_password(password, &row.password_hash).await? || !row.user_active {
            warn!(tenant_id = row.tenant_id, "login rejected: bad credentials or inactive principal");
            return Err(AuthError::InvalidCredentials);
        }

        let status_ok = row.status.parse::<TenantStatus>().ok() == Some(TenantStatus::Active);
        if !row.tenant_active || !status_ok {
            warn!(tenant_id = row.tenant_id, status = %row.status, "login rejected: tenant unavailable");
            return Err(AuthError::TenantUnavailable(row.company_name));
        }

        let identity = TenantIdentity {
            principal_name: row.username,
            schema_name: row.schema_name,
            tenant_id: row.tenant_id,
            tenant_display_name: row.company_name,
            roles: row.roles.into_iter().collect(),
        };
        let token = self.tokens.issue(&identity)?;

        info!(tenant_id = identity.tenant_id, schema = %identity.schema_name, "issued tenant token");
        Ok(LoginOutcome { token, identity })
    }
}
