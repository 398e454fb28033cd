//! Tenant identity tokens.
//!
//! A token is an HS256 JWT whose `tenantSchema` claim is the only input the
//! request boundary trusts for routing.

pub mod password;

use std::collections::BTreeSet;

use axum::http::HeaderMap;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{SecurityConfig, MAX_JWT_EXPIRY_HOURS};
use crate::tenant::TenantSchemaName;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(rename = "tenantSchema")]
    pub tenant_schema: String,
    #[serde(rename = "tenantDbId")]
    pub tenant_db_id: i64,
    #[serde(rename = "tenantName")]
    pub tenant_name: String,
    pub roles: Vec<String>,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

/// Who is calling and on behalf of which tenant. Built only from a verified
/// token or at login, never from request parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantIdentity {
    pub principal_name: String,
    pub schema_name: String,
    pub tenant_id: i64,
    pub tenant_display_name: String,
    pub roles: BTreeSet<String>,
}

impl TenantIdentity {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token")]
    InvalidToken,
    #[error("token expired")]
    ExpiredToken,
    #[error("malformed token: {0}")]
    MalformedToken(String),
    #[error("token generation failed: {0}")]
    Encoding(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub expires_in: i64,
}

/// Issues and verifies identity tokens with the server-held secret.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    expiry: Duration,
    header_name: String,
    prefix: String,
}

impl TokenService {
    pub fn from_config(security: &SecurityConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[security.jwt_issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iat", "iss", "sub"]);
        validation.leeway = 5;

        Self {
            encoding_key: EncodingKey::from_secret(security.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(security.jwt_secret.as_bytes()),
            validation,
            issuer: security.jwt_issuer.clone(),
            // Clamped for configs that never went through validate().
            expiry: Duration::hours(security.jwt_expiry_hours.min(MAX_JWT_EXPIRY_HOURS) as i64),
            header_name: security.token_header.to_ascii_lowercase(),
            prefix: security.token_prefix.clone(),
        }
    }

    pub fn issue(&self, identity: &TenantIdentity) -> Result<IssuedToken, TokenError> {
        let now = Utc::now();
        let expires_at = now + self.expiry;
        let claims = Claims {
            sub: identity.principal_name.clone(),
            tenant_schema: identity.schema_name.clone(),
            tenant_db_id: identity.tenant_id,
            tenant_name: identity.tenant_display_name.clone(),
            roles: identity.roles.iter().cloned().collect(),
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = self.encode_claims(&claims)?;
        Ok(IssuedToken {
            token,
            expires_at,
            expires_in: self.expiry.num_seconds(),
        })
    }

    pub(crate) fn encode_claims(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| TokenError::Encoding(e.to_string()))
    }

    /// Checks signature, issuer and expiry, then the routing claims.
    pub fn verify(&self, token: &str) -> Result<TenantIdentity, TokenError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::ExpiredToken,
            ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_)
            | ErrorKind::MissingRequiredClaim(_) => TokenError::MalformedToken(e.to_string()),
            _ => TokenError::InvalidToken,
        })?;

        let claims = data.claims;
        if claims.sub.trim().is_empty() {
            return Err(TokenError::MalformedToken("empty subject".to_string()));
        }
        let schema = TenantSchemaName::parse(&claims.tenant_schema)
            .map_err(|e| TokenError::MalformedToken(e.to_string()))?;

        Ok(TenantIdentity {
            principal_name: claims.sub,
            schema_name: schema.into_string(),
            tenant_id: claims.tenant_db_id,
            tenant_display_name: claims.tenant_name,
            roles: claims.roles.into_iter().collect(),
        })
    }

    /// Pulls the raw token out of the configured header.
    ///
    /// `Ok(None)` means no header at all, which public routes accept. A
    /// header that is present but not `<prefix> <token>` is malformed.
    pub fn extract(&self, headers: &HeaderMap) -> Result<Option<String>, TokenError> {
        let Some(value) = headers.get(self.header_name.as_str()) else {
            return Ok(None);
        };

        let value = value
            .to_str()
            .map_err(|_| TokenError::MalformedToken("header is not valid ASCII".to_string()))?
            .trim();

        match value.split_once(' ') {
            Some((scheme, token)) if scheme.eq_ignore_ascii_case(&self.prefix) => {
                let token = token.trim();
                if token.is_empty() {
                    return Err(TokenError::MalformedToken("empty token".to_string()));
                }
                Ok(Some(token.to_string()))
            }
            _ => Err(TokenError::MalformedToken(format!(
                "header must use '{} <token>' format",
                self.prefix
            ))),
        }
    }
}
