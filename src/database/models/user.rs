use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// A principal bound to exactly one tenant.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TenantUser {
    pub id: i64,
    pub tenant_id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub roles: Vec<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Principal joined with the tenant fields login needs.
#[derive(Debug, Clone, FromRow)]
pub struct LoginRow {
    pub username: String,
    pub password_hash: String,
    pub roles: Vec<String>,
    pub user_active: bool,
    pub tenant_id: i64,
    pub company_name: String,
    pub schema_name: String,
    pub status: String,
    pub tenant_active: bool,
}
