//! Queries against the shared tenant registry.
//!
//! Every function takes the executor explicitly so callers decide whether
//! it runs inside a transaction. Table names are unqualified; callers pass a
//! connection sitting on the default schema.

use sqlx::PgConnection;

use crate::database::models::{LoginRow, TenantRecord, TenantRow, TenantUser};
use crate::types::{IndustryType, TenantStatus};

const TENANT_COLUMNS: &str =
    "id, company_name, schema_name, industry_type, status, active, created_at, updated_at";

pub struct TenantRepository;

impl TenantRepository {
    pub async fn find_by_id(conn: &mut PgConnection, id: i64) -> Result<Option<TenantRecord>, sqlx::Error> {
        let row: Option<TenantRow> =
            sqlx::query_as(&format!("SELECT {TENANT_COLUMNS} FROM tenants WHERE id = $1"))
                .bind(id)
                .fetch_optional(&mut *conn)
                .await?;
        row.map(TenantRecord::try_from).transpose()
    }

    pub async fn list(conn: &mut PgConnection) -> Result<Vec<TenantRecord>, sqlx::Error> {
        let rows: Vec<TenantRow> =
            sqlx::query_as(&format!("SELECT {TENANT_COLUMNS} FROM tenants ORDER BY id"))
                .fetch_all(&mut *conn)
                .await?;
        rows.into_iter().map(TenantRecord::try_from).collect()
    }

    pub async fn company_name_exists(conn: &mut PgConnection, company_name: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM tenants WHERE lower(company_name) = lower($1))")
            .bind(company_name)
            .fetch_one(&mut *conn)
            .await
    }

    pub async fn schema_name_exists(conn: &mut PgConnection, schema_name: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM tenants WHERE schema_name = $1)")
            .bind(schema_name)
            .fetch_one(&mut *conn)
            .await
    }

    pub async fn insert(
        conn: &mut PgConnection,
        company_name: &str,
        schema_name: &str,
        industry_type: IndustryType,
    ) -> Result<TenantRecord, sqlx::Error> {
        let row: TenantRow = sqlx::query_as(&format!(
            "INSERT INTO tenants (company_name, schema_name, industry_type, status) \
             VALUES ($1, $2, $3, $4) RETURNING {TENANT_COLUMNS}"
        ))
        .bind(company_name)
        .bind(schema_name)
        .bind(industry_type.as_str())
        .bind(TenantStatus::Provisioning.as_str())
        .fetch_one(&mut *conn)
        .await?;
        TenantRecord::try_from(row)
    }

    pub async fn update_status(conn: &mut PgConnection, id: i64, status: TenantStatus) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE tenants SET status = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn deactivate(conn: &mut PgConnection, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE tenants SET active = false, updated_at = now() WHERE id = $1")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}

pub struct UserRepository;

impl UserRepository {
    pub async fn username_exists(conn: &mut PgConnection, username: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM tenant_users WHERE username = $1)")
            .bind(username)
            .fetch_one(&mut *conn)
            .await
    }

    pub async fn email_exists(conn: &mut PgConnection, email: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM tenant_users WHERE lower(email) = lower($1))")
            .bind(email)
            .fetch_one(&mut *conn)
            .await
    }

    pub async fn insert(
        conn: &mut PgConnection,
        tenant_id: i64,
        username: &str,
        email: &str,
        password_hash: &str,
        roles: &[String],
    ) -> Result<TenantUser, sqlx::Error> {
        sqlx::query_as(
            "INSERT INTO tenant_users (tenant_id, username, email, password_hash, roles) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, tenant_id, username, email, password_hash, roles, active, created_at",
        )
        .bind(tenant_id)
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .bind(roles)
        .fetch_one(&mut *conn)
        .await
    }

    pub async fn find_login(conn: &mut PgConnection, username: &str) -> Result<Option<LoginRow>, sqlx::Error> {
        sqlx::query_as(
            "SELECT u.username, u.password_hash, u.roles, u.active AS user_active, \
                    t.id AS tenant_id, t.company_name, t.schema_name, t.status, t.active AS tenant_active \
             FROM tenant_users u JOIN tenants t ON t.id = u.tenant_id \
             WHERE u.username = $1",
        )
        .bind(username)
        .fetch_optional(&mut *conn)
        .await
    }
}
