//! Tenant onboarding.
//!
//! Registration runs in two phases that are never merged into one
//! transaction: the metadata phase commits the registry rows in the default
//! schema, then the infrastructure phase creates the tenant schema and
//! migrates it. A failure in the second phase leaves committed metadata
//! behind and is reported as [`ProvisioningError::FailedAfterMetadataCommitted`].

use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::{Connection, Executor};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::auth::password::{hash_password, PasswordError};
use crate::database::models::{TenantRecord, TenantUser};
use crate::database::repository::{TenantRepository, UserRepository};
use crate::database::{ConnectionRouter, MigrationCatalog, MigrationError, MigrationReport, MigrationRunner, RouterError};
use crate::tenant::schema_name::SchemaNameError;
use crate::tenant::{quote_ident, TenantSchemaName};
use crate::types::{IndustryType, TenantStatus};

pub const TENANT_ADMIN_ROLE: &str = "TENANT_ADMIN";

const MIN_PASSWORD_LEN: usize = 8;
const MAX_NAME_LEN: usize = 255;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantRegistration {
    pub company_name: String,
    pub schema_identifier: String,
    pub industry_type: IndustryType,
    pub admin_username: String,
    pub admin_email: String,
    pub admin_password: String,
}

/// Infrastructure step that was running when provisioning stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningStage {
    CreateSchema,
    LoadMigrations,
    Migrate,
    RecordStatus,
}

impl fmt::Display for ProvisioningStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProvisioningStage::CreateSchema => "create_schema",
            ProvisioningStage::LoadMigrations => "load_migrations",
            ProvisioningStage::Migrate => "migrate",
            ProvisioningStage::RecordStatus => "record_status",
        })
    }
}

#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("invalid {field}: {message}")]
    InvalidField { field: &'static str, message: String },

    #[error("{0} is already taken")]
    DuplicateField(&'static str),

    #[error("tenant {tenant_id} ({schema_name}) was registered but provisioning failed at {stage}: {reason}")]
    FailedAfterMetadataCommitted {
        tenant_id: i64,
        schema_name: String,
        stage: ProvisioningStage,
        reason: String,
    },

    /// A migration run on an already provisioned tenant failed. The failed
    /// script rolled back; the schema stays at its last applied version.
    #[error("tenant {tenant_id} ({schema_name}) failed to migrate at {stage}: {reason}")]
    MigrationFailed {
        tenant_id: i64,
        schema_name: String,
        stage: ProvisioningStage,
        reason: String,
    },

    #[error("tenant {0} not found")]
    TenantNotFound(i64),

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error(transparent)]
    Router(#[from] RouterError),

    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl ProvisioningError {
    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        ProvisioningError::InvalidField {
            field,
            message: message.into(),
        }
    }
}

/// Outcome of the metadata phase.
#[derive(Debug, Clone, Serialize)]
pub struct RegisteredTenant {
    pub tenant: TenantRecord,
    pub admin: TenantUser,
}

/// Outcome of a full registration.
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionedTenant {
    pub tenant: TenantRecord,
    pub admin: TenantUser,
    pub migrations: MigrationReport,
}

/// Per-tenant result of [`ProvisioningService::migrate_all`].
#[derive(Debug)]
pub struct TenantMigrationOutcome {
    pub tenant_id: i64,
    pub schema_name: String,
    pub result: Result<MigrationReport, ProvisioningError>,
}

#[derive(Clone)]
pub struct ProvisioningService {
    router: ConnectionRouter,
    catalog: MigrationCatalog,
    hash_cost: u32,
}

impl ProvisioningService {
    pub fn new(router: ConnectionRouter, catalog: MigrationCatalog, hash_cost: u32) -> Self {
        Self {
            router,
            catalog,
            hash_cost,
        }
    }

    /// Metadata phase followed by infrastructure phase.
    pub async fn register(&self, registration: TenantRegistration) -> Result<ProvisionedTenant, ProvisioningError> {
        let RegisteredTenant { tenant, admin } = self.create_metadata(registration).await?;
        let migrations = self.provision_infrastructure(&tenant).await?;
        let tenant = TenantRecord {
            status: TenantStatus::Active,
            ..tenant
        };
        Ok(ProvisionedTenant {
            tenant,
            admin,
            migrations,
        })
    }

    /// Inserts the tenant record and its administrator in one transaction on
    /// the default schema. Nothing is written when any uniqueness check fails.
    pub async fn create_metadata(&self, registration: TenantRegistration) -> Result<RegisteredTenant, ProvisioningError> {
        let validated = validate(&registration)?;
        let password_hash = hash_password(&registration.admin_password, self.hash_cost).await?;

        let mut conn = self.router.acquire_generic().await?;
        let mut tx = conn.begin().await?;

        if TenantRepository::company_name_exists(&mut tx, &validated.company_name).await? {
            return Err(ProvisioningError::DuplicateField("companyName"));
        }
        if TenantRepository::schema_name_exists(&mut tx, validated.schema_name.as_str()).await? {
            return Err(ProvisioningError::DuplicateField("schemaName"));
        }
        if UserRepository::username_exists(&mut tx, &validated.username).await? {
            return Err(ProvisioningError::DuplicateField("username"));
        }
        if UserRepository::email_exists(&mut tx, &validated.email).await? {
            return Err(ProvisioningError::DuplicateField("email"));
        }

        let tenant = TenantRepository::insert(
            &mut tx,
            &validated.company_name,
            validated.schema_name.as_str(),
            registration.industry_type,
        )
        .await
        .map_err(duplicate_or_database)?;

        let admin = UserRepository::insert(
            &mut tx,
            tenant.id,
            &validated.username,
            &validated.email,
            &password_hash,
            &[TENANT_ADMIN_ROLE.to_string()],
        )
        .await
        .map_err(duplicate_or_database)?;

        tx.commit().await.map_err(duplicate_or_database)?;

        info!(
            tenant_id = tenant.id,
            schema = %tenant.schema_name,
            industry = %tenant.industry_type,
            "tenant metadata committed"
        );
        Ok(RegisteredTenant { tenant, admin })
    }

    /// Creates and migrates the tenant schema, then marks the tenant active.
    /// Safe to call again for the same tenant.
    pub async fn provision_infrastructure(&self, tenant: &TenantRecord) -> Result<MigrationReport, ProvisioningError> {
        info!(tenant_id = tenant.id, schema = %tenant.schema_name, "provisioning tenant infrastructure");

        let failure = match self.build_schema(tenant).await {
            Ok(report) => match self.record_status(tenant.id, TenantStatus::Active).await {
                Ok(()) => {
                    info!(
                        tenant_id = tenant.id,
                        schema = %tenant.schema_name,
                        applied = report.applied.len(),
                        "tenant infrastructure ready"
                    );
                    return Ok(report);
                }
                Err(e) => (ProvisioningStage::RecordStatus, e.to_string()),
            },
            Err(failure) => failure,
        };

        let (stage, reason) = failure;
        error!(
            tenant_id = tenant.id,
            schema = %tenant.schema_name,
            %stage,
            %reason,
            "tenant infrastructure failed after metadata commit"
        );
        if let Err(e) = self.record_status(tenant.id, TenantStatus::ProvisioningFailed).await {
            warn!(tenant_id = tenant.id, error = %e, "could not flag tenant as provisioning_failed");
        }

        Err(ProvisioningError::FailedAfterMetadataCommitted {
            tenant_id: tenant.id,
            schema_name: tenant.schema_name.clone(),
            stage,
            reason,
        })
    }

    /// Re-runs only the infrastructure phase for an existing tenant. A tenant
    /// that is already active is migrated without touching its status.
    pub async fn retry_infrastructure(&self, tenant_id: i64) -> Result<MigrationReport, ProvisioningError> {
        let tenant = self.find_tenant(tenant_id).await?;
        info!(tenant_id, schema = %tenant.schema_name, status = tenant.status.as_str(), "retrying tenant infrastructure");
        match tenant.status {
            TenantStatus::Active => self.migrate_tenant(&tenant).await,
            _ => self.provision_infrastructure(&tenant).await,
        }
    }

    /// Brings every active tenant schema up to its current plan. A failure
    /// is reported per tenant and never changes the tenant's status.
    pub async fn migrate_all(&self) -> Result<Vec<TenantMigrationOutcome>, ProvisioningError> {
        let tenants = self.list_tenants().await?;
        let mut outcomes = Vec::with_capacity(tenants.len());
        for tenant in tenants.iter().filter(|t| t.active) {
            let result = self.migrate_tenant(tenant).await;
            outcomes.push(TenantMigrationOutcome {
                tenant_id: tenant.id,
                schema_name: tenant.schema_name.clone(),
                result,
            });
        }
        Ok(outcomes)
    }

    /// Runs the tenant's plan against its schema. Only a tenant that never
    /// finished provisioning is marked active on success.
    pub async fn migrate_tenant(&self, tenant: &TenantRecord) -> Result<MigrationReport, ProvisioningError> {
        let report = self.build_schema(tenant).await.map_err(|(stage, reason)| {
            error!(
                tenant_id = tenant.id,
                schema = %tenant.schema_name,
                %stage,
                %reason,
                "tenant migration failed"
            );
            ProvisioningError::MigrationFailed {
                tenant_id: tenant.id,
                schema_name: tenant.schema_name.clone(),
                stage,
                reason,
            }
        })?;

        if tenant.status != TenantStatus::Active {
            self.record_status(tenant.id, TenantStatus::Active).await?;
            info!(tenant_id = tenant.id, previous = tenant.status.as_str(), "tenant marked active after migration");
        }
        Ok(report)
    }

    /// Applies the shared set (tenant registry tables) to the default schema.
    pub async fn migrate_shared(&self) -> Result<MigrationReport, ProvisioningError> {
        let plan = self.catalog.shared_plan()?;
        let mut conn = self.router.acquire_generic().await?;
        let report = MigrationRunner::run(&mut conn, self.router.default_schema(), &plan).await?;
        info!(
            schema = %report.schema,
            applied = report.applied.len(),
            already_applied = report.already_applied,
            "shared schema migrated"
        );
        Ok(report)
    }

    /// `CREATE SCHEMA IF NOT EXISTS`; returns whether the schema was new.
    pub async fn create_schema_if_absent(&self, schema: &TenantSchemaName) -> Result<bool, ProvisioningError> {
        let mut conn = self.router.acquire_generic().await?;
        let existed: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_namespace WHERE nspname = $1)")
            .bind(schema.as_str())
            .fetch_one(&mut *conn)
            .await?;
        (&mut *conn).execute(format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(schema.as_str())).as_str())
            .await?;
        Ok(!existed)
    }

    pub async fn list_tenants(&self) -> Result<Vec<TenantRecord>, ProvisioningError> {
        let mut conn = self.router.acquire_generic().await?;
        Ok(TenantRepository::list(&mut conn).await?)
    }

    pub async fn find_tenant(&self, tenant_id: i64) -> Result<TenantRecord, ProvisioningError> {
        let mut conn = self.router.acquire_generic().await?;
        TenantRepository::find_by_id(&mut conn, tenant_id)
            .await?
            .ok_or(ProvisioningError::TenantNotFound(tenant_id))
    }

    /// Clears the tenant's active flag. Rows and schema stay in place.
    pub async fn deactivate(&self, tenant_id: i64) -> Result<(), ProvisioningError> {
        let mut conn = self.router.acquire_generic().await?;
        if !TenantRepository::deactivate(&mut conn, tenant_id).await? {
            return Err(ProvisioningError::TenantNotFound(tenant_id));
        }
        info!(tenant_id, "tenant deactivated");
        Ok(())
    }

    async fn build_schema(&self, tenant: &TenantRecord) -> Result<MigrationReport, (ProvisioningStage, String)> {
        let schema = TenantSchemaName::parse(&tenant.schema_name)
            .map_err(|e| (ProvisioningStage::CreateSchema, e.to_string()))?;

        let created = self
            .create_schema_if_absent(&schema)
            .await
            .map_err(|e| (ProvisioningStage::CreateSchema, e.to_string()))?;
        if created {
            info!(schema = %schema, "created tenant schema");
        }

        let plan = self
            .catalog
            .tenant_plan(tenant.industry_type)
            .map_err(|e| (ProvisioningStage::LoadMigrations, e.to_string()))?;

        let mut conn = self
            .router
            .acquire_for_tenant(schema.as_str())
            .await
            .map_err(|e| (ProvisioningStage::Migrate, e.to_string()))?;
        let result = MigrationRunner::run(&mut conn, schema.as_str(), &plan).await;
        if let Err(e) = self.router.release(schema.as_str(), conn).await {
            warn!(schema = %schema, error = %e, "migration connection discarded on release");
        }

        result.map_err(|e| (ProvisioningStage::Migrate, e.to_string()))
    }

    async fn record_status(&self, tenant_id: i64, status: TenantStatus) -> Result<(), ProvisioningError> {
        let mut conn = self.router.acquire_generic().await?;
        if !TenantRepository::update_status(&mut conn, tenant_id, status).await? {
            return Err(ProvisioningError::TenantNotFound(tenant_id));
        }
        Ok(())
    }
}

struct ValidatedRegistration {
    company_name: String,
    schema_name: TenantSchemaName,
    username: String,
    email: String,
}

fn validate(registration: &TenantRegistration) -> Result<ValidatedRegistration, ProvisioningError> {
    let company_name = registration.company_name.trim();
    if company_name.is_empty() {
        return Err(ProvisioningError::invalid("companyName", "must not be empty"));
    }
    if company_name.len() > MAX_NAME_LEN {
        return Err(ProvisioningError::invalid("companyName", "is too long"));
    }

    let schema_name = TenantSchemaName::from_identifier(&registration.schema_identifier).map_err(|e| match e {
        SchemaNameError::Empty => ProvisioningError::invalid("schemaIdentifier", "must not be empty"),
        other => ProvisioningError::invalid("schemaIdentifier", other.to_string()),
    })?;

    let username = registration.admin_username.trim();
    if username.len() < 3 || username.len() > 64 {
        return Err(ProvisioningError::invalid("username", "must be between 3 and 64 characters"));
    }
    if username.chars().any(char::is_whitespace) {
        return Err(ProvisioningError::invalid("username", "must not contain whitespace"));
    }

    let email = registration.admin_email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => {}
        _ => return Err(ProvisioningError::invalid("email", "is not a valid address")),
    }

    if registration.admin_password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ProvisioningError::invalid(
            "password",
            format!("must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }

    Ok(ValidatedRegistration {
        company_name: company_name.to_string(),
        schema_name,
        username: username.to_string(),
        email: email.to_string(),
    })
}

/// A concurrent registration can pass the existence checks and still lose
/// the race on a unique constraint; report that as the same field.
fn duplicate_or_database(err: sqlx::Error) -> ProvisioningError {
    match duplicate_field(&err) {
        Some(field) => ProvisioningError::DuplicateField(field),
        None => ProvisioningError::Database(err),
    }
}

fn duplicate_field(err: &sqlx::Error) -> Option<&'static str> {
    let db = err.as_database_error()?;
    if db.code().as_deref() != Some("23505") {
        return None;
    }
    field_for_constraint(db.constraint()?)
}

/// Registration field guarded by a unique constraint or unique index.
pub fn field_for_constraint(constraint: &str) -> Option<&'static str> {
    match constraint {
        "tenants_company_name_key" | "tenants_company_name_lower_key" => Some("companyName"),
        "tenants_schema_name_key" => Some("schemaName"),
        "tenant_users_username_key" => Some("username"),
        "tenant_users_email_key" | "tenant_users_email_lower_key" => Some("email"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration() -> TenantRegistration {
        TenantRegistration {
            company_name: "Acme".to_string(),
            schema_identifier: "acme".to_string(),
            industry_type: IndustryType::Retail,
            admin_username: "acme_admin".to_string(),
            admin_email: "admin@acme.test".to_string(),
            admin_password: "s3cret-pass".to_string(),
        }
    }

    fn invalid_field(result: Result<ValidatedRegistration, ProvisioningError>) -> &'static str {
        match result {
            Err(ProvisioningError::InvalidField { field, .. }) => field,
            Err(other) => panic!("expected InvalidField, got {other}"),
            Ok(_) => panic!("expected InvalidField, got Ok"),
        }
    }

    #[test]
    fn derives_prefixed_schema_name() {
        let validated = validate(&registration()).unwrap();
        assert_eq!(validated.schema_name.as_str(), "tenant_acme");
        assert_eq!(validated.company_name, "Acme");
    }

    #[test]
    fn rejects_bad_fields() {
        let mut r = registration();
        r.company_name = "   ".to_string();
        assert_eq!(invalid_field(validate(&r)), "companyName");

        let mut r = registration();
        r.schema_identifier = "acme-corp".to_string();
        assert_eq!(invalid_field(validate(&r)), "schemaIdentifier");

        let mut r = registration();
        r.admin_username = "a b".to_string();
        assert_eq!(invalid_field(validate(&r)), "username");

        let mut r = registration();
        r.admin_email = "nobody".to_string();
        assert_eq!(invalid_field(validate(&r)), "email");

        let mut r = registration();
        r.admin_password = "short".to_string();
        assert_eq!(invalid_field(validate(&r)), "password");
    }

    #[test]
    fn registration_deserializes_from_camel_case() {
        let r: TenantRegistration = serde_json::from_value(serde_json::json!({
            "companyName": "Acme",
            "schemaIdentifier": "acme",
            "industryType": "hospitality",
            "adminUsername": "acme_admin",
            "adminEmail": "admin@acme.test",
            "adminPassword": "s3cret-pass"
        }))
        .unwrap();
        assert_eq!(r.industry_type, IndustryType::Hospitality);
    }

    #[test]
    fn non_database_errors_are_not_duplicates() {
        assert!(duplicate_field(&sqlx::Error::RowNotFound).is_none());
        assert!(matches!(
            duplicate_or_database(sqlx::Error::RowNotFound),
            ProvisioningError::Database(_)
        ));
    }

    #[test]
    fn case_insensitive_indexes_map_to_fields() {
        assert_eq!(field_for_constraint("tenants_company_name_lower_key"), Some("companyName"));
        assert_eq!(field_for_constraint("tenant_users_email_lower_key"), Some("email"));
        assert_eq!(field_for_constraint("tenants_schema_name_key"), Some("schemaName"));
        assert_eq!(field_for_constraint("tenants_pkey"), None);
    }

    #[test]
    fn stage_renders_in_snake_case() {
        assert_eq!(ProvisioningStage::LoadMigrations.to_string(), "load_migrations");
        assert_eq!(
            serde_json::to_value(ProvisioningStage::RecordStatus).unwrap(),
            serde_json::json!("record_status")
        );
    }
}
