// handlers/public/auth/register.rs - POST /auth/register handler

use axum::{extract::State, Json};

use crate::app::AppState;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::{ProvisionedTenant, TenantRegistration};

/// POST /auth/register - Onboard a new tenant
///
/// Commits the tenant record and its administrator, then creates and
/// migrates the tenant schema.
///
/// Expected Input:
/// ```json
/// {
///   "companyName": "Acme",
///   "schemaIdentifier": "acme",
///   "industryType": "retail",
///   "adminUsername": "acme_admin",
///   "adminEmail": "admin@acme.test",
///   "adminPassword": "..."
/// }
/// ```
///
/// Errors: 400 for invalid fields, 409 naming the duplicate field, and 500
/// `PROVISIONING_INCOMPLETE` when the record was committed but the schema
/// could not be built.
pub async fn register_post(
    State(state): State<AppState>,
    Json(registration): Json<TenantRegistration>,
) -> ApiResult<ProvisionedTenant> {
    let provisioned = state.provisioning.register(registration).await?;
    Ok(ApiResponse::created(provisioned))
}
