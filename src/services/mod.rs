pub mod auth_service;
pub mod provisioning_service;

pub use auth_service::{AuthError, AuthService, LoginOutcome};
pub use provisioning_service::{
    ProvisionedTenant, ProvisioningError, ProvisioningService, ProvisioningStage, RegisteredTenant,
    TenantMigrationOutcome, TenantRegistration,
};
