//! Tenant identity, per-request context and schema resolution.

pub mod context;
pub mod resolver;
pub mod schema_name;

pub use context::{current_schema, TenantScope};
pub use resolver::{current_tenant_schema, TenantResolver};
pub use schema_name::{quote_ident, TenantSchemaName};
