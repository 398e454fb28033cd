pub mod auth;
pub mod response;

pub use auth::{require_identity, tenant_boundary, BoundaryState};
pub use response::{ApiResponse, ApiResult};
