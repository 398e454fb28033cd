pub mod tenant;
pub mod user;

pub use tenant::{TenantRecord, TenantRow};
pub use user::{LoginRow, TenantUser};
