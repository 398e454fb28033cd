pub mod manager;
pub mod migrations;
pub mod models;
pub mod repository;
pub mod router;
pub mod session;

pub use manager::{DatabaseError, DatabaseManager};
pub use migrations::{MigrationCatalog, MigrationError, MigrationPlan, MigrationReport, MigrationRunner};
pub use router::{ConnectionRouter, RouterError, TenantConnection};
pub use session::TenantSessions;
