use std::sync::Arc;
use std::time::Duration;

use sqlx::{postgres::PgPoolOptions, Executor, PgPool};
use thiserror::Error;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::tenant::quote_ident;

/// Errors from DatabaseManager
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid default schema: {0}")]
    InvalidDefaultSchema(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Owns the single connection pool shared by every tenant.
///
/// Fresh physical connections are pinned to the default schema as soon as
/// they are opened, so the pool only ever holds connections whose active
/// schema is the default one.
#[derive(Clone)]
pub struct DatabaseManager {
    pool: PgPool,
    default_schema: Arc<str>,
}

impl DatabaseManager {
    /// Connects eagerly, failing fast when the database is unreachable.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let options = Self::pool_options(config)?;
        let pool = options.connect(&config.url).await?;
        info!(
            "Created database pool for {} (default schema '{}')",
            config.redacted_url(),
            config.default_schema
        );
        Ok(Self {
            pool,
            default_schema: Arc::from(config.default_schema.as_str()),
        })
    }

    /// Builds the pool without opening any connection yet.
    pub fn connect_lazy(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let options = Self::pool_options(config)?;
        let pool = options.connect_lazy(&config.url)?;
        Ok(Self {
            pool,
            default_schema: Arc::from(config.default_schema.as_str()),
        })
    }

    fn pool_options(config: &DatabaseConfig) -> Result<PgPoolOptions, DatabaseError> {
        if config.url.is_empty() {
            return Err(DatabaseError::ConfigMissing("DATABASE_URL"));
        }
        if !crate::tenant::schema_name::is_valid_identifier(&config.default_schema) {
            return Err(DatabaseError::InvalidDefaultSchema(config.default_schema.clone()));
        }

        let pin_default = Arc::<str>::from(format!(
            "SET search_path TO {}",
            quote_ident(&config.default_schema)
        ));

        Ok(PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .test_before_acquire(config.test_before_acquire)
            .after_connect(move |conn, _meta| {
                let statement = Arc::clone(&pin_default);
                Box::pin(async move {
                    conn.execute(&*statement).await?;
                    Ok(())
                })
            }))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn default_schema(&self) -> &str {
        &self.default_schema
    }

    /// Pings the pool to ensure connectivity
    pub async fn health_check(&self) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Close the pool (e.g., on shutdown)
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Closed database pool");
    }
}
