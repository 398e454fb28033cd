use futures::future::BoxFuture;
use sqlx::PgConnection;
use tracing::{debug, warn};

use crate::database::router::{ConnectionRouter, RouterError, TenantConnection};
use crate::tenant::TenantResolver;

/// Opens database sessions for whichever tenant the current request is
/// bound to. Business code goes through here and never sees tokens, the
/// context slot or the pool.
#[derive(Clone)]
pub struct TenantSessions {
    router: ConnectionRouter,
    resolver: TenantResolver,
}

impl TenantSessions {
    pub fn new(router: ConnectionRouter, resolver: TenantResolver) -> Self {
        Self { router, resolver }
    }

    pub fn resolver(&self) -> &TenantResolver {
        &self.resolver
    }

    /// Resolves the schema now and checks out a connection bound to it.
    pub async fn open(&self) -> Result<TenantConnection, RouterError> {
        let schema = self.resolver.resolve();
        debug!(%schema, "opening tenant session");
        self.router.acquire_for_tenant(&schema).await
    }

    /// Runs `work` on a fresh session and always hands the connection back
    /// to the router afterwards. A failed reset is logged; the connection
    /// has already been discarded by then, so the work's result stands.
    pub async fn with_session<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c mut PgConnection) -> BoxFuture<'c, Result<T, E>>,
        E: From<RouterError>,
    {
        let mut conn = self.open().await?;
        let schema = conn.schema().to_string();
        let outcome = work(&mut *conn).await;
        if let Err(e) = self.router.release(&schema, conn).await {
            warn!(%schema, error = %e, "session connection discarded on release");
        }
        outcome
    }
}
