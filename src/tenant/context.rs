//! Request-scoped tenant context.
//!
//! One slot per request task, held in a tokio task-local so that deeply
//! nested code can find the tenant without it being passed through every
//! call. Outside a request scope the slot does not exist and reads return
//! `None`, which callers treat as "use the default schema".
//!
//! The boundary also installs the fallback schema of the application
//! serving the request, so [`default_schema`] and the resolver agree.
//!
//! Only the request boundary writes to the slot: [`scope`] opens it,
//! [`set`] fills it once, and the [`ClearGuard`] returned by `set` empties
//! it again when dropped. Everything else reads through [`current`].

use std::cell::RefCell;
use std::future::Future;
use std::sync::Arc;

use thiserror::Error;

tokio::task_local! {
    static TENANT_SLOT: RefCell<Option<TenantScope>>;
    static DEFAULT_SCHEMA: Arc<str>;
}

/// What the boundary knows about the tenant of the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantScope {
    pub schema_name: String,
    pub tenant_id: Option<i64>,
    pub tenant_name: Option<String>,
}

impl TenantScope {
    pub fn new(schema_name: impl Into<String>) -> Self {
        Self {
            schema_name: schema_name.into(),
            tenant_id: None,
            tenant_name: None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("tenant context accessed outside a request scope")]
    OutsideScope,
    #[error("tenant context already holds schema '{0}'")]
    AlreadySet(String),
}

/// Runs `fut` with a fresh, empty tenant slot.
pub(crate) async fn scope<F>(fut: F) -> F::Output
where
    F: Future,
{
    TENANT_SLOT.scope(RefCell::new(None), fut).await
}

/// Like [`scope`], also recording the schema used when no tenant is bound.
pub(crate) async fn scope_with_default<F>(default_schema: Arc<str>, fut: F) -> F::Output
where
    F: Future,
{
    DEFAULT_SCHEMA.scope(default_schema, scope(fut)).await
}

/// Binds the current request to a tenant. The returned guard clears the
/// slot when it goes out of scope, whichever way the request ends.
#[must_use = "dropping the guard clears the tenant context immediately"]
pub(crate) fn set(value: TenantScope) -> Result<ClearGuard, ContextError> {
    TENANT_SLOT
        .try_with(|slot| {
            let mut slot = slot.borrow_mut();
            if let Some(existing) = slot.as_ref() {
                return Err(ContextError::AlreadySet(existing.schema_name.clone()));
            }
            *slot = Some(value);
            Ok(ClearGuard { _private: () })
        })
        .map_err(|_| ContextError::OutsideScope)?
}

/// Empties the slot. A no-op outside a request scope.
pub(crate) fn clear() {
    let _ = TENANT_SLOT.try_with(|slot| {
        slot.borrow_mut().take();
    });
}

/// Tenant bound to the current request, if any.
pub fn current() -> Option<TenantScope> {
    TENANT_SLOT
        .try_with(|slot| slot.borrow().clone())
        .ok()
        .flatten()
}

/// Schema name bound to the current request, if any.
pub fn current_schema() -> Option<String> {
    TENANT_SLOT
        .try_with(|slot| slot.borrow().as_ref().map(|s| s.schema_name.clone()))
        .ok()
        .flatten()
}

/// Fallback schema installed by the request boundary, if any.
pub fn default_schema() -> Option<Arc<str>> {
    DEFAULT_SCHEMA.try_with(Arc::clone).ok()
}

/// Carries the current tenant into a future that will run on another task,
/// e.g. one handed to `tokio::spawn`. Spawned tasks do not inherit
/// task-locals on their own.
pub fn propagate<F>(fut: F) -> impl Future<Output = F::Output>
where
    F: Future,
{
    let snapshot = current();
    let fallback = default_schema();
    async move {
        let slot = TENANT_SLOT.scope(RefCell::new(snapshot), fut);
        match fallback {
            Some(schema) => DEFAULT_SCHEMA.scope(schema, slot).await,
            None => slot.await,
        }
    }
}

/// Clears the tenant slot on drop.
#[derive(Debug)]
pub struct ClearGuard {
    _private: (),
}

impl Drop for ClearGuard {
    fn drop(&mut self) {
        clear();
    }
}
