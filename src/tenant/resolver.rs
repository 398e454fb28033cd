use super::context;

/// Chooses the schema a new database session should run against.
///
/// Called every time a session is opened, possibly several times per
/// request, so it only reads the task-local context and never touches the
/// database.
#[derive(Debug, Clone)]
pub struct TenantResolver {
    default_schema: String,
}

impl TenantResolver {
    pub fn new(default_schema: impl Into<String>) -> Self {
        Self {
            default_schema: default_schema.into(),
        }
    }

    /// Schema bound to the current request, or the default schema when the
    /// code runs outside any tenant request (public routes, background jobs).
    pub fn resolve(&self) -> String {
        context::current_schema().unwrap_or_else(|| self.default_schema.clone())
    }

    pub fn default_schema(&self) -> &str {
        &self.default_schema
    }

    /// True when no tenant is bound and [`resolve`](Self::resolve) falls back.
    pub fn is_default(&self) -> bool {
        context::current_schema().is_none()
    }
}

/// Read-only accessor for repository and query code that only needs to know
/// which schema it is running against.
///
/// Inside a request the fallback is the default schema of the resolver the
/// boundary was built with. Outside any request it is the process config.
pub fn current_tenant_schema() -> String {
    if let Some(schema) = context::current_schema() {
        return schema;
    }
    match context::default_schema() {
        Some(schema) => schema.to_string(),
        None => crate::config::config().database.default_schema.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenant::context::{self, TenantScope};

    #[test]
    fn falls_back_to_default_schema_outside_requests() {
        let resolver = TenantResolver::new("public");
        assert_eq!(resolver.resolve(), "public");
        assert!(resolver.is_default());
    }

    #[tokio::test]
    async fn falls_back_when_scope_is_empty() {
        let resolver = TenantResolver::new("shared");
        context::scope(async {
            assert_eq!(resolver.resolve(), "shared");
        })
        .await;
    }

    #[tokio::test]
    async fn accessor_follows_the_boundary_default() {
        context::scope_with_default(std::sync::Arc::from("registry"), async {
            assert_eq!(current_tenant_schema(), "registry");
            let _guard = context::set(TenantScope::new("tenant_acme")).unwrap();
            assert_eq!(current_tenant_schema(), "tenant_acme");
        })
        .await;
    }

    #[tokio::test]
    async fn returns_bound_schema_consistently() {
        let resolver = TenantResolver::new("public");
        context::scope(async {
            let _guard = context::set(TenantScope::new("tenant_acme")).unwrap();
            for _ in 0..3 {
                assert_eq!(resolver.resolve(), "tenant_acme");
                tokio::task::yield_now().await;
            }
            assert!(!resolver.is_default());
        })
        .await;
    }
}
