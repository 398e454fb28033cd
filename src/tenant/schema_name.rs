//! Tenant schema naming.
//!
//! Every tenant schema is `tenant_` followed by lowercase ASCII letters,
//! digits and underscores. Names are validated before they are ever
//! interpolated into SQL, and quoted on top of that.

use std::fmt;

pub const TENANT_SCHEMA_PREFIX: &str = "tenant_";

/// Postgres truncates identifiers longer than this.
const MAX_IDENTIFIER_BYTES: usize = 63;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaNameError {
    #[error("schema identifier must not be empty")]
    Empty,
    #[error("schema identifier '{0}' may only contain lowercase letters, digits and underscores")]
    InvalidCharacters(String),
    #[error("schema name '{0}' exceeds {MAX_IDENTIFIER_BYTES} bytes")]
    TooLong(String),
    #[error("'{0}' is not a tenant schema name")]
    NotTenantSchema(String),
}

/// A validated `tenant_*` schema name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantSchemaName(String);

impl TenantSchemaName {
    /// Derives the schema name from the identifier a registrant chose,
    /// e.g. `acme` becomes `tenant_acme`.
    pub fn from_identifier(identifier: &str) -> Result<Self, SchemaNameError> {
        let identifier = identifier.trim().to_ascii_lowercase();
        if identifier.is_empty() {
            return Err(SchemaNameError::Empty);
        }
        if !identifier
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(SchemaNameError::InvalidCharacters(identifier));
        }
        Self::parse(&format!("{TENANT_SCHEMA_PREFIX}{identifier}"))
    }

    /// Accepts an already-prefixed name, as carried in a token or stored in
    /// the tenant registry.
    pub fn parse(name: &str) -> Result<Self, SchemaNameError> {
        let Some(suffix) = name.strip_prefix(TENANT_SCHEMA_PREFIX) else {
            return Err(SchemaNameError::NotTenantSchema(name.to_string()));
        };
        if suffix.is_empty() {
            return Err(SchemaNameError::NotTenantSchema(name.to_string()));
        }
        if name.len() > MAX_IDENTIFIER_BYTES {
            return Err(SchemaNameError::TooLong(name.to_string()));
        }
        if !suffix
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(SchemaNameError::InvalidCharacters(name.to_string()));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for TenantSchemaName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TenantSchemaName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Plain unquoted identifier check used for the configured default schema.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    name.len() <= MAX_IDENTIFIER_BYTES
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Quote SQL identifier to prevent injection
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
