//! Versioned SQL migrations for the shared schema and tenant schemas.
//!
//! Scripts are plain files named `V<version>__<description>.sql`. The
//! migration root is laid out as:
//!
//! ```text
//! migrations/
//!   shared/              applied to the default schema
//!   tenant/common/       applied to every tenant schema
//!   tenant/<industry>/   applied on top for tenants of that industry
//! ```
//!
//! Applied versions are recorded per schema in `schema_history`, together
//! with a SHA-256 checksum of the script.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use sqlx::{Connection, Executor, PgConnection};
use thiserror::Error;
use tracing::{debug, info};

use crate::tenant::quote_ident;
use crate::types::IndustryType;

pub const SHARED_SET: &str = "shared";
pub const COMMON_SET: &str = "common";

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("migration set '{set}' not found at {path}")]
    MissingSet { set: String, path: PathBuf },

    #[error("failed to read migration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("migration version {version} is defined by both '{first}' and '{second}'")]
    DuplicateVersion { version: i64, first: String, second: String },

    #[error("migration V{version} was changed after it was applied to schema '{schema}'")]
    ChecksumMismatch { schema: String, version: i64 },

    #[error("migration V{version} failed on schema '{schema}': {source}")]
    Apply {
        schema: String,
        version: i64,
        #[source]
        source: sqlx::Error,
    },

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationScript {
    pub version: i64,
    pub description: String,
    pub script_set: String,
    pub sql: String,
    pub checksum: String,
}

impl MigrationScript {
    pub fn new(version: i64, description: impl Into<String>, script_set: impl Into<String>, sql: impl Into<String>) -> Self {
        let sql = sql.into();
        let checksum = format!("{:x}", Sha256::digest(sql.as_bytes()));
        Self {
            version,
            description: description.into(),
            script_set: script_set.into(),
            sql,
            checksum,
        }
    }

    /// `V12__add_orders.sql` -> `(12, "add orders")`
    fn parse_file_name(name: &str) -> Option<(i64, String)> {
        let stem = name.strip_suffix(".sql")?;
        let rest = stem.strip_prefix('V')?;
        let (version, description) = rest.split_once("__")?;
        let version = version.parse::<i64>().ok()?;
        Some((version, description.replace('_', " ")))
    }
}

/// Ordered set of scripts destined for one schema.
#[derive(Debug, Clone, Default)]
pub struct MigrationPlan {
    scripts: Vec<MigrationScript>,
}

impl MigrationPlan {
    /// Merges sets by version, rejecting versions defined twice.
    pub fn merge(sets: Vec<Vec<MigrationScript>>) -> Result<Self, MigrationError> {
        let mut by_version: BTreeMap<i64, MigrationScript> = BTreeMap::new();
        for script in sets.into_iter().flatten() {
            if let Some(existing) = by_version.get(&script.version) {
                return Err(MigrationError::DuplicateVersion {
                    version: script.version,
                    first: existing.script_set.clone(),
                    second: script.script_set,
                });
            }
            by_version.insert(script.version, script);
        }
        Ok(Self {
            scripts: by_version.into_values().collect(),
        })
    }

    pub fn scripts(&self) -> &[MigrationScript] {
        &self.scripts
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    pub fn latest_version(&self) -> Option<i64> {
        self.scripts.last().map(|s| s.version)
    }
}

/// Locates migration sets on disk.
#[derive(Debug, Clone)]
pub struct MigrationCatalog {
    root: PathBuf,
}

impl MigrationCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn shared_plan(&self) -> Result<MigrationPlan, MigrationError> {
        let set = load_set(&self.root.join(SHARED_SET), SHARED_SET)?;
        MigrationPlan::merge(vec![set])
    }

    /// Common baseline plus the industry's own set, if it has one.
    pub fn tenant_plan(&self, industry: IndustryType) -> Result<MigrationPlan, MigrationError> {
        let tenant_root = self.root.join("tenant");
        let mut sets = vec![load_set(&tenant_root.join(COMMON_SET), COMMON_SET)?];
        if let Some(name) = industry.migration_set() {
            sets.push(load_set(&tenant_root.join(name), name)?);
        }
        MigrationPlan::merge(sets)
    }
}

/// Reads every `V*__*.sql` file in `dir`. Other files are ignored.
pub fn load_set(dir: &Path, set_name: &str) -> Result<Vec<MigrationScript>, MigrationError> {
    if !dir.is_dir() {
        return Err(MigrationError::MissingSet {
            set: set_name.to_string(),
            path: dir.to_path_buf(),
        });
    }

    let entries = fs::read_dir(dir).map_err(|source| MigrationError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut scripts = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| MigrationError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some((version, description)) = MigrationScript::parse_file_name(name) else {
            debug!(file = %path.display(), "skipping non-migration file");
            continue;
        };
        let sql = fs::read_to_string(&path).map_err(|source| MigrationError::Io {
            path: path.clone(),
            source,
        })?;
        scripts.push(MigrationScript::new(version, description, set_name, sql));
    }
    scripts.sort_by_key(|s| s.version);
    Ok(scripts)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct MigrationReport {
    pub schema: String,
    pub applied: Vec<i64>,
    pub already_applied: usize,
}

/// Applies a plan to one schema.
pub struct MigrationRunner;

impl MigrationRunner {
    /// Brings `schema` up to the plan's latest version. Each script runs in
    /// its own transaction with `search_path` pinned locally to `schema`, so
    /// the connection's session state is untouched afterwards. An advisory
    /// lock per schema serialises concurrent runners.
    pub async fn run(conn: &mut PgConnection, schema: &str, plan: &MigrationPlan) -> Result<MigrationReport, MigrationError> {
        let lock_key = schema_lock_key(schema);
        let history = format!("{}.schema_history", quote_ident(schema));
        let set_local = format!("SET LOCAL search_path TO {}", quote_ident(schema));

        {
            let mut tx = conn.begin().await?;
            sqlx::query("SELECT pg_advisory_xact_lock($1)")
                .bind(lock_key)
                .execute(&mut *tx)
                .await?;
            (&mut *tx).execute(
                format!(
                    "CREATE TABLE IF NOT EXISTS {history} (\
                        version BIGINT PRIMARY KEY, \
                        description TEXT NOT NULL, \
                        script_set TEXT NOT NULL, \
                        checksum TEXT NOT NULL, \
                        applied_at TIMESTAMPTZ NOT NULL DEFAULT now())"
                )
                .as_str(),
            )
            .await?;
            tx.commit().await?;
        }

        let mut report = MigrationReport {
            schema: schema.to_string(),
            ..Default::default()
        };

        for script in plan.scripts() {
            let mut tx = conn.begin().await?;
            sqlx::query("SELECT pg_advisory_xact_lock($1)")
                .bind(lock_key)
                .execute(&mut *tx)
                .await?;

            let recorded: Option<String> =
                sqlx::query_scalar(&format!("SELECT checksum FROM {history} WHERE version = $1"))
                    .bind(script.version)
                    .fetch_optional(&mut *tx)
                    .await?;

            match recorded {
                Some(checksum) if checksum == script.checksum => {
                    report.already_applied += 1;
                    tx.rollback().await?;
                    continue;
                }
                Some(_) => {
                    return Err(MigrationError::ChecksumMismatch {
                        schema: schema.to_string(),
                        version: script.version,
                    });
                }
                None => {}
            }

            (&mut *tx).execute(set_local.as_str()).await?;
            (&mut *tx).execute(script.sql.as_str())
                .await
                .map_err(|source| MigrationError::Apply {
                    schema: schema.to_string(),
                    version: script.version,
                    source,
                })?;

            sqlx::query(&format!(
                "INSERT INTO {history} (version, description, script_set, checksum) VALUES ($1, $2, $3, $4)"
            ))
            .bind(script.version)
            .bind(&script.description)
            .bind(&script.script_set)
            .bind(&script.checksum)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;

            info!(schema, version = script.version, set = %script.script_set, "applied migration {}", script.description);
            report.applied.push(script.version);
        }

        Ok(report)
    }
}

/// Stable advisory-lock key for a schema (FNV-1a, clamped positive).
fn schema_lock_key(schema: &str) -> i64 {
    const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    let mut hash = FNV_OFFSET_BASIS;
    for byte in schema.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    (hash & 0x7FFF_FFFF_FFFF_FFFF) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, sql: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(name), sql).unwrap();
    }

    #[test]
    fn parses_versioned_file_names() {
        assert_eq!(
            MigrationScript::parse_file_name("V3__create_orders.sql"),
            Some((3, "create orders".to_string()))
        );
        assert_eq!(MigrationScript::parse_file_name("README.md"), None);
        assert_eq!(MigrationScript::parse_file_name("V__missing.sql"), None);
        assert_eq!(MigrationScript::parse_file_name("Vx__bad.sql"), None);
        assert_eq!(MigrationScript::parse_file_name("V1_single_underscore.sql"), None);
    }

    #[test]
    fn tenant_plan_merges_common_and_industry_sets_in_order() {
        let root = tempfile::tempdir().unwrap();
        let tenant = root.path().join("tenant");
        write(&tenant.join("common"), "V2__products.sql", "create table products ();");
        write(&tenant.join("common"), "V1__customers.sql", "create table customers ();");
        write(&tenant.join("common"), "notes.txt", "ignored");
        write(&tenant.join("retail"), "V100__stock.sql", "create table stock ();");

        let catalog = MigrationCatalog::new(root.path());

        let retail = catalog.tenant_plan(IndustryType::Retail).unwrap();
        let versions: Vec<i64> = retail.scripts().iter().map(|s| s.version).collect();
        assert_eq!(versions, vec![1, 2, 100]);
        assert_eq!(retail.scripts()[2].script_set, "retail");
        assert_eq!(retail.latest_version(), Some(100));

        let general = catalog.tenant_plan(IndustryType::General).unwrap();
        assert_eq!(general.scripts().len(), 2);
    }

    #[test]
    fn missing_industry_set_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        write(&root.path().join("tenant").join("common"), "V1__base.sql", "select 1;");
        let catalog = MigrationCatalog::new(root.path());
        assert!(matches!(
            catalog.tenant_plan(IndustryType::Hospitality),
            Err(MigrationError::MissingSet { set, .. }) if set == "hospitality"
        ));
    }

    #[test]
    fn duplicate_versions_across_sets_are_rejected() {
        let plan = MigrationPlan::merge(vec![
            vec![MigrationScript::new(1, "base", "common", "select 1;")],
            vec![MigrationScript::new(1, "clash", "services", "select 2;")],
        ]);
        assert!(matches!(
            plan,
            Err(MigrationError::DuplicateVersion { version: 1, ref first, ref second })
                if first == "common" && second == "services"
        ));
    }

    #[test]
    fn checksum_tracks_script_content() {
        let a = MigrationScript::new(1, "x", "common", "select 1;");
        let b = MigrationScript::new(1, "x", "common", "select 1;");
        let c = MigrationScript::new(1, "x", "common", "select 2;");
        assert_eq!(a.checksum, b.checksum);
        assert_ne!(a.checksum, c.checksum);
        assert_eq!(a.checksum.len(), 64);
    }

    #[test]
    fn lock_key_is_stable_and_positive() {
        assert_eq!(schema_lock_key("tenant_acme"), schema_lock_key("tenant_acme"));
        assert_ne!(schema_lock_key("tenant_acme"), schema_lock_key("tenant_acme2"));
        assert!(schema_lock_key("tenant_acme") >= 0);
    }

    #[test]
    fn bundled_migrations_load() {
        let catalog = MigrationCatalog::new(Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"));
        assert!(!catalog.shared_plan().unwrap().is_empty());
        for industry in [
            IndustryType::Retail,
            IndustryType::Hospitality,
            IndustryType::Services,
            IndustryType::General,
        ] {
            assert!(catalog.tenant_plan(industry).is_ok(), "plan for {industry}");
        }
    }
}
