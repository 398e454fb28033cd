//! Shared types used across the codebase

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Business category a tenant declares at registration. Selects which
/// category-specific migration set is applied on top of the common one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndustryType {
    Retail,
    Hospitality,
    Services,
    General,
}

impl IndustryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndustryType::Retail => "retail",
            IndustryType::Hospitality => "hospitality",
            IndustryType::Services => "services",
            IndustryType::General => "general",
        }
    }

    /// Directory holding this category's migration scripts, if it has any.
    pub fn migration_set(&self) -> Option<&'static str> {
        match self {
            IndustryType::General => None,
            other => Some(other.as_str()),
        }
    }
}

impl fmt::Display for IndustryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndustryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "retail" => Ok(IndustryType::Retail),
            "hospitality" => Ok(IndustryType::Hospitality),
            "services" => Ok(IndustryType::Services),
            "general" => Ok(IndustryType::General),
            other => Err(format!("unknown industry type '{other}'")),
        }
    }
}

/// Lifecycle of a tenant's infrastructure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    /// Metadata committed, schema not yet confirmed.
    Provisioning,
    Active,
    /// Metadata committed but schema creation or migration failed.
    ProvisioningFailed,
}

impl TenantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantStatus::Provisioning => "provisioning",
            TenantStatus::Active => "active",
            TenantStatus::ProvisioningFailed => "provisioning_failed",
        }
    }
}

impl FromStr for TenantStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "provisioning" => Ok(TenantStatus::Provisioning),
            "active" => Ok(TenantStatus::Active),
            "provisioning_failed" => Ok(TenantStatus::ProvisioningFailed),
            other => Err(format!("unknown tenant status '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn industry_selects_migration_set() {
        assert_eq!(IndustryType::Retail.migration_set(), Some("retail"));
        assert_eq!(IndustryType::General.migration_set(), None);
        assert_eq!("Hospitality".parse::<IndustryType>(), Ok(IndustryType::Hospitality));
        assert!("mining".parse::<IndustryType>().is_err());
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [TenantStatus::Provisioning, TenantStatus::Active, TenantStatus::ProvisioningFailed] {
            assert_eq!(status.as_str().parse::<TenantStatus>(), Ok(status));
        }
    }
}
