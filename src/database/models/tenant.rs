use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use crate::types::{IndustryType, TenantStatus};

/// Row of the shared `tenants` registry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantRecord {
    pub id: i64,
    pub company_name: String,
    pub schema_name: String,
    pub industry_type: IndustryType,
    pub status: TenantStatus,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TenantRecord {
    /// Active flag set and infrastructure confirmed.
    pub fn is_usable(&self) -> bool {
        self.active && self.status == TenantStatus::Active
    }
}

/// Raw column values as stored; enums are kept as text in the table.
#[derive(Debug, Clone, FromRow)]
pub struct TenantRow {
    pub id: i64,
    pub company_name: String,
    pub schema_name: String,
    pub industry_type: String,
    pub status: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<TenantRow> for TenantRecord {
    type Error = sqlx::Error;

    fn try_from(row: TenantRow) -> Result<Self, Self::Error> {
        let industry_type = row
            .industry_type
            .parse::<IndustryType>()
            .map_err(|e| sqlx::Error::Decode(e.into()))?;
        let status = row
            .status
            .parse::<TenantStatus>()
            .map_err(|e| sqlx::Error::Decode(e.into()))?;

        Ok(Self {
            id: row.id,
            company_name: row.company_name,
            schema_name: row.schema_name,
            industry_type,
            status,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(industry: &str, status: &str) -> TenantRow {
        let now = Utc::now();
        TenantRow {
            id: 1,
            company_name: "Acme".to_string(),
            schema_name: "tenant_acme".to_string(),
            industry_type: industry.to_string(),
            status: status.to_string(),
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn converts_text_columns_into_enums() {
        let record = TenantRecord::try_from(row("retail", "active")).unwrap();
        assert_eq!(record.industry_type, IndustryType::Retail);
        assert_eq!(record.status, TenantStatus::Active);
        assert!(record.is_usable());

        let pending = TenantRecord::try_from(row("general", "provisioning")).unwrap();
        assert!(!pending.is_usable());
    }

    #[test]
    fn unknown_column_values_fail_decoding() {
        assert!(matches!(
            TenantRecord::try_from(row("mining", "active")),
            Err(sqlx::Error::Decode(_))
        ));
        assert!(matches!(
            TenantRecord::try_from(row("retail", "archived")),
            Err(sqlx::Error::Decode(_))
        ));
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let record = TenantRecord::try_from(row("services", "provisioning_failed")).unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["schemaName"], "tenant_acme");
        assert_eq!(json["industryType"], "services");
        assert_eq!(json["status"], "provisioning_failed");
    }
}
