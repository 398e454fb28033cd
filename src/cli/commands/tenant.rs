use clap::Subcommand;
use serde_json::json;

use crate::cli::utils::*;
use crate::cli::{AdminContext, OutputFormat};

#[derive(Subcommand)]
pub enum TenantCommands {
    #[command(about = "List all tenants")]
    List,

    #[command(about = "Show tenant information")]
    Show {
        #[arg(help = "Tenant ID")]
        id: i64,
    },

    #[command(about = "Re-run schema creation and migrations for one tenant")]
    Retry {
        #[arg(help = "Tenant ID")]
        id: i64,
    },

    #[command(about = "Migrate every active tenant schema to its current plan")]
    MigrateAll,

    #[command(about = "Deactivate tenant (rows and schema are kept)")]
    Deactivate {
        #[arg(help = "Tenant ID")]
        id: i64,
    },
}

pub async fn handle(cmd: TenantCommands, ctx: &AdminContext, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        TenantCommands::List => {
            let tenants = ctx.provisioning.list_tenants().await?;
            if tenants.is_empty() {
                return output_empty_collection(&output_format, "tenants", "No tenants registered");
            }

            match output_format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&json!({ "tenants": tenants }))?);
                }
                OutputFormat::Text => {
                    println!(
                        "{:<6} {:<25} {:<25} {:<12} {:<20} {}",
                        "ID", "COMPANY", "SCHEMA", "INDUSTRY", "STATUS", "ACTIVE"
                    );
                    println!("{}", "-".repeat(96));
                    for t in &tenants {
                        println!(
                            "{:<6} {:<25} {:<25} {:<12} {:<20} {}",
                            t.id,
                            t.company_name,
                            t.schema_name,
                            t.industry_type.as_str(),
                            t.status.as_str(),
                            if t.active { "yes" } else { "no" }
                        );
                    }
                }
            }
            Ok(())
        }
        TenantCommands::Show { id } => {
            let tenant = ctx.provisioning.find_tenant(id).await?;
            match output_format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&tenant)?),
                OutputFormat::Text => {
                    println!("ID:        {}", tenant.id);
                    println!("Company:   {}", tenant.company_name);
                    println!("Schema:    {}", tenant.schema_name);
                    println!("Industry:  {}", tenant.industry_type);
                    println!("Status:    {}", tenant.status.as_str());
                    println!("Active:    {}", tenant.active);
                    println!("Created:   {}", tenant.created_at.format("%Y-%m-%d %H:%M"));
                    println!("Updated:   {}", tenant.updated_at.format("%Y-%m-%d %H:%M"));
                }
            }
            Ok(())
        }
        TenantCommands::Retry { id } => {
            let report = ctx.provisioning.retry_infrastructure(id).await?;
            output_success(
                &output_format,
                &format!(
                    "Tenant {} provisioned: {} applied, {} already applied",
                    id,
                    report.applied.len(),
                    report.already_applied
                ),
                Some(json!({ "report": report })),
            )
        }
        TenantCommands::MigrateAll => {
            let outcomes = ctx.provisioning.migrate_all().await?;
            let failed = outcomes.iter().filter(|o| o.result.is_err()).count();

            match output_format {
                OutputFormat::Json => {
                    let rows: Vec<_> = outcomes
                        .iter()
                        .map(|o| match &o.result {
                            Ok(report) => json!({ "tenantId": o.tenant_id, "schema": o.schema_name, "report": report }),
                            Err(e) => json!({ "tenantId": o.tenant_id, "schema": o.schema_name, "error": e.to_string() }),
                        })
                        .collect();
                    println!("{}", serde_json::to_string_pretty(&json!({ "tenants": rows, "failed": failed }))?);
                }
                OutputFormat::Text => {
                    for o in &outcomes {
                        match &o.result {
                            Ok(report) => println!("✓ {:<25} {} applied", o.schema_name, report.applied.len()),
                            Err(e) => println!("✗ {:<25} {}", o.schema_name, e),
                        }
                    }
                }
            }

            if failed > 0 {
                anyhow::bail!("{failed} tenant(s) failed to migrate");
            }
            Ok(())
        }
        TenantCommands::Deactivate { id } => {
            ctx.provisioning.deactivate(id).await?;
            output_success(&output_format, &format!("Tenant {id} deactivated"), None)
        }
    }
}
