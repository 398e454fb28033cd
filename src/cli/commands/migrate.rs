use clap::Subcommand;
use serde_json::json;

use crate::cli::utils::*;
use crate::cli::{AdminContext, OutputFormat};

#[derive(Subcommand)]
pub enum MigrateCommands {
    #[command(about = "Apply the shared set (tenant registry) to the default schema")]
    Shared,
}

pub async fn handle(cmd: MigrateCommands, ctx: &AdminContext, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        MigrateCommands::Shared => {
            let report = ctx.provisioning.migrate_shared().await?;
            output_success(
                &output_format,
                &format!(
                    "Schema '{}': {} applied, {} already applied",
                    report.schema,
                    report.applied.len(),
                    report.already_applied
                ),
                Some(json!({ "report": report })),
            )
        }
    }
}
