pub mod commands;
pub mod utils;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::database::{ConnectionRouter, DatabaseManager, MigrationCatalog};
use crate::services::ProvisioningService;

#[derive(Parser)]
#[command(name = "tenancy")]
#[command(about = "Tenancy admin CLI - migrations and tenant remediation")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in human-readable text format")]
    pub text: bool,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Apply migration sets")]
    Migrate {
        #[command(subcommand)]
        cmd: commands::migrate::MigrateCommands,
    },

    #[command(about = "Inspect and repair tenants")]
    Tenant {
        #[command(subcommand)]
        cmd: commands::tenant::TenantCommands,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

/// Database handle plus the provisioning service every command works through.
pub struct AdminContext {
    pub database: DatabaseManager,
    pub provisioning: ProvisioningService,
}

impl AdminContext {
    pub async fn connect(config: &AppConfig) -> anyhow::Result<Self> {
        let database = DatabaseManager::connect(&config.database)
            .await
            .with_context(|| format!("connecting to {}", config.database.redacted_url()))?;
        let router = ConnectionRouter::new(database.pool().clone(), database.default_schema());
        let provisioning = ProvisioningService::new(
            router,
            MigrationCatalog::new(&config.migrations.root_dir),
            config.security.password_hash_cost,
        );
        Ok(Self { database, provisioning })
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);
    let config = crate::config::config();
    config.validate().map_err(anyhow::Error::msg)?;

    let ctx = AdminContext::connect(config).await?;
    let result = match cli.command {
        Commands::Migrate { cmd } => commands::migrate::handle(cmd, &ctx, output_format).await,
        Commands::Tenant { cmd } => commands::tenant::handle(cmd, &ctx, output_format).await,
    };
    ctx.database.close().await;
    result
}
