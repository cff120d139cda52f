mod commands;
mod logging;

use anyhow::Result;
use clap::Parser;
use snippets_auth::{SessionManager, Settings};

#[derive(Debug, Parser)]
#[command(name = "snippets", version, about = "Manage your snippet manager session")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, env = "SNIPPETS_CONFIG", default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: commands::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (log_path, _guard) = logging::init_logging()?;
    tracing::debug!(log = %log_path.display(), "Logging initialized");

    let settings = Settings::from_file(&cli.config)?;
    settings
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration validation failed: {}", e))?;

    let session = SessionManager::from_settings(&settings)?;
    commands::run(cli.command, &session).await
}
