use std::sync::Arc;

use clap::Parser;
use miette::Result;
use perimeter::access::{web, AccessService};
use perimeter::{settings, storage};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "perimeter",
    version,
    about = "Policy-constraint enforcement service"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    // load settings
    let settings = settings::Settings::load(&cli.config)?;
    tracing::info!(?settings, "Loaded configuration");

    // init storage (database)
    let db = storage::init(&settings.database).await?;

    // builtin roles, guardrails and policy files
    let service = AccessService::bring_up(db, &settings.access).await?;

    // start web server
    web::serve(&settings, Arc::new(service)).await?;
    Ok(())
}
