use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gemtrail::app::AppContext;
use gemtrail::cli::prompt::StdinPrompter;
use gemtrail::cli::{commands, CacheAction, Cli, Commands};
use gemtrail::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so page HTML on stdout stays clean
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    let ctx = AppContext::new(config, Arc::new(StdinPrompter)).await?;

    match cli.command {
        Commands::Open {
            url,
            input,
            refresh,
            output,
        } => {
            commands::open_page(
                &ctx,
                url.as_deref(),
                input.as_deref(),
                refresh,
                output.as_deref(),
            )
            .await?;
        }
        Commands::History { limit, clear } => {
            if clear {
                commands::clear_history(&ctx)?;
            } else {
                commands::list_history(&ctx, limit)?;
            }
        }
        Commands::Cache { action } => match action {
            CacheAction::Clear => commands::clear_cache(&ctx).await?,
        },
    }

    Ok(())
}
