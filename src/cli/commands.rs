use std::path::Path;

use crate::app::{AppContext, GemtrailError, Result};
use crate::domain::RequestTarget;
use crate::navigator::LoadOutcome;

pub async fn open_page(
    ctx: &AppContext,
    url: Option<&str>,
    input: Option<&str>,
    refresh: bool,
    output: Option<&Path>,
) -> Result<()> {
    let url = url.unwrap_or(ctx.config.browser.home.as_str());
    let mut target = RequestTarget::parse(url)?;
    if let Some(input) = input {
        target = target.with_input(input);
    }
    if refresh {
        target = target.refreshed();
    }

    let outcome = match ctx.navigator.load(target).await {
        Err(GemtrailError::UnsupportedScheme { uri, .. }) => {
            println!("Opening {} externally", uri);
            return launch(&uri);
        }
        other => other?,
    };

    match outcome {
        LoadOutcome::Page(page) => {
            eprintln!("{}", page.display_title());
            match output {
                Some(path) => {
                    tokio::fs::write(path, &page.content).await?;
                    println!("Wrote {}", path.display());
                }
                None => print!("{}", page.content),
            }
        }
        LoadOutcome::Download(download) => {
            println!(
                "Saved {} ({}) to {}",
                download.uri,
                download.mime,
                download.path.display()
            );
            launch(&download.path.to_string_lossy())?;
        }
        LoadOutcome::Abandoned => println!("Input declined"),
        LoadOutcome::Busy | LoadOutcome::Superseded => println!("Load cancelled"),
    }

    Ok(())
}

pub fn list_history(ctx: &AppContext, limit: usize) -> Result<()> {
    let visits = ctx.store.recent_visits(limit)?;

    if visits.is_empty() {
        println!("No history");
        return Ok(());
    }

    for visit in visits {
        println!(
            "{}  {}\n    {}",
            visit.visited_at.format("%Y-%m-%d %H:%M"),
            visit.display_title(),
            visit.uri
        );
    }

    Ok(())
}

pub fn clear_history(ctx: &AppContext) -> Result<()> {
    let removed = ctx.store.clear_history()?;
    println!("Removed {} visits", removed);
    Ok(())
}

pub async fn clear_cache(ctx: &AppContext) -> Result<()> {
    ctx.cache.clear().await?;
    ctx.cache.ensure_version(env!("CARGO_PKG_VERSION")).await?;
    println!("Cleared cache at {}", ctx.cache.root().display());
    Ok(())
}

fn launch(target: &str) -> Result<()> {
    open::that(target).map_err(GemtrailError::Io)
}
