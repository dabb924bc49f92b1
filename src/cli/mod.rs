pub mod commands;
pub mod prompt;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "gemtrail")]
#[command(about = "A Gemini browser core", long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load a page and print it as HTML
    Open {
        /// URL to open (defaults to the configured home page)
        url: Option<String>,

        /// Answer to send if the server asks for input
        #[arg(short, long)]
        input: Option<String>,

        /// Ignore the page cache
        #[arg(short, long)]
        refresh: bool,

        /// Write the HTML to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show recently visited pages
    History {
        /// Number of visits to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,

        /// Delete all recorded visits instead
        #[arg(long)]
        clear: bool,
    },
    /// Manage the page and image cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
pub enum CacheAction {
    /// Remove every cached page and image
    Clear,
}
