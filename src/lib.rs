//! # gemtrail
//!
//! Retrieval and rendering core of a Gemini browser.
//!
//! ## Architecture
//!
//! One navigation flows through a pipeline:
//!
//! ```text
//! RequestTarget → Navigator → ProtocolClient → gemtext parser → Renderer → RenderedDocument
//!                     ↕                                            ↕
//!                 CacheStore  ←──────────── pages / images ────────┘
//! ```
//!
//! - [`navigator`]: retries, input prompts, cancellation and downloads
//! - [`fetcher`]: Gemini protocol client over rustls
//! - [`renderer`]: gemtext to HTML, with inline image previews
//! - [`store`]: on-disk page/image cache and SQLite visit history
//!
//! ## Quick Start
//!
//! ```bash
//! # Print a capsule as HTML
//! gemtrail open gemini://geminiprotocol.net/
//!
//! # Answer a search prompt up front
//! gemtrail open gemini://kennedy.gemi.dev/search --input "rust"
//!
//! # Recent visits
//! gemtrail history --limit 10
//! ```
//!
//! ## Modules
//!
//! - [`app`]: Application context and error types
//! - [`cli`]: Command-line interface definitions
//! - [`config`]: TOML configuration
//! - [`domain`]: Gemtext lines, protocol responses, pages, visits

/// Application context and error handling.
///
/// The [`AppContext`](app::AppContext) struct wires together all components:
/// cache, history store, protocol clients, renderer, navigator.
pub mod app;

/// Command-line interface using clap.
///
/// - `open [url] [--input] [--refresh] [--output]` - Load and print a page
/// - `history [--limit] [--clear]` - Show or clear recent visits
/// - `cache clear` - Wipe the cache
pub mod cli;

/// Configuration management.
///
/// Loads from `~/.config/gemtrail/config.toml`, with sections for the
/// browser, network, inline images and cache location.
pub mod config;

/// Core domain models.
///
/// - [`GemtextLine`](domain::GemtextLine): one classified line of a gemtext body
/// - [`ProtocolResponse`](domain::ProtocolResponse): terminal outcome of a request
/// - [`RequestTarget`](domain::RequestTarget): URI plus optional user input
pub mod domain;

/// Gemini protocol client.
///
/// - [`ProtocolClient`](fetcher::ProtocolClient): Async trait for one request
/// - [`GeminiClient`](fetcher::GeminiClient): rustls-based implementation with
///   timeout and redirect policy
pub mod fetcher;

/// Request orchestration.
///
/// [`Navigator`](navigator::Navigator) drives one load at a time through
/// cache lookup, retry with backoff, input prompts and rendering.
pub mod navigator;

/// Gemtext rendering and inline image previews.
pub mod renderer;

/// Persistence.
///
/// - [`CacheStore`](store::CacheStore): gzip page cache and resource buckets
/// - [`SqliteStore`](store::SqliteStore): visit history
pub mod store;
