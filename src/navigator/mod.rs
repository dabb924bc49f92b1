//! Request orchestration: one logical navigation, from URI to rendered page.
//!
//! ```text
//! RequestTarget → cache? → ProtocolClient (retry / input loop) → Renderer → RenderedDocument
//!                                                              ↘ download dir → FileDownload
//! ```

pub mod history;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};
use url::Url;

use crate::app::{GemtrailError, Result};
use crate::config::SettingsProvider;
use crate::domain::response::is_gemtext_mime;
use crate::domain::{
    gemtext, CachedPage, FileDownload, ProtocolResponse, RenderedDocument, RequestTarget,
    StatusCategory,
};
use crate::fetcher::ProtocolClient;
use crate::renderer::{inject_stylesheet, Document, Renderer};
use crate::store::cache::digest;
use crate::store::{CacheStore, HistoryRecorder, PageKey};

pub use history::NavHistory;

/// Attempts per navigation, counting only transient failures.
pub const MAX_ATTEMPTS: u32 = 6;

pub const HOME_URI: &str = "about:home";

const HOME_PAGE: &str = include_str!("../../assets/home.gmi");

/// Delay before the next attempt when `remaining` attempts are left.
pub fn retry_delay(remaining: u32) -> Duration {
    let remaining = u64::from(remaining.max(1));
    Duration::from_millis(1000u64.div_ceil(remaining))
}

/// Asks the user to answer a server's input request.
#[async_trait]
pub trait Prompter {
    /// `None` means the user declined.
    async fn request_input(&self, prompt: &str, sensitive: bool) -> Option<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Sending,
    AwaitingInput,
    Retrying { remaining: u32 },
    Success,
    Failed,
}

/// How a call to [`Navigator::load`] ended. Failures are `Err`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Page(RenderedDocument),
    Download(FileDownload),
    /// Another load was already running
    Busy,
    /// The user declined an input prompt
    Abandoned,
    /// [`Navigator::abandon`] was called while this load was running
    Superseded,
}

struct NavState {
    state: LoadState,
    last_visited: Option<Url>,
    history: NavHistory,
}

/// Clears the in-flight flag when a load ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Navigator {
    client: Arc<dyn ProtocolClient + Send + Sync>,
    cache: Arc<CacheStore>,
    renderer: Renderer,
    settings: Arc<dyn SettingsProvider + Send + Sync>,
    prompter: Arc<dyn Prompter + Send + Sync>,
    recorder: Option<Arc<dyn HistoryRecorder + Send + Sync>>,
    download_dir: PathBuf,
    in_flight: AtomicBool,
    generation: AtomicU64,
    nav: Mutex<NavState>,
}

impl Navigator {
    pub fn new(
        client: Arc<dyn ProtocolClient + Send + Sync>,
        cache: Arc<CacheStore>,
        renderer: Renderer,
        settings: Arc<dyn SettingsProvider + Send + Sync>,
        prompter: Arc<dyn Prompter + Send + Sync>,
        download_dir: PathBuf,
    ) -> Self {
        Self {
            client,
            cache,
            renderer,
            settings,
            prompter,
            recorder: None,
            download_dir,
            in_flight: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            nav: Mutex::new(NavState {
                state: LoadState::Idle,
                last_visited: None,
                history: NavHistory::new(),
            }),
        }
    }

    pub fn with_history(mut self, recorder: Arc<dyn HistoryRecorder + Send + Sync>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn state(&self) -> LoadState {
        self.nav().state
    }

    pub fn last_visited(&self) -> Option<Url> {
        self.nav().last_visited.clone()
    }

    /// Target for the previous page, served from cache when possible.
    ///
    /// The history position only moves once that target has been loaded
    /// successfully.
    pub fn back(&self) -> Option<RequestTarget> {
        self.nav().history.back_target().cloned().map(RequestTarget::new)
    }

    pub fn forward(&self) -> Option<RequestTarget> {
        self.nav()
            .history
            .forward_target()
            .cloned()
            .map(RequestTarget::new)
    }

    /// Make any running load discard its result.
    pub fn abandon(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub async fn load(&self, target: RequestTarget) -> Result<LoadOutcome> {
        let is_home = target.uri.as_str() == HOME_URI;
        if !is_home && !target.is_gemini() {
            return Err(GemtrailError::UnsupportedScheme {
                scheme: target.uri.scheme().to_string(),
                uri: target.uri.to_string(),
            });
        }

        let Some(_guard) = InFlight::acquire(&self.in_flight) else {
            debug!("Load of {} refused, another load is running", target.uri);
            return Ok(LoadOutcome::Busy);
        };
        let generation = self.generation.load(Ordering::Acquire);

        let result = if is_home {
            self.load_home(&target, generation).await
        } else {
            self.load_remote(target, generation).await
        };

        match &result {
            Ok(LoadOutcome::Page(_)) | Ok(LoadOutcome::Download(_)) => {
                self.set_state(LoadState::Success)
            }
            Ok(_) => self.set_state(LoadState::Idle),
            Err(e) => {
                warn!("Navigation failed: {}", e);
                self.set_state(LoadState::Failed);
            }
        }
        result
    }

    async fn load_home(&self, target: &RequestTarget, generation: u64) -> Result<LoadOutcome> {
        let lines: Vec<_> = gemtext::parse(HOME_PAGE).collect();
        let document = self.renderer.render(lines, &target.uri).await;
        if self.is_stale(generation) {
            return Ok(LoadOutcome::Superseded);
        }
        self.visited(&target.uri);
        Ok(LoadOutcome::Page(self.finish_page(
            &document.to_html(),
            document.title,
        )))
    }

    async fn load_remote(&self, target: RequestTarget, generation: u64) -> Result<LoadOutcome> {
        if !target.bypass_cache {
            if let Some(outcome) = self.load_cached(&target).await {
                return Ok(outcome);
            }
            if self.is_stale(generation) {
                return Ok(LoadOutcome::Superseded);
            }
        }

        let mut current = target;
        let mut remaining = MAX_ATTEMPTS;

        loop {
            self.set_state(LoadState::Sending);
            let response = self
                .client
                .send_request(&current.uri, current.input.as_deref())
                .await;
            if self.is_stale(generation) {
                return Ok(LoadOutcome::Superseded);
            }

            let failure = match response {
                Ok(ProtocolResponse::Success {
                    mime,
                    body,
                    final_uri,
                }) => {
                    let requested = PageKey::new(&current.uri, current.input.as_deref());
                    return self
                        .finish_success(mime, body, final_uri, &requested, generation)
                        .await;
                }
                Ok(ProtocolResponse::InputRequired { prompt, sensitive }) => {
                    self.set_state(LoadState::AwaitingInput);
                    let answer = self.prompter.request_input(&prompt, sensitive).await;
                    if self.is_stale(generation) {
                        return Ok(LoadOutcome::Superseded);
                    }
                    match answer {
                        Some(answer) => {
                            current = current.with_input(answer);
                            continue;
                        }
                        None => {
                            info!("Input for {} declined", current.uri);
                            return Ok(LoadOutcome::Abandoned);
                        }
                    }
                }
                Ok(ProtocolResponse::Redirect { target, .. }) => {
                    return Err(GemtrailError::RedirectNotFollowed(target.to_string()));
                }
                Ok(ProtocolResponse::Error {
                    category: StatusCategory::Permanent,
                    status,
                    message,
                    ..
                }) => {
                    return Err(match status {
                        Some(status) => GemtrailError::Protocol { status, message },
                        None => GemtrailError::Other(message),
                    });
                }
                Ok(ProtocolResponse::Error {
                    category: StatusCategory::Transient,
                    message,
                    ..
                }) => message,
                Err(e) if e.is_transient() => e.to_string(),
                Err(e) => return Err(e),
            };

            remaining -= 1;
            if remaining == 0 {
                return Err(GemtrailError::RetriesExhausted {
                    uri: current.uri.to_string(),
                    attempts: MAX_ATTEMPTS,
                    message: failure,
                });
            }

            let delay = retry_delay(remaining);
            debug!(
                "Transient failure for {} ({}), retrying in {:?} ({} left)",
                current.uri, failure, delay, remaining
            );
            self.set_state(LoadState::Retrying { remaining });
            tokio::time::sleep(delay).await;
            if self.is_stale(generation) {
                return Ok(LoadOutcome::Superseded);
            }
        }
    }

    async fn load_cached(&self, target: &RequestTarget) -> Option<LoadOutcome> {
        let key = PageKey::new(&target.uri, target.input.as_deref());
        let json = self.cache.try_load_page(&key).await?;
        let page: CachedPage = match serde_json::from_str(&json) {
            Ok(page) => page,
            Err(e) => {
                warn!("Ignoring unreadable cached page {}: {}", key.as_str(), e);
                return None;
            }
        };

        debug!("Serving {} from cache", target.uri);
        let uri = page
            .location
            .as_deref()
            .and_then(|location| Url::parse(location).ok())
            .unwrap_or_else(|| target.effective_uri());
        self.record_visit(&uri, page.title.as_deref());
        self.visited(&uri);
        Some(LoadOutcome::Page(self.finish_page(&page.body, page.title)))
    }

    async fn finish_success(
        &self,
        mime: String,
        body: Vec<u8>,
        final_uri: Url,
        requested: &PageKey,
        generation: u64,
    ) -> Result<LoadOutcome> {
        if !is_gemtext_mime(&mime) {
            let download = self.save_download(mime, &body, final_uri.clone()).await?;
            info!("Saved {} to {}", final_uri, download.path.display());
            self.visited(&final_uri);
            return Ok(LoadOutcome::Download(download));
        }

        let text = String::from_utf8_lossy(&body);
        let lines: Vec<_> = gemtext::parse(&text).collect();
        let document = self.renderer.render(lines, &final_uri).await;
        if self.is_stale(generation) {
            return Ok(LoadOutcome::Superseded);
        }

        if *requested != PageKey::new(&final_uri, None) {
            self.store_alias(requested, &document, &final_uri).await;
        }

        info!("Loaded {}", final_uri);
        self.record_visit(&final_uri, document.title.as_deref());
        self.visited(&final_uri);
        Ok(LoadOutcome::Page(self.finish_page(
            &document.to_html(),
            document.title,
        )))
    }

    /// Cache a redirected page under the URI that was asked for too, so
    /// the next load of that URI is served without the redirect.
    async fn store_alias(&self, requested: &PageKey, document: &Document, final_uri: &Url) {
        let page = CachedPage {
            title: document.title.clone(),
            body: document.to_html(),
            location: Some(final_uri.to_string()),
        };
        match serde_json::to_string(&page) {
            Ok(json) => self.cache.store_page(requested, &json).await,
            Err(e) => warn!("Failed to serialize page {}: {}", final_uri, e),
        }
    }

    async fn save_download(&self, mime: String, body: &[u8], uri: Url) -> Result<FileDownload> {
        let name = uri
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .unwrap_or("download");
        let prefix = digest(uri.as_str());
        let path = self
            .download_dir
            .join(format!("{}-{}", &prefix[..8], name));

        tokio::fs::create_dir_all(&self.download_dir).await?;
        tokio::fs::write(&path, body).await?;

        Ok(FileDownload { path, mime, uri })
    }

    fn finish_page(&self, body: &str, title: Option<String>) -> RenderedDocument {
        let content = inject_stylesheet(body, title.as_deref(), &self.settings.theme());
        RenderedDocument { content, title }
    }

    fn record_visit(&self, uri: &Url, title: Option<&str>) {
        if !self.settings.save_visited_history() {
            return;
        }
        if let Some(recorder) = &self.recorder {
            if let Err(e) = recorder.record(uri.as_str(), title, Utc::now()) {
                warn!("Failed to record visit to {}: {}", uri, e);
            }
        }
    }

    fn visited(&self, uri: &Url) {
        let mut nav = self.nav();
        nav.last_visited = Some(uri.clone());
        nav.history.visit(uri.clone());
    }

    fn is_stale(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) != generation
    }

    fn set_state(&self, state: LoadState) {
        self.nav().state = state;
    }

    fn nav(&self) -> MutexGuard<'_, NavState> {
        self.nav.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
