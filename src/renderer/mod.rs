//! Gemtext to HTML rendering.
//!
//! ```text
//! GemtextLine* → Renderer → Document (+ image tasks joined) → page cache
//! ```
//!
//! The renderer walks the line sequence once. Consecutive list lines and
//! preformatted blocks collapse into one node each; image links are handed
//! to the [`ImagePipeline`](images::ImagePipeline), whose background tasks
//! are joined before [`Renderer::render`] returns.

pub mod document;
pub mod images;

use std::sync::Arc;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::{debug, error};
use url::Url;

use crate::config::SettingsProvider;
use crate::domain::{CachedPage, GemtextLine, GEMINI_SCHEME};
use crate::store::{CacheStore, PageKey};

pub use document::{inject_stylesheet, Document, Node};
pub use images::{ImagePipeline, ImageSlot};

#[derive(Clone)]
pub struct Renderer {
    cache: Arc<CacheStore>,
    images: ImagePipeline,
    settings: Arc<dyn SettingsProvider + Send + Sync>,
}

/// Mutable state of one render pass.
#[derive(Default)]
struct RenderState {
    nodes: Vec<Node>,
    title: Option<String>,
    list: Option<Vec<String>>,
    pre: Option<(Option<String>, Vec<String>)>,
    pending: Vec<(usize, JoinHandle<Node>)>,
}

impl RenderState {
    fn close_list(&mut self) {
        if let Some(items) = self.list.take() {
            self.nodes.push(Node::List(items));
        }
    }
}

impl Renderer {
    pub fn new(
        cache: Arc<CacheStore>,
        images: ImagePipeline,
        settings: Arc<dyn SettingsProvider + Send + Sync>,
    ) -> Self {
        Self {
            cache,
            images,
            settings,
        }
    }

    /// Render `lines` fetched from `source`, wait for inline images, and
    /// cache the result.
    pub async fn render<I>(&self, lines: I, source: &Url) -> Document
    where
        I: IntoIterator<Item = GemtextLine>,
    {
        let inline_images = self.settings.inline_images_enabled();
        let mut state = RenderState::default();

        for line in lines {
            match line {
                GemtextLine::PreformattedBegin { alt } => {
                    state.close_list();
                    state.pre = Some((alt, Vec::new()));
                }
                GemtextLine::PreformattedContent { text } => match state.pre.as_mut() {
                    Some((_, lines)) => lines.push(text),
                    // Content outside a block is plain text
                    None => {
                        state.close_list();
                        state.nodes.push(Node::Paragraph(text));
                    }
                },
                GemtextLine::PreformattedEnd => {
                    if let Some((alt, lines)) = state.pre.take() {
                        state.nodes.push(Node::Preformatted {
                            alt,
                            text: lines.join("\n"),
                        });
                    }
                }
                GemtextLine::Link { uri, text } => {
                    state.close_list();
                    self.render_link(&mut state, source, &uri, text, inline_images)
                        .await;
                }
                GemtextLine::Heading { level, text } => {
                    state.close_list();
                    if state.title.is_none() {
                        state.title = Some(text.clone());
                    }
                    state.nodes.push(Node::Heading {
                        level: level.clamp(1, 3),
                        text,
                    });
                }
                GemtextLine::ListItem { text } => {
                    state.list.get_or_insert_with(Vec::new).push(text);
                }
                GemtextLine::Quote { text } => {
                    state.close_list();
                    state.nodes.push(Node::Quote(text));
                }
                GemtextLine::Text { text } => {
                    state.close_list();
                    state.nodes.push(Node::Paragraph(text));
                }
                GemtextLine::Empty => {
                    state.close_list();
                    state.nodes.push(Node::LineBreak);
                }
            }
        }
        state.close_list();
        if let Some((alt, lines)) = state.pre.take() {
            state.nodes.push(Node::Preformatted {
                alt,
                text: lines.join("\n"),
            });
        }

        let mut nodes = state.nodes;
        if !state.pending.is_empty() {
            debug!("Waiting for {} inline images", state.pending.len());
            let (slots, handles): (Vec<_>, Vec<_>) = state.pending.into_iter().unzip();
            for (slot, joined) in slots.into_iter().zip(join_all(handles).await) {
                match joined {
                    Ok(node) => nodes[slot] = node,
                    Err(e) => {
                        error!("Inline image task failed: {}", e);
                        let fallback = match &nodes[slot] {
                            Node::Pending { href, alt } => Some(Node::Link {
                                href: href.clone(),
                                text: alt.clone(),
                                scheme: None,
                            }),
                            _ => None,
                        };
                        if let Some(link) = fallback {
                            nodes[slot] = link;
                        }
                    }
                }
            }
        }

        let document = Document {
            nodes,
            title: state.title,
        };
        self.store(&document, source).await;
        document
    }

    async fn render_link(
        &self,
        state: &mut RenderState,
        source: &Url,
        raw: &str,
        text: Option<String>,
        inline_images: bool,
    ) {
        let resolved = match source.join(raw) {
            Ok(uri) => uri,
            Err(e) => {
                debug!("Unresolvable link {:?}: {}", raw, e);
                state.nodes.push(Node::Link {
                    href: raw.to_string(),
                    text: text.unwrap_or_else(|| raw.to_string()),
                    scheme: None,
                });
                return;
            }
        };

        if inline_images && images::image_mime(&resolved).is_some() {
            let alt = text.unwrap_or_else(|| raw.to_string());
            match self.images.render_image_link(&resolved, &alt).await {
                ImageSlot::Ready(node) => state.nodes.push(node),
                ImageSlot::Pending(placeholder, handle) => {
                    state.pending.push((state.nodes.len(), handle));
                    state.nodes.push(placeholder);
                }
            }
            return;
        }

        let scheme = (text.is_none() && resolved.scheme() != GEMINI_SCHEME)
            .then(|| resolved.scheme().to_string());
        state.nodes.push(Node::Link {
            href: resolved.to_string(),
            text: text.unwrap_or_else(|| raw.to_string()),
            scheme,
        });
    }

    /// Cache the body before stylesheet injection so the theme can change.
    async fn store(&self, document: &Document, source: &Url) {
        let page = CachedPage {
            title: document.title.clone(),
            body: document.to_html(),
            location: None,
        };
        match serde_json::to_string(&page) {
            Ok(json) => self.cache.store_page(&PageKey::new(source, None), &json).await,
            Err(e) => error!("Failed to serialize page {}: {}", source, e),
        }
    }
}
