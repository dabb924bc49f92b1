//! Inline image resolution for image links.
//!
//! Cached previews are embedded immediately; everything else is fetched,
//! downsized and cached by a background task that owns exactly one output
//! node, returned through its `JoinHandle`.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use image::ImageFormat;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use crate::app::{GemtrailError, Result};
use crate::config::ImageConfig;
use crate::domain::{ProtocolResponse, GEMINI_SCHEME};
use crate::fetcher::ProtocolClient;
use crate::renderer::document::Node;
use crate::store::{CacheStore, IMAGE_BUCKET};

/// Delay after the first failed image attempt; doubles on each retry.
const BASE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// MIME type for a link's file extension, if it names an image.
pub fn image_mime(uri: &Url) -> Option<&'static str> {
    let name = uri.path_segments()?.next_back()?;
    let (_, ext) = name.rsplit_once('.')?;
    match ext.to_ascii_lowercase().as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "bmp" => Some("image/bmp"),
        _ => None,
    }
}

/// Delay before retrying after failed attempt `attempt` (0-based).
pub fn retry_delay(attempt: u32) -> Duration {
    BASE_RETRY_DELAY * 2u32.saturating_pow(attempt)
}

/// What the renderer places in the document for an image link.
pub enum ImageSlot {
    Ready(Node),
    /// Placeholder plus the task that will produce its final node
    Pending(Node, JoinHandle<Node>),
}

#[derive(Clone)]
pub struct ImagePipeline {
    client: Arc<dyn ProtocolClient + Send + Sync>,
    cache: Arc<CacheStore>,
    preview_max_px: u32,
    max_attempts: u32,
}

impl ImagePipeline {
    /// `client` should not follow redirects; unsolicited redirects for an
    /// image count as a failed attempt.
    pub fn new(
        client: Arc<dyn ProtocolClient + Send + Sync>,
        cache: Arc<CacheStore>,
        config: &ImageConfig,
    ) -> Self {
        Self {
            client,
            cache,
            preview_max_px: config.preview_max_px.max(1),
            max_attempts: config.fetch_attempts.max(1),
        }
    }

    pub async fn render_image_link(&self, uri: &Url, alt: &str) -> ImageSlot {
        if uri.scheme() != GEMINI_SCHEME {
            return ImageSlot::Ready(Node::HostImage {
                href: uri.to_string(),
                alt: alt.to_string(),
            });
        }

        if let Some(bytes) = self.cache.load_resource(IMAGE_BUCKET, uri.as_str()).await {
            debug!("Inline image cache hit: {}", uri);
            return ImageSlot::Ready(embedded(uri, alt, &bytes));
        }

        let placeholder = Node::Pending {
            href: uri.to_string(),
            alt: alt.to_string(),
        };
        let pipeline = self.clone();
        let uri = uri.clone();
        let alt = alt.to_string();
        let handle = tokio::spawn(async move { pipeline.resolve(uri, alt).await });

        ImageSlot::Pending(placeholder, handle)
    }

    /// Fetch, downsize and cache one image, falling back to a plain link.
    async fn resolve(&self, uri: Url, alt: String) -> Node {
        match self.fetch_preview(&uri).await {
            Ok(png) => {
                self.cache
                    .store_resource(IMAGE_BUCKET, uri.as_str(), &png)
                    .await;
                embedded(&uri, &alt, &png)
            }
            Err(e) => {
                warn!("No preview for {}: {}", uri, e);
                fallback_link(&uri, &alt)
            }
        }
    }

    async fn fetch_preview(&self, uri: &Url) -> Result<Vec<u8>> {
        let mut last_error = GemtrailError::Other("no attempts made".into());

        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                tokio::time::sleep(retry_delay(attempt - 1)).await;
            }

            match self.client.send_request(uri, None).await {
                Ok(ProtocolResponse::Success { body, .. }) => {
                    let max_px = self.preview_max_px;
                    return tokio::task::spawn_blocking(move || downsize(&body, max_px))
                        .await
                        .map_err(|e| GemtrailError::Other(format!("Image task failed: {}", e)))?;
                }
                Ok(other) => {
                    last_error = GemtrailError::Other(format!("unexpected response {:?}", other));
                }
                Err(e) => last_error = e,
            }
            debug!(
                "Image attempt {}/{} for {} failed",
                attempt + 1,
                self.max_attempts,
                uri
            );
        }

        Err(last_error)
    }
}

/// Decode `bytes`, shrink to fit `max_px` on the longest side, and
/// re-encode as PNG.
pub fn downsize(bytes: &[u8], max_px: u32) -> Result<Vec<u8>> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| GemtrailError::Other(format!("Failed to decode image: {}", e)))?;

    let img = if img.width() > max_px || img.height() > max_px {
        img.thumbnail(max_px, max_px)
    } else {
        img
    };

    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)
        .map_err(|e| GemtrailError::Other(format!("Failed to encode image: {}", e)))?;
    Ok(out.into_inner())
}

fn embedded(uri: &Url, alt: &str, png: &[u8]) -> Node {
    let encoded = base64::engine::general_purpose::STANDARD.encode(png);
    Node::Image {
        href: uri.to_string(),
        alt: alt.to_string(),
        data_uri: format!("data:image/png;base64,{}", encoded),
    }
}

fn fallback_link(uri: &Url, alt: &str) -> Node {
    Node::Link {
        href: uri.to_string(),
        text: alt.to_string(),
        scheme: None,
    }
}
