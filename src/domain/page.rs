use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use url::Url;

/// A fully rendered page, stylesheet included, ready for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    pub content: String,
    pub title: Option<String>,
}

impl RenderedDocument {
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("(Untitled)")
    }
}

/// A non-gemtext body saved to disk for the host to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDownload {
    pub path: PathBuf,
    pub mime: String,
    pub uri: Url,
}

/// Page cache payload. The body is stored before stylesheet injection so
/// a theme change applies to cached pages too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedPage {
    pub title: Option<String>,
    pub body: String,
    /// Set on entries stored under a URI that redirected elsewhere; names
    /// the URI the body actually came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_title_with_title() {
        let doc = RenderedDocument {
            content: String::new(),
            title: Some("Capsule".into()),
        };
        assert_eq!(doc.display_title(), "Capsule");
    }

    #[test]
    fn test_display_title_without_title() {
        let doc = RenderedDocument {
            content: String::new(),
            title: None,
        };
        assert_eq!(doc.display_title(), "(Untitled)");
    }

    #[test]
    fn test_cached_page_json_shape() {
        let page = CachedPage {
            title: Some("T".into()),
            body: "<p>x</p>".into(),
            location: None,
        };
        let json = serde_json::to_string(&page).unwrap();
        assert_eq!(json, r#"{"title":"T","body":"<p>x</p>"}"#);
    }

    #[test]
    fn test_cached_page_location_round_trips() {
        let page = CachedPage {
            title: None,
            body: String::new(),
            location: Some("gemini://example.org/new".into()),
        };
        let json = serde_json::to_string(&page).unwrap();
        let parsed: CachedPage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, page);
    }
}
