use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;

use crate::app::Result;

/// Scheme handled by the protocol client.
pub const GEMINI_SCHEME: &str = "gemini";

/// Everything but RFC 3986 unreserved characters gets escaped.
const QUERY_INPUT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// One logical navigation request: a URI plus the user's answer to an
/// input prompt, if the server asked for one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTarget {
    pub uri: Url,
    pub input: Option<String>,
    /// Skip the page cache lookup and always go to the network.
    pub bypass_cache: bool,
}

impl RequestTarget {
    pub fn new(uri: Url) -> Self {
        Self {
            uri,
            input: None,
            bypass_cache: false,
        }
    }

    pub fn parse(uri: &str) -> Result<Self> {
        Ok(Self::new(Url::parse(uri.trim())?))
    }

    /// Same URI, with the user's input attached.
    pub fn with_input(&self, input: impl Into<String>) -> Self {
        Self {
            uri: self.uri.clone(),
            input: Some(input.into()),
            bypass_cache: true,
        }
    }

    pub fn refreshed(mut self) -> Self {
        self.bypass_cache = true;
        self
    }

    pub fn is_gemini(&self) -> bool {
        self.uri.scheme() == GEMINI_SCHEME
    }

    /// The URI actually requested on the wire.
    pub fn effective_uri(&self) -> Url {
        attach_input(&self.uri, self.input.as_deref())
    }
}

/// Put `input` into the query component, percent-encoded the way Gemini
/// servers expect (`%20` for spaces, never `+`). The fragment is dropped
/// since it is never sent.
pub fn attach_input(uri: &Url, input: Option<&str>) -> Url {
    let mut uri = uri.clone();
    uri.set_fragment(None);
    if let Some(input) = input {
        uri.set_query(Some(&utf8_percent_encode(input, QUERY_INPUT).to_string()));
    }
    uri
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_uri_without_input() {
        let target = RequestTarget::parse("gemini://example.org/search#top").unwrap();
        assert_eq!(
            target.effective_uri().as_str(),
            "gemini://example.org/search"
        );
    }

    #[test]
    fn test_input_is_percent_encoded() {
        let target = RequestTarget::parse("gemini://example.org/search")
            .unwrap()
            .with_input("rust & gemini?");
        assert_eq!(
            target.effective_uri().as_str(),
            "gemini://example.org/search?rust%20%26%20gemini%3F"
        );
    }

    #[test]
    fn test_input_keeps_unreserved_and_encodes_utf8() {
        let uri = Url::parse("gemini://example.org/q").unwrap();
        let encoded = attach_input(&uri, Some("a-b.c_d~e/é"));
        assert_eq!(encoded.query(), Some("a-b.c_d~e%2F%C3%A9"));
    }

    #[test]
    fn test_input_replaces_existing_query() {
        let target = RequestTarget::parse("gemini://example.org/q?old")
            .unwrap()
            .with_input("new");
        assert_eq!(target.effective_uri().query(), Some("new"));
    }

    #[test]
    fn test_with_input_keeps_uri() {
        let target = RequestTarget::parse("gemini://example.org/q").unwrap();
        let answered = target.with_input("x");
        assert_eq!(answered.uri, target.uri);
        assert_eq!(answered.input.as_deref(), Some("x"));
        assert!(target.input.is_none());
    }

    #[test]
    fn test_scheme_detection() {
        assert!(RequestTarget::parse("gemini://a.b/").unwrap().is_gemini());
        assert!(!RequestTarget::parse("https://a.b/").unwrap().is_gemini());
    }
}
