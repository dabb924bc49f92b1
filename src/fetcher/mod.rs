pub mod gemini_client;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::app::Result;
use crate::domain::ProtocolResponse;

pub use gemini_client::{GeminiClient, GEMINI_PORT};

/// Which redirects the client follows on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RedirectPolicy {
    /// Hand every redirect back to the caller
    Never,
    /// Follow redirects that stay on the same host
    SameHost,
    Always,
}

impl RedirectPolicy {
    pub fn allows(&self, from: &Url, to: &Url) -> bool {
        match self {
            RedirectPolicy::Never => false,
            RedirectPolicy::SameHost => {
                to.scheme() == from.scheme()
                    && to.host_str() == from.host_str()
                    && port_of(to) == port_of(from)
            }
            RedirectPolicy::Always => true,
        }
    }
}

fn port_of(uri: &Url) -> u16 {
    uri.port_or_known_default().unwrap_or(GEMINI_PORT)
}

/// Sends one request and returns its terminal response.
///
/// `Err` is reserved for failures on our side of the wire (DNS, connect,
/// TLS, timeout); status codes sent by the server come back as
/// [`ProtocolResponse`] variants.
#[async_trait]
pub trait ProtocolClient {
    async fn send_request(&self, uri: &Url, input: Option<&str>) -> Result<ProtocolResponse>;
}
