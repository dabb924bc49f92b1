use url::Url;

use crate::app::{GemtrailError, Result};

/// Default MIME type of a success response with an empty meta field.
pub const DEFAULT_MIME: &str = "text/gemini; charset=utf-8";

/// Longest meta field a server may send.
const MAX_META_LEN: usize = 1024;

/// Whether a failure is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCategory {
    Transient,
    Permanent,
}

/// Terminal outcome of one protocol request.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolResponse {
    Success {
        mime: String,
        body: Vec<u8>,
        /// URI that produced the body, after any redirects the client followed
        final_uri: Url,
    },
    InputRequired {
        prompt: String,
        /// Status 11: the answer should not be echoed
        sensitive: bool,
    },
    /// A redirect the client's policy declined to follow.
    Redirect { target: Url, permanent: bool },
    Error {
        category: StatusCategory,
        status: Option<u8>,
        message: String,
        uri: Url,
    },
}

pub fn is_gemtext_mime(mime: &str) -> bool {
    mime.split(';')
        .next()
        .map(|m| m.trim().eq_ignore_ascii_case("text/gemini"))
        .unwrap_or(false)
}

/// Status line of a Gemini response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHeader {
    pub status: u8,
    pub meta: String,
}

impl ResponseHeader {
    /// Parse `<STATUS><SPACE><META>\r\n` from the start of `data`.
    ///
    /// Returns the header and the offset at which the body starts.
    pub fn parse(data: &[u8]) -> Result<(Self, usize)> {
        let end = data
            .windows(2)
            .position(|w| w == b"\r\n")
            .ok_or_else(|| GemtrailError::MalformedResponse("missing CRLF after header".into()))?;

        let line = std::str::from_utf8(&data[..end])
            .map_err(|_| GemtrailError::MalformedResponse("header is not UTF-8".into()))?;

        if line.len() < 2 || !line.as_bytes()[..2].iter().all(u8::is_ascii_digit) {
            return Err(GemtrailError::MalformedResponse(format!(
                "invalid status line: {:?}",
                line
            )));
        }

        let status: u8 = line[..2]
            .parse()
            .map_err(|_| GemtrailError::MalformedResponse(format!("invalid status: {:?}", line)))?;
        let meta = line[2..].trim().to_string();

        if meta.len() > MAX_META_LEN {
            return Err(GemtrailError::MalformedResponse("meta field too long".into()));
        }

        Ok((Self { status, meta }, end + 2))
    }

    /// Classify into a [`ProtocolResponse`]. Redirects are resolved against
    /// `uri` and returned as-is; following them is the client's business.
    pub fn into_response(self, uri: &Url, body: Vec<u8>) -> Result<ProtocolResponse> {
        let response = match self.status {
            10..=19 => ProtocolResponse::InputRequired {
                prompt: self.meta,
                sensitive: self.status == 11,
            },
            20..=29 => ProtocolResponse::Success {
                mime: if self.meta.is_empty() {
                    DEFAULT_MIME.to_string()
                } else {
                    self.meta
                },
                body,
                final_uri: uri.clone(),
            },
            30..=39 => ProtocolResponse::Redirect {
                target: uri.join(&self.meta)?,
                permanent: self.status == 31,
            },
            40..=49 => ProtocolResponse::Error {
                category: category_for(self.status),
                status: Some(self.status),
                message: describe(self.status, self.meta),
                uri: uri.clone(),
            },
            50..=69 => ProtocolResponse::Error {
                category: StatusCategory::Permanent,
                status: Some(self.status),
                message: describe(self.status, self.meta),
                uri: uri.clone(),
            },
            other => {
                return Err(GemtrailError::MalformedResponse(format!(
                    "unknown status {}",
                    other
                )))
            }
        };
        Ok(response)
    }
}

/// 40 temporary failure, 41 server unavailable, 42 CGI error, 43 proxy
/// error, 44 slow down. Any other 4x code is treated as permanent.
fn category_for(status: u8) -> StatusCategory {
    match status {
        40..=44 => StatusCategory::Transient,
        _ => StatusCategory::Permanent,
    }
}

fn describe(status: u8, meta: String) -> String {
    if !meta.is_empty() {
        return meta;
    }
    let text = match status {
        40 => "Temporary failure",
        41 => "Server unavailable",
        42 => "CGI error",
        43 => "Proxy error",
        44 => "Slow down",
        51 => "Not found",
        52 => "Gone",
        53 => "Proxy request refused",
        59 => "Bad request",
        60 => "Client certificate required",
        61 => "Certificate not authorised",
        62 => "Certificate not valid",
        _ => "Permanent failure",
    };
    text.to_string()
}
