//! Gemini protocol client over TCP + rustls.
//!
//! A request is the absolute URL followed by CRLF; the response is a
//! status line followed by an optional body, terminated by the server
//! closing the connection.

use std::future::Future;
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, ClientConnection, DigitallySignedStruct, SignatureScheme, StreamOwned};
use tracing::debug;
use url::{Host, Url};

use crate::app::{GemtrailError, Result};
use crate::domain::target::attach_input;
use crate::domain::{ProtocolResponse, ResponseHeader, GEMINI_SCHEME};
use crate::fetcher::{ProtocolClient, RedirectPolicy};

pub const GEMINI_PORT: u16 = 1965;

/// Redirect hops followed before giving up.
const MAX_REDIRECTS: usize = 5;

/// Largest response accepted (header + body).
const MAX_RESPONSE_SIZE: usize = 32 * 1024 * 1024;

/// Longest request URL the protocol allows.
const MAX_REQUEST_LEN: usize = 1024;

#[derive(Clone)]
pub struct GeminiClient {
    tls: Arc<ClientConfig>,
    timeout: Duration,
    redirects: RedirectPolicy,
    allow_ipv6: bool,
}

impl GeminiClient {
    /// Build a client around a caller-supplied TLS configuration, which
    /// decides how server certificates are trusted.
    pub fn new(tls: Arc<ClientConfig>) -> Self {
        Self {
            tls,
            timeout: Duration::from_secs(15),
            redirects: RedirectPolicy::SameHost,
            allow_ipv6: true,
        }
    }

    /// Build a client that accepts any server certificate.
    ///
    /// Most capsules use self-signed certificates; pinning them
    /// (trust-on-first-use) is left to the host application, which can pass
    /// its own verifier through [`GeminiClient::new`] instead.
    pub fn with_deferred_trust() -> Result<Self> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(DeferredTrust { provider }))
            .with_no_client_auth();

        Ok(Self::new(Arc::new(config)))
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn redirect_policy(mut self, redirects: RedirectPolicy) -> Self {
        self.redirects = redirects;
        self
    }

    pub fn allow_ipv6(mut self, allow: bool) -> Self {
        self.allow_ipv6 = allow;
        self
    }

    /// One request/response exchange, without redirect handling.
    async fn exchange(&self, uri: Url) -> Result<(ResponseHeader, Vec<u8>)> {
        let endpoint = Endpoint::from_uri(&uri)?;
        let request = format!("{}\r\n", uri);
        if request.len() - 2 > MAX_REQUEST_LEN {
            return Err(GemtrailError::Other(format!(
                "Request URL exceeds {} bytes",
                MAX_REQUEST_LEN
            )));
        }

        let tls = self.tls.clone();
        let allow_ipv6 = self.allow_ipv6;
        let timeout = self.timeout;
        let task = tokio::task::spawn_blocking(move || {
            exchange_blocking(&endpoint, &request, tls, allow_ipv6, timeout)
        });

        let raw = match tokio::time::timeout(self.timeout, task).await {
            Err(_) => return Err(GemtrailError::Timeout(uri.to_string())),
            Ok(Err(e)) => return Err(GemtrailError::Other(format!("Request task failed: {}", e))),
            Ok(Ok(result)) => result.map_err(|e| classify_io(&uri, e))?,
        };

        let (header, offset) = ResponseHeader::parse(&raw)?;
        Ok((header, raw[offset..].to_vec()))
    }
}

#[async_trait]
impl ProtocolClient for GeminiClient {
    async fn send_request(&self, uri: &Url, input: Option<&str>) -> Result<ProtocolResponse> {
        let start = attach_input(uri, input);
        follow_redirects(start, self.redirects, |uri| self.exchange(uri)).await
    }
}

/// Drive `exchange` until a non-redirect response arrives or `policy`
/// declines a hop.
async fn follow_redirects<F, Fut>(
    start: Url,
    policy: RedirectPolicy,
    mut exchange: F,
) -> Result<ProtocolResponse>
where
    F: FnMut(Url) -> Fut,
    Fut: Future<Output = Result<(ResponseHeader, Vec<u8>)>>,
{
    let mut current = start;

    for _ in 0..=MAX_REDIRECTS {
        let (header, body) = exchange(current.clone()).await?;
        let response = header.into_response(&current, body)?;

        match response {
            ProtocolResponse::Redirect { ref target, .. }
                if target.scheme() == GEMINI_SCHEME && policy.allows(&current, target) =>
            {
                debug!("Following redirect {} -> {}", current, target);
                current = target.clone();
            }
            other => return Ok(other),
        }
    }

    Err(GemtrailError::Other(format!(
        "Too many redirects (last: {})",
        current
    )))
}

/// Turn a socket-level failure into the error the retry logic expects.
fn classify_io(uri: &Url, e: std::io::Error) -> GemtrailError {
    match e.kind() {
        ErrorKind::TimedOut | ErrorKind::WouldBlock => GemtrailError::Timeout(uri.to_string()),
        ErrorKind::InvalidData => {
            let tls = e
                .get_ref()
                .and_then(|inner| inner.downcast_ref::<rustls::Error>())
                .cloned();
            match tls {
                Some(tls) => GemtrailError::Tls(tls),
                None => GemtrailError::MalformedResponse(format!("{}: {}", uri, e)),
            }
        }
        _ => GemtrailError::Io(e),
    }
}

struct Endpoint {
    host: String,
    port: u16,
    server_name: ServerName<'static>,
}

impl Endpoint {
    fn from_uri(uri: &Url) -> Result<Self> {
        let host = match uri.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(ip)) => ip.to_string(),
            Some(Host::Ipv6(ip)) => ip.to_string(),
            None => return Err(GemtrailError::Other(format!("No host in {}", uri))),
        };
        let server_name = ServerName::try_from(host.clone())
            .map_err(|e| GemtrailError::Other(format!("Invalid server name {}: {}", host, e)))?;

        Ok(Self {
            host,
            port: uri.port().unwrap_or(GEMINI_PORT),
            server_name,
        })
    }
}

fn resolve(endpoint: &Endpoint, allow_ipv6: bool) -> std::io::Result<Vec<SocketAddr>> {
    let addrs: Vec<SocketAddr> = (endpoint.host.as_str(), endpoint.port)
        .to_socket_addrs()?
        .filter(|addr| allow_ipv6 || addr.is_ipv4())
        .collect();

    if addrs.is_empty() {
        return Err(std::io::Error::new(
            ErrorKind::AddrNotAvailable,
            format!("no usable address for {}:{}", endpoint.host, endpoint.port),
        ));
    }
    Ok(addrs)
}

fn connect(addrs: &[SocketAddr], timeout: Duration) -> std::io::Result<TcpStream> {
    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!("Connect to {} failed: {}", addr, e);
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| ErrorKind::AddrNotAvailable.into()))
}

fn exchange_blocking(
    endpoint: &Endpoint,
    request: &str,
    tls: Arc<ClientConfig>,
    allow_ipv6: bool,
    timeout: Duration,
) -> std::io::Result<Vec<u8>> {
    let addrs = resolve(endpoint, allow_ipv6)?;
    let socket = connect(&addrs, timeout)?;
    socket.set_read_timeout(Some(timeout))?;
    socket.set_write_timeout(Some(timeout))?;

    let conn = ClientConnection::new(tls, endpoint.server_name.clone())
        .map_err(|e| std::io::Error::new(ErrorKind::InvalidData, e))?;
    let mut stream = StreamOwned::new(conn, socket);

    stream.write_all(request.as_bytes())?;
    stream.flush()?;

    let mut buf = Vec::with_capacity(8192);
    let mut chunk = [0u8; 8192];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                if buf.len() + n > MAX_RESPONSE_SIZE {
                    return Err(std::io::Error::new(
                        ErrorKind::InvalidData,
                        "response too large",
                    ));
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            // Many servers close without close_notify
            Err(e) if e.kind() == ErrorKind::UnexpectedEof && !buf.is_empty() => break,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    Ok(buf)
}

/// Certificate verifier that defers trust decisions to the host
/// application. Handshake signatures are still checked.
#[derive(Debug)]
struct DeferredTrust {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for DeferredTrust {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
