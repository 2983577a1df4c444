//! Proxy transports for HTTP and SOCKS5 upstreams
//!
//! A transport is built from a descriptor plus a hint about the target's
//! protocol. Building never dials; connecting happens per request.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::header::{CONNECTION, HOST, PROXY_AUTHORIZATION, USER_AGENT};
use hyper::{Request, StatusCode};
use hyper_util::rt::TokioIo;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tokio::net::TcpStream;
use tracing::{debug, instrument, warn};
use url::{Position, Url};

use super::dial;
use crate::error::{Result, VeilError};
use crate::events::SessionEmitter;
use crate::models::ProxyDescriptor;

/// Characters left alone by JavaScript's `encodeURIComponent`
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

const USER_AGENT_VALUE: &str = concat!("veil/", env!("CARGO_PKG_VERSION"));

/// Protocol of the origin the transport will reach
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetProtocol {
    #[default]
    Http,
    Https,
}

impl TargetProtocol {
    pub fn from_url(url: &Url) -> Self {
        if url.scheme().eq_ignore_ascii_case("https") {
            Self::Https
        } else {
            Self::Http
        }
    }
}

/// How the upstream proxy is spoken to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyKind {
    Http,
    Socks5,
}

impl ProxyKind {
    /// Port 1080, or "socks" anywhere in the host, means SOCKS5.
    ///
    /// Only a naming heuristic: SOCKS proxies on other ports and HTTP
    /// proxies on 1080 are misclassified.
    pub fn detect(proxy: &ProxyDescriptor) -> Self {
        if proxy.port == 1080 || proxy.host.contains("socks") {
            Self::Socks5
        } else {
            Self::Http
        }
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Socks5 => "socks5",
        }
    }
}

impl std::fmt::Display for ProxyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.scheme())
    }
}

/// Proxy endpoint URL with each credential component percent-encoded
pub fn endpoint_url(proxy: &ProxyDescriptor, kind: ProxyKind) -> String {
    let scheme = kind.scheme();
    let encode = |s: &str| utf8_percent_encode(s, COMPONENT).to_string();

    match (&proxy.username, &proxy.password) {
        (Some(user), Some(pass)) => format!(
            "{}://{}:{}@{}:{}",
            scheme,
            encode(user),
            encode(pass),
            proxy.host,
            proxy.port
        ),
        (Some(user), None) => format!("{}://{}@{}:{}", scheme, encode(user), proxy.host, proxy.port),
        _ => format!("{}://{}:{}", scheme, proxy.host, proxy.port),
    }
}

/// Connectable path through one upstream proxy
#[derive(Clone)]
pub struct ProxyTransport {
    proxy: Arc<ProxyDescriptor>,
    kind: ProxyKind,
    target: TargetProtocol,
    endpoint: Url,
}

impl std::fmt::Debug for ProxyTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyTransport")
            .field("proxy", &self.proxy.label())
            .field("kind", &self.kind)
            .field("target", &self.target)
            .finish()
    }
}

impl ProxyTransport {
    /// Build a transport, reporting failures as a warning on `emitter`
    ///
    /// `None` tells the caller to connect directly.
    pub fn build(
        proxy: &Arc<ProxyDescriptor>,
        target: TargetProtocol,
        emitter: &SessionEmitter,
    ) -> Option<Self> {
        match Self::try_build(proxy, target) {
            Ok(transport) => {
                if transport.kind == ProxyKind::Socks5
                    && proxy.username.is_some()
                    && proxy.password.is_none()
                {
                    emitter.warn(format!(
                        "SOCKS5 proxy {} has a username but no password, authentication will be skipped",
                        proxy.label()
                    ));
                }
                emitter.debug(format!("Using {} proxy {}", transport.kind, proxy.label()));
                Some(transport)
            }
            Err(e) => {
                warn!(proxy = %proxy, error = %e, "Proxy transport unavailable");
                emitter.warn(format!(
                    "Proxy {} unusable ({}), continuing without proxy",
                    proxy.label(),
                    e
                ));
                None
            }
        }
    }

    pub fn try_build(proxy: &Arc<ProxyDescriptor>, target: TargetProtocol) -> Result<Self> {
        let kind = ProxyKind::detect(proxy);
        let endpoint = Url::parse(&endpoint_url(proxy, kind))?;

        match endpoint.scheme() {
            "http" | "socks5" => {}
            other => return Err(VeilError::UnsupportedProtocol(other.to_string())),
        }
        if endpoint.host_str().map_or(true, str::is_empty) {
            return Err(VeilError::InvalidProxyAddress(format!(
                "missing host in {}",
                proxy.label()
            )));
        }

        Ok(Self {
            proxy: proxy.clone(),
            kind,
            target,
            endpoint,
        })
    }

    pub fn proxy(&self) -> &Arc<ProxyDescriptor> {
        &self.proxy
    }

    pub fn kind(&self) -> ProxyKind {
        self.kind
    }

    pub fn target(&self) -> TargetProtocol {
        self.target
    }

    /// Endpoint URL, credentials included
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn label(&self) -> String {
        self.proxy.label()
    }

    /// Plain-http targets behind an HTTP proxy use absolute-form requests
    /// instead of a tunnel.
    pub fn forwards_plain_http(&self) -> bool {
        self.kind == ProxyKind::Http && self.target == TargetProtocol::Http
    }

    /// Open a stream to `host:port` through the proxy
    #[instrument(skip(self), fields(proxy = %self.proxy, kind = %self.kind))]
    pub async fn connect(&self, host: &str, port: u16) -> Result<TcpStream> {
        let stream = match self.kind {
            ProxyKind::Http => dial::connect_via_http_proxy(&self.proxy, host, port)
                .await
                .map_err(|e| VeilError::ConnectFailed(e.to_string()))?,
            ProxyKind::Socks5 => dial::connect_via_socks5_proxy(&self.proxy, host, port)
                .await
                .map_err(|e| {
                    VeilError::ProxyConnectionFailed(format!("SOCKS5 connect failed: {}", e))
                })?,
        };

        debug!("Tunnel to {} established", dial::format_authority(host, port));
        Ok(stream)
    }
}

/// Open a stream to `host:port`, through `transport` when given
pub async fn open_tunnel(
    transport: Option<&ProxyTransport>,
    host: &str,
    port: u16,
) -> Result<TcpStream> {
    match transport {
        Some(transport) => transport.connect(host, port).await,
        None => dial::connect_direct(host, port).await,
    }
}

/// Status and body of a completed GET
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: StatusCode,
    pub body: Bytes,
}

/// Issue one HTTP/1.1 GET to a plain-http `url`
///
/// The whole exchange, connect included, is bounded by `limit`.
pub async fn http_get(
    transport: Option<&ProxyTransport>,
    url: &Url,
    limit: Duration,
) -> Result<HttpReply> {
    if url.scheme() != "http" {
        return Err(VeilError::UnsupportedProtocol(format!(
            "{} (only plain http can be fetched)",
            url.scheme()
        )));
    }

    tokio::time::timeout(limit, send_get(transport, url))
        .await
        .map_err(|_| VeilError::Timeout)?
}

async fn send_get(transport: Option<&ProxyTransport>, url: &Url) -> Result<HttpReply> {
    let (host, port) = dial::target_of(url)?;

    let forward = transport.filter(|t| t.forwards_plain_http());
    let stream = match forward {
        Some(t) => dial::connect_to_proxy(t.proxy()).await?,
        None => open_tunnel(transport, &host, port).await?,
    };

    let uri = match forward {
        Some(_) => url.as_str(),
        None => &url[Position::BeforePath..Position::AfterQuery],
    };

    let mut builder = Request::builder()
        .method("GET")
        .uri(uri)
        .header(HOST, &url[Position::BeforeHost..Position::AfterPort])
        .header(USER_AGENT, USER_AGENT_VALUE)
        .header(CONNECTION, "close");

    if let Some(auth) = forward.and_then(|t| dial::basic_proxy_authorization(t.proxy())) {
        builder = builder.header(PROXY_AUTHORIZATION, auth);
    }

    let request = builder
        .body(Empty::<Bytes>::new())
        .map_err(|e| VeilError::InvalidRequest(format!("Failed to build request: {}", e)))?;

    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| VeilError::ProxyConnectionFailed(format!("Handshake failed: {}", e)))?;

    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!("Connection ended: {}", e);
        }
    });

    let response = sender
        .send_request(request)
        .await
        .map_err(|e| VeilError::ProxyConnectionFailed(format!("Request failed: {}", e)))?;

    let status = response.status();
    let body = response
        .into_body()
        .collect()
        .await
        .map_err(|e| VeilError::ProxyConnectionFailed(format!("Failed to read response: {}", e)))?
        .to_bytes();

    Ok(HttpReply { status, body })
}
