use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_socks::tcp::Socks5Stream;
use tracing::warn;

use crate::error::{Result, VeilError};
use crate::models::ProxyDescriptor;

const MAX_CONNECT_RESPONSE: usize = 8 * 1024;

/// Open a plain TCP connection to `host:port`
pub async fn connect_direct(host: &str, port: u16) -> Result<TcpStream> {
    TcpStream::connect((host, port)).await.map_err(|e| {
        VeilError::ProxyConnectionFailed(format!(
            "TCP connect to {} failed: {}",
            format_authority(host, port),
            e
        ))
    })
}

/// Open a stream to the proxy itself
pub async fn connect_to_proxy(proxy: &ProxyDescriptor) -> Result<TcpStream> {
    TcpStream::connect((proxy.host.as_str(), proxy.port))
        .await
        .map_err(|e| {
            VeilError::ProxyConnectionFailed(format!("TCP connect to {} failed: {}", proxy, e))
        })
}

/// `Proxy-Authorization` value for an HTTP proxy with credentials
pub fn basic_proxy_authorization(proxy: &ProxyDescriptor) -> Option<String> {
    let username = proxy.username.as_ref()?;
    let password = proxy.password.as_deref().unwrap_or("");
    let credentials = format!("{}:{}", username, password);
    Some(format!("Basic {}", BASE64.encode(credentials.as_bytes())))
}

/// Tunnel to the target with an HTTP `CONNECT`
pub(crate) async fn connect_via_http_proxy(
    proxy: &ProxyDescriptor,
    target_host: &str,
    target_port: u16,
) -> std::result::Result<TcpStream, anyhow::Error> {
    let mut stream = TcpStream::connect((proxy.host.as_str(), proxy.port)).await?;

    let authority = format_authority(target_host, target_port);
    let mut request = format!("CONNECT {} HTTP/1.1\r\nHost: {}\r\n", authority, authority);

    if let Some(auth) = basic_proxy_authorization(proxy) {
        request.push_str(&format!("Proxy-Authorization: {}\r\n", auth));
    }

    request.push_str("\r\n");
    stream.write_all(request.as_bytes()).await?;

    // Byte-wise up to the blank line: anything after it is tunnel payload.
    let mut response = Vec::with_capacity(256);
    let mut byte = [0u8; 1];
    while !response.ends_with(b"\r\n\r\n") {
        if response.len() >= MAX_CONNECT_RESPONSE {
            anyhow::bail!("CONNECT response headers too large");
        }
        if stream.read(&mut byte).await? == 0 {
            if response.is_empty() {
                anyhow::bail!("empty CONNECT response");
            }
            break;
        }
        response.push(byte[0]);
    }

    let response_str = String::from_utf8_lossy(&response);
    if !response_str.starts_with("HTTP/1.1 200") && !response_str.starts_with("HTTP/1.0 200") {
        anyhow::bail!(
            "CONNECT failed: {}",
            response_str.lines().next().unwrap_or("Unknown error")
        );
    }

    Ok(stream)
}

/// Connect to the target through a SOCKS5 proxy
pub(crate) async fn connect_via_socks5_proxy(
    proxy: &ProxyDescriptor,
    target_host: &str,
    target_port: u16,
) -> std::result::Result<TcpStream, anyhow::Error> {
    let socket = TcpStream::connect((proxy.host.as_str(), proxy.port)).await?;

    let stream = match (&proxy.username, &proxy.password) {
        (Some(username), Some(password)) => {
            Socks5Stream::connect_with_password_and_socket(
                socket,
                (target_host, target_port),
                username,
                password,
            )
            .await?
        }
        (Some(_), None) => {
            // RFC 1929 needs a non-empty password.
            warn!(proxy = %proxy, "SOCKS5 proxy has a username but no password, connecting without authentication");
            Socks5Stream::connect_with_socket(socket, (target_host, target_port)).await?
        }
        _ => Socks5Stream::connect_with_socket(socket, (target_host, target_port)).await?,
    };

    Ok(stream.into_inner())
}

/// `host:port`, bracketing bare IPv6 literals
pub fn format_authority(host: &str, port: u16) -> String {
    if host.contains(':') && !(host.starts_with('[') && host.ends_with(']')) {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// Host and port of a URL, with IPv6 brackets removed for dialing
pub fn target_of(url: &url::Url) -> Result<(String, u16)> {
    let host = url
        .host_str()
        .ok_or_else(|| VeilError::InvalidRequest(format!("Missing host in {}", url)))?;
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    let port = url
        .port_or_known_default()
        .ok_or_else(|| VeilError::InvalidRequest(format!("Missing port in {}", url)))?;

    Ok((host.to_string(), port))
}
