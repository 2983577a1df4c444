//! Upstream proxy handling
//!
//! This module provides:
//! - The shared proxy pool with rotation and failure tracking
//! - Transport construction for HTTP and SOCKS5 upstreams
//! - Health probing through a transport

pub mod dial;
pub mod health;
pub mod pool;
pub mod transport;

pub use health::HealthProber;
pub use pool::{ExhaustionPolicy, ProxyPool};
pub use transport::{http_get, open_tunnel, HttpReply, ProxyKind, ProxyTransport, TargetProtocol};
