//! Veil - proxy-rotating verification service
//!
//! ## Features
//!
//! - Shared proxy pool with round-robin and random selection and failure tracking
//! - HTTP and SOCKS5 upstream transports with credential encoding
//! - Health probing through a proxy against an address-echo endpoint
//! - Session-scoped progress events over WebSockets
//! - Pluggable verification workflows behind a small async trait

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod proxy;
pub mod service;
pub mod workflow;

pub use config::Config;
pub use error::{Result, VeilError};
pub use events::{SessionEmitter, SessionRouter};
pub use proxy::ProxyPool;
pub use service::VerificationService;
