//! HTTP API
//!
//! REST endpoints over the verification service and WebSocket endpoints for
//! session and process-wide event streams.

pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod websocket;

pub use server::{ApiServer, AppState};
