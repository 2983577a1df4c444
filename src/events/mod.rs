//! Session event routing
//!
//! Workflows report progress through a `SessionEmitter` bound to their
//! session. Observers subscribe by session id and only ever see events
//! stamped with that exact id.

mod emitter;
mod router;

pub use emitter::SessionEmitter;
pub use router::{SessionRouter, Subscription};
