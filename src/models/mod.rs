pub mod event;
pub mod proxy;
pub mod verification;

pub use event::*;
pub use proxy::*;
pub use verification::*;
