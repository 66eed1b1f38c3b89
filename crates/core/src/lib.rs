// jobq Core - Domain Logic & Ports
// No infrastructure dependencies; adapters live in the infra crates.

pub mod application;
pub mod domain;
pub mod error;
pub mod port;

pub use error::{QueueError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
