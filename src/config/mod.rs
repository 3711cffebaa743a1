//! Configuration loading and management.
//!
//! Split into logical submodules:
//! - [`types`]: top-level `Config` and `ServerConfig`/`ListenConfig`
//! - [`classes`]: connection classes (sendq byte limits, ping frequency)
//! - [`links`]: peer server link blocks
//! - [`limits`]: protocol limits (mode ceiling, ban cap, mailbox depth)
//! - [`opers`]: operator credential blocks

mod classes;
mod limits;
mod links;
mod opers;
mod types;

pub use classes::ClassConfig;
pub use limits::LimitsConfig;
pub use links::LinkBlock;
pub use opers::OperBlock;
pub use types::{Config, ListenConfig, ServerConfig};
