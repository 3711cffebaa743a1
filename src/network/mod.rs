//! Connection plumbing: listeners, per-link tasks, fanout and teardown.
//!
//! - [`gateway`]: TCP listeners for clients and peer servers
//! - [`connection`]: per-client reader task + the shared writer task
//! - [`peer`]: server link handshake, burst and relay loop
//! - [`fanout`]: multi-destination delivery with per-call dedup
//! - [`reaper`]: the single task that tears condemned links down
//! - [`sweep`]: periodic PING probe / idle timeout

pub mod connection;
pub mod fanout;
pub mod gateway;
pub mod peer;
pub mod reaper;
pub mod sweep;

pub use gateway::Gateway;
