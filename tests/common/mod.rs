//! Shared infrastructure for integration tests: spawning daemon
//! instances and driving them with scripted clients.

pub mod client;
pub mod server;

#[allow(unused_imports)]
pub use client::TestClient;
#[allow(unused_imports)]
pub use server::TestServer;
