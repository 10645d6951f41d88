//! Offline-first caching agent.
//!
//! The agent sits between an application and the network. It precaches a
//! versioned set of assets, serves the application's own assets cache-first
//! and everything else network-first, purges caches of older versions, and
//! turns push messages into notifications.

pub mod agent;
pub mod cache;
pub mod config;
pub mod event;
pub mod host;
pub mod http;
pub mod logging;

#[cfg(test)]
pub(crate) mod testing;

pub use agent::{CacheAgent, ServeSource, Served};
pub use config::Config;
pub use host::{HostHandle, ServiceHost, WorkerState};
