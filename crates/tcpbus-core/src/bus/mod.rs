//! Endpoint resolution and the built-in in-process bus.
//!
//! A [`Broker`] turns an endpoint URL (as written in a descriptor's
//! `client_endpoints` table) into a [`ServerEndpoint`] that sessions can
//! connect to.  Servers receive their broker by injection, so tests can
//! substitute a mock and deployments can plug in a real bus.

use std::sync::Arc;

use crate::channel::ServerEndpoint;

pub mod echo;
pub mod memory;

pub use echo::EchoService;
pub use memory::{MemoryBroker, LOCAL_SCHEME};

/// Resolves endpoint URLs to connectable services.
pub trait Broker: Send + Sync {
    /// Returns the service registered under `url`, if any.
    fn resolve(&self, url: &str) -> Option<Arc<dyn ServerEndpoint>>;
}
