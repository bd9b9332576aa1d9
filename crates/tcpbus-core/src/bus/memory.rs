//! In-process broker: a name → service table.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use super::Broker;
use crate::channel::ServerEndpoint;

/// URL scheme for services hosted by a [`MemoryBroker`].
///
/// `local:echo` and plain `echo` resolve to the same entry.
pub const LOCAL_SCHEME: &str = "local:";

/// A [`Broker`] backed by a hash map of named services.
#[derive(Default)]
pub struct MemoryBroker {
    services: RwLock<HashMap<String, Arc<dyn ServerEndpoint>>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `service` under `name`, returning the service it replaced.
    pub fn register(
        &self,
        name: impl Into<String>,
        service: Arc<dyn ServerEndpoint>,
    ) -> Option<Arc<dyn ServerEndpoint>> {
        let name = name.into();
        debug!("broker: registering service \"{name}\"");
        self.services
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, service)
    }

    /// Removes the service registered under `name`.
    pub fn unregister(&self, name: &str) -> Option<Arc<dyn ServerEndpoint>> {
        self.services
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
    }

    /// Names of all registered services, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl Broker for MemoryBroker {
    fn resolve(&self, url: &str) -> Option<Arc<dyn ServerEndpoint>> {
        let name = url.strip_prefix(LOCAL_SCHEME).unwrap_or(url);
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
