//! Descriptor schema.
//!
//! A descriptor lists listener instances.  Each instance carries its own
//! settings table and the URLs of the client endpoints it talks to:
//!
//! ```toml
//! log_level = "info"
//!
//! [[instance]]
//! name = "telnet"
//!
//! [instance.settings]
//! ifc = "127.0.0.1"
//! port = 9000
//! backof = 16
//! bufsize = 1024
//!
//! [instance.client_endpoints]
//! uplink = "local:echo"
//! ```

use std::collections::BTreeMap;

use serde::Deserialize;

/// Name of the client endpoint every listener connects its sessions to.
pub const UPLINK_ENDPOINT: &str = "uplink";

/// Top-level descriptor file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ServerDescriptor {
    /// Log filter used when neither `RUST_LOG` nor `--log-level` is given.
    #[serde(default)]
    pub log_level: Option<String>,

    #[serde(default, rename = "instance")]
    pub instances: Vec<InstanceDescriptor>,
}

impl ServerDescriptor {
    /// Looks up an instance by name.
    pub fn instance(&self, name: &str) -> Option<&InstanceDescriptor> {
        self.instances.iter().find(|i| i.name == name)
    }
}

/// One listener instance.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InstanceDescriptor {
    pub name: String,

    #[serde(default)]
    pub settings: BTreeMap<String, toml::Value>,

    /// Endpoint name → bus URL.
    #[serde(default)]
    pub client_endpoints: BTreeMap<String, String>,
}

impl InstanceDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            settings: BTreeMap::new(),
            client_endpoints: BTreeMap::new(),
        }
    }

    /// Builder-style setter for a settings entry.
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<toml::Value>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// Builder-style setter for a client endpoint URL.
    pub fn with_client_endpoint(mut self, name: impl Into<String>, url: impl Into<String>) -> Self {
        self.client_endpoints.insert(name.into(), url.into());
        self
    }

    pub fn client_endpoint(&self, name: &str) -> Option<&str> {
        self.client_endpoints.get(name).map(String::as_str)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
