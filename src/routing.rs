//! Backends, routing rules, and the table that resolves one from the other.
//!
//! The table is built once from the config file at startup and shared
//! read-only across requests. Referential integrity between rules and the
//! server list is deliberately not validated at load time: a dangling
//! backend name degrades to the fallback chain in [`RoutingTable::resolve`]
//! instead of failing requests.

use anyhow::anyhow;
use bon::Builder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};
use url::Url;

/// A named upstream service the proxy can forward to.
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
pub struct Backend {
    pub name: String,
    pub url: Url,
}

/// Maps the `model` field of a request body to a backend name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingRule {
    pub model: String,
    pub server: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default)]
    pub rules: Vec<RoutingRule>,
    pub default_server: String,
}

/// The config file: listen address, the ordered server list, and routing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    pub listen_addr: String,
    pub servers: Vec<Backend>,
    pub routing: RoutingConfig,
}

impl ConfigFile {
    pub async fn load(path: &Path) -> Result<Self, anyhow::Error> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path.display(), e))?;

        let config: ConfigFile = serde_json::from_str(&contents)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path.display(), e))?;

        info!(
            "Loaded {} servers and {} routing rules from {}",
            config.servers.len(),
            config.routing.rules.len(),
            path.display()
        );
        Ok(config)
    }
}

/// The immutable routing table: ordered backends, a rule map, and the
/// default backend name.
#[derive(Debug)]
pub struct RoutingTable {
    backends: Vec<Backend>,
    rules: HashMap<String, String>,
    default_backend: String,
}

impl RoutingTable {
    /// Build a table from its parts. Duplicate rule keys collapse to the
    /// last occurrence, matching map-assignment semantics.
    ///
    /// An empty backend list is rejected here so that resolution can always
    /// fall back to the first configured backend.
    pub fn new(
        backends: Vec<Backend>,
        rules: Vec<RoutingRule>,
        default_backend: impl Into<String>,
    ) -> Result<Self, anyhow::Error> {
        if backends.is_empty() {
            return Err(anyhow!("No backend servers configured"));
        }
        let rules = rules
            .into_iter()
            .map(|rule| (rule.model, rule.server))
            .collect();
        Ok(Self {
            backends,
            rules,
            default_backend: default_backend.into(),
        })
    }

    pub fn from_config(config: ConfigFile) -> Result<Self, anyhow::Error> {
        Self::new(
            config.servers,
            config.routing.rules,
            config.routing.default_server,
        )
    }

    /// Resolve a routing key to a backend base URL.
    ///
    /// Precedence: the rule matching `routing_key`, then the default backend
    /// for unmatched or empty keys, then (if the named backend does not
    /// exist) the default backend again, then the first configured backend.
    /// The last step logs a warning but keeps the request alive — degraded
    /// routing is preferred over failing traffic on inconsistent config.
    pub fn resolve(&self, routing_key: &str) -> &Url {
        let backend_name = match self.rules.get(routing_key) {
            Some(name) if !name.is_empty() => name.as_str(),
            _ => self.default_backend.as_str(),
        };

        if let Some(backend) = self.find(backend_name) {
            return &backend.url;
        }

        if backend_name != self.default_backend
            && let Some(backend) = self.find(&self.default_backend)
        {
            return &backend.url;
        }

        warn!(
            default_server = %self.default_backend,
            "Default server not found, using first server"
        );
        // new() rejects an empty backend list, so the first entry exists.
        &self.backends[0].url
    }

    fn find(&self, name: &str) -> Option<&Backend> {
        self.backends.iter().find(|backend| backend.name == name)
    }
}
