use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::ports::PortConfig;

/// Bind addresses for the agent's listeners.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressConfig {
    /// HTTP API bind address.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub http: String,
}

/// The agent configuration written to `-config-file`.
///
/// Fields left at their zero value are omitted from the JSON document so the agent falls back to
/// its own defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestServerConfig {
    #[serde(default, skip_serializing_if = "is_false")]
    pub bootstrap: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub server: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub log_level: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addresses: Option<AddressConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ports: Option<PortConfig>,
}

impl TestServerConfig {
    /// A single-node bootstrapping server on the given ports, logging at debug.
    #[must_use]
    pub fn with_ports(ports: PortConfig) -> Self {
        Self {
            bootstrap: true,
            server: true,
            data_dir: None,
            log_level: "debug".to_string(),
            addresses: None,
            ports: Some(ports),
        }
    }

    /// Host the HTTP API is reachable on. An unset or wildcard bind address maps to loopback.
    #[must_use]
    pub fn http_host(&self) -> &str {
        match self.addresses.as_ref().map(|a| a.http.as_str()) {
            None | Some("" | "0.0.0.0") => "127.0.0.1",
            Some(host) => host,
        }
    }

    /// Configured HTTP port, or `None` if the ports block or its `http` entry is unset.
    #[must_use]
    pub fn http_port(&self) -> Option<u16> {
        self.ports.map(|p| p.http).filter(|p| *p != 0)
    }

    /// JSON document handed to the agent.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails (not expected for this type).
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(v: &bool) -> bool {
    !*v
}
