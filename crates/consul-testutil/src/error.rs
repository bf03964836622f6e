//! Error types for `consul-testutil`.

use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Why a single readiness probe did not succeed.
///
/// Every variant is expected while the agent is still starting; the poller retries them all the
/// same way.
#[derive(Error, Debug)]
pub enum NotReady {
    /// The HTTP request itself failed (connection refused, reset, timeout).
    #[error("status request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// `X-Consul-KnownLeader` was missing or not `true`.
    #[error("consul leader status: {0:?}")]
    LeaderUnknown(Option<String>),

    /// `X-Consul-Index` was missing.
    #[error("consul index header missing")]
    MissingIndex,

    /// `X-Consul-Index` was not an unsigned integer.
    #[error("consul index is not a number: {0:?}")]
    InvalidIndex(String),

    /// `X-Consul-Index` was `0`.
    #[error("consul index is 0")]
    ZeroIndex,
}

/// Errors starting a test server.
#[derive(Error, Debug)]
pub enum LaunchError {
    /// The agent binary is not on `PATH`. Tests should be skipped, not failed.
    #[error("agent binary '{binary}' not found on $PATH")]
    AgentNotFound { binary: String },

    /// Creating the temporary data directory failed.
    #[error("create data dir: {0}")]
    DataDir(#[source] std::io::Error),

    /// Creating or writing the temporary config file failed.
    #[error("write config file: {0}")]
    ConfigFile(#[source] std::io::Error),

    /// Serializing the agent config failed.
    #[error("serialize config: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Spawning the agent process failed.
    #[error("spawn '{binary}': {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// Building the HTTP client used for readiness probes failed.
    #[error("build http client: {0}")]
    HttpClient(#[source] reqwest::Error),

    /// The agent never became a ready leader within the wait budget.
    #[error("agent not ready after {attempts} attempts: {last_error}")]
    NotReady {
        attempts: u32,
        #[source]
        last_error: NotReady,
    },
}

impl LaunchError {
    /// True when the failure is the environment lacking the agent binary.
    #[must_use]
    pub fn is_agent_missing(&self) -> bool {
        matches!(self, LaunchError::AgentNotFound { .. })
    }
}

/// Errors tearing down a test server.
#[derive(Error, Debug)]
pub enum StopError {
    /// The agent had already exited before it was stopped.
    #[error("agent pid {pid} already exited ({status})")]
    AlreadyExited { pid: u32, status: ExitStatus },

    /// Delivering the kill signal or reaping the process failed.
    #[error("kill agent pid {pid}: {source}")]
    Kill {
        pid: u32,
        #[source]
        source: std::io::Error,
    },

    /// Removing the data directory failed.
    #[error("remove data dir {}: {source}", path.display())]
    RemoveDataDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
