//! Leader readiness check against the agent's HTTP API.

use std::time::Duration;

use crate::error::{LaunchError, NotReady};

pub const STATUS_PATH: &str = "/v1/catalog/nodes";
pub const KNOWN_LEADER_HEADER: &str = "X-Consul-KnownLeader";
pub const INDEX_HEADER: &str = "X-Consul-Index";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Probes `/v1/catalog/nodes` until the agent reports a known leader and a non-zero index.
#[derive(Debug, Clone)]
pub struct LeaderProbe {
    client: reqwest::Client,
    url: String,
}

impl LeaderProbe {
    /// Probe for the agent whose HTTP API listens on `host:port`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(host: &str, port: u16) -> Result<Self, LaunchError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(LaunchError::HttpClient)?;
        Ok(Self {
            client,
            url: format!("http://{host}:{port}{STATUS_PATH}"),
        })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// One readiness attempt.
    ///
    /// # Errors
    ///
    /// Returns the reason the agent is not ready yet.
    pub async fn check(&self) -> Result<(), NotReady> {
        let resp = self.client.get(&self.url).send().await?;
        let headers = resp.headers();
        let header = |name: &str| {
            headers
                .get(name)
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        };

        let leader = header(KNOWN_LEADER_HEADER);
        if leader.as_deref() != Some("true") {
            return Err(NotReady::LeaderUnknown(leader));
        }

        let index = header(INDEX_HEADER).ok_or(NotReady::MissingIndex)?;
        match index.trim().parse::<u64>() {
            Ok(0) => Err(NotReady::ZeroIndex),
            Ok(_) => Ok(()),
            Err(_) => Err(NotReady::InvalidIndex(index)),
        }
    }
}
