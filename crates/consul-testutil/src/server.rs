//! Launch and teardown of a single throwaway agent.

use std::ffi::OsString;
use std::io::Write as _;
use std::path::Path;
use std::process::Child;

use tempfile::TempDir;

use crate::agent::AgentCommand;
use crate::config::TestServerConfig;
use crate::error::{LaunchError, StopError};
use crate::ports::PortAllocator;
use crate::probe::LeaderProbe;
use crate::wait::{WaitPolicy, retry_until_ok};

type Customize = Box<dyn FnOnce(TestServerConfig) -> TestServerConfig + Send>;

/// Options for starting a [`TestServer`].
///
/// Defaults are applied first; the [`configure`](Self::configure) transformation runs on top of
/// them, just before the config is written.
pub struct TestServerBuilder {
    agent: AgentCommand,
    wait: WaitPolicy,
    customize: Option<Customize>,
}

impl Default for TestServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TestServerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestServerBuilder")
            .field("agent", &self.agent)
            .field("wait", &self.wait)
            .field("customize", &self.customize.is_some())
            .finish()
    }
}

impl TestServerBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            agent: AgentCommand::default(),
            wait: WaitPolicy::default(),
            customize: None,
        }
    }

    /// Agent binary name (looked up on `PATH`) or path.
    #[must_use]
    pub fn binary(mut self, binary: impl Into<String>) -> Self {
        self.agent.set_binary(binary);
        self
    }

    /// Extra environment variable for the agent process.
    #[must_use]
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.agent.env(key, value);
        self
    }

    #[must_use]
    pub fn wait_policy(mut self, wait: WaitPolicy) -> Self {
        self.wait = wait;
        self
    }

    /// Transform the default config. Replaces any earlier transformation.
    #[must_use]
    pub fn configure(
        mut self,
        f: impl FnOnce(TestServerConfig) -> TestServerConfig + Send + 'static,
    ) -> Self {
        self.customize = Some(Box::new(f));
        self
    }

    /// Start an agent using the process-wide [`PortAllocator`].
    ///
    /// # Errors
    ///
    /// See [`start_with`](Self::start_with).
    pub async fn start(self) -> Result<TestServer, LaunchError> {
        self.start_with(PortAllocator::global()).await
    }

    /// Start an agent whose ports come from `ports`, and wait until it is a ready leader.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::AgentNotFound`] when the binary is missing (callers should skip
    /// the test), and another [`LaunchError`] for every other setup or readiness failure.
    pub async fn start_with(self, ports: &PortAllocator) -> Result<TestServer, LaunchError> {
        let program = self.agent.resolve()?;

        let data_dir = tempfile::Builder::new()
            .prefix("consul")
            .tempdir()
            .map_err(LaunchError::DataDir)?;

        let (index, port_config) = ports.next_ports();
        let mut config = TestServerConfig::with_ports(port_config);
        config.data_dir = Some(data_dir.path().to_path_buf());
        if let Some(customize) = self.customize {
            config = customize(config);
        }
        tracing::debug!(index, ?config, "resolved agent config");

        let config_file = write_config(&config)?;

        let child = self.agent.spawn(&program, config_file.path())?;
        let pid = child.id();
        tracing::debug!(pid, binary = %program.display(), "spawned agent");

        let mut server = TestServer {
            child: Some(child),
            data_dir: Some(data_dir),
            config,
        };

        if let Err(e) = server.wait_for_leader(self.wait).await {
            tracing::warn!(pid, error = %e, "agent did not become ready");
            server.kill_quietly();
            return Err(e);
        }

        // The agent has read its config by now.
        drop(config_file);
        tracing::info!(pid, http = %server.http_addr(), "agent ready");
        Ok(server)
    }

    /// Like [`start`](Self::start), but returns `Ok(None)` when the agent binary is missing so
    /// the calling test can return early instead of failing.
    ///
    /// # Errors
    ///
    /// Every [`LaunchError`] other than [`LaunchError::AgentNotFound`].
    pub async fn start_or_skip(self) -> Result<Option<TestServer>, LaunchError> {
        match self.start().await {
            Ok(server) => Ok(Some(server)),
            Err(e) if e.is_agent_missing() => {
                tracing::warn!(error = %e, "skipping");
                eprintln!("{e}, skipping");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

fn write_config(config: &TestServerConfig) -> Result<tempfile::NamedTempFile, LaunchError> {
    let content = config.to_json()?;
    let mut file = tempfile::Builder::new()
        .prefix("consul")
        .suffix(".json")
        .tempfile()
        .map_err(LaunchError::ConfigFile)?;
    file.write_all(&content).map_err(LaunchError::ConfigFile)?;
    file.flush().map_err(LaunchError::ConfigFile)?;
    Ok(file)
}

/// A running agent. Stop it with [`stop`](Self::stop); dropping it kills the process too but
/// discards any error.
#[derive(Debug)]
pub struct TestServer {
    child: Option<Child>,
    data_dir: Option<TempDir>,
    config: TestServerConfig,
}

impl TestServer {
    /// Start an agent with default settings.
    ///
    /// # Errors
    ///
    /// See [`TestServerBuilder::start_with`].
    pub async fn start() -> Result<Self, LaunchError> {
        TestServerBuilder::new().start().await
    }

    #[must_use]
    pub fn builder() -> TestServerBuilder {
        TestServerBuilder::new()
    }

    /// Process id of the agent. `0` once the process has been stopped.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.child.as_ref().map_or(0, Child::id)
    }

    /// The config the agent was started with, after customization.
    #[must_use]
    pub fn config(&self) -> &TestServerConfig {
        &self.config
    }

    /// Temporary data directory owned by this server. Removed on stop.
    ///
    /// This is the directory created at launch, even if the config points `data_dir` elsewhere.
    #[must_use]
    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_ref().map(TempDir::path)
    }

    /// `host:port` of the HTTP API.
    #[must_use]
    pub fn http_addr(&self) -> String {
        format!(
            "{}:{}",
            self.config.http_host(),
            self.config.http_port().unwrap_or_default()
        )
    }

    /// Absolute URL for `path` on the HTTP API.
    #[must_use]
    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.http_addr(), path)
    }

    async fn wait_for_leader(&self, policy: WaitPolicy) -> Result<(), LaunchError> {
        let port = self.config.http_port().unwrap_or_default();
        let probe = LeaderProbe::new(self.config.http_host(), port)?;
        tracing::debug!(url = probe.url(), "waiting for leader");
        retry_until_ok(policy, || probe.check())
            .await
            .map_err(|gave_up| LaunchError::NotReady {
                attempts: gave_up.attempts,
                last_error: gave_up.last_error,
            })
    }

    /// Kill the agent and remove its data directory.
    ///
    /// The data directory is removed even if killing fails. The first error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`StopError::AlreadyExited`] if the agent died on its own, [`StopError::Kill`] if
    /// the signal could not be delivered or the process could not be reaped, and
    /// [`StopError::RemoveDataDir`] if cleanup failed.
    pub fn stop(mut self) -> Result<(), StopError> {
        let killed = match self.child.take() {
            Some(child) => kill(child),
            None => Ok(()),
        };

        let removed = match self.data_dir.take() {
            Some(dir) => {
                let path = dir.path().to_path_buf();
                dir.close()
                    .map_err(|source| StopError::RemoveDataDir { path, source })
            }
            None => Ok(()),
        };

        killed.and(removed)
    }

    fn kill_quietly(&mut self) {
        if let Some(child) = self.child.take()
            && let Err(e) = kill(child)
        {
            tracing::debug!(error = %e, "agent cleanup");
        }
    }
}

fn kill(mut child: Child) -> Result<(), StopError> {
    let pid = child.id();
    match child.try_wait() {
        Ok(Some(status)) => return Err(StopError::AlreadyExited { pid, status }),
        Ok(None) => {}
        Err(source) => return Err(StopError::Kill { pid, source }),
    }
    child
        .kill()
        .map_err(|source| StopError::Kill { pid, source })?;
    child
        .wait()
        .map_err(|source| StopError::Kill { pid, source })?;
    tracing::debug!(pid, "agent killed");
    Ok(())
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.kill_quietly();
    }
}
