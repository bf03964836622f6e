//! Throwaway Consul agents for integration tests.
//!
//! [`TestServer`] starts `consul agent` as a single-node bootstrapping server on ports derived
//! from a [`PortAllocator`] index, waits until it reports a known leader, and kills it again on
//! [`TestServer::stop`].
//!
//! ```no_run
//! # async fn demo() -> anyhow::Result<()> {
//! let Some(server) = consul_testutil::TestServer::builder()
//!     .configure(|mut c| {
//!         c.log_level = "info".to_string();
//!         c
//!     })
//!     .start_or_skip()
//!     .await?
//! else {
//!     return Ok(());
//! };
//! println!("consul at {}", server.http_url("/v1/status/leader"));
//! server.stop()?;
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod ports;
pub mod probe;
pub mod server;
pub mod wait;

pub use agent::AgentCommand;
pub use config::{AddressConfig, TestServerConfig};
pub use error::{LaunchError, NotReady, StopError};
pub use ports::{PortAllocator, PortConfig};
pub use probe::LeaderProbe;
pub use server::{TestServer, TestServerBuilder};
pub use wait::{GaveUp, WaitPolicy, retry_until_ok, wait_for_result};
