use consul_testutil::{TestServerBuilder, WaitPolicy};
use std::time::Duration;

pub const FAKE_AGENT: &str = env!("CARGO_BIN_EXE_consul-testutil-fake-agent");

/// Builder pointed at the fake agent binary, polling every 20ms for up to 10s.
pub fn fake_agent() -> TestServerBuilder {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    TestServerBuilder::new()
        .binary(FAKE_AGENT)
        .wait_policy(WaitPolicy::new(500, Duration::from_millis(20)))
}

/// Wait until nothing accepts connections on `addr` any more.
pub async fn wait_port_closed(addr: &str, timeout: Duration) -> anyhow::Result<()> {
    let start = std::time::Instant::now();
    loop {
        if tokio::net::TcpStream::connect(addr).await.is_err() {
            return Ok(());
        }
        if start.elapsed() > timeout {
            anyhow::bail!("{addr} still accepting connections");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
