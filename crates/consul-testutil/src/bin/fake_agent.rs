//! Stand-in for `consul agent` used only by this crate's integration tests.
//!
//! Understands `agent -config-file <path>`, binds the configured HTTP port and answers
//! `/v1/catalog/nodes` with the leader headers the readiness probe looks for. It reports no leader
//! until `FAKE_AGENT_ELECTION_MS` has elapsed, then `X-Consul-Index: $FAKE_AGENT_INDEX`.

use anyhow::Context as _;
use axum::Router;
use axum::extract::State;
use axum::routing::get;
use consul_testutil::TestServerConfig;
use consul_testutil::probe::{INDEX_HEADER, KNOWN_LEADER_HEADER, STATUS_PATH};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

struct AgentState {
    config: TestServerConfig,
    started: Instant,
    election: Duration,
    index: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config_path = parse_args(std::env::args().skip(1))?;
    let bytes = std::fs::read(&config_path)
        .with_context(|| format!("read config {}", config_path.display()))?;
    let config: TestServerConfig = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse {}", config_path.display()))?;

    if let Some(dir) = &config.data_dir {
        std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        std::fs::write(dir.join("fake-agent.pid"), std::process::id().to_string())
            .context("write pid file")?;
    }

    let port = config.http_port().context("config has no ports.http")?;
    let bind = format!("{}:{port}", config.http_host());

    let state = Arc::new(AgentState {
        config,
        started: Instant::now(),
        election: Duration::from_millis(env_u64("FAKE_AGENT_ELECTION_MS", 0)?),
        index: env_u64("FAKE_AGENT_INDEX", 5)?,
    });

    let app = Router::new()
        .route(STATUS_PATH, get(catalog_nodes))
        .route("/v1/agent/self", get(agent_self))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("bind {bind}"))?;
    tracing::info!(%bind, "fake agent listening");

    axum::serve(listener, app).await.context("serve")?;
    Ok(())
}

fn parse_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<PathBuf> {
    let sub = args.next().context("missing subcommand")?;
    anyhow::ensure!(sub == "agent", "unsupported subcommand '{sub}'");

    while let Some(arg) = args.next() {
        if arg == "-config-file" {
            let path = args.next().context("-config-file needs a value")?;
            return Ok(PathBuf::from(path));
        }
    }
    anyhow::bail!("missing -config-file")
}

fn env_u64(key: &str, default: u64) -> anyhow::Result<u64> {
    match std::env::var(key) {
        Ok(v) => v.trim().parse().with_context(|| format!("parse {key}={v}")),
        Err(_) => Ok(default),
    }
}

async fn catalog_nodes(
    State(state): State<Arc<AgentState>>,
) -> ([(&'static str, String); 2], &'static str) {
    let elected = state.started.elapsed() >= state.election;
    let (leader, index) = if elected {
        ("true", state.index)
    } else {
        ("false", 0)
    };
    (
        [
            (KNOWN_LEADER_HEADER, leader.to_string()),
            (INDEX_HEADER, index.to_string()),
        ],
        "[]",
    )
}

async fn agent_self(State(state): State<Arc<AgentState>>) -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "Config": state.config }))
}
