//! Latency probing and best-server selection.

use std::future::Future;
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream;
use tokio::time::Instant;
use tracing::debug;

use crate::error::Result;
use crate::params;
use crate::server::Server;

/// Latency of one probed server.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub server: Server,
    /// Mean over successful attempts only. Zero when `ok` is false.
    pub latency: Duration,
    /// At least one attempt succeeded.
    pub ok: bool,
}

/// The server chosen for the transfer tests.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedServer {
    pub server: Server,
    pub latency: Duration,
}

/// Probe every server and pick the reachable one with the lowest mean
/// latency. Returns `None` when no server answered a single attempt.
///
/// `attempt` performs one ping against a server; the prober times it.
/// Up to [`params::PROBE_WORKERS`] servers are probed at once, each with
/// [`params::PING_ATTEMPTS`] sequential attempts. Failed attempts are
/// dropped from the mean and never abort the other probes.
pub async fn probe<F, Fut>(servers: Vec<Server>, attempt: F) -> Option<SelectedServer>
where
    F: Fn(Server) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let attempt = &attempt;
    let results: Vec<ProbeResult> = stream::iter(servers)
        .map(|server| probe_one(server, attempt))
        .buffer_unordered(params::PROBE_WORKERS)
        .collect()
        .await;
    select_best(results)
}

async fn probe_one<F, Fut>(server: Server, attempt: &F) -> ProbeResult
where
    F: Fn(Server) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut total = Duration::ZERO;
    let mut successes = 0u32;
    for _ in 0..params::PING_ATTEMPTS {
        let start = Instant::now();
        match attempt(server.clone()).await {
            Ok(()) => {
                total += start.elapsed();
                successes += 1;
            }
            Err(e) => debug!(server = %server.server, error = %e, "ping attempt failed"),
        }
    }

    if successes == 0 {
        debug!(server = %server.server, "server unreachable");
        return ProbeResult {
            server,
            latency: Duration::ZERO,
            ok: false,
        };
    }
    let latency = total / successes;
    debug!(server = %server.server, latency_ms = latency.as_millis() as u64, successes, "probed");
    ProbeResult {
        server,
        latency,
        ok: true,
    }
}

/// Fold probe results in arrival order. A later result replaces the
/// current pick only when strictly faster, so equal latencies resolve to
/// whichever arrived first. Arrival order depends on scheduling and is not
/// deterministic across runs.
pub fn select_best(results: impl IntoIterator<Item = ProbeResult>) -> Option<SelectedServer> {
    let mut best: Option<SelectedServer> = None;
    for result in results.into_iter().filter(|r| r.ok) {
        if best.as_ref().is_none_or(|b| result.latency < b.latency) {
            best = Some(SelectedServer {
                server: result.server,
                latency: result.latency,
            });
        }
    }
    best
}

/// One ping over HTTP: GET the ping endpoint and wait for the full body.
pub async fn http_attempt(client: &reqwest::Client, server: &Server) -> Result<()> {
    let url = server.ping_endpoint()?;
    client
        .get(url)
        .timeout(params::PING_TIMEOUT)
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await?;
    Ok(())
}
