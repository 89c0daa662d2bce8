use bytes::Bytes;
use tracing::{info, warn};

use crate::error::Result;
use crate::params;
use crate::server::{Server, cache_busted};
use crate::transfer::{self, Transfer, TransferOutcome, TransferSettings};

/// Run the upload test against `server`, POSTing `payload` on every request.
///
/// An empty payload skips the test and reports zero throughput.
pub async fn run(
    client: &reqwest::Client,
    server: &Server,
    payload: Bytes,
    settings: TransferSettings,
) -> Result<TransferOutcome> {
    let endpoint = server.upload_endpoint()?;

    if payload.is_empty() {
        warn!("no download sample to upload, skipping upload test");
        return Ok(TransferOutcome {
            throughput_mbps: 0.0,
            total_bytes: 0,
            elapsed: std::time::Duration::ZERO,
            sample: Bytes::new(),
        });
    }

    let client = client.clone();
    let unit = move || send_chunk(client.clone(), endpoint.clone(), payload.clone());
    let outcome = transfer::run(unit, settings.streams, settings.duration, None).await?;

    info!(
        bytes = outcome.total_bytes,
        elapsed_ms = outcome.elapsed.as_millis() as u64,
        mbps = outcome.throughput_mbps,
        "upload complete"
    );
    Ok(outcome)
}

// The server's reply is drained and discarded; only the payload counts.
async fn send_chunk(client: reqwest::Client, endpoint: url::Url, payload: Bytes) -> Result<Transfer> {
    let sent = payload.len() as u64;
    client
        .post(cache_busted(&endpoint))
        .timeout(params::TRANSFER_REQUEST_TIMEOUT)
        .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
        .body(payload)
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await?;
    Ok(Transfer::counted(sent))
}
