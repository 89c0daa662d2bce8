//! Download test.
//!
//! Each stream repeatedly GETs the server's download endpoint with a fresh
//! cache-buster and reads at most [`params::DOWNLOAD_CAP`] bytes of the
//! body. Everything read counts toward throughput; the first
//! [`params::DOWNLOAD_CAP`] bytes across all streams are kept as the
//! payload for the upload test.

use std::sync::Arc;

use bytes::BytesMut;
use futures_util::StreamExt;
use tracing::info;

use crate::error::Result;
use crate::params;
use crate::server::{Server, cache_busted};
use crate::transfer::{self, SampleBuffer, Transfer, TransferOutcome, TransferSettings};

/// Run the download test against `server`.
pub async fn run(
    client: &reqwest::Client,
    server: &Server,
    settings: TransferSettings,
) -> Result<TransferOutcome> {
    let endpoint = server.download_endpoint()?;
    let capture = Arc::new(SampleBuffer::new(params::DOWNLOAD_CAP));

    let client = client.clone();
    let sample = Arc::clone(&capture);
    let unit = move || fetch_chunk(client.clone(), endpoint.clone(), Arc::clone(&sample));
    let outcome = transfer::run(unit, settings.streams, settings.duration, Some(capture)).await?;

    info!(
        bytes = outcome.total_bytes,
        elapsed_ms = outcome.elapsed.as_millis() as u64,
        mbps = outcome.throughput_mbps,
        sample = outcome.sample.len(),
        "download complete"
    );
    Ok(outcome)
}

async fn fetch_chunk(
    client: reqwest::Client,
    endpoint: url::Url,
    sample: Arc<SampleBuffer>,
) -> Result<Transfer> {
    // Once the sample is complete, only count bytes.
    let keep = !sample.is_full().await;

    let response = client
        .get(cache_busted(&endpoint))
        .timeout(params::TRANSFER_REQUEST_TIMEOUT)
        .send()
        .await?
        .error_for_status()?;

    let mut body = response.bytes_stream();
    let mut kept = BytesMut::new();
    let mut bytes = 0u64;
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        bytes += chunk.len() as u64;
        if keep {
            let room = params::DOWNLOAD_CAP.saturating_sub(kept.len());
            kept.extend_from_slice(&chunk[..room.min(chunk.len())]);
        }
        if bytes >= params::DOWNLOAD_CAP as u64 {
            break;
        }
    }

    Ok(Transfer {
        bytes,
        payload: keep.then(|| kept.freeze()),
    })
}
