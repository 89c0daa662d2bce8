//! Multi-stream, time-boxed transfer runner shared by the download and
//! upload tests.
//!
//! The runner is deliberately unaware of HTTP: it repeatedly invokes a
//! unit-of-work on `streams` concurrent tasks until the deadline passes and
//! sums the bytes each invocation reports.
//!
//! Deadline enforcement is checked, not preemptive. A stream looks at the
//! clock only between units of work, so a run lasts at least `duration` and
//! may overrun it by up to one in-flight request.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{Result, SpeedError};
use crate::params;

/// Stream count and minimum duration of one transfer test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferSettings {
    pub streams: usize,
    pub duration: Duration,
}

impl TransferSettings {
    pub fn download() -> Self {
        TransferSettings {
            streams: params::DOWNLOAD_STREAMS,
            duration: params::TRANSFER_DURATION,
        }
    }

    pub fn upload() -> Self {
        TransferSettings {
            streams: params::UPLOAD_STREAMS,
            duration: params::TRANSFER_DURATION,
        }
    }
}

/// What one unit-of-work moved over the wire.
#[derive(Debug, Clone, Default)]
pub struct Transfer {
    /// Bytes counted toward throughput.
    pub bytes: u64,
    /// Data offered to the capture buffer, if any.
    pub payload: Option<Bytes>,
}

impl Transfer {
    pub fn counted(bytes: u64) -> Self {
        Transfer {
            bytes,
            payload: None,
        }
    }
}

/// Aggregate result of a transfer run.
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    pub throughput_mbps: f64,
    pub total_bytes: u64,
    pub elapsed: Duration,
    /// Captured sample; empty unless a capture buffer was supplied.
    pub sample: Bytes,
}

/// Bounded buffer that keeps the first `cap` bytes offered to it by any
/// number of concurrent writers and silently drops the rest.
#[derive(Debug)]
pub struct SampleBuffer {
    cap: usize,
    buf: Mutex<BytesMut>,
}

impl SampleBuffer {
    pub fn new(cap: usize) -> Self {
        SampleBuffer {
            cap,
            buf: Mutex::new(BytesMut::new()),
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Append as much of `data` as fits under the cap.
    pub async fn append(&self, data: &[u8]) {
        let mut buf = self.buf.lock().await;
        let remaining = self.cap.saturating_sub(buf.len());
        let take = remaining.min(data.len());
        if take > 0 {
            buf.extend_from_slice(&data[..take]);
        }
    }

    pub async fn len(&self) -> usize {
        self.buf.lock().await.len()
    }

    pub async fn is_full(&self) -> bool {
        self.len().await >= self.cap
    }

    /// Copy of the bytes captured so far.
    pub async fn snapshot(&self) -> Bytes {
        Bytes::copy_from_slice(&self.buf.lock().await)
    }
}

/// Throughput in megabits per second.
pub fn throughput_mbps(total_bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    total_bytes as f64 * 8.0 / secs / 1_000_000.0
}

/// Drive `unit` on `streams` concurrent tasks until `duration` has elapsed.
///
/// A stream whose unit-of-work fails stops immediately without retrying.
/// The run still waits for every other stream to finish, then fails with
/// the first error reported. Throughput is only computed when every
/// stream succeeded, over the actual elapsed wall time.
pub async fn run<F, Fut>(
    unit: F,
    streams: usize,
    duration: Duration,
    capture: Option<Arc<SampleBuffer>>,
) -> Result<TransferOutcome>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Transfer>> + Send + 'static,
{
    let unit = Arc::new(unit);
    let total = Arc::new(Mutex::new(0u64));
    let start = Instant::now();

    let mut tasks = JoinSet::new();
    for stream in 0..streams {
        let unit = Arc::clone(&unit);
        let total = Arc::clone(&total);
        let capture = capture.clone();
        tasks.spawn(async move {
            while start.elapsed() < duration {
                let transfer = unit().await.inspect_err(|e| {
                    debug!(stream, error = %e, "stream stopped");
                })?;
                *total.lock().await += transfer.bytes;
                if let (Some(capture), Some(payload)) = (&capture, &transfer.payload) {
                    capture.append(payload).await;
                }
            }
            Ok::<(), SpeedError>(())
        });
    }

    let mut first_error = None;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
            Err(e) => std::panic::resume_unwind(e.into_panic()),
        }
    }
    let elapsed = start.elapsed();

    if let Some(e) = first_error {
        warn!(error = %e, "transfer run failed");
        return Err(e);
    }

    let total_bytes = *total.lock().await;
    let sample = match &capture {
        Some(capture) => capture.snapshot().await,
        None => Bytes::new(),
    };

    Ok(TransferOutcome {
        throughput_mbps: throughput_mbps(total_bytes, elapsed),
        total_bytes,
        elapsed,
        sample,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn throughput_formula() {
        let mbps = throughput_mbps(4_000_000, Duration::from_secs(2));
        assert!((mbps - 16.0).abs() < 1e-9);

        let mbps = throughput_mbps(1_250_000, Duration::from_millis(500));
        assert!((mbps - 20.0).abs() < 1e-9);

        assert_eq!(throughput_mbps(1_000, Duration::ZERO), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn four_streams_over_two_seconds() {
        let outcome = run(
            || async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Ok(Transfer::counted(1_000_000))
            },
            4,
            Duration::from_secs(1),
            None,
        )
        .await
        .unwrap();

        assert_eq!(outcome.total_bytes, 4_000_000);
        assert!(outcome.elapsed >= Duration::from_secs(2));
        assert!(outcome.elapsed < Duration::from_millis(2_010));
        assert!((outcome.throughput_mbps - 16.0).abs() < 0.1);
        assert!(
            (outcome.throughput_mbps - throughput_mbps(4_000_000, outcome.elapsed)).abs() < 1e-9
        );
        assert!(outcome.sample.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn duration_is_a_minimum_not_a_bound() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let outcome = run(
            move || {
                c.fetch_add(1, Ordering::SeqCst);
                async {
                    tokio::time::sleep(Duration::from_millis(300)).await;
                    Ok(Transfer::counted(10))
                }
            },
            1,
            Duration::from_secs(1),
            None,
        )
        .await
        .unwrap();

        // Checks at 0, 300, 600 and 900ms all pass; the last request ends at 1.2s.
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(outcome.elapsed >= Duration::from_millis(1200));
        assert!(outcome.elapsed < Duration::from_millis(1300));
        assert_eq!(outcome.total_bytes, 40);
    }

    #[tokio::test(start_paused = true)]
    async fn one_failing_stream_fails_the_run() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let result = run(
            move || {
                let first = c.fetch_add(1, Ordering::SeqCst) == 0;
                async move {
                    if first {
                        return Err(SpeedError::NoReachableServer);
                    }
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok(Transfer::counted(1_000))
                }
            },
            4,
            Duration::from_secs(1),
            None,
        )
        .await;

        assert!(matches!(result, Err(SpeedError::NoReachableServer)));
        // The other streams kept going until the deadline.
        assert!(calls.load(Ordering::SeqCst) > 4);
    }

    #[tokio::test(start_paused = true)]
    async fn capture_keeps_payloads_up_to_cap() {
        let capture = Arc::new(SampleBuffer::new(2_500));
        let outcome = run(
            || async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(Transfer {
                    bytes: 1_000,
                    payload: Some(Bytes::from(vec![7u8; 1_000])),
                })
            },
            3,
            Duration::from_millis(50),
            Some(Arc::clone(&capture)),
        )
        .await
        .unwrap();

        assert_eq!(outcome.total_bytes, 15_000);
        assert_eq!(outcome.sample.len(), 2_500);
        assert!(capture.is_full().await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn sample_buffer_never_exceeds_cap_under_contention() {
        let buffer = Arc::new(SampleBuffer::new(10_500));
        let mut tasks = JoinSet::new();
        for i in 0..32u8 {
            let buffer = Arc::clone(&buffer);
            tasks.spawn(async move {
                for _ in 0..4 {
                    buffer.append(&[i; 999]).await;
                }
            });
        }
        while let Some(joined) = tasks.join_next().await {
            joined.unwrap();
        }

        assert_eq!(buffer.len().await, buffer.cap());
        assert_eq!(buffer.snapshot().await.len(), 10_500);
    }
}
