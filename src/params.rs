//! Measurement constants and tuning parameters.

use std::time::Duration;

/// Public librespeed server registry.
pub const REGISTRY_URL: &str = "https://librespeed.org/backend-servers/servers.php";

/// Ping path used when a server does not advertise one.
pub const DEFAULT_PING_PATH: &str = "backend/empty.php";

/// Query parameter carrying the cache-busting timestamp.
pub const CACHE_BUSTER_PARAM: &str = "ck";

/// Number of servers probed concurrently.
pub const PROBE_WORKERS: usize = 10;

/// Sequential ping attempts per server.
pub const PING_ATTEMPTS: usize = 3;

/// Timeout for a single ping attempt.
pub const PING_TIMEOUT: Duration = Duration::from_secs(3);

/// Concurrent streams used by the download test.
pub const DOWNLOAD_STREAMS: usize = 8;

/// Concurrent streams used by the upload test. Servers tend to throttle
/// uploads harder, so more streams are needed to saturate the link.
pub const UPLOAD_STREAMS: usize = 16;

/// Minimum duration of each transfer test.
pub const TRANSFER_DURATION: Duration = Duration::from_secs(15);

/// Timeout for a single download or upload request.
pub const TRANSFER_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Maximum body read per download request, and the cap on the captured
/// sample reused as the upload payload (5 MiB).
pub const DOWNLOAD_CAP: usize = 5 * 1024 * 1024;

/// Number of results kept by the history store.
pub const HISTORY_LIMIT: usize = 5;

/// History file name inside the data directory.
pub const HISTORY_FILE: &str = "speedwatch_results.json";

/// Config file name inside the data directory.
pub const CONFIG_FILE: &str = "speedwatch_config.json";

/// How often the daemon re-reads the config file for interval changes.
pub const CONFIG_POLL_INTERVAL: Duration = Duration::from_secs(30);
