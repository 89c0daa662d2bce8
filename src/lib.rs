//! A [librespeed](https://github.com/librespeed/speedtest) speed test client
//! library with scheduled background measurements.
//!
//! A measurement probes the public librespeed servers for latency, picks the
//! fastest reachable one, then runs a multi-stream download test followed by
//! a multi-stream upload test that re-sends a sample of the downloaded data.
//!
//! # Quick start
//!
//! ```no_run
//! use speedwatch::client::ClientBuilder;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ClientBuilder::new("my-app", "0.1.0").build()?;
//! let result = client.run_measurement().await?;
//! println!(
//!     "{} ms, {:.1} down, {:.1} up",
//!     result.ping_ms, result.download_mbps, result.upload_mbps
//! );
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod download;
pub mod emitter;
pub mod error;
pub mod params;
pub mod probe;
pub mod result;
pub mod scheduler;
pub mod server;
pub mod storage;
pub mod transfer;
pub mod upload;
