//! librespeed test servers and the public server registry.
//!
//! The registry returns a JSON array of servers, each with a base URL and
//! relative paths for the ping, download and upload endpoints.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Result;
use crate::params;

/// A candidate test server as listed by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    /// Registry identifier.
    pub id: i64,
    /// Display name, e.g. "Frankfurt, Germany (Clouvider)".
    pub name: String,
    /// Base URL of the server.
    pub server: String,
    /// Download endpoint path relative to `server`.
    #[serde(rename = "dlURL", default)]
    pub dl_url: String,
    /// Upload endpoint path relative to `server`.
    #[serde(rename = "ulURL", default)]
    pub ul_url: String,
    /// Ping endpoint path relative to `server`. Empty means
    /// [`params::DEFAULT_PING_PATH`].
    #[serde(rename = "pingURL", default)]
    pub ping_url: String,
}

impl Server {
    pub fn ping_endpoint(&self) -> Result<Url> {
        let path = if self.ping_url.is_empty() {
            params::DEFAULT_PING_PATH
        } else {
            &self.ping_url
        };
        self.endpoint(path)
    }

    pub fn download_endpoint(&self) -> Result<Url> {
        self.endpoint(&self.dl_url)
    }

    pub fn upload_endpoint(&self) -> Result<Url> {
        self.endpoint(&self.ul_url)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let base = self.server.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        // The registry lists most servers protocol-relative.
        let scheme = if base.starts_with("//") { "https:" } else { "" };
        Ok(Url::parse(&format!("{scheme}{base}/{path}"))?)
    }
}

/// Append a nanosecond timestamp query parameter so intermediaries never
/// serve a cached response.
pub fn cache_busted(endpoint: &Url) -> Url {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let mut url = endpoint.clone();
    url.query_pairs_mut()
        .append_pair(params::CACHE_BUSTER_PARAM, &nanos.to_string());
    url
}

/// Fetch the candidate server list from `registry_url`.
pub async fn fetch_list(client: &reqwest::Client, registry_url: &str) -> Result<Vec<Server>> {
    let response = client.get(registry_url).send().await?.error_for_status()?;
    let servers: Vec<Server> = response.json().await?;
    tracing::debug!(count = servers.len(), "fetched server list");
    Ok(servers)
}
