use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::download;
use crate::error::{Phase, Result, SpeedError};
use crate::params;
use crate::probe::{self, SelectedServer};
use crate::result::MeasurementResult;
use crate::server::{self, Server};
use crate::storage::History;
use crate::transfer::TransferSettings;
use crate::upload;

/// Progress of a measurement run, reported while it executes.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum Progress {
    Starting {
        phase: Phase,
    },
    ServerSelected {
        server: Server,
        latency_ms: f64,
    },
    Complete {
        phase: Phase,
        throughput_mbps: f64,
    },
}

/// Runs measurements: probe → download → upload → persist.
///
/// Cheap to clone; clones share the HTTP connection pool.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    registry_url: String,
    download: TransferSettings,
    upload: TransferSettings,
    history: Option<Arc<History>>,
}

pub struct ClientBuilder {
    client_name: String,
    client_version: String,
    registry_url: String,
    download: TransferSettings,
    upload: TransferSettings,
    history: Option<History>,
}

impl ClientBuilder {
    pub fn new(client_name: &str, client_version: &str) -> Self {
        ClientBuilder {
            client_name: client_name.to_string(),
            client_version: client_version.to_string(),
            registry_url: params::REGISTRY_URL.to_string(),
            download: TransferSettings::download(),
            upload: TransferSettings::upload(),
            history: None,
        }
    }

    /// Server registry to fetch candidates from.
    pub fn registry_url(mut self, url: &str) -> Self {
        self.registry_url = url.to_string();
        self
    }

    pub fn download(mut self, settings: TransferSettings) -> Self {
        self.download = settings;
        self
    }

    pub fn upload(mut self, settings: TransferSettings) -> Self {
        self.upload = settings;
        self
    }

    /// Persist every successful result to `history`.
    pub fn history(mut self, history: History) -> Self {
        self.history = Some(history);
        self
    }

    pub fn build(self) -> Result<Client> {
        let user_agent = format!(
            "{}/{} {}/{}",
            self.client_name,
            self.client_version,
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        );
        let http = reqwest::Client::builder().user_agent(user_agent).build()?;
        Ok(Client {
            http,
            registry_url: self.registry_url,
            download: self.download,
            upload: self.upload,
            history: self.history.map(Arc::new),
        })
    }
}

impl Client {
    /// Fetch the candidate servers from the registry.
    pub async fn servers(&self) -> Result<Vec<Server>> {
        server::fetch_list(&self.http, &self.registry_url).await
    }

    /// Probe `servers` over HTTP and pick the fastest reachable one.
    pub async fn select_server(&self, servers: Vec<Server>) -> Option<SelectedServer> {
        let http = &self.http;
        probe::probe(servers, move |s| async move { probe::http_attempt(http, &s).await }).await
    }

    /// Run one full measurement.
    pub async fn run_measurement(&self) -> Result<MeasurementResult> {
        self.measure(None).await
    }

    /// Run one full measurement, reporting progress on `tx`.
    pub async fn run_measurement_with(
        &self,
        tx: mpsc::Sender<Progress>,
    ) -> Result<MeasurementResult> {
        self.measure(Some(&tx)).await
    }

    async fn measure(&self, tx: Option<&mpsc::Sender<Progress>>) -> Result<MeasurementResult> {
        let report = move |p: Progress| async move {
            if let Some(tx) = tx {
                let _ = tx.send(p).await;
            }
        };

        report(Progress::Starting {
            phase: Phase::Servers,
        })
        .await;
        let servers = self.servers().await.map_err(|e| e.during(Phase::Servers))?;

        report(Progress::Starting {
            phase: Phase::Probe,
        })
        .await;
        let selected = self
            .select_server(servers)
            .await
            .ok_or_else(|| SpeedError::NoReachableServer.during(Phase::Probe))?;
        info!(
            server = %selected.server.server,
            name = %selected.server.name,
            latency_ms = selected.latency.as_millis() as u64,
            "selected server"
        );
        report(Progress::ServerSelected {
            server: selected.server.clone(),
            latency_ms: selected.latency.as_secs_f64() * 1000.0,
        })
        .await;

        report(Progress::Starting {
            phase: Phase::Download,
        })
        .await;
        let dl = download::run(&self.http, &selected.server, self.download)
            .await
            .map_err(|e| e.during(Phase::Download))?;
        report(Progress::Complete {
            phase: Phase::Download,
            throughput_mbps: dl.throughput_mbps,
        })
        .await;

        report(Progress::Starting {
            phase: Phase::Upload,
        })
        .await;
        let ul = upload::run(&self.http, &selected.server, dl.sample, self.upload)
            .await
            .map_err(|e| e.during(Phase::Upload))?;
        report(Progress::Complete {
            phase: Phase::Upload,
            throughput_mbps: ul.throughput_mbps,
        })
        .await;

        let result = MeasurementResult::new(&selected, dl.throughput_mbps, ul.throughput_mbps);
        info!(
            download_mbps = result.download_mbps,
            upload_mbps = result.upload_mbps,
            ping_ms = result.ping_ms,
            "measurement complete"
        );

        if let Some(history) = &self.history
            && let Err(e) = history.append(&result)
        {
            warn!(error = %e, "failed to save result");
        }

        Ok(result)
    }
}
