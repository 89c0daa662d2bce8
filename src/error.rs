use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Stage of a measurement run, used to tag failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Fetching the candidate server list.
    Servers,
    /// Latency probing and server selection.
    Probe,
    /// Download throughput test.
    Download,
    /// Upload throughput test.
    Upload,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Servers => "server list",
            Phase::Probe => "probing",
            Phase::Download => "download",
            Phase::Upload => "upload",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum SpeedError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("serialize/deserialize error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("bad server URL: {0}")]
    BadUrl(#[from] url::ParseError),
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("no reachable server")]
    NoReachableServer,
    #[error("interval must be between 0 and {max} hours, got {0}", max = u32::MAX)]
    InvalidInterval(i64),
    #[error("{phase} failed: {source}")]
    Phase {
        phase: Phase,
        #[source]
        source: Box<SpeedError>,
    },
}

impl SpeedError {
    /// Tag this error with the phase it aborted.
    pub fn during(self, phase: Phase) -> Self {
        SpeedError::Phase {
            phase,
            source: Box::new(self),
        }
    }

    /// Phase that failed, if the error was tagged with one.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            SpeedError::Phase { phase, .. } => Some(*phase),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SpeedError>;
