//! On-disk collaborators: the bounded result history and the persisted
//! scheduler interval. Both are small JSON files in a data directory.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;
use crate::params;
use crate::result::MeasurementResult;

/// Keeps the most recent [`params::HISTORY_LIMIT`] results.
#[derive(Debug, Clone)]
pub struct History {
    path: PathBuf,
}

impl History {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        History { path: path.into() }
    }

    /// History file inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        History::new(dir.join(params::HISTORY_FILE))
    }

    /// Append `result`, dropping the oldest entries beyond the limit.
    pub fn append(&self, result: &MeasurementResult) -> Result<()> {
        let mut results = self.read_all()?;
        results.push(result.clone());
        if results.len() > params::HISTORY_LIMIT {
            results.drain(..results.len() - params::HISTORY_LIMIT);
        }
        write_json(&self.path, &results)
    }

    /// The `n` most recent results, oldest first.
    pub fn recent(&self, n: usize) -> Result<Vec<MeasurementResult>> {
        let mut results = self.read_all()?;
        if results.len() > n {
            results.drain(..results.len() - n);
        }
        Ok(results)
    }

    fn read_all(&self) -> Result<Vec<MeasurementResult>> {
        match fs::read_to_string(&self.path) {
            Ok(s) => Ok(serde_json::from_str(&s)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Persisted scheduler settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Hours between scheduled runs; 0 disables them.
    pub interval_hours: u32,
}

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ConfigStore { path: path.into() }
    }

    pub fn in_dir(dir: &Path) -> Self {
        ConfigStore::new(dir.join(params::CONFIG_FILE))
    }

    /// Load the config. A missing file means scheduling is disabled; an
    /// unreadable or malformed one is logged and treated the same way.
    pub fn load(&self) -> Config {
        match fs::read_to_string(&self.path) {
            Ok(s) => serde_json::from_str(&s).unwrap_or_else(|e| {
                warn!(path = %self.path.display(), error = %e, "malformed config, scheduling disabled");
                Config::default()
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Config::default(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "unreadable config, scheduling disabled");
                Config::default()
            }
        }
    }

    pub fn save(&self, config: Config) -> Result<()> {
        write_json(&self.path, &config)
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}
