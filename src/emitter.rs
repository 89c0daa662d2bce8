//! Output formatting for measurement events.
//!
//! The [`Emitter`] trait defines callbacks for each stage of a run.
//! Two implementations are provided:
//! - [`HumanReadableEmitter`] — progress lines and a formatted summary on a terminal.
//! - [`JsonEmitter`] — one JSON object per line, suitable for machine consumption.

use std::io::Write;

use serde::Serialize;

use crate::client::Progress;
use crate::error::{Phase, Result};
use crate::result::MeasurementResult;

#[derive(Serialize)]
#[serde(tag = "type")]
enum Event<'a> {
    Error { error: &'a str },
    Summary { result: &'a MeasurementResult },
    History { results: &'a [MeasurementResult] },
    Schedule { interval_hours: u32 },
}

/// Callbacks for measurement lifecycle events.
pub trait Emitter {
    /// Called for each progress update of a running measurement.
    fn on_progress(&mut self, p: &Progress) -> Result<()>;
    /// Called when a run fails.
    fn on_error(&mut self, err: &str) -> Result<()>;
    /// Called with the final result of a successful run.
    fn on_summary(&mut self, r: &MeasurementResult) -> Result<()>;
    /// Called with stored results, oldest first.
    fn on_history(&mut self, results: &[MeasurementResult]) -> Result<()>;
    /// Called with the current schedule interval.
    fn on_schedule(&mut self, interval_hours: u32) -> Result<()>;
}

/// Emits human-readable progress and results to a writer.
pub struct HumanReadableEmitter<W: Write> {
    out: W,
}

impl<W: Write> HumanReadableEmitter<W> {
    pub fn new(out: W) -> Self {
        HumanReadableEmitter { out }
    }
}

impl<W: Write> Emitter for HumanReadableEmitter<W> {
    fn on_progress(&mut self, p: &Progress) -> Result<()> {
        match p {
            Progress::Starting { phase } => writeln!(self.out, "starting {phase}")?,
            Progress::ServerSelected { server, latency_ms } => writeln!(
                self.out,
                "selected {} ({}) at {latency_ms:.1} ms",
                server.name, server.server
            )?,
            Progress::Complete {
                phase,
                throughput_mbps,
            } => writeln!(self.out, "{phase}: {throughput_mbps:>7.1} Mbit/s")?,
        }
        self.out.flush()?;
        Ok(())
    }

    fn on_error(&mut self, err: &str) -> Result<()> {
        writeln!(self.out, "measurement failed: {err}")?;
        Ok(())
    }

    fn on_summary(&mut self, r: &MeasurementResult) -> Result<()> {
        writeln!(self.out, "\nTest results\n")?;
        writeln!(self.out, "{:>10}: {}", "Server", r.server)?;
        writeln!(self.out, "{:>10}: {:>7} ms", "Ping", r.ping_ms)?;
        writeln!(
            self.out,
            "{:>10}: {:>7.1} Mbit/s",
            Phase::Download.to_string(),
            r.download_mbps
        )?;
        writeln!(
            self.out,
            "{:>10}: {:>7.1} Mbit/s",
            Phase::Upload.to_string(),
            r.upload_mbps
        )?;
        writeln!(self.out, "{:>10}: {}", "Time", r.timestamp.to_rfc3339())?;
        Ok(())
    }

    fn on_history(&mut self, results: &[MeasurementResult]) -> Result<()> {
        if results.is_empty() {
            writeln!(self.out, "no results yet")?;
            return Ok(());
        }
        for r in results {
            writeln!(
                self.out,
                "{}  ping {:>4} ms  down {:>7.1} Mbit/s  up {:>7.1} Mbit/s",
                r.timestamp.to_rfc3339(),
                r.ping_ms,
                r.download_mbps,
                r.upload_mbps
            )?;
        }
        Ok(())
    }

    fn on_schedule(&mut self, interval_hours: u32) -> Result<()> {
        if interval_hours == 0 {
            writeln!(self.out, "scheduled measurements disabled")?;
        } else {
            writeln!(self.out, "measuring every {interval_hours} h")?;
        }
        Ok(())
    }
}

/// Emits one JSON object per line for each event.
pub struct JsonEmitter<W: Write> {
    out: W,
}

impl<W: Write> JsonEmitter<W> {
    pub fn new(out: W) -> Self {
        JsonEmitter { out }
    }

    fn emit<T: Serialize>(&mut self, event: &T) -> Result<()> {
        let json = serde_json::to_string(event)?;
        writeln!(self.out, "{}", json)?;
        Ok(())
    }
}

impl<W: Write> Emitter for JsonEmitter<W> {
    fn on_progress(&mut self, p: &Progress) -> Result<()> {
        self.emit(p)
    }

    fn on_error(&mut self, err: &str) -> Result<()> {
        self.emit(&Event::Error { error: err })
    }

    fn on_summary(&mut self, r: &MeasurementResult) -> Result<()> {
        self.emit(&Event::Summary { result: r })
    }

    fn on_history(&mut self, results: &[MeasurementResult]) -> Result<()> {
        self.emit(&Event::History { results })
    }

    fn on_schedule(&mut self, interval_hours: u32) -> Result<()> {
        self.emit(&Event::Schedule { interval_hours })
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;

    use super::*;

    fn result() -> MeasurementResult {
        MeasurementResult {
            server: "https://speed.example.com".into(),
            ping_ms: 17,
            download_mbps: 250.0,
            upload_mbps: 40.25,
            timestamp: DateTime::parse_from_rfc3339("2026-10-17T09:30:00+02:00").unwrap(),
        }
    }

    #[test]
    fn human_readable_summary() {
        let mut buf = Vec::new();
        let mut emitter = HumanReadableEmitter::new(&mut buf);

        emitter.on_summary(&result()).unwrap();

        let out = String::from_utf8(buf).unwrap();
        assert!(out.contains("250.0 Mbit/s"));
        assert!(out.contains("40.2 Mbit/s") || out.contains("40.3 Mbit/s"));
        assert!(out.contains("17 ms"));
    }

    #[test]
    fn human_readable_progress() {
        let mut buf = Vec::new();
        let mut emitter = HumanReadableEmitter::new(&mut buf);

        emitter
            .on_progress(&Progress::Complete {
                phase: Phase::Download,
                throughput_mbps: 8.0,
            })
            .unwrap();

        let out = String::from_utf8(buf).unwrap();
        assert!(out.contains("download:"));
        assert!(out.contains("8.0 Mbit/s"));
    }

    #[test]
    fn json_emitter_valid() {
        let mut buf = Vec::new();
        let mut emitter = JsonEmitter::new(&mut buf);

        emitter.on_summary(&result()).unwrap();

        let out = String::from_utf8(buf).unwrap();
        let res = serde_json::from_str::<serde_json::Value>(&out).unwrap();

        assert_eq!(res["type"], "Summary");
        assert_eq!(res["result"]["ping_ms"], 17);
        assert_eq!(res["result"]["timestamp"], "2026-10-17T09:30:00+02:00");
    }

    #[test]
    fn json_schedule_event() {
        let mut buf = Vec::new();
        let mut emitter = JsonEmitter::new(&mut buf);

        emitter.on_schedule(3).unwrap();

        let res: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(res["type"], "Schedule");
        assert_eq!(res["interval_hours"], 3);
    }
}
