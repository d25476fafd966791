//! JSONL event stream for watch automation.
//!
//! Every lifecycle event is printed as one JSON line to stdout and,
//! when configured, appended to a JSONL file so downstream tooling can
//! follow a watch session without scraping logs.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use crate::capture::CaptureReport;

/// Events emitted over the lifetime of a watch session.
#[derive(Debug, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum WatchEvent {
    /// The watch session has started.
    Started {
        namespace: String,
        timestamp: DateTime<Utc>,
    },
    /// A job was seen for the first time.
    JobDiscovered {
        job: String,
        timestamp: DateTime<Utc>,
    },
    /// The capture pipeline finished for a job.
    CaptureCompleted {
        report: CaptureReport,
        timestamp: DateTime<Utc>,
    },
    /// The idle timeout elapsed with no new jobs; the watch is over.
    IdleTimeout {
        idle_secs: u64,
        timestamp: DateTime<Utc>,
    },
}

impl WatchEvent {
    pub fn started(namespace: &str) -> Self {
        Self::Started {
            namespace: namespace.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn job_discovered(job: &str) -> Self {
        Self::JobDiscovered {
            job: job.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn capture_completed(report: CaptureReport) -> Self {
        Self::CaptureCompleted {
            report,
            timestamp: Utc::now(),
        }
    }

    pub fn idle_timeout(idle: Duration) -> Self {
        Self::IdleTimeout {
            idle_secs: idle.as_secs(),
            timestamp: Utc::now(),
        }
    }
}

/// Emits watch events to stdout and an optional JSONL file.
pub struct EventEmitter {
    output_file: Option<PathBuf>,
}

impl EventEmitter {
    pub fn new(output_file: Option<PathBuf>) -> Self {
        Self { output_file }
    }

    /// Emit one event. Emission is purely observational, so failures
    /// are logged and dropped.
    pub fn emit(&self, event: &WatchEvent) {
        if let Err(e) = self.try_emit(event) {
            warn!("failed to emit watch event: {e:#}");
        }
    }

    fn try_emit(&self, event: &WatchEvent) -> Result<()> {
        let json = serde_json::to_string(event)?;

        println!("{json}");
        std::io::stdout().flush()?;

        if let Some(ref path) = self.output_file {
            use std::fs::OpenOptions;
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open events file: {}", path.display()))?;
            writeln!(file, "{json}")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = WatchEvent::job_discovered("scan-7");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event_type"], "job_discovered");
        assert_eq!(value["job"], "scan-7");
    }

    #[test]
    fn test_emitter_appends_jsonl() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("events.jsonl");
        let emitter = EventEmitter::new(Some(path.clone()));

        emitter.emit(&WatchEvent::started("scans"));
        emitter.emit(&WatchEvent::idle_timeout(Duration::from_secs(300)));

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"started\""));
        assert!(lines[1].contains("\"idle_timeout\""));
    }
}
