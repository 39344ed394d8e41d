//! Append-only log of pipeline stage events
//!
//! The log is an injected collaborator rather than global state: stages take
//! a `&dyn StageLog` and call [`StageLog::record`]. Every record is mirrored
//! to `tracing` so console output and the log file agree.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::state::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Start,
    Success,
    Error,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StageStatus::Start => "start",
            StageStatus::Success => "success",
            StageStatus::Error => "error",
        })
    }
}

/// One line of the stage log
#[derive(Debug, Clone, PartialEq)]
pub struct StageEvent {
    pub timestamp: DateTime<Utc>,
    pub stage: Stage,
    pub status: StageStatus,
    pub message: String,
}

impl StageEvent {
    pub fn new(stage: Stage, status: StageStatus, message: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            stage,
            status,
            message: message.to_string(),
        }
    }

    /// Render as a single log line (no trailing newline)
    pub fn to_line(&self) -> String {
        // Messages must not break the one-event-per-line format
        let message = self.message.replace(['\n', '\r'], " ");
        format!(
            "{} {} {} {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.stage,
            self.status,
            message
        )
    }
}

/// Sink for stage events
pub trait StageLog {
    fn record(&self, stage: Stage, status: StageStatus, message: &str);
}

fn trace_event(event: &StageEvent) {
    match event.status {
        StageStatus::Start => {
            tracing::debug!(stage = %event.stage, "{}", event.message)
        }
        StageStatus::Success => {
            tracing::info!(stage = %event.stage, "{}", event.message)
        }
        StageStatus::Error => {
            tracing::error!(stage = %event.stage, "{}", event.message)
        }
    }
}

/// Stage log backed by a text file opened in append mode for each event
#[derive(Debug, Clone)]
pub struct FileStageLog {
    path: PathBuf,
}

impl FileStageLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")
    }
}

impl StageLog for FileStageLog {
    fn record(&self, stage: Stage, status: StageStatus, message: &str) {
        let event = StageEvent::new(stage, status, message);
        trace_event(&event);
        if let Err(err) = self.append(&event.to_line()) {
            tracing::warn!(path = %self.path.display(), "failed to append to stage log: {err}");
        }
    }
}

/// In-memory stage log, mostly for tests and embedding
#[derive(Debug, Default)]
pub struct MemoryStageLog {
    events: Mutex<Vec<StageEvent>>,
}

impl MemoryStageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<StageEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Events with `Error` status
    pub fn errors(&self) -> Vec<StageEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.status == StageStatus::Error)
            .collect()
    }
}

impl StageLog for MemoryStageLog {
    fn record(&self, stage: Stage, status: StageStatus, message: &str) {
        let event = StageEvent::new(stage, status, message);
        trace_event(&event);
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
