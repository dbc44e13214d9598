//! JSONL persistence for traces.
//!
//! Two layouts:
//! - **Single file**: every trace appended to one file (e.g. `.corvid/traces.jsonl`)
//! - **Daily**: one file per UTC day in a directory (e.g. `traces/2026-01-11.jsonl`)

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::Utc;

use crate::types::Trace;

/// Error type for trace writing operations.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Where traces are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceLayout {
    /// Append everything to one file.
    SingleFile(PathBuf),
    /// One `YYYY-MM-DD.jsonl` file per day inside a directory.
    Daily(PathBuf),
    /// Discard traces.
    Disabled,
}

/// Configuration for the trace writer.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    pub layout: TraceLayout,
}

impl WriterConfig {
    /// Append all traces to a single file.
    pub fn single_file(path: impl Into<PathBuf>) -> Self {
        Self {
            layout: TraceLayout::SingleFile(path.into()),
        }
    }

    /// Write daily-rotated files under `dir`.
    pub fn daily(dir: impl Into<PathBuf>) -> Self {
        Self {
            layout: TraceLayout::Daily(dir.into()),
        }
    }

    /// Discard traces.
    pub fn disabled() -> Self {
        Self {
            layout: TraceLayout::Disabled,
        }
    }
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self::daily(".corvid/traces")
    }
}

/// Appends traces as JSON lines. Thread-safe.
pub struct TraceWriter {
    config: WriterConfig,
    open: Mutex<Option<OpenFile>>,
}

struct OpenFile {
    /// Day string for daily layout, empty for single-file layout.
    day: String,
    writer: BufWriter<File>,
}

impl TraceWriter {
    /// Create a writer, creating the target directory if needed.
    pub fn new(config: WriterConfig) -> Result<Self, WriteError> {
        match &config.layout {
            TraceLayout::SingleFile(path) => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        fs::create_dir_all(parent)?;
                    }
                }
            }
            TraceLayout::Daily(dir) => fs::create_dir_all(dir)?,
            TraceLayout::Disabled => {}
        }

        Ok(Self {
            config,
            open: Mutex::new(None),
        })
    }

    /// Append a trace.
    pub fn write(&self, trace: &Trace) -> Result<(), WriteError> {
        let (path, day) = match &self.config.layout {
            TraceLayout::Disabled => return Ok(()),
            TraceLayout::SingleFile(path) => (path.clone(), String::new()),
            TraceLayout::Daily(dir) => {
                let day = today();
                (dir.join(format!("{}.jsonl", day)), day)
            }
        };

        let mut guard = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        let stale = guard.as_ref().is_none_or(|f| f.day != day);
        if stale {
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            *guard = Some(OpenFile {
                day,
                writer: BufWriter::new(file),
            });
        }

        if let Some(open) = guard.as_mut() {
            let line = serde_json::to_string(trace)?;
            writeln!(open.writer, "{}", line)?;
            open.writer.flush()?;
        }
        Ok(())
    }

    /// Path the next trace would be written to, if any.
    pub fn current_file_path(&self) -> Option<PathBuf> {
        match &self.config.layout {
            TraceLayout::SingleFile(path) => Some(path.clone()),
            TraceLayout::Daily(dir) => Some(dir.join(format!("{}.jsonl", today()))),
            TraceLayout::Disabled => None,
        }
    }

    /// All trace files this writer's layout covers, sorted.
    pub fn list_trace_files(&self) -> Result<Vec<PathBuf>, WriteError> {
        match &self.config.layout {
            TraceLayout::Disabled => Ok(Vec::new()),
            TraceLayout::SingleFile(path) => Ok(if path.exists() {
                vec![path.clone()]
            } else {
                Vec::new()
            }),
            TraceLayout::Daily(dir) => {
                let mut files: Vec<PathBuf> = fs::read_dir(dir)?
                    .filter_map(|e| e.ok())
                    .map(|e| e.path())
                    .filter(|p| p.extension().is_some_and(|ext| ext == "jsonl"))
                    .collect();
                files.sort();
                Ok(files)
            }
        }
    }

    /// Read every trace from a JSONL file.
    pub fn read_traces(path: &Path) -> Result<Vec<Trace>, WriteError> {
        let content = fs::read_to_string(path)?;
        let traces = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(serde_json::from_str)
            .collect::<Result<Vec<Trace>, _>>()?;
        Ok(traces)
    }
}

fn today() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}
