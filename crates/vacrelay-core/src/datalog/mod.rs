//! Session logging
//!
//! Appends timestamped pressure samples to a per-session CSV file. A session
//! is the interval between a start-logging and the matching stop-logging
//! command; each session owns exactly one file, named after its start time.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

/// Header row written at the top of every session log
pub const LOG_HEADER: &str = "Timestamp,Pressure (Bar)";

/// Derive the per-session log file name from the session start time.
///
/// Second-resolution timestamps keep names unique across sessions.
pub fn session_filename(started_at: DateTime<Local>) -> String {
    format!("pressure_log_{}.csv", started_at.format("%Y%m%d_%H%M%S"))
}

/// Format a log timestamp with millisecond precision
pub fn format_timestamp(at: DateTime<Local>) -> String {
    at.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

/// An open session log owning exclusive write access to its file
#[derive(Debug)]
pub struct SessionLog {
    filename: String,
    path: PathBuf,
    writer: BufWriter<File>,
}

impl SessionLog {
    /// Create a session log at `path` and write the header row.
    ///
    /// The file is created exclusively; a leftover file with the same name
    /// fails the call rather than being truncated.
    pub fn create(path: &Path) -> io::Result<Self> {
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();
        let file = File::options().write(true).create_new(true).open(path)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{LOG_HEADER}")?;
        writer.flush()?;
        Ok(Self {
            filename,
            path: path.to_path_buf(),
            writer,
        })
    }

    /// File name of this session's log
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Full path of this session's log
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one sample row, flushed so the row is durable while the
    /// session is still active
    pub fn append(&mut self, at: DateTime<Local>, pressure: f64) -> io::Result<()> {
        writeln!(self.writer, "{},{}", format_timestamp(at), pressure)?;
        self.writer.flush()
    }

    /// Flush and close the log
    pub fn close(mut self) -> io::Result<()> {
        self.writer.flush()
    }
}
