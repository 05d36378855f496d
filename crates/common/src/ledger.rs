//! Append-only run history
//!
//! One CSV row per run, newest last:
//!
//! ```text
//! timestamp,run_id,status,actions,things
//! 2026-10-16T09:12:44Z,6f1c...,Complete,12,"[{""name"":""Thing 4821"",""id"":""4821""}]"
//! ```
//!
//! `things` holds the JSON-encoded item list so the file stays a flat table.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::{ExtractedItem, RunRecord};

/// Header row, written once when the ledger file is created
pub const LEDGER_HEADER: [&str; 5] = ["timestamp", "run_id", "status", "actions", "things"];

/// Default ledger location, relative to the working directory
pub const DEFAULT_LEDGER_FILE: &str = "run_history.csv";

/// Handle to a ledger file on disk
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name for user-facing messages
    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// Append one run, writing the header first if the file is new
    pub fn append(&self, record: &RunRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        // A zero-length file (touched, or left by a crash) still needs a header
        let new_file = match std::fs::metadata(&self.path) {
            Ok(meta) => meta.len() == 0,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => return Err(e.into()),
        };
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if new_file {
            writer.write_record(LEDGER_HEADER)?;
        }

        let things = serde_json::to_string(&record.items)?;
        let actions = record.action_count.to_string();
        writer.write_record([
            record.timestamp.as_str(),
            record.run_id.as_str(),
            record.status.as_str(),
            actions.as_str(),
            things.as_str(),
        ])?;
        writer.flush()?;

        info!("Run details written to {}", self.path.display());
        Ok(())
    }

    /// Every recorded run, oldest first. A missing file is an empty ledger.
    pub fn read_all(&self) -> Result<Vec<RunRecord>> {
        let Some((headers, rows)) = self.raw_rows()? else {
            return Ok(Vec::new());
        };

        let runs = rows
            .iter()
            .enumerate()
            .map(|(idx, row)| decode_row(&headers, row, idx + 2))
            .collect::<Result<Vec<_>>>()?;

        debug!("Loaded {} run(s) from {}", runs.len(), self.path.display());
        Ok(runs)
    }

    /// The most recent run, or `None` for a missing or empty ledger.
    ///
    /// Only the last row is decoded, so a damaged older row does not hide it.
    pub fn latest(&self) -> Result<Option<RunRecord>> {
        let Some((headers, rows)) = self.raw_rows()? else {
            return Ok(None);
        };

        match rows.last() {
            Some(row) => decode_row(&headers, row, rows.len() + 1).map(Some),
            None => Ok(None),
        }
    }

    /// Header names plus undecoded data rows; `None` when the file is missing
    fn raw_rows(&self) -> Result<Option<(Vec<String>, Vec<csv::StringRecord>)>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&self.path)?;

        let headers: Vec<String> = reader.headers()?.iter().map(String::from).collect();
        let rows = reader.records().collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Some((headers, rows)))
    }
}

fn decode_row(headers: &[String], row: &csv::StringRecord, line: usize) -> Result<RunRecord> {
    let fields: HashMap<&str, &str> = headers
        .iter()
        .map(String::as_str)
        .zip(row.iter())
        .collect();
    record_from_fields(&fields, line)
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new(DEFAULT_LEDGER_FILE)
    }
}

fn field<'a>(fields: &HashMap<&str, &'a str>, name: &str, line: usize) -> Result<&'a str> {
    fields
        .get(name)
        .copied()
        .ok_or_else(|| Error::Ledger(format!("line {}: missing '{}' field", line, name)))
}

fn record_from_fields(fields: &HashMap<&str, &str>, line: usize) -> Result<RunRecord> {
    let get = |name: &str| field(fields, name, line);

    let actions = get("actions")?;
    let action_count = actions.trim().parse::<u64>().map_err(|e| {
        Error::Ledger(format!("line {}: invalid action count '{}': {}", line, actions, e))
    })?;

    let things = get("things")?;
    let items: Vec<ExtractedItem> = if things.trim().is_empty() {
        Vec::new()
    } else {
        serde_json::from_str(things)?
    };

    Ok(RunRecord {
        timestamp: get("timestamp")?.to_string(),
        run_id: get("run_id")?.to_string(),
        status: get("status")?.to_string(),
        action_count,
        items,
    })
}
