//! Parsing of the results CSV exported by the integration UI
//!
//! The export has a header row and a multi-line `Description` column. Only
//! rows mentioning a `Thing: <digits>` marker produce items; everything else
//! is noise from the run log.

use std::io::Read;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::types::ExtractedItem;

/// Column holding the free-text action description
pub const DESCRIPTION_COLUMN: &str = "Description";

/// Literal marker a description must contain to be considered at all
pub const THING_MARKER: &str = "Thing:";

static THING_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Thing:\s*(\d+)").expect("thing id pattern is valid")
});

/// Extract the item named by a single description cell, if any.
///
/// Newlines are flattened to spaces before matching so a marker split across
/// lines of a multi-line cell is still found.
pub fn item_from_description(description: &str) -> Option<ExtractedItem> {
    let flattened = description.replace('\n', " ");
    if !flattened.contains(THING_MARKER) {
        return None;
    }

    THING_ID
        .captures(&flattened)
        .and_then(|caps| caps.get(1))
        .map(|id| ExtractedItem::thing(id.as_str()))
}

/// Extract items from CSV data, preserving row order
pub fn extract_items_from_reader<R: Read>(reader: R) -> Result<Vec<ExtractedItem>> {
    let mut csv = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let description_idx = csv
        .headers()?
        .iter()
        .position(|h| h.trim() == DESCRIPTION_COLUMN);

    if description_idx.is_none() {
        warn!("Export has no '{}' column; no items can be extracted", DESCRIPTION_COLUMN);
    }

    let mut items = Vec::new();
    let mut rows = 0usize;

    for record in csv.records() {
        let record = record?;
        rows += 1;

        let description = description_idx
            .and_then(|idx| record.get(idx))
            .unwrap_or_default();

        if let Some(item) = item_from_description(description) {
            items.push(item);
        }
    }

    debug!("Scanned {} export rows, {} item(s) found", rows, items.len());
    Ok(items)
}

/// Extract items from an exported CSV file
pub fn extract_items(path: &Path) -> Result<Vec<ExtractedItem>> {
    let file = std::fs::File::open(path)?;
    extract_items_from_reader(file)
}

/// Remove a consumed export file.
///
/// Returns `false` (and logs a warning) when the file was already gone.
pub fn delete_export(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            info!("Temporary CSV file {} deleted", path.display());
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("Temporary CSV file {} not found", path.display());
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

/// Parse an export and delete it afterwards, whether or not parsing worked
pub fn consume_export(path: &Path) -> Result<Vec<ExtractedItem>> {
    let parsed = extract_items(path);
    let deleted = delete_export(path);
    let items = parsed?;
    deleted?;
    Ok(items)
}
