//! JSON report persistence

use crate::error::ReportError;
use crate::models::{Reading, Summary};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// On-disk report layout
#[derive(Debug, Serialize)]
pub struct Report<'a> {
    pub analysis: &'a Summary,
    pub metrics: &'a [Reading],
    pub generated_at: DateTime<Utc>,
}

/// Write `summary` and the raw `readings` to `path` as pretty-printed JSON.
///
/// Parent directories are created as needed and an existing file is overwritten.
pub fn save_report(
    summary: &Summary,
    readings: &[Reading],
    path: &Path,
) -> Result<(), ReportError> {
    let report = Report {
        analysis: summary,
        metrics: readings,
        generated_at: Utc::now(),
    };
    let json = serde_json::to_string_pretty(&report)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| ReportError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    std::fs::write(path, json).map_err(|source| ReportError::Write {
        path: path.to_path_buf(),
        source,
    })?;

    info!(path = %path.display(), readings = readings.len(), "Report saved");
    Ok(())
}
