//! Write-only export of session reports.

use crate::model::SessionReport;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Write `report` as pretty JSON to `path`, creating parent directories.
pub fn export_json(path: &Path, report: &SessionReport) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(report).context("serialize session report")?;
    std::fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Default export file name in the current directory, derived from the report timestamp.
pub fn default_export_path(report: &SessionReport) -> Result<PathBuf> {
    let name = format!(
        "hotspot-session-{}.json",
        report.timestamp_utc.replace(':', "-").replace('T', "_")
    );
    let current_dir = std::env::current_dir().context("get current directory")?;
    Ok(current_dir.join(name))
}
