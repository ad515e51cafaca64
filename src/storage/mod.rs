//! Persistence layer.
//!
//! Reads the round's score log from a JSON file and saves the derived
//! report next to it. The log is the source of truth; the report file is
//! only a cache of the last evaluation and can be deleted at any time.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::engine::RoundReport;
use crate::feed::{ScoreFeed, ScoreSource};
use crate::types::ScoreEvent;

/// Default report file path.
const DEFAULT_REPORT_FILE: &str = "fairway_report.json";

// ---------------------------------------------------------------------------
// Score log
// ---------------------------------------------------------------------------

/// On-disk shape of a score log: events in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedFile {
    pub round_id: String,
    #[serde(default)]
    pub events: Vec<ScoreEvent>,
}

impl FeedFile {
    pub fn into_feed(self) -> ScoreFeed {
        ScoreFeed::from_events(&self.round_id, self.events)
    }
}

impl From<&ScoreFeed> for FeedFile {
    fn from(feed: &ScoreFeed) -> Self {
        Self {
            round_id: feed.round_id().to_string(),
            events: feed.events().cloned().collect(),
        }
    }
}

/// Score source backed by a JSON file that the entry app appends to.
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ScoreSource for JsonFileSource {
    async fn fetch_feed(&self) -> Result<ScoreFeed> {
        let json = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read score log {}", self.path.display()))?;
        let file: FeedFile = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse score log {}", self.path.display()))?;

        debug!(path = %self.path.display(), events = file.events.len(), "Score log loaded");
        Ok(file.into_feed())
    }

    fn name(&self) -> &str {
        "json-file"
    }
}

/// Write a feed back out as a score log.
pub fn save_feed(feed: &ScoreFeed, path: &str) -> Result<()> {
    let json = serde_json::to_string_pretty(&FeedFile::from(feed))
        .context("Failed to serialise score log")?;
    std::fs::write(path, &json).context(format!("Failed to write score log to {path}"))?;
    debug!(path, events = feed.len(), "Score log saved");
    Ok(())
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Save the round report to a JSON file.
pub fn save_report(report: &RoundReport, path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_REPORT_FILE);
    let json = serde_json::to_string_pretty(report)
        .context("Failed to serialise round report")?;

    std::fs::write(path, &json)
        .context(format!("Failed to write report to {path}"))?;

    debug!(path, status = %report.status, "Report saved");
    Ok(())
}

/// Load a previously saved report.
/// Returns None if the file doesn't exist.
pub fn load_report(path: Option<&str>) -> Result<Option<RoundReport>> {
    let path = path.unwrap_or(DEFAULT_REPORT_FILE);

    if !Path::new(path).exists() {
        info!(path, "No saved report found");
        return Ok(None);
    }

    let json = std::fs::read_to_string(path)
        .context(format!("Failed to read report from {path}"))?;

    let report: RoundReport = serde_json::from_str(&json)
        .context(format!("Failed to parse report from {path}"))?;

    info!(
        path,
        round = %report.round_id,
        status = %report.status,
        thru = report.holes_complete,
        "Report loaded from disk"
    );

    Ok(Some(report))
}

/// Delete the report file.
pub fn delete_report(path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_REPORT_FILE);
    if Path::new(path).exists() {
        std::fs::remove_file(path)
            .context(format!("Failed to delete report file {path}"))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
