//! Persisted record of a research run.

use super::engine::{CallStats, RunSummary};
use crate::types::ResearchRequest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// How a run ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// A research run as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: Uuid,
    pub topic: String,
    pub breadth: usize,
    pub depth: usize,
    pub model: String,
    pub status: RunStatus,
    #[serde(default)]
    pub learnings: Vec<String>,
    #[serde(default)]
    pub visited_urls: Vec<String>,
    #[serde(default)]
    pub report: Option<String>,
    #[serde(default)]
    pub stats: CallStats,
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunRecord {
    /// Start a record for `request`.
    pub fn start(request: &ResearchRequest, model: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic: request.topic.clone(),
            breadth: request.breadth,
            depth: request.depth,
            model: model.into(),
            status: RunStatus::Running,
            learnings: Vec::new(),
            visited_urls: Vec::new(),
            report: None,
            stats: CallStats::default(),
            error: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn complete(&mut self, summary: &RunSummary) {
        self.learnings = summary.outcome.learnings.clone();
        self.visited_urls = summary.outcome.visited_urls.clone();
        self.report = Some(summary.report.clone());
        self.stats = summary.stats;
        self.finish(RunStatus::Completed);
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
        self.finish(RunStatus::Failed);
    }

    pub fn cancel(&mut self) {
        self.finish(RunStatus::Cancelled);
    }

    fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }

    fn dir(base_dir: &Path) -> PathBuf {
        base_dir.join("runs")
    }

    /// Persist to `<base_dir>/runs/<id>.json`.
    pub fn save(&self, base_dir: &Path) -> Result<PathBuf, std::io::Error> {
        let dir = Self::dir(base_dir);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.json", self.id));
        let data = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        atomic_write(&path, data.as_bytes())?;
        Ok(path)
    }

    pub fn load(base_dir: &Path, id: &Uuid) -> Result<Self, std::io::Error> {
        let path = Self::dir(base_dir).join(format!("{id}.json"));
        let data = std::fs::read_to_string(&path)?;
        serde_json::from_str(&data)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// All saved runs, newest first. Unreadable files are skipped.
    pub fn list(base_dir: &Path) -> Vec<RunSummaryLine> {
        let Ok(entries) = std::fs::read_dir(Self::dir(base_dir)) else {
            return Vec::new();
        };

        let mut runs: Vec<RunSummaryLine> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|e| e == "json"))
            .filter_map(|path| std::fs::read_to_string(path).ok())
            .filter_map(|data| serde_json::from_str::<RunRecord>(&data).ok())
            .map(|run| RunSummaryLine {
                id: run.id,
                topic: run.topic,
                status: run.status,
                learnings: run.learnings.len(),
                sources: run.visited_urls.len(),
                created_at: run.created_at,
            })
            .collect();

        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        runs
    }
}

/// One line of `runs list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummaryLine {
    pub id: Uuid,
    pub topic: String,
    pub status: RunStatus,
    pub learnings: usize,
    pub sources: usize,
    pub created_at: DateTime<Utc>,
}

/// Write via a sibling temp file and rename, so readers never see a partial file.
fn atomic_write(path: &Path, data: &[u8]) -> Result<(), std::io::Error> {
    let tmp = path.with_extension("json.tmp");
    {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)
}
