//! JSON file store for lesson progress and quiz results.
//!
//! The whole store is one small document rewritten on every change. Writes go
//! to a sibling temp file that is then renamed over the original, so a crash
//! never leaves a half-written store behind.

use anyhow::{Context, Result};
use classroom_core::{grading::QuizResult, progress::LessonProgress};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct StoreData {
    #[serde(default)]
    progress: BTreeMap<u32, LessonProgress>,
    #[serde(default)]
    results: Vec<QuizResult>,
}

pub struct ProgressStore {
    path: PathBuf,
    data: StoreData,
}

impl ProgressStore {
    /// Opens the store at `path`. A missing file is an empty store; an
    /// unreadable one is set aside and replaced by an empty store.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(data) => data,
                Err(e) => {
                    let backup = path.with_extension("json.corrupt");
                    warn!(path = %path.display(), error = %e, backup = %backup.display(), "Progress store is unreadable; starting fresh");
                    tokio::fs::rename(&path, &backup)
                        .await
                        .with_context(|| format!("Failed to set aside {}", path.display()))?;
                    StoreData::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreData::default(),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };
        Ok(Self { path, data })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn progress(&self, week_id: u32) -> Option<&LessonProgress> {
        self.data.progress.get(&week_id)
    }

    /// Saved progress for `week_id`, or a fresh record.
    pub fn progress_or_new(&self, week_id: u32) -> LessonProgress {
        self.progress(week_id)
            .cloned()
            .unwrap_or_else(|| LessonProgress::new(week_id))
    }

    pub async fn save_progress(&mut self, progress: LessonProgress) -> Result<()> {
        if self.data.progress.get(&progress.week_id) == Some(&progress) {
            return Ok(());
        }
        self.data.progress.insert(progress.week_id, progress);
        self.flush().await
    }

    /// Appends a result. Results are never rewritten.
    pub async fn record_result(&mut self, result: QuizResult) -> Result<()> {
        self.data.results.push(result);
        self.flush().await
    }

    pub fn results_for(&self, week_id: u32) -> impl Iterator<Item = &QuizResult> {
        self.data.results.iter().filter(move |r| r.week_id == week_id)
    }

    async fn flush(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let body = serde_json::to_vec_pretty(&self.data)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        debug!(path = %self.path.display(), "Progress store saved");
        Ok(())
    }
}
