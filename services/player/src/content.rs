//! Lesson content files.
//!
//! Each week is one JSON document, `{content_dir}/week{N}.json`, holding the
//! teaching scripts of its segments and the self-test exercises.

use anyhow::{Context, Result, ensure};
use classroom_core::{quiz::Exercise, script::TeachingScript};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub title: String,
    pub steps: TeachingScript,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    pub week_id: u32,
    pub title: String,
    pub segments: Vec<Segment>,
    #[serde(default)]
    pub exercises: Vec<Exercise>,
}

impl Lesson {
    pub fn segment(&self, index: usize) -> Option<&Segment> {
        self.segments.get(index)
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Step count of every segment, in order.
    pub fn steps_per_segment(&self) -> Vec<usize> {
        self.segments.iter().map(|s| s.steps.len()).collect()
    }

    /// The script of `index`, or an empty one if the segment does not exist.
    pub fn script(&self, index: usize) -> TeachingScript {
        self.segment(index)
            .map(|s| s.steps.clone())
            .unwrap_or_default()
    }
}

pub fn lesson_path(content_dir: &Path, week_id: u32) -> PathBuf {
    content_dir.join(format!("week{week_id}.json"))
}

/// Reads and validates the lesson of `week_id`.
pub async fn load_lesson(content_dir: &Path, week_id: u32) -> Result<Lesson> {
    let path = lesson_path(content_dir, week_id);
    let raw = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read lesson file {}", path.display()))?;
    let lesson: Lesson = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid lesson file {}", path.display()))?;
    ensure!(
        lesson.week_id == week_id,
        "{} declares week {} instead of week {}",
        path.display(),
        lesson.week_id,
        week_id
    );
    debug!(
        week = week_id,
        segments = lesson.segment_count(),
        exercises = lesson.exercises.len(),
        "Lesson loaded"
    );
    Ok(lesson)
}
