//! Per-lesson progress record.
//!
//! The host persists a [`LessonProgress`] per week and hands its
//! `class_step_index` to the sequencer as the initial step. Content can change
//! between sessions, so a loaded record is reconciled against the current
//! lesson before use.

use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LessonMode {
    /// Guided playback of the teaching script.
    #[default]
    Class,
    /// Self-test quiz.
    SelfTest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonProgress {
    pub week_id: u32,
    pub current_segment: usize,
    pub max_reached_segment: usize,
    #[serde(default)]
    pub mode: LessonMode,
    /// Step of `current_segment` to resume at.
    #[serde(default)]
    pub class_step_index: usize,
}

impl LessonProgress {
    pub fn new(week_id: u32) -> Self {
        Self {
            week_id,
            current_segment: 0,
            max_reached_segment: 0,
            mode: LessonMode::Class,
            class_step_index: 0,
        }
    }

    /// Resets indices that no longer fit the lesson. `steps_per_segment[s]` is
    /// the number of steps of segment `s`. Returns whether anything changed.
    pub fn reconcile(&mut self, steps_per_segment: &[usize]) -> bool {
        let segments = steps_per_segment.len();
        let mut changed = false;

        if self.current_segment >= segments.max(1) {
            warn!(
                week = self.week_id,
                segment = self.current_segment,
                segments,
                "Saved segment no longer exists; restarting lesson"
            );
            self.current_segment = 0;
            self.class_step_index = 0;
            changed = true;
        }

        let last_segment = segments.saturating_sub(1);
        if self.max_reached_segment > last_segment {
            self.max_reached_segment = last_segment;
            changed = true;
        }
        if self.max_reached_segment < self.current_segment {
            self.max_reached_segment = self.current_segment;
            changed = true;
        }

        let steps = steps_per_segment
            .get(self.current_segment)
            .copied()
            .unwrap_or(0);
        if self.class_step_index > 0 && self.class_step_index >= steps {
            warn!(
                week = self.week_id,
                segment = self.current_segment,
                step = self.class_step_index,
                steps,
                "Saved step no longer exists; restarting segment"
            );
            self.class_step_index = 0;
            changed = true;
        }
        changed
    }

    /// Records the viewer's current step within the current segment.
    pub fn record_step(&mut self, step_index: usize) {
        self.class_step_index = step_index;
    }

    /// Moves to `segment`, starting it from its first step.
    pub fn enter_segment(&mut self, segment: usize) {
        if segment != self.current_segment {
            self.current_segment = segment;
            self.class_step_index = 0;
        }
        self.max_reached_segment = self.max_reached_segment.max(segment);
    }

    /// Moves to the next segment after one is completed. Returns `false` when
    /// `current_segment` was already the last of `segment_count`.
    pub fn advance_segment(&mut self, segment_count: usize) -> bool {
        let next = self.current_segment + 1;
        if next >= segment_count {
            return false;
        }
        self.enter_segment(next);
        true
    }
}
