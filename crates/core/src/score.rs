use serde::{Deserialize, Serialize};

/// Running tally of check answers within one lesson segment.
///
/// Both counters only move through [`ScoreAccumulator::record`], so
/// `correct <= attempted` always holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreAccumulator {
    attempted: u32,
    correct: u32,
}

impl ScoreAccumulator {
    /// Records one answer and returns whether it was correct.
    pub fn record(&mut self, chosen: usize, correct_index: usize) -> bool {
        let is_correct = chosen == correct_index;
        self.attempted += 1;
        if is_correct {
            self.correct += 1;
        }
        is_correct
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn attempted(&self) -> u32 {
        self.attempted
    }

    pub fn correct(&self) -> u32 {
        self.correct
    }
}
