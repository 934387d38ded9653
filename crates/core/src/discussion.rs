use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Interval between countdown ticks.
pub const TICK: Duration = Duration::from_secs(1);

/// One-second countdown for a discussion step.
///
/// Every entry into the step starts from the full duration; a countdown is
/// never resumed. It stops by itself at zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscussionTimer {
    seconds_left: u32,
    running: bool,
}

impl DiscussionTimer {
    pub fn start(&mut self, duration_minutes: u32) {
        self.seconds_left = duration_minutes.saturating_mul(60);
        self.running = self.seconds_left > 0;
    }

    /// Advances one second. Returns whether another tick is needed.
    pub fn tick(&mut self) -> bool {
        if self.running {
            self.seconds_left = self.seconds_left.saturating_sub(1);
            self.running = self.seconds_left > 0;
        }
        self.running
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn seconds_left(&self) -> u32 {
        self.seconds_left
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Time is up; hosts switch the prompt to a wrap-up message.
    pub fn is_expired(&self) -> bool {
        !self.running && self.seconds_left == 0
    }
}
