//! Typewriter reveal synchronized to narration audio.
//!
//! The reveal interval is derived from the clip duration so the text finishes
//! shortly before the voice does. Without a duration the reveal runs at a
//! provisional pace; muted playback runs fast.

use std::time::Duration;

pub const MUTED_INTERVAL: Duration = Duration::from_millis(35);
pub const PROVISIONAL_INTERVAL: Duration = Duration::from_millis(150);
pub const MIN_INTERVAL_MS: f64 = 25.0;
pub const MAX_INTERVAL_MS: f64 = 250.0;
/// Share of the clip over which the text is revealed.
pub const AUDIO_LEAD_FACTOR: f64 = 0.92;

/// Per-character reveal interval for a text of `text_len` characters.
pub fn reveal_interval(muted: bool, clip_duration: Option<Duration>, text_len: usize) -> Duration {
    if muted {
        return MUTED_INTERVAL;
    }
    match clip_duration {
        Some(duration) if text_len > 0 => {
            let ms = duration.as_secs_f64() * 1000.0 * AUDIO_LEAD_FACTOR / text_len as f64;
            Duration::from_millis(ms.clamp(MIN_INTERVAL_MS, MAX_INTERVAL_MS).round() as u64)
        }
        _ => PROVISIONAL_INTERVAL,
    }
}

/// Outcome of [`NarrationSync::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealChange {
    /// New text; reveal restarted at the first character.
    Restarted,
    /// Same text at a new speed; progress kept.
    Retimed,
    Unchanged,
}

/// Progressive reveal state of the active narration text.
#[derive(Debug, Clone, Default)]
pub struct NarrationSync {
    text: String,
    total: usize,
    revealed: usize,
    interval: Duration,
}

impl NarrationSync {
    /// Begins revealing `text` from its first character.
    pub fn start(&mut self, text: &str, interval: Duration) {
        self.text = text.to_string();
        self.total = text.chars().count();
        self.revealed = 0;
        self.interval = interval;
    }

    /// Re-targets the reveal. Text changes restart; speed changes keep progress.
    pub fn update(&mut self, text: &str, interval: Duration) -> RevealChange {
        if text != self.text {
            self.start(text, interval);
            RevealChange::Restarted
        } else if self.set_interval(interval) {
            RevealChange::Retimed
        } else {
            RevealChange::Unchanged
        }
    }

    fn set_interval(&mut self, interval: Duration) -> bool {
        let changed = self.interval != interval;
        self.interval = interval;
        changed
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Reveals the next character. Returns `true` once the whole text is shown.
    pub fn tick(&mut self) -> bool {
        if self.revealed < self.total {
            self.revealed += 1;
        }
        self.is_complete()
    }

    pub fn skip(&mut self) {
        self.revealed = self.total;
    }

    pub fn is_complete(&self) -> bool {
        self.revealed >= self.total
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn revealed_chars(&self) -> usize {
        self.revealed
    }

    pub fn total_chars(&self) -> usize {
        self.total
    }

    /// The part of the text revealed so far.
    pub fn visible_text(&self) -> &str {
        let end = self
            .text
            .char_indices()
            .nth(self.revealed)
            .map(|(idx, _)| idx)
            .unwrap_or(self.text.len());
        &self.text[..end]
    }
}
