//! Guided lesson playback and self-test quiz engine.
//!
//! The crate is split into small, synchronous components that never perform
//! I/O themselves:
//!
//! - `script`: the teaching script (ordered [`script::Step`] values).
//! - `audio`: manifest cache, narration key lookup and the single active clip.
//! - `narration`: typewriter reveal synchronized to narration audio.
//! - `discussion`: the one-second countdown of a discussion step.
//! - `score`: the per-segment comprehension tally.
//! - `sequencer`: the state machine that ties the above together.
//! - `quiz` / `grading`: seeded shuffling and grading of self-tests.
//! - `progress`: persisted lesson progress records.

pub mod audio;
pub mod discussion;
pub mod grading;
pub mod narration;
pub mod progress;
pub mod quiz;
pub mod score;
pub mod script;
pub mod sequencer;

use std::time::Duration;

pub use audio::{AudioEvent, ClipId};
pub use sequencer::{Phase, PlaybackState, StepSequencer, TimerKind, TimerTicket};

/// Represents commands that the playback engine issues to an external runtime.
///
/// This enum is the primary API for decoupling the engine's decision-making
/// from the runtime's execution of side effects (waiting on timers, playing
/// narration audio, persisting progress).
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Fire `ticket` back into the engine once `after` has elapsed.
    ScheduleTimer { ticket: TimerTicket, after: Duration },
    /// Drop every pending timer. Tickets that still arrive are ignored.
    CancelTimers,
    /// Stop whatever is playing and start the given clip.
    PlayClip {
        clip: ClipId,
        key: String,
        url: String,
    },
    /// Stop and discard the active clip.
    StopAudio,
    PauseAudio,
    ResumeAudio,
    /// A forward or backward step transition was committed.
    StepChanged(usize),
    /// The final step of the segment was acknowledged.
    SegmentComplete,
}
