//! Step Sequencer
//!
//! The state machine that walks a lesson segment through its teaching steps.
//! It owns the only mutable playback state and reacts to three kinds of input:
//! user actions (continue, back, select, skip, mute, pause), timer firings it
//! scheduled itself, and audio player events. Every input returns the list of
//! [`Command`]s the host runtime must execute.
//!
//! Each step kind follows its own sub-path:
//!
//! | Step            | Forward path                                          |
//! |-----------------|-------------------------------------------------------|
//! | lecture         | `entering -> playing_lecture -> lecture_done`         |
//! | visual          | `entering -> showing_visual`                          |
//! | check           | `entering -> asking_check -> showing_feedback`        |
//! | discuss_timer   | `entering -> discuss_countdown`                       |
//!
//! Going back lands directly on the step's fully revealed terminal phase and
//! never replays narration. Advancing past the last step reaches `step_done`.

use crate::{
    Command,
    audio::{AudioCueResolver, AudioEvent, ClipSlot, NarrationCue},
    discussion::{self, DiscussionTimer},
    narration::{NarrationSync, RevealChange, reveal_interval},
    score::ScoreAccumulator,
    script::{Step, TeachingScript},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Sub-state of the active step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Entering,
    PlayingLecture,
    LectureDone,
    ShowingVisual,
    AskingCheck,
    ShowingFeedback,
    DiscussCountdown,
    StepDone,
}

impl Phase {
    fn is_narrated(self) -> bool {
        matches!(
            self,
            Phase::PlayingLecture | Phase::LectureDone | Phase::AskingCheck | Phase::ShowingFeedback
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// End of the entry animation of a step.
    Entry,
    /// Next character of the typewriter reveal.
    Typewriter,
    /// Next second of a discussion countdown.
    Countdown,
}

/// A timer the engine asked the host to fire.
///
/// Tickets from before the latest transition carry an old epoch and are
/// ignored when they come back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerTicket {
    pub kind: TimerKind,
    epoch: u64,
}

/// Entry delays of the step transition animation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineTimings {
    pub entry_delay: Duration,
    /// Used for step 0 of a segment so the segment title stays visible.
    pub first_entry_delay: Duration,
}

impl Default for EngineTimings {
    fn default() -> Self {
        Self {
            entry_delay: Duration::from_millis(400),
            first_entry_delay: Duration::from_millis(1200),
        }
    }
}

/// The engine's mutable state. Hosts only ever see it by shared reference.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackState {
    pub step_index: usize,
    pub phase: Phase,
    /// Only set while the current check step has been answered.
    pub selected_option: Option<usize>,
    pub is_correct: Option<bool>,
    pub muted: bool,
    pub paused: bool,
    pub score: ScoreAccumulator,
    pub discussion: DiscussionTimer,
}

impl PlaybackState {
    fn new(step_index: usize) -> Self {
        Self {
            step_index,
            phase: Phase::Entering,
            selected_option: None,
            is_correct: None,
            muted: false,
            paused: false,
            score: ScoreAccumulator::default(),
            discussion: DiscussionTimer::default(),
        }
    }

    pub fn attempted_count(&self) -> u32 {
        self.score.attempted()
    }

    pub fn correct_count(&self) -> u32 {
        self.score.correct()
    }

    pub fn discuss_seconds_left(&self) -> u32 {
        self.discussion.seconds_left()
    }
}

/// Drives one lesson segment for one viewer.
#[derive(Debug)]
pub struct StepSequencer {
    segment_index: usize,
    script: TeachingScript,
    resolver: AudioCueResolver,
    timings: EngineTimings,
    completion_enabled: bool,
    state: PlaybackState,
    narration: NarrationSync,
    clip: ClipSlot,
    epoch: u64,
    completion_sent: bool,
    started: bool,
    closed: bool,
}

impl StepSequencer {
    /// Creates a sequencer positioned on step 0 of `segment_index`.
    pub fn new(script: TeachingScript, segment_index: usize, resolver: AudioCueResolver) -> Self {
        Self {
            segment_index,
            script,
            resolver,
            timings: EngineTimings::default(),
            completion_enabled: false,
            state: PlaybackState::new(0),
            narration: NarrationSync::default(),
            clip: ClipSlot::default(),
            epoch: 0,
            completion_sent: false,
            started: false,
            closed: false,
        }
    }

    /// Resumes at `step_index`. An index beyond the script (content was
    /// shortened since progress was saved) falls back to the first step.
    pub fn with_initial_step(mut self, step_index: usize) -> Self {
        if step_index < self.script.len() {
            self.state.step_index = step_index;
        } else if step_index > 0 {
            warn!(
                step_index,
                steps = self.script.len(),
                "Saved step is past the end of the script; starting over"
            );
        }
        self
    }

    pub fn with_timings(mut self, timings: EngineTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Whether acknowledging the final step emits [`Command::SegmentComplete`].
    pub fn with_completion(mut self, enabled: bool) -> Self {
        self.completion_enabled = enabled;
        self
    }

    pub fn with_muted(mut self, muted: bool) -> Self {
        self.state.muted = muted;
        self
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn segment_index(&self) -> usize {
        self.segment_index
    }

    pub fn script(&self) -> &TeachingScript {
        &self.script
    }

    pub fn current_step(&self) -> Option<&Step> {
        self.script.get(self.state.step_index)
    }

    /// The narration text of the current phase and how much of it is shown.
    pub fn narration(&self) -> &NarrationSync {
        &self.narration
    }

    /// True while a narration clip is playing.
    pub fn is_narrating(&self) -> bool {
        self.clip.is_playing()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether "continue" is currently accepted.
    pub fn can_advance(&self) -> bool {
        if self.closed || !self.started {
            return false;
        }
        match self.state.phase {
            Phase::LectureDone => !self.clip.is_playing(),
            Phase::ShowingFeedback => self.narration.is_complete() && !self.clip.is_playing(),
            Phase::ShowingVisual | Phase::DiscussCountdown | Phase::StepDone => true,
            Phase::Entering | Phase::PlayingLecture | Phase::AskingCheck => false,
        }
    }

    pub fn can_go_back(&self) -> bool {
        !self.closed && self.started && self.state.step_index > 0
    }

    // --- Host inputs ---

    /// Enters the initial step with the full forward entry sequence.
    pub fn start(&mut self) -> Vec<Command> {
        let mut out = Vec::new();
        if self.started || self.closed {
            return out;
        }
        self.started = true;
        info!(
            segment = self.segment_index,
            step = self.state.step_index,
            steps = self.script.len(),
            "Starting segment playback"
        );
        if self.script.is_empty() {
            self.state.phase = Phase::StepDone;
        } else {
            self.enter_forward(self.state.step_index, &mut out);
        }
        out
    }

    /// The "continue" action.
    pub fn advance(&mut self) -> Vec<Command> {
        let mut out = Vec::new();
        if !self.can_advance() {
            debug!(phase = ?self.state.phase, "Continue ignored; step is gated");
            return out;
        }

        if self.state.phase == Phase::StepDone {
            if self.completion_enabled && !self.completion_sent {
                self.completion_sent = true;
                info!(segment = self.segment_index, "Segment complete");
                out.push(Command::SegmentComplete);
            }
            return out;
        }

        let next = self.state.step_index + 1;
        if next < self.script.len() {
            self.enter_forward(next, &mut out);
            out.push(Command::StepChanged(next));
        } else {
            self.leave_step(&mut out);
            self.state.phase = Phase::StepDone;
            debug!(step = self.state.step_index, "Reached end of segment");
        }
        out
    }

    /// The "go back" action. Lands on the fully revealed terminal phase.
    pub fn go_back(&mut self) -> Vec<Command> {
        let mut out = Vec::new();
        if !self.can_go_back() {
            return out;
        }
        self.leave_step(&mut out);
        let previous = self.state.step_index - 1;
        self.reset_step_state(previous);
        self.enter_revealed(previous, &mut out);
        out.push(Command::StepChanged(previous));
        out
    }

    /// Answers the current check question.
    pub fn select_option(&mut self, option: usize) -> Vec<Command> {
        let mut out = Vec::new();
        if self.closed
            || self.state.phase != Phase::AskingCheck
            || self.state.selected_option.is_some()
        {
            return out;
        }
        let index = self.state.step_index;
        let Some(Step::Check {
            options,
            correct_index,
            on_correct,
            on_wrong,
            ..
        }) = self.script.get(index).cloned()
        else {
            return out;
        };
        if option >= options.len() {
            debug!(option, options = options.len(), "Ignoring out-of-range option");
            return out;
        }

        self.cancel_timers(&mut out);
        self.stop_audio(&mut out);

        let is_correct = self.state.score.record(option, correct_index);
        self.state.selected_option = Some(option);
        self.state.is_correct = Some(is_correct);
        self.state.phase = Phase::ShowingFeedback;
        info!(
            step = index,
            option,
            is_correct,
            attempted = self.state.score.attempted(),
            correct = self.state.score.correct(),
            "Check answered"
        );

        let ordinal = self.script.check_ordinal(index).unwrap_or_default();
        let cue = NarrationCue::Feedback {
            segment: self.segment_index,
            ordinal,
            correct: is_correct,
        };
        let feedback = if is_correct { on_correct } else { on_wrong };
        self.begin_narration(&feedback, cue, &mut out);
        out
    }

    /// Reveals the current narration at once and stops its clip.
    pub fn skip_narration(&mut self) -> Vec<Command> {
        let mut out = Vec::new();
        if self.closed || !self.state.phase.is_narrated() {
            return out;
        }
        if self.narration.is_complete() && !self.clip.is_playing() {
            return out;
        }
        self.cancel_timers(&mut out);
        self.stop_audio(&mut out);
        self.narration.skip();
        self.on_reveal_complete();
        out
    }

    pub fn set_muted(&mut self, muted: bool) -> Vec<Command> {
        let mut out = Vec::new();
        if self.closed || self.state.muted == muted {
            return out;
        }
        self.state.muted = muted;
        if muted {
            self.stop_audio(&mut out);
        }
        self.retime(&mut out);
        out
    }

    pub fn set_paused(&mut self, paused: bool) -> Vec<Command> {
        let mut out = Vec::new();
        if self.closed || self.state.paused == paused {
            return out;
        }
        self.state.paused = paused;
        if paused {
            self.cancel_timers(&mut out);
            if self.clip.is_playing() {
                out.push(Command::PauseAudio);
            }
        } else {
            if self.clip.is_playing() {
                out.push(Command::ResumeAudio);
            }
            self.resume_timers(&mut out);
        }
        out
    }

    /// Switches to another segment. A different segment starts at step 0 with
    /// a fresh score; the same segment is a no-op.
    pub fn change_segment(&mut self, segment_index: usize, script: TeachingScript) -> Vec<Command> {
        let mut out = Vec::new();
        if self.closed || segment_index == self.segment_index {
            return out;
        }
        self.leave_step(&mut out);
        info!(
            from = self.segment_index,
            to = segment_index,
            "Changing segment; score reset"
        );
        self.segment_index = segment_index;
        self.script = script;
        self.state.score.reset();
        self.reset_step_state(0);
        self.started = true;
        if self.script.is_empty() {
            self.state.phase = Phase::StepDone;
        } else {
            self.enter_forward(0, &mut out);
        }
        out.push(Command::StepChanged(0));
        out
    }

    /// Ends the session: cancels every timer and stops audio. Later inputs are ignored.
    pub fn teardown(&mut self) -> Vec<Command> {
        let mut out = Vec::new();
        if self.closed {
            return out;
        }
        self.leave_step(&mut out);
        self.closed = true;
        debug!(segment = self.segment_index, "Sequencer torn down");
        out
    }

    /// A previously scheduled timer fired.
    pub fn on_timer(&mut self, ticket: TimerTicket) -> Vec<Command> {
        let mut out = Vec::new();
        if self.closed || self.state.paused || ticket.epoch != self.epoch {
            debug!(?ticket, current_epoch = self.epoch, "Ignoring stale timer");
            return out;
        }
        match (ticket.kind, self.state.phase) {
            (TimerKind::Entry, Phase::Entering) => self.enter_active_phase(&mut out),
            (
                TimerKind::Typewriter,
                Phase::PlayingLecture | Phase::AskingCheck | Phase::ShowingFeedback,
            ) if !self.narration.is_complete() => {
                if self.narration.tick() {
                    self.on_reveal_complete();
                } else {
                    self.schedule(TimerKind::Typewriter, self.narration.interval(), &mut out);
                }
            }
            (TimerKind::Countdown, Phase::DiscussCountdown) => {
                if self.state.discussion.tick() {
                    self.schedule(TimerKind::Countdown, discussion::TICK, &mut out);
                } else {
                    debug!(step = self.state.step_index, "Discussion time is up");
                }
            }
            (kind, phase) => debug!(?kind, ?phase, "Timer does not apply to current phase"),
        }
        out
    }

    /// An event from the host's audio player.
    pub fn on_audio(&mut self, event: AudioEvent) -> Vec<Command> {
        let mut out = Vec::new();
        if self.closed {
            return out;
        }
        if !self.clip.apply(event) {
            debug!(?event, "Ignoring event for a discarded clip");
            return out;
        }
        match event {
            AudioEvent::Loaded { duration, .. } => {
                debug!(?duration, "Narration clip duration known");
                self.retime(&mut out);
            }
            AudioEvent::Ended { .. } => debug!("Narration clip finished"),
            AudioEvent::Failed { clip } => {
                debug!(%clip, "Narration clip failed; continuing silently");
                self.retime(&mut out);
            }
        }
        out
    }

    // --- Transitions ---

    /// Exit step of every transition: nothing scheduled or playing survives it.
    fn leave_step(&mut self, out: &mut Vec<Command>) {
        self.cancel_timers(out);
        self.stop_audio(out);
        self.narration.clear();
        self.state.discussion.stop();
    }

    fn reset_step_state(&mut self, index: usize) {
        self.state.step_index = index;
        self.state.selected_option = None;
        self.state.is_correct = None;
        self.completion_sent = false;
    }

    fn enter_forward(&mut self, index: usize, out: &mut Vec<Command>) {
        self.leave_step(out);
        self.reset_step_state(index);
        self.state.phase = Phase::Entering;
        debug!(step = index, "Entering step");
        if !self.state.paused {
            self.schedule(TimerKind::Entry, self.entry_delay(index), out);
        }
    }

    fn entry_delay(&self, index: usize) -> Duration {
        if index == 0 {
            self.timings.first_entry_delay
        } else {
            self.timings.entry_delay
        }
    }

    fn enter_active_phase(&mut self, out: &mut Vec<Command>) {
        let index = self.state.step_index;
        let Some(step) = self.script.get(index).cloned() else {
            return;
        };
        match step {
            Step::Lecture { text, .. } => {
                self.state.phase = Phase::PlayingLecture;
                let cue = NarrationCue::Lecture {
                    segment: self.segment_index,
                    step: index,
                };
                self.begin_narration(&text, cue, out);
            }
            Step::Visual { .. } => self.state.phase = Phase::ShowingVisual,
            Step::Check { question, .. } => {
                self.state.phase = Phase::AskingCheck;
                let cue = NarrationCue::Question {
                    segment: self.segment_index,
                    ordinal: self.script.check_ordinal(index).unwrap_or_default(),
                };
                self.begin_narration(&question, cue, out);
            }
            Step::DiscussTimer {
                duration_minutes, ..
            } => {
                self.state.phase = Phase::DiscussCountdown;
                self.start_countdown(duration_minutes, out);
            }
        }
        debug!(step = index, phase = ?self.state.phase, "Step active");
    }

    /// Places `index` in its terminal phase with everything already shown.
    fn enter_revealed(&mut self, index: usize, out: &mut Vec<Command>) {
        let Some(step) = self.script.get(index).cloned() else {
            return;
        };
        let interval = reveal_interval(self.state.muted, None, 0);
        match step {
            Step::Lecture { text, .. } => {
                self.narration.start(&text, interval);
                self.narration.skip();
                self.state.phase = Phase::LectureDone;
            }
            Step::Visual { .. } => self.state.phase = Phase::ShowingVisual,
            Step::Check { question, .. } => {
                self.narration.start(&question, interval);
                self.narration.skip();
                self.state.phase = Phase::AskingCheck;
            }
            Step::DiscussTimer {
                duration_minutes, ..
            } => {
                self.state.phase = Phase::DiscussCountdown;
                self.start_countdown(duration_minutes, out);
            }
        }
        debug!(step = index, phase = ?self.state.phase, "Returned to step");
    }

    /// Requests the clip for `cue` and starts the reveal of `text`.
    fn begin_narration(&mut self, text: &str, cue: NarrationCue, out: &mut Vec<Command>) {
        self.stop_audio(out);
        if !self.state.muted {
            let key = cue.to_string();
            match self.resolver.resolve(&key) {
                Some(url) => {
                    let clip = self.clip.start();
                    out.push(Command::PlayClip { clip, key, url });
                    // Held until resume, together with the reveal.
                    if self.state.paused {
                        out.push(Command::PauseAudio);
                    }
                }
                None => debug!(%key, "No narration clip; revealing silently"),
            }
        }
        let interval = reveal_interval(
            self.state.muted,
            self.clip.duration(),
            text.chars().count(),
        );
        self.narration.start(text, interval);
        if self.narration.is_complete() {
            self.on_reveal_complete();
        } else if !self.state.paused {
            self.schedule(TimerKind::Typewriter, interval, out);
        }
    }

    fn on_reveal_complete(&mut self) {
        if self.state.phase == Phase::PlayingLecture {
            self.state.phase = Phase::LectureDone;
            debug!(step = self.state.step_index, "Lecture text fully revealed");
        }
    }

    fn start_countdown(&mut self, duration_minutes: u32, out: &mut Vec<Command>) {
        self.state.discussion.start(duration_minutes);
        if self.state.discussion.is_running() && !self.state.paused {
            self.schedule(TimerKind::Countdown, discussion::TICK, out);
        }
    }

    /// Recomputes the reveal speed; progress is kept when only the speed changes.
    fn retime(&mut self, out: &mut Vec<Command>) {
        if !self.state.phase.is_narrated() || self.narration.is_complete() {
            return;
        }
        let interval = reveal_interval(
            self.state.muted,
            self.clip.duration(),
            self.narration.total_chars(),
        );
        let text = self.narration.text().to_string();
        if self.narration.update(&text, interval) == RevealChange::Retimed {
            self.cancel_timers(out);
            if !self.state.paused {
                self.schedule(TimerKind::Typewriter, interval, out);
            }
        }
    }

    fn resume_timers(&mut self, out: &mut Vec<Command>) {
        match self.state.phase {
            Phase::Entering => {
                self.schedule(TimerKind::Entry, self.entry_delay(self.state.step_index), out)
            }
            Phase::PlayingLecture | Phase::AskingCheck | Phase::ShowingFeedback
                if !self.narration.is_complete() =>
            {
                self.schedule(TimerKind::Typewriter, self.narration.interval(), out)
            }
            Phase::DiscussCountdown if self.state.discussion.is_running() => {
                self.schedule(TimerKind::Countdown, discussion::TICK, out)
            }
            _ => {}
        }
    }

    fn schedule(&self, kind: TimerKind, after: Duration, out: &mut Vec<Command>) {
        let ticket = TimerTicket {
            kind,
            epoch: self.epoch,
        };
        out.push(Command::ScheduleTimer { ticket, after });
    }

    fn cancel_timers(&mut self, out: &mut Vec<Command>) {
        self.epoch += 1;
        out.push(Command::CancelTimers);
    }

    fn stop_audio(&mut self, out: &mut Vec<Command>) {
        if self.clip.stop() {
            out.push(Command::StopAudio);
        }
    }
}
