//! Session runtime.
//!
//! Executes the [`Command`]s of a [`StepSequencer`] with real tokio timers and
//! an [`AudioOutput`], and feeds user input, timer firings and audio events
//! back into the engine from a single `tokio::select!` loop.

use crate::{
    content::Lesson,
    render::{self, LessonView},
    store::ProgressStore,
};
use anyhow::{Result, bail};
use chrono::Utc;
use classroom_core::{
    AudioEvent, ClipId, Command, StepSequencer, TimerTicket,
    audio::AudioCueResolver,
    grading::{QuizAttempt, QuizResult},
    progress::{LessonMode, LessonProgress},
    quiz::{Exercise, QuizError, SeededRng},
    sequencer::EngineTimings,
};
use std::collections::VecDeque;
use std::io::Write;
use std::time::Duration;
use tokio::{
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

/// One action typed by the viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserInput {
    Continue,
    Back,
    /// Zero-based option index.
    Select(usize),
    Skip,
    ToggleMute,
    TogglePause,
    /// Zero-based segment index.
    GoToSegment(usize),
    Retake,
    Quit,
}

/// Parses one line of terminal input. Numbers shown to the viewer are 1-based.
pub fn parse_input(line: &str) -> Option<UserInput> {
    let line = line.trim();
    let mut parts = line.split_whitespace();
    match parts.next() {
        None => Some(UserInput::Continue),
        Some("n") => Some(UserInput::Continue),
        Some("b") => Some(UserInput::Back),
        Some("s") => Some(UserInput::Skip),
        Some("m") => Some(UserInput::ToggleMute),
        Some("p") => Some(UserInput::TogglePause),
        Some("r") => Some(UserInput::Retake),
        Some("q") => Some(UserInput::Quit),
        Some("g") => parts
            .next()?
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .map(|n| UserInput::GoToSegment(n - 1)),
        Some(word) => word
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .map(|n| UserInput::Select(n - 1)),
    }
}

/// Plays narration clips for the runtime.
///
/// Implementations report progress for `clip` through `events`; a clip that
/// cannot be played must be reported as [`AudioEvent::Failed`].
pub trait AudioOutput: Send {
    fn play(&mut self, clip: ClipId, url: &str, events: &UnboundedSender<AudioEvent>);
    fn stop(&mut self);
    fn pause(&mut self);
    fn resume(&mut self);
}

/// Output for terminals without audio: every clip fails at once, so
/// narration falls back to its silent pace.
#[derive(Debug, Default)]
pub struct NullAudio;

impl AudioOutput for NullAudio {
    fn play(&mut self, clip: ClipId, url: &str, events: &UnboundedSender<AudioEvent>) {
        debug!(%clip, url, "No audio device; skipping clip");
        let _ = events.send(AudioEvent::Failed { clip });
    }

    fn stop(&mut self) {}

    fn pause(&mut self) {}

    fn resume(&mut self) {}
}

/// Pending engine timers, one task per ticket.
pub struct TimerSet {
    tx: UnboundedSender<TimerTicket>,
    pending: Vec<JoinHandle<()>>,
}

impl TimerSet {
    pub fn new(tx: UnboundedSender<TimerTicket>) -> Self {
        Self {
            tx,
            pending: Vec::new(),
        }
    }

    pub fn schedule(&mut self, ticket: TimerTicket, after: Duration) {
        self.pending.retain(|handle| !handle.is_finished());
        let tx = self.tx.clone();
        self.pending.push(tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = tx.send(ticket);
        }));
    }

    pub fn cancel_all(&mut self) {
        for handle in self.pending.drain(..) {
            handle.abort();
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.iter().filter(|h| !h.is_finished()).count()
    }
}

impl Drop for TimerSet {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

/// Why a lesson session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LessonOutcome {
    /// The last segment was completed.
    Finished,
    /// The viewer quit or input closed.
    Stopped,
}

/// Playback choices made when a session starts.
#[derive(Debug, Clone, Copy, Default)]
pub struct LessonOptions {
    pub timings: EngineTimings,
    pub muted: bool,
    /// Segment to start at instead of the saved one.
    pub segment: Option<usize>,
}

/// Plays one lesson in class mode.
pub struct LessonRuntime<W: Write> {
    lesson: Lesson,
    sequencer: StepSequencer,
    progress: LessonProgress,
    store: ProgressStore,
    audio: Box<dyn AudioOutput>,
    audio_tx: UnboundedSender<AudioEvent>,
    audio_rx: UnboundedReceiver<AudioEvent>,
    timers: TimerSet,
    timer_rx: UnboundedReceiver<TimerTicket>,
    view: LessonView,
    out: W,
    outcome: Option<LessonOutcome>,
}

impl<W: Write> LessonRuntime<W> {
    /// Prepares playback from the saved progress, or from `segment` when given.
    pub fn new(
        lesson: Lesson,
        store: ProgressStore,
        resolver: AudioCueResolver,
        audio: Box<dyn AudioOutput>,
        options: LessonOptions,
        out: W,
    ) -> Self {
        let mut progress = store.progress_or_new(lesson.week_id);
        progress.reconcile(&lesson.steps_per_segment());
        progress.mode = LessonMode::Class;
        if let Some(segment) = options.segment.filter(|s| *s < lesson.segment_count()) {
            progress.enter_segment(segment);
        }

        let sequencer = StepSequencer::new(
            lesson.script(progress.current_segment),
            progress.current_segment,
            resolver,
        )
        .with_initial_step(progress.class_step_index)
        .with_timings(options.timings)
        .with_completion(true)
        .with_muted(options.muted);

        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let (audio_tx, audio_rx) = mpsc::unbounded_channel();
        Self {
            lesson,
            sequencer,
            progress,
            store,
            audio,
            audio_tx,
            audio_rx,
            timers: TimerSet::new(timer_tx),
            timer_rx,
            view: LessonView::default(),
            out,
            outcome: None,
        }
    }

    pub fn progress(&self) -> &LessonProgress {
        &self.progress
    }

    pub fn store(&self) -> &ProgressStore {
        &self.store
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Runs until the lesson is finished or the viewer quits.
    pub async fn run(&mut self, mut input: UnboundedReceiver<UserInput>) -> Result<LessonOutcome> {
        info!(
            week = self.lesson.week_id,
            segment = self.progress.current_segment,
            step = self.progress.class_step_index,
            "Lesson session started"
        );
        writeln!(self.out, "{}\n{}", self.lesson.title, render::LESSON_KEYS)?;
        self.store.save_progress(self.progress.clone()).await?;

        let commands = self.sequencer.start();
        self.execute(commands).await?;
        self.render()?;

        while self.outcome.is_none() {
            let commands = tokio::select! {
                Some(ticket) = self.timer_rx.recv() => self.sequencer.on_timer(ticket),
                Some(event) = self.audio_rx.recv() => self.sequencer.on_audio(event),
                maybe_input = input.recv() => match maybe_input {
                    Some(action) => self.handle_input(action).await?,
                    None => {
                        self.outcome = Some(LessonOutcome::Stopped);
                        Vec::new()
                    }
                },
            };
            self.execute(commands).await?;
            self.render()?;
        }

        let commands = self.sequencer.teardown();
        self.execute(commands).await?;
        self.store.save_progress(self.progress.clone()).await?;

        let outcome = self.outcome.unwrap_or(LessonOutcome::Stopped);
        info!(week = self.lesson.week_id, ?outcome, "Lesson session ended");
        Ok(outcome)
    }

    async fn handle_input(&mut self, action: UserInput) -> Result<Vec<Command>> {
        debug!(?action, "User input");
        let seq = &mut self.sequencer;
        let commands = match action {
            UserInput::Continue => seq.advance(),
            UserInput::Back => seq.go_back(),
            UserInput::Select(option) => seq.select_option(option),
            UserInput::Skip => seq.skip_narration(),
            UserInput::ToggleMute => {
                let muted = !seq.state().muted;
                writeln!(self.out, "   ({})", if muted { "muted" } else { "sound on" })?;
                seq.set_muted(muted)
            }
            UserInput::TogglePause => {
                let paused = !seq.state().paused;
                writeln!(self.out, "   ({})", if paused { "paused" } else { "resumed" })?;
                seq.set_paused(paused)
            }
            UserInput::GoToSegment(segment) if segment < self.lesson.segment_count() => {
                self.progress.enter_segment(segment);
                self.store.save_progress(self.progress.clone()).await?;
                self.sequencer
                    .change_segment(segment, self.lesson.script(segment))
            }
            UserInput::GoToSegment(segment) => {
                writeln!(self.out, "   (no segment {})", segment + 1)?;
                Vec::new()
            }
            UserInput::Retake => Vec::new(),
            UserInput::Quit => {
                self.outcome = Some(LessonOutcome::Stopped);
                Vec::new()
            }
        };
        Ok(commands)
    }

    async fn execute(&mut self, commands: Vec<Command>) -> Result<()> {
        let mut queue: VecDeque<Command> = commands.into();
        while let Some(command) = queue.pop_front() {
            match command {
                Command::ScheduleTimer { ticket, after } => self.timers.schedule(ticket, after),
                Command::CancelTimers => self.timers.cancel_all(),
                Command::PlayClip { clip, key, url } => {
                    debug!(%clip, %key, "Playing narration");
                    self.audio.play(clip, &url, &self.audio_tx);
                }
                Command::StopAudio => self.audio.stop(),
                Command::PauseAudio => self.audio.pause(),
                Command::ResumeAudio => self.audio.resume(),
                Command::StepChanged(step) => {
                    self.progress.record_step(step);
                    self.store.save_progress(self.progress.clone()).await?;
                }
                Command::SegmentComplete => queue.extend(self.complete_segment().await?),
            }
        }
        Ok(())
    }

    async fn complete_segment(&mut self) -> Result<Vec<Command>> {
        if self.progress.advance_segment(self.lesson.segment_count()) {
            let next = self.progress.current_segment;
            self.store.save_progress(self.progress.clone()).await?;
            return Ok(self.sequencer.change_segment(next, self.lesson.script(next)));
        }
        info!(week = self.lesson.week_id, "Lesson complete");
        writeln!(self.out, "\nLesson complete.")?;
        self.progress.record_step(0);
        self.outcome = Some(LessonOutcome::Finished);
        Ok(Vec::new())
    }

    fn render(&mut self) -> Result<()> {
        let title = self
            .lesson
            .segment(self.sequencer.segment_index())
            .map(|s| s.title.as_str())
            .unwrap_or_default();
        self.view.update(&self.sequencer, title, &mut self.out)?;
        Ok(())
    }
}

/// Runs a self-test for `lesson`. Returns the last submitted result, if any.
pub async fn run_quiz<W: Write>(
    lesson: &Lesson,
    seed: u64,
    store: &mut ProgressStore,
    mut input: UnboundedReceiver<UserInput>,
    out: &mut W,
) -> Result<Option<QuizResult>> {
    let mut attempt = QuizAttempt::new(lesson.week_id, &lesson.exercises, seed)?;
    if attempt.quiz().is_empty() {
        writeln!(out, "Week {} has no self-test.", lesson.week_id)?;
        return Ok(None);
    }

    let mut progress = store.progress_or_new(lesson.week_id);
    progress.mode = LessonMode::SelfTest;
    store.save_progress(progress).await?;

    info!(week = lesson.week_id, seed, questions = attempt.quiz().len(), "Self-test started");
    writeln!(out, "{} (self-test)\n{}", lesson.title, render::QUIZ_KEYS)?;

    let mut position = 0;
    let mut last_result = None;
    render::render_question(out, attempt.quiz(), position, None)?;

    while let Some(action) = input.recv().await {
        let len = attempt.quiz().len();
        match action {
            UserInput::Quit => break,
            UserInput::Retake if last_result.is_some() => {
                attempt = retake_with_fresh_seed(&attempt, &lesson.exercises)?;
                info!(week = lesson.week_id, seed = attempt.quiz().seed(), "Self-test retake");
                position = 0;
                last_result = None;
            }
            _ if last_result.is_some() => {
                writeln!(out, "   (r to retake, q to quit)")?;
                continue;
            }
            UserInput::Select(option) => match attempt.answer(position, option) {
                Ok(()) if position + 1 < len => position += 1,
                Ok(()) => {}
                Err(e) => {
                    warn!(error = %e, "Rejected answer");
                    writeln!(out, "   ({e})")?;
                    continue;
                }
            },
            UserInput::Back => position = position.saturating_sub(1),
            UserInput::Continue if position + 1 < len => position += 1,
            UserInput::Continue => {
                let result = attempt.submit(Utc::now());
                store.record_result(result.clone()).await?;
                render::render_result(out, &result, attempt.quiz(), attempt.answers())?;
                writeln!(out, "   (r to retake, q to quit)")?;
                last_result = Some(result);
                continue;
            }
            _ => continue,
        }
        let chosen = attempt.answers().get(position).copied().flatten();
        render::render_question(out, attempt.quiz(), position, chosen)?;
        if attempt.is_complete() && position + 1 == len {
            writeln!(out, "   (all answered; Enter to submit)")?;
        }
    }
    Ok(last_result)
}

/// Redraws per retake before giving up on finding a new order.
const RETAKE_SEED_DRAWS: usize = 64;

/// A random seed that does not start the shuffle generator where `previous` does.
pub fn fresh_seed(previous: u64) -> u64 {
    loop {
        let seed: u64 = rand::random();
        if !SeededRng::same_stream(seed, previous) {
            return seed;
        }
    }
}

/// Retakes `attempt`, drawing seeds until the question or option order changes.
fn retake_with_fresh_seed(attempt: &QuizAttempt, exercises: &[Exercise]) -> Result<QuizAttempt> {
    let previous = attempt.quiz().seed();
    for _ in 0..RETAKE_SEED_DRAWS {
        let seed = fresh_seed(previous);
        match attempt.clone().retake(exercises, seed) {
            Ok(next) => return Ok(next),
            Err(QuizError::SameOrder(seed)) => debug!(seed, "Seed repeats the order; redrawing"),
            Err(e) => return Err(e.into()),
        }
    }
    bail!("No new question order found after {RETAKE_SEED_DRAWS} seeds")
}
