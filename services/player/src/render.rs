//! Plain-text rendering of lesson playback and quizzes.
//!
//! [`LessonView`] turns successive engine states into an append-only
//! transcript: headers when a step starts, narration as it is revealed,
//! options once a question is fully shown.

use classroom_core::{
    Phase, StepSequencer,
    grading::QuizResult,
    quiz::{ShuffledQuestion, ShuffledQuiz},
    script::Step,
};
use std::io::{self, Write};

pub const LESSON_KEYS: &str =
    "Keys: Enter continue | b back | 1-9 answer | s skip | m mute | p pause | g N segment | q quit";
pub const QUIZ_KEYS: &str = "Keys: 1-9 answer | Enter next | b back | q quit";

#[derive(Debug, Default)]
pub struct LessonView {
    segment: Option<usize>,
    step: Option<usize>,
    phase: Option<Phase>,
    narration: String,
    printed: usize,
    line_open: bool,
    options_shown: bool,
    seconds_shown: Option<u32>,
    prompted: bool,
}

impl LessonView {
    /// Writes whatever changed since the previous call.
    pub fn update<W: Write>(
        &mut self,
        seq: &StepSequencer,
        segment_title: &str,
        out: &mut W,
    ) -> io::Result<()> {
        let state = seq.state();
        let segment = seq.segment_index();

        if self.segment != Some(segment) || self.step != Some(state.step_index) {
            self.close_line(out)?;
            if self.segment != Some(segment) {
                writeln!(out, "\n== Segment {}: {} ==", segment + 1, segment_title)?;
            }
            *self = Self {
                segment: Some(segment),
                step: Some(state.step_index),
                ..Self::default()
            };
            if let Some(step) = seq.current_step() {
                writeln!(
                    out,
                    "\n-- Step {}/{} ({}) --",
                    state.step_index + 1,
                    seq.script().len(),
                    step.kind()
                )?;
            }
        }

        if self.phase != Some(state.phase) {
            self.phase = Some(state.phase);
            self.prompted = false;
            self.enter_phase(seq, out)?;
        }

        self.reveal(seq, out)?;
        self.show_options(seq, out)?;
        self.show_countdown(seq, out)?;

        if seq.can_advance() && !self.prompted {
            self.close_line(out)?;
            writeln!(out, "   [Enter] continue")?;
            self.prompted = true;
        }
        out.flush()
    }

    fn enter_phase<W: Write>(&mut self, seq: &StepSequencer, out: &mut W) -> io::Result<()> {
        let state = seq.state();
        match (state.phase, seq.current_step()) {
            (
                Phase::ShowingVisual,
                Some(Step::Visual {
                    component_ref,
                    caption,
                    ..
                }),
            ) => {
                writeln!(out, "[{component_ref}]")?;
                if let Some(caption) = caption {
                    writeln!(out, "{caption}")?;
                }
            }
            (Phase::ShowingFeedback, Some(Step::Check { options, .. })) => {
                self.close_line(out)?;
                if let Some(chosen) = state.selected_option {
                    let verdict = if state.is_correct == Some(true) {
                        "correct"
                    } else {
                        "not quite"
                    };
                    let text = options.get(chosen).map(String::as_str).unwrap_or_default();
                    writeln!(out, "You chose {}) {}: {}", chosen + 1, text, verdict)?;
                }
            }
            (
                Phase::DiscussCountdown,
                Some(Step::DiscussTimer {
                    prompt,
                    guide_points,
                    ..
                }),
            ) => {
                writeln!(out, "{prompt}")?;
                for point in guide_points {
                    writeln!(out, "  - {point}")?;
                }
            }
            (Phase::StepDone, _) => {
                self.close_line(out)?;
                writeln!(out, "\nEnd of segment.")?;
            }
            _ => {}
        }
        Ok(())
    }

    fn reveal<W: Write>(&mut self, seq: &StepSequencer, out: &mut W) -> io::Result<()> {
        let narration = seq.narration();
        if narration.text() != self.narration {
            self.close_line(out)?;
            self.narration = narration.text().to_string();
            self.printed = 0;
        }
        let revealed = narration.revealed_chars();
        if revealed > self.printed {
            let fresh: String = narration
                .visible_text()
                .chars()
                .skip(self.printed)
                .collect();
            write!(out, "{fresh}")?;
            self.printed = revealed;
            self.line_open = true;
        }
        if narration.is_complete() && self.line_open {
            self.close_line(out)?;
        }
        Ok(())
    }

    fn show_options<W: Write>(&mut self, seq: &StepSequencer, out: &mut W) -> io::Result<()> {
        if self.options_shown
            || seq.state().phase != Phase::AskingCheck
            || !seq.narration().is_complete()
        {
            return Ok(());
        }
        if let Some(Step::Check { options, .. }) = seq.current_step() {
            for (idx, option) in options.iter().enumerate() {
                writeln!(out, "  {}) {}", idx + 1, option)?;
            }
            self.options_shown = true;
        }
        Ok(())
    }

    fn show_countdown<W: Write>(&mut self, seq: &StepSequencer, out: &mut W) -> io::Result<()> {
        let state = seq.state();
        if state.phase != Phase::DiscussCountdown {
            return Ok(());
        }
        let secs = state.discuss_seconds_left();
        if self.seconds_shown == Some(secs) || !(secs % 60 == 0 || secs <= 10) {
            return Ok(());
        }
        self.seconds_shown = Some(secs);
        if state.discussion.is_expired() {
            writeln!(out, "  Time is up. Wrap up your discussion.")
        } else {
            writeln!(out, "  {}:{:02} left", secs / 60, secs % 60)
        }
    }

    fn close_line<W: Write>(&mut self, out: &mut W) -> io::Result<()> {
        if self.line_open {
            writeln!(out)?;
            self.line_open = false;
        }
        Ok(())
    }
}

pub fn render_question<W: Write>(
    out: &mut W,
    quiz: &ShuffledQuiz,
    position: usize,
    chosen: Option<usize>,
) -> io::Result<()> {
    let Some(question) = quiz.question(position) else {
        return Ok(());
    };
    writeln!(out, "\nQuestion {}/{}", position + 1, quiz.len())?;
    if let Some(title) = &question.title {
        writeln!(out, "[{title}]")?;
    }
    writeln!(out, "{}", question.question)?;
    for (idx, option) in question.options.iter().enumerate() {
        let marker = if chosen == Some(idx) { '*' } else { ' ' };
        writeln!(out, " {marker}{}) {}", idx + 1, option.text)?;
    }
    out.flush()
}

pub fn render_result<W: Write>(
    out: &mut W,
    result: &QuizResult,
    quiz: &ShuffledQuiz,
    answers: &[Option<usize>],
) -> io::Result<()> {
    writeln!(out, "\nScore: {}/{}", result.score, result.total)?;
    for (position, question) in quiz.questions().iter().enumerate() {
        if answers.get(position).copied().flatten() == Some(question.correct_shuffled_index) {
            continue;
        }
        review_line(out, position, question)?;
    }
    if !result.wrong_topics.is_empty() {
        writeln!(out, "Review: {}", result.wrong_topics.join(", "))?;
    }
    out.flush()
}

fn review_line<W: Write>(out: &mut W, position: usize, question: &ShuffledQuestion) -> io::Result<()> {
    let answer = question
        .options
        .get(question.correct_shuffled_index)
        .map(|o| o.text.as_str())
        .unwrap_or_default();
    writeln!(
        out,
        "  Q{}: answer {}) {}",
        position + 1,
        question.correct_shuffled_index + 1,
        answer
    )?;
    if let Some(explanation) = &question.explanation {
        writeln!(out, "      {explanation}")?;
    }
    Ok(())
}
