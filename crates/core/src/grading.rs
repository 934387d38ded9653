//! Grading of self-test attempts.
//!
//! Answers are given as positions in the shuffled quiz. Grading compares them
//! with each question's `correct_shuffled_index`; the persisted
//! [`QuizResult`] maps every choice back to the authored option index, in
//! authored question order, so stored results stay meaningful regardless of
//! the permutation the viewer saw.

use crate::quiz::{Exercise, QuizError, SeededRng, ShuffledQuestion, ShuffledQuiz, shuffle_quiz};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Maximum length of a question excerpt used as a wrong-topic label.
pub const EXCERPT_CHARS: usize = 40;

/// Write-once record of a finished attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizResult {
    pub week_id: u32,
    pub score: u32,
    pub total: u32,
    /// Authored option index chosen for each authored question; `None` if unanswered.
    pub chosen_original_indices: Vec<Option<usize>>,
    pub wrong_topics: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

/// Label of a question in the wrong-topic list: its title, or an excerpt.
pub fn topic_label(question: &ShuffledQuestion) -> String {
    match question.title.as_deref().map(str::trim) {
        Some(title) if !title.is_empty() => title.to_string(),
        _ => {
            let text = question.question.trim();
            if text.chars().count() > EXCERPT_CHARS {
                let excerpt: String = text.chars().take(EXCERPT_CHARS).collect();
                format!("{}…", excerpt.trim_end())
            } else {
                text.to_string()
            }
        }
    }
}

/// Per-question correctness, in shuffled order. Missing answers are wrong.
pub fn grade(quiz: &ShuffledQuiz, answers: &[Option<usize>]) -> Vec<bool> {
    quiz.questions()
        .iter()
        .enumerate()
        .map(|(pos, q)| answers.get(pos).copied().flatten() == Some(q.correct_shuffled_index))
        .collect()
}

/// Builds the persistable result of an attempt.
pub fn compile_result(
    week_id: u32,
    quiz: &ShuffledQuiz,
    answers: &[Option<usize>],
    completed_at: DateTime<Utc>,
) -> QuizResult {
    let graded = grade(quiz, answers);
    let mut chosen_original_indices = vec![None; quiz.len()];
    let mut wrong_topics = Vec::new();

    for (pos, (question, is_correct)) in quiz.questions().iter().zip(&graded).enumerate() {
        let chosen = answers
            .get(pos)
            .copied()
            .flatten()
            .and_then(|shuffled| question.options.get(shuffled))
            .map(|option| option.original_index);
        if let Some(slot) = chosen_original_indices.get_mut(question.original_index) {
            *slot = chosen;
        }
        if !is_correct {
            wrong_topics.push(topic_label(question));
        }
    }

    let score = graded.iter().filter(|c| **c).count() as u32;
    let result = QuizResult {
        week_id,
        score,
        total: quiz.len() as u32,
        chosen_original_indices,
        wrong_topics,
        completed_at,
    };
    info!(week = week_id, score = result.score, total = result.total, seed = quiz.seed(), "Quiz graded");
    result
}

/// One viewer's pass through a shuffled quiz.
#[derive(Debug, Clone)]
pub struct QuizAttempt {
    week_id: u32,
    quiz: ShuffledQuiz,
    answers: Vec<Option<usize>>,
}

impl QuizAttempt {
    pub fn new(week_id: u32, exercises: &[Exercise], seed: u64) -> Result<Self, QuizError> {
        let quiz = shuffle_quiz(exercises, seed)?;
        let answers = vec![None; quiz.len()];
        Ok(Self {
            week_id,
            quiz,
            answers,
        })
    }

    pub fn week_id(&self) -> u32 {
        self.week_id
    }

    pub fn quiz(&self) -> &ShuffledQuiz {
        &self.quiz
    }

    pub fn answers(&self) -> &[Option<usize>] {
        &self.answers
    }

    /// Records (or changes) the answer to the question at shuffled `position`.
    pub fn answer(&mut self, position: usize, option: usize) -> Result<(), QuizError> {
        let question = self
            .quiz
            .question(position)
            .ok_or(QuizError::QuestionOutOfRange(position))?;
        if option >= question.options.len() {
            return Err(QuizError::OptionOutOfRange {
                question: position,
                option,
            });
        }
        self.answers[position] = Some(option);
        Ok(())
    }

    pub fn answered_count(&self) -> usize {
        self.answers.iter().filter(|a| a.is_some()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.answered_count() == self.quiz.len()
    }

    /// Grades the attempt. The attempt stays readable for review; a new try
    /// needs [`Self::retake`].
    pub fn submit(&self, completed_at: DateTime<Utc>) -> QuizResult {
        compile_result(self.week_id, &self.quiz, &self.answers, completed_at)
    }

    /// Discards this attempt and shuffles anew. Seeds that reduce to the
    /// current generator state, or that reproduce the current order, are
    /// rejected so the viewer never gets the same permutation back.
    pub fn retake(self, exercises: &[Exercise], seed: u64) -> Result<Self, QuizError> {
        if SeededRng::same_stream(seed, self.quiz.seed()) {
            return Err(QuizError::SeedReused(seed));
        }
        let next = Self::new(self.week_id, exercises, seed)?;
        if self.quiz.can_reorder() && next.quiz.same_order(&self.quiz) {
            return Err(QuizError::SameOrder(seed));
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiz::LCG_MODULUS;
    use chrono::TimeZone;

    fn exercises() -> Vec<Exercise> {
        vec![
            Exercise {
                title: Some("Opportunity cost".to_string()),
                question: "What do you give up when choosing?".to_string(),
                options: vec!["Nothing".into(), "The next best alternative".into(), "Money".into()],
                correct_index: 1,
                explanation: None,
            },
            Exercise {
                title: None,
                question: "Which curve slopes downward in a standard market diagram?".to_string(),
                options: vec!["Supply".into(), "Demand".into()],
                correct_index: 1,
                explanation: None,
            },
            Exercise {
                title: Some("  ".to_string()),
                question: "Short one?".to_string(),
                options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
                correct_index: 3,
                explanation: Some("d".to_string()),
            },
        ]
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 30, 0).unwrap()
    }

    fn position_of(quiz: &ShuffledQuiz, original: usize) -> usize {
        quiz.questions()
            .iter()
            .position(|q| q.original_index == original)
            .unwrap()
    }

    #[test]
    fn test_choosing_authored_answer_is_always_correct() {
        let source = exercises();
        for seed in [1u64, 2, 3, 12345, 99_999, 1_700_000_000_000] {
            let quiz = shuffle_quiz(&source, seed).unwrap();
            let answers: Vec<Option<usize>> = quiz
                .questions()
                .iter()
                .map(|q| {
                    q.options
                        .iter()
                        .position(|o| o.original_index == source[q.original_index].correct_index)
                })
                .collect();
            assert!(grade(&quiz, &answers).iter().all(|c| *c), "seed={seed}");

            let result = compile_result(7, &quiz, &answers, at());
            assert_eq!(result.score, 3);
            assert!(result.wrong_topics.is_empty());
            assert_eq!(result.chosen_original_indices, vec![Some(1), Some(1), Some(3)]);
        }
    }

    #[test]
    fn test_unanswered_counts_as_wrong() {
        let source = exercises();
        let quiz = shuffle_quiz(&source, 42).unwrap();
        let result = compile_result(1, &quiz, &[], at());
        assert_eq!(result.score, 0);
        assert_eq!(result.total, 3);
        assert_eq!(result.chosen_original_indices, vec![None, None, None]);
        assert_eq!(result.wrong_topics.len(), 3);
    }

    #[test]
    fn test_wrong_answers_map_back_to_authored_indices() {
        let source = exercises();
        let quiz = shuffle_quiz(&source, 12345).unwrap();

        let mut answers = vec![None; 3];
        // Authored question 0: pick authored option 2 ("Money"), wrong.
        let q0 = position_of(&quiz, 0);
        answers[q0] = quiz.questions()[q0]
            .options
            .iter()
            .position(|o| o.original_index == 2);
        // Authored question 1: pick the correct one.
        let q1 = position_of(&quiz, 1);
        answers[q1] = Some(quiz.questions()[q1].correct_shuffled_index);

        let result = compile_result(3, &quiz, &answers, at());
        assert_eq!(result.score, 1);
        assert_eq!(result.chosen_original_indices, vec![Some(2), Some(1), None]);
        assert!(result.wrong_topics.contains(&"Opportunity cost".to_string()));
        assert!(result.wrong_topics.contains(&"Short one?".to_string()));
        assert_eq!(result.completed_at, at());
    }

    #[test]
    fn test_topic_label_falls_back_to_excerpt() {
        let source = exercises();
        let quiz = shuffle_quiz(&source, 5).unwrap();
        let untitled = &quiz.questions()[position_of(&quiz, 1)];
        let label = topic_label(untitled);
        assert!(label.ends_with('…'));
        assert!(label.starts_with("Which curve slopes downward"));
        assert!(label.chars().count() <= EXCERPT_CHARS + 1);
    }

    #[test]
    fn test_attempt_answers_are_validated() {
        let mut attempt = QuizAttempt::new(2, &exercises(), 10).unwrap();
        assert_eq!(attempt.answer(3, 0), Err(QuizError::QuestionOutOfRange(3)));
        let two_option_pos = position_of(attempt.quiz(), 1);
        assert_eq!(
            attempt.answer(two_option_pos, 2),
            Err(QuizError::OptionOutOfRange { question: two_option_pos, option: 2 })
        );

        attempt.answer(two_option_pos, 0).unwrap();
        attempt.answer(two_option_pos, 1).unwrap();
        assert_eq!(attempt.answered_count(), 1);
        assert!(!attempt.is_complete());
    }

    #[test]
    fn test_retake_requires_new_seed() {
        let source = exercises();
        let attempt = QuizAttempt::new(2, &source, 10).unwrap();
        assert_eq!(
            attempt.clone().retake(&source, 10).unwrap_err(),
            QuizError::SeedReused(10)
        );

        let fresh = attempt.retake(&source, 11).unwrap();
        assert_eq!(fresh.quiz().seed(), 11);
        assert_eq!(fresh.answered_count(), 0);
        assert_eq!(fresh.week_id(), 2);
    }

    #[test]
    fn test_retake_rejects_seed_with_same_generator_state() {
        let source = exercises();
        let attempt = QuizAttempt::new(1, &source, 10).unwrap();
        let aliased = 10 + LCG_MODULUS;
        assert_eq!(
            attempt.clone().retake(&source, aliased).unwrap_err(),
            QuizError::SeedReused(aliased)
        );
        assert_eq!(
            attempt.retake(&source, 10 + 7 * LCG_MODULUS).unwrap_err(),
            QuizError::SeedReused(10 + 7 * LCG_MODULUS)
        );
    }

    #[test]
    fn test_retake_rejects_seed_reproducing_the_order() {
        let source = exercises();
        let attempt = QuizAttempt::new(1, &source, 10).unwrap();
        // 186 is a different generator state that lands on the same orders.
        assert!(shuffle_quiz(&source, 186).unwrap().same_order(attempt.quiz()));
        assert_eq!(
            attempt.clone().retake(&source, 186).unwrap_err(),
            QuizError::SameOrder(186)
        );

        let fresh = attempt.clone().retake(&source, 11).unwrap();
        assert!(!fresh.quiz().same_order(attempt.quiz()));
    }

    #[test]
    fn test_single_fixed_question_can_always_be_retaken() {
        let source = vec![Exercise {
            title: None,
            question: "Only one way?".to_string(),
            options: vec!["yes".into()],
            correct_index: 0,
            explanation: None,
        }];
        let attempt = QuizAttempt::new(1, &source, 3).unwrap();
        assert!(!attempt.quiz().can_reorder());
        assert!(attempt.retake(&source, 4).is_ok());
    }

    #[test]
    fn test_submit_produces_serializable_record() {
        let source = exercises();
        let mut attempt = QuizAttempt::new(9, &source, 77).unwrap();
        for pos in 0..attempt.quiz().len() {
            let correct = attempt.quiz().questions()[pos].correct_shuffled_index;
            attempt.answer(pos, correct).unwrap();
        }
        assert!(attempt.is_complete());

        let result = attempt.submit(at());
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["week_id"], 9);
        assert_eq!(json["score"], 3);
        assert_eq!(json["completed_at"], "2026-03-02T09:30:00Z");
    }
}
