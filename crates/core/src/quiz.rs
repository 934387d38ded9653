//! Seeded quiz shuffling.
//!
//! A self-test presents its exercises in a random order, and each exercise's
//! options in a random order, while staying reproducible from a single seed.
//! Questions are shuffled with the seed itself; the options of the question
//! at original index `q` use `seed + q * OPTION_SEED_STRIDE`, so every
//! question gets its own option order.
//!
//! The generator is a small linear-congruential one chosen for
//! reproducibility. It is biased for tiny lists and must not be used for
//! anything security sensitive.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const LCG_MULTIPLIER: u64 = 9301;
pub const LCG_INCREMENT: u64 = 49_297;
pub const LCG_MODULUS: u64 = 233_280;
/// Prime offset between the option seeds of consecutive questions.
pub const OPTION_SEED_STRIDE: u64 = 104_729;

/// One authored self-test exercise. `correct_index` points into `options`
/// in their authored order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exercise {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub question: String,
    pub options: Vec<String>,
    pub correct_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuizError {
    #[error("exercise {exercise}: correct_index {correct_index} is out of range for {options} options")]
    CorrectIndexOutOfRange {
        exercise: usize,
        correct_index: usize,
        options: usize,
    },
    #[error("question {0} does not exist")]
    QuestionOutOfRange(usize),
    #[error("question {question} has no option {option}")]
    OptionOutOfRange { question: usize, option: usize },
    #[error("seed {0} was already used for the previous attempt")]
    SeedReused(u64),
    #[error("seed {0} gives the same order as the previous attempt")]
    SameOrder(u64),
}

/// Linear-congruential generator producing values in `[0, 1)`.
#[derive(Debug, Clone)]
pub struct SeededRng {
    state: u64,
}

impl SeededRng {
    pub fn new(seed: u64) -> Self {
        Self {
            state: seed % LCG_MODULUS,
        }
    }

    /// Whether two seeds start the generator in the same state.
    pub fn same_stream(a: u64, b: u64) -> bool {
        a % LCG_MODULUS == b % LCG_MODULUS
    }

    pub fn next_unit(&mut self) -> f64 {
        self.state = (self.state * LCG_MULTIPLIER + LCG_INCREMENT) % LCG_MODULUS;
        self.state as f64 / LCG_MODULUS as f64
    }

    /// Uniform-ish index in `0..bound`. `bound` must be non-zero.
    pub fn below(&mut self, bound: usize) -> usize {
        (self.next_unit() * bound as f64) as usize
    }
}

/// Fisher-Yates shuffle of `0..len`. Position `p` of the result holds the
/// original index shown at `p`.
pub fn permutation(len: usize, seed: u64) -> Vec<usize> {
    let mut rng = SeededRng::new(seed);
    let mut order: Vec<usize> = (0..len).collect();
    for i in (1..len).rev() {
        let j = rng.below(i + 1);
        order.swap(i, j);
    }
    order
}

/// Seed for the options of the question at `original_index`.
pub fn option_seed(seed: u64, original_index: usize) -> u64 {
    seed.wrapping_add((original_index as u64).wrapping_mul(OPTION_SEED_STRIDE))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShuffledOption {
    pub original_index: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShuffledQuestion {
    pub original_index: usize,
    pub title: Option<String>,
    pub question: String,
    pub options: Vec<ShuffledOption>,
    /// Position among `options` of the authored correct answer.
    pub correct_shuffled_index: usize,
    pub explanation: Option<String>,
}

/// The randomized form of one quiz attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShuffledQuiz {
    seed: u64,
    questions: Vec<ShuffledQuestion>,
}

impl ShuffledQuiz {
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn questions(&self) -> &[ShuffledQuestion] {
        &self.questions
    }

    pub fn question(&self, position: usize) -> Option<&ShuffledQuestion> {
        self.questions.get(position)
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Whether both quizzes show the same questions and options in the same order.
    pub fn same_order(&self, other: &ShuffledQuiz) -> bool {
        self.questions.len() == other.questions.len()
            && self.questions.iter().zip(&other.questions).all(|(a, b)| {
                a.original_index == b.original_index
                    && a.options.len() == b.options.len()
                    && a.options
                        .iter()
                        .zip(&b.options)
                        .all(|(x, y)| x.original_index == y.original_index)
            })
    }

    /// Whether any other order exists at all.
    pub fn can_reorder(&self) -> bool {
        self.questions.len() > 1 || self.questions.iter().any(|q| q.options.len() > 1)
    }
}

/// Shuffles questions and options of `exercises` deterministically from `seed`.
///
/// An empty exercise list gives an empty quiz.
pub fn shuffle_quiz(exercises: &[Exercise], seed: u64) -> Result<ShuffledQuiz, QuizError> {
    for (idx, exercise) in exercises.iter().enumerate() {
        if exercise.correct_index >= exercise.options.len() {
            return Err(QuizError::CorrectIndexOutOfRange {
                exercise: idx,
                correct_index: exercise.correct_index,
                options: exercise.options.len(),
            });
        }
    }

    let questions = permutation(exercises.len(), seed)
        .into_iter()
        .map(|original_index| {
            let exercise = &exercises[original_index];
            let options: Vec<ShuffledOption> =
                permutation(exercise.options.len(), option_seed(seed, original_index))
                    .into_iter()
                    .map(|option_index| ShuffledOption {
                        original_index: option_index,
                        text: exercise.options[option_index].clone(),
                    })
                    .collect();
            let correct_shuffled_index = options
                .iter()
                .position(|o| o.original_index == exercise.correct_index)
                .unwrap_or_default();
            ShuffledQuestion {
                original_index,
                title: exercise.title.clone(),
                question: exercise.question.clone(),
                options,
                correct_shuffled_index,
                explanation: exercise.explanation.clone(),
            }
        })
        .collect();

    Ok(ShuffledQuiz { seed, questions })
}
