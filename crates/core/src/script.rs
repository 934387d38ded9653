use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One atomic unit of a lesson segment.
///
/// Steps are authored content: the engine reads them and never mutates them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    /// Narrated explanation text.
    Lecture {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
        #[serde(default)]
        narrator: String,
    },
    /// A host-rendered widget (chart, diagram). `props` is passed through untouched.
    Visual {
        component_ref: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        props: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
    /// A multiple-choice comprehension check with narrated feedback.
    Check {
        question: String,
        options: Vec<String>,
        correct_index: usize,
        on_correct: String,
        on_wrong: String,
        #[serde(default)]
        narrator: String,
    },
    /// A timed discussion prompt.
    DiscussTimer {
        prompt: String,
        duration_minutes: u32,
        #[serde(default)]
        guide_points: Vec<String>,
    },
}

impl Step {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Step::Lecture { .. } => "lecture",
            Step::Visual { .. } => "visual",
            Step::Check { .. } => "check",
            Step::DiscussTimer { .. } => "discuss_timer",
        }
    }

    pub fn is_check(&self) -> bool {
        matches!(self, Step::Check { .. })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScriptError {
    #[error("step {step}: correct_index {correct_index} is out of range for {options} options")]
    CorrectIndexOutOfRange {
        step: usize,
        correct_index: usize,
        options: usize,
    },
    #[error("step {step}: a check needs at least two options, found {options}")]
    TooFewOptions { step: usize, options: usize },
    #[error("step {step}: discussion duration must be at least one minute")]
    ZeroDuration { step: usize },
}

/// The ordered, immutable list of steps for one lesson segment.
///
/// Construction validates every step, so the sequencer can index options and
/// durations without further checks.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<Step>", into = "Vec<Step>")]
pub struct TeachingScript {
    steps: Vec<Step>,
}

impl TeachingScript {
    pub fn new(steps: Vec<Step>) -> Result<Self, ScriptError> {
        for (idx, step) in steps.iter().enumerate() {
            match step {
                Step::Check {
                    options,
                    correct_index,
                    ..
                } => {
                    if options.len() < 2 {
                        return Err(ScriptError::TooFewOptions {
                            step: idx,
                            options: options.len(),
                        });
                    }
                    if *correct_index >= options.len() {
                        return Err(ScriptError::CorrectIndexOutOfRange {
                            step: idx,
                            correct_index: *correct_index,
                            options: options.len(),
                        });
                    }
                }
                Step::DiscussTimer {
                    duration_minutes: 0,
                    ..
                } => return Err(ScriptError::ZeroDuration { step: idx }),
                _ => {}
            }
        }
        Ok(Self { steps })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// For a check step, the number of check steps that precede it (0-based).
    ///
    /// Returns `None` when `index` is not a check step.
    pub fn check_ordinal(&self, index: usize) -> Option<usize> {
        match self.steps.get(index) {
            Some(step) if step.is_check() => {
                Some(self.steps[..index].iter().filter(|s| s.is_check()).count())
            }
            _ => None,
        }
    }
}

impl TryFrom<Vec<Step>> for TeachingScript {
    type Error = ScriptError;

    fn try_from(steps: Vec<Step>) -> Result<Self, Self::Error> {
        Self::new(steps)
    }
}

impl From<TeachingScript> for Vec<Step> {
    fn from(script: TeachingScript) -> Self {
        script.steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lecture(text: &str) -> Step {
        Step::Lecture {
            text: text.to_string(),
            note: None,
            narrator: "host".to_string(),
        }
    }

    fn check(correct_index: usize, options: usize) -> Step {
        Step::Check {
            question: "Which one?".to_string(),
            options: (0..options).map(|i| format!("option {i}")).collect(),
            correct_index,
            on_correct: "Right.".to_string(),
            on_wrong: "Not quite.".to_string(),
            narrator: "host".to_string(),
        }
    }

    #[test]
    fn test_step_deserializes_from_tagged_json() {
        let json = r#"[
            {"type": "lecture", "text": "Hello", "narrator": "ana"},
            {"type": "visual", "component_ref": "SupplyCurve", "props": {"shift": 2}},
            {"type": "check", "question": "Q?", "options": ["a", "b"], "correct_index": 1,
             "on_correct": "yes", "on_wrong": "no"},
            {"type": "discuss_timer", "prompt": "Talk", "duration_minutes": 3,
             "guide_points": ["one", "two"]}
        ]"#;
        let script: TeachingScript = serde_json::from_str(json).unwrap();

        assert_eq!(script.len(), 4);
        assert_eq!(script.get(0).unwrap().kind(), "lecture");
        match script.get(1).unwrap() {
            Step::Visual { component_ref, props, caption } => {
                assert_eq!(component_ref, "SupplyCurve");
                assert_eq!(props.as_ref().unwrap()["shift"], 2);
                assert!(caption.is_none());
            }
            other => panic!("expected visual step, got {other:?}"),
        }
        assert_eq!(script.get(3).unwrap().kind(), "discuss_timer");
    }

    #[test]
    fn test_unknown_step_type_is_rejected() {
        let json = r#"[{"type": "poll", "text": "?"}]"#;
        assert!(serde_json::from_str::<TeachingScript>(json).is_err());
    }

    #[test]
    fn test_invalid_correct_index_is_rejected() {
        let err = TeachingScript::new(vec![lecture("a"), check(4, 4)]).unwrap_err();
        assert_eq!(
            err,
            ScriptError::CorrectIndexOutOfRange {
                step: 1,
                correct_index: 4,
                options: 4
            }
        );

        let json = r#"[{"type": "check", "question": "Q?", "options": ["a", "b"],
            "correct_index": 2, "on_correct": "y", "on_wrong": "n"}]"#;
        assert!(serde_json::from_str::<TeachingScript>(json).is_err());
    }

    #[test]
    fn test_single_option_check_and_zero_minute_discussion_are_rejected() {
        assert_eq!(
            TeachingScript::new(vec![check(0, 1)]).unwrap_err(),
            ScriptError::TooFewOptions { step: 0, options: 1 }
        );
        let zero = Step::DiscussTimer {
            prompt: "p".to_string(),
            duration_minutes: 0,
            guide_points: vec![],
        };
        assert_eq!(
            TeachingScript::new(vec![zero]).unwrap_err(),
            ScriptError::ZeroDuration { step: 0 }
        );
    }

    #[test]
    fn test_check_ordinal_counts_prior_checks_only() {
        let script =
            TeachingScript::new(vec![lecture("a"), check(0, 2), lecture("b"), check(1, 3)])
                .unwrap();

        assert_eq!(script.check_ordinal(0), None);
        assert_eq!(script.check_ordinal(1), Some(0));
        assert_eq!(script.check_ordinal(2), None);
        assert_eq!(script.check_ordinal(3), Some(1));
        assert_eq!(script.check_ordinal(9), None);
    }

    #[test]
    fn test_script_serializes_as_plain_step_list() {
        let script = TeachingScript::new(vec![lecture("hi")]).unwrap();
        let json = serde_json::to_value(&script).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["type"], "lecture");
        assert!(json[0].get("note").is_none());
    }
}
