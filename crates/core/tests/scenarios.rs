use classroom_core::{
    Command, Phase, StepSequencer, TimerKind, TimerTicket,
    audio::{AudioCueResolver, AudioEvent, AudioManifest, ManifestCache},
    grading::{QuizAttempt, compile_result},
    quiz::{Exercise, shuffle_quiz},
    script::{Step, TeachingScript},
};
use chrono::Utc;
use std::sync::Arc;

fn lecture(text: &str) -> Step {
    Step::Lecture {
        text: text.to_string(),
        note: None,
        narrator: "host".to_string(),
    }
}

fn visual(name: &str) -> Step {
    Step::Visual {
        component_ref: name.to_string(),
        props: None,
        caption: None,
    }
}

fn check(options: usize, correct_index: usize) -> Step {
    Step::Check {
        question: "Which is it?".to_string(),
        options: (0..options).map(|i| format!("option {i}")).collect(),
        correct_index,
        on_correct: "Exactly.".to_string(),
        on_wrong: "Not quite.".to_string(),
        narrator: "host".to_string(),
    }
}

fn discussion(minutes: u32) -> Step {
    Step::DiscussTimer {
        prompt: "Discuss with a partner".to_string(),
        duration_minutes: minutes,
        guide_points: vec!["first".to_string()],
    }
}

fn resolver_with(keys: &[&str]) -> AudioCueResolver {
    let manifest: AudioManifest = keys
        .iter()
        .map(|k| (k.to_string(), format!("https://cdn.test/week1/{k}.mp3")))
        .collect();
    AudioCueResolver::new(Arc::new(ManifestCache::with_manifest(1, manifest)))
}

fn ticket(commands: &[Command], kind: TimerKind) -> Option<TimerTicket> {
    commands.iter().rev().find_map(|c| match c {
        Command::ScheduleTimer { ticket, .. } if ticket.kind == kind => Some(*ticket),
        _ => None,
    })
}

fn played_keys(commands: &[Command]) -> Vec<String> {
    commands
        .iter()
        .filter_map(|c| match c {
            Command::PlayClip { key, .. } => Some(key.clone()),
            _ => None,
        })
        .collect()
}

/// Fires entry and typewriter timers until the engine stops scheduling them.
fn settle(seq: &mut StepSequencer, mut commands: Vec<Command>) -> Vec<Command> {
    let mut seen = Vec::new();
    loop {
        let next = ticket(&commands, TimerKind::Entry).or(ticket(&commands, TimerKind::Typewriter));
        seen.extend(commands);
        match next {
            Some(t) => commands = seq.on_timer(t),
            None => return seen,
        }
    }
}

#[test]
fn scenario_wrong_answer_on_check_after_two_lectures() {
    let script = TeachingScript::new(vec![
        lecture("Prices signal scarcity."),
        lecture("Buyers respond to prices."),
        check(4, 2),
    ])
    .unwrap();
    let mut seq = StepSequencer::new(script, 0, AudioCueResolver::silent(1)).with_completion(true);

    let commands = seq.start();
    settle(&mut seq, commands);
    assert_eq!(seq.state().phase, Phase::LectureDone);

    let commands = seq.advance();
    assert!(commands.contains(&Command::StepChanged(1)));
    settle(&mut seq, commands);
    assert_eq!(seq.state().phase, Phase::LectureDone);

    let commands = seq.advance();
    assert!(commands.contains(&Command::StepChanged(2)));
    settle(&mut seq, commands);
    assert_eq!(seq.state().phase, Phase::AskingCheck);
    assert!(!seq.can_advance());

    seq.select_option(1);
    let state = seq.state();
    assert_eq!(state.phase, Phase::ShowingFeedback);
    assert_eq!(state.selected_option, Some(1));
    assert_eq!(state.is_correct, Some(false));
    assert_eq!(state.attempted_count(), 1);
    assert_eq!(state.correct_count(), 0);
    assert_eq!(seq.narration().text(), "Not quite.");
}

#[test]
fn scenario_discussion_countdown_and_return() {
    let script = TeachingScript::new(vec![discussion(1), visual("Recap")]).unwrap();
    let mut seq = StepSequencer::new(script, 0, AudioCueResolver::silent(1));

    let commands = seq.start();
    let mut commands = seq.on_timer(ticket(&commands, TimerKind::Entry).unwrap());
    assert_eq!(seq.state().phase, Phase::DiscussCountdown);
    assert_eq!(seq.state().discuss_seconds_left(), 60);
    assert!(seq.can_advance(), "discussion never blocks continue");

    let mut last = None;
    while let Some(t) = ticket(&commands, TimerKind::Countdown) {
        last = Some(t);
        commands = seq.on_timer(t);
    }
    assert_eq!(seq.state().discuss_seconds_left(), 0);
    assert!(seq.state().discussion.is_expired());
    assert_eq!(seq.state().phase, Phase::DiscussCountdown);

    // A duplicated final tick changes nothing.
    assert!(seq.on_timer(last.unwrap()).is_empty());
    assert_eq!(seq.state().discuss_seconds_left(), 0);

    let commands = seq.advance();
    settle(&mut seq, commands);
    assert_eq!(seq.state().phase, Phase::ShowingVisual);

    let commands = seq.go_back();
    assert!(commands.contains(&Command::StepChanged(0)));
    assert_eq!(seq.state().phase, Phase::DiscussCountdown);
    assert_eq!(seq.state().discuss_seconds_left(), 60);
    assert!(ticket(&commands, TimerKind::Countdown).is_some());
}

#[test]
fn scenario_quiz_seed_determinism() {
    let exercises: Vec<Exercise> = (0..5)
        .map(|q| Exercise {
            title: Some(format!("Topic {q}")),
            question: format!("Question {q}?"),
            options: (0..4).map(|o| format!("{q}.{o}")).collect(),
            correct_index: q % 4,
            explanation: None,
        })
        .collect();

    let first = shuffle_quiz(&exercises, 12345).unwrap();
    let again = shuffle_quiz(&exercises, 12345).unwrap();
    assert_eq!(first, again);

    let other = shuffle_quiz(&exercises, 6789).unwrap();
    let order = |quiz: &classroom_core::quiz::ShuffledQuiz| -> Vec<usize> {
        quiz.questions().iter().map(|q| q.original_index).collect()
    };
    assert_ne!(order(&first), order(&other));
    let mut sorted = order(&other);
    sorted.sort_unstable();
    assert_eq!(sorted, vec![0, 1, 2, 3, 4]);

    // Answering every question with its authored answer scores full marks
    // whatever the permutation.
    let answers: Vec<Option<usize>> = other
        .questions()
        .iter()
        .map(|q| Some(q.correct_shuffled_index))
        .collect();
    let result = compile_result(1, &other, &answers, Utc::now());
    assert_eq!((result.score, result.total), (5, 5));
    assert_eq!(
        result.chosen_original_indices,
        vec![Some(0), Some(1), Some(2), Some(3), Some(0)]
    );

    let attempt = QuizAttempt::new(1, &exercises, 12345).unwrap();
    assert!(attempt.retake(&exercises, 12345).is_err());
}

#[test]
fn back_navigation_never_replays_narration() {
    let script = TeachingScript::new(vec![lecture("First idea."), check(2, 1), lecture("Third.")])
        .unwrap();
    let mut seq = StepSequencer::new(script, 0, resolver_with(&["s0_l0", "s0_q0", "s0_l2"]));

    let commands = seq.start();
    let seen = settle(&mut seq, commands);
    assert_eq!(played_keys(&seen), vec!["s0_l0"]);
    let clip = seen
        .iter()
        .find_map(|c| match c {
            Command::PlayClip { clip, .. } => Some(*clip),
            _ => None,
        })
        .unwrap();
    seq.on_audio(AudioEvent::Ended { clip });

    let commands = seq.advance();
    let seen = settle(&mut seq, commands);
    assert_eq!(played_keys(&seen), vec!["s0_q0"]);
    assert_eq!(seq.state().phase, Phase::AskingCheck);

    let commands = seq.go_back();
    assert!(played_keys(&commands).is_empty());
    assert!(ticket(&commands, TimerKind::Typewriter).is_none());
    assert!(ticket(&commands, TimerKind::Entry).is_none());
    assert_eq!(seq.state().step_index, 0);
    assert_eq!(seq.state().phase, Phase::LectureDone);
    assert!(seq.narration().is_complete());
    assert_eq!(seq.narration().visible_text(), "First idea.");
    assert!(seq.can_advance());

    // Forward again runs the full entry of the next step.
    let commands = seq.advance();
    assert!(commands.contains(&Command::StepChanged(1)));
    assert_eq!(seq.state().phase, Phase::Entering);
    assert!(ticket(&commands, TimerKind::Entry).is_some());
    let seen = settle(&mut seq, commands);
    assert_eq!(played_keys(&seen), vec!["s0_q0"]);
    assert_eq!(seq.state().phase, Phase::AskingCheck);

    // And the lecture still comes back revealed, without its clip.
    let commands = seq.go_back();
    assert!(played_keys(&commands).is_empty());
    assert!(ticket(&commands, TimerKind::Typewriter).is_none());
    assert_eq!(seq.state().phase, Phase::LectureDone);
    assert!(seq.narration().is_complete());
}

#[test]
fn back_to_check_shows_question_fully_revealed() {
    let script = TeachingScript::new(vec![check(3, 0), visual("Chart")]).unwrap();
    let mut seq = StepSequencer::new(script, 4, resolver_with(&["s4_q0"]));

    let commands = seq.start();
    settle(&mut seq, commands);
    seq.select_option(0);
    let commands = seq.skip_narration();
    assert!(commands.contains(&Command::CancelTimers));
    let commands = seq.advance();
    settle(&mut seq, commands);
    assert_eq!(seq.state().phase, Phase::ShowingVisual);

    let commands = seq.go_back();
    assert!(played_keys(&commands).is_empty());
    assert_eq!(seq.state().phase, Phase::AskingCheck);
    assert_eq!(seq.state().selected_option, None);
    assert_eq!(seq.narration().visible_text(), "Which is it?");
}

#[test]
fn segment_complete_is_emitted_once_per_traversal() {
    let script = TeachingScript::new(vec![visual("A"), visual("B")]).unwrap();
    let mut seq = StepSequencer::new(script, 0, AudioCueResolver::silent(1)).with_completion(true);

    let commands = seq.start();
    settle(&mut seq, commands);
    let commands = seq.advance();
    settle(&mut seq, commands);
    assert_eq!(seq.state().phase, Phase::ShowingVisual);

    let commands = seq.advance();
    assert!(!commands.contains(&Command::SegmentComplete));
    assert_eq!(seq.state().phase, Phase::StepDone);

    assert_eq!(seq.advance(), vec![Command::SegmentComplete]);
    assert!(seq.advance().is_empty());

    // Walk back and forward again: a new traversal completes again.
    seq.go_back();
    let commands = seq.advance();
    settle(&mut seq, commands);
    seq.advance();
    assert_eq!(seq.state().phase, Phase::StepDone);
    assert_eq!(seq.advance(), vec![Command::SegmentComplete]);
}

#[test]
fn completion_disabled_never_notifies() {
    let script = TeachingScript::new(vec![visual("A")]).unwrap();
    let mut seq = StepSequencer::new(script, 0, AudioCueResolver::silent(1));
    let commands = seq.start();
    settle(&mut seq, commands);
    seq.advance();
    assert_eq!(seq.state().phase, Phase::StepDone);
    assert!(seq.advance().is_empty());
}

#[test]
fn continue_is_gated_until_the_phase_allows_it() {
    let script = TeachingScript::new(vec![lecture("Slow words"), check(2, 0)]).unwrap();
    let mut seq = StepSequencer::new(script, 0, AudioCueResolver::silent(1));

    assert!(!seq.can_advance(), "not started");
    let commands = seq.start();
    assert_eq!(seq.state().phase, Phase::Entering);
    assert!(seq.advance().is_empty());

    let commands = seq.on_timer(ticket(&commands, TimerKind::Entry).unwrap());
    assert_eq!(seq.state().phase, Phase::PlayingLecture);
    assert!(seq.advance().is_empty());

    settle(&mut seq, commands);
    assert!(seq.can_advance());
    let commands = seq.advance();
    settle(&mut seq, commands);
    assert_eq!(seq.state().phase, Phase::AskingCheck);
    assert!(seq.advance().is_empty());

    let commands = seq.select_option(1);
    assert_eq!(seq.state().phase, Phase::ShowingFeedback);
    assert!(!seq.can_advance(), "feedback still typing");
    settle(&mut seq, commands);
    assert!(seq.can_advance());
}

#[test]
fn score_only_grows_within_a_segment_and_resets_on_change() {
    let script = TeachingScript::new(vec![check(2, 0), check(2, 1), check(3, 2)]).unwrap();
    let mut seq = StepSequencer::new(script, 0, AudioCueResolver::silent(1));
    let mut previous = (0, 0);

    let commands = seq.start();
    settle(&mut seq, commands);
    for (step, choice) in [(0usize, 0usize), (1, 0), (2, 2)] {
        assert_eq!(seq.state().step_index, step);
        let commands = seq.select_option(choice);
        settle(&mut seq, commands);

        let now = (seq.state().attempted_count(), seq.state().correct_count());
        assert_eq!(now.0, previous.0 + 1);
        assert!(now.1 >= previous.1 && now.1 <= now.0);
        previous = now;

        let commands = seq.advance();
        settle(&mut seq, commands);
    }
    assert_eq!(previous, (3, 2));

    // Same segment: nothing happens.
    let same = TeachingScript::new(vec![visual("x")]).unwrap();
    assert!(seq.change_segment(0, same).is_empty());
    assert_eq!(seq.state().attempted_count(), 3);

    let next = TeachingScript::new(vec![lecture("Segment two")]).unwrap();
    let commands = seq.change_segment(1, next);
    assert!(commands.contains(&Command::StepChanged(0)));
    assert_eq!(seq.segment_index(), 1);
    assert_eq!(seq.state().step_index, 0);
    assert_eq!(seq.state().attempted_count(), 0);
    assert_eq!(seq.state().correct_count(), 0);
}

#[test]
fn stale_audio_events_are_ignored_after_leaving_a_step() {
    let script = TeachingScript::new(vec![lecture("One"), lecture("Two")]).unwrap();
    let mut seq = StepSequencer::new(script, 0, resolver_with(&["s0_l0", "s0_l1"]));

    let commands = seq.start();
    let seen = settle(&mut seq, commands);
    let first_clip = seen
        .iter()
        .find_map(|c| match c {
            Command::PlayClip { clip, .. } => Some(*clip),
            _ => None,
        })
        .unwrap();
    let commands = seq.skip_narration();
    assert!(commands.contains(&Command::StopAudio));

    let commands = seq.advance();
    let commands = seq.on_timer(ticket(&commands, TimerKind::Entry).unwrap());
    assert_eq!(played_keys(&commands), vec!["s0_l1"]);
    let interval = seq.narration().interval();

    let late = seq.on_audio(AudioEvent::Loaded {
        clip: first_clip,
        duration: std::time::Duration::from_secs(30),
    });
    assert!(late.is_empty());
    assert_eq!(seq.narration().interval(), interval);
}
