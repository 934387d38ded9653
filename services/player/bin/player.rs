//! Main Entrypoint for the Classroom Player
//!
//! This binary is responsible for:
//! 1. Parsing the command line and loading configuration from the environment.
//! 2. Loading the week's lesson, its audio manifest and the saved progress.
//! 3. Running a guided lesson or a self-test against terminal input.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use classroom_core::audio::{AudioCueResolver, ManifestCache};
use classroom_player::{
    config::Config,
    content, manifest,
    runtime::{LessonOptions, LessonRuntime, NullAudio, UserInput, parse_input, run_quiz},
    store::ProgressStore,
};
use std::io::Write;
use std::sync::Arc;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "classroom", version, about = "Guided lessons and self-tests in the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play the guided class of a week.
    Lesson {
        #[arg(long)]
        week: u32,
        /// Segment to start at (1-based) instead of the saved position.
        #[arg(long)]
        segment: Option<usize>,
        /// Reveal narration at the fast silent pace without audio.
        #[arg(long)]
        muted: bool,
    },
    /// Take the self-test of a week.
    Quiz {
        #[arg(long)]
        week: u32,
        /// Seed of the question order; random when omitted.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Show saved progress and self-test results of a week.
    Progress {
        #[arg(long)]
        week: u32,
    },
}

/// Forwards parsed stdin lines, and Ctrl+C as a quit request.
fn spawn_input_reader() -> mpsc::UnboundedReceiver<UserInput> {
    let (tx, rx) = mpsc::unbounded_channel();

    let ctrl_c_tx = tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C. Stopping...");
            let _ = ctrl_c_tx.send(UserInput::Quit);
        }
    });

    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match parse_input(&line) {
                Some(input) => {
                    if tx.send(input).is_err() {
                        return;
                    }
                }
                None => warn!(input = %line.trim(), "Unrecognized input"),
            }
        }
        let _ = tx.send(UserInput::Quit);
    });

    rx
}

fn print_progress(store: &ProgressStore, week: u32) -> Result<()> {
    let mut out = std::io::stdout().lock();
    match store.progress(week) {
        Some(p) => writeln!(
            out,
            "Week {week}: segment {} (furthest {}), step {}, mode {:?}",
            p.current_segment + 1,
            p.max_reached_segment + 1,
            p.class_step_index + 1,
            p.mode
        )?,
        None => writeln!(out, "Week {week}: not started")?,
    }
    for result in store.results_for(week) {
        write!(
            out,
            "  {}  {}/{}",
            result.completed_at.format("%Y-%m-%d %H:%M"),
            result.score,
            result.total
        )?;
        if !result.wrong_topics.is_empty() {
            write!(out, "  review: {}", result.wrong_topics.join(", "))?;
        }
        writeln!(out)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    // Logs go to stderr so they do not interleave with the lesson transcript.
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    // --- 3. Open Saved Progress ---
    let mut store = ProgressStore::open(&config.progress_path)
        .await
        .context("Failed to open progress store")?;

    // --- 4. Run ---
    match cli.command {
        Commands::Lesson {
            week,
            segment,
            muted,
        } => {
            let lesson = content::load_lesson(&config.content_dir, week).await?;
            let segment = match segment {
                None => None,
                Some(s) if s == 0 || s > lesson.segment_count() => {
                    bail!("Week {week} has segments 1 to {}", lesson.segment_count())
                }
                Some(s) => Some(s - 1),
            };

            let cache = Arc::new(ManifestCache::new(week));
            let source = manifest::from_config(&config);
            cache.load(source.as_ref()).await;
            let resolver = AudioCueResolver::new(cache);

            let options = LessonOptions {
                timings: config.timings(),
                muted,
                segment,
            };
            let mut runtime = LessonRuntime::new(
                lesson,
                store,
                resolver,
                Box::new(NullAudio),
                options,
                std::io::stdout(),
            );
            let outcome = runtime.run(spawn_input_reader()).await?;
            info!(?outcome, "Lesson session finished.");
        }
        Commands::Quiz { week, seed } => {
            let lesson = content::load_lesson(&config.content_dir, week).await?;
            let seed = seed.unwrap_or_else(rand::random);
            let mut out = std::io::stdout();
            run_quiz(&lesson, seed, &mut store, spawn_input_reader(), &mut out).await?;
        }
        Commands::Progress { week } => print_progress(&store, week)?,
    }

    Ok(())
}
