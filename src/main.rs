//! # MoodTune - Emotion-Driven Music Player
//!
//! MoodTune plays music that matches your face: webcam frames are labeled
//! by an external emotion detector, the label becomes a valence/arousal
//! target, and the nearest-annotated song from a DEAM-style dataset plays.
//!
//! ## Architecture
//!
//! - `cli`: Command-line interface definitions
//! - `config`: Settings file and dataset path derivation
//! - `dataset`: Feature/annotation ETL into the song table
//! - `emotion`: Detector adapter and the coordinate table
//! - `matcher`: Nearest-neighbor search with elimination
//! - `player`: rodio playback and arbitration
//! - `session`: The polling loop
//!
//! ## Usage
//!
//! ```bash
//! # Check the dataset
//! moodtune scan
//!
//! # Run the player (camera + detector configured)
//! moodtune run
//!
//! # Run without any hardware
//! moodtune run --simulate
//!
//! # One-shot queries
//! moodtune match 0.8 0.8
//! moodtune match --emotion sad --play
//! ```

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use log::info;
use moodtune::capture;
use moodtune::cli;
use moodtune::completion;
use moodtune::config::Settings;
use moodtune::dataset::SongLibrary;
use moodtune::emotion::{AffectPoint, Emotion, EmotionClassifier};
use moodtune::matcher::SongMatcher;
use moodtune::models::ModelBundle;
use moodtune::player::{PlayOutcome, Playback, RodioPlayer};
use moodtune::session::{self, Session};
use std::path::PathBuf;

/// Merge the settings file with a CLI/env dataset override.
fn load_settings(data_dir: Option<PathBuf>) -> Result<Settings> {
    let mut settings = Settings::load()?;
    settings.override_dataset_dir(data_dir);
    Ok(settings)
}

/// Main entry point for the MoodTune application.
///
/// Initializes logging, parses command-line arguments, and routes commands
/// to the appropriate module functions. All operations return Results for
/// consistent error handling throughout the application.
///
/// # Logging
///
/// Initializes environment logger which can be controlled via `RUST_LOG`:
/// - `RUST_LOG=debug moodtune run` - Enable debug logging
/// - `RUST_LOG=moodtune::dataset=debug moodtune scan` - Module-specific logging
fn main() -> Result<()> {
    env_logger::init();

    let args = cli::Args::parse();

    match args.command {
        cli::Command::Run {
            simulate,
            frames,
            interval_ms,
            volume,
            data_dir,
        } => {
            run(simulate, frames, interval_ms, volume, data_dir)?;
        }
        cli::Command::Scan { data_dir } => {
            scan(data_dir)?;
        }
        cli::Command::List { data_dir } => {
            list(data_dir)?;
        }
        cli::Command::Match {
            valence,
            arousal,
            emotion,
            play,
            data_dir,
        } => {
            run_match(valence, arousal, emotion, play, data_dir)?;
        }
        cli::Command::Emotions => {
            print_emotion_table();
        }
        cli::Command::Completion { shell } => {
            let mut cmd = cli::Args::command();
            completion::generate_completions(completion::shell_to_completion_shell(&shell), &mut cmd);
        }
    }

    Ok(())
}

/// The application proper: bring up every stage, then hand over to the
/// session loop until Ctrl-C (or the frame budget) ends it.
fn run(
    simulate: bool,
    frames: Option<u64>,
    interval_ms: Option<u64>,
    volume: Option<f32>,
    data_dir: Option<PathBuf>,
) -> Result<()> {
    let mut settings = load_settings(data_dir)?;
    if let Some(ms) = interval_ms {
        settings.frame_interval_ms = ms;
    }
    if let Some(v) = volume {
        settings.volume = v;
    }

    let bundle = ModelBundle::load(&settings).map_err(|e| {
        eprintln!("Failed to load the model bundle:");
        eprintln!("  {e:#}");
        eprintln!();
        eprintln!("MoodTune expects these files under the models directory:");
        eprintln!("  1. emotion_music_model.h5 - the trained emotion model");
        eprintln!("  2. feature_scaler.json - per-column mean and scale arrays");
        eprintln!("  3. feature_columns.json - the ordered feature names");
        eprintln!();
        eprintln!("Set \"models_dir\" in settings.json if they live elsewhere.");
        e
    })?;
    info!("Model bundle ready ({} columns)", bundle.feature_columns.len());

    let library = SongLibrary::load(&settings).map_err(|e| {
        eprintln!("Failed to load the dataset:");
        eprintln!("  {e:#}");
        eprintln!();
        eprintln!("MoodTune expects a DEAM-style layout under the dataset root:");
        eprintln!("  MEMD_audio/   one <id>.mp3 per song");
        eprintln!("  features/     one <id>.csv per song (';'-separated)");
        eprintln!("  annotations/  the two static annotation tables");
        eprintln!();
        eprintln!("Point \"dataset_dir\" in settings.json or --data-dir at that root.");
        e
    })?;
    let matcher = SongMatcher::new(library.songs);

    let player = RodioPlayer::new(&settings).map_err(|e| {
        eprintln!("Failed to initialize audio output:");
        eprintln!("  {e:#}");
        eprintln!();
        eprintln!("All three output configurations were tried (default,");
        eprintln!("44100 Hz stereo, 22050 Hz mono). Check that a sound");
        eprintln!("device is present and not claimed by another process.");
        e
    })?;

    let classifier = EmotionClassifier::from_settings(&settings, simulate)?;

    let source = capture::from_settings(&settings, simulate).map_err(|e| {
        eprintln!("Failed to start the frame capture:");
        eprintln!("  {e:#}");
        eprintln!();
        eprintln!("To fix this:");
        eprintln!("  1. Check the webcam device: ls /dev/video*");
        eprintln!("  2. Check ffmpeg is installed (the default capture command)");
        eprintln!("  3. Or set \"capture_command\" in settings.json");
        eprintln!("  4. Or pass --simulate to run without a camera");
        e
    })?;

    session::install_sigint_handler();

    println!(
        "MoodTune ready: {} songs, audio output {}, {} detector",
        matcher.len(),
        player.tier(),
        classifier.backend_name()
    );
    println!("Press Ctrl-C to stop.");

    let report = Session::new(source, classifier, matcher, player, settings.frame_interval())
        .with_frame_limit(frames)
        .run();
    info!(
        "Session finished: {} frames, {} faces, {} songs started",
        report.frames, report.faces, report.songs_started
    );

    Ok(())
}

/// Run the ETL and print what came out of it.
fn scan(data_dir: Option<PathBuf>) -> Result<()> {
    let settings = load_settings(data_dir)?;
    let library = SongLibrary::load(&settings)?;
    let report = &library.report;

    println!("Dataset summary:");
    println!("  songs joined:     {}", report.songs_joined);
    println!(
        "  feature files:    {} read, {} skipped",
        report.feature_files_read, report.feature_files_skipped
    );
    println!(
        "  annotation rows:  {} ({} duplicate ids merged)",
        report.annotation_rows, report.duplicate_ids_merged
    );
    println!("  feature columns:  {}", report.feature_columns);
    println!("  imputed cells:    {}", report.imputed_cells);
    println!(
        "  valence range:    {:+.2} to {:+.2}",
        report.valence_range.0, report.valence_range.1
    );
    println!(
        "  arousal range:    {:+.2} to {:+.2}",
        report.arousal_range.0, report.arousal_range.1
    );

    Ok(())
}

/// Print the joined song table, one line per song.
fn list(data_dir: Option<PathBuf>) -> Result<()> {
    let settings = load_settings(data_dir)?;
    let library = SongLibrary::load(&settings)?;

    println!("{} songs:", library.songs.len());
    for song in &library.songs {
        println!(
            "{:>5}  v {:+.2}  a {:+.2}  {}",
            song.song_id,
            song.affect.valence,
            song.affect.arousal,
            song.audio_path.display()
        );
    }

    Ok(())
}

/// One-shot nearest-neighbor query, optionally playing the result.
fn run_match(
    valence: Option<f64>,
    arousal: Option<f64>,
    emotion: Option<String>,
    play: bool,
    data_dir: Option<PathBuf>,
) -> Result<()> {
    let target = match (valence, arousal, emotion) {
        (Some(v), Some(a), None) => AffectPoint::new(v, a),
        (None, None, Some(label)) => Emotion::from_label(&label)
            .with_context(|| {
                format!(
                    "Unknown emotion label '{label}'. Known labels: {}",
                    Emotion::ALL.map(Emotion::label).join(", ")
                )
            })?
            .affect(),
        _ => anyhow::bail!("Provide a valence/arousal pair, or --emotion <label>"),
    };

    let settings = load_settings(data_dir)?;
    let library = SongLibrary::load(&settings)?;
    let mut matcher = SongMatcher::new(library.songs);

    let Some(hit) = matcher.find_matching_song(target) else {
        anyhow::bail!("No playable songs in the dataset");
    };

    println!("Best match for ({target}):");
    println!("  song {} at distance {:.3}", hit.song_id, hit.distance);
    println!("  annotated {}", hit.affect);
    println!("  {}", hit.audio_path.display());

    if play {
        let mut player = RodioPlayer::new(&settings)?;
        match player.play_song(&hit.audio_path) {
            PlayOutcome::Started => {
                println!("♫ PLAYING: song {} (distance {:.3})", hit.song_id, hit.distance);
                player.wait_until_end();
            }
            outcome => anyhow::bail!("Could not play song {}: {outcome}", hit.song_id),
        }
    }

    Ok(())
}

/// Print the fixed emotion→coordinate table.
fn print_emotion_table() {
    println!("emotion    valence  arousal");
    for emotion in Emotion::ALL {
        let point = emotion.affect();
        println!(
            "{:<10} {:+.2}    {:+.2}",
            emotion.label(),
            point.valence,
            point.arousal
        );
    }
}
