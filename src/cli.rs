//! # Command-Line Interface Module
//!
//! This module defines the command-line interface for MoodTune using Clap
//! derive macros. It provides a type-safe way to parse command-line
//! arguments and route them to appropriate functionality.
//!
//! ## Commands
//!
//! - `run`: Start the emotion-driven player loop
//! - `scan`: Load the dataset and print a summary
//! - `list`: Display the joined song table
//! - `match`: One-shot nearest-neighbor query
//! - `emotions`: Show the emotion coordinate table
//!
//! ## Examples
//!
//! ```bash
//! moodtune run --simulate
//! moodtune match 0.8 0.8
//! moodtune match --emotion sad --play
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shell types supported for completion generation
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    /// PowerShell
    PowerShell,
    /// Elvish shell
    Elvish,
}

/// Main application arguments structure.
///
/// Uses Clap derive macros to automatically generate argument parsing,
/// help text, and validation. The main structure contains only a subcommand
/// since all functionality is accessed through specific commands.
#[derive(Parser)]
#[command(name = "moodtune")]
#[command(about = "MoodTune: Music that follows your face - webcam emotions to matching songs")]
#[command(version)]
pub struct Args {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Enumeration of all available subcommands.
///
/// Each variant corresponds to a major piece of functionality in MoodTune.
/// Command arguments are embedded directly in the enum variants for
/// type safety and automatic validation.
#[derive(Subcommand)]
pub enum Command {
    /// Start the emotion-driven player
    ///
    /// Loads the dataset and the model bundle, opens the audio output and
    /// the webcam capture command, then loops: read a frame, detect the
    /// facial emotion, and play the song whose valence/arousal annotation
    /// sits closest to that emotion. Stop with Ctrl-C.
    ///
    /// Requires a configured detector command (settings.json) unless
    /// --simulate is given.
    Run {
        /// Run without a camera or detector
        ///
        /// Uses synthetic frames and a simulated emotion walk instead of
        /// the external capture/detector commands. Audio output is still
        /// real, so matched songs are audible.
        #[arg(long)]
        simulate: bool,

        /// Stop on its own after this many frames
        ///
        /// Without this flag the loop runs until Ctrl-C.
        #[arg(long)]
        frames: Option<u64>,

        /// Loop sleep between frames, in milliseconds
        ///
        /// Overrides the settings file (default 33 ms, about 30 fps).
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Initial playback volume, 0.0 to 1.0
        ///
        /// Values outside the range are clamped.
        #[arg(long)]
        volume: Option<f32>,

        /// Dataset root override
        ///
        /// Directory containing MEMD_audio/, features/ and annotations/.
        /// Defaults to the settings file, then the platform data directory.
        #[arg(long, env = "MOODTUNE_DATA_DIR")]
        data_dir: Option<PathBuf>,
    },

    /// Load the dataset and print a summary
    ///
    /// Runs the same ETL as `run` (feature aggregation, annotation join,
    /// imputation) and reports what came out: songs joined, files read and
    /// skipped, imputed cells and the annotation value ranges. Exits
    /// nonzero when the dataset is unusable.
    Scan {
        /// Dataset root override
        #[arg(long, env = "MOODTUNE_DATA_DIR")]
        data_dir: Option<PathBuf>,
    },

    /// List all songs in the joined table
    ///
    /// Prints one line per song: id, valence, arousal and the derived
    /// audio path. Songs lacking features or annotations never make it
    /// into the table and do not appear here.
    List {
        /// Dataset root override
        #[arg(long, env = "MOODTUNE_DATA_DIR")]
        data_dir: Option<PathBuf>,
    },

    /// One-shot nearest-neighbor query
    ///
    /// Give a target either as explicit coordinates (`match 0.8 0.8`) or
    /// as an emotion label (`match --emotion sad`). Prints the winning
    /// song and its distance; with --play the song is also played to
    /// completion.
    Match {
        /// Valence coordinate (pleasantness, roughly -1 to 1)
        #[arg(requires = "arousal")]
        valence: Option<f64>,

        /// Arousal coordinate (energy, roughly -1 to 1)
        #[arg(requires = "valence")]
        arousal: Option<f64>,

        /// Query with an emotion label instead of coordinates
        ///
        /// Accepts the seven canonical labels and common detector
        /// spellings (e.g. "fearful", "surprised").
        #[arg(long, conflicts_with_all = ["valence", "arousal"])]
        emotion: Option<String>,

        /// Play the matched song to completion before exiting
        #[arg(long)]
        play: bool,

        /// Dataset root override
        #[arg(long, env = "MOODTUNE_DATA_DIR")]
        data_dir: Option<PathBuf>,
    },

    /// Show the emotion coordinate table
    ///
    /// Prints the fixed seven-entry mapping from facial emotion to the
    /// valence/arousal target used for matching.
    Emotions,

    /// Generate shell completions
    ///
    /// Generates completion scripts for various shells to enable tab
    /// completion of commands and flags.
    ///
    /// Usage: moodtune completion bash > ~/.local/share/bash-completion/completions/moodtune
    Completion {
        /// Shell to generate completions for
        shell: Shell,
    },
}
