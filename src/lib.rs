//! Emotion-driven music player: your face picks the song.
//!
//! MoodTune watches webcam frames, labels the facial emotion, maps the
//! label to a point in the valence/arousal plane and plays the song from a
//! DEAM-style dataset whose annotations sit closest to that point.
//!
//! Core modules:
//! - [`dataset`] - Feature/annotation ETL into the joined song table
//! - [`emotion`] - Detector adapter and the emotion→coordinate table
//! - [`matcher`] - Nearest-neighbor search with missing-file elimination
//! - [`player`] - rodio playback with rate limiting and idempotence
//! - [`session`] - The capture→classify→match→play loop
//!
//! ### Supporting Modules
//!
//! - [`config`] - Settings file, data directory and derived dataset paths
//! - [`capture`] - Frame type and the external capture command bridge
//! - [`models`] - Startup validation of the trained-model artifacts
//! - [`cli`] - Command-line interface definitions with clap integration
//! - [`completion`] - Shell completion generation
//!
//! ## Quick Start Example
//!
//! ```no_run
//! use moodtune::config::Settings;
//! use moodtune::dataset::SongLibrary;
//! use moodtune::emotion::Emotion;
//! use moodtune::matcher::SongMatcher;
//!
//! let settings = Settings::load()?;
//! let library = SongLibrary::load(&settings)?;
//! let mut matcher = SongMatcher::new(library.songs);
//!
//! // Find the song closest to a happy face
//! if let Some(hit) = matcher.find_matching_song(Emotion::Happy.affect()) {
//!     println!("song {} at distance {:.3}", hit.song_id, hit.distance);
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Pipeline Details
//!
//! The dataset loader collapses each song's feature time series into one
//! mean vector, joins it with the averaged valence/arousal annotations on
//! song id and imputes whatever numeric holes remain with column means.
//! Matching is plain Euclidean nearest-neighbor over the annotation
//! coordinates; songs whose audio file has gone missing are dropped from
//! the pool the first time they win.
//!
//! Emotion labels come from an external detector process (one PPM frame
//! in, one answer line out), so the actual face model can live in whatever
//! runtime suits it; `--simulate` replaces camera and detector with
//! synthetic stand-ins.
//!
//! ## Playback Rules
//!
//! - Re-requesting the track that is already playing succeeds without a
//!   reload.
//! - Song changes are rate limited to one per second.
//! - Missing or empty files are rejected with a typed outcome; the loop
//!   treats a missing file as a cue to eliminate the song.
//!
//! ## Error Handling
//!
//! Startup paths return `Result<T, anyhow::Error>` and fail loudly:
//! missing dataset pieces, an unusable model bundle or no working audio
//! output abort the run with guidance. Inside the loop nothing propagates;
//! detector failures degrade to "no face" and play rejections come back as
//! values.
//!
//! ## Testing
//!
//! Unit tests live next to each module; the CLI surface is covered by
//! integration tests. Run with:
//! ```bash
//! cargo test
//! ```

pub mod capture;
pub mod cli;
pub mod completion;
pub mod config;
pub mod dataset;
pub mod emotion;
pub mod matcher;
pub mod models;
pub mod player;
pub mod session;
