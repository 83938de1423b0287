//! # Configuration Module
//!
//! This module handles settings and data directory setup for MoodTune.
//! It provides platform-appropriate storage locations, derives every dataset
//! and model path from a single root, and loads optional user overrides from
//! a JSON settings file.
//!
//! ## Data Storage
//!
//! MoodTune expects its dataset under the platform-standard data directory:
//! - Linux: `~/.local/share/moodtune/`
//! - macOS: `~/Library/Application Support/moodtune/`
//! - Windows: `%APPDATA%\moodtune\`
//!
//! The DEAM-style layout inside the dataset root is fixed:
//! `MEMD_audio/` (one mp3 per song id), `features/` (one `;`-separated CSV
//! per song id) and `annotations/` (the two static annotation tables).
//!
//! ## Settings File
//!
//! `~/.config/moodtune/settings.json` (platform equivalent) can override the
//! dataset root, the capture/detector commands and the playback tunables.
//! Missing file means defaults; unknown keys are rejected by serde.

use anyhow::{Context, Result};
use path_absolutize::Absolutize;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// First DEAM song identifier with published features/annotations.
pub const FIRST_SONG_ID: u32 = 2;
/// Last DEAM song identifier (inclusive).
pub const LAST_SONG_ID: u32 = 2057;

/// Initial playback volume applied before the first track starts.
pub const DEFAULT_VOLUME: f32 = 0.5;
/// Minimum time between successful song starts.
pub const DEFAULT_MIN_PLAY_INTERVAL_MS: u64 = 1000;
/// Settle delay between stopping one track and starting the next.
pub const DEFAULT_SETTLE_MS: u64 = 100;
/// Loop sleep between frames; keeps the synthetic source near 30 fps.
pub const DEFAULT_FRAME_INTERVAL_MS: u64 = 33;
/// Capture geometry requested from the frame source.
pub const DEFAULT_FRAME_WIDTH: u32 = 640;
pub const DEFAULT_FRAME_HEIGHT: u32 = 480;

/// The two static annotation tables shipped with DEAM, concatenated by the
/// dataset loader. Duplicate song ids across the pair are averaged.
pub const ANNOTATION_FILES: [&str; 2] = [
    "static_annotations_averaged_songs_1_2000.csv",
    "static_annotations_averaged_songs_2000_2058.csv",
];

/// Returns the platform-appropriate data directory for MoodTune.
///
/// This function locates the standard data directory for the current platform
/// and creates the MoodTune subdirectory if it doesn't exist. The dataset and
/// model bundle live below this directory unless overridden in settings.
///
/// # Platform Behavior
///
/// - **Linux**: `~/.local/share/moodtune/`
/// - **macOS**: `~/Library/Application Support/moodtune/`
/// - **Windows**: `%APPDATA%\moodtune\`
///
/// # Returns
///
/// * `Ok(PathBuf)` - Path to the moodtune data directory
/// * `Err(anyhow::Error)` - If the data directory cannot be determined or created
///
/// # Errors
///
/// This function will return an error if:
/// - The system data directory cannot be determined
/// - The moodtune subdirectory cannot be created due to permissions
/// - The filesystem is read-only
///
/// # Examples
///
/// ```no_run
/// use moodtune::config::get_data_dir;
///
/// let data_dir = get_data_dir()?;
/// println!("Dataset root: {}", data_dir.display());
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn get_data_dir() -> Result<PathBuf> {
    // Get platform-appropriate data directory
    let data_dir = dirs::data_dir()
        .ok_or_else(|| anyhow::anyhow!(
            "Could not determine system data directory. Please ensure your platform supports standard data directories."
        ))?;

    // Create moodtune subdirectory
    let moodtune_dir = data_dir.join("moodtune");
    fs::create_dir_all(&moodtune_dir)
        .with_context(|| format!(
            "Failed to create MoodTune data directory at {}. Please check file permissions.",
            moodtune_dir.display()
        ))?;

    Ok(moodtune_dir)
}

/// Returns the path of the user settings file, creating its parent directory.
///
/// The file itself is optional; [`Settings::load`] falls back to defaults
/// when it does not exist.
pub fn get_settings_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!(
            "Could not determine system config directory. Please ensure your platform supports standard config directories."
        ))?;

    let moodtune_dir = config_dir.join("moodtune");
    fs::create_dir_all(&moodtune_dir)
        .with_context(|| format!(
            "Failed to create MoodTune config directory at {}. Please check file permissions.",
            moodtune_dir.display()
        ))?;

    Ok(moodtune_dir.join("settings.json"))
}

/// Normalize a user-supplied path without requiring it to exist.
///
/// Relative roots from the CLI or the settings file are anchored to the
/// current working directory so later joins and error messages are stable.
fn normalize_root(path: &Path) -> PathBuf {
    path.absolutize()
        .map(|p| p.into_owned())
        .unwrap_or_else(|_| path.to_path_buf())
}

/// User-tunable configuration, merged from the settings file, the
/// environment and CLI flags (highest precedence last).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Dataset root containing `MEMD_audio/`, `features/` and `annotations/`.
    /// Default: `<data_dir>/DEAM_audio`.
    pub dataset_dir: Option<PathBuf>,
    /// Model bundle root containing the model, scaler and feature-column
    /// files. Default: `<data_dir>/models`.
    pub models_dir: Option<PathBuf>,
    /// External capture command producing raw RGB24 frames on stdout.
    /// Default: ffmpeg reading `/dev/video0` (see `capture` module).
    pub capture_command: Option<Vec<String>>,
    /// External detector command consuming one PPM frame on stdin and
    /// answering with a single result line. None selects the simulated
    /// backend only when `--simulate` is passed; otherwise `run` refuses
    /// to start without a detector.
    pub detector_command: Option<Vec<String>>,
    /// Frame geometry requested from the capture command.
    pub frame_width: u32,
    pub frame_height: u32,
    /// Initial playback volume in [0, 1].
    pub volume: f32,
    /// Minimum milliseconds between successful song starts.
    pub min_play_interval_ms: u64,
    /// Milliseconds to wait between stopping a track and starting the next.
    pub settle_ms: u64,
    /// Loop sleep per frame, in milliseconds.
    pub frame_interval_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dataset_dir: None,
            models_dir: None,
            capture_command: None,
            detector_command: None,
            frame_width: DEFAULT_FRAME_WIDTH,
            frame_height: DEFAULT_FRAME_HEIGHT,
            volume: DEFAULT_VOLUME,
            min_play_interval_ms: DEFAULT_MIN_PLAY_INTERVAL_MS,
            settle_ms: DEFAULT_SETTLE_MS,
            frame_interval_ms: DEFAULT_FRAME_INTERVAL_MS,
        }
    }
}

impl Settings {
    /// Load settings from the default location, falling back to defaults
    /// when no file exists yet.
    pub fn load() -> Result<Self> {
        let path = get_settings_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load settings from an explicit file path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        let settings: Settings = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse settings file {}", path.display()))?;
        Ok(settings)
    }

    /// Apply a dataset root override from the CLI or environment. Takes
    /// precedence over the settings file.
    pub fn override_dataset_dir(&mut self, dir: Option<PathBuf>) {
        if let Some(dir) = dir {
            self.dataset_dir = Some(dir);
        }
    }

    /// Resolved dataset root.
    pub fn dataset_root(&self) -> Result<PathBuf> {
        match &self.dataset_dir {
            Some(dir) => Ok(normalize_root(dir)),
            None => Ok(get_data_dir()?.join("DEAM_audio")),
        }
    }

    /// Resolved model bundle root.
    pub fn models_root(&self) -> Result<PathBuf> {
        match &self.models_dir {
            Some(dir) => Ok(normalize_root(dir)),
            None => Ok(get_data_dir()?.join("models")),
        }
    }

    /// Directory holding one `<id>.mp3` per song.
    pub fn audio_dir(&self) -> Result<PathBuf> {
        Ok(self.dataset_root()?.join("MEMD_audio"))
    }

    /// Directory holding one `<id>.csv` feature file per song.
    pub fn features_dir(&self) -> Result<PathBuf> {
        Ok(self.dataset_root()?.join("features"))
    }

    /// The two annotation tables, in concatenation order.
    pub fn annotation_paths(&self) -> Result<[PathBuf; 2]> {
        let dir = self.dataset_root()?.join("annotations");
        Ok([dir.join(ANNOTATION_FILES[0]), dir.join(ANNOTATION_FILES[1])])
    }

    /// Opaque trained-model artifact; existence-checked at startup.
    pub fn model_path(&self) -> Result<PathBuf> {
        Ok(self.models_root()?.join("emotion_music_model.h5"))
    }

    /// Feature scaler parameters (JSON with `mean` and `scale` arrays).
    pub fn scaler_path(&self) -> Result<PathBuf> {
        Ok(self.models_root()?.join("feature_scaler.json"))
    }

    /// Ordered feature column names (JSON array of strings).
    pub fn feature_columns_path(&self) -> Result<PathBuf> {
        Ok(self.models_root()?.join("feature_columns.json"))
    }

    pub fn min_play_interval(&self) -> Duration {
        Duration::from_millis(self.min_play_interval_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    /// Verify that the dataset layout is present before the loader runs.
    ///
    /// Checks directories and the two annotation files; individual feature
    /// or audio files are allowed to be missing (the loader and matcher
    /// handle those per song).
    pub fn validate_dataset(&self) -> Result<()> {
        let features = self.features_dir()?;
        if !features.is_dir() {
            anyhow::bail!("Features directory not found: {}", features.display());
        }
        let audio = self.audio_dir()?;
        if !audio.is_dir() {
            anyhow::bail!("Audio directory not found: {}", audio.display());
        }
        for path in self.annotation_paths()? {
            if !path.is_file() {
                anyhow::bail!("Annotation file not found: {}", path.display());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings_values() {
        let settings = Settings::default();
        assert_eq!(settings.volume, DEFAULT_VOLUME);
        assert_eq!(settings.min_play_interval_ms, 1000);
        assert_eq!(settings.settle_ms, 100);
        assert_eq!(settings.frame_width, 640);
        assert_eq!(settings.frame_height, 480);
        assert!(settings.dataset_dir.is_none());
        assert!(settings.detector_command.is_none());
    }

    #[test]
    fn test_dataset_paths_derive_from_root() {
        let mut settings = Settings::default();
        settings.dataset_dir = Some(PathBuf::from("/data/deam"));

        assert_eq!(settings.audio_dir().unwrap(), PathBuf::from("/data/deam/MEMD_audio"));
        assert_eq!(settings.features_dir().unwrap(), PathBuf::from("/data/deam/features"));

        let annotations = settings.annotation_paths().unwrap();
        assert!(annotations[0]
            .to_string_lossy()
            .ends_with("annotations/static_annotations_averaged_songs_1_2000.csv"));
        assert!(annotations[1]
            .to_string_lossy()
            .ends_with("annotations/static_annotations_averaged_songs_2000_2058.csv"));
    }

    #[test]
    fn test_model_bundle_paths() {
        let mut settings = Settings::default();
        settings.models_dir = Some(PathBuf::from("/data/models"));

        assert_eq!(
            settings.model_path().unwrap(),
            PathBuf::from("/data/models/emotion_music_model.h5")
        );
        assert_eq!(
            settings.scaler_path().unwrap(),
            PathBuf::from("/data/models/feature_scaler.json")
        );
        assert_eq!(
            settings.feature_columns_path().unwrap(),
            PathBuf::from("/data/models/feature_columns.json")
        );
    }

    #[test]
    fn test_load_from_parses_overrides() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{
                "dataset_dir": "/srv/deam",
                "volume": 0.8,
                "frame_interval_ms": 50
            }"#,
        )
        .expect("Failed to write settings");

        let settings = Settings::load_from(&path).expect("Should parse settings");
        assert_eq!(settings.dataset_dir, Some(PathBuf::from("/srv/deam")));
        assert_eq!(settings.volume, 0.8);
        assert_eq!(settings.frame_interval_ms, 50);
        // Untouched keys keep their defaults
        assert_eq!(settings.min_play_interval_ms, 1000);
    }

    #[test]
    fn test_load_from_rejects_unknown_keys() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "volum": 0.8 }"#).expect("Failed to write settings");

        assert!(Settings::load_from(&path).is_err());
    }

    #[test]
    fn test_override_dataset_dir_precedence() {
        let mut settings = Settings {
            dataset_dir: Some(PathBuf::from("/from/file")),
            ..Settings::default()
        };

        settings.override_dataset_dir(None);
        assert_eq!(settings.dataset_dir, Some(PathBuf::from("/from/file")));

        settings.override_dataset_dir(Some(PathBuf::from("/from/cli")));
        assert_eq!(settings.dataset_dir, Some(PathBuf::from("/from/cli")));
    }

    #[test]
    fn test_validate_dataset_reports_missing_pieces() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let mut settings = Settings::default();
        settings.dataset_dir = Some(temp_dir.path().to_path_buf());

        let err = settings.validate_dataset().unwrap_err().to_string();
        assert!(err.contains("Features directory not found"));

        std::fs::create_dir_all(temp_dir.path().join("features")).unwrap();
        let err = settings.validate_dataset().unwrap_err().to_string();
        assert!(err.contains("Audio directory not found"));

        std::fs::create_dir_all(temp_dir.path().join("MEMD_audio")).unwrap();
        let err = settings.validate_dataset().unwrap_err().to_string();
        assert!(err.contains("Annotation file not found"));

        let annotations = temp_dir.path().join("annotations");
        std::fs::create_dir_all(&annotations).unwrap();
        for name in ANNOTATION_FILES {
            std::fs::write(annotations.join(name), "song_id,valence_mean,arousal_mean\n").unwrap();
        }
        assert!(settings.validate_dataset().is_ok());
    }

    #[test]
    fn test_normalize_root_absolute_passthrough() {
        let normalized = normalize_root(Path::new("/already/absolute"));
        assert_eq!(normalized, PathBuf::from("/already/absolute"));
    }
}
