//! # Integration Tests for MoodTune
//!
//! End-to-end coverage through the library surface: a miniature dataset on
//! disk goes through the ETL, into the matcher, and around the session
//! loop, with external capabilities (detector, playback) faked the same
//! way production swaps them behind their traits.

use anyhow::Result;
use moodtune::config::{self, Settings};
use moodtune::emotion::AffectPoint;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Test helper to build a complete miniature dataset.
///
/// Three songs carry features and annotations: song 2 near "happy",
/// song 3 near "sad", song 5 near "surprise". Songs 2 and 3 have audio
/// files; song 5 deliberately does not, so elimination paths run.
fn create_test_dataset() -> Result<(TempDir, Settings)> {
    let temp_dir = TempDir::new()?;
    let root = temp_dir.path().join("DEAM_audio");
    fs::create_dir_all(root.join("features"))?;
    fs::create_dir_all(root.join("annotations"))?;
    fs::create_dir_all(root.join("MEMD_audio"))?;

    for id in [2u32, 3, 5] {
        fs::write(
            root.join(format!("features/{id}.csv")),
            "frameTime;pcm_RMSenergy\n0.5;0.2\n1.0;0.4\n",
        )?;
    }

    fs::write(
        root.join(format!("annotations/{}", config::ANNOTATION_FILES[0])),
        "song_id, valence_mean, arousal_mean\n2, 0.80, 0.70\n3, -0.75, -0.35\n",
    )?;
    fs::write(
        root.join(format!("annotations/{}", config::ANNOTATION_FILES[1])),
        "song_id, valence_mean, arousal_mean\n5, 0.35, 0.75\n",
    )?;

    fs::write(root.join("MEMD_audio/2.mp3"), b"fake mp3 bytes")?;
    fs::write(root.join("MEMD_audio/3.mp3"), b"fake mp3 bytes")?;
    // 5.mp3 intentionally absent

    let mut settings = Settings::default();
    settings.override_dataset_dir(Some(root));
    Ok((temp_dir, settings))
}

mod dataset_pipeline_tests {
    use super::*;
    use moodtune::dataset::SongLibrary;

    #[test]
    fn test_full_etl_produces_the_joined_table() -> Result<()> {
        let (_temp_dir, settings) = create_test_dataset()?;
        let library = SongLibrary::load(&settings)?;

        let ids: Vec<u32> = library.songs.iter().map(|s| s.song_id).collect();
        assert_eq!(ids, vec![2, 3, 5]);

        let happy = library.songs.iter().find(|s| s.song_id == 2).unwrap();
        assert!((happy.affect.valence - 0.80).abs() < 1e-9);
        assert!((happy.affect.arousal - 0.70).abs() < 1e-9);
        assert!(happy.audio_path.ends_with("MEMD_audio/2.mp3"));

        Ok(())
    }

    #[test]
    fn test_load_report_counts_the_file_scan() -> Result<()> {
        let (_temp_dir, settings) = create_test_dataset()?;
        let library = SongLibrary::load(&settings)?;
        let report = &library.report;

        let id_range = (config::LAST_SONG_ID - config::FIRST_SONG_ID + 1) as usize;
        assert_eq!(report.feature_files_read, 3);
        assert_eq!(report.feature_files_skipped, id_range - 3);
        assert_eq!(report.songs_joined, 3);
        assert_eq!(report.annotation_rows, 3);
        assert_eq!(report.imputed_cells, 0);
        assert_eq!(report.feature_columns, 2);

        Ok(())
    }

    #[test]
    fn test_missing_layout_fails_with_guidance() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let mut settings = Settings::default();
        settings.override_dataset_dir(Some(temp_dir.path().to_path_buf()));

        let err = SongLibrary::load(&settings).unwrap_err().to_string();
        assert!(err.contains("Features directory not found"));

        Ok(())
    }
}

mod matching_tests {
    use super::*;
    use moodtune::dataset::SongLibrary;
    use moodtune::emotion::Emotion;
    use moodtune::matcher::SongMatcher;

    #[test]
    fn test_emotion_targets_select_the_expected_songs() -> Result<()> {
        let (_temp_dir, settings) = create_test_dataset()?;
        let library = SongLibrary::load(&settings)?;
        let mut matcher = SongMatcher::new(library.songs);

        let happy = matcher.find_matching_song(Emotion::Happy.affect()).unwrap();
        assert_eq!(happy.song_id, 2);

        let sad = matcher.find_matching_song(Emotion::Sad.affect()).unwrap();
        assert_eq!(sad.song_id, 3);
        assert!(sad.distance < 0.1);

        Ok(())
    }

    #[test]
    fn test_missing_audio_falls_through_to_the_next_song() -> Result<()> {
        let (_temp_dir, settings) = create_test_dataset()?;
        let library = SongLibrary::load(&settings)?;
        let mut matcher = SongMatcher::new(library.songs);

        // Surprise sits on song 5, whose mp3 does not exist; the pool
        // drops it and answers with the next-nearest
        let hit = matcher
            .find_matching_song(Emotion::Surprise.affect())
            .unwrap();
        assert_eq!(hit.song_id, 2);
        assert_eq!(matcher.eliminated(), 1);
        assert_eq!(matcher.len(), 2);

        Ok(())
    }

    #[test]
    fn test_pool_exhaustion_after_all_audio_disappears() -> Result<()> {
        let (_temp_dir, settings) = create_test_dataset()?;
        let library = SongLibrary::load(&settings)?;

        for song in &library.songs {
            let _ = fs::remove_file(&song.audio_path);
        }
        let mut matcher = SongMatcher::new(library.songs);

        assert!(matcher.find_matching_song(AffectPoint::NEUTRAL).is_none());
        assert!(matcher.is_empty());

        Ok(())
    }
}

mod detector_command_tests {
    use super::*;
    use moodtune::capture::Frame;
    use moodtune::emotion::{Emotion, EmotionClassifier, EmotionReading};

    /// A shell one-liner standing in for a real detector process: drain
    /// the PPM frame from stdin, answer one line on stdout.
    fn shell_detector(answer: &str) -> Vec<String> {
        vec![
            "/bin/sh".to_string(),
            "-c".to_string(),
            format!("cat >/dev/null; echo {answer}"),
        ]
    }

    #[test]
    fn test_command_detector_roundtrip() -> Result<()> {
        let mut settings = Settings::default();
        settings.detector_command = Some(shell_detector("happy 0.91"));

        let mut classifier = EmotionClassifier::from_settings(&settings, false)?;
        let frame = Frame::solid(8, 8, [10, 20, 30]);

        match classifier.classify(&frame) {
            EmotionReading::Face { emotion, confidence } => {
                assert_eq!(emotion, Emotion::Happy);
                assert!((confidence - 0.91).abs() < 1e-9);
            }
            other => panic!("Expected a face reading, got {other:?}"),
        }

        Ok(())
    }

    #[test]
    fn test_command_detector_no_face_answer() -> Result<()> {
        let mut settings = Settings::default();
        settings.detector_command = Some(shell_detector("none"));

        let mut classifier = EmotionClassifier::from_settings(&settings, false)?;
        let frame = Frame::solid(8, 8, [0, 0, 0]);
        assert_eq!(classifier.classify(&frame), EmotionReading::NoFace);

        Ok(())
    }

    #[test]
    fn test_command_detector_failure_is_contained() -> Result<()> {
        let mut settings = Settings::default();
        settings.detector_command = Some(vec![
            "/bin/sh".to_string(),
            "-c".to_string(),
            "cat >/dev/null; exit 3".to_string(),
        ]);

        let mut classifier = EmotionClassifier::from_settings(&settings, false)?;
        let frame = Frame::solid(8, 8, [0, 0, 0]);
        match classifier.classify(&frame) {
            EmotionReading::Failed { reason } => assert!(reason.contains("exited")),
            other => panic!("Expected a failure reading, got {other:?}"),
        }

        Ok(())
    }
}

mod session_loop_tests {
    use super::*;
    use moodtune::capture::{Frame, SyntheticFrameSource};
    use moodtune::dataset::SongLibrary;
    use moodtune::emotion::{Detection, Emotion, EmotionBackend, EmotionClassifier};
    use moodtune::matcher::SongMatcher;
    use moodtune::player::{PlayOutcome, Playback, PlaybackStatus};
    use moodtune::session::Session;
    use std::time::Duration;

    struct ScriptedBackend {
        script: Vec<Result<Detection>>,
    }

    impl ScriptedBackend {
        fn new(mut script: Vec<Result<Detection>>) -> Self {
            script.reverse();
            Self { script }
        }
    }

    impl EmotionBackend for ScriptedBackend {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn detect(&mut self, _frame: &Frame) -> Result<Detection> {
            self.script.pop().unwrap_or(Ok(None))
        }
    }

    /// Idempotent fake player: starting the current track again reports
    /// `AlreadyPlaying`, everything else starts.
    struct RecordingPlayer {
        current: Option<PathBuf>,
    }

    impl RecordingPlayer {
        fn new() -> Self {
            Self { current: None }
        }
    }

    impl Playback for RecordingPlayer {
        fn play_song(&mut self, path: &Path) -> PlayOutcome {
            if self.current.as_deref() == Some(path) {
                PlayOutcome::AlreadyPlaying
            } else {
                self.current = Some(path.to_path_buf());
                PlayOutcome::Started
            }
        }

        fn stop_song(&mut self) {
            self.current = None;
        }

        fn set_volume(&mut self, volume: f32) -> f32 {
            volume.clamp(0.0, 1.0)
        }

        fn status(&self) -> PlaybackStatus {
            PlaybackStatus {
                is_playing: self.current.is_some(),
                current_song: self.current.clone(),
                volume: 0.5,
            }
        }
    }

    #[test]
    fn test_session_over_the_real_dataset() -> Result<()> {
        let (_temp_dir, settings) = create_test_dataset()?;
        let library = SongLibrary::load(&settings)?;
        let matcher = SongMatcher::new(library.songs);

        let script = vec![
            Ok(Some((Emotion::Happy, 0.9))),
            Ok(Some((Emotion::Happy, 0.9))),
            Ok(Some((Emotion::Surprise, 0.8))),
            Ok(None),
            Ok(Some((Emotion::Sad, 0.85))),
        ];
        let classifier = EmotionClassifier::new(Box::new(ScriptedBackend::new(script)));
        let source = Box::new(SyntheticFrameSource::new(4, 4));

        let report = Session::new(
            source,
            classifier,
            matcher,
            RecordingPlayer::new(),
            Duration::ZERO,
        )
        .with_frame_limit(Some(5))
        .run();

        assert_eq!(report.frames, 5);
        assert_eq!(report.faces, 4);
        // Happy starts song 2; the repeat and the surprise fallback both
        // land on the already-playing track; sad starts song 3
        assert_eq!(report.songs_started, 2);
        // Surprise's nearest song (5) had no audio file
        assert_eq!(report.eliminated_songs, 1);
        assert_eq!(report.detector_failures, 0);

        Ok(())
    }
}

mod configuration_tests {
    use super::*;

    #[test]
    fn test_data_directory_creation() -> Result<()> {
        let data_dir = config::get_data_dir()?;

        assert!(data_dir.exists());
        assert!(data_dir.is_dir());
        assert!(data_dir.is_absolute());

        Ok(())
    }

    #[test]
    fn test_settings_file_roundtrip() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{
                "dataset_dir": "/srv/deam",
                "detector_command": ["python3", "detector.py"],
                "volume": 0.9
            }"#,
        )?;

        let settings = Settings::load_from(&path)?;
        assert_eq!(settings.dataset_dir, Some(PathBuf::from("/srv/deam")));
        assert_eq!(
            settings.detector_command,
            Some(vec!["python3".to_string(), "detector.py".to_string()])
        );
        assert_eq!(settings.volume, 0.9);
        assert_eq!(settings.frame_width, 640);

        Ok(())
    }
}

mod cli_tests {
    use std::process::Command;

    #[test]
    fn test_cli_help_displays_correctly() {
        let output = Command::new("cargo")
            .args(["run", "--quiet", "--", "--help"])
            .output()
            .expect("Failed to run help command");

        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("moodtune"));
        assert!(stdout.contains("run"));
        assert!(stdout.contains("scan"));
        assert!(stdout.contains("match"));
        assert!(stdout.contains("emotions"));
    }

    #[test]
    fn test_emotions_table_prints() {
        let output = Command::new("cargo")
            .args(["run", "--quiet", "--", "emotions"])
            .output()
            .expect("Failed to run emotions command");

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("happy"));
        assert!(stdout.contains("+0.80"));
        assert!(stdout.contains("disgust"));
    }

    #[test]
    fn test_completion_generation() {
        let output = Command::new("cargo")
            .args(["run", "--quiet", "--", "completion", "bash"])
            .output()
            .expect("Failed to run completion command");

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("moodtune"));
        assert!(stdout.contains("complete"));
    }
}
