//! # Session Module
//!
//! The single loop that ties the pipeline together: read a frame, classify
//! it, and when a face is present, match a song and ask the player for it.
//! Frames without a face (and detector failures) update nothing; the music
//! keeps playing whatever mood was last seen.
//!
//! The loop prints transitions only: an emotion line when the detected
//! label changes and a playing line when a track actually starts. Per-frame
//! chatter stays on the debug log. A cooperative stop flag (set by SIGINT
//! or an optional frame budget) ends the loop; shutdown stops playback and
//! releases the capture process before the summary is printed.

use crate::capture::FrameSource;
use crate::emotion::{Emotion, EmotionClassifier, EmotionReading};
use crate::matcher::SongMatcher;
use crate::player::{PlayOutcome, Playback};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Process-global stop flag. SIGINT flips it; the loop polls it once per
/// iteration, and each run clears it on entry.
static STOP: AtomicBool = AtomicBool::new(false);

/// Ask the running session to stop after the current iteration.
pub fn request_stop() {
    STOP.store(true, Ordering::SeqCst);
}

/// Whether a stop has been requested.
pub fn stop_requested() -> bool {
    STOP.load(Ordering::SeqCst)
}

/// Install the SIGINT handler that sets the stop flag, replacing the
/// default die-immediately behavior so shutdown can clean up.
pub fn install_sigint_handler() {
    extern "C" fn handle_sigint(_signal: libc::c_int) {
        STOP.store(true, Ordering::SeqCst);
    }
    let handler = handle_sigint as extern "C" fn(libc::c_int);
    unsafe {
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
    }
}

/// Counters gathered over one session, printed in the shutdown summary.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionReport {
    /// Frames successfully read from the source.
    pub frames: u64,
    /// Frames in which the detector saw a face.
    pub faces: u64,
    /// Tracks that actually started (idempotent repeats not counted).
    pub songs_started: u64,
    /// Detector failures (the loop degraded and moved on).
    pub detector_failures: u64,
    /// Songs dropped from the pool for missing audio files.
    pub eliminated_songs: usize,
}

/// One run of the pipeline. Owns every stage; nothing else touches the
/// matcher or the player while the session runs.
pub struct Session<P: Playback> {
    frames: Box<dyn FrameSource>,
    classifier: EmotionClassifier,
    matcher: SongMatcher,
    player: P,
    frame_interval: Duration,
    max_frames: Option<u64>,
}

impl<P: Playback> Session<P> {
    pub fn new(
        frames: Box<dyn FrameSource>,
        classifier: EmotionClassifier,
        matcher: SongMatcher,
        player: P,
        frame_interval: Duration,
    ) -> Self {
        Self {
            frames,
            classifier,
            matcher,
            player,
            frame_interval,
            max_frames: None,
        }
    }

    /// Stop on its own after this many frames (demo runs and tests).
    #[must_use]
    pub fn with_frame_limit(mut self, max_frames: Option<u64>) -> Self {
        self.max_frames = max_frames;
        self
    }

    /// Run until stop is requested or the frame budget is spent, then shut
    /// down and report. A stop request belongs to one run: anything left
    /// over from an earlier run in this process is cleared on entry.
    pub fn run(mut self) -> SessionReport {
        STOP.store(false, Ordering::SeqCst);
        let mut report = SessionReport::default();
        let mut last_emotion: Option<Emotion> = None;
        let mut pool_exhausted = false;

        info!(
            "Session started ({} source, {} songs in pool)",
            self.frames.name(),
            self.matcher.len()
        );

        while !stop_requested() {
            if self.max_frames.is_some_and(|max| report.frames >= max) {
                debug!("Frame budget reached");
                break;
            }

            let frame = match self.frames.next_frame() {
                Ok(frame) => frame,
                Err(err) => {
                    warn!("Frame read failed, skipping iteration: {err:#}");
                    std::thread::sleep(self.frame_interval);
                    continue;
                }
            };
            report.frames += 1;

            let reading = self.classifier.classify(&frame);
            if matches!(reading, EmotionReading::Failed { .. }) {
                report.detector_failures += 1;
            }

            // Only a detected face drives the music; empty frames leave
            // the current track alone
            if let Some(emotion) = reading.emotion() {
                report.faces += 1;
                if last_emotion != Some(emotion) {
                    println!("EMOTION: {emotion} ({})", emotion.affect());
                    last_emotion = Some(emotion);
                }

                match self.matcher.find_matching_song(emotion.affect()) {
                    Some(hit) => match self.player.play_song(&hit.audio_path) {
                        PlayOutcome::Started => {
                            report.songs_started += 1;
                            println!("♫ PLAYING: song {} (distance {:.3})", hit.song_id, hit.distance);
                        }
                        outcome => {
                            debug!("Play request for song {}: {outcome}", hit.song_id);
                        }
                    },
                    None => {
                        if !pool_exhausted {
                            warn!("Song pool exhausted, nothing left to play");
                            pool_exhausted = true;
                        }
                    }
                }
            }

            std::thread::sleep(self.frame_interval);
        }

        self.shutdown(&mut report);
        report
    }

    fn shutdown(&mut self, report: &mut SessionReport) {
        self.player.stop_song();
        self.frames.release();
        report.eliminated_songs = self.matcher.eliminated();
        println!(
            "⏹ STOPPED: {} frames, {} faces, {} songs started, {} detector failures, {} songs eliminated",
            report.frames,
            report.faces,
            report.songs_started,
            report.detector_failures,
            report.eliminated_songs
        );
    }
}
