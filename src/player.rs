//! # Playback Module
//!
//! Song playback over rodio, with the arbitration rules the session loop
//! relies on: restarting the track that is already playing succeeds without
//! a reload, song changes are rate limited, and broken files are rejected
//! with a reason instead of an error.
//!
//! The arbitration itself lives in [`PlayGate`], which knows nothing about
//! audio hardware; [`RodioPlayer`] wraps it around an output stream
//! obtained through a three-step fallback ladder (default config, then
//! 44.1 kHz stereo, then 22.05 kHz mono).

use crate::config::Settings;
use anyhow::{Context, Result};
use log::{debug, info, warn};
use rodio::cpal::traits::{DeviceTrait, HostTrait};
use rodio::cpal::SampleRate;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
use std::fmt;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Result of one play request. Only `Started` changes what is audible;
/// `AlreadyPlaying` is the success that did no work.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayOutcome {
    /// Playback of the requested track began.
    Started,
    /// The requested track was already playing; nothing was reloaded.
    AlreadyPlaying,
    /// A different track started less than the minimum interval ago.
    TooSoon { remaining: Duration },
    /// The file does not exist.
    FileMissing,
    /// The file exists but has zero length.
    FileEmpty,
    /// The decoder or sink failed while starting the track.
    LoadFailed(String),
}

impl PlayOutcome {
    /// Whether the requested track is playing after the call.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, PlayOutcome::Started | PlayOutcome::AlreadyPlaying)
    }
}

impl fmt::Display for PlayOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayOutcome::Started => f.write_str("started"),
            PlayOutcome::AlreadyPlaying => f.write_str("already playing"),
            PlayOutcome::TooSoon { remaining } => {
                write!(f, "too soon ({:.1}s remaining)", remaining.as_secs_f64())
            }
            PlayOutcome::FileMissing => f.write_str("file missing"),
            PlayOutcome::FileEmpty => f.write_str("file empty"),
            PlayOutcome::LoadFailed(reason) => write!(f, "load failed: {reason}"),
        }
    }
}

/// Snapshot of the controller state. `current_song` is Some exactly while
/// something is audible.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackStatus {
    pub is_playing: bool,
    pub current_song: Option<PathBuf>,
    pub volume: f32,
}

/// Which rung of the output ladder the stream initialized at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioTier {
    Default,
    CdStereo,
    LowMono,
}

impl fmt::Display for AudioTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioTier::Default => f.write_str("system default"),
            AudioTier::CdStereo => f.write_str("44100 Hz stereo"),
            AudioTier::LowMono => f.write_str("22050 Hz mono"),
        }
    }
}

/// Playback as the session loop sees it. `RodioPlayer` is the production
/// implementation; tests drive the loop with a scripted one.
pub trait Playback {
    fn play_song(&mut self, path: &Path) -> PlayOutcome;
    fn stop_song(&mut self);
    /// Clamps to [0, 1], applies to the active output, returns the value
    /// actually set.
    fn set_volume(&mut self, volume: f32) -> f32;
    fn status(&self) -> PlaybackStatus;
}

/// Volume values from settings, flags or callers all pass through here.
pub fn clamp_volume(volume: f32) -> f32 {
    volume.clamp(0.0, 1.0)
}

/// What the gate decided about a play request.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    AlreadyPlaying,
    TooSoon { remaining: Duration },
    FileMissing,
    FileEmpty,
    Accept,
}

/// Hardware-free arbitration for play requests.
///
/// Checks run in a fixed order: same-song idempotence first (so repeating
/// the current track is never rate limited), then the minimum interval
/// since the last successful start, then the on-disk checks. The gate only
/// tracks what it needs for those rules; the audio state lives with the
/// player.
#[derive(Debug)]
pub struct PlayGate {
    current_song: Option<PathBuf>,
    last_play_time: Option<Instant>,
    min_interval: Duration,
}

impl PlayGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            current_song: None,
            last_play_time: None,
            min_interval,
        }
    }

    /// Decide a request. `playing` is whether audio is currently audible;
    /// the same-song rule only applies while it is.
    pub fn admit(&self, path: &Path, playing: bool) -> Admission {
        if playing && self.current_song.as_deref() == Some(path) {
            return Admission::AlreadyPlaying;
        }
        if let Some(last) = self.last_play_time {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                return Admission::TooSoon {
                    remaining: self.min_interval - elapsed,
                };
            }
        }
        match fs::metadata(path) {
            Err(_) => Admission::FileMissing,
            Ok(metadata) if metadata.len() == 0 => Admission::FileEmpty,
            Ok(_) => Admission::Accept,
        }
    }

    /// Record a successful start. The rate limit counts from here.
    pub fn record_start(&mut self, path: &Path) {
        self.current_song = Some(path.to_path_buf());
        self.last_play_time = Some(Instant::now());
    }

    /// Record that playback ended. The rate limit is about song changes,
    /// so the last start time survives a stop.
    pub fn record_stop(&mut self) {
        self.current_song = None;
    }

    pub fn current_song(&self) -> Option<&Path> {
        self.current_song.as_deref()
    }
}

/// The production playback controller.
pub struct RodioPlayer {
    // The stream must outlive the sink; dropping it kills audio
    _stream: OutputStream,
    handle: OutputStreamHandle,
    sink: Option<Sink>,
    gate: PlayGate,
    volume: f32,
    settle: Duration,
    tier: AudioTier,
}

impl RodioPlayer {
    /// Open an output stream via the fallback ladder and set up the
    /// controller with the configured volume and timings.
    ///
    /// # Errors
    ///
    /// Fails only when every rung of the ladder fails, which means no
    /// usable audio output exists on this machine.
    pub fn new(settings: &Settings) -> Result<Self> {
        let (stream, handle, tier) = open_output()?;
        info!("Audio output ready ({tier})");
        Ok(Self {
            _stream: stream,
            handle,
            sink: None,
            gate: PlayGate::new(settings.min_play_interval()),
            volume: clamp_volume(settings.volume),
            settle: settings.settle_delay(),
            tier,
        })
    }

    pub fn tier(&self) -> AudioTier {
        self.tier
    }

    /// Block until the current track finishes (one-shot playback).
    pub fn wait_until_end(&self) {
        if let Some(sink) = &self.sink {
            sink.sleep_until_end();
        }
    }

    fn is_playing(&self) -> bool {
        self.sink.as_ref().map_or(false, |sink| !sink.empty())
    }

    /// Fold a naturally drained track back into "nothing playing" before
    /// the next decision.
    fn sync(&mut self) {
        if let Some(sink) = &self.sink {
            if sink.empty() {
                debug!("Track drained, clearing current song");
                self.sink = None;
                self.gate.record_stop();
            }
        }
    }

    fn start_sink(&mut self, path: &Path) -> Result<()> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open audio file {}", path.display()))?;
        let decoder = Decoder::new(BufReader::new(file))
            .with_context(|| format!("Failed to decode audio file {}", path.display()))?;
        let sink = Sink::try_new(&self.handle).context("Failed to create audio sink")?;
        sink.set_volume(self.volume);
        sink.append(decoder);
        self.sink = Some(sink);
        Ok(())
    }
}

impl Playback for RodioPlayer {
    fn play_song(&mut self, path: &Path) -> PlayOutcome {
        self.sync();
        match self.gate.admit(path, self.is_playing()) {
            Admission::AlreadyPlaying => {
                debug!("Requested track is already playing: {}", path.display());
                PlayOutcome::AlreadyPlaying
            }
            Admission::TooSoon { remaining } => {
                debug!(
                    "Song change rejected, {:.2}s of the minimum interval left",
                    remaining.as_secs_f64()
                );
                PlayOutcome::TooSoon { remaining }
            }
            Admission::FileMissing => {
                warn!("Audio file missing: {}", path.display());
                PlayOutcome::FileMissing
            }
            Admission::FileEmpty => {
                warn!("Audio file is empty: {}", path.display());
                PlayOutcome::FileEmpty
            }
            Admission::Accept => {
                self.stop_song();
                std::thread::sleep(self.settle);
                match self.start_sink(path) {
                    Ok(()) => {
                        self.gate.record_start(path);
                        info!("Playing {}", path.display());
                        PlayOutcome::Started
                    }
                    Err(err) => {
                        warn!("Failed to start {}: {err:#}", path.display());
                        PlayOutcome::LoadFailed(format!("{err:#}"))
                    }
                }
            }
        }
    }

    fn stop_song(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
            self.gate.record_stop();
            debug!("Playback stopped");
        }
    }

    fn set_volume(&mut self, volume: f32) -> f32 {
        self.volume = clamp_volume(volume);
        if let Some(sink) = &self.sink {
            sink.set_volume(self.volume);
        }
        self.volume
    }

    fn status(&self) -> PlaybackStatus {
        let is_playing = self.is_playing();
        PlaybackStatus {
            is_playing,
            current_song: if is_playing {
                self.gate.current_song().map(Path::to_path_buf)
            } else {
                None
            },
            volume: self.volume,
        }
    }
}

/// Open an output stream, degrading through the ladder:
/// default config, then forced 44.1 kHz stereo, then forced 22.05 kHz mono.
fn open_output() -> Result<(OutputStream, OutputStreamHandle, AudioTier)> {
    match OutputStream::try_default() {
        Ok((stream, handle)) => return Ok((stream, handle, AudioTier::Default)),
        Err(err) => warn!("Default audio output failed: {err}"),
    }

    for (rate, channels, tier) in [
        (44_100, 2, AudioTier::CdStereo),
        (22_050, 1, AudioTier::LowMono),
    ] {
        match open_forced(rate, channels) {
            Ok((stream, handle)) => {
                info!("Audio output degraded to {tier}");
                return Ok((stream, handle, tier));
            }
            Err(err) => warn!("Audio output at {tier} failed: {err:#}"),
        }
    }

    anyhow::bail!("Could not initialize any audio output configuration")
}

fn open_forced(rate: u32, channels: u16) -> Result<(OutputStream, OutputStreamHandle)> {
    let host = rodio::cpal::default_host();
    let device = host
        .default_output_device()
        .context("No default audio output device")?;
    let config = device
        .supported_output_configs()
        .context("Failed to enumerate output configurations")?
        .filter(|config| config.channels() == channels)
        .find(|config| {
            config.min_sample_rate() <= SampleRate(rate)
                && SampleRate(rate) <= config.max_sample_rate()
        })
        .with_context(|| format!("No output configuration offers {channels} channel(s) at {rate} Hz"))?
        .with_sample_rate(SampleRate(rate));
    OutputStream::try_from_device_config(&device, config)
        .with_context(|| format!("Failed to open audio output at {rate} Hz"))
}
