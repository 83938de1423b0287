//! # Frame Capture Module
//!
//! Produces webcam frames for the session loop. Decoding a camera is
//! delegated to an external capture command (ffmpeg by default) that writes
//! raw RGB24 frames to stdout; this module owns the frame type, the process
//! plumbing and a synthetic source for `--simulate` runs.
//!
//! The frame geometry is fixed per source, so one frame is always exactly
//! `width * height * 3` bytes and the reader can slice the byte stream with
//! `read_exact` alone. No container, no timestamps, no negotiation.

use crate::config::Settings;
use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::io::Read;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::time::Duration;

/// One RGB24 video frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Row-major RGB triplets, exactly `width * height * 3` bytes.
    pub pixels: Vec<u8>,
}

impl Frame {
    /// Bytes per frame at the given geometry.
    pub fn byte_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 3
    }

    /// Build a frame, validating the pixel buffer length.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = Self::byte_len(width, height);
        if pixels.len() != expected {
            anyhow::bail!(
                "Frame buffer has {} bytes, expected {} for {}x{}",
                pixels.len(),
                expected,
                width,
                height
            );
        }
        Ok(Self { width, height, pixels })
    }

    /// A single-color frame (synthetic source, tests).
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let mut pixels = Vec::with_capacity(Self::byte_len(width, height));
        for _ in 0..(width as usize * height as usize) {
            pixels.extend_from_slice(&rgb);
        }
        Self { width, height, pixels }
    }

    /// Encode as binary PPM (P6), the wire format for detector commands.
    #[must_use]
    pub fn to_ppm(&self) -> Vec<u8> {
        let mut out = format!("P6\n{} {}\n255\n", self.width, self.height).into_bytes();
        out.extend_from_slice(&self.pixels);
        out
    }
}

/// A producer of frames for the session loop.
pub trait FrameSource {
    /// Short source name for logs and the startup banner.
    fn name(&self) -> &'static str;

    /// Blocking read of the next frame.
    fn next_frame(&mut self) -> Result<Frame>;

    /// Release the underlying device/process. Idempotent; called on
    /// shutdown and from Drop where applicable.
    fn release(&mut self) {}
}

/// Default capture command: ffmpeg reading a V4L2 device, scaled to the
/// requested geometry, raw RGB24 on stdout.
pub fn default_capture_command(device: &str, width: u32, height: u32) -> Vec<String> {
    vec![
        "ffmpeg".to_string(),
        "-v".to_string(),
        "error".to_string(),
        "-f".to_string(),
        "v4l2".to_string(),
        "-video_size".to_string(),
        format!("{width}x{height}"),
        "-i".to_string(),
        device.to_string(),
        "-vf".to_string(),
        format!("scale={width}:{height}"),
        "-pix_fmt".to_string(),
        "rgb24".to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-".to_string(),
    ]
}

/// Frame source backed by an external capture process.
///
/// The child's stderr is inherited so device errors reach the terminal;
/// stdout carries nothing but frame bytes.
pub struct CommandFrameSource {
    child: Child,
    stdout: Option<ChildStdout>,
    width: u32,
    height: u32,
    program: String,
    frames_read: u64,
}

impl CommandFrameSource {
    /// Spawn the capture command and verify it survives startup.
    ///
    /// A command that exits non-zero right away (missing device, bad
    /// arguments) is reported as a startup failure instead of surfacing as
    /// an endless stream of read errors later.
    pub fn spawn(command: &[String], width: u32, height: u32) -> Result<Self> {
        if command.is_empty() {
            anyhow::bail!("Capture command is empty");
        }
        let program = command[0].clone();
        let mut child = Command::new(&program)
            .args(&command[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("Failed to spawn capture command '{program}'"))?;

        let stdout = child
            .stdout
            .take()
            .context("Capture process has no stdout handle")?;

        // Give a broken command a moment to fail before we commit to it
        std::thread::sleep(Duration::from_millis(150));
        if let Ok(Some(status)) = child.try_wait() {
            if !status.success() {
                anyhow::bail!("Capture command '{program}' exited immediately with {status}");
            }
        }

        info!("Capture command started: {}", command.join(" "));
        Ok(Self {
            child,
            stdout: Some(stdout),
            width,
            height,
            program,
            frames_read: 0,
        })
    }

    /// Spawn from settings, falling back to the default ffmpeg command on
    /// `/dev/video0`.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let command = settings.capture_command.clone().unwrap_or_else(|| {
            default_capture_command("/dev/video0", settings.frame_width, settings.frame_height)
        });
        Self::spawn(&command, settings.frame_width, settings.frame_height)
    }
}

impl FrameSource for CommandFrameSource {
    fn name(&self) -> &'static str {
        "capture-command"
    }

    fn next_frame(&mut self) -> Result<Frame> {
        let stdout = self
            .stdout
            .as_mut()
            .context("Capture stream already released")?;
        let mut pixels = vec![0u8; Frame::byte_len(self.width, self.height)];
        stdout.read_exact(&mut pixels).with_context(|| {
            format!(
                "Capture stream from '{}' ended after {} frames",
                self.program, self.frames_read
            )
        })?;
        self.frames_read += 1;
        Frame::new(self.width, self.height, pixels)
    }

    fn release(&mut self) {
        if self.stdout.take().is_some() {
            debug!(
                "Releasing capture command '{}' after {} frames",
                self.program, self.frames_read
            );
            if let Err(err) = self.child.kill() {
                warn!("Failed to kill capture command: {err}");
            }
            let _ = self.child.wait();
        }
    }
}

impl Drop for CommandFrameSource {
    fn drop(&mut self) {
        self.release();
    }
}

/// Camera-free frame source for `--simulate`: emits flat gray frames whose
/// shade drifts over time, at the configured geometry.
pub struct SyntheticFrameSource {
    width: u32,
    height: u32,
    tick: u64,
}

impl SyntheticFrameSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height, tick: 0 }
    }
}

impl FrameSource for SyntheticFrameSource {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn next_frame(&mut self) -> Result<Frame> {
        let shade = ((self.tick * 3) % 256) as u8;
        self.tick += 1;
        Ok(Frame::solid(self.width, self.height, [shade, shade, shade]))
    }
}

/// Pick a frame source: synthetic for simulation, otherwise the configured
/// (or default) capture command.
pub fn from_settings(settings: &Settings, simulate: bool) -> Result<Box<dyn FrameSource>> {
    if simulate {
        Ok(Box::new(SyntheticFrameSource::new(
            settings.frame_width,
            settings.frame_height,
        )))
    } else {
        Ok(Box::new(CommandFrameSource::from_settings(settings)?))
    }
}
