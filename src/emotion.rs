//! # Emotion Classification Module
//!
//! Turns webcam frames into (valence, arousal) targets for the song matcher.
//! The heavy lifting (face detection, expression inference) is delegated to
//! an external detector behind the [`EmotionBackend`] trait; this module owns
//! the categorical label set, the fixed label→coordinate table and the
//! conversion of backend answers into [`EmotionReading`] values the session
//! loop can act on.
//!
//! ## Reading Shapes
//!
//! A frame produces exactly one of three shapes, and callers can tell them
//! apart instead of everything collapsing to a default:
//! - `Face { emotion, confidence }` - a face was found and labeled
//! - `NoFace` - the detector ran fine but saw nobody
//! - `Failed { reason }` - the detector itself broke (logged, not fatal)
//!
//! All three expose an affect coordinate; the latter two sit at the neutral
//! origin (0, 0).

use crate::capture::Frame;
use crate::config::Settings;
use anyhow::{Context, Result};
use lazy_static::lazy_static;
use log::{debug, warn};
use rand::seq::SliceRandom;
use rand::{thread_rng, Rng};
use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::process::{Command, Stdio};

/// The seven facial emotions the pipeline understands.
///
/// The set and its coordinates are fixed; detectors emitting anything else
/// are treated as "no detection" rather than guessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Emotion {
    Happy,
    Sad,
    Angry,
    Neutral,
    Fear,
    Surprise,
    Disgust,
}

/// A point in the valence/arousal plane.
///
/// Valence runs negative (unpleasant) to positive (pleasant), arousal from
/// calm to excited. Dataset annotations normalized to roughly [-1, 1] line
/// up with the emotion table below; nothing validates the range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffectPoint {
    pub valence: f64,
    pub arousal: f64,
}

impl AffectPoint {
    /// The origin; where "no face" and "unknown" land.
    pub const NEUTRAL: AffectPoint = AffectPoint { valence: 0.0, arousal: 0.0 };

    pub fn new(valence: f64, arousal: f64) -> Self {
        Self { valence, arousal }
    }

    /// Euclidean distance to another point. This is the only geometry the
    /// matcher uses.
    #[must_use]
    pub fn distance_to(&self, other: &AffectPoint) -> f64 {
        let dv = self.valence - other.valence;
        let da = self.arousal - other.arousal;
        (dv * dv + da * da).sqrt()
    }
}

impl fmt::Display for AffectPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "valence {:+.2}, arousal {:+.2}", self.valence, self.arousal)
    }
}

lazy_static! {
    /// Accepted detector spellings per emotion. Different detector families
    /// disagree on label forms ("fear" vs "fearful", "surprise" vs
    /// "surprised"); all known spellings resolve to the canonical variant.
    static ref LABEL_ALIASES: HashMap<&'static str, Emotion> = {
        let mut m = HashMap::new();
        for emotion in Emotion::ALL {
            m.insert(emotion.label(), emotion);
        }
        m.insert("happiness", Emotion::Happy);
        m.insert("sadness", Emotion::Sad);
        m.insert("anger", Emotion::Angry);
        m.insert("fearful", Emotion::Fear);
        m.insert("scared", Emotion::Fear);
        m.insert("surprised", Emotion::Surprise);
        m.insert("disgusted", Emotion::Disgust);
        m.insert("calm", Emotion::Neutral);
        m
    };
}

impl Emotion {
    /// Every variant, in a stable order (used by completions, the
    /// `emotions` command and the simulated backend).
    pub const ALL: [Emotion; 7] = [
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Angry,
        Emotion::Neutral,
        Emotion::Fear,
        Emotion::Surprise,
        Emotion::Disgust,
    ];

    /// Canonical lowercase label, matching the FER-style detector output.
    pub fn label(self) -> &'static str {
        match self {
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Angry => "angry",
            Emotion::Neutral => "neutral",
            Emotion::Fear => "fear",
            Emotion::Surprise => "surprise",
            Emotion::Disgust => "disgust",
        }
    }

    /// Parse a detector label, accepting known aliases. Case-insensitive,
    /// surrounding whitespace ignored. Unknown labels yield None.
    pub fn from_label(label: &str) -> Option<Emotion> {
        LABEL_ALIASES.get(label.trim().to_lowercase().as_str()).copied()
    }

    /// The fixed categorical→coordinate table.
    ///
    /// | label    | valence | arousal |
    /// |----------|---------|---------|
    /// | happy    |  0.8    |  0.8    |
    /// | sad      | -0.8    | -0.4    |
    /// | angry    | -0.7    |  0.8    |
    /// | neutral  |  0.0    |  0.0    |
    /// | fear     | -0.8    |  0.5    |
    /// | surprise |  0.4    |  0.8    |
    /// | disgust  | -0.8    |  0.1    |
    #[must_use]
    pub fn affect(self) -> AffectPoint {
        match self {
            Emotion::Happy => AffectPoint::new(0.8, 0.8),
            Emotion::Sad => AffectPoint::new(-0.8, -0.4),
            Emotion::Angry => AffectPoint::new(-0.7, 0.8),
            Emotion::Neutral => AffectPoint::NEUTRAL,
            Emotion::Fear => AffectPoint::new(-0.8, 0.5),
            Emotion::Surprise => AffectPoint::new(0.4, 0.8),
            Emotion::Disgust => AffectPoint::new(-0.8, 0.1),
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome of classifying one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum EmotionReading {
    /// A face was detected and labeled.
    Face { emotion: Emotion, confidence: f64 },
    /// The detector ran but found no face in the frame.
    NoFace,
    /// The detector itself failed; the loop degrades to neutral but the
    /// failure stays visible to callers and counters.
    Failed { reason: String },
}

impl EmotionReading {
    /// The affect target this reading contributes. Non-face shapes sit at
    /// the neutral origin.
    #[must_use]
    pub fn affect(&self) -> AffectPoint {
        match self {
            EmotionReading::Face { emotion, .. } => emotion.affect(),
            EmotionReading::NoFace | EmotionReading::Failed { .. } => AffectPoint::NEUTRAL,
        }
    }

    /// Whether a face was detected. The session loop only matches and plays
    /// on face-bearing frames.
    #[must_use]
    pub fn has_face(&self) -> bool {
        matches!(self, EmotionReading::Face { .. })
    }

    /// Detected emotion, if any.
    pub fn emotion(&self) -> Option<Emotion> {
        match self {
            EmotionReading::Face { emotion, .. } => Some(*emotion),
            _ => None,
        }
    }
}

/// One raw detector answer: a labeled face with confidence, or no face.
pub type Detection = Option<(Emotion, f64)>;

/// A face-emotion detector the classifier can delegate to.
///
/// Implementations return `Ok(Some(..))` for a labeled face, `Ok(None)` when
/// no face is present and `Err` only for real backend failures (process
/// died, protocol garbage). The classifier translates those into
/// [`EmotionReading`] shapes.
pub trait EmotionBackend {
    /// Short backend name for logs and the startup banner.
    fn name(&self) -> &'static str;

    /// Inspect one frame.
    fn detect(&mut self, frame: &Frame) -> Result<Detection>;
}

/// Parse one detector answer line.
///
/// Accepted forms: `none` (or an empty line) for no face, and
/// `<label> [confidence]` for a detection. Unknown labels and unparsable
/// confidences are logged and treated as no detection rather than guessed.
pub fn parse_detector_line(line: &str) -> Detection {
    let line = line.trim();
    if line.is_empty() || line.eq_ignore_ascii_case("none") {
        return None;
    }

    let mut parts = line.split_whitespace();
    let raw_label = parts.next()?;
    let Some(emotion) = Emotion::from_label(raw_label) else {
        warn!("Detector produced unknown label '{raw_label}', treating as no detection");
        return None;
    };

    let confidence = match parts.next() {
        Some(raw) => match raw.parse::<f64>() {
            Ok(value) => value.clamp(0.0, 1.0),
            Err(_) => {
                warn!("Detector produced unparsable confidence '{raw}', treating as no detection");
                return None;
            }
        },
        // Detectors that only emit a label count as fully confident
        None => 1.0,
    };

    Some((emotion, confidence))
}

/// Detector bridged over a child process.
///
/// Each frame is piped to the configured command as a binary PPM image on
/// stdin; the command answers with a single line on stdout (see
/// [`parse_detector_line`]). One process per frame keeps the protocol
/// trivial and lets the detector be written in whatever runtime hosts the
/// actual model.
pub struct CommandBackend {
    command: Vec<String>,
}

impl CommandBackend {
    pub fn new(command: Vec<String>) -> Result<Self> {
        if command.is_empty() {
            anyhow::bail!("Detector command is empty");
        }
        Ok(Self { command })
    }
}

impl EmotionBackend for CommandBackend {
    fn name(&self) -> &'static str {
        "command"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Detection> {
        let program = &self.command[0];
        let mut child = Command::new(program)
            .args(&self.command[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to spawn detector command '{program}'"))?;

        // Closing stdin signals end-of-frame to the detector
        let mut stdin = child
            .stdin
            .take()
            .context("Detector process has no stdin handle")?;
        stdin
            .write_all(&frame.to_ppm())
            .context("Failed to write frame to detector")?;
        drop(stdin);

        let output = child
            .wait_with_output()
            .context("Failed to collect detector output")?;
        if !output.status.success() {
            anyhow::bail!("Detector '{program}' exited with {}", output.status);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let line = stdout.lines().next().unwrap_or("");
        debug!("Detector answer: '{line}'");
        Ok(parse_detector_line(line))
    }
}

/// Random-walk detector for demo runs without a camera or model.
///
/// Holds each mood for a few dozen frames before wandering to the next one,
/// with occasional no-face stretches, so the downstream pipeline sees
/// realistic transition patterns.
pub struct SimulatedBackend {
    current: Detection,
    frames_left: u32,
}

impl SimulatedBackend {
    pub fn new() -> Self {
        Self { current: None, frames_left: 0 }
    }
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl EmotionBackend for SimulatedBackend {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Detection> {
        let mut rng = thread_rng();
        if self.frames_left == 0 {
            self.frames_left = rng.gen_range(30..120);
            self.current = if rng.gen::<f64>() < 0.15 {
                None
            } else {
                Emotion::ALL
                    .choose(&mut rng)
                    .map(|&emotion| (emotion, rng.gen_range(0.70..0.99)))
            };
        }
        self.frames_left -= 1;
        Ok(self.current)
    }
}

/// Converts backend answers into [`EmotionReading`] values.
pub struct EmotionClassifier {
    backend: Box<dyn EmotionBackend>,
}

impl EmotionClassifier {
    pub fn new(backend: Box<dyn EmotionBackend>) -> Self {
        Self { backend }
    }

    /// Pick a backend from settings: the configured detector command, or the
    /// simulated backend when `simulate` is set.
    pub fn from_settings(settings: &Settings, simulate: bool) -> Result<Self> {
        if simulate {
            return Ok(Self::new(Box::new(SimulatedBackend::new())));
        }
        match &settings.detector_command {
            Some(command) => Ok(Self::new(Box::new(CommandBackend::new(command.clone())?))),
            None => anyhow::bail!(
                "No detector_command configured. Set one in settings.json or pass --simulate."
            ),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Classify one frame. Backend failures are logged and surfaced as the
    /// `Failed` shape; nothing propagates out of the loop.
    pub fn classify(&mut self, frame: &Frame) -> EmotionReading {
        match self.backend.detect(frame) {
            Ok(Some((emotion, confidence))) => EmotionReading::Face { emotion, confidence },
            Ok(None) => EmotionReading::NoFace,
            Err(err) => {
                warn!("Emotion detection failed: {err:#}");
                EmotionReading::Failed { reason: err.to_string() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Backend that replays a fixed script of answers.
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

    fn blank_frame() -> Frame {
        Frame::solid(4, 4, [0, 0, 0])
    }

    #[test]
    fn test_affect_table_exact_values() {
        assert_eq!(Emotion::Happy.affect(), AffectPoint::new(0.8, 0.8));
        assert_eq!(Emotion::Sad.affect(), AffectPoint::new(-0.8, -0.4));
        assert_eq!(Emotion::Angry.affect(), AffectPoint::new(-0.7, 0.8));
        assert_eq!(Emotion::Neutral.affect(), AffectPoint::NEUTRAL);
        assert_eq!(Emotion::Fear.affect(), AffectPoint::new(-0.8, 0.5));
        assert_eq!(Emotion::Surprise.affect(), AffectPoint::new(0.4, 0.8));
        assert_eq!(Emotion::Disgust.affect(), AffectPoint::new(-0.8, 0.1));
    }

    #[test]
    fn test_from_label_canonical_and_aliases() {
        assert_eq!(Emotion::from_label("happy"), Some(Emotion::Happy));
        assert_eq!(Emotion::from_label("  HAPPY "), Some(Emotion::Happy));
        assert_eq!(Emotion::from_label("happiness"), Some(Emotion::Happy));
        assert_eq!(Emotion::from_label("fearful"), Some(Emotion::Fear));
        assert_eq!(Emotion::from_label("surprised"), Some(Emotion::Surprise));
        assert_eq!(Emotion::from_label("disgusted"), Some(Emotion::Disgust));
        assert_eq!(Emotion::from_label("anger"), Some(Emotion::Angry));
        assert_eq!(Emotion::from_label("bored"), None);
        assert_eq!(Emotion::from_label(""), None);
    }

    #[test]
    fn test_distance_is_euclidean() {
        let a = AffectPoint::new(0.0, 0.0);
        let b = AffectPoint::new(3.0, 4.0);
        assert!((a.distance_to(&b) - 5.0).abs() < 1e-12);
        assert!((b.distance_to(&a) - 5.0).abs() < 1e-12);
        assert_eq!(a.distance_to(&a), 0.0);
    }

    #[test]
    fn test_non_face_readings_are_neutral() {
        assert_eq!(EmotionReading::NoFace.affect(), AffectPoint::NEUTRAL);
        let failed = EmotionReading::Failed { reason: "boom".to_string() };
        assert_eq!(failed.affect(), AffectPoint::NEUTRAL);
        assert!(!failed.has_face());
        assert!(failed.emotion().is_none());
    }

    #[test]
    fn test_neutral_face_is_still_a_face() {
        let reading = EmotionReading::Face { emotion: Emotion::Neutral, confidence: 0.9 };
        assert!(reading.has_face());
        assert_eq!(reading.affect(), AffectPoint::NEUTRAL);
        assert_eq!(reading.emotion(), Some(Emotion::Neutral));
    }

    #[test]
    fn test_parse_detector_line_forms() {
        assert_eq!(parse_detector_line("happy 0.93"), Some((Emotion::Happy, 0.93)));
        assert_eq!(parse_detector_line("happy"), Some((Emotion::Happy, 1.0)));
        assert_eq!(parse_detector_line("surprised 0.5"), Some((Emotion::Surprise, 0.5)));
        assert_eq!(parse_detector_line("  sad  0.4  "), Some((Emotion::Sad, 0.4)));
        assert_eq!(parse_detector_line("none"), None);
        assert_eq!(parse_detector_line("NONE"), None);
        assert_eq!(parse_detector_line(""), None);
        assert_eq!(parse_detector_line("confused 0.9"), None);
        assert_eq!(parse_detector_line("happy not-a-number"), None);
        // Out-of-range confidence clamps instead of failing
        assert_eq!(parse_detector_line("angry 1.7"), Some((Emotion::Angry, 1.0)));
    }

    #[test]
    fn test_classifier_translates_backend_answers() {
        let backend = ScriptedBackend::new(vec![
            Ok(Some((Emotion::Happy, 0.9))),
            Ok(None),
            Err(anyhow::anyhow!("detector crashed")),
        ]);
        let mut classifier = EmotionClassifier::new(Box::new(backend));
        let frame = blank_frame();

        assert_eq!(
            classifier.classify(&frame),
            EmotionReading::Face { emotion: Emotion::Happy, confidence: 0.9 }
        );
        assert_eq!(classifier.classify(&frame), EmotionReading::NoFace);
        match classifier.classify(&frame) {
            EmotionReading::Failed { reason } => assert!(reason.contains("detector crashed")),
            other => panic!("Expected Failed reading, got {other:?}"),
        }
    }

    #[test]
    fn test_simulated_backend_stays_in_label_set() {
        let mut backend = SimulatedBackend::new();
        let frame = blank_frame();
        for _ in 0..300 {
            match backend.detect(&frame).expect("Simulation never errors") {
                Some((emotion, confidence)) => {
                    assert!(Emotion::ALL.contains(&emotion));
                    assert!((0.70..1.0).contains(&confidence));
                }
                None => {}
            }
        }
    }

    #[test]
    fn test_from_settings_requires_detector_or_simulation() {
        let settings = Settings::default();
        assert!(EmotionClassifier::from_settings(&settings, false).is_err());
        let classifier = EmotionClassifier::from_settings(&settings, true)
            .expect("Simulation needs no detector");
        assert_eq!(classifier.backend_name(), "simulated");
    }

    #[test]
    fn test_command_backend_rejects_empty_command() {
        assert!(CommandBackend::new(Vec::new()).is_err());
        assert!(CommandBackend::new(vec!["detector".to_string()]).is_ok());
    }
}
