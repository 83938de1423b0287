//! # Model Bundle Module
//!
//! Startup validation and parsing of the trained-model artifacts: the
//! emotion model itself (an opaque file, existence- and size-checked only),
//! the feature scaler (JSON with per-column `mean` and `scale` arrays) and
//! the ordered feature-column list (JSON array of names).
//!
//! The bundle is loaded once and kept on the session. Matching runs purely
//! on the annotation coordinates, so nothing here sits on the hot path;
//! a missing or unreadable artifact still aborts startup with guidance.

use crate::config::Settings;
use anyhow::{Context, Result};
use log::{info, warn};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Per-column standardization parameters, as exported from the trained
/// pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct FeatureScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl FeatureScaler {
    /// Standardize one feature vector: `(x - mean) / scale` per column.
    /// Zero-scale columns (constant in training) map to 0.
    #[must_use]
    pub fn transform(&self, features: &[f64]) -> Vec<f64> {
        features
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(&value, (&mean, &scale))| {
                if scale == 0.0 {
                    0.0
                } else {
                    (value - mean) / scale
                }
            })
            .collect()
    }

    /// Number of columns the scaler was fitted on.
    pub fn width(&self) -> usize {
        self.mean.len()
    }
}

/// The three artifacts, validated and parsed.
#[derive(Debug)]
pub struct ModelBundle {
    pub model_path: PathBuf,
    pub model_size: u64,
    pub scaler: FeatureScaler,
    pub feature_columns: Vec<String>,
}

impl ModelBundle {
    /// Load and validate the bundle from the configured model root.
    ///
    /// # Errors
    ///
    /// Fails when any of the three files is missing, empty or unparsable,
    /// or when the scaler's mean/scale arrays disagree in length.
    pub fn load(settings: &Settings) -> Result<Self> {
        let model_path = settings.model_path()?;
        let metadata = fs::metadata(&model_path)
            .with_context(|| format!("Emotion model not found: {}", model_path.display()))?;
        if metadata.len() == 0 {
            anyhow::bail!("Emotion model file is empty: {}", model_path.display());
        }

        let scaler = load_scaler(&settings.scaler_path()?)?;
        let feature_columns = load_feature_columns(&settings.feature_columns_path()?)?;
        if scaler.width() != feature_columns.len() {
            warn!(
                "Scaler covers {} columns but the column list names {}",
                scaler.width(),
                feature_columns.len()
            );
        }

        info!(
            "Model bundle loaded: {} ({} bytes), {} feature columns",
            model_path.display(),
            metadata.len(),
            feature_columns.len()
        );
        Ok(Self {
            model_path,
            model_size: metadata.len(),
            scaler,
            feature_columns,
        })
    }
}

fn load_scaler(path: &Path) -> Result<FeatureScaler> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Feature scaler not found: {}", path.display()))?;
    let scaler: FeatureScaler = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse feature scaler {}", path.display()))?;
    if scaler.mean.is_empty() {
        anyhow::bail!("Feature scaler {} has no columns", path.display());
    }
    if scaler.mean.len() != scaler.scale.len() {
        anyhow::bail!(
            "Feature scaler {} is inconsistent: {} means vs {} scales",
            path.display(),
            scaler.mean.len(),
            scaler.scale.len()
        );
    }
    Ok(scaler)
}

fn load_feature_columns(path: &Path) -> Result<Vec<String>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Feature column list not found: {}", path.display()))?;
    let columns: Vec<String> = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse feature column list {}", path.display()))?;
    if columns.is_empty() {
        anyhow::bail!("Feature column list {} is empty", path.display());
    }
    Ok(columns)
}
