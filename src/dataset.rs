//! # Dataset Module
//!
//! Loads the DEAM-style dataset into memory: one feature CSV per song
//! (a time series of acoustic descriptors, collapsed here into per-column
//! means) plus two annotation tables carrying the averaged valence/arousal
//! labels. Features and labels are joined on song id; whatever numeric
//! holes remain afterwards are filled with the column mean.
//!
//! The loader runs once at startup. Missing individual feature files are
//! expected (the dataset ships with gaps) and merely counted; a missing
//! annotation file or an empty joined table aborts the run.

use crate::config::{self, Settings};
use crate::emotion::AffectPoint;
use anyhow::{Context, Result};
use log::{debug, info, warn};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// One playable, annotated song after the join.
#[derive(Debug, Clone, PartialEq)]
pub struct SongRecord {
    pub song_id: u32,
    /// `<audio_dir>/<id>.mp3`. Existence is checked at match time, not here.
    pub audio_path: PathBuf,
    pub affect: AffectPoint,
}

/// Aggregated per-song feature vectors, aligned to a common width.
///
/// Held for the model bundle and diagnostics; the matching path never
/// reads it.
#[derive(Debug, Default)]
pub struct FeatureTable {
    pub width: usize,
    rows: BTreeMap<u32, Vec<f64>>,
}

impl FeatureTable {
    pub fn vector(&self, song_id: u32) -> Option<&[f64]> {
        self.rows.get(&song_id).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Counters and ranges gathered during the load, for the scan summary
/// and the startup banner.
#[derive(Debug, Default, Clone)]
pub struct LoadReport {
    pub feature_files_read: usize,
    pub feature_files_skipped: usize,
    pub annotation_rows: usize,
    pub duplicate_ids_merged: usize,
    pub songs_joined: usize,
    pub imputed_cells: usize,
    pub feature_columns: usize,
    pub valence_range: (f64, f64),
    pub arousal_range: (f64, f64),
}

/// The loaded dataset: joined song table plus the feature matrix.
#[derive(Debug)]
pub struct SongLibrary {
    pub songs: Vec<SongRecord>,
    pub features: FeatureTable,
    pub report: LoadReport,
}

impl SongLibrary {
    /// Run the full ETL against the configured dataset root.
    ///
    /// # Errors
    ///
    /// Fails when the dataset layout is invalid, an annotation file is
    /// missing or malformed, or the joined table comes out empty.
    pub fn load(settings: &Settings) -> Result<Self> {
        settings.validate_dataset()?;
        let mut report = LoadReport::default();

        let features = load_feature_vectors(&settings.features_dir()?, &mut report);
        let annotations = load_annotations(&settings.annotation_paths()?, &mut report)?;

        let audio_dir = settings.audio_dir()?;
        let mut songs = Vec::new();
        let mut matrix: Vec<(u32, Vec<f64>)> = Vec::new();
        for (&song_id, vector) in &features {
            let Some(&(valence, arousal)) = annotations.get(&song_id) else {
                debug!("Song {song_id} has features but no annotation, dropped");
                continue;
            };
            songs.push(SongRecord {
                song_id,
                audio_path: audio_dir.join(format!("{song_id}.mp3")),
                affect: AffectPoint::new(valence, arousal),
            });
            matrix.push((song_id, vector.clone()));
        }

        if songs.is_empty() {
            anyhow::bail!(
                "No songs carry both features and annotations under {}",
                settings.dataset_root()?.display()
            );
        }

        report.imputed_cells += impute_affect(&mut songs);
        report.imputed_cells += impute_features(&mut matrix);
        report.songs_joined = songs.len();
        report.valence_range = finite_range(songs.iter().map(|s| s.affect.valence));
        report.arousal_range = finite_range(songs.iter().map(|s| s.affect.arousal));

        let width = matrix.iter().map(|(_, v)| v.len()).max().unwrap_or(0);
        report.feature_columns = width;
        let features = FeatureTable {
            width,
            rows: matrix.into_iter().collect(),
        };

        info!(
            "Dataset loaded: {} songs ({} feature files read, {} skipped, {} cells imputed)",
            report.songs_joined,
            report.feature_files_read,
            report.feature_files_skipped,
            report.imputed_cells
        );

        Ok(Self { songs, features, report })
    }
}

/// Collapse one feature file's text into per-column means.
///
/// The files are `;`-delimited with no reliable header; every cell that
/// parses as a finite number feeds its column's mean, everything else
/// (header words, blanks) is coerced out. A column with no numeric cell
/// at all yields NaN. Rows may be ragged.
#[must_use]
pub fn aggregate_feature_text(text: &str) -> Vec<f64> {
    let mut sums: Vec<f64> = Vec::new();
    let mut counts: Vec<usize> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        for (index, cell) in line.split(';').enumerate() {
            if index >= sums.len() {
                sums.resize(index + 1, 0.0);
                counts.resize(index + 1, 0);
            }
            if let Ok(value) = cell.trim().parse::<f64>() {
                if value.is_finite() {
                    sums[index] += value;
                    counts[index] += 1;
                }
            }
        }
    }

    sums.iter()
        .zip(&counts)
        .map(|(&sum, &count)| if count > 0 { sum / count as f64 } else { f64::NAN })
        .collect()
}

/// Read every per-song feature file in the fixed id range, in parallel.
fn load_feature_vectors(features_dir: &Path, report: &mut LoadReport) -> BTreeMap<u32, Vec<f64>> {
    let ids: Vec<u32> = (config::FIRST_SONG_ID..=config::LAST_SONG_ID).collect();
    let outcomes: Vec<(u32, Option<Vec<f64>>)> = ids
        .into_par_iter()
        .map(|id| {
            let path = features_dir.join(format!("{id}.csv"));
            if !path.is_file() {
                return (id, None);
            }
            match fs::read_to_string(&path) {
                Ok(text) => {
                    let vector = aggregate_feature_text(&text);
                    if vector.is_empty() {
                        warn!("Skipping empty feature file {}", path.display());
                        (id, None)
                    } else {
                        (id, Some(vector))
                    }
                }
                Err(err) => {
                    warn!("Skipping unreadable feature file {}: {err}", path.display());
                    (id, None)
                }
            }
        })
        .collect();

    let mut vectors = BTreeMap::new();
    for (id, outcome) in outcomes {
        match outcome {
            Some(vector) => {
                report.feature_files_read += 1;
                vectors.insert(id, vector);
            }
            None => report.feature_files_skipped += 1,
        }
    }

    // Files differ in column count; pad the narrow ones so the matrix
    // has one shared width
    let width = vectors.values().map(Vec::len).max().unwrap_or(0);
    for vector in vectors.values_mut() {
        vector.resize(width, f64::NAN);
    }
    vectors
}

/// Load both annotation files and collapse duplicate ids by averaging.
fn load_annotations(
    paths: &[PathBuf; 2],
    report: &mut LoadReport,
) -> Result<BTreeMap<u32, (f64, f64)>> {
    let mut gathered: BTreeMap<u32, (Vec<f64>, Vec<f64>)> = BTreeMap::new();
    for path in paths {
        for (song_id, valence, arousal) in read_annotation_file(path, report)? {
            let entry = gathered.entry(song_id).or_default();
            entry.0.push(valence);
            entry.1.push(arousal);
        }
    }

    let mut labels = BTreeMap::new();
    for (song_id, (valences, arousals)) in gathered {
        report.duplicate_ids_merged += valences.len().saturating_sub(1);
        labels.insert(
            song_id,
            (mean_of_finite(&valences), mean_of_finite(&arousals)),
        );
    }
    Ok(labels)
}

/// Parse one annotation CSV: comma-delimited, with a header whose names
/// are trimmed and lowercased before lookup.
fn read_annotation_file(path: &Path, report: &mut LoadReport) -> Result<Vec<(u32, f64, f64)>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read annotation file {}", path.display()))?;
    let mut lines = text.lines().filter(|line| !line.trim().is_empty());

    let header: Vec<String> = lines
        .next()
        .with_context(|| format!("Annotation file {} is empty", path.display()))?
        .split(',')
        .map(|name| name.trim().to_lowercase())
        .collect();
    let id_col = column_index(&header, "song_id", path)?;
    let valence_col = column_index(&header, "valence_mean", path)?;
    let arousal_col = column_index(&header, "arousal_mean", path)?;

    let mut rows = Vec::new();
    for line in lines {
        let cells: Vec<&str> = line.split(',').map(str::trim).collect();
        let Some(id_cell) = cells.get(id_col) else {
            warn!("Annotation row too short in {}, skipped", path.display());
            continue;
        };
        let Ok(song_id) = id_cell.parse::<u32>() else {
            warn!(
                "Annotation row with unparsable song id '{id_cell}' in {}, skipped",
                path.display()
            );
            continue;
        };
        let valence = numeric_cell(&cells, valence_col);
        let arousal = numeric_cell(&cells, arousal_col);
        rows.push((song_id, valence, arousal));
        report.annotation_rows += 1;
    }
    Ok(rows)
}

fn column_index(header: &[String], name: &str, path: &Path) -> Result<usize> {
    header
        .iter()
        .position(|column| column == name)
        .with_context(|| {
            format!(
                "Annotation file {} has no '{name}' column (header: {})",
                path.display(),
                header.join(", ")
            )
        })
}

/// A cell that fails to parse becomes NaN and is imputed after the join.
fn numeric_cell(cells: &[&str], index: usize) -> f64 {
    cells
        .get(index)
        .and_then(|cell| cell.parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .unwrap_or(f64::NAN)
}

/// Replace non-finite valence/arousal values with the column mean.
fn impute_affect(songs: &mut [SongRecord]) -> usize {
    let valence_mean = mean_of_finite_iter(songs.iter().map(|s| s.affect.valence));
    let arousal_mean = mean_of_finite_iter(songs.iter().map(|s| s.affect.arousal));
    let mut imputed = 0;
    for song in songs.iter_mut() {
        if !song.affect.valence.is_finite() && valence_mean.is_finite() {
            song.affect.valence = valence_mean;
            imputed += 1;
        }
        if !song.affect.arousal.is_finite() && arousal_mean.is_finite() {
            song.affect.arousal = arousal_mean;
            imputed += 1;
        }
    }
    imputed
}

/// Replace non-finite feature cells with their column's mean across songs.
/// Columns with no finite cell anywhere are left as-is.
fn impute_features(matrix: &mut [(u32, Vec<f64>)]) -> usize {
    let width = matrix.iter().map(|(_, v)| v.len()).max().unwrap_or(0);
    let mut imputed = 0;
    for column in 0..width {
        let mean = mean_of_finite_iter(
            matrix
                .iter()
                .filter_map(|(_, vector)| vector.get(column).copied()),
        );
        if !mean.is_finite() {
            continue;
        }
        for (_, vector) in matrix.iter_mut() {
            if let Some(cell) = vector.get_mut(column) {
                if !cell.is_finite() {
                    *cell = mean;
                    imputed += 1;
                }
            }
        }
    }
    imputed
}

fn mean_of_finite(values: &[f64]) -> f64 {
    mean_of_finite_iter(values.iter().copied())
}

fn mean_of_finite_iter(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values
        .filter(|value| value.is_finite())
        .fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

fn finite_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for value in values.filter(|value| value.is_finite()) {
        min = min.min(value);
        max = max.max(value);
    }
    if min > max {
        (f64::NAN, f64::NAN)
    } else {
        (min, max)
    }
}
