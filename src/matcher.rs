//! # Song Matcher Module
//!
//! Nearest-neighbor lookup in the valence/arousal plane. The matcher owns
//! its song table outright; when a selected row turns out to have no audio
//! file on disk, the row is removed for good and the search retries on the
//! reduced table. Distances are computed per query and returned with the
//! match, never stored in the table.

use crate::dataset::SongRecord;
use crate::emotion::AffectPoint;
use log::{debug, warn};
use std::path::PathBuf;

/// One successful lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct SongMatch {
    pub song_id: u32,
    pub audio_path: PathBuf,
    pub affect: AffectPoint,
    /// Euclidean distance from the query target, for this query only.
    pub distance: f64,
}

/// Owns the joined song table and answers nearest-neighbor queries.
pub struct SongMatcher {
    songs: Vec<SongRecord>,
    eliminated: usize,
}

impl SongMatcher {
    pub fn new(songs: Vec<SongRecord>) -> Self {
        Self { songs, eliminated: 0 }
    }

    /// Remaining rows in the pool.
    pub fn len(&self) -> usize {
        self.songs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }

    /// Rows removed so far because their audio file was missing.
    pub fn eliminated(&self) -> usize {
        self.eliminated
    }

    /// Find the playable song nearest to the target.
    ///
    /// Scans the remaining rows for the minimum Euclidean distance (ties go
    /// to the earlier row). A winner whose audio file does not exist is
    /// removed from the pool and the scan restarts on what is left; the
    /// search only returns a row that is actually on disk. Returns None
    /// once the pool is exhausted.
    pub fn find_matching_song(&mut self, target: AffectPoint) -> Option<SongMatch> {
        loop {
            let (index, distance) = self.nearest(target)?;
            let candidate = &self.songs[index];
            if candidate.audio_path.is_file() {
                debug!(
                    "Matched song {} at distance {distance:.3} for target ({})",
                    candidate.song_id, target
                );
                return Some(SongMatch {
                    song_id: candidate.song_id,
                    audio_path: candidate.audio_path.clone(),
                    affect: candidate.affect,
                    distance,
                });
            }
            warn!(
                "Audio file missing for song {}, removing it from the pool: {}",
                candidate.song_id,
                candidate.audio_path.display()
            );
            self.songs.remove(index);
            self.eliminated += 1;
        }
    }

    /// Index and distance of the closest row. Rows with a non-finite
    /// distance (unimputable annotations) never win.
    fn nearest(&self, target: AffectPoint) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for (index, song) in self.songs.iter().enumerate() {
            let distance = target.distance_to(&song.affect);
            if !distance.is_finite() {
                continue;
            }
            match best {
                Some((_, best_distance)) if distance >= best_distance => {}
                _ => best = Some((index, distance)),
            }
        }
        best
    }
}
