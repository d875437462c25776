//! The sample metadata CSV, loaded once and queried by [`super::sampler`].

use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

/// One row of `dataset/commu_meta.csv`, in the file's original column
/// names. Deserialized directly from the CSV header.
#[derive(Debug, Clone, Deserialize)]
struct RawRow {
    id: String,
    audio_key: String,
    chord_progressions: String,
    inst: String,
    sample_rhythm: String,
    split_data: String,
    bpm: u32,
    time_signature: String,
    num_measures: u32,
    genre: String,
    track_role: String,
    pitch_range: String,
    min_velocity: u32,
    max_velocity: u32,
}

/// A row after the rename/canonicalization pass.
#[derive(Debug, Clone)]
pub struct Row {
    pub id: String,
    pub key: String,
    pub chord_progression: String,
    pub instrument: String,
    pub rhythm: String,
    pub split: String,
    pub bpm: u32,
    pub time_signature: String,
    pub num_measures: u32,
    pub genre: String,
    pub track_role: String,
    #[allow(dead_code)]
    pub pitch_range: String,
    #[allow(dead_code)]
    pub min_velocity: u32,
    #[allow(dead_code)]
    pub max_velocity: u32,
}

impl From<RawRow> for Row {
    fn from(raw: RawRow) -> Self {
        Row {
            id: raw.id,
            key: raw.audio_key,
            chord_progression: canonicalize_chord_progression(&raw.chord_progressions),
            instrument: raw.inst,
            rhythm: raw.sample_rhythm,
            split: raw.split_data,
            bpm: raw.bpm,
            time_signature: raw.time_signature,
            num_measures: raw.num_measures,
            genre: raw.genre,
            track_role: raw.track_role,
            pitch_range: raw.pitch_range,
            min_velocity: raw.min_velocity,
            max_velocity: raw.max_velocity,
        }
    }
}

/// Collapses a stringified list-of-lists of per-slot chord tokens (e.g.
/// `"[['Am', 'Am', 'C', 'C']]"`) into a canonical dashed progression (e.g.
/// `"Am-C"`): strip the outer brackets/quotes, tokenize on `", "`, and
/// run-length-collapse consecutive duplicates.
pub fn canonicalize_chord_progression(raw: &str) -> String {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix("[[")
        .and_then(|s| s.strip_suffix("]]"))
        .unwrap_or(trimmed);
    let tokens: Vec<&str> = inner
        .split(", ")
        .map(|t| t.trim().trim_matches('\'').trim_matches('"'))
        .filter(|t| !t.is_empty())
        .collect();

    collapse_runs(&tokens).join("-")
}

/// Collapses a canonical-but-expanded dashed chord string (one token per
/// metrical slot, e.g. `"Am-Am-Am-Am-C-C-C-C"`) back to its canonical form
/// (`"Am-C"`). Used for the canonicalization round-trip property:
/// `canonicalize(render_canonical(c)) == c`.
pub fn canonicalize_dashed(expanded: &str) -> String {
    let tokens: Vec<&str> = expanded.split('-').collect();
    collapse_runs(&tokens).join("-")
}

fn collapse_runs<'a>(tokens: &[&'a str]) -> Vec<&'a str> {
    let mut collapsed: Vec<&str> = Vec::new();
    for &token in tokens {
        if collapsed.last() != Some(&token) {
            collapsed.push(token);
        }
    }
    collapsed
}

/// The sample metadata store.
pub struct CommuDataset {
    rows: Vec<Row>,
}

impl CommuDataset {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = csv::Reader::from_path(path).map_err(|e| Error::Csv {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut rows = Vec::new();
        for result in reader.deserialize::<RawRow>() {
            let raw = result.map_err(|e| Error::Csv {
                path: path.to_path_buf(),
                source: e,
            })?;
            rows.push(Row::from(raw));
        }
        Ok(CommuDataset { rows })
    }

    #[cfg(test)]
    pub fn from_rows(rows: Vec<Row>) -> Self {
        CommuDataset { rows }
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Every distinct track role appearing anywhere in the catalog, in
    /// first-seen order.
    pub fn track_roles(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for row in &self.rows {
            if !seen.contains(&row.track_role) {
                seen.push(row.track_role.clone());
            }
        }
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalizes_and_collapses_runs() {
        let raw = "[['Am', 'Am', 'Am', 'Am', 'C', 'C', 'G', 'G', 'G', 'D', 'D']]";
        assert_eq!(canonicalize_chord_progression(raw), "Am-C-G-D");
    }

    #[test]
    fn canonicalize_dashed_round_trips_an_expanded_progression() {
        let canonical = "Am-C-G-Dm-Am-C-G-D";
        let expanded: String = canonical
            .split('-')
            .map(|chord| std::iter::repeat(chord).take(8).collect::<Vec<_>>().join("-"))
            .collect::<Vec<_>>()
            .join("-");
        assert_eq!(canonicalize_dashed(&expanded), canonical);
    }
}
