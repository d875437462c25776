//! YAML configuration: the instrument→program table, the chord-progression
//! expansion table, and the scheduler's tuning knobs.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

/// `cfg/inst_to_prog.yaml`: symbolic instrument name -> GM-1 program number.
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct InstrumentTable(HashMap<String, u8>);

impl InstrumentTable {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        load_yaml(path)
    }

    pub fn program_of(&self, instrument: &str) -> Result<u8> {
        self.0
            .get(instrument)
            .copied()
            .ok_or_else(|| Error::ProgramUnknown(instrument.to_string()))
    }
}

/// `cfg/chord_progressions.yaml`: canonical dashed progression -> its
/// per-slot expanded form. Consumed by the upstream generation pipeline,
/// out of scope for this crate; loaded here only so a missing or
/// malformed file fails fast before the scheduler runs, rather than
/// surfacing as a confusing error partway through a run.
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct ChordExpansionTable(HashMap<String, String>);

impl ChordExpansionTable {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        load_yaml(path)
    }
}

fn load_yaml<T: for<'de> Deserialize<'de>>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| Error::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_yaml::from_str(&text).map_err(|e| Error::Yaml {
        path: path.to_path_buf(),
        source: e,
    })
}
