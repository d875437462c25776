//! Crate-wide error type and process exit codes.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Every failure mode this crate can surface, mapped 1:1 onto the error
/// kinds this pipeline is specified to produce, plus the I/O/parsing
/// variants needed to report ambient failures (reading the catalog,
/// loading config) with a useful message.
#[derive(Debug, Error)]
pub enum Error {
    #[error(
        "no sample matches bpm={bpm} key={key} time_signature={time_signature} \
         num_measures={num_measures} genre={genre} rhythm={rhythm} \
         chord_progression={chord_progression}; try widening the query"
    )]
    NoMatch {
        bpm: u32,
        key: String,
        time_signature: String,
        num_measures: u32,
        genre: String,
        rhythm: String,
        chord_progression: String,
    },

    #[error("invalid MIDI file {path}: {reason}")]
    InvalidMidi { path: PathBuf, reason: String },

    #[error("no GM program mapping for instrument {0:?}")]
    ProgramUnknown(String),

    #[error("unknown track role {0:?}")]
    UnknownRole(String),

    #[error("scheduler model rejected: {0}")]
    ModelInvalid(String),

    #[error("no feasible schedule exists under the current constraints")]
    Infeasible,

    #[error("solver exceeded its time budget without finding a feasible schedule")]
    Aborted,

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read catalog CSV {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to parse YAML config {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

impl Error {
    /// Process exit code for this error, used by `main` so each failure
    /// kind is distinguishable by callers scripting around this binary.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::NoMatch { .. } => 2,
            Error::InvalidMidi { .. } => 3,
            Error::ProgramUnknown(_) => 4,
            Error::UnknownRole(_) => 5,
            Error::ModelInvalid(_) => 6,
            Error::Infeasible => 7,
            Error::Aborted => 8,
            Error::Io { .. } => 10,
            Error::Csv { .. } => 11,
            Error::Yaml { .. } => 12,
        }
    }
}
