//! The sample catalog adaptor: a CSV-backed metadata store over MIDI
//! samples, filtered and sampled to produce one representative clip per
//! musical role (plus top-ups), ready for the scheduler to place.

mod dataset;
mod sampler;

pub use dataset::{canonicalize_chord_progression, canonicalize_dashed, CommuDataset, Row};
pub use sampler::{CatalogSampler, MusicalContext, RoleSamples, SampleSource};
