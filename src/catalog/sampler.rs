//! Context filter, one-per-role seed,
//! top-up to the full role count, and materialization into preprocessed
//! [`Sample`]s with a per-run channel counter.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::cfg::InstrumentTable;
use crate::error::{Error, Result};
use crate::midi::{Role, Sample};

use super::dataset::{CommuDataset, Row};

/// The seven equality predicates a musical context is filtered on.
#[derive(Debug, Clone)]
pub struct MusicalContext {
    pub bpm: u32,
    pub key: String,
    pub time_signature: String,
    pub num_measures: u32,
    pub genre: String,
    pub rhythm: String,
    pub chord_progression: String,
}

/// A role → samples mapping, in role-insertion order (the order the
/// scheduler builds its variables in).
pub type RoleSamples = Vec<(Role, Vec<Sample>)>;

/// The common seam the scheduler consumes: an alternate source (e.g. a
/// neural generation pipeline) could implement this trait instead of
/// [`CatalogSampler`] without the scheduler knowing the difference.
pub trait SampleSource {
    fn produce_samples(&self, ctx: &MusicalContext, seed: u64) -> Result<RoleSamples>;
}

/// The reference sample source: filters the CSV catalog, samples rows
/// with a seeded PRNG, and loads/preprocesses the chosen MIDI files.
pub struct CatalogSampler<'a> {
    pub dataset: &'a CommuDataset,
    pub instruments: &'a InstrumentTable,
    pub midi_root: PathBuf,
}

impl<'a> CatalogSampler<'a> {
    pub fn new(
        dataset: &'a CommuDataset,
        instruments: &'a InstrumentTable,
        midi_root: impl AsRef<Path>,
    ) -> Self {
        CatalogSampler {
            dataset,
            instruments,
            midi_root: midi_root.as_ref().to_path_buf(),
        }
    }

    fn context_matches(row: &Row, ctx: &MusicalContext) -> bool {
        row.bpm == ctx.bpm
            && row.key == ctx.key
            && row.time_signature == ctx.time_signature
            && row.num_measures == ctx.num_measures
            && row.genre == ctx.genre
            && row.rhythm == ctx.rhythm
            && row.chord_progression == ctx.chord_progression
    }

    fn sample_path(&self, row: &Row) -> PathBuf {
        self.midi_root
            .join(&row.split)
            .join("raw")
            .join(format!("{}.mid", row.id))
    }
}

impl<'a> SampleSource for CatalogSampler<'a> {
    fn produce_samples(&self, ctx: &MusicalContext, seed: u64) -> Result<RoleSamples> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let rows = self.dataset.rows();
        let query: Vec<usize> = (0..rows.len())
            .filter(|&i| Self::context_matches(&rows[i], ctx))
            .collect();

        if query.is_empty() {
            return Err(Error::NoMatch {
                bpm: ctx.bpm,
                key: ctx.key.clone(),
                time_signature: ctx.time_signature.clone(),
                num_measures: ctx.num_measures,
                genre: ctx.genre.clone(),
                rhythm: ctx.rhythm.clone(),
                chord_progression: ctx.chord_progression.clone(),
            });
        }

        let mut by_role: HashMap<String, Vec<usize>> = HashMap::new();
        for &i in &query {
            by_role.entry(rows[i].track_role.clone()).or_default().push(i);
        }
        let mut role_order: Vec<String> = Vec::new();
        for &i in &query {
            let role = &rows[i].track_role;
            if !role_order.contains(role) {
                role_order.push(role.clone());
            }
        }

        // One-per-role seed.
        let mut chosen: Vec<usize> = Vec::new();
        let mut chosen_ids: HashSet<String> = HashSet::new();
        for role in &role_order {
            let candidates = &by_role[role];
            let pick = candidates[rng.gen_range(0..candidates.len())];
            chosen.push(pick);
            chosen_ids.insert(rows[pick].id.clone());
        }

        // Top-up, excluding riff, until every catalog role is represented
        // or no valid role has unused rows left.
        let total_roles = self.dataset.track_roles().len();
        let mut valid: Vec<String> = role_order.iter().filter(|r| r.as_str() != "riff").cloned().collect();
        while chosen.len() < total_roles && !valid.is_empty() {
            let role_idx = rng.gen_range(0..valid.len());
            let role = valid[role_idx].clone();
            let candidates = &by_role[&role];
            if !candidates.iter().any(|c| !chosen_ids.contains(&rows[*c].id)) {
                // No row of this role remains unclaimed: drop it from
                // `valid` rather than keep drawing from an exhausted pool.
                valid.remove(role_idx);
                continue;
            }
            let pick = candidates[rng.gen_range(0..candidates.len())];
            if chosen_ids.contains(&rows[pick].id) {
                // Same row drawn twice: retry without counting it toward `S`.
                continue;
            }
            chosen_ids.insert(rows[pick].id.clone());
            chosen.push(pick);
        }

        // Materialize, in selection order, assigning channels 0.. skipping 9.
        let mut channel: u8 = 0;
        let mut result_order: Vec<Role> = Vec::new();
        let mut by_result_role: HashMap<Role, Vec<Sample>> = HashMap::new();

        for idx in chosen {
            let row = &rows[idx];
            let role: Role = row.track_role.parse()?;
            let program = self.instruments.program_of(&row.instrument)?;

            let path = self.sample_path(row);
            let sample = Sample::load(&path, role, row.instrument.clone())?;
            let this_channel = channel;
            channel = if channel == 8 { 10 } else { channel + 1 };
            let sample = sample.preprocess(this_channel, program);

            if !by_result_role.contains_key(&role) {
                result_order.push(role);
            }
            by_result_role.entry(role).or_default().push(sample);
        }

        Ok(result_order
            .into_iter()
            .map(|role| {
                let samples = by_result_role.remove(&role).unwrap_or_default();
                (role, samples)
            })
            .collect())
    }
}
