//! Ties the catalog adaptor, scheduler, and MIDI writer together: for a
//! musical context and a run timestamp, produce `out/<timestamp>/tune.mid`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::midi::{MultiTrackFile, Sample};
use crate::scheduler::model::SlotKind;
use crate::scheduler::{BranchAndBoundSolver, Model, SchedulerConfig, Solve, Solver};
use crate::catalog::{MusicalContext, RoleSamples, SampleSource};

/// Paths and tuning knobs the driver needs beyond the musical context
/// itself.
pub struct RunConfig {
    pub out_root: PathBuf,
    pub scheduler: SchedulerConfig,
    pub solver_time_limit: Duration,
    pub seed: u64,
}

/// Runs the full pipeline and writes `tune.mid`, returning its path.
pub fn run(
    source: &dyn SampleSource,
    ctx: &MusicalContext,
    timestamp: &str,
    config: &RunConfig,
) -> Result<PathBuf> {
    let role_samples = source.produce_samples(ctx, config.seed)?;
    tracing::info!(
        roles = role_samples.len(),
        samples = role_samples.iter().map(|(_, s)| s.len()).sum::<usize>(),
        "catalog produced samples"
    );

    let model = Model::build(&role_samples, config.scheduler.clone());
    let solver = BranchAndBoundSolver;
    let budget = crate::scheduler::Budget {
        wall_clock: config.solver_time_limit,
        ..Default::default()
    };
    let solve = solver.solve(&model, budget);

    let assignment = match solve {
        Solve::Optimal(a) => {
            tracing::info!(makespan = a.makespan(&model), "solver found an optimal schedule");
            a
        }
        Solve::Feasible(a) => {
            tracing::warn!(
                makespan = a.makespan(&model),
                "solver budget expired; using best feasible schedule found"
            );
            a
        }
        Solve::ModelInvalid(reason) => return Err(Error::ModelInvalid(reason)),
        Solve::Infeasible => return Err(Error::Infeasible),
        Solve::Aborted => return Err(Error::Aborted),
    };

    let shifted = shift_samples(&role_samples, &model, &assignment);

    let out_dir = config.out_root.join(timestamp);
    std::fs::create_dir_all(&out_dir).map_err(|e| Error::Io {
        path: out_dir.clone(),
        source: e,
    })?;
    let out_path = out_dir.join("tune.mid");

    let merged = MultiTrackFile::merge(&shifted);
    merged.save(&out_path)?;
    tracing::info!(path = %out_path.display(), tracks = shifted.len(), "wrote piece");

    Ok(out_path)
}

/// Flattens the role → samples map in the same order the model's
/// variables were built, shifting each sample by its assigned start (and
/// emitting a second shifted copy for every selected repeat).
fn shift_samples(role_samples: &RoleSamples, model: &Model, assignment: &crate::scheduler::Assignment) -> Vec<Sample> {
    let mut flat: Vec<&Sample> = Vec::new();
    for (_, samples) in role_samples {
        for sample in samples {
            flat.push(sample);
        }
    }

    let mut out = Vec::new();
    for (var_idx, var) in model.vars.iter().enumerate() {
        if var.kind != SlotKind::Primary {
            continue;
        }
        // The repeat slot for the same sample is always the next variable
        // (see `Model::build`).
        let repeat_idx = var_idx + 1;
        let flat_idx = model
            .vars
            .iter()
            .take(var_idx)
            .filter(|v| v.kind == SlotKind::Primary)
            .count();
        let sample = flat[flat_idx];

        out.push(sample.shift(assignment.start[var_idx]));
        if assignment.present[repeat_idx] {
            out.push(sample.shift(assignment.start[repeat_idx]));
        }
    }
    out
}

/// Formats an output-directory timestamp the way the reference tooling
/// does: sortable, filesystem-safe, second resolution.
pub fn format_timestamp(now: chrono::DateTime<chrono::Utc>) -> String {
    now.format("%Y%m%d_%H%M%S").to_string()
}

#[allow(dead_code)]
pub fn default_out_root() -> PathBuf {
    Path::new("out").to_path_buf()
}
