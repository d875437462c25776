//! Vendor-neutral constraint model for the scheduling core.
//!
//! One primary and one optional "repeat" interval per sample, non-overlap
//! within a role, a cumulative capacity bound, an "overlapping tracks share
//! a start" rule, and isolation padding for tracks that end up alone. The
//! model itself is solver-agnostic; see [`super::solver`] for the search
//! that assigns values to it.

use std::collections::HashMap;

use serde::Deserialize;

use crate::midi::{Role, Sample};

/// Tuning knobs loaded from `cfg/midicomb.yaml`.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_demands")]
    pub demands: HashMap<String, u32>,
    #[serde(default = "default_capacity")]
    pub capacity: u32,
    #[serde(default = "default_padding")]
    pub padding: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            demands: default_demands(),
            capacity: default_capacity(),
            padding: default_padding(),
        }
    }
}

impl SchedulerConfig {
    pub fn demand_of(&self, role: Role) -> u32 {
        self.demands
            .get(role.as_str())
            .copied()
            .unwrap_or_else(|| role.demand())
    }
}

fn default_demands() -> HashMap<String, u32> {
    [
        ("main_melody", 3),
        ("sub_melody", 3),
        ("riff", 3),
        ("accompaniment", 2),
        ("pad", 1),
        ("bass", 1),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

fn default_capacity() -> u32 {
    6
}

fn default_padding() -> u32 {
    4000
}

/// Which of a sample's two slots a [`TrackVar`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// Must be played; `is_present` is fixed `true`.
    Primary,
    /// May be played again; `is_present` is a free boolean, except for
    /// `riff` samples, where it is fixed `false`.
    Repeat,
}

/// One schedulable interval: a sample's primary playback, or its optional
/// repeat. `start`/`end` are not stored here; they belong to the
/// [`Assignment`] a solver produces for a [`Model`].
#[derive(Debug, Clone)]
pub struct TrackVar {
    pub role: Role,
    pub sample_index: usize,
    pub kind: SlotKind,
    pub duration: u32,
    /// `false` for primaries and for riff repeats: the presence literal is
    /// pinned rather than free.
    pub presence_is_free: bool,
}

/// The constraint model built from a role → samples mapping: every
/// primary/repeat variable pair, the horizon, and the tuning config.
#[derive(Debug, Clone)]
pub struct Model {
    pub vars: Vec<TrackVar>,
    pub horizon: u32,
    pub config: SchedulerConfig,
}

impl Model {
    /// Builds the model's variables in role-iteration order then index
    /// order. Irrelevant to correctness, but kept stable so repeated runs
    /// with the same seed explore the search space identically.
    pub fn build(role_to_samples: &[(Role, Vec<Sample>)], config: SchedulerConfig) -> Self {
        let mut vars = Vec::new();
        let mut horizon: u64 = 0;
        for (role, samples) in role_to_samples {
            for (i, sample) in samples.iter().enumerate() {
                let duration = sample.duration();
                horizon += duration as u64;
                vars.push(TrackVar {
                    role: *role,
                    sample_index: i,
                    kind: SlotKind::Primary,
                    duration,
                    presence_is_free: false,
                });
                vars.push(TrackVar {
                    role: *role,
                    sample_index: i,
                    kind: SlotKind::Repeat,
                    duration,
                    presence_is_free: *role != Role::Riff,
                });
            }
        }
        Model {
            vars,
            horizon: horizon.min(u32::MAX as u64) as u32,
            config,
        }
    }

    /// Number of (role, i) sample pairs, i.e. `N` in the repeat-budget rule.
    pub fn sample_count(&self) -> usize {
        self.vars.len() / 2
    }

    /// `⌊N/2⌋`, the number of repeats that must be selected.
    pub fn required_repeats(&self) -> usize {
        self.sample_count() / 2
    }

    /// Indices into `vars` of repeat slots whose presence is a free choice.
    pub fn free_repeat_indices(&self) -> Vec<usize> {
        self.vars
            .iter()
            .enumerate()
            .filter(|(_, v)| v.kind == SlotKind::Repeat && v.presence_is_free)
            .map(|(i, _)| i)
            .collect()
    }
}

/// A concrete value for every variable in a [`Model`]: a start time and a
/// presence flag per slot (primaries are always present by construction).
#[derive(Debug, Clone)]
pub struct Assignment {
    pub start: Vec<u32>,
    pub present: Vec<bool>,
}

impl Assignment {
    pub fn end(&self, model: &Model, i: usize) -> u32 {
        self.start[i] + model.vars[i].duration
    }

    fn overlaps(&self, model: &Model, a: usize, b: usize) -> bool {
        if !self.present[a] || !self.present[b] {
            return false;
        }
        let (a_start, a_end) = (self.start[a], self.end(model, a));
        let (b_start, b_end) = (self.start[b], self.end(model, b));
        !(a_end <= b_start || b_end <= a_start)
    }

    /// Checks every constraint against this assignment. This is the
    /// ground truth a solver's candidate placements are validated against.
    pub fn is_feasible(&self, model: &Model) -> bool {
        let n = model.vars.len();

        // 2. Per-role non-overlap.
        for a in 0..n {
            if !self.present[a] {
                continue;
            }
            for b in (a + 1)..n {
                if !self.present[b] || model.vars[a].role != model.vars[b].role {
                    continue;
                }
                let (a_start, a_end) = (self.start[a], self.end(model, a));
                let (b_start, b_end) = (self.start[b], self.end(model, b));
                if !(a_end <= b_start || b_end <= a_start) {
                    return false;
                }
            }
        }

        // 3. Cumulative capacity, sampled at every interval's start (a
        // standard cumulative-constraint equivalence: the demand sum can
        // only change at an interval boundary).
        for t in 0..n {
            if !self.present[t] {
                continue;
            }
            let at = self.start[t];
            let demand: u32 = (0..n)
                .filter(|&i| {
                    self.present[i] && self.start[i] <= at && at < self.end(model, i)
                })
                .map(|i| model.config.demand_of(model.vars[i].role))
                .sum();
            if demand > model.config.capacity {
                return false;
            }
        }

        // 4. Align-on-overlap.
        for a in 0..n {
            if !self.present[a] {
                continue;
            }
            for b in (a + 1)..n {
                if self.overlaps(model, a, b) && self.start[a] != self.start[b] {
                    return false;
                }
            }
        }

        // 5. Isolation padding.
        for t in 0..n {
            if !self.present[t] {
                continue;
            }
            let alone = (0..n)
                .filter(|&o| o != t)
                .all(|o| !self.overlaps(model, t, o));
            if !alone {
                continue;
            }
            let (t_start, t_end) = (self.start[t], self.end(model, t));
            for o in 0..n {
                if o == t || !self.present[o] {
                    continue;
                }
                let (o_start, o_end) = (self.start[o], self.end(model, o));
                if t_end <= o_start && o_start < t_end + model.config.padding {
                    return false;
                }
                if o_end <= t_start && t_start < o_end + model.config.padding {
                    return false;
                }
            }
        }

        // 6. Repeat budget.
        let repeats_selected = model
            .vars
            .iter()
            .enumerate()
            .filter(|(_, v)| v.kind == SlotKind::Repeat)
            .filter(|(i, _)| self.present[*i])
            .count();
        if repeats_selected != model.required_repeats() {
            return false;
        }

        // 7. Presence pinning.
        for (i, v) in model.vars.iter().enumerate() {
            if v.kind == SlotKind::Primary && !self.present[i] {
                return false;
            }
            if v.kind == SlotKind::Repeat && !v.presence_is_free && self.present[i] {
                return false;
            }
        }

        true
    }

    /// The conditioned makespan objective: the max end time among present
    /// tracks only (see the Open Question resolution in DESIGN.md).
    pub fn makespan(&self, model: &Model) -> u32 {
        (0..model.vars.len())
            .filter(|&i| self.present[i])
            .map(|i| self.end(model, i))
            .max()
            .unwrap_or(0)
    }
}
