//! A depth-first branch-and-bound search, decoupled behind the [`Solver`]
//! trait so a different backend could be substituted later without
//! touching [`super::model`].
//!
//! The key structural insight that keeps this tractable without a vendor
//! CP-SAT library: an optimal schedule under "align-on-overlap" and
//! "isolation padding" never needs a start time other than one induced by
//! another track's start, end, or end-plus-padding (or zero, for the very
//! first track placed). So instead of searching an integer domain of size
//! `horizon`, each track is placed at one of a handful of structurally
//! meaningful candidate times derived from tracks already placed.

use std::time::{Duration, Instant};

use super::model::{Assignment, Model, SlotKind};

/// Caller-supplied search limits: the solver must honor a wall-clock
/// budget, and optionally a deterministic step budget.
#[derive(Debug, Clone, Copy)]
pub struct Budget {
    pub wall_clock: Duration,
    pub max_nodes: u64,
}

impl Default for Budget {
    fn default() -> Self {
        Budget {
            wall_clock: Duration::from_secs(10),
            max_nodes: 200_000,
        }
    }
}

/// Outcome of a solve attempt, mirroring the CP-SAT status codes this
/// pipeline is specified against.
#[derive(Debug)]
pub enum Solve {
    /// A provably makespan-minimal schedule was found.
    Optimal(Assignment),
    /// A feasible schedule was found but the search budget expired before
    /// optimality could be proven.
    Feasible(Assignment),
    /// The model's own constraints (e.g. the repeat budget) cannot be
    /// satisfied regardless of search effort, an implementation bug rather
    /// than a legitimately tight schedule.
    ModelInvalid(String),
    /// The search budget expired before any feasible schedule was found.
    Aborted,
    /// The search space was exhausted and no feasible schedule exists.
    Infeasible,
}

pub trait Solver {
    fn solve(&self, model: &Model, budget: Budget) -> Solve;
}

/// The shipped [`Solver`] implementation.
pub struct BranchAndBoundSolver;

impl Solver for BranchAndBoundSolver {
    fn solve(&self, model: &Model, budget: Budget) -> Solve {
        if model.vars.is_empty() {
            return Solve::Optimal(Assignment {
                start: Vec::new(),
                present: Vec::new(),
            });
        }

        let required = model.required_repeats();
        let free_repeats = model.free_repeat_indices();
        if required > free_repeats.len() {
            return Solve::ModelInvalid(format!(
                "repeat budget requires {} repeats but only {} samples allow one",
                required,
                free_repeats.len()
            ));
        }

        let deadline = Instant::now() + budget.wall_clock;
        let mut search = Search {
            model,
            deadline,
            max_nodes: budget.max_nodes,
            nodes: 0,
            best: None,
            exhausted: true,
        };

        for combo in Combinations::new(free_repeats.len(), required) {
            if Instant::now() >= search.deadline || search.nodes >= search.max_nodes {
                search.exhausted = false;
                break;
            }
            let chosen: Vec<usize> = combo.iter().map(|&k| free_repeats[k]).collect();
            search.try_subset(&chosen);
        }

        match (search.best, search.exhausted) {
            (Some((assignment, _)), true) => Solve::Optimal(assignment),
            (Some((assignment, _)), false) => Solve::Feasible(assignment),
            (None, true) => Solve::Infeasible,
            (None, false) => Solve::Aborted,
        }
    }
}

struct Search<'a> {
    model: &'a Model,
    deadline: Instant,
    max_nodes: u64,
    nodes: u64,
    best: Option<(Assignment, u32)>,
    exhausted: bool,
}

impl<'a> Search<'a> {
    /// Places every active track (all primaries, plus the repeats in
    /// `chosen_repeats`) via backtracking over structurally meaningful
    /// candidate start times, keeping the best complete, feasible
    /// assignment found for this subset.
    fn try_subset(&mut self, chosen_repeats: &[usize]) {
        let n = self.model.vars.len();
        let mut present = vec![false; n];
        let mut active = Vec::new();
        for (i, v) in self.model.vars.iter().enumerate() {
            if v.kind == SlotKind::Primary {
                present[i] = true;
                active.push(i);
            }
        }
        for &i in chosen_repeats {
            present[i] = true;
            active.push(i);
        }
        active.sort_unstable();

        // `candidate_starts` only ever offers `0` as a candidate for the
        // first track placed (nothing is placed yet to derive a later
        // candidate from), so whichever variable occupies that first slot
        // in `active` is unconditionally anchored at time zero. Try every
        // active variable as that first slot in turn — not just the
        // lexicographically-first one — or the search could never reach a
        // schedule where a different track is the one sitting at time
        // zero. The rest of each ordering still follows the original
        // fixed-order backtrack.
        for &first in &active {
            if Instant::now() >= self.deadline || self.nodes >= self.max_nodes {
                self.exhausted = false;
                return;
            }
            let mut order = Vec::with_capacity(active.len());
            order.push(first);
            order.extend(active.iter().copied().filter(|&v| v != first));

            let mut start = vec![0u32; n];
            start[first] = 0;
            if !self.place(&order, 1, &mut start, &mut present) {
                return;
            }
        }
    }

    fn place(&mut self, active: &[usize], pos: usize, start: &mut [u32], present: &mut [bool]) -> bool {
        if Instant::now() >= self.deadline || self.nodes >= self.max_nodes {
            self.exhausted = false;
            return false;
        }
        self.nodes += 1;

        if pos == active.len() {
            let assignment = Assignment {
                start: start.to_vec(),
                present: present.to_vec(),
            };
            if assignment.is_feasible(self.model) {
                let makespan = assignment.makespan(self.model);
                let better = self
                    .best
                    .as_ref()
                    .map(|(_, best_makespan)| makespan < *best_makespan)
                    .unwrap_or(true);
                if better {
                    self.best = Some((assignment, makespan));
                }
            }
            return true;
        }

        let var_idx = active[pos];
        let candidates = self.candidate_starts(active, pos, start);
        for candidate in candidates {
            // Cheap prefix-closed prune: reject placements that overlap an
            // already-placed same-role track, or overlap any track without
            // sharing its start. Isolation padding and capacity are only
            // checked once the full assignment is known (they depend on
            // tracks not yet placed), via `Assignment::is_feasible` at the
            // leaf.
            if self.conflicts(active, pos, var_idx, candidate, start) {
                continue;
            }
            start[var_idx] = candidate;
            if !self.place(active, pos + 1, start, present) {
                return false;
            }
        }
        true
    }

    /// Structurally meaningful candidate start times for `active[pos]`:
    /// zero, and every already-placed track's start/end/end-plus-padding.
    fn candidate_starts(&self, active: &[usize], pos: usize, start: &[u32]) -> Vec<u32> {
        let mut candidates = vec![0u32];
        for &j in &active[..pos] {
            let end = start[j] + self.model.vars[j].duration;
            candidates.push(start[j]);
            candidates.push(end);
            candidates.push(end + self.model.config.padding);
        }
        candidates.sort_unstable();
        candidates.dedup();
        candidates
    }

    fn conflicts(
        &self,
        active: &[usize],
        pos: usize,
        var_idx: usize,
        candidate_start: u32,
        start: &[u32],
    ) -> bool {
        let duration = self.model.vars[var_idx].duration;
        let candidate_end = candidate_start + duration;
        let role = self.model.vars[var_idx].role;
        for &j in &active[..pos] {
            let j_start = start[j];
            let j_end = j_start + self.model.vars[j].duration;
            let overlap = !(candidate_end <= j_start || j_end <= candidate_start);
            if overlap && self.model.vars[j].role == role {
                return true;
            }
            if overlap && candidate_start != j_start {
                return true;
            }
        }
        false
    }
}

/// Deterministic k-combinations of `0..n`, smallest-first, so repeated
/// solves with identical inputs explore subsets in the same order.
struct Combinations {
    n: usize,
    k: usize,
    indices: Vec<usize>,
    first: bool,
    done: bool,
}

impl Combinations {
    fn new(n: usize, k: usize) -> Self {
        if k > n {
            return Combinations {
                n,
                k,
                indices: Vec::new(),
                first: true,
                done: true,
            };
        }
        Combinations {
            n,
            k,
            indices: (0..k).collect(),
            first: true,
            done: false,
        }
    }
}

impl Iterator for Combinations {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        if self.done {
            return None;
        }
        if self.first {
            self.first = false;
            if self.k == 0 {
                self.done = true;
            }
            return Some(self.indices.clone());
        }
        // Standard next-combination-in-lexicographic-order step.
        let k = self.k;
        let n = self.n;
        let mut i = k;
        loop {
            if i == 0 {
                self.done = true;
                return None;
            }
            i -= 1;
            if self.indices[i] != i + n - k {
                break;
            }
        }
        self.indices[i] += 1;
        for j in (i + 1)..k {
            self.indices[j] = self.indices[j - 1] + 1;
        }
        Some(self.indices.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combinations_of_3_choose_2() {
        let combos: Vec<_> = Combinations::new(3, 2).collect();
        assert_eq!(combos, vec![vec![0, 1], vec![0, 2], vec![1, 2]]);
    }

    #[test]
    fn combinations_choose_zero_yields_one_empty_combo() {
        let combos: Vec<_> = Combinations::new(5, 0).collect();
        assert_eq!(combos, vec![Vec::<usize>::new()]);
    }

    /// Three always-present primaries, no repeats in play: a tiny `bass`
    /// track (duration 10, demand 1) and two demand-3 tracks of duration
    /// 1000 each, under capacity 6. All three overlapping is infeasible
    /// (1+3+3=7), so the makespan-minimal schedule puts the two demand-3
    /// tracks together at time zero (demand 3+3=6, legal) and pushes the
    /// tiny track off by the padding, for a makespan of
    /// `1000 + 4000 + 10 = 5010` — not the `6000` a search that can only
    /// ever anchor the first-indexed variable at time zero would produce
    /// (it would have to place `bass` at time zero, forcing one of the
    /// demand-3 tracks off by the full padding instead).
    #[test]
    fn search_can_anchor_any_track_at_time_zero() {
        use crate::midi::Role;
        use super::super::model::{SchedulerConfig, TrackVar};

        let config = SchedulerConfig {
            demands: [
                ("bass".to_string(), 1),
                ("main_melody".to_string(), 3),
                ("sub_melody".to_string(), 3),
            ]
            .into_iter()
            .collect(),
            capacity: 6,
            padding: 4000,
        };
        let vars = vec![
            TrackVar {
                role: Role::Bass,
                sample_index: 0,
                kind: SlotKind::Primary,
                duration: 10,
                presence_is_free: false,
            },
            TrackVar {
                role: Role::MainMelody,
                sample_index: 0,
                kind: SlotKind::Primary,
                duration: 1000,
                presence_is_free: false,
            },
            TrackVar {
                role: Role::SubMelody,
                sample_index: 0,
                kind: SlotKind::Primary,
                duration: 1000,
                presence_is_free: false,
            },
        ];
        let model = Model {
            vars,
            horizon: 10 + 1000 + 1000,
            config,
        };

        let solver = BranchAndBoundSolver;
        let assignment = match solver.solve(&model, Budget::default()) {
            Solve::Optimal(a) => a,
            other => panic!("expected an optimal schedule, got {other:?}"),
        };
        assert_eq!(assignment.makespan(&model), 5010);
    }
}
