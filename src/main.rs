//! midicomb - assembles a multi-track MIDI piece from a catalog of
//! pre-composed samples for a given musical context, scheduling their
//! placement on a shared timeline with a constraint solver.
//!
//! # Usage
//!
//! ```bash
//! midicomb compose --bpm 120 --key C --time-signature 4/4 --measures 8 \
//!     --genre cinematic --rhythm standard --chord-progression Am-C-G-F
//! ```

mod catalog;
mod cfg;
mod driver;
mod error;
mod midi;
mod scheduler;

use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use catalog::{CatalogSampler, CommuDataset, MusicalContext};
use cfg::{ChordExpansionTable, InstrumentTable};
use driver::RunConfig;
use error::Error;
use scheduler::SchedulerConfig;

#[derive(Parser, Debug)]
#[command(name = "midicomb", about = "Assembles a scheduled multi-track MIDI piece from a sample catalog")]
struct Cli {
    /// Raise the logging verbosity; repeat for more detail (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compose a piece matching a musical context and write it to disk.
    Compose {
        #[arg(long)]
        bpm: u32,
        #[arg(long)]
        key: String,
        #[arg(long = "time-signature")]
        time_signature: String,
        #[arg(long)]
        measures: u32,
        #[arg(long)]
        genre: String,
        #[arg(long)]
        rhythm: String,
        #[arg(long = "chord-progression")]
        chord_progression: String,

        /// RNG seed; defaults to the current time if omitted.
        #[arg(long)]
        seed: Option<u64>,

        /// Directory holding `inst_to_prog.yaml`, `chord_progressions.yaml`,
        /// and `midicomb.yaml`.
        #[arg(long, default_value = "cfg")]
        config: PathBuf,

        /// Path to the sample metadata CSV.
        #[arg(long, default_value = "dataset/commu_meta.csv")]
        dataset: PathBuf,

        /// Root of the per-split raw MIDI tree.
        #[arg(long = "midi-root", default_value = "dataset")]
        midi_root: PathBuf,

        /// Output root directory; a timestamped subdirectory is created
        /// under it for each run.
        #[arg(long, default_value = "out")]
        out: PathBuf,

        /// Wall-clock budget given to the scheduler, in seconds.
        #[arg(long = "solver-time-limit-secs", default_value_t = 10)]
        solver_time_limit_secs: u64,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(cli) {
        match err.downcast::<Error>() {
            Ok(domain_err) => {
                eprintln!("error: {domain_err}");
                std::process::exit(domain_err.exit_code());
            }
            Err(other) => {
                eprintln!("error: {other:#}");
                std::process::exit(1);
            }
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let Command::Compose {
        bpm,
        key,
        time_signature,
        measures,
        genre,
        rhythm,
        chord_progression,
        seed,
        config,
        dataset,
        midi_root,
        out,
        solver_time_limit_secs,
    } = cli.command;

    let seed = seed.unwrap_or_else(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    });

    let instruments = InstrumentTable::load(config.join("inst_to_prog.yaml"))
        .context("loading instrument-to-program table")?;
    let _chords = ChordExpansionTable::load(config.join("chord_progressions.yaml"))
        .context("loading chord-progression expansion table")?;
    let scheduler_config = load_scheduler_config(&config.join("midicomb.yaml"))?;

    let commu_dataset = CommuDataset::load(&dataset).context("loading sample metadata catalog")?;
    let sampler = CatalogSampler::new(&commu_dataset, &instruments, &midi_root);

    let ctx = MusicalContext {
        bpm,
        key,
        time_signature,
        num_measures: measures,
        genre,
        rhythm,
        chord_progression,
    };

    let run_config = RunConfig {
        out_root: out,
        scheduler: scheduler_config,
        solver_time_limit: Duration::from_secs(solver_time_limit_secs),
        seed,
    };

    let timestamp = driver::format_timestamp(chrono::Utc::now());
    let out_path = driver::run(&sampler, &ctx, &timestamp, &run_config)?;
    println!("{}", out_path.display());

    Ok(())
}

/// Loads `midicomb.yaml` if present, falling back to nominal defaults
/// otherwise (the scheduler's tuning knobs are optional ambient config,
/// not a required input).
fn load_scheduler_config(path: &std::path::Path) -> Result<SchedulerConfig> {
    if !path.exists() {
        return Ok(SchedulerConfig::default());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}
