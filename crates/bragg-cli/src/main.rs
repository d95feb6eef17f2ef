//! The `bragg` command line: completeness analysis, simulated data
//! loss, sweep clustering and campaign aggregation

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bragg_cluster::wrappers::{DialsMerge, DialsResolution, DialsScale, FreeFlag};
use bragg_cluster::{
    ClusterPipeline, ClusterSequence, CosymLogEngine, SequenceRecord, Sweep,
};
use bragg_completeness::{
    snapshot, AngularCoord, CompletenessConfig, CompletenessModel, MeasuredSet, RemovalStrategy,
};

#[derive(Parser)]
#[command(name = "bragg", version, about = "Reflection completeness and sweep clustering toolkit")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyse the completeness of one measured reflection set
    Completeness(CompletenessArgs),
    /// Simulate systematic data loss and report the degraded statistics
    Simulate(SimulateArgs),
    /// Run a divisive clustering sequence over integrated sweeps
    Cluster(ClusterArgs),
    /// Join the summaries of a finished campaign
    Aggregate(AggregateArgs),
}

#[derive(Args)]
struct CompletenessArgs {
    /// Measured reflection set (JSON)
    measured: PathBuf,
    /// Keep the table in asymmetric-unit representation
    #[arg(long)]
    no_expand: bool,
    /// Where to write the summary JSON
    #[arg(long, default_value = "completeness.json")]
    summary_out: PathBuf,
    /// Also snapshot the full reflection table as CSV
    #[arg(long)]
    table_out: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyKind {
    Random,
    Range,
    Chunks,
}

#[derive(Clone, Copy, ValueEnum)]
enum CoordArg {
    R,
    Theta,
    Phi,
}

impl From<CoordArg> for AngularCoord {
    fn from(value: CoordArg) -> Self {
        match value {
            CoordArg::R => AngularCoord::R,
            CoordArg::Theta => AngularCoord::Theta,
            CoordArg::Phi => AngularCoord::Phi,
        }
    }
}

#[derive(Args)]
struct SimulateArgs {
    /// Measured reflection set (JSON)
    measured: PathBuf,
    #[arg(long, value_enum, default_value = "random")]
    strategy: StrategyKind,
    /// Fraction of unique reflections to remove
    #[arg(long, default_value_t = 0.2)]
    fraction: f64,
    /// Spherical coordinate sliced by the range and chunks strategies
    #[arg(long, value_enum, default_value = "phi")]
    coord: CoordArg,
    #[arg(long, default_value_t = 4)]
    n_chunks: usize,
    /// Independent trials, one summary each
    #[arg(long, default_value_t = 1)]
    repeats: usize,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Directory receiving summary_<n>.json per trial
    #[arg(long, default_value = "simulated")]
    out_dir: PathBuf,
}

#[derive(Args)]
struct ClusterArgs {
    /// Directory of integrated sweep subdirectories
    sweeps_dir: PathBuf,
    /// Working directory for the sequence rounds
    #[arg(long, default_value = "clustering")]
    workdir: PathBuf,
    #[arg(long, default_value = "sequence_1")]
    id: String,
    #[arg(long, default_value_t = 5000.0)]
    threshold: f64,
    #[arg(long, default_value_t = 1)]
    nprocs: usize,
    /// Skip the per-cluster scale/merge pipeline
    #[arg(long)]
    no_pipeline: bool,
    #[arg(long, default_value = "sequence.json")]
    record_out: PathBuf,
}

#[derive(Clone, Copy, ValueEnum)]
enum AggregateKind {
    /// Completeness summaries
    Summaries,
    /// Clustering sequence records
    Sequences,
}

#[derive(Args)]
struct AggregateArgs {
    #[arg(value_enum)]
    kind: AggregateKind,
    /// Snapshot files; absent ones are skipped
    paths: Vec<PathBuf>,
    /// Where to write the joined JSON (stdout when omitted)
    #[arg(long)]
    out: Option<PathBuf>,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bragg=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    match Cli::parse().command {
        Command::Completeness(args) => run_completeness(args),
        Command::Simulate(args) => run_simulate(args),
        Command::Cluster(args) => run_cluster(args),
        Command::Aggregate(args) => run_aggregate(args),
    }
}

fn load_model(measured: &Path, expand_to_p1: bool) -> Result<CompletenessModel> {
    let measured = MeasuredSet::from_json_file(measured)
        .with_context(|| format!("reading measured set {}", measured.display()))?;
    let config = CompletenessConfig {
        expand_to_p1,
        ..CompletenessConfig::default()
    };
    Ok(CompletenessModel::new(measured, config)?)
}

fn run_completeness(args: CompletenessArgs) -> Result<()> {
    let mut model = load_model(&args.measured, !args.no_expand)?;
    model.analyse()?;

    let summary = model.summary();
    snapshot::write_summary(&summary, &args.summary_out)?;
    if let Some(table_out) = &args.table_out {
        snapshot::write_table_csv(model.table(), table_out)?;
    }
    info!(
        summary = %args.summary_out.display(),
        completeness = ?summary.completeness(),
        "analysis finished"
    );
    Ok(())
}

fn run_simulate(args: SimulateArgs) -> Result<()> {
    let strategy = match args.strategy {
        StrategyKind::Random => RemovalStrategy::Random {
            fraction: args.fraction,
        },
        StrategyKind::Range => RemovalStrategy::Range {
            fraction: args.fraction,
            coord: args.coord.into(),
        },
        StrategyKind::Chunks => RemovalStrategy::Chunks {
            fraction: args.fraction,
            coord: args.coord.into(),
            n_chunks: args.n_chunks,
        },
    };
    fs::create_dir_all(&args.out_dir)?;

    let progress = ProgressBar::new(args.repeats as u64).with_style(
        ProgressStyle::with_template("{prefix} [{bar:40}] {pos}/{len}")?.progress_chars("=> "),
    );
    progress.set_prefix("simulating");

    for trial in 0..args.repeats {
        let mut model = load_model(&args.measured, true)?;
        model.analyse()?;
        let mut rng = StdRng::seed_from_u64(args.seed.wrapping_add(trial as u64));
        model.apply_removal(&strategy, &mut rng)?;
        // Derived statistics are refreshed against the degraded set
        model.analyse()?;
        let path = args.out_dir.join(format!("summary_{trial}.json"));
        snapshot::write_summary(&model.summary(), &path)?;
        progress.inc(1);
    }
    progress.finish();
    Ok(())
}

fn run_cluster(args: ClusterArgs) -> Result<()> {
    let sweeps = Sweep::discover(&args.sweeps_dir)
        .with_context(|| format!("scanning sweeps in {}", args.sweeps_dir.display()))?;
    let engine = CosymLogEngine {
        clustering_threshold: args.threshold,
        nprocs: args.nprocs,
    };
    fs::create_dir_all(&args.workdir)?;
    let sequence = ClusterSequence::new(&args.id, sweeps, engine, &args.workdir);
    let report = sequence.run()?;

    let mut cluster_outcomes = Vec::new();
    if !args.no_pipeline {
        let pipeline = ClusterPipeline {
            resolution: DialsResolution,
            scale: DialsScale {
                nprocs: args.nprocs,
                ..DialsScale::default()
            },
            merge: DialsMerge,
            free_flag: FreeFlag,
        };
        for assignment in report.assignments() {
            let round_dir = args.workdir.join(format!("cluster_{}", assignment.round));
            cluster_outcomes.push(pipeline.run(&round_dir));
        }
    }

    SequenceRecord::new(report, cluster_outcomes).write_json(&args.record_out)?;
    info!(record = %args.record_out.display(), "sequence finished");
    Ok(())
}

fn run_aggregate(args: AggregateArgs) -> Result<()> {
    let joined = match args.kind {
        AggregateKind::Summaries => {
            let summaries = snapshot::load_summaries(&args.paths)?;
            serde_json::to_string_pretty(&summaries)?
        }
        AggregateKind::Sequences => {
            let records = bragg_cluster::array::load_records(&args.paths)?;
            let assignments = bragg_cluster::array::joined_assignments(&records);
            serde_json::to_string_pretty(&assignments)?
        }
    };
    match &args.out {
        Some(path) => fs::write(path, joined)?,
        None => println!("{joined}"),
    }
    Ok(())
}
