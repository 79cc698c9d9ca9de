//! Batch list-file evaluation CLI.
//!
//! Reads two parallel filename lists (positionally paired), runs the
//! dual pipeline on every pair with bounded parallelism, and prints a
//! pass/fail summary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use seizeval_backend::algorithms::AlgorithmKind;
use seizeval_backend::orchestration::{
    DualOrchestrator, InProcessOracle, ReferenceScorer, SubprocessOracle,
};
use seizeval_backend::params::ScoringParams;
use seizeval_backend::validation::parity::DEFAULT_TOLERANCE;

#[derive(Parser, Debug)]
#[command(name = "batch_eval", about = "Run dual-pipeline evaluation over file lists")]
struct Args {
    /// List file of reference annotation paths, one per line
    #[arg(long)]
    ref_list: PathBuf,

    /// List file of hypothesis annotation paths, one per line
    #[arg(long)]
    hyp_list: PathBuf,

    /// Algorithm to run (dp, epoch, overlap, ira, taes)
    #[arg(long, default_value = "taes")]
    algorithm: String,

    /// Absolute parity tolerance
    #[arg(long, default_value_t = DEFAULT_TOLERANCE)]
    tolerance: f64,

    /// Scoring parameter TOML; defaults apply when omitted
    #[arg(long)]
    params: Option<PathBuf>,

    /// External reference oracle command; in-process mirror when omitted
    #[arg(long, env = "ORACLE_CMD")]
    oracle_cmd: Option<String>,

    /// Concurrent file pairs
    #[arg(long, env = "PARALLEL_WORKERS", default_value_t = 4)]
    parallel: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "seizeval_backend=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let algorithm = AlgorithmKind::parse(&args.algorithm)
        .with_context(|| format!("unknown algorithm: {}", args.algorithm))?;
    if matches!(algorithm, AlgorithmKind::All) {
        anyhow::bail!("batch mode runs one algorithm at a time");
    }

    let params = match &args.params {
        Some(path) => ScoringParams::from_toml_file(path)?,
        None => ScoringParams::default(),
    };

    let oracle: Arc<dyn ReferenceScorer> = match &args.oracle_cmd {
        Some(cmd) => Arc::new(SubprocessOracle::new(cmd.clone())),
        None => Arc::new(InProcessOracle::new(params.clone())),
    };

    let orchestrator = Arc::new(DualOrchestrator::new(oracle, params, args.tolerance));
    let outcome = orchestrator
        .evaluate_lists(&args.ref_list, &args.hyp_list, algorithm, args.parallel)
        .await?;

    println!(
        "{} file pairs evaluated with {}: {}",
        outcome.total_files,
        algorithm,
        if outcome.all_passed {
            "ALL PASSED"
        } else {
            "PARITY FAILURES"
        }
    );
    for result in &outcome.file_results {
        println!(
            "  [{}] {}  speedup {:.2}x",
            if result.parity_passed { "ok" } else { "FAIL" },
            result.reference,
            result.speedup
        );
    }

    if !outcome.all_passed {
        std::process::exit(1);
    }
    Ok(())
}
