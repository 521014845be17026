//! TacMap DST Simulator CLI
//!
//! Run deterministic fusion scenarios against a chaotic feed.

use clap::Parser;
use tacmap_core::{FusionConfig, FusionError};
use tacmap_sim::{ScenarioId, ScenarioResult, ScenarioRunner};
use thiserror::Error;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Errors that stop the simulator before any scenario runs.
#[derive(Debug, Error)]
enum SimError {
    #[error("{0} (available: {1}, all)")]
    UnknownScenario(String, String),

    #[error("--export only supports a single scenario, not 'all'")]
    ExportNeedsOneScenario,

    #[error("invalid engine config: {0}")]
    Config(#[from] FusionError),

    #[error("failed to write export: {0}")]
    Export(#[from] std::io::Error),

    #[error("failed to set tracing subscriber: {0}")]
    Logging(#[from] tracing::subscriber::SetGlobalDefaultError),
}

#[derive(Parser, Debug)]
#[command(name = "tacmap-sim")]
#[command(about = "Deterministic simulation testing for the TacMap fusion engine")]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (baseline, reorder, duplicate, corrupt, execution, late_layer, service_loop, chaos_storm, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Simulated duration in seconds
    #[arg(short, long, default_value = "60")]
    duration: f64,

    /// Batches per second
    #[arg(long, default_value = "2")]
    tick_rate: u32,

    /// Engine config JSON file
    #[arg(short, long)]
    config: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export frames of a single scenario to a JSON file
    #[arg(long)]
    export: Option<String>,
}

fn main() {
    let args = Args::parse();

    match run(&args) {
        Ok(0) => {}
        Ok(_) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    }
}

/// Runs every requested scenario and seed. Returns the number of failures.
fn run(args: &Args) -> Result<usize, SimError> {
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if !args.json {
        info!("TacMap DST Simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        let scenario = args.scenario.parse().map_err(|e| {
            let names: Vec<_> = ScenarioId::all().iter().map(|s| s.name()).collect();
            SimError::UnknownScenario(e, names.join(", "))
        })?;
        vec![scenario]
    };

    if args.export.is_some() && (scenarios.len() > 1 || args.seeds > 1) {
        return Err(SimError::ExportNeedsOneScenario);
    }

    let config = match &args.config {
        Some(path) => FusionConfig::from_file(path)?,
        None => FusionConfig::default(),
    };

    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    } else {
        args.seed
    };

    let mut all_results: Vec<ScenarioResult> = Vec::new();

    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        let runner = ScenarioRunner::new(seed)
            .with_tick_rate(args.tick_rate)
            .with_duration(args.duration)
            .with_config(config.clone())
            .with_export(args.export.is_some());

        for scenario in &scenarios {
            let result = runner.run(*scenario);

            if !args.json {
                if result.passed {
                    info!("✓ {} (seed={}) PASSED", scenario.name(), seed);
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        scenario.name(),
                        seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }

            if let (Some(path), Some(export)) = (&args.export, &result.export) {
                export.write_to_file(path)?;
                info!("Exported {} frames to {}", export.frames.len(), path);
            }

            all_results.push(result);
        }
    }

    let total = all_results.len();
    let failed_count = all_results.iter().filter(|r| !r.passed).count();

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": total - failed_count,
            "failed": failed_count,
            "results": all_results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "ticks": r.total_ticks,
                    "time_secs": r.final_time_secs,
                    "entities": r.final_entity_count,
                    "envelopes": r.metrics.envelopes_delivered,
                    "reordered": r.metrics.reordered,
                    "duplicates": r.metrics.duplicates,
                    "corrupted": r.metrics.corrupted,
                    "records_skipped": r.metrics.records_skipped,
                    "batches_rejected": r.metrics.batches_rejected,
                    "failure_reason": r.failure_reason,
                })
            }).collect::<Vec<_>>(),
        });
        println!("{:#}", summary);
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        if failed_count == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed_count, total);
            for result in all_results.iter().filter(|r| !r.passed) {
                error!(
                    "  - {} seed={}: {}",
                    result.scenario.name(),
                    result.seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
    }

    Ok(failed_count)
}
