use std::path::PathBuf;
use std::sync::Arc;

use bar_optimizer::cache::PatternCache;
use bar_optimizer::engine::Optimizer;
use bar_optimizer::progress::{ProgressEvent, ProgressSink};
use bar_optimizer::render;
use bar_optimizer::types::{CuttingSpec, PieceDef};
use clap::Parser;

#[derive(Parser)]
#[command(
    name = "bar_optimizer",
    about = "1D bar cutting stock optimizer: patterns + bundle allocation"
)]
struct Cli {
    /// Stock bar length in mm
    #[arg(long)]
    stock_length: f64,

    /// Required pieces as NAME:LENGTH:QTY (e.g. A:1196:10 B:1796:5)
    #[arg(long = "piece", num_args = 1..)]
    pieces: Vec<String>,

    /// Blade kerf width in mm
    #[arg(long, default_value_t = 0.0)]
    blade: f64,

    /// Head/tail trim allowance in mm
    #[arg(long, default_value_t = 0.0)]
    trim: f64,

    /// Allowed bundle factors (factor 1 is always available)
    #[arg(long, value_delimiter = ',', default_value = "1")]
    factors: Vec<u32>,

    /// Cap on manually cut (factor 1) bundles; unlimited if omitted
    #[arg(long)]
    manual_cap: Option<u64>,

    /// Allowed surplus per piece type
    #[arg(long, default_value_t = 0)]
    surplus: u64,

    /// Phase 2 time budget in seconds
    #[arg(long, default_value_t = 30)]
    time_budget: u64,

    /// Directory for the pattern cache
    #[arg(long, default_value = "pattern_cache")]
    cache_dir: PathBuf,

    /// Suppress progress output on stderr
    #[arg(long)]
    quiet: bool,
}

fn parse_piece(s: &str) -> Result<PieceDef, String> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 3 {
        return Err(format!("invalid piece '{}', expected NAME:LENGTH:QTY", s));
    }
    let length = parts[1]
        .parse::<f64>()
        .map_err(|_| format!("invalid length in '{}'", s))?;
    let demand = parts[2]
        .parse::<u64>()
        .map_err(|_| format!("invalid quantity in '{}'", s))?;
    Ok(PieceDef {
        name: parts[0].to_string(),
        length,
        demand,
    })
}

/// Prints progress to stderr so stdout stays a clean plan.
struct StderrSink;

impl ProgressSink for StderrSink {
    fn emit(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Started {
                pieces,
                stock_length,
            } => eprintln!("optimizing {pieces} piece types on {stock_length} stock"),
            ProgressEvent::CacheHit { patterns } => {
                eprintln!("{patterns} patterns found in cache")
            }
            ProgressEvent::CacheInadequate { patterns } => {
                eprintln!("cached set too small ({patterns}), regenerating")
            }
            ProgressEvent::GenerationStarted { max_solutions } => {
                eprintln!("searching patterns (up to {max_solutions})...")
            }
            ProgressEvent::PatternsFound {
                count,
                latest_waste,
            } => eprintln!("pattern {count}: waste {latest_waste:.1}mm"),
            ProgressEvent::PatternsFiltered { before, after } => {
                eprintln!("complexity filter: {before} -> {after} patterns")
            }
            ProgressEvent::PhaseOneComplete { patterns } => {
                eprintln!("phase 1 complete: {patterns} patterns")
            }
            ProgressEvent::Tick {
                elapsed_secs,
                budget_secs,
            } => eprintln!("solving: {elapsed_secs}/{budget_secs}s"),
            ProgressEvent::PhaseTwoComplete {
                quality,
                total_bars,
            } => eprintln!("phase 2 complete: {total_bars} bars ({quality:?})"),
            ProgressEvent::Failed { message } => eprintln!("failed: {message}"),
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let pieces: Vec<PieceDef> = cli
        .pieces
        .iter()
        .map(|p| parse_piece(p))
        .collect::<Result<Vec<_>, _>>()
        .unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        });

    let spec = CuttingSpec {
        stock_length: cli.stock_length,
        blade_width: cli.blade,
        trim_allowance: cli.trim,
        pieces,
        bundle_factors: cli.factors,
        manual_cut_cap: cli.manual_cap.unwrap_or(u64::MAX),
        max_surplus: cli.surplus,
        time_budget_secs: cli.time_budget,
    };

    let sink: Arc<dyn ProgressSink> = if cli.quiet {
        Arc::new(bar_optimizer::progress::NullSink)
    } else {
        Arc::new(StderrSink)
    };

    let optimizer = Optimizer::new(spec.clone(), PatternCache::new(cli.cache_dir), sink)
        .unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        });

    let outcome = optimizer.run().unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });

    print!(
        "{}",
        render::render_plan(&spec, &outcome.patterns, &outcome.plan)
    );
}
