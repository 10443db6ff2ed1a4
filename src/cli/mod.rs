//! Market Regimes CLI Module
//!
//! Command-line interface for running the regime pipeline on quote files.

use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::pipeline::{PipelineConfig, RegimePipeline, RegimeReport};
use crate::preprocessing::returns::ReturnsTransform;
use crate::utils::data_loader::DataLoader;

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString    { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn kv(key: &str, val: &str) {
    println!("  {:<20} {}", muted(key), val.white());
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "market-regimes")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Identify market regimes from daily quotes with cross-validated clustering")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full regime pipeline on a quote file
    Run {
        /// CSV with date, PERMNO, BIDLO, ASKHI, VOL, RETX columns
        #[arg(short, long)]
        data: PathBuf,

        /// JSON pipeline config; missing keys take their defaults
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Write the labeled timeline as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Skip the PCA stage
        #[arg(long)]
        no_decompose: bool,

        /// Worker threads for the cross-validated search (0 = all cores)
        #[arg(long)]
        n_jobs: Option<usize>,
    },

    /// Print the default config as JSON
    Config {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Summarize a quote file
    Info {
        #[arg(short, long)]
        data: PathBuf,
    },
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_run(
    data_path: &Path,
    config_path: Option<&Path>,
    output: Option<&Path>,
    no_decompose: bool,
    n_jobs: Option<usize>,
) -> anyhow::Result<()> {
    section("Regimes");

    let mut config = match config_path {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    if no_decompose {
        config.decompose = false;
    }
    if let Some(n) = n_jobs {
        config.search.n_jobs = Some(n);
    }

    step_run("Loading quotes");
    let start = Instant::now();
    let records = DataLoader::new().load_quotes(data_path)?;
    step_done(&format!("{} records in {:?}", records.len(), start.elapsed()));

    step_run("Weighting returns");
    let returns = ReturnsTransform::new(config.alpha).transform(&records)?;
    step_done(&format!(
        "{} days × {} instruments",
        returns.n_days(),
        returns.n_instruments()
    ));

    step_run("Fitting pipeline");
    let start = Instant::now();
    let report = RegimePipeline::new(config).run(returns.matrix.view(), &returns.index)?;
    step_done(&format!("{:?}", start.elapsed()));

    print_report(&report);

    if let Some(path) = output {
        step_run(&format!("Saving → {}", path.display()));
        std::fs::write(path, serde_json::to_string_pretty(&report.timeline)?)?;
        step_done(&format!("{} labeled days", report.timeline.len()));
    }

    println!();
    Ok(())
}

fn print_report(report: &RegimeReport) {
    println!();
    if let Some(d) = &report.decomposition {
        let explained: f64 = d.explained_variance_ratio.iter().sum();
        kv("Components", &d.n_components.to_string());
        kv("Explained variance", &format!("{:.1}%", explained * 100.0));
        kv("Dropped rows", &d.n_dropped.to_string());
    }
    kv("Regimes", &report.n_regimes.to_string().bold().to_string());
    kv("Mixture score", &format!("{:.4}", report.mixture_score));
    kv("K-means iterations", &report.kmeans_iterations.to_string());
    kv("Days labeled", &format!("{} of {}", report.rows_kept, report.rows_in));
    kv("Transitions", &report.timeline.transitions().len().to_string());

    println!();
    for (regime, days) in report.regime_counts() {
        println!("  {} {:<4} {}", accent("●"), regime, muted(&format!("{} days", days)));
    }
}

pub fn cmd_config(output: Option<&Path>) -> anyhow::Result<()> {
    let json = PipelineConfig::default().to_json()?;
    match output {
        Some(path) => {
            std::fs::write(path, json)?;
            println!("  {} {}", ok("✓"), format!("Wrote {}", path.display()));
        }
        None => println!("{}", json),
    }
    Ok(())
}

pub fn cmd_info(data_path: &Path) -> anyhow::Result<()> {
    section("Info");

    step_run("Loading quotes");
    let records = DataLoader::new().load_quotes(data_path)?;
    step_done(&format!("{} records", records.len()));

    let first = records.iter().map(|r| r.date).min();
    let last = records.iter().map(|r| r.date).max();
    let instruments: std::collections::BTreeSet<i64> = records.iter().map(|r| r.permno).collect();
    let missing_retx = records.iter().filter(|r| r.retx.is_none()).count();

    println!();
    if let (Some(first), Some(last)) = (first, last) {
        kv("Date range", &format!("{} → {}", first, last));
    }
    kv("Instruments", &instruments.len().to_string());
    kv("Missing RETX", &missing_retx.to_string());
    println!();
    Ok(())
}
