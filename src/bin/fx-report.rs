//! fx-report CLI - build FX rate reports from the command line
//!
//! ## Example Usage
//!
//! ```bash
//! # ECB and investing.com only, August to September 2022
//! fx-report run --from 2022-08 --to 2022-09 --no-apilayer
//!
//! # Configured pairs per source
//! fx-report sources
//!
//! # Months that can be requested
//! fx-report months
//!
//! # investing.com id of a new pair
//! fx-report instrument EUR/RSD
//! ```

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use colored::Colorize;
use fx_report::calendar;
use fx_report::config::Settings;
use fx_report::error::{ErrorKind, FxError};
use fx_report::pipeline::{Pipeline, ReportArtifact};
use fx_report::sources::QuotaStatus;
use fx_report::types::SourceSelection;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::process;
use std::time::{Duration, Instant};

/// fx-report: FX rate reports from ECB, apilayer and investing.com
#[derive(Parser)]
#[command(name = "fx-report")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Fetch, reconcile and export FX rates", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a report for a range of months
    Run {
        /// First month (YYYY-MM)
        #[arg(long = "from", value_name = "YYYY-MM")]
        date_from: String,

        /// Last month (YYYY-MM), must be after --from
        #[arg(long = "to", value_name = "YYYY-MM")]
        date_to: String,

        /// Skip the ECB reference rates
        #[arg(long)]
        no_ecb: bool,

        /// Skip the apilayer commercial rates
        #[arg(long)]
        no_apilayer: bool,

        /// Skip the investing.com monthly history
        #[arg(long)]
        no_investing: bool,

        /// Output directory (overrides the configured one)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },

    /// List configured currency pairs per source
    Sources,

    /// Look up investing.com instrument ids for `[investing.instruments]`
    Instrument {
        /// Pair or name to search for, e.g. EUR/RSD
        #[arg(value_name = "QUERY")]
        query: String,

        /// Maximum number of matches
        #[arg(short = 'l', long, default_value = "1")]
        limit: usize,
    },

    /// List selectable months, newest first
    Months {
        /// How many years back
        #[arg(short = 'y', long, default_value = "3")]
        years: u32,
    },
}

fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(".fx-report").join("config.toml"))
        .filter(|path| path.exists())
}

fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let path = path.map(Path::to_path_buf).or_else(default_config_path);
    Settings::load(path.as_deref()).context("loading configuration")
}

fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<FxError>().map(FxError::kind) {
        Some(ErrorKind::InvalidRange) | Some(ErrorKind::NoData) => 2,
        Some(ErrorKind::SourceUnavailable) => 3,
        _ => 1,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = dispatch(cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        process::exit(exit_code(&e));
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let mut settings = load_settings(cli.config.as_deref())?;

    if cli.verbose {
        println!(
            "{} v{}",
            "fx-report".cyan().bold(),
            env!("CARGO_PKG_VERSION")
        );
        println!(
            "Output dir: {}",
            settings.output_dir.display().to_string().dimmed()
        );
    }

    match cli.command {
        Commands::Run {
            date_from,
            date_to,
            no_ecb,
            no_apilayer,
            no_investing,
            output,
        } => {
            if let Some(dir) = output {
                settings.output_dir = dir;
            }
            let sources = SourceSelection {
                ecb: !no_ecb,
                commercial: !no_apilayer,
                quote_history: !no_investing,
            };
            run_report(settings, &date_from, &date_to, sources).await
        }
        Commands::Sources => {
            list_sources(&settings);
            Ok(())
        }
        Commands::Instrument { query, limit } => {
            search_instruments(settings, &query, limit).await
        }
        Commands::Months { years } => {
            for month in calendar::selectable_months(Utc::now().date_naive(), years) {
                println!("{}", month);
            }
            Ok(())
        }
    }
}

async fn run_report(
    settings: Settings,
    date_from: &str,
    date_to: &str,
    sources: SourceSelection,
) -> anyhow::Result<()> {
    let pipeline = Pipeline::new(settings)?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(format!("Building report {} to {}...", date_from, date_to));

    let start = Instant::now();
    let result = pipeline.run(date_from, date_to, sources).await;
    pb.finish_and_clear();

    let artifact = result?;
    print_artifact(&artifact, start.elapsed());

    if let Some(quota) = QuotaStatus::load(pipeline.cache().as_ref()) {
        let label = format!("{} ({}%)", quota.label(), quota.percent());
        let label = if quota.percent() < 10 {
            label.as_str().red()
        } else {
            label.as_str().normal()
        };
        println!("  {} {}", "apilayer quota:".bold(), label);
    }
    Ok(())
}

fn print_artifact(artifact: &ReportArtifact, elapsed: Duration) {
    println!("{} {}", "Report written:".green().bold(), artifact.name);
    println!("  {} {}", "Path:".bold(), artifact.path.display());
    println!(
        "  {} {} to {}",
        "Range:".bold(),
        artifact.range.date_from,
        artifact.range.date_to
    );
    let active: Vec<String> = artifact
        .sources
        .active()
        .iter()
        .map(|s| s.to_string())
        .collect();
    println!("  {} {}", "Sources:".bold(), active.join(", "));
    println!(
        "  {} daily={} spot={} monthly={}",
        "Rows:".bold(),
        artifact.daily_rows,
        artifact.spot_rows,
        artifact.monthly_rows
    );
    println!("  {} {:.2}s", "Elapsed:".bold(), elapsed.as_secs_f64());
}

async fn search_instruments(settings: Settings, query: &str, limit: usize) -> anyhow::Result<()> {
    let pipeline = Pipeline::new(settings)?;
    let matches = pipeline.search_instruments(query, limit).await?;

    if matches.is_empty() {
        println!("{} no instrument matches '{}'", "Warning:".yellow(), query);
        return Ok(());
    }

    for m in &matches {
        println!(
            "{} {} {} {}",
            m.id.to_string().green().bold(),
            m.symbol.as_str().bold(),
            m.description,
            format!("({} {})", m.kind, m.exchange).dimmed()
        );
    }
    Ok(())
}

fn list_sources(settings: &Settings) {
    println!("{}", "Configured sources".cyan().bold());
    println!(
        "  {} {}",
        "ecb:".bold(),
        settings.pair_labels(&settings.ecb.symbols)
    );
    println!(
        "  {} {}",
        "apilayer:".bold(),
        settings.pair_labels(&settings.apilayer.symbols)
    );
    if settings.apilayer_key().is_err() {
        println!("    {}", "api_key not configured".yellow());
    }
    let pairs: Vec<&str> = settings
        .investing
        .instruments
        .keys()
        .map(String::as_str)
        .collect();
    println!("  {} {}", "investing:".bold(), pairs.join(", "));
}
