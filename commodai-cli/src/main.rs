//! CommodAI CLI: anomaly detection, clustering and context enrichment over
//! commodity price series.
//!
//! Commands:
//! - `run`: full pipeline; writes dataset.csv, regions.csv and report.json
//! - `detect`: load and detect only; prints regions per entity
//! - `config`: print the default configuration as TOML

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commodai_core::domain::AnomalyRegion;
use commodai_runner::{
    run_pipeline, save_artifacts, InputFiles, NamedInput, Pipeline, PipelineConfig, RunReport,
};

#[derive(Parser)]
#[command(
    name = "commodai",
    about = "CommodAI: anomaly regions in commodity prices, clustered and explained"
)]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline and write artifacts.
    Run {
        /// Price file(s): date, entity_id, close_price.
        #[arg(long, required = true)]
        prices: Vec<PathBuf>,

        /// Macro series as `name=path` (or a bare path; the file stem names it).
        #[arg(long = "macro")]
        macros: Vec<String>,

        /// Weather file(s), optionally `name=path`.
        #[arg(long)]
        weather: Vec<String>,

        /// Headline CSV (date, title, url) used as the context source.
        #[arg(long)]
        news: Option<PathBuf>,

        /// Path to a TOML config file. Defaults apply to anything it omits.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output directory for artifacts.
        #[arg(long, default_value = "output")]
        output_dir: PathBuf,
    },
    /// Detect anomaly regions only (no clustering or enrichment).
    Detect {
        /// Price file(s): date, entity_id, close_price.
        #[arg(long, required = true)]
        prices: Vec<PathBuf>,

        /// Path to a TOML config file.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the default configuration as TOML.
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    match cli.command {
        Commands::Run {
            prices,
            macros,
            weather,
            news,
            config,
            output_dir,
        } => run_cmd(prices, macros, weather, news, config, output_dir, cli.json),
        Commands::Detect { prices, config } => detect_cmd(prices, config, cli.json),
        Commands::Config => config_cmd(),
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("commodai=info,warn"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        registry.with(fmt::layer().compact().with_writer(std::io::stderr)).init();
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn check_inputs(paths: &[PathBuf]) -> Result<()> {
    for path in paths {
        if !path.is_file() {
            bail!("input file not found: {}", path.display());
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_cmd(
    prices: Vec<PathBuf>,
    macros: Vec<String>,
    weather: Vec<String>,
    news: Option<PathBuf>,
    config_path: Option<PathBuf>,
    output_dir: PathBuf,
    json: bool,
) -> Result<()> {
    check_inputs(&prices)?;
    let config = load_config(config_path.as_deref())?;
    let files = InputFiles {
        prices,
        macros: macros.iter().map(|m| NamedInput::parse(m)).collect(),
        weather: weather.iter().map(|w| NamedInput::parse(w)).collect(),
    };

    let output = run_pipeline(config, &files, news.as_deref())?;
    let dir = save_artifacts(&output, &output_dir)?;
    tracing::info!(
        dir = %dir.display(),
        rows = output.report.output_rows,
        regions = output.report.total_regions(),
        "run complete"
    );

    if json {
        println!("{}", serde_json::to_string(&output.report)?);
    } else {
        print_summary(&output.report);
        println!("Artifacts saved to: {}", dir.display());
    }
    Ok(())
}

fn detect_cmd(prices: Vec<PathBuf>, config_path: Option<PathBuf>, json: bool) -> Result<()> {
    check_inputs(&prices)?;
    let config = load_config(config_path.as_deref())?;
    let files = InputFiles {
        prices,
        ..InputFiles::default()
    };

    let pipeline = Pipeline::new(config)?;
    let (loaded, detections) = pipeline.detect(&files)?;

    if json {
        let regions = detections.regions();
        println!("{}", serde_json::to_string_pretty(&regions)?);
        return Ok(());
    }

    for failure in &loaded.failures {
        println!("skipped {}: {}", failure.entity, failure.error);
    }
    for (entity, error) in &detections.failures {
        println!("skipped {entity}: {error}");
    }
    for (entity, detection) in &detections.detections {
        let note = if detection.flat { " (flat)" } else { "" };
        println!();
        println!("{entity}: {} region(s){note}", detection.regions.len());
        for region in &detection.regions {
            print_region(region);
        }
    }
    Ok(())
}

fn config_cmd() -> Result<()> {
    print!("{}", PipelineConfig::default().to_toml()?);
    Ok(())
}

fn print_region(r: &AnomalyRegion) {
    println!(
        "  {:<12} {} .. {}  {:>3} pts  peak {:.3}  mean {:.3}",
        r.id.as_str(),
        r.start,
        r.end,
        r.point_count,
        r.peak_score,
        r.mean_score
    );
}

fn print_summary(report: &RunReport) {
    println!();
    println!("=== CommodAI Run ===");
    println!("Config hash:  {}", &report.config_hash[..12.min(report.config_hash.len())]);
    println!("Dataset hash: {}", report.dataset_hash);
    for line in report.summary_lines() {
        println!("{line}");
    }
    if !report.is_clean() {
        println!();
        println!("WARNING: some inputs were skipped or degraded; see report.json");
    }
    println!();
}
