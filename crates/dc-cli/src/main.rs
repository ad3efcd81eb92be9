//! Datacard generator CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dc_datacard::{DataCardGenerator, DatacardConfig, ExtractorRegistry, RunReport};
use dc_hist::MemoryStore;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "datacard")]
#[command(about = "Datacard generator with factorised QCD background measurement")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and validate a datacard configuration
    Check {
        /// Datacard configuration (YAML or JSON)
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Mine the histogram store and assemble the datacards
    Generate {
        /// Datacard configuration (YAML or JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Histogram store (JSON)
        #[arg(short, long)]
        store: PathBuf,

        /// Output directory for models and diagnostic histograms. Defaults to stdout.
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Mass point(s) to generate, overriding the configuration
        #[arg(long = "mass")]
        mass: Vec<u32>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_max_level(cli.log_level).with_target(false).init();

    match cli.command {
        Commands::Check { config } => cmd_check(&config),
        Commands::Generate { config, store, output_dir, mass } => {
            cmd_generate(&config, &store, output_dir.as_deref(), mass)
        }
    }
}

fn load_config(path: &Path) -> Result<DatacardConfig> {
    DatacardConfig::from_path(path)
        .with_context(|| format!("failed to read configuration {}", path.display()))
}

fn cmd_check(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    config.validate()?;
    let registry = ExtractorRegistry::from_definitions(&config.nuisances)?;
    let summary = serde_json::json!({
        "datacard_name": config.datacard_name,
        "mass_points": config.mass_points,
        "data_groups": config.data_groups.iter().map(|g| g.label.as_str()).collect::<Vec<_>>(),
        "nuisances": registry.ids().collect::<Vec<_>>(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn cmd_generate(
    config_path: &Path,
    store_path: &Path,
    output_dir: Option<&Path>,
    mass: Vec<u32>,
) -> Result<()> {
    let mut config = load_config(config_path)?;
    if !mass.is_empty() {
        config.mass_points = mass;
    }
    let datacard_name = config.datacard_name.clone();
    let store = MemoryStore::from_json_file(store_path)
        .with_context(|| format!("failed to read histogram store {}", store_path.display()))?;

    let mut generator = DataCardGenerator::from_config(config, &store)?;
    let report = generator.run()?;
    print_diagnostic_summary(&report);

    match output_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
            let mut written = Vec::new();
            for model in &report.models {
                let path = dir.join(model.file_name());
                std::fs::write(&path, serde_json::to_string_pretty(model)?)?;
                tracing::info!(path = %path.display(), "datacard written");
                written.push(path.display().to_string());
            }
            let info = report.histograms.write_json(dir, &datacard_name)?;
            let summary = serde_json::json!({
                "datacards": written,
                "diagnostic_histograms": info.display().to_string(),
                "warnings": report.diagnostics.len(),
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        None => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}

fn print_diagnostic_summary(report: &RunReport) {
    if report.diagnostics.is_empty() {
        return;
    }
    eprintln!("{} warning(s) during data mining:", report.diagnostics.len());
    for d in &report.diagnostics {
        eprintln!("  {}", d);
    }
}
