//! CLI entry point for lockin_daq.
//!
//! Two subcommands:
//! - `lint` loads and validates a catalog file, reporting every quantity.
//! - `demo` runs a short session against the loopback mock instrument.
//!
//! # Usage
//!
//! ```bash
//! lockin_daq lint catalogs/uhfqa.yaml
//! lockin_daq demo catalogs/uhfqa.yaml
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lockin_daq::{Catalog, DispatchEngine, EngineSettings, MockInstrument, PlaybackRate, Value};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lockin_daq")]
#[command(about = "Catalog-driven lock-in instrument control", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a catalog file and list its quantities
    Lint {
        /// Path to the catalog YAML
        catalog: PathBuf,
    },

    /// Run a short session against the built-in mock instrument
    Demo {
        /// Path to the catalog YAML
        catalog: PathBuf,

        /// Optional engine settings TOML
        #[arg(long)]
        settings: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Lint { catalog } => lint(&catalog),
        Commands::Demo { catalog, settings } => demo(&catalog, settings.as_deref()).await,
    }
}

fn lint(path: &std::path::Path) -> Result<()> {
    let catalog = Catalog::from_file(path)
        .with_context(|| format!("catalog {} failed validation", path.display()))?;

    println!(
        "catalog ok: {} ({} quantities)",
        catalog.instrument().model,
        catalog.len()
    );
    for quantity in catalog.all() {
        let def = quantity.def();
        let mut notes = Vec::new();
        if let Some(combo) = quantity.combo() {
            notes.push(format!("{} options", combo.len()));
        }
        if let Some(dep) = quantity.dependency() {
            notes.push(format!("visible under {}", catalog.at_name(dep.controller)));
        }
        if !def.enabled {
            notes.push("disabled".to_string());
        }
        println!(
            "  {:<28} {:<8} {:<6} {}",
            quantity.name(),
            def.datatype.to_string(),
            def.permission.to_string(),
            notes.join(", ")
        );
    }
    Ok(())
}

async fn demo(catalog_path: &std::path::Path, settings_path: Option<&std::path::Path>) -> Result<()> {
    let catalog = Arc::new(Catalog::from_file(catalog_path)?);
    let settings = match settings_path {
        Some(path) => EngineSettings::load(path)?,
        None => EngineSettings::from_env()?,
    };

    let (mock, handle) = MockInstrument::new();
    let engine = DispatchEngine::new(Arc::clone(&catalog), Box::new(mock), settings)?;

    println!("demo session against mock {}", catalog.instrument().model);

    engine.set("SigOut1On", Value::Bool(true)).await?;
    engine.set("OffsetSigOut1", Value::Double(0.25)).await?;
    let offset = engine.get("OffsetSigOut1").await?;
    println!("  OffsetSigOut1 = {offset}");

    engine
        .set("RangeSigOut1", Value::Str("150 mV".to_string()))
        .await?;
    let range = engine.get("RangeSigOut1").await?;
    println!("  RangeSigOut1  = {range}");

    let ramp = [0.0, 0.5, -0.5, 1.0];
    engine
        .upload_waveform("LoadedVector", &ramp, PlaybackRate::Div8)
        .await?;
    println!("  uploaded {} samples at {} Hz", ramp.len(), PlaybackRate::Div8.hertz());

    engine.set("ScopeRun", Value::Bool(true)).await?;
    handle.set_node(&trace_path(&catalog), "0,0.25,0.5,0.25,0").await;
    handle.delay_data(&trace_path(&catalog), 2).await;
    let trace = engine
        .fetch_trace("ScopeVector", Duration::from_secs(1))
        .await?;
    println!(
        "  trace: {} samples ({} / {})",
        trace.samples.len(),
        trace.x_name.as_deref().unwrap_or("x"),
        trace.x_unit.as_deref().unwrap_or("-")
    );

    for command in handle.log().await {
        println!("  wire: {command}");
    }
    Ok(())
}

fn trace_path(catalog: &Catalog) -> String {
    let dev = catalog
        .instrument()
        .default_address
        .clone()
        .unwrap_or_else(|| "dev0".to_string());
    format!("/{dev}/scopes/0/wave")
}
