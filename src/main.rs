//! CLI entry point for the calorimeter monitoring demo.
//!
//! Builds the monitoring store, geometry and task set from configuration,
//! generates synthetic runs, drives the tasks through a complete job, and
//! optionally writes a JSON snapshot of every booked element.
//!
//! # Usage
//!
//! Run with the default configuration:
//! ```bash
//! calo_monitor
//! ```
//!
//! Use an alternate config and dump the store:
//! ```bash
//! calo_monitor --config cosmics --output snapshot.json
//! ```

use anyhow::{Context, Result};
use calo_monitor::config::Settings;
use calo_monitor::harness::RunHarness;
use calo_monitor::source::SyntheticSource;
use calo_monitor::store::MonitorStore;
use calo_monitor::tasks::{TaskContext, TaskRegistry};
use clap::Parser;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "calo_monitor")]
#[command(about = "Calorimeter monitoring over synthetic runs", long_about = None)]
struct Cli {
    /// Configuration name, resolved as config/<name>.toml
    #[arg(short, long)]
    config: Option<String>,

    /// Write a JSON snapshot of the store here after the job
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::new(cli.config.as_deref()).context("loading configuration")?;

    let filter =
        EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let store = Arc::new(MonitorStore::new());
    let registry = TaskRegistry::with_builtins();

    let mut harness = RunHarness::new();
    let mut task_names: Vec<&String> = settings.tasks.keys().collect();
    task_names.sort();
    for name in task_names {
        let task_settings = settings.tasks[name].clone();
        let task_type = task_settings.r#type.clone();
        let ctx = TaskContext {
            name: name.clone(),
            store: Some(Arc::clone(&store)),
            settings: task_settings,
        };
        let task = registry
            .create(&task_type, ctx)
            .with_context(|| format!("creating task '{name}'"))?;
        harness.add_task(task);
        info!(task = %name, task_type = %task_type, "task registered");
    }

    let mut source = SyntheticSource::new(settings.source.clone());
    let runs = source.generate();

    let summary = harness.run_job(runs)?;
    info!(
        runs = summary.runs,
        events = summary.events,
        elements = store.element_count(),
        "monitoring job complete"
    );

    if let Some(path) = cli.output {
        let file = File::create(&path)
            .with_context(|| format!("creating snapshot file {}", path.display()))?;
        serde_json::to_writer_pretty(file, &store.snapshot()).context("writing snapshot")?;
        info!(path = %path.display(), "store snapshot written");
    }

    Ok(())
}
