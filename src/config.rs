//! Configuration management.
//!
//! Settings are loaded from TOML through the `config` crate and deserialized
//! with `serde`. Each monitoring task gets its own table under `[tasks.<name>]`
//! carrying the fixed set of per-task options: the histogram-name prefix, the
//! cleanup and run-merging policy switches, and the logical tags of the input
//! collections the task reads from each event.

use crate::error::{MonitorError, MonitorResult};
use crate::event::CollectionTag;
use config::{Config, FileFormat};
use serde::Deserialize;
use std::collections::HashMap;

/// Top-level application settings.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Log filter directive passed to the tracing subscriber (e.g. "info").
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Synthetic event source used by the demo binary.
    #[serde(default)]
    pub source: SourceSettings,
    /// Per-task settings keyed by task instance name.
    #[serde(default)]
    pub tasks: HashMap<String, TaskSettings>,
}

/// Per-task options, one table per task instance.
#[derive(Debug, Deserialize, Clone)]
pub struct TaskSettings {
    /// Registered task type to instantiate (e.g. "timing").
    pub r#type: String,
    /// Folder prefix under which the task books its monitoring elements.
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Remove all booked elements from the store at end of job.
    #[serde(default)]
    pub enable_cleanup: bool,
    /// Let accumulated statistics survive run boundaries.
    #[serde(default)]
    pub merge_runs: bool,
    /// Logical tag of the DCC header collection.
    #[serde(default = "default_header_tag")]
    pub dcc_header_collection: CollectionTag,
    /// Logical tag of the uncalibrated rec-hit collection.
    #[serde(default = "default_rechit_tag")]
    pub rechit_collection: CollectionTag,
    /// Logical tag of the digi collection.
    #[serde(default = "default_digi_tag")]
    pub digi_collection: CollectionTag,
}

/// Parameters of the synthetic event generator.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceSettings {
    /// Number of runs to generate.
    #[serde(default = "default_runs")]
    pub runs: u32,
    /// Events per run.
    #[serde(default = "default_events_per_run")]
    pub events_per_run: u32,
    /// Uncalibrated hits per event.
    #[serde(default = "default_hits_per_event")]
    pub hits_per_event: u32,
    /// RNG seed, fixed so demo output is reproducible.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            runs: default_runs(),
            events_per_run: default_events_per_run(),
            hits_per_event: default_hits_per_event(),
            seed: default_seed(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_prefix() -> String {
    "Calorimeter".to_string()
}

fn default_header_tag() -> CollectionTag {
    CollectionTag::new("dcc-headers")
}

fn default_rechit_tag() -> CollectionTag {
    CollectionTag::new("uncalib-rechits")
}

fn default_digi_tag() -> CollectionTag {
    CollectionTag::new("digis")
}

fn default_runs() -> u32 {
    1
}

fn default_events_per_run() -> u32 {
    100
}

fn default_hits_per_event() -> u32 {
    50
}

fn default_seed() -> u64 {
    42
}

impl Settings {
    /// Loads settings from `config/<name>.toml` (default name "default").
    pub fn new(config_name: Option<&str>) -> MonitorResult<Self> {
        let config_path = format!("config/{}", config_name.unwrap_or("default"));
        let s = Config::builder()
            .add_source(config::File::with_name(&config_path))
            .build()
            .map_err(MonitorError::Config)?;

        let settings: Settings = s.try_deserialize().map_err(MonitorError::Config)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parses settings from an in-memory TOML string.
    pub fn from_toml(toml: &str) -> MonitorResult<Self> {
        let s = Config::builder()
            .add_source(config::File::from_str(toml, FileFormat::Toml))
            .build()
            .map_err(MonitorError::Config)?;

        let settings: Settings = s.try_deserialize().map_err(MonitorError::Config)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks semantic constraints that pass deserialization but are
    /// logically invalid.
    pub fn validate(&self) -> MonitorResult<()> {
        for (name, task) in &self.tasks {
            if task.r#type.is_empty() {
                return Err(MonitorError::Configuration(format!(
                    "task '{name}' has an empty type"
                )));
            }
            if task.prefix.is_empty() {
                return Err(MonitorError::Configuration(format!(
                    "task '{name}' has an empty histogram prefix"
                )));
            }
        }
        if self.source.hits_per_event == 0 {
            return Err(MonitorError::Configuration(
                "source.hits_per_event must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
