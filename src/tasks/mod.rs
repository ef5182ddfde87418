//! Monitoring task system: the plugin surface of the pipeline.
//!
//! This module defines the [`MonitorTask`] trait, which every monitoring
//! plugin implements. A task is instantiated per job, driven through the
//! run/event lifecycle by the harness, and torn down at job end. Tasks read
//! input collections from each [`Event`], map channels through the
//! [`Geometry`] service, and accumulate into elements booked on the
//! monitoring store.
//!
//! # Lifecycle
//!
//! ```text
//! begin_job ──> begin_run ──> analyze (per event) ──> end_run ──> end_job
//!                  ^                                     │
//!                  └────────────── next run ─────────────┘
//! ```
//!
//! The harness guarantees the partial order above, one event in flight at a
//! time, and initializes the geometry service before `begin_run`. A task
//! error aborts the job; recoverable conditions (missing input collections)
//! are logged and swallowed inside the task instead.
//!
//! # Registry
//!
//! [`TaskRegistry`] maps task-type names to factory functions so the binary
//! can create tasks from configuration without hardcoding types, the same
//! way instruments and modules are registered elsewhere in the pipeline.

pub mod rechit_validation;
pub mod timing;

use crate::config::TaskSettings;
use crate::error::{MonitorError, MonitorResult};
use crate::event::{Event, RunHeader};
use crate::geometry::Geometry;
use crate::store::MonitorStore;
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;

/// Everything a task factory needs to build a task instance.
#[derive(Clone)]
pub struct TaskContext {
    /// Instance name, from the configuration key.
    pub name: String,
    /// Store service, absent when monitoring is disabled. Tasks degrade to
    /// no-ops without it.
    pub store: Option<Arc<MonitorStore>>,
    /// Per-task settings.
    pub settings: TaskSettings,
}

/// Base trait for all monitoring tasks.
///
/// Implementations must be `Send` so the harness can own a heterogeneous
/// set of boxed tasks regardless of where the job is driven from.
pub trait MonitorTask: Send {
    /// Instance name, used for routing and log context.
    fn name(&self) -> &str;

    /// Called once before the first run. Resets job-level state.
    fn begin_job(&mut self) -> Result<()>;

    /// Called at every run boundary, after the geometry service has been
    /// aligned with the new run.
    fn begin_run(&mut self, run: &RunHeader, geometry: &Geometry) -> Result<()>;

    /// Called once per event, in order.
    fn analyze(&mut self, event: &Event, geometry: &Geometry) -> Result<()>;

    /// Called when a run ends. Default: nothing to do.
    fn end_run(&mut self, _run: &RunHeader, _geometry: &Geometry) -> Result<()> {
        Ok(())
    }

    /// Called once after the last run.
    fn end_job(&mut self) -> Result<()>;
}

type TaskFactory = Box<dyn Fn(TaskContext) -> Box<dyn MonitorTask> + Send + Sync>;

/// Registry for task factory functions.
pub struct TaskRegistry {
    factories: HashMap<String, TaskFactory>,
}

impl TaskRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Creates a registry with the built-in task types registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("timing", |ctx| Box::new(timing::TimingTask::new(ctx)));
        registry.register("rechit-validation", |ctx| {
            Box::new(rechit_validation::RecHitValidationTask::new(ctx))
        });
        registry
    }

    /// Registers a factory under a task-type name.
    pub fn register<F>(&mut self, task_type: &str, factory: F)
    where
        F: Fn(TaskContext) -> Box<dyn MonitorTask> + Send + Sync + 'static,
    {
        self.factories
            .insert(task_type.to_string(), Box::new(factory));
    }

    /// Creates a task instance of a registered type.
    pub fn create(&self, task_type: &str, ctx: TaskContext) -> MonitorResult<Box<dyn MonitorTask>> {
        let factory = self
            .factories
            .get(task_type)
            .ok_or_else(|| MonitorError::UnknownTask(task_type.to_string()))?;
        Ok(factory(ctx))
    }

    /// Lists all registered task types.
    pub fn list_types(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    fn task_settings() -> TaskSettings {
        let settings = Settings::from_toml(
            r#"
            [tasks.t]
            type = "timing"
            "#,
        )
        .unwrap();
        settings.tasks["t"].clone()
    }

    struct NoopTask {
        name: String,
    }

    impl MonitorTask for NoopTask {
        fn name(&self) -> &str {
            &self.name
        }

        fn begin_job(&mut self) -> Result<()> {
            Ok(())
        }

        fn begin_run(&mut self, _run: &RunHeader, _geometry: &Geometry) -> Result<()> {
            Ok(())
        }

        fn analyze(&mut self, _event: &Event, _geometry: &Geometry) -> Result<()> {
            Ok(())
        }

        fn end_job(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn registry_creates_registered_types() {
        let mut registry = TaskRegistry::new();
        registry.register("noop", |ctx| Box::new(NoopTask { name: ctx.name }));

        let ctx = TaskContext {
            name: "n1".to_string(),
            store: None,
            settings: task_settings(),
        };
        let task = registry.create("noop", ctx).unwrap();
        assert_eq!(task.name(), "n1");
    }

    #[test]
    fn unknown_type_is_an_error() {
        let registry = TaskRegistry::new();
        let ctx = TaskContext {
            name: "n1".to_string(),
            store: None,
            settings: task_settings(),
        };
        let result = registry.create("missing", ctx);
        assert!(matches!(result, Err(MonitorError::UnknownTask(_))));
    }

    #[test]
    fn builtins_are_registered() {
        let registry = TaskRegistry::with_builtins();
        let types = registry.list_types();
        assert!(types.contains(&"timing".to_string()));
        assert!(types.contains(&"rechit-validation".to_string()));
    }
}
