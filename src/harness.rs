//! Run harness: drives monitoring tasks through the job lifecycle.
//!
//! The harness is the in-crate stand-in for the host pipeline's scheduler.
//! It owns the registered tasks and the geometry service and walks them
//! through begin_job, per-run begin_run/analyze/end_run, and end_job, in
//! that partial order with one event in flight at a time. Task errors abort
//! the job with context; everything recoverable is handled inside the tasks.

use crate::event::{Event, RunHeader};
use crate::geometry::Geometry;
use crate::tasks::MonitorTask;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use std::fmt;
use tracing::info;

/// Harness execution state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobState {
    /// No job has been started yet.
    Idle,
    /// A job is being executed.
    Running,
    /// The last job completed successfully.
    Finished,
    /// The last job aborted on a task error.
    Error,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Idle => "idle",
            JobState::Running => "running",
            JobState::Finished => "finished",
            JobState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Real-time visibility into job progress.
#[derive(Clone, Debug)]
pub struct HarnessStatus {
    /// Current execution state.
    pub state: JobState,
    /// Run currently being processed, if any.
    pub current_run: Option<u32>,
    /// Events dispatched so far in the current job.
    pub events: u64,
    /// Message of the error that aborted the last job, if any.
    pub last_error: Option<String>,
}

impl Default for HarnessStatus {
    fn default() -> Self {
        Self {
            state: JobState::Idle,
            current_run: None,
            events: 0,
            last_error: None,
        }
    }
}

/// One run's worth of input: header plus events in dispatch order.
pub struct RunData {
    /// Run header.
    pub header: RunHeader,
    /// Events belonging to this run.
    pub events: Vec<Event>,
}

/// Summary returned after a completed job.
#[derive(Clone, Debug)]
pub struct JobSummary {
    /// Number of runs processed.
    pub runs: usize,
    /// Total events dispatched to the tasks.
    pub events: u64,
    /// Wall-clock start of the job.
    pub started: DateTime<Utc>,
    /// Wall-clock end of the job.
    pub finished: DateTime<Utc>,
}

/// Synchronous driver for a set of monitoring tasks.
#[derive(Default)]
pub struct RunHarness {
    tasks: Vec<Box<dyn MonitorTask>>,
    geometry: Geometry,
    status: HarnessStatus,
}

impl RunHarness {
    /// Creates a harness with no tasks registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a task. Tasks see every run and event in registration
    /// order.
    pub fn add_task(&mut self, task: Box<dyn MonitorTask>) {
        self.tasks.push(task);
    }

    /// Number of registered tasks.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Current harness status.
    pub fn status(&self) -> HarnessStatus {
        self.status.clone()
    }

    /// The geometry service the tasks are driven against.
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Executes one complete job over the given runs.
    ///
    /// Boundaries are invoked exactly once per run, in order, with the
    /// geometry service aligned before `begin_run`. Returns a summary on
    /// success; the first task error aborts the job and is returned with
    /// context.
    pub fn run_job(&mut self, runs: Vec<RunData>) -> Result<JobSummary> {
        if self.status.state == JobState::Running {
            bail!("a job is already in progress");
        }

        self.status = HarnessStatus {
            state: JobState::Running,
            ..HarnessStatus::default()
        };
        let started = Utc::now();
        let run_count = runs.len();

        match self.execute(runs) {
            Ok(events) => {
                self.status.state = JobState::Finished;
                self.status.current_run = None;
                let finished = Utc::now();
                info!(runs = run_count, events, "job finished");
                Ok(JobSummary {
                    runs: run_count,
                    events,
                    started,
                    finished,
                })
            }
            Err(err) => {
                self.status.state = JobState::Error;
                self.status.last_error = Some(format!("{err:#}"));
                Err(err)
            }
        }
    }

    fn execute(&mut self, runs: Vec<RunData>) -> Result<u64> {
        for task in &mut self.tasks {
            let name = task.name().to_string();
            task.begin_job()
                .with_context(|| format!("task '{name}' failed at begin-of-job"))?;
        }

        let mut events: u64 = 0;

        for run in runs {
            let number = run.header.number;
            info!(run = number, events = run.events.len(), "begin run");
            self.geometry.init_run(number);
            self.status.current_run = Some(number);

            for task in &mut self.tasks {
                let name = task.name().to_string();
                task.begin_run(&run.header, &self.geometry)
                    .with_context(|| format!("task '{name}' failed at begin of run {number}"))?;
            }

            for event in &run.events {
                for task in &mut self.tasks {
                    let name = task.name().to_string();
                    task.analyze(event, &self.geometry).with_context(|| {
                        format!("task '{name}' failed on event {} of run {number}", event.id)
                    })?;
                }
                events += 1;
                self.status.events = events;
            }

            for task in &mut self.tasks {
                let name = task.name().to_string();
                task.end_run(&run.header, &self.geometry)
                    .with_context(|| format!("task '{name}' failed at end of run {number}"))?;
            }
            info!(run = number, "end run");
        }

        for task in &mut self.tasks {
            let name = task.name().to_string();
            task.end_job()
                .with_context(|| format!("task '{name}' failed at end-of-job"))?;
        }

        Ok(events)
    }
}
