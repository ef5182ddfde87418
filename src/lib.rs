//! # Calorimeter Monitoring Library
//!
//! This crate implements detector-monitoring and validation tasks for a
//! modular calorimeter data-acquisition and simulation pipeline, together
//! with the minimal services they run against. Tasks are plugins: the
//! harness instantiates them per job, feeds them events, and tears them down
//! at job end. Everything a task accumulates lands in histogram-like
//! monitoring elements owned by the store service.
//!
//! ## Crate Structure
//!
//! The library is organized into several modules, each with a distinct
//! responsibility:
//!
//! - **`config`**: Structures for loading and validating settings from TOML
//!   files. See `config::Settings`.
//! - **`error`**: The `MonitorError` enum for centralized error handling.
//! - **`event`**: The event data model — collections of DCC headers,
//!   uncalibrated rec hits and digitized frames, keyed by logical tag.
//! - **`geometry`**: Validated channel coordinates and the per-run
//!   numbering service (supermodule indices, labels, DCC mapping).
//! - **`harness`**: The synchronous run/event lifecycle driver.
//! - **`source`**: Seeded synthetic event generation for the demo binary
//!   and integration tests.
//! - **`store`**: The monitoring store service and its element shapes
//!   (1-D/2-D histograms and profiles).
//! - **`tasks`**: The `MonitorTask` trait, the task registry, and the
//!   concrete monitoring tasks (timing, rec-hit validation).

pub mod config;
pub mod error;
pub mod event;
pub mod geometry;
pub mod harness;
pub mod source;
pub mod store;
pub mod tasks;
