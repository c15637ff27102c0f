//! # Temperature Stream Logger
//!
//! Streams voltage samples from a data-acquisition device, converts them to
//! temperatures and appends them to hourly CSV files. Memory use is bounded:
//! raw batches are reduced to their mean as soon as they arrive, means are
//! reduced again into one point every `samples_per_point` reads, and points
//! are flushed to disk every `points_per_write` points.
//!
//! ## Crate Structure
//!
//! - **`source`**: the `SampleSource` trait for blocking streaming devices,
//!   plus a simulated device and a scripted replay source.
//! - **`data`**: the `Aggregator` (down-sampling and voltage conversion) and
//!   the `BatchWriter` (hourly CSV files).
//! - **`controller`**: `StreamController`, the read → aggregate → write loop
//!   with cooperative cancellation and guaranteed finalization.
//! - **`stats`**: `RunStatistics` and the end-of-run summary.
//! - **`config`**: settings loaded from TOML and the environment.
//! - **`error`**: `DaqError`, `DeviceError` and `LoopFault`.
//! - **`logging`**: tracing subscriber setup.

pub mod config;
pub mod controller;
pub mod data;
pub mod error;
pub mod logging;
pub mod source;
pub mod stats;

pub use config::{StreamParams, StreamSettings};
pub use controller::{StreamController, StreamState};
pub use data::{BatchWriter, DataPoint};
pub use error::{AppResult, DaqError, DeviceError, LoopFault};
pub use source::{SampleSource, ScriptedSource, SimulatedSource};
pub use stats::{RunStatistics, StopReason};
