//! Aggregation and storage of stream data.
pub mod aggregator;
pub mod storage;

pub use aggregator::{Aggregator, DataPoint, LostSamplePolicy, RunningMean};
pub use storage::{BatchWriter, FlushReport};
