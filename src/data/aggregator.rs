//! Down-sampling of raw sample batches into temperature points.
//!
//! Every read from the device yields one batch of voltages. The aggregator
//! reduces each batch to its mean and collects those means in a fixed-size
//! running buffer. Once `samples_per_point` batch means have been collected
//! they are averaged again, converted to a temperature and emitted as one
//! [`DataPoint`].
//!
//! ```text
//!  batch ─► mean ─┐
//!  batch ─► mean ─┼─► RunningMean (capacity = samples_per_point) ─► mean ─► scale*V+offset ─► DataPoint
//!  batch ─► mean ─┘
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Whether lost-sample sentinels take part in the batch mean.
///
/// `Include` reproduces what the acquisition software has always written:
/// the sentinel value is averaged together with the real voltages, which
/// biases the point during buffer-overflow recovery. `Exclude` drops the
/// sentinels first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LostSamplePolicy {
    /// Average sentinels together with real samples
    #[default]
    Include,
    /// Drop sentinels before averaging
    Exclude,
}

/// One aggregated output record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// Seconds since the Unix epoch at the moment of reduction
    pub timestamp: f64,
    /// Converted temperature
    pub temperature: f64,
}

impl DataPoint {
    /// Create a point.
    pub fn new(timestamp: f64, temperature: f64) -> Self {
        Self {
            timestamp,
            temperature,
        }
    }
}

/// Linear voltage to temperature conversion.
pub fn volt_to_temp(volts: f64, temp_scale: f64, voltage_offset: f64) -> f64 {
    temp_scale * volts + voltage_offset
}

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Current wall-clock time as fractional seconds since the Unix epoch.
pub fn epoch_seconds() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1e6
}

/// Fixed-capacity buffer of per-read means awaiting reduction.
#[derive(Debug, Clone)]
pub struct RunningMean {
    means: Vec<f64>,
    capacity: usize,
}

impl RunningMean {
    /// Empty buffer that fills after `capacity` means.
    pub fn new(capacity: usize) -> Self {
        Self {
            means: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Store one batch mean. Returns `true` once the buffer is full.
    fn push(&mut self, value: f64) -> bool {
        debug_assert!(self.means.len() < self.capacity);
        self.means.push(value);
        self.is_full()
    }

    /// Means currently stored.
    pub fn len(&self) -> usize {
        self.means.len()
    }

    /// Whether no means are stored.
    pub fn is_empty(&self) -> bool {
        self.means.is_empty()
    }

    /// Whether the next reduction is due.
    pub fn is_full(&self) -> bool {
        self.means.len() >= self.capacity
    }

    /// Means per reduction.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Average the stored means and empty the buffer.
    fn reduce(&mut self) -> Option<f64> {
        let value = mean(&self.means);
        self.means.clear();
        value
    }
}

/// Reduces raw sample batches into [`DataPoint`]s.
#[derive(Debug, Clone)]
pub struct Aggregator {
    running: RunningMean,
    temp_scale: f64,
    voltage_offset: f64,
    policy: LostSamplePolicy,
    points_produced: u64,
}

impl Aggregator {
    /// Aggregate `samples_per_point` reads into each point, converting with
    /// `temp_scale * V + voltage_offset`.
    pub fn new(samples_per_point: usize, temp_scale: f64, voltage_offset: f64) -> Self {
        Self {
            running: RunningMean::new(samples_per_point.max(1)),
            temp_scale,
            voltage_offset,
            policy: LostSamplePolicy::default(),
            points_produced: 0,
        }
    }

    /// Set how lost samples are treated in the batch mean.
    pub fn with_policy(mut self, policy: LostSamplePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Feed one raw batch, stamping any completed point with the current time.
    ///
    /// `is_lost` identifies sentinel values; it only matters under
    /// [`LostSamplePolicy::Exclude`].
    pub fn push_batch(&mut self, batch: &[f64], is_lost: impl Fn(f64) -> bool) -> Option<DataPoint> {
        self.push_batch_at(batch, is_lost, epoch_seconds)
    }

    /// Like [`push_batch`](Self::push_batch) with an explicit clock.
    pub fn push_batch_at(
        &mut self,
        batch: &[f64],
        is_lost: impl Fn(f64) -> bool,
        now: impl FnOnce() -> f64,
    ) -> Option<DataPoint> {
        let batch_mean = match self.policy {
            LostSamplePolicy::Include => mean(batch),
            LostSamplePolicy::Exclude => {
                let valid: Vec<f64> = batch.iter().copied().filter(|&v| !is_lost(v)).collect();
                mean(&valid)
            }
        }?;

        if !self.running.push(batch_mean) {
            return None;
        }

        let volts = self.running.reduce()?;
        self.points_produced += 1;
        Some(DataPoint::new(
            now(),
            volt_to_temp(volts, self.temp_scale, self.voltage_offset),
        ))
    }

    /// Batch means collected toward the next point.
    pub fn pending(&self) -> usize {
        self.running.len()
    }

    /// Reads per point.
    pub fn samples_per_point(&self) -> usize {
        self.running.capacity()
    }

    /// Points emitted so far.
    pub fn points_produced(&self) -> u64 {
        self.points_produced
    }
}
