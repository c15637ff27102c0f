//! Run statistics and their human-readable summary.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::info;

use crate::error::{DeviceError, LoopFault};

/// Why a streaming run ended.
#[derive(Debug)]
pub enum StopReason {
    /// The cancellation token was triggered
    Cancelled,
    /// The loop body failed; the run was still finalized
    Fault(LoopFault),
}

impl StopReason {
    /// Whether the loop ended on a fault rather than a cancellation.
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Fault(_))
    }
}

/// Counters accumulated over one streaming run.
///
/// Serializes to the fixed-key mapping reported at the end of a run. Rates
/// are `None` (`null`) when the run ended before any time elapsed.
#[derive(Debug, Default, Serialize)]
pub struct RunStatistics {
    /// Raw samples received, summed over every read
    #[serde(rename = "Total scans")]
    pub total_scans: u64,
    /// Rows written to disk
    #[serde(rename = "Saved points")]
    pub saved_points: u64,
    /// Seconds between stream start and finalization
    #[serde(rename = "Scan time")]
    pub scan_time: f64,
    /// Scan rate reported by the device at stream start
    #[serde(rename = "LJM scan rate")]
    pub device_scan_rate: f64,
    /// Total scans divided by scan time; `None` if no time elapsed
    #[serde(rename = "Timed scan rate")]
    pub timed_scan_rate: Option<f64>,
    /// Timed scan rate times the channel count; `None` if no time elapsed
    #[serde(rename = "Timed sample rate")]
    pub timed_sample_rate: Option<f64>,
    /// Lost samples divided by the channel count
    #[serde(rename = "Skipped scans")]
    pub skipped_scans: f64,

    /// Lost-sample sentinels seen across all reads
    #[serde(skip)]
    pub skipped_samples: u64,
    /// Channels per scan
    #[serde(skip)]
    pub num_channels: usize,
    /// Wall-clock time the stream started
    #[serde(skip)]
    pub started_at: Option<DateTime<Utc>>,
    /// Points still buffered after the final flush (non-zero only if it failed)
    #[serde(skip)]
    pub unsaved_points: usize,
    /// Why the loop ended; `None` until the run is finalized
    #[serde(skip)]
    pub stop_reason: Option<StopReason>,
    /// Error from the best-effort stream stop
    #[serde(skip)]
    pub stop_error: Option<DeviceError>,
}

impl RunStatistics {
    /// Start accumulating for a stream of `num_channels` channels.
    pub fn new(num_channels: usize, device_scan_rate: f64) -> Self {
        Self {
            num_channels,
            device_scan_rate,
            started_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// Account for one read of `len` samples, `lost` of which were sentinels.
    pub fn record_batch(&mut self, len: usize, lost: usize) {
        self.total_scans += len as u64;
        self.skipped_samples += lost as u64;
    }

    /// Account for rows written by a flush.
    pub fn record_saved(&mut self, rows: usize) {
        self.saved_points += rows as u64;
    }

    /// Derive elapsed time and rates.
    pub fn finalize(&mut self, elapsed: Duration) {
        self.scan_time = elapsed.as_secs_f64();
        let channels = self.num_channels.max(1) as f64;

        if self.scan_time > 0.0 {
            let scans = self.total_scans as f64;
            self.timed_scan_rate = Some(scans / self.scan_time);
            self.timed_sample_rate = Some(scans * self.num_channels as f64 / self.scan_time);
        } else {
            self.timed_scan_rate = None;
            self.timed_sample_rate = None;
        }
        self.skipped_scans = self.skipped_samples as f64 / channels;
    }

    /// The fixed-key mapping, as `serde_json` would emit it.
    pub fn to_map(&self) -> BTreeMap<&'static str, Option<f64>> {
        BTreeMap::from([
            ("Total scans", Some(self.total_scans as f64)),
            ("Saved points", Some(self.saved_points as f64)),
            ("Scan time", Some(self.scan_time)),
            ("LJM scan rate", Some(self.device_scan_rate)),
            ("Timed scan rate", self.timed_scan_rate),
            ("Timed sample rate", self.timed_sample_rate),
            ("Skipped scans", Some(self.skipped_scans)),
        ])
    }
}

fn rate(value: Option<f64>) -> String {
    value.map_or_else(|| "undefined".to_string(), |v| format!("{v:.6}"))
}

/// Multi-line summary, one counter per line.
impl fmt::Display for RunStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total scans = {}", self.total_scans)?;
        writeln!(f, "Total points saved = {}", self.saved_points)?;
        writeln!(f, "Time taken = {:.6} seconds", self.scan_time)?;
        writeln!(f, "Device scan rate = {:.6} scans/second", self.device_scan_rate)?;
        writeln!(f, "Timed scan rate = {} scans/second", rate(self.timed_scan_rate))?;
        writeln!(
            f,
            "Timed sample rate = {} samples/second",
            rate(self.timed_sample_rate)
        )?;
        write!(f, "Skipped scans = {:.0}", self.skipped_scans)
    }
}

/// Human-readable multi-line summary of a finished run.
pub fn summary(stats: &RunStatistics) -> String {
    stats.to_string()
}

/// Emit the summary counters as one structured log event.
pub fn log_summary(stats: &RunStatistics) {
    info!(
        total_scans = stats.total_scans,
        saved_points = stats.saved_points,
        scan_time = stats.scan_time,
        device_scan_rate = stats.device_scan_rate,
        timed_scan_rate = ?stats.timed_scan_rate,
        timed_sample_rate = ?stats.timed_sample_rate,
        skipped_scans = stats.skipped_scans,
        "Stream statistics"
    );
}
