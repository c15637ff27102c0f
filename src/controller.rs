//! Streaming controller: the read → aggregate → write loop.
//!
//! # State machine
//!
//! ```text
//!  Idle ──start──► Streaming ──cancel / fault──► Stopping ──finalize──► Terminated
//! ```
//!
//! - **Idle → Streaming**: channel names are resolved, the external trigger
//!   is disabled, the internal clock is selected and the stream is started.
//!   Any error here is returned to the caller and nothing is written.
//! - **Streaming**: each iteration performs one blocking read, counts raw and
//!   lost samples, feeds the aggregator and hands completed points to the
//!   batch writer. The cancellation token is checked once per iteration; an
//!   in-flight read is never interrupted.
//! - **Streaming → Stopping**: on cancellation or on any fault in the loop
//!   body (device error or unexpected error such as a failed flush).
//! - **Stopping → Terminated**: the partial output buffer is flushed, the
//!   elapsed time is taken and the stream is stopped. Stop failures are logged
//!   and recorded, never returned.
//!
//! # Example
//!
//! ```no_run
//! use temp_stream::config::{SimulationSettings, StreamParams};
//! use temp_stream::controller::StreamController;
//! use temp_stream::source::SimulatedSource;
//! use tokio_util::sync::CancellationToken;
//!
//! # fn example() -> anyhow::Result<()> {
//! let source = SimulatedSource::open("T7", "ANY", "ANY", SimulationSettings::default())?;
//! let params = StreamParams::new(10, 60, 100.0, vec!["AIN1".into()], "lab_temp");
//! let mut controller = StreamController::new(source, params)?;
//!
//! let cancel = CancellationToken::new();
//! let stats = controller.run(&cancel)?;
//! println!("{}", temp_stream::stats::summary(&stats));
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::StreamParams;
use crate::data::aggregator::Aggregator;
use crate::data::storage::BatchWriter;
use crate::error::{AppResult, DaqError, LoopFault};
use crate::source::{SampleSource, STREAM_CLOCK_SOURCE, STREAM_TRIGGER_INDEX};
use crate::stats::{self, RunStatistics, StopReason};

/// Lifecycle of a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Constructed, or the last start attempt failed
    Idle,
    /// The read loop is running
    Streaming,
    /// The loop has exited and finalization is in progress
    Stopping,
    /// Finalization is done; the controller cannot run again
    Terminated,
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Streaming => "streaming",
            Self::Stopping => "stopping",
            Self::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Owns the device for the duration of a run and drives the pipeline.
pub struct StreamController<S: SampleSource> {
    source: S,
    params: StreamParams,
    aggregator: Aggregator,
    writer: BatchWriter,
    state: StreamState,
}

impl<S: SampleSource> StreamController<S> {
    /// Create a controller. Fails if `params` do not validate.
    pub fn new(source: S, params: StreamParams) -> AppResult<Self> {
        params.validate()?;

        let aggregator = Aggregator::new(
            params.samples_per_point,
            params.temp_scale,
            params.voltage_offset,
        )
        .with_policy(params.lost_samples);
        let writer = BatchWriter::new(params.points_per_write, params.fname_preamble.clone())
            .with_output_dir(params.output_dir.clone());

        Ok(Self {
            source,
            params,
            aggregator,
            writer,
            state: StreamState::Idle,
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Parameters the controller was built with.
    pub fn params(&self) -> &StreamParams {
        &self.params
    }

    /// The owned device.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Aggregation state, including any partially filled point.
    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    /// Output buffer and file writer.
    pub fn writer(&self) -> &BatchWriter {
        &self.writer
    }

    /// Stream until `cancel` fires or the loop faults, then finalize.
    ///
    /// Returns `Err` only when the stream could not be started.
    pub fn run(&mut self, cancel: &CancellationToken) -> AppResult<RunStatistics> {
        if self.state != StreamState::Idle {
            return Err(DaqError::Processing(format!(
                "cannot start a run from the {} state",
                self.state
            )));
        }

        let device_scan_rate = self.start().map_err(|e| {
            error!(error = %e, "Failed to start stream");
            e
        })?;

        let mut stats = RunStatistics::new(self.params.num_channels(), device_scan_rate);
        let started = Instant::now();
        self.transition(StreamState::Streaming);

        let reason = self.stream(cancel, &mut stats);

        self.transition(StreamState::Stopping);
        self.finish(&mut stats, started);
        stats.stop_reason = Some(reason);
        self.transition(StreamState::Terminated);

        stats::log_summary(&stats);
        Ok(stats)
    }

    /// [`run`](Self::run), then close the device whatever the outcome.
    ///
    /// A close failure is logged and does not replace the run result.
    pub fn run_and_close(&mut self, cancel: &CancellationToken) -> AppResult<RunStatistics> {
        let result = self.run(cancel);
        match self.source.close() {
            Ok(()) => debug!("Device closed"),
            Err(e) => warn!(error = %e, "Failed to close device"),
        }
        result
    }

    fn transition(&mut self, next: StreamState) {
        debug!(from = %self.state, to = %next, "Stream state change");
        self.state = next;
    }

    /// Configure the device and start streaming. Returns the actual scan rate.
    fn start(&mut self) -> AppResult<f64> {
        let addresses = self.source.resolve_addresses(&self.params.address_names)?;

        self.source.write_name(STREAM_TRIGGER_INDEX, 0.0)?;
        self.source.write_name(STREAM_CLOCK_SOURCE, 0.0)?;

        let scans_per_read = (self.params.sampling_rate.round() as usize).max(1);
        let scan_rate =
            self.source
                .stream_start(scans_per_read, &addresses, self.params.sampling_rate)?;

        info!(
            sampling_rate = self.params.sampling_rate,
            scan_rate = scan_rate,
            n_channels = addresses.len(),
            scans_per_read = scans_per_read,
            "Stream started"
        );
        Ok(scan_rate)
    }

    fn stream(&mut self, cancel: &CancellationToken, stats: &mut RunStatistics) -> StopReason {
        while !cancel.is_cancelled() {
            if let Err(fault) = self.step(stats) {
                error!(error = %fault, "Streaming loop stopped");
                return StopReason::Fault(fault);
            }
        }
        info!("Stopping scan (interrupt)");
        StopReason::Cancelled
    }

    /// One read/aggregate/write iteration.
    fn step(&mut self, stats: &mut RunStatistics) -> Result<(), LoopFault> {
        let batch = self.source.stream_read()?;

        let source = &self.source;
        let lost = batch.iter().filter(|&&v| source.is_lost(v)).count();
        stats.record_batch(batch.len(), lost);
        if lost > 0 {
            warn!(
                lost = lost,
                total_skipped = stats.skipped_samples,
                "Device reported skipped samples"
            );
        }

        let Some(point) = self.aggregator.push_batch(&batch, |v| source.is_lost(v)) else {
            return Ok(());
        };
        trace!(
            timestamp = point.timestamp,
            temperature = point.temperature,
            "Point aggregated"
        );

        if let Some(report) = self.writer.append(point)? {
            stats.record_saved(report.rows);
        }
        Ok(())
    }

    /// Final flush, timing and best-effort stop.
    fn finish(&mut self, stats: &mut RunStatistics, started: Instant) {
        match self.writer.flush() {
            Ok(report) => stats.record_saved(report.rows),
            Err(e) => error!(
                error = %e,
                unsaved = self.writer.buffered().len(),
                "Final flush failed"
            ),
        }
        stats.unsaved_points = self.writer.buffered().len();
        stats.finalize(started.elapsed());

        info!("Stopping stream");
        if let Err(e) = self.source.stream_stop() {
            warn!(error = %e, "Failed to stop stream");
            stats.stop_error = Some(e);
        }
    }
}
