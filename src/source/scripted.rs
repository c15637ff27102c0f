//! Replay source driven by a fixed script of reads.
//!
//! Useful for replaying recorded batches and for exercising the controller's
//! fault paths: each call to `stream_read` pops the next scripted entry, and
//! a read past the end of the script reports a disconnect. Register writes,
//! stream start and stream stop can each be made to fail. The source can
//! also cancel a [`CancellationToken`] after a given number of reads, which
//! behaves like an operator pressing Ctrl-C mid-stream.

use std::collections::VecDeque;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{ain_addresses, DeviceInfo, SampleBatch, SampleSource};
use crate::error::DeviceError;

/// One scripted response to `stream_read`.
pub type ScriptedRead = Result<SampleBatch, DeviceError>;

/// Sample source that replays a script.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    script: VecDeque<ScriptedRead>,
    actual_rate: Option<f64>,
    start_error: Option<DeviceError>,
    stop_error: Option<DeviceError>,
    write_error: Option<(String, DeviceError)>,
    cancel_after: Option<(usize, CancellationToken)>,
    streaming: bool,
    reads: usize,
    writes: Vec<(String, f64)>,
    started_with: Option<(usize, Vec<u32>, f64)>,
    stop_calls: usize,
    closed: bool,
}

impl ScriptedSource {
    /// Replay `script`, one entry per read.
    pub fn new(script: impl IntoIterator<Item = ScriptedRead>) -> Self {
        Self {
            script: script.into_iter().collect(),
            ..Default::default()
        }
    }

    /// Build a script of successful reads.
    pub fn from_batches(batches: impl IntoIterator<Item = SampleBatch>) -> Self {
        Self::new(batches.into_iter().map(Ok))
    }

    /// Report this rate from `stream_start` instead of echoing the request.
    pub fn with_actual_rate(mut self, rate: f64) -> Self {
        self.actual_rate = Some(rate);
        self
    }

    /// Make `stream_start` fail.
    pub fn fail_on_start(mut self, error: DeviceError) -> Self {
        self.start_error = Some(error);
        self
    }

    /// Make writes to register `name` fail.
    pub fn fail_on_write(mut self, name: impl Into<String>, error: DeviceError) -> Self {
        self.write_error = Some((name.into(), error));
        self
    }

    /// Make `stream_stop` fail.
    pub fn fail_on_stop(mut self, error: DeviceError) -> Self {
        self.stop_error = Some(error);
        self
    }

    /// Cancel `token` once `reads` reads have been served.
    pub fn cancel_after(mut self, reads: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((reads, token));
        self
    }

    /// Number of `stream_read` calls served so far.
    pub fn reads(&self) -> usize {
        self.reads
    }

    /// Register writes, in order.
    pub fn writes(&self) -> &[(String, f64)] {
        &self.writes
    }

    /// Arguments of the last successful `stream_start`.
    pub fn started_with(&self) -> Option<&(usize, Vec<u32>, f64)> {
        self.started_with.as_ref()
    }

    /// Number of `stream_stop` calls, failed or not.
    pub fn stop_calls(&self) -> usize {
        self.stop_calls
    }

    /// Whether `close` was called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether a stream is running.
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }
}

impl SampleSource for ScriptedSource {
    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            device_type: 7,
            connection_type: 0,
            ip_address: "0.0.0.0".to_string(),
            ..Default::default()
        }
    }

    fn write_name(&mut self, name: &str, value: f64) -> Result<(), DeviceError> {
        if let Some((failing, err)) = &self.write_error {
            if failing == name {
                return Err(err.clone());
            }
        }
        self.writes.push((name.to_string(), value));
        Ok(())
    }

    fn resolve_addresses(&self, names: &[String]) -> Result<Vec<u32>, DeviceError> {
        ain_addresses(names)
    }

    fn stream_start(
        &mut self,
        scans_per_read: usize,
        addresses: &[u32],
        scan_rate: f64,
    ) -> Result<f64, DeviceError> {
        if let Some(err) = self.start_error.clone() {
            return Err(err);
        }
        self.streaming = true;
        self.started_with = Some((scans_per_read, addresses.to_vec(), scan_rate));
        Ok(self.actual_rate.unwrap_or(scan_rate))
    }

    fn stream_read(&mut self) -> Result<SampleBatch, DeviceError> {
        if !self.streaming {
            return Err(DeviceError::NotStreaming);
        }
        self.reads += 1;
        if let Some((after, token)) = &self.cancel_after {
            if self.reads >= *after {
                debug!(reads = self.reads, "Scripted cancellation");
                token.cancel();
            }
        }
        self.script
            .pop_front()
            .unwrap_or_else(|| {
                Err(DeviceError::Disconnected {
                    message: "end of script".to_string(),
                })
            })
    }

    fn stream_stop(&mut self) -> Result<(), DeviceError> {
        self.stop_calls += 1;
        self.streaming = false;
        match self.stop_error.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        self.closed = true;
        Ok(())
    }
}
