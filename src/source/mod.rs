//! Sample sources.
//!
//! A [`SampleSource`] is a streaming acquisition device as seen by the
//! controller: it is configured with named register writes, started with a
//! list of channel addresses and a scan rate, and then read one batch at a
//! time until it is stopped. Reads block until the device delivers data.
//!
//! Lost samples (device buffer overflow followed by auto-recovery) are
//! reported in-band as [`LOST_SAMPLE_SENTINEL`]. Consumers should ask the
//! source through [`SampleSource::is_lost`] rather than compare against the
//! literal value.
//!
//! # Available sources
//!
//! - [`SimulatedSource`] - noise around a base voltage, optional lost samples
//! - [`ScriptedSource`] - replays a fixed sequence of reads and errors

use serde::Serialize;

use crate::error::DeviceError;

mod scripted;
mod simulated;

pub use scripted::{ScriptedRead, ScriptedSource};
pub use simulated::SimulatedSource;

/// In-band marker for a sample the device could not deliver.
pub const LOST_SAMPLE_SENTINEL: f64 = -9999.0;

/// Register selecting the stream trigger input (0 = no external trigger).
pub const STREAM_TRIGGER_INDEX: &str = "STREAM_TRIGGER_INDEX";

/// Register selecting the stream clock (0 = internal crystal).
pub const STREAM_CLOCK_SOURCE: &str = "STREAM_CLOCK_SOURCE";

/// Ordered voltages returned by one read, interleaved by channel.
pub type SampleBatch = Vec<f64>;

/// Identity of an opened device.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceInfo {
    /// Vendor device type code
    pub device_type: i32,
    /// Vendor connection type code
    pub connection_type: i32,
    /// Device serial number
    pub serial_number: i32,
    /// Address for network connections, "0.0.0.0" otherwise
    pub ip_address: String,
    /// Port for network connections
    pub port: i32,
    /// Largest packet the connection carries
    pub max_bytes_per_packet: i32,
}

/// Blocking streaming acquisition device.
///
/// Implementors open the device in their constructor and own the handle
/// until [`close`](Self::close) is called.
pub trait SampleSource {
    /// Identity of the opened device.
    fn info(&self) -> DeviceInfo;

    /// Write a named configuration register.
    fn write_name(&mut self, name: &str, value: f64) -> Result<(), DeviceError>;

    /// Map channel names to register addresses, preserving order.
    fn resolve_addresses(&self, names: &[String]) -> Result<Vec<u32>, DeviceError>;

    /// Start streaming the given addresses.
    ///
    /// Returns the scan rate the device actually achieved.
    fn stream_start(
        &mut self,
        scans_per_read: usize,
        addresses: &[u32],
        scan_rate: f64,
    ) -> Result<f64, DeviceError>;

    /// Block until the next batch is available.
    fn stream_read(&mut self) -> Result<SampleBatch, DeviceError>;

    /// Stop a running stream.
    fn stream_stop(&mut self) -> Result<(), DeviceError>;

    /// Release the device.
    fn close(&mut self) -> Result<(), DeviceError>;

    /// Whether `value` marks a lost sample.
    fn is_lost(&self, value: f64) -> bool {
        value == LOST_SAMPLE_SENTINEL
    }
}

/// Resolve `AIN<n>` channel names to their Modbus addresses (`2n`).
pub fn ain_addresses(names: &[String]) -> Result<Vec<u32>, DeviceError> {
    names
        .iter()
        .map(|name| {
            name.strip_prefix("AIN")
                .and_then(|n| n.parse::<u32>().ok())
                .map(|n| n * 2)
                .ok_or_else(|| DeviceError::InvalidAddress { name: name.clone() })
        })
        .collect()
}
