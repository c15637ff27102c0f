//! Simulated acquisition device.
//!
//! Produces `scans_per_read × channels` voltages per read, uniformly
//! distributed around a base voltage. Optionally replaces samples with the
//! lost-sample sentinel and paces reads to the requested scan rate, so the
//! whole pipeline can be exercised without hardware.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

use super::{ain_addresses, DeviceInfo, SampleBatch, SampleSource, LOST_SAMPLE_SENTINEL};
use crate::config::SimulationSettings;
use crate::error::DeviceError;

/// Device type code reported for the simulated device.
const SIMULATED_DEVICE_TYPE: i32 = 7;

/// Largest scan rate the simulated device accepts.
const MAX_SCAN_RATE: f64 = 100_000.0;

/// Largest number of scans the simulated device delivers per read.
const MAX_SCANS_PER_READ: usize = 100_000;

struct Running {
    scans_per_read: usize,
    n_channels: usize,
    scan_rate: f64,
}

/// Rand-driven stand-in for a streaming DAQ device.
pub struct SimulatedSource {
    info: DeviceInfo,
    settings: SimulationSettings,
    registers: HashMap<String, f64>,
    rng: StdRng,
    running: Option<Running>,
    open: bool,
}

impl SimulatedSource {
    /// Open the simulated device. Any kind, connection and identifier are accepted.
    pub fn open(
        kind: &str,
        connection: &str,
        identifier: &str,
        settings: SimulationSettings,
    ) -> Result<Self, DeviceError> {
        let serial_number = identifier.parse::<i32>().unwrap_or(470_010_000);
        let info = DeviceInfo {
            device_type: SIMULATED_DEVICE_TYPE,
            connection_type: 1,
            serial_number,
            ip_address: "0.0.0.0".to_string(),
            port: 0,
            max_bytes_per_packet: 64,
        };
        info!(
            kind = kind,
            connection = connection,
            serial = serial_number,
            "Opened simulated device"
        );
        Ok(Self {
            info,
            settings,
            registers: HashMap::new(),
            rng: StdRng::from_entropy(),
            running: None,
            open: true,
        })
    }

    /// Use a fixed RNG seed for reproducible data.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Last value written to a register.
    pub fn register(&self, name: &str) -> Option<f64> {
        self.registers.get(name).copied()
    }

    fn sample(&mut self) -> f64 {
        if self.settings.lost_sample_probability > 0.0
            && self.rng.gen_bool(self.settings.lost_sample_probability)
        {
            return LOST_SAMPLE_SENTINEL;
        }
        let amp = self.settings.noise_amplitude.abs();
        let noise = if amp > 0.0 {
            self.rng.gen_range(-amp..=amp)
        } else {
            0.0
        };
        self.settings.base_voltage + noise
    }

    fn ensure_open(&self) -> Result<(), DeviceError> {
        if self.open {
            Ok(())
        } else {
            Err(DeviceError::Disconnected {
                message: "device handle is closed".to_string(),
            })
        }
    }
}

impl SampleSource for SimulatedSource {
    fn info(&self) -> DeviceInfo {
        self.info.clone()
    }

    fn write_name(&mut self, name: &str, value: f64) -> Result<(), DeviceError> {
        self.ensure_open()?;
        debug!(register = name, value = value, "Register write");
        self.registers.insert(name.to_string(), value);
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
        self.ensure_open()?;
        if addresses.is_empty() {
            return Err(DeviceError::InvalidConfig {
                message: "no addresses to stream".to_string(),
            });
        }
        if !scan_rate.is_finite() || scan_rate <= 0.0 {
            return Err(DeviceError::InvalidConfig {
                message: format!("invalid scan rate {scan_rate}"),
            });
        }
        if scans_per_read > MAX_SCANS_PER_READ {
            return Err(DeviceError::InvalidConfig {
                message: format!(
                    "scans_per_read {scans_per_read} exceeds the maximum of {MAX_SCANS_PER_READ}"
                ),
            });
        }
        if scans_per_read.max(1).checked_mul(addresses.len()).is_none() {
            return Err(DeviceError::InvalidConfig {
                message: format!(
                    "{scans_per_read} scans of {} channels do not fit in one read",
                    addresses.len()
                ),
            });
        }
        let actual = scan_rate.min(MAX_SCAN_RATE);
        self.running = Some(Running {
            scans_per_read: scans_per_read.max(1),
            n_channels: addresses.len(),
            scan_rate: actual,
        });
        Ok(actual)
    }

    fn stream_read(&mut self) -> Result<SampleBatch, DeviceError> {
        let (scans_per_read, n_channels, scan_rate) = match &self.running {
            Some(r) => (r.scans_per_read, r.n_channels, r.scan_rate),
            None => return Err(DeviceError::NotStreaming),
        };

        if self.settings.realtime {
            std::thread::sleep(Duration::from_secs_f64(scans_per_read as f64 / scan_rate));
        }

        let len = scans_per_read
            .checked_mul(n_channels)
            .ok_or_else(|| DeviceError::InvalidConfig {
                message: "batch size overflows".to_string(),
            })?;
        Ok((0..len).map(|_| self.sample()).collect())
    }

    fn stream_stop(&mut self) -> Result<(), DeviceError> {
        self.running.take().map(|_| ()).ok_or(DeviceError::NotStreaming)
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        self.running = None;
        self.open = false;
        info!("Closed simulated device");
        Ok(())
    }
}
