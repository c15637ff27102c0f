//! CLI entry point for temp-stream
//!
//! Provides command-line interface for:
//! - Streaming a device to hourly CSV files until Ctrl+C
//! - Summarizing a written CSV file
//!
//! # Usage
//!
//! Stream with the settings in `config/default.toml`:
//! ```bash
//! temp-stream run
//! ```
//!
//! Override parameters on the command line:
//! ```bash
//! temp-stream run --samples-per-point 10 --points-per-write 60 --rate 100 --channel AIN1
//! ```
//!
//! Inspect a file:
//! ```bash
//! temp-stream summarize testing_temp_2024_03_07_0900.csv
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use temp_stream::config::StreamSettings;
use temp_stream::controller::StreamController;
use temp_stream::data::aggregator::mean;
use temp_stream::data::storage::read_points;
use temp_stream::source::{SampleSource, SimulatedSource};
use temp_stream::{logging, stats};

#[derive(Parser)]
#[command(name = "temp-stream")]
#[command(about = "Stream DAQ voltages to hourly temperature files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream until interrupted, then print run statistics
    Run {
        /// Settings file
        #[arg(long, default_value = "config/default.toml")]
        config: PathBuf,

        /// Raw reads averaged into one point
        #[arg(long)]
        samples_per_point: Option<usize>,

        /// Points buffered per file write
        #[arg(long)]
        points_per_write: Option<usize>,

        /// Requested scan rate in Hz
        #[arg(long)]
        rate: Option<f64>,

        /// Channel name; repeat for several channels
        #[arg(long = "channel")]
        channels: Vec<String>,

        /// Output file prefix
        #[arg(long)]
        preamble: Option<String>,

        /// Output directory
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Also print the statistics mapping as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print a summary of a written CSV file
    Summarize {
        /// Path to an output file
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            samples_per_point,
            points_per_write,
            rate,
            channels,
            preamble,
            output_dir,
            json,
        } => {
            let mut settings = StreamSettings::load_from(&config)
                .with_context(|| format!("loading {}", config.display()))?;
            let stream = &mut settings.stream;
            if let Some(n) = samples_per_point {
                stream.samples_per_point = n;
            }
            if let Some(n) = points_per_write {
                stream.points_per_write = n;
            }
            if let Some(r) = rate {
                stream.sampling_rate = r;
            }
            if !channels.is_empty() {
                stream.address_names = channels;
            }
            if let Some(p) = preamble {
                stream.fname_preamble = p;
            }
            if let Some(d) = output_dir {
                stream.output_dir = d;
            }
            settings.validate()?;
            logging::init_from_settings(&settings.logging)?;
            run_stream(settings, json).await
        }
        Commands::Summarize { file } => summarize(file),
    }
}

async fn run_stream(settings: StreamSettings, json: bool) -> Result<()> {
    let params = settings.stream_params()?;
    let device = &settings.device;
    let source = SimulatedSource::open(
        &device.kind,
        &device.connection,
        &device.identifier,
        settings.simulation.clone(),
    )?;
    let info = source.info();
    info!(
        device_type = info.device_type,
        connection_type = info.connection_type,
        serial_number = info.serial_number,
        ip_address = %info.ip_address,
        port = info.port,
        max_bytes_per_packet = info.max_bytes_per_packet,
        "Opened device"
    );

    let mut controller = StreamController::new(source, params)?;

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Stopping scan (KeyboardInterrupt)");
                signal_token.cancel();
            }
            Err(e) => warn!(error = %e, "Unable to listen for Ctrl+C"),
        }
    });

    let stats = tokio::task::spawn_blocking(move || controller.run_and_close(&cancel)).await??;

    println!("{}", stats::summary(&stats));
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    }
    Ok(())
}

fn summarize(file: PathBuf) -> Result<()> {
    let points = read_points(&file).with_context(|| format!("reading {}", file.display()))?;
    println!("File: {}", file.display());
    println!("Points: {}", points.len());
    if let (Some(first), Some(last)) = (points.first(), points.last()) {
        println!("First timestamp: {:.6}", first.timestamp);
        println!("Last timestamp: {:.6}", last.timestamp);
    }
    let temps: Vec<f64> = points.iter().map(|p| p.temperature).collect();
    match mean(&temps) {
        Some(m) => println!("Mean temperature: {m:.4}"),
        None => println!("Mean temperature: n/a"),
    }
    Ok(())
}
