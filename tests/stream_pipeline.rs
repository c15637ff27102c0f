//! Integration tests for the streaming pipeline.
//!
//! Each test drives a `StreamController` with a `ScriptedSource` and writes
//! into a temporary directory, then checks the statistics and the rows that
//! ended up on disk.

use std::path::Path;
use std::time::Duration;

use temp_stream::config::{SimulationSettings, StreamParams};
use temp_stream::data::aggregator::LostSamplePolicy;
use temp_stream::data::storage::read_points;
use temp_stream::error::{DaqError, DeviceError, LoopFault};
use temp_stream::source::{ScriptedSource, SimulatedSource, LOST_SAMPLE_SENTINEL};
use temp_stream::stats::StopReason;
use temp_stream::{DataPoint, StreamController, StreamState};
use tokio_util::sync::CancellationToken;
use tracing_test::traced_test;

// =============================================================================
// Helpers
// =============================================================================

fn params(dir: &Path, samples_per_point: usize, points_per_write: usize) -> StreamParams {
    StreamParams::new(
        samples_per_point,
        points_per_write,
        1.0,
        vec!["AIN1".to_string()],
        "pipeline",
    )
    .with_output_dir(dir)
}

/// All rows of all CSV files in `dir`, in file-name order.
fn read_all(dir: &Path) -> Vec<DataPoint> {
    let mut files: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "csv"))
        .collect();
    files.sort();
    files.iter().flat_map(|f| read_points(f).unwrap()).collect()
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn test_two_reads_one_point_immediate_flush() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let source = ScriptedSource::from_batches(vec![vec![10.0, 20.0], vec![30.0, 40.0]])
        .cancel_after(2, cancel.clone());
    let mut controller = StreamController::new(source, params(dir.path(), 2, 1)).unwrap();

    let stats = controller.run(&cancel).unwrap();

    assert!(matches!(stats.stop_reason, Some(StopReason::Cancelled)));
    assert_eq!(stats.total_scans, 4);
    assert_eq!(stats.saved_points, 1);

    let rows = read_all(dir.path());
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].temperature, 1250.0);
    assert!(rows[0].timestamp > 0.0);
}

#[test]
fn test_scan_and_point_counts() {
    let dir = tempfile::tempdir().unwrap();
    let batches: Vec<Vec<f64>> = (0..7).map(|i| vec![0.1 * i as f64; i + 1]).collect();
    let expected_scans: u64 = batches.iter().map(|b| b.len() as u64).sum();
    let cancel = CancellationToken::new();
    let source = ScriptedSource::from_batches(batches).cancel_after(7, cancel.clone());
    let mut controller = StreamController::new(source, params(dir.path(), 3, 10)).unwrap();

    let stats = controller.run(&cancel).unwrap();

    assert_eq!(stats.total_scans, expected_scans);
    assert_eq!(controller.aggregator().points_produced(), 7 / 3);
    assert_eq!(controller.aggregator().pending(), 7 % 3);
    assert_eq!(stats.saved_points, 2);
    assert_eq!(read_all(dir.path()).len(), 2);
    assert_eq!(stats.unsaved_points, 0);
}

#[test]
fn test_sentinels_counted_and_averaged() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let batch = vec![1.0, LOST_SAMPLE_SENTINEL, 3.0, LOST_SAMPLE_SENTINEL];
    let source = ScriptedSource::from_batches(vec![batch.clone()]).cancel_after(1, cancel.clone());
    let mut controller = StreamController::new(source, params(dir.path(), 1, 1)).unwrap();

    let stats = controller.run(&cancel).unwrap();

    assert_eq!(stats.skipped_samples, 2);
    assert_eq!(stats.skipped_scans, 2.0);
    let expected = 50.0 * (batch.iter().sum::<f64>() / 4.0);
    assert_eq!(read_all(dir.path())[0].temperature, expected);
}

#[test]
fn test_sentinels_excluded_when_configured() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let source = ScriptedSource::from_batches(vec![vec![1.0, LOST_SAMPLE_SENTINEL, 3.0]])
        .cancel_after(1, cancel.clone());
    let p = params(dir.path(), 1, 1).with_lost_samples(LostSamplePolicy::Exclude);
    let mut controller = StreamController::new(source, p).unwrap();

    let stats = controller.run(&cancel).unwrap();

    assert_eq!(stats.skipped_samples, 1);
    assert_eq!(read_all(dir.path())[0].temperature, 100.0);
}

#[test]
fn test_interrupt_before_point_completes() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let source = ScriptedSource::from_batches(vec![vec![0.5], vec![0.5]])
        .cancel_after(1, cancel.clone());
    let mut controller = StreamController::new(source, params(dir.path(), 2, 5)).unwrap();

    let stats = controller.run(&cancel).unwrap();

    assert_eq!(controller.source().reads(), 1);
    assert_eq!(controller.aggregator().pending(), 1);
    assert_eq!(stats.saved_points, 0);
    assert!(read_all(dir.path()).is_empty());
}

#[test]
fn test_interrupt_flushes_only_completed_points() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let source = ScriptedSource::from_batches(vec![vec![0.0], vec![0.2], vec![0.4]])
        .cancel_after(3, cancel.clone());
    let mut controller = StreamController::new(source, params(dir.path(), 1, 5)).unwrap();

    let stats = controller.run(&cancel).unwrap();

    let rows = read_all(dir.path());
    let temps: Vec<f64> = rows.iter().map(|p| p.temperature).collect();
    assert_eq!(temps, vec![0.0, 50.0 * 0.2, 50.0 * 0.4]);
    assert_eq!(stats.saved_points, 3);
    assert!(controller.writer().buffered().is_empty());
}

// =============================================================================
// Fault paths
// =============================================================================

#[test]
fn test_device_error_routes_to_finalization() {
    let dir = tempfile::tempdir().unwrap();
    let source = ScriptedSource::new(vec![
        Ok(vec![1.0]),
        Ok(vec![1.0]),
        Err(DeviceError::Protocol {
            code: 1301,
            message: "LJME_LJM_BUFFER_FULL".to_string(),
        }),
    ]);
    let mut controller = StreamController::new(source, params(dir.path(), 1, 10)).unwrap();

    let stats = controller.run(&CancellationToken::new()).unwrap();

    assert!(matches!(
        stats.stop_reason,
        Some(StopReason::Fault(LoopFault::Device(DeviceError::Protocol { code: 1301, .. })))
    ));
    assert_eq!(stats.saved_points, 2);
    assert_eq!(read_all(dir.path()).len(), 2);
    assert_eq!(controller.source().stop_calls(), 1);
    assert_eq!(controller.state(), StreamState::Terminated);
}

#[test]
fn test_write_failure_is_unexpected_fault() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing");
    let source = ScriptedSource::from_batches(vec![vec![1.0], vec![1.0]]);
    let mut controller = StreamController::new(source, params(&missing, 1, 1)).unwrap();

    let stats = controller.run(&CancellationToken::new()).unwrap();

    assert!(matches!(
        stats.stop_reason,
        Some(StopReason::Fault(LoopFault::Unexpected(DaqError::Io(_))))
    ));
    assert_eq!(stats.saved_points, 0);
    assert_eq!(stats.unsaved_points, 1);
    assert_eq!(controller.source().stop_calls(), 1);
}

#[test]
#[traced_test]
fn test_stop_failure_is_logged_not_returned() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let source = ScriptedSource::from_batches(vec![vec![1.0]])
        .cancel_after(1, cancel.clone())
        .fail_on_stop(DeviceError::Disconnected {
            message: "usb unplugged".to_string(),
        });
    let mut controller = StreamController::new(source, params(dir.path(), 1, 1)).unwrap();

    let stats = controller.run(&cancel).unwrap();

    assert!(matches!(stats.stop_reason, Some(StopReason::Cancelled)));
    assert!(stats.stop_error.as_ref().is_some_and(|e| e.is_disconnect()));
    assert_eq!(stats.saved_points, 1);
    assert!(logs_contain("Failed to stop stream"));
}

// =============================================================================
// Statistics and storage
// =============================================================================

#[test]
fn test_multi_channel_statistics() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let source = ScriptedSource::from_batches(vec![
        vec![0.1, 0.2, LOST_SAMPLE_SENTINEL, LOST_SAMPLE_SENTINEL],
        vec![0.1, 0.2, 0.1, 0.2],
    ])
    .cancel_after(2, cancel.clone());
    let p = StreamParams::new(
        2,
        1,
        2.0,
        vec!["AIN0".to_string(), "AIN1".to_string()],
        "multi",
    )
    .with_output_dir(dir.path());
    let mut controller = StreamController::new(source, p).unwrap();

    let stats = controller.run(&cancel).unwrap();

    assert_eq!(stats.num_channels, 2);
    assert_eq!(stats.total_scans, 8);
    assert_eq!(stats.skipped_scans, 1.0);
    assert_eq!(
        controller.source().started_with(),
        Some(&(2, vec![0, 2], 2.0))
    );
    if let (Some(scan), Some(sample)) = (stats.timed_scan_rate, stats.timed_sample_rate) {
        assert!((sample - 2.0 * scan).abs() < 1e-9 * sample.max(1.0));
    }

    let map = stats.to_map();
    assert_eq!(map["Total scans"], Some(8.0));
    assert_eq!(map["Saved points"], Some(1.0));
}

#[test]
fn test_written_point_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let source = ScriptedSource::from_batches(vec![vec![0.123456789]])
        .cancel_after(1, cancel.clone());
    let p = params(dir.path(), 1, 1)
        .with_temp_scale(37.5)
        .with_voltage_offset(-1.25);
    let mut controller = StreamController::new(source, p).unwrap();

    controller.run(&cancel).unwrap();

    let rows = read_all(dir.path());
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].temperature, 37.5 * 0.123456789 - 1.25);
}

#[test]
fn test_simulated_source_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let settings = SimulationSettings {
        base_voltage: 0.4,
        noise_amplitude: 0.0,
        lost_sample_probability: 0.0,
        realtime: false,
    };
    let source = SimulatedSource::open("T7", "ANY", "ANY", settings).unwrap();
    let p = StreamParams::new(10, 1000, 50.0, vec!["AIN1".to_string()], "sim")
        .with_output_dir(dir.path());
    let mut controller = StreamController::new(source, p).unwrap();

    let cancel = CancellationToken::new();
    let timer = cancel.clone();
    let handle = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        timer.cancel();
    });

    let stats = controller.run(&cancel).unwrap();
    handle.join().unwrap();

    assert!(matches!(stats.stop_reason, Some(StopReason::Cancelled)));
    assert!(stats.total_scans > 0);
    assert_eq!(stats.total_scans % 50, 0);
    let rows = read_all(dir.path());
    assert_eq!(rows.len() as u64, stats.saved_points);
    assert!(rows.iter().all(|p| (p.temperature - 20.0).abs() < 1e-9));
}
