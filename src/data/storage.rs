//! Hourly CSV storage for aggregated points.
//!
//! [`BatchWriter`] buffers [`DataPoint`]s and appends them to a file named
//! after the current local hour, `<preamble>_<YYYY_MM_DD_HH>00.csv`. Each row
//! is `timestamp, temperature` with no header. The file is opened in append
//! mode and closed again on every flush, so completed hourly files can be read
//! by other processes while a run is in progress.
use chrono::{DateTime, Local, TimeZone};
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::data::aggregator::DataPoint;
use crate::error::AppResult;

/// Column separator of the output files.
pub const DELIMITER: &str = ", ";

/// File name for the hour containing `time`.
pub fn fname_from_time<Tz: TimeZone>(preamble: &str, time: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("{}_{}.csv", preamble, time.format("%Y_%m_%d_%H00"))
}

/// Serialize one point as a CSV row, without the trailing newline.
///
/// `f64` display output is the shortest representation that parses back to
/// the same value, so rows round-trip exactly.
pub fn format_row(point: &DataPoint) -> String {
    format!("{}{}{}", point.timestamp, DELIMITER, point.temperature)
}

/// Append points to `path`, creating it if needed.
pub fn append_to_file(path: &Path, points: &[DataPoint]) -> AppResult<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = BufWriter::new(file);
    for point in points {
        writeln!(writer, "{}", format_row(point))?;
    }
    writer.flush()?;
    Ok(())
}

/// Read every row of an output file back into points.
pub fn read_points(path: &Path) -> AppResult<Vec<DataPoint>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(b',')
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut points = Vec::new();
    for record in reader.deserialize() {
        let (timestamp, temperature): (f64, f64) = record?;
        points.push(DataPoint::new(timestamp, temperature));
    }
    Ok(points)
}

/// Outcome of one flush.
#[derive(Debug, Clone, PartialEq)]
pub struct FlushReport {
    /// File the rows were appended to
    pub path: PathBuf,
    /// Rows written
    pub rows: usize,
}

/// Buffers points and flushes them to the hourly file.
#[derive(Debug)]
pub struct BatchWriter {
    buffer: Vec<DataPoint>,
    points_per_write: usize,
    preamble: String,
    output_dir: PathBuf,
    rows_written: u64,
}

impl BatchWriter {
    /// Writer flushing every `points_per_write` points to files named after `preamble`.
    pub fn new(points_per_write: usize, preamble: impl Into<String>) -> Self {
        let points_per_write = points_per_write.max(1);
        Self {
            buffer: Vec::with_capacity(points_per_write),
            points_per_write,
            preamble: preamble.into(),
            output_dir: PathBuf::from("."),
            rows_written: 0,
        }
    }

    /// Write files into `dir` instead of the working directory.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Buffer a point, flushing when the buffer reaches capacity.
    pub fn append(&mut self, point: DataPoint) -> AppResult<Option<FlushReport>> {
        self.buffer.push(point);
        if self.buffer.len() >= self.points_per_write {
            return self.flush().map(Some);
        }
        Ok(None)
    }

    /// Write the buffered points to the file for the current hour.
    pub fn flush(&mut self) -> AppResult<FlushReport> {
        self.flush_at(&Local::now())
    }

    /// Write the buffered points to the file for the hour containing `time`.
    ///
    /// On failure the points stay buffered so a later flush can retry them.
    pub fn flush_at<Tz: TimeZone>(&mut self, time: &DateTime<Tz>) -> AppResult<FlushReport>
    where
        Tz::Offset: std::fmt::Display,
    {
        let path = self
            .output_dir
            .join(fname_from_time(&self.preamble, time));
        info!(path = %path.display(), rows = self.buffer.len(), "writing to file");

        append_to_file(&path, &self.buffer)?;

        let rows = self.buffer.len();
        self.rows_written += rows as u64;
        self.buffer.clear();
        debug!(total_rows = self.rows_written, "flush complete");

        Ok(FlushReport { path, rows })
    }

    /// Points waiting for the next flush.
    pub fn buffered(&self) -> &[DataPoint] {
        &self.buffer
    }

    /// Buffer capacity.
    pub fn points_per_write(&self) -> usize {
        self.points_per_write
    }

    /// Rows written by this writer so far.
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }
}
