//! Recording of detector sessions.
//!
//! A [`Recorder`] is handed to [`crate::algo::Detector::start`]. It receives
//! the algo data (config and calibration context) once, then every detector
//! result. [`FileRecorder`] keeps results in a [`ResultTable`] and writes it
//! out when the detector stops.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, info};

use crate::algo::detector::DetectorResult;
use crate::error::Result;
use crate::persistence::{save_algo_data_to_path, AlgoData};

pub const ALGO_DATA_FILE_NAME: &str = "algo.json";
pub const RESULTS_CSV_FILE_NAME: &str = "results.csv";
#[cfg(feature = "parquet")]
pub const RESULTS_PARQUET_FILE_NAME: &str = "results.parquet";

pub trait Recorder {
    fn record_algo_data(&mut self, data: &AlgoData) -> Result<()>;

    fn record_result(&mut self, frame_index: u64, result: &DetectorResult) -> Result<()>;

    /// Flush everything recorded. Called once, when the detector stops.
    fn finish(&mut self) -> Result<()>;
}

/// One detected peak of one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub frame_index: u64,
    pub timestamp: DateTime<Utc>,
    /// Position in the sorted peak list, 0 first.
    pub rank: u32,
    pub distance_m: f64,
    pub strength: f64,
}

/// Detector results in long format: one row per peak.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultTable {
    rows: Vec<ResultRow>,
}

impl ResultTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_result(&mut self, frame_index: u64, timestamp: DateTime<Utc>, result: &DetectorResult) {
        for (rank, (&distance_m, &strength)) in result.distances.iter().zip(&result.strengths).enumerate() {
            self.rows.push(ResultRow {
                frame_index,
                timestamp,
                rank: rank as u32,
                distance_m,
                strength,
            });
        }
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn write_csv<W: Write>(&self, mut w: W) -> std::io::Result<()> {
        writeln!(w, "frame_index,timestamp,rank,distance_m,strength")?;
        for row in &self.rows {
            writeln!(
                w,
                "{},{},{},{:.6},{:.3}",
                row.frame_index,
                row.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
                row.rank,
                row.distance_m,
                row.strength
            )?;
        }
        Ok(())
    }

    pub fn save_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let mut w = std::io::BufWriter::new(file);
        self.write_csv(&mut w)?;
        w.flush()?;
        Ok(())
    }

    #[cfg(feature = "parquet")]
    pub fn save_parquet<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        use std::sync::Arc;

        use arrow_array::{Float64Array, RecordBatch, TimestampMillisecondArray, UInt32Array, UInt64Array};
        use arrow_schema::{DataType, Field, Schema, TimeUnit};
        use parquet::arrow::arrow_writer::ArrowWriter;
        use parquet::file::properties::WriterProperties;

        let schema = Arc::new(Schema::new(vec![
            Field::new("frame_index", DataType::UInt64, false),
            Field::new("timestamp", DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into())), false),
            Field::new("rank", DataType::UInt32, false),
            Field::new("distance_m", DataType::Float64, false),
            Field::new("strength", DataType::Float64, false),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(UInt64Array::from_iter_values(self.rows.iter().map(|r| r.frame_index))) as _,
                Arc::new(
                    TimestampMillisecondArray::from_iter_values(self.rows.iter().map(|r| r.timestamp.timestamp_millis()))
                        .with_timezone("UTC"),
                ) as _,
                Arc::new(UInt32Array::from_iter_values(self.rows.iter().map(|r| r.rank))) as _,
                Arc::new(Float64Array::from_iter_values(self.rows.iter().map(|r| r.distance_m))) as _,
                Arc::new(Float64Array::from_iter_values(self.rows.iter().map(|r| r.strength))) as _,
            ],
        )?;
        let file = std::fs::File::create(path)?;
        let props = WriterProperties::builder().build();
        let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;
        writer.write(&batch)?;
        writer.close()?;
        Ok(())
    }
}

/// Writes a recording into a directory: algo data right away, the result
/// table when finished.
#[derive(Debug)]
pub struct FileRecorder {
    dir: PathBuf,
    table: ResultTable,
}

impl FileRecorder {
    /// Create `dir` if needed.
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            table: ResultTable::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn table(&self) -> &ResultTable {
        &self.table
    }
}

impl Recorder for FileRecorder {
    fn record_algo_data(&mut self, data: &AlgoData) -> Result<()> {
        let path = self.dir.join(ALGO_DATA_FILE_NAME);
        save_algo_data_to_path(data, &path)?;
        debug!(path = %path.display(), "algo data recorded");
        Ok(())
    }

    fn record_result(&mut self, frame_index: u64, result: &DetectorResult) -> Result<()> {
        self.table.push_result(frame_index, Utc::now(), result);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.table.save_csv(self.dir.join(RESULTS_CSV_FILE_NAME))?;
        #[cfg(feature = "parquet")]
        self.table.save_parquet(self.dir.join(RESULTS_PARQUET_FILE_NAME))?;
        info!(dir = %self.dir.display(), rows = self.table.len(), "recording written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn result(distances: Vec<f64>, strengths: Vec<f64>) -> DetectorResult {
        DetectorResult {
            distances,
            strengths,
            processor_results: Vec::new(),
            service_extended_result: Vec::new(),
        }
    }

    #[test]
    fn csv_has_one_row_per_peak() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let mut table = ResultTable::new();
        table.push_result(0, ts, &result(vec![0.5, 1.25], vec![900.0, 120.5]));
        table.push_result(1, ts, &result(vec![], vec![]));
        table.push_result(2, ts, &result(vec![0.501], vec![880.0]));

        let mut out = Vec::new();
        table.write_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "frame_index,timestamp,rank,distance_m,strength");
        assert_eq!(lines[1], "0,2024-01-02T03:04:05.000Z,0,0.500000,900.000");
        assert_eq!(lines[2], "0,2024-01-02T03:04:05.000Z,1,1.250000,120.500");
        assert_eq!(lines[3], "2,2024-01-02T03:04:05.000Z,0,0.501000,880.000");
    }
}
