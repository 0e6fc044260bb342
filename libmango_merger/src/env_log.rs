use csv::{ReaderBuilder, Trim};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use time::PrimitiveDateTime;

use super::annotation::Annotation;
use super::error::EnvLogError;
use super::timestamp::TimestampFormat;

const DEFAULT_BENCH_DELIMITER: char = ';';
const DEFAULT_BENCH_TIMESTAMP_COLUMN: &str = "Timestamp";
// MIDAS history exports carry an 8 line preamble before the data
const DEFAULT_FACILITY_SKIP_ROWS: usize = 8;
const DEFAULT_FACILITY_FIELDS: [&str; 6] = [
    "KEG_temp",
    "KEG_pressure",
    "KEG_humidity",
    "MANGOlino_temp",
    "MANGOlino_pressure",
    "MANGOlino_humidity",
];

fn default_bench_delimiter() -> char {
    DEFAULT_BENCH_DELIMITER
}

fn default_bench_timestamp_column() -> String {
    String::from(DEFAULT_BENCH_TIMESTAMP_COLUMN)
}

fn default_bench_timestamp_format() -> TimestampFormat {
    TimestampFormat::BenchSensor
}

fn default_facility_skip_rows() -> usize {
    DEFAULT_FACILITY_SKIP_ROWS
}

fn default_facility_fields() -> Vec<String> {
    DEFAULT_FACILITY_FIELDS.iter().map(|s| s.to_string()).collect()
}

fn default_facility_timestamp_format() -> TimestampFormat {
    TimestampFormat::DayFirst
}

/// The shapes of environmental log the merger can read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EnvLogFormat {
    /// Compact bench sensor log: delimited text with a header row. One column holds the
    /// timestamp, every other column is a field.
    BenchSensor {
        #[serde(default = "default_bench_delimiter")]
        delimiter: char,
        #[serde(default = "default_bench_timestamp_column")]
        timestamp_column: String,
        #[serde(default = "default_bench_timestamp_format")]
        timestamp_format: TimestampFormat,
    },
    /// Facility monitoring (MIDAS history) export: a preamble of `skip_rows` lines, then
    /// tab separated rows without a header. The first column is the time, the rest are
    /// named by `field_names` in order.
    FacilityMonitor {
        #[serde(default = "default_facility_skip_rows")]
        skip_rows: usize,
        #[serde(default = "default_facility_fields")]
        field_names: Vec<String>,
        #[serde(default = "default_facility_timestamp_format")]
        timestamp_format: TimestampFormat,
    },
}

impl Default for EnvLogFormat {
    fn default() -> Self {
        Self::BenchSensor {
            delimiter: default_bench_delimiter(),
            timestamp_column: default_bench_timestamp_column(),
            timestamp_format: default_bench_timestamp_format(),
        }
    }
}

impl EnvLogFormat {
    /// A facility monitor format with the default preamble length and field names
    pub fn facility_monitor() -> Self {
        Self::FacilityMonitor {
            skip_rows: default_facility_skip_rows(),
            field_names: default_facility_fields(),
            timestamp_format: default_facility_timestamp_format(),
        }
    }
}

/// Where the environmental log lives and how to read it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvLogConfig {
    pub path: PathBuf,
    pub format: EnvLogFormat,
}

/// One reading of the environmental log
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentalSample {
    pub timestamp: PrimitiveDateTime,
    pub fields: Annotation,
}

/// Cells that are empty or not numeric are missing values
fn parse_cell(cell: &str) -> Option<f64> {
    let cell = cell.trim();
    if cell.is_empty() {
        return None;
    }
    cell.parse::<f64>().ok()
}

/// The environmental log, held in file order. No ordering by time is assumed.
#[derive(Debug, Clone, Default)]
pub struct EnvLog {
    samples: Vec<EnvironmentalSample>,
}

impl EnvLog {
    pub fn from_samples(samples: Vec<EnvironmentalSample>) -> Self {
        Self { samples }
    }

    /// Read a log from disk. Any sample with a bad timestamp fails the whole read.
    pub fn read(config: &EnvLogConfig) -> Result<Self, EnvLogError> {
        if !config.path.exists() {
            return Err(EnvLogError::BadFilePath(config.path.clone()));
        }
        let log = match &config.format {
            EnvLogFormat::BenchSensor {
                delimiter,
                timestamp_column,
                timestamp_format,
            } => Self::read_bench(&config.path, *delimiter, timestamp_column, timestamp_format)?,
            EnvLogFormat::FacilityMonitor {
                skip_rows,
                field_names,
                timestamp_format,
            } => Self::read_facility(&config.path, *skip_rows, field_names, timestamp_format)?,
        };
        if log.is_empty() {
            return Err(EnvLogError::Empty);
        }
        spdlog::info!(
            "Read {} environmental samples ({}) from {}",
            log.len(),
            human_bytes::human_bytes(config.path.metadata()?.len() as f64),
            config.path.display()
        );
        Ok(log)
    }

    fn read_bench(
        path: &Path,
        delimiter: char,
        timestamp_column: &str,
        timestamp_format: &TimestampFormat,
    ) -> Result<Self, EnvLogError> {
        if !delimiter.is_ascii() {
            return Err(EnvLogError::BadDelimiter(delimiter));
        }
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .delimiter(delimiter as u8)
            .flexible(true)
            .trim(Trim::All)
            .from_path(path)?;

        let header = rdr.headers()?.clone();
        let ts_idx = header
            .iter()
            .position(|h| h == timestamp_column)
            .ok_or_else(|| EnvLogError::MissingTimestampColumn(timestamp_column.to_string()))?;

        let mut samples = Vec::new();
        for (row, record) in rdr.records().enumerate() {
            let record = record?;
            // header is line 1
            let line = row + 2;
            let raw_ts = record.get(ts_idx).unwrap_or("");
            let timestamp = timestamp_format
                .parse(raw_ts)
                .map_err(|source| EnvLogError::Timestamp { line, source })?;
            let mut fields = Annotation::new();
            for (idx, name) in header.iter().enumerate() {
                if idx == ts_idx {
                    continue;
                }
                fields.insert(name, record.get(idx).and_then(parse_cell));
            }
            samples.push(EnvironmentalSample { timestamp, fields });
        }
        Ok(Self { samples })
    }

    fn read_facility(
        path: &Path,
        skip_rows: usize,
        field_names: &[String],
        timestamp_format: &TimestampFormat,
    ) -> Result<Self, EnvLogError> {
        let contents = std::fs::read_to_string(path)?;
        let mut samples = Vec::new();
        for (idx, line) in contents.lines().enumerate().skip(skip_rows) {
            if line.trim().is_empty() {
                continue;
            }
            // Runs of tabs are a single separator in these exports
            let mut entries = line.split('\t').map(str::trim).filter(|e| !e.is_empty());
            let raw_ts = entries.next().unwrap_or("");
            let timestamp = timestamp_format
                .parse(raw_ts)
                .map_err(|source| EnvLogError::Timestamp {
                    line: idx + 1,
                    source,
                })?;
            let mut fields = Annotation::new();
            for name in field_names.iter() {
                fields.insert(name, entries.next().and_then(parse_cell));
            }
            if entries.next().is_some() {
                spdlog::debug!(
                    "Environmental log line {} has more columns than configured field names",
                    idx + 1
                );
            }
            samples.push(EnvironmentalSample { timestamp, fields });
        }
        Ok(Self { samples })
    }

    pub fn samples(&self) -> &[EnvironmentalSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
