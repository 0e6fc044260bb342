use std::path::PathBuf;
use thiserror::Error;

use super::run_record::RunId;
use super::worker_status::WorkerStatus;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FieldError {
    #[error("Field {field} value {value:?} split into {found} parts; expected {expected}")]
    Malformed {
        field: String,
        value: String,
        expected: usize,
        found: usize,
    },
    #[error("Field {field} contains a value that is not a number: {value:?}")]
    NotANumber { field: String, value: String },
    #[error("Required field {0} is missing")]
    Missing(String),
    #[error("Run range {start}-{stop} is inverted")]
    InvertedRange { start: u32, stop: u32 },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimestampError {
    #[error("Could not parse timestamp {value:?} with the {format} format")]
    Unparseable { value: String, format: &'static str },
    #[error("Run {0} has no start time to match against the environmental log")]
    Missing(RunId),
}

#[derive(Debug, Error)]
pub enum LogbookError {
    #[error("Could not open logbook because file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Logbook failed to parse delimited text: {0}")]
    CsvError(#[from] csv::Error),
    #[error("Logbook failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Logbook does not contain the required column {0:?}")]
    MissingColumn(String),
    #[error("Logbook line {line} is malformed: {source}")]
    Row { line: usize, source: FieldError },
    #[error("Logbook delimiter {0:?} is not a single-byte (ASCII) character")]
    BadDelimiter(char),
}

#[derive(Debug, Error)]
pub enum EnvLogError {
    #[error("Could not open environmental log because file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Environmental log failed to parse delimited text: {0}")]
    CsvError(#[from] csv::Error),
    #[error("Environmental log failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Environmental log does not contain the timestamp column {0:?}")]
    MissingTimestampColumn(String),
    #[error("Environmental log line {line} has a bad timestamp: {source}")]
    Timestamp { line: usize, source: TimestampError },
    #[error("Environmental log contains no samples")]
    Empty,
    #[error("Environmental log delimiter {0:?} is not a single-byte (ASCII) character")]
    BadDelimiter(char),
}

#[derive(Debug, Error)]
pub enum EventFileError {
    #[error("EventFile failed due to HDF5 error: {0}")]
    HDF5Error(#[from] hdf5::Error),
    #[error("EventFile has no tree named {0}")]
    NoSuchTree(String),
    #[error("EventFile tree {tree} has columns of different lengths: {first_column} has {first_length} entries, {column} has {length}")]
    RaggedTree {
        tree: String,
        first_column: String,
        first_length: usize,
        column: String,
        length: usize,
    },
}

#[derive(Debug, Error)]
pub enum AnnotatorError {
    #[error("Annotator could not find event file {0:?}")]
    FileNotFound(PathBuf),
    #[error("Annotator could not find tree {tree} in event file {path:?}")]
    TreeNotFound { tree: String, path: PathBuf },
    #[error("Annotator found field {field} already present in {path:?}")]
    FieldAlreadyExists { field: String, path: PathBuf },
    #[error("Annotator failed to match the environmental log: {0}")]
    TimestampError(#[from] TimestampError),
    #[error("Annotator failed because the environmental log is empty")]
    EmptyEnvLog,
    #[error("Annotator failed due to EventFile error: {0}")]
    EventFileError(#[from] EventFileError),
}

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("Merge tool {tool:?} could not be launched: {source}")]
    Spawn {
        tool: PathBuf,
        source: std::io::Error,
    },
    #[error("Merge tool failed building {destination:?} (exit code {code:?}): {stderr}")]
    ToolFailure {
        destination: PathBuf,
        code: Option<i32>,
        stderr: String,
    },
    #[error("Merge plan failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<WorkerStatus>),
}

#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("Cleanup failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Refusing to empty {0:?} because it is not a directory")]
    NotADirectory(PathBuf),
    #[error("Cleanup failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<WorkerStatus>),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Merging was requested but no merge tool is configured")]
    NoMergeTool,
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor failed due to Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Processor failed due to Logbook error: {0}")]
    LogbookError(#[from] LogbookError),
    #[error("Processor failed due to environmental log error: {0}")]
    EnvLogError(#[from] EnvLogError),
    #[error("Processor failed due to Merge error: {0}")]
    MergeError(#[from] MergeError),
    #[error("Processor failed due to Cleanup error: {0}")]
    CleanupError(#[from] CleanupError),
    #[error("Processor failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<WorkerStatus>),
    #[error("Processor failed due to IO error: {0}")]
    IoError(#[from] std::io::Error),
}
