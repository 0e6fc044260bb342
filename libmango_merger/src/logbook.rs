// The logbook comes in two layouts. The older "range sheet" has one row per block of runs
// (start and stop run number) with the sensor readings typed in by hand as a single
// "T;P;H;VOC" cell. The newer "run list" has one row per run with a start time, so the
// environmental data is matched from the sensor logs instead.
use csv::{ReaderBuilder, StringRecord, Trim, Writer};
use fxhash::FxHashMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use super::annotation::Annotation;
use super::error::{FieldError, LogbookError};
use super::run_record::{ConditionKey, GasMix, RunId, RunRecord, GAS_FIELDS};

/// Metadata names for the T;P;H;VOC sensor bundle, in logbook order
pub const SENSOR_FIELDS: [&str; 4] = [
    "Temperature (K)",
    "Pressure (Pa)",
    "Humidity (%)",
    "VOC (-)",
];
const GAS_SEPARATOR: char = '/';
const SENSOR_SEPARATOR: char = ';';
// Tokens the shifters write for "no reading"
const PLACEHOLDER_TOKENS: [&str; 2] = ["-", "--"];

/// Keep only rows whose `column` contains `marker` (case-sensitive substring)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowFilter {
    pub column: String,
    pub marker: String,
}

impl RowFilter {
    /// Missing values never match
    pub fn matches(&self, row: &LogbookRow) -> bool {
        row.get(&self.column)
            .map(|value| value.contains(&self.marker))
            .unwrap_or(false)
    }
}

/// What to do with a row that fails to normalize
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedRowPolicy {
    /// Warn and drop the row
    #[default]
    Skip,
    /// Stop reading the logbook with an error
    Abort,
}

/// The column layout of the logbook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogbookLayout {
    RangeSheet {
        start_run_column: String,
        stop_run_column: String,
        drift_field_column: String,
        position_column: String,
        sensor_column: String,
        gas_column: String,
        start_time_column: Option<String>,
    },
    RunList {
        run_number_column: String,
        start_time_column: String,
        drift_field_column: String,
        position_column: Option<String>,
        description_column: Option<String>,
    },
}

impl LogbookLayout {
    /// The range sheet layout with the column names of the LNGS logbook
    pub fn range_sheet() -> Self {
        Self::RangeSheet {
            start_run_column: String::from("Run number start"),
            stop_run_column: String::from("Run number end"),
            drift_field_column: String::from("Requested_Drift_field_V_cm"),
            position_column: String::from("Position of source [hole]"),
            sensor_column: String::from("Sensor inside [T;P;H;--] [K,Pa,%,-]"),
            gas_column: String::from("He/CF4 ratio"),
            start_time_column: None,
        }
    }

    /// The run list layout with the column names of the data-run export
    pub fn run_list() -> Self {
        Self::RunList {
            run_number_column: String::from("run_number"),
            start_time_column: String::from("start_time"),
            drift_field_column: String::from("DRIFT_V"),
            position_column: Some(String::from("source_position")),
            description_column: Some(String::from("run_description")),
        }
    }

    /// Columns that must be present in the header
    fn required_columns(&self) -> Vec<&str> {
        match self {
            Self::RangeSheet {
                start_run_column,
                stop_run_column,
                ..
            } => vec![start_run_column.as_str(), stop_run_column.as_str()],
            Self::RunList {
                run_number_column, ..
            } => vec![run_number_column.as_str()],
        }
    }
}

/// Logbook reading configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogbookConfig {
    pub path: PathBuf,
    pub delimiter: char,
    #[serde(default)]
    pub filter: Option<RowFilter>,
    #[serde(default)]
    pub on_malformed: MalformedRowPolicy,
    pub layout: LogbookLayout,
}

impl Default for LogbookConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("None"),
            delimiter: ',',
            filter: None,
            on_malformed: MalformedRowPolicy::Skip,
            layout: LogbookLayout::run_list(),
        }
    }
}

/// A logbook table as read from delimited text: a header and rows of cells
#[derive(Debug, Clone, Default)]
pub struct Logbook {
    rows: Vec<StringRecord>,
    columns: FxHashMap<String, usize>,
}

impl Logbook {
    /// Read a logbook file
    pub fn read(path: &Path, delimiter: char) -> Result<Self, LogbookError> {
        if !path.exists() {
            return Err(LogbookError::BadFilePath(path.to_path_buf()));
        }
        let file = std::fs::File::open(path)?;
        Self::from_reader(file, delimiter)
    }

    pub fn from_reader<R: Read>(reader: R, delimiter: char) -> Result<Self, LogbookError> {
        if !delimiter.is_ascii() {
            return Err(LogbookError::BadDelimiter(delimiter));
        }
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .delimiter(delimiter as u8)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(reader);

        let columns = rdr
            .headers()?
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.to_string(), idx))
            .collect();
        let mut rows = Vec::new();
        for record in rdr.records() {
            rows.push(record?);
        }
        Ok(Self { rows, columns })
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = LogbookRow<'_>> {
        self.rows.iter().enumerate().map(|(index, record)| LogbookRow {
            columns: &self.columns,
            record,
            index,
        })
    }
}

/// A view of one logbook row with cells looked up by column name
#[derive(Debug, Clone, Copy)]
pub struct LogbookRow<'a> {
    columns: &'a FxHashMap<String, usize>,
    record: &'a StringRecord,
    index: usize,
}

impl LogbookRow<'_> {
    /// The value of a cell. Missing columns and empty cells are None.
    pub fn get(&self, column: &str) -> Option<&str> {
        let idx = self.columns.get(column)?;
        self.record.get(*idx).filter(|value| !value.is_empty())
    }

    /// Line number in the source file (the header is line 1)
    pub fn line(&self) -> usize {
        self.index + 2
    }
}

fn parse_number(field: &str, value: &str) -> Result<Option<f64>, FieldError> {
    let value = value.trim();
    if value.is_empty() || PLACEHOLDER_TOKENS.contains(&value) {
        return Ok(None);
    }
    value
        .parse::<f64>()
        .map(Some)
        .map_err(|_| FieldError::NotANumber {
            field: field.to_string(),
            value: value.to_string(),
        })
}

fn parse_optional_number(field: &str, value: Option<&str>) -> Result<Option<f64>, FieldError> {
    match value {
        Some(v) => parse_number(field, v),
        None => Ok(None),
    }
}

/// Run numbers may have been saved by a spreadsheet as "101.0"
fn parse_run_number(field: &str, value: Option<&str>) -> Result<u32, FieldError> {
    let value = value.ok_or_else(|| FieldError::Missing(field.to_string()))?;
    if let Ok(run) = value.parse::<u32>() {
        return Ok(run);
    }
    match value.parse::<f64>() {
        Ok(v) if v.fract() == 0.0 && v >= 0.0 && v <= u32::MAX as f64 => Ok(v as u32),
        _ => Err(FieldError::NotANumber {
            field: field.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Split a compound cell into named numeric fields, in order.
///
/// The number of tokens must match the number of names exactly.
pub fn split_compound(
    field: &str,
    value: &str,
    separator: char,
    names: &[&str],
) -> Result<Annotation, FieldError> {
    let tokens: Vec<&str> = value.split(separator).collect();
    if tokens.len() != names.len() {
        return Err(FieldError::Malformed {
            field: field.to_string(),
            value: value.to_string(),
            expected: names.len(),
            found: tokens.len(),
        });
    }
    let mut fields = Annotation::new();
    for (name, token) in names.iter().zip(tokens) {
        fields.insert(name, parse_number(name, token)?);
    }
    Ok(fields)
}

/// Split a "He/CF4/SF6" gas ratio
pub fn split_gas_mix(value: &str) -> Result<GasMix, FieldError> {
    let fields = split_compound("gas ratio", value, GAS_SEPARATOR, &GAS_FIELDS)?;
    let get = |name: &str| fields.get(name).flatten();
    Ok(GasMix {
        helium: get(GAS_FIELDS[0]),
        cf4: get(GAS_FIELDS[1]),
        sf6: get(GAS_FIELDS[2]),
    })
}

/// Split a "T;P;H;VOC" sensor bundle
pub fn split_sensor_bundle(value: &str) -> Result<Annotation, FieldError> {
    split_compound("sensor bundle", value, SENSOR_SEPARATOR, &SENSOR_FIELDS)
}

fn hole_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"HOLE (\d+)").expect("hole pattern is a valid regex"))
}

/// Pull the source position out of a run description ("... HOLE 2 ...")
pub fn extract_hole(description: &str) -> Option<u32> {
    hole_pattern()
        .captures(description)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn normalize_row(row: &LogbookRow, layout: &LogbookLayout) -> Result<RunRecord, FieldError> {
    match layout {
        LogbookLayout::RangeSheet {
            start_run_column,
            stop_run_column,
            drift_field_column,
            position_column,
            sensor_column,
            gas_column,
            start_time_column,
        } => {
            let start = parse_run_number(start_run_column, row.get(start_run_column))?;
            let stop = parse_run_number(stop_run_column, row.get(stop_run_column))?;
            let condition = ConditionKey::new(
                parse_optional_number(position_column, row.get(position_column))?,
                parse_optional_number(drift_field_column, row.get(drift_field_column))?,
            );
            let mut record = RunRecord::new(RunId::from_bounds(start, stop)?, condition);
            record.start_time = start_time_column
                .as_deref()
                .and_then(|c| row.get(c))
                .map(str::to_string);

            // An empty gas cell still yields the gas columns, without values
            let gas = row.get(gas_column).map(split_gas_mix).transpose()?;
            record.gas = Some(gas.unwrap_or_default());

            match row.get(sensor_column) {
                Some(bundle) => record.metadata.extend(&split_sensor_bundle(bundle)?),
                None => {
                    for name in SENSOR_FIELDS {
                        record.metadata.insert(name, None);
                    }
                }
            }
            Ok(record)
        }
        LogbookLayout::RunList {
            run_number_column,
            start_time_column,
            drift_field_column,
            position_column,
            description_column,
        } => {
            let run = parse_run_number(run_number_column, row.get(run_number_column))?;
            let explicit_position = match position_column {
                Some(column) => parse_optional_number(column, row.get(column))?,
                None => None,
            };
            let position = explicit_position.or_else(|| {
                description_column
                    .as_deref()
                    .and_then(|c| row.get(c))
                    .and_then(extract_hole)
                    .map(f64::from)
            });
            let condition = ConditionKey::new(
                position,
                parse_optional_number(drift_field_column, row.get(drift_field_column))?,
            );
            let mut record = RunRecord::new(RunId::Single(run), condition);
            record.start_time = row.get(start_time_column).map(str::to_string);
            Ok(record)
        }
    }
}

/// Turn the logbook rows into RunRecords, keeping the logbook order
pub fn normalize(logbook: &Logbook, config: &LogbookConfig) -> Result<Vec<RunRecord>, LogbookError> {
    for column in config.layout.required_columns() {
        if !logbook.has_column(column) {
            return Err(LogbookError::MissingColumn(column.to_string()));
        }
    }
    if let Some(filter) = &config.filter {
        if !logbook.has_column(&filter.column) {
            spdlog::warn!(
                "Logbook has no column {:?} to filter on; no rows will be selected",
                filter.column
            );
        }
    }

    if logbook.is_empty() {
        spdlog::warn!("Logbook has a header but no rows");
    }

    let mut records = Vec::new();
    for row in logbook.rows() {
        if let Some(filter) = &config.filter {
            if !filter.matches(&row) {
                continue;
            }
        }
        match normalize_row(&row, &config.layout) {
            Ok(record) => records.push(record),
            Err(e) => match config.on_malformed {
                MalformedRowPolicy::Skip => {
                    spdlog::warn!("Skipping logbook line {}: {}", row.line(), e)
                }
                MalformedRowPolicy::Abort => {
                    return Err(LogbookError::Row {
                        line: row.line(),
                        source: e,
                    })
                }
            },
        }
    }
    spdlog::info!(
        "Selected {} runs from {} logbook rows",
        records.len(),
        logbook.len()
    );
    Ok(records)
}

/// Read and normalize the configured logbook
pub fn read_records(config: &LogbookConfig) -> Result<Vec<RunRecord>, LogbookError> {
    let logbook = Logbook::read(&config.path, config.delimiter)?;
    normalize(&logbook, config)
}

fn fmt_cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Write the normalized table as CSV, one row per record
pub fn write_summary(path: &Path, records: &[RunRecord]) -> Result<(), LogbookError> {
    let has_gas = records.iter().any(|r| r.gas.is_some());
    let mut metadata_names: Vec<&str> = Vec::new();
    for record in records.iter() {
        for name in record.metadata.names() {
            if !metadata_names.contains(&name) {
                metadata_names.push(name);
            }
        }
    }

    let mut writer = Writer::from_path(path)?;
    let mut header = vec!["start_run", "stop_run", "start_time", "position", "drift_field"];
    if has_gas {
        header.extend(GAS_FIELDS);
    }
    header.extend(metadata_names.iter());
    writer.write_record(&header)?;
    for record in records.iter() {
        let mut line = vec![
            record.run.start().to_string(),
            record.run.stop().to_string(),
            record.start_time.clone().unwrap_or_default(),
            fmt_cell(record.condition.position),
            fmt_cell(record.condition.drift_field),
        ];
        if has_gas {
            let gas = record.gas.unwrap_or_default();
            line.extend([gas.helium, gas.cf4, gas.sf6].map(fmt_cell));
        }
        for name in metadata_names.iter() {
            line.push(fmt_cell(record.metadata.get(name).flatten()));
        }
        writer.write_record(&line)?;
    }
    writer.flush()?;
    spdlog::info!("Wrote run summary to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const RANGE_SHEET: &str = "\
comments,Run number start,Run number end,Requested_Drift_field_V_cm,Position of source [hole],\"Sensor inside [T;P;H;--] [K,Pa,%,-]\",He/CF4 ratio
NID scan,5,8,500,2,293.1;90500;41;--,80/18/2
calibration,9,9,500,2,293.1;90500;41;3,80/18/2
NID single,12,12,600,,,60/40/0
NID broken,13,14,600,3,293.1;90500;41,60/40/0
,15,16,600,3,,60/40/0
";

    const RUN_LIST: &str = "\
run_number,start_time,DRIFT_V,source_position,run_description
101,2024-06-12 14:00:00,500,,source at HOLE 2 after refill
102,2024-06-12 15:00:00,500,,HOLE 2
103.0,2024-06-12 16:00:00,500,4,HOLE 2
104,2024-06-12 17:00:00,700,,pedestal run
";

    fn range_config() -> LogbookConfig {
        LogbookConfig {
            filter: Some(RowFilter {
                column: String::from("comments"),
                marker: String::from("NID"),
            }),
            layout: LogbookLayout::range_sheet(),
            ..Default::default()
        }
    }

    #[test]
    fn test_split_gas_mix() {
        let gas = split_gas_mix("80/18/2").unwrap();
        assert_eq!(
            gas,
            GasMix {
                helium: Some(80.0),
                cf4: Some(18.0),
                sf6: Some(2.0)
            }
        );
        assert!(matches!(
            split_gas_mix("80/20"),
            Err(FieldError::Malformed {
                expected: 3,
                found: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_split_sensor_bundle() {
        let fields = split_sensor_bundle("293.1;90500;41;--").unwrap();
        assert_eq!(fields.names().collect::<Vec<_>>(), SENSOR_FIELDS.to_vec());
        assert_eq!(fields.get("VOC (-)"), Some(None));
        assert_eq!(fields.get("Pressure (Pa)"), Some(Some(90500.0)));

        let err = split_sensor_bundle("293.1;90500;41").unwrap_err();
        assert_eq!(
            err,
            FieldError::Malformed {
                field: String::from("sensor bundle"),
                value: String::from("293.1;90500;41"),
                expected: 4,
                found: 3
            }
        );
        assert!(matches!(
            split_sensor_bundle("warm;90500;41;1"),
            Err(FieldError::NotANumber { .. })
        ));
    }

    #[test]
    fn test_extract_hole() {
        assert_eq!(extract_hole("source at HOLE 12, 500 V/cm"), Some(12));
        assert_eq!(extract_hole("hole 12"), None);
        assert_eq!(extract_hole("HOLE x"), None);
        assert_eq!(extract_hole(""), None);
    }

    #[test]
    fn test_range_sheet_skips_malformed() {
        let logbook = Logbook::from_reader(RANGE_SHEET.as_bytes(), ',').unwrap();
        let records = normalize(&logbook, &range_config()).unwrap();
        // calibration and empty comment rows are filtered, the broken bundle is skipped
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.run, RunId::Range { start: 5, stop: 8 });
        assert_eq!(first.condition, ConditionKey::new(Some(2.0), Some(500.0)));
        assert_eq!(first.gas.unwrap().helium, Some(80.0));
        assert_eq!(first.metadata.get("Temperature (K)"), Some(Some(293.1)));
        assert_eq!(first.metadata.get("VOC (-)"), Some(None));

        let second = &records[1];
        assert_eq!(second.run, RunId::Single(12));
        assert_eq!(second.condition.position, None);
        assert_eq!(second.metadata.get("Humidity (%)"), Some(None));
        assert_eq!(second.metadata.len(), 4);
        assert_eq!(second.gas.unwrap().sf6, Some(0.0));
    }

    #[test]
    fn test_range_sheet_abort_on_malformed() {
        let logbook = Logbook::from_reader(RANGE_SHEET.as_bytes(), ',').unwrap();
        let config = LogbookConfig {
            on_malformed: MalformedRowPolicy::Abort,
            ..range_config()
        };
        match normalize(&logbook, &config) {
            Err(LogbookError::Row { line, source }) => {
                assert_eq!(line, 5);
                assert!(matches!(source, FieldError::Malformed { .. }));
            }
            other => panic!("expected a row error, got {other:?}"),
        }
    }

    #[test]
    fn test_run_list_positions() {
        let logbook = Logbook::from_reader(RUN_LIST.as_bytes(), ',').unwrap();
        let records = normalize(&logbook, &LogbookConfig::default()).unwrap();
        let runs: Vec<RunId> = records.iter().map(|r| r.run).collect();
        assert_eq!(
            runs,
            vec![
                RunId::Single(101),
                RunId::Single(102),
                RunId::Single(103),
                RunId::Single(104)
            ]
        );
        assert_eq!(records[0].condition.position, Some(2.0));
        assert_eq!(records[1].condition.position, Some(2.0));
        // explicit column wins over the description
        assert_eq!(records[2].condition.position, Some(4.0));
        // no pattern, row still passes with the position unset
        assert_eq!(records[3].condition.position, None);
        assert_eq!(records[3].condition.drift_field, Some(700.0));
        assert_eq!(records[0].start_time.as_deref(), Some("2024-06-12 14:00:00"));
    }

    #[test]
    fn test_filter_on_missing_column_selects_nothing() {
        let logbook = Logbook::from_reader(RUN_LIST.as_bytes(), ',').unwrap();
        let config = LogbookConfig {
            filter: Some(RowFilter {
                column: String::from("comments"),
                marker: String::from("NID"),
            }),
            ..Default::default()
        };
        assert!(normalize(&logbook, &config).unwrap().is_empty());
    }

    #[test]
    fn test_missing_required_column() {
        let logbook = Logbook::from_reader("run,start_time\n1,x\n".as_bytes(), ',').unwrap();
        assert!(matches!(
            normalize(&logbook, &LogbookConfig::default()),
            Err(LogbookError::MissingColumn(c)) if c == "run_number"
        ));
    }

    #[test]
    fn test_write_summary() {
        let dir = tempfile::tempdir().unwrap();
        let logbook = Logbook::from_reader(RANGE_SHEET.as_bytes(), ',').unwrap();
        let records = normalize(&logbook, &range_config()).unwrap();
        let path = dir.path().join("df_out.csv");
        write_summary(&path, &records).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "start_run,stop_run,start_time,position,drift_field,He(%),CF4(%),SF6(%),Temperature (K),Pressure (Pa),Humidity (%),VOC (-)"
        );
        assert_eq!(lines.next().unwrap(), "5,8,,2,500,80,18,2,293.1,90500,41,");
        assert_eq!(lines.next().unwrap(), "12,12,,,600,60,40,0,,,,");
        assert!(lines.next().is_none());
    }

    #[test]
    fn test_non_ascii_delimiter_is_rejected() {
        // a cast to u8 would silently turn U+FF1B into the byte 0x1B
        let err = Logbook::from_reader("run_number\n1\n".as_bytes(), '\u{FF1B}').unwrap_err();
        assert!(matches!(err, LogbookError::BadDelimiter('\u{FF1B}')));

        let logbook = Logbook::from_reader("run_number\tstart_time\n".as_bytes(), '\t').unwrap();
        assert!(logbook.is_empty());
    }
}
