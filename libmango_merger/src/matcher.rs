use time::{Duration, PrimitiveDateTime};

use super::annotation::Annotation;
use super::env_log::{EnvLog, EnvironmentalSample};
use super::error::{AnnotatorError, TimestampError};
use super::run_record::RunRecord;
use super::timestamp::{distance, TimestampFormat};

/// Find the sample closest in time to the query.
///
/// A single linear scan, so the samples may be in any order. On an exact tie the sample
/// seen first wins. Returns None only for an empty slice.
pub fn find_nearest(
    samples: &[EnvironmentalSample],
    query: PrimitiveDateTime,
) -> Option<&EnvironmentalSample> {
    let mut best: Option<(&EnvironmentalSample, Duration)> = None;
    for sample in samples {
        let delta = distance(sample.timestamp, query);
        match best {
            Some((_, best_delta)) if delta >= best_delta => (),
            _ => best = Some((sample, delta)),
        }
    }
    best.map(|(sample, _)| sample)
}

/// Build the full set of fields for a run: the fields of the environmental sample nearest
/// to the record's start time (without its timestamp) followed by `run_fields`.
pub fn match_annotation(
    log: &EnvLog,
    record: &RunRecord,
    run_fields: &Annotation,
    query_format: &TimestampFormat,
) -> Result<Annotation, AnnotatorError> {
    let raw_time = record
        .start_time
        .as_deref()
        .ok_or(TimestampError::Missing(record.run))?;
    let query = query_format.parse(raw_time)?;
    let nearest = find_nearest(log.samples(), query).ok_or(AnnotatorError::EmptyEnvLog)?;
    spdlog::debug!(
        "Run {} started {} matched environmental sample at {}",
        record.run,
        query,
        nearest.timestamp
    );

    let mut fields = nearest.fields.clone();
    fields.extend(run_fields);
    Ok(fields)
}
