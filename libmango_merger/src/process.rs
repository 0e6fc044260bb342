use std::path::PathBuf;
use std::sync::mpsc::Sender;

use super::annotation::Annotation;
use super::annotator::{annotate_run, AnnotationStage};
use super::cleanup::empty_directory;
use super::config::Config;
use super::env_log::EnvLog;
use super::error::{AnnotatorError, ConfigError, ProcessorError};
use super::logbook::{read_records, write_summary};
use super::matcher::match_annotation;
use super::merge_exec::{execute_plan, MergeTool};
use super::merge_plan::{group_runs, plan, MergeGroup};
use super::run_record::{RunId, RunRecord};
use super::worker_status::{Stage, WorkerStatus};

/// Result of an annotation pass. A failed run does not stop the pass.
#[derive(Debug, Default)]
pub struct AnnotationReport {
    pub annotated: Vec<RunId>,
    pub failed: Vec<(RunId, AnnotatorError)>,
}

impl AnnotationReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// What a full pipeline pass did
#[derive(Debug, Default)]
pub struct ProcessSummary {
    pub n_records: usize,
    pub annotation: Option<AnnotationReport>,
    pub merged: Vec<PathBuf>,
}

/// One file to annotate
struct AnnotationTarget<'a> {
    run: RunId,
    /// The record whose start time is matched against the environmental log
    record: &'a RunRecord,
    /// Logbook fields attached to the file
    fields: Annotation,
}

/// The files to annotate and the fields that go into each.
///
/// Before merging every record annotates its own file. After merging every group annotates
/// its merged file.
fn annotation_targets<'a>(records: &'a [RunRecord], config: &Config) -> Vec<AnnotationTarget<'a>> {
    match config.annotation.stage {
        AnnotationStage::BeforeMerge => records
            .iter()
            .map(|record| AnnotationTarget {
                run: record.run,
                record,
                fields: record.annotation_fields(),
            })
            .collect(),
        AnnotationStage::AfterMerge => group_runs(records)
            .iter()
            .filter_map(|group| group_target(records, group))
            .collect(),
    }
}

/// The target of a merged group. Only the logbook fields that every record of the group
/// holds with the same value are kept. The record with the lowest run number supplies the
/// start time for the environmental match.
fn group_target<'a>(records: &'a [RunRecord], group: &MergeGroup) -> Option<AnnotationTarget<'a>> {
    let run = RunId::from_bounds(group.first_run()?, group.last_run()?).ok()?;
    let members = records.iter().filter(|r| r.condition == group.condition);
    let record = members.clone().min_by_key(|r| r.run.start())?;
    let mut fields = record.annotation_fields();
    for member in members {
        for name in fields.retain_agreeing(&member.annotation_fields()) {
            spdlog::warn!(
                "Field {} differs between the runs of group {}; it is not attached to the merged file",
                name,
                run
            );
        }
    }
    Some(AnnotationTarget { run, record, fields })
}

/// Attach metadata (and environmental readings, when an env log is configured) to the event
/// files of the given records.
///
/// The environmental log is loaded once up front; failing to load it fails the pass. Errors
/// for a single run are logged and recorded in the report.
pub fn annotate_records(
    records: &[RunRecord],
    config: &Config,
    tx: &Sender<WorkerStatus>,
) -> Result<AnnotationReport, ProcessorError> {
    let env_log = match &config.env_log {
        Some(env_config) => Some(EnvLog::read(env_config)?),
        None => {
            spdlog::info!("No environmental log configured, annotating logbook fields only");
            None
        }
    };

    let targets = annotation_targets(records, config);
    let total = targets.len().max(1) as f32;
    let mut report = AnnotationReport::default();
    for (idx, target) in targets.into_iter().enumerate() {
        let AnnotationTarget {
            run,
            record,
            fields,
        } = target;
        tx.send(WorkerStatus::new(idx as f32 / total, Stage::Annotate, run.to_string()))?;
        let fields = match &env_log {
            Some(log) => match match_annotation(log, record, &fields, &config.query_time_format) {
                Ok(fields) => fields,
                Err(e) => {
                    spdlog::error!("Could not match run {} to the environmental log: {}", run, e);
                    report.failed.push((run, e));
                    continue;
                }
            },
            None => fields,
        };

        let path = config.get_annotation_file(&run);
        match annotate_run(&path, run, &fields, &config.annotation) {
            Ok(_) => report.annotated.push(run),
            Err(e) => {
                spdlog::error!("Failed to annotate run {}: {}", run, e);
                report.failed.push((run, e));
            }
        }
    }
    tx.send(WorkerStatus::new(1.0, Stage::Annotate, String::from("done")))?;

    spdlog::info!(
        "Annotated {} files, {} failed",
        report.annotated.len(),
        report.failed.len()
    );
    Ok(report)
}

/// Plan the merge groups and run the merge tool on each, optionally emptying the target
/// folder first.
pub fn merge_records(
    records: &[RunRecord],
    config: &Config,
    tx: &Sender<WorkerStatus>,
) -> Result<Vec<PathBuf>, ProcessorError> {
    if config.clean_target {
        empty_directory(&config.target_folder, tx)?;
    } else {
        std::fs::create_dir_all(&config.target_folder)?;
    }
    let instructions = plan(records, config);
    spdlog::info!("Merge plan has {} groups", instructions.len());
    let tool = MergeTool::from_config(config);
    Ok(execute_plan(&tool, &instructions, tx)?)
}

/// The main loop of mango_merger.
///
/// Reads the logbook, then runs the annotation and merge stages the configuration asks for.
/// Intended to run on a worker thread while the caller watches the progress channel.
pub fn process(config: &Config, tx: &Sender<WorkerStatus>) -> Result<ProcessSummary, ProcessorError> {
    if config.merge && !config.has_merge_tool() {
        return Err(ConfigError::NoMergeTool.into());
    }
    spdlog::info!("Reading logbook {}...", config.logbook.path.display());
    let records = read_records(&config.logbook)?;
    if let Some(summary_path) = &config.summary_path {
        write_summary(summary_path, &records)?;
    }

    let mut summary = ProcessSummary {
        n_records: records.len(),
        ..Default::default()
    };

    if config.need_annotation() && config.annotation.stage == AnnotationStage::BeforeMerge {
        spdlog::info!("Annotating run files...");
        summary.annotation = Some(annotate_records(&records, config, tx)?);
    }

    if config.merge {
        spdlog::info!("Merging run files...");
        summary.merged = merge_records(&records, config, tx)?;
    }

    if config.need_annotation() && config.annotation.stage == AnnotationStage::AfterMerge {
        spdlog::info!("Annotating merged files...");
        summary.annotation = Some(annotate_records(&records, config, tx)?);
    }

    spdlog::info!("Done.");
    Ok(summary)
}
