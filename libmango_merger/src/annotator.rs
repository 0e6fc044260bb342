use serde::{Deserialize, Serialize};
use std::path::Path;

use super::annotation::Annotation;
use super::error::AnnotatorError;
use super::event_file::{EventFile, HDFEventFile, DEFAULT_AUX_TABLE_NAME, DEFAULT_TREE_NAME};
use super::run_record::RunId;

/// How fields are attached to an event file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnnotationMode {
    /// One new column per field on the event tree, the value repeated for every event
    Branch { tree: String },
    /// A single-row table holding one column per field
    AuxTable { table: String },
}

impl Default for AnnotationMode {
    fn default() -> Self {
        Self::AuxTable {
            table: String::from(DEFAULT_AUX_TABLE_NAME),
        }
    }
}

impl AnnotationMode {
    pub fn branch() -> Self {
        Self::Branch {
            tree: String::from(DEFAULT_TREE_NAME),
        }
    }

    fn table_name(&self) -> &str {
        match self {
            Self::Branch { tree } => tree,
            Self::AuxTable { table } => table,
        }
    }
}

/// What to do when a field is already present in the target table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExistingFieldPolicy {
    /// Leave the existing column alone and report the field as skipped
    #[default]
    Skip,
    /// Fail the annotation before anything is written
    Error,
}

/// When the annotation step runs relative to merging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationStage {
    /// Annotate the per-run files in the source folder, then merge
    #[default]
    BeforeMerge,
    /// Merge first, then annotate the files in the target folder
    AfterMerge,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AnnotationConfig {
    pub enabled: bool,
    pub stage: AnnotationStage,
    pub mode: AnnotationMode,
    pub on_existing: ExistingFieldPolicy,
}

/// The fields that ended up written to a file, and those left alone because they existed
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AnnotationOutcome {
    pub written: Vec<String>,
    pub skipped: Vec<String>,
}

/// Attach fields to an open event file.
///
/// Every field is checked against the target table before anything is written, so an
/// `Error` policy leaves the file untouched. Missing values are written as 0.0.
pub fn annotate_event_file<F: EventFile>(
    file: &mut F,
    path: &Path,
    fields: &Annotation,
    mode: &AnnotationMode,
    policy: ExistingFieldPolicy,
) -> Result<AnnotationOutcome, AnnotatorError> {
    let table = mode.table_name();
    if let AnnotationMode::Branch { tree } = mode {
        if !file.has_tree(tree) {
            return Err(AnnotatorError::TreeNotFound {
                tree: tree.clone(),
                path: path.to_path_buf(),
            });
        }
    }

    let mut outcome = AnnotationOutcome::default();
    let mut to_write: Vec<(String, f32)> = Vec::new();
    let mut columns: Vec<String> = Vec::new();
    for (name, value) in fields.to_stored() {
        let column = file.column_name(&name);
        if file.has_field(table, &name) || columns.contains(&column) {
            match policy {
                ExistingFieldPolicy::Skip => outcome.skipped.push(name),
                ExistingFieldPolicy::Error => {
                    return Err(AnnotatorError::FieldAlreadyExists {
                        field: name,
                        path: path.to_path_buf(),
                    })
                }
            }
        } else {
            columns.push(column);
            to_write.push((name, value));
        }
    }

    match mode {
        AnnotationMode::Branch { tree } => {
            for (name, value) in to_write.iter() {
                file.append_scalar_field(tree, name, *value)?;
            }
        }
        AnnotationMode::AuxTable { table } => {
            if !to_write.is_empty() {
                file.create_aux_table(table, &to_write)?;
            }
        }
    }
    outcome.written = to_write.into_iter().map(|(name, _)| name).collect();
    Ok(outcome)
}

/// Annotate the event file of one run (or merged range) at `path`.
///
/// The file is opened here and released before returning, on success or failure.
pub fn annotate_run(
    path: &Path,
    run: RunId,
    fields: &Annotation,
    config: &AnnotationConfig,
) -> Result<AnnotationOutcome, AnnotatorError> {
    if !path.exists() {
        return Err(AnnotatorError::FileNotFound(path.to_path_buf()));
    }
    let mut file = HDFEventFile::open(path)?;
    let outcome = annotate_event_file(
        &mut file,
        path,
        fields,
        &config.mode,
        config.on_existing,
    )?;
    file.close()?;

    spdlog::info!(
        "Annotated run {} with {} fields",
        run,
        outcome.written.len()
    );
    if !outcome.skipped.is_empty() {
        spdlog::warn!(
            "Run {} already had fields {:?}; left them unchanged",
            run,
            outcome.skipped
        );
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_file::testing::{make_event_file, MemoryEventFile};

    fn fields() -> Annotation {
        [("KEG_temp", Some(21.5)), ("KEG_voc", None)]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_branch_mode_replicates_value() {
        let mut file = MemoryEventFile::with_tree("Events", "energy", vec![1.0, 2.0, 3.0]);
        let outcome = annotate_event_file(
            &mut file,
            Path::new("reco_run1_3D.h5"),
            &fields(),
            &AnnotationMode::branch(),
            ExistingFieldPolicy::Skip,
        )
        .unwrap();
        assert_eq!(outcome.written, vec!["KEG_temp", "KEG_voc"]);
        assert_eq!(file.column("Events", "KEG_temp"), Some(&vec![21.5; 3]));
        // missing value becomes 0.0, not NaN
        assert_eq!(file.column("Events", "KEG_voc"), Some(&vec![0.0; 3]));
    }

    #[test]
    fn test_branch_mode_missing_tree() {
        let mut file = MemoryEventFile::with_tree("Hits", "x", vec![1.0]);
        let err = annotate_event_file(
            &mut file,
            Path::new("reco_run1_3D.h5"),
            &fields(),
            &AnnotationMode::branch(),
            ExistingFieldPolicy::Skip,
        )
        .unwrap_err();
        assert!(matches!(err, AnnotatorError::TreeNotFound { tree, .. } if tree == "Events"));
    }

    #[test]
    fn test_aux_table_mode_single_row() {
        let mut file = MemoryEventFile::with_tree("Events", "energy", vec![1.0, 2.0]);
        annotate_event_file(
            &mut file,
            Path::new("reco_run1_3D.h5"),
            &fields(),
            &AnnotationMode::default(),
            ExistingFieldPolicy::Skip,
        )
        .unwrap();
        assert_eq!(file.entry_count("OtherParam").unwrap(), 1);
        assert_eq!(file.column("OtherParam", "KEG_temp"), Some(&vec![21.5]));
        assert_eq!(file.column("OtherParam", "KEG_voc"), Some(&vec![0.0]));
        // the event tree is untouched
        assert!(!file.has_field("Events", "KEG_temp"));
    }

    #[test]
    fn test_second_annotation_skips_existing() {
        let mut file = MemoryEventFile::with_tree("Events", "energy", vec![1.0, 2.0]);
        let path = Path::new("reco_run1_3D.h5");
        let mode = AnnotationMode::branch();
        annotate_event_file(&mut file, path, &fields(), &mode, ExistingFieldPolicy::Skip).unwrap();

        let mut again = fields();
        again.insert("KEG_temp", Some(99.0));
        again.insert("KEG_pressure", Some(1012.0));
        let outcome =
            annotate_event_file(&mut file, path, &again, &mode, ExistingFieldPolicy::Skip)
                .unwrap();
        assert_eq!(outcome.written, vec!["KEG_pressure"]);
        assert_eq!(outcome.skipped, vec!["KEG_temp", "KEG_voc"]);
        assert_eq!(file.column("Events", "KEG_temp"), Some(&vec![21.5; 2]));
    }

    #[test]
    fn test_second_annotation_errors_before_writing() {
        let mut file = MemoryEventFile::with_tree("Events", "energy", vec![1.0]);
        let path = Path::new("reco_run1_3D.h5");
        let mode = AnnotationMode::default();
        annotate_event_file(&mut file, path, &fields(), &mode, ExistingFieldPolicy::Error)
            .unwrap();

        let mut again: Annotation = [("KEG_pressure", Some(1012.0))].into_iter().collect();
        again.insert("KEG_temp", Some(99.0));
        let err = annotate_event_file(&mut file, path, &again, &mode, ExistingFieldPolicy::Error)
            .unwrap_err();
        assert!(
            matches!(err, AnnotatorError::FieldAlreadyExists { field, .. } if field == "KEG_temp")
        );
        assert!(!file.has_field("OtherParam", "KEG_pressure"));
    }

    #[test]
    fn test_annotate_run_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reco_run999_3D.h5");
        let err = annotate_run(
            &path,
            RunId::Single(999),
            &fields(),
            &AnnotationConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, AnnotatorError::FileNotFound(p) if p == path));
    }

    #[test]
    fn test_annotate_run_on_hdf_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reco_run101_3D.h5");
        make_event_file(&path, 4);
        let config = AnnotationConfig {
            enabled: true,
            mode: AnnotationMode::branch(),
            ..Default::default()
        };
        let outcome = annotate_run(&path, RunId::Single(101), &fields(), &config).unwrap();
        assert_eq!(outcome.written.len(), 2);

        // the file was released, so it can be opened again right away
        let file = HDFEventFile::open(&path).unwrap();
        assert!(file.has_field("Events", "KEG_voc"));
        assert_eq!(file.entry_count("Events").unwrap(), 4);
    }

    #[test]
    fn test_fields_sharing_a_column_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reco_run102_3D.h5");
        make_event_file(&path, 2);
        let clashing: Annotation = [("He/CF4", Some(80.0)), ("He_CF4", Some(60.0))]
            .into_iter()
            .collect();

        let strict = AnnotationConfig {
            enabled: true,
            on_existing: ExistingFieldPolicy::Error,
            ..Default::default()
        };
        let err = annotate_run(&path, RunId::Single(102), &clashing, &strict).unwrap_err();
        assert!(
            matches!(err, AnnotatorError::FieldAlreadyExists { field, .. } if field == "He_CF4")
        );
        let file = HDFEventFile::open(&path).unwrap();
        assert!(!file.has_tree(DEFAULT_AUX_TABLE_NAME));
        file.close().unwrap();

        let lenient = AnnotationConfig {
            enabled: true,
            ..Default::default()
        };
        let outcome = annotate_run(&path, RunId::Single(102), &clashing, &lenient).unwrap();
        assert_eq!(outcome.written, vec!["He/CF4"]);
        assert_eq!(outcome.skipped, vec!["He_CF4"]);
        let values = hdf5::File::open(&path)
            .unwrap()
            .dataset("OtherParam/He_CF4")
            .unwrap()
            .read_raw::<f32>()
            .unwrap();
        assert_eq!(values, vec![80.0]);
    }

    #[test]
    fn test_reannotate_existing_aux_table_on_hdf_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reco_run103_3D.h5");
        make_event_file(&path, 3);
        let config = AnnotationConfig {
            enabled: true,
            ..Default::default()
        };
        let first: Annotation = [("KEG_temp", Some(21.5))].into_iter().collect();
        annotate_run(&path, RunId::Single(103), &first, &config).unwrap();

        let second: Annotation = [("KEG_temp", Some(99.0)), ("KEG_pressure", Some(1012.0))]
            .into_iter()
            .collect();
        let outcome = annotate_run(&path, RunId::Single(103), &second, &config).unwrap();
        assert_eq!(outcome.written, vec!["KEG_pressure"]);
        assert_eq!(outcome.skipped, vec!["KEG_temp"]);

        let file = HDFEventFile::open(&path).unwrap();
        assert_eq!(file.entry_count(DEFAULT_AUX_TABLE_NAME).unwrap(), 1);
        file.close().unwrap();
        let reopened = hdf5::File::open(&path).unwrap();
        let read = |name: &str| {
            reopened
                .dataset(name)
                .unwrap()
                .read_raw::<f32>()
                .unwrap()
        };
        assert_eq!(read("OtherParam/KEG_temp"), vec![21.5]);
        assert_eq!(read("OtherParam/KEG_pressure"), vec![1012.0]);
    }
}
