use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::{Path, PathBuf};

use super::annotator::{AnnotationConfig, AnnotationStage};
use super::env_log::EnvLogConfig;
use super::error::ConfigError;
use super::logbook::LogbookConfig;
use super::run_record::RunId;
use super::timestamp::TimestampFormat;

/// Structure representing the application configuration. Contains pathing and stage controls.
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub logbook: LogbookConfig,
    pub source_folder: PathBuf,
    pub target_folder: PathBuf,
    pub merge_tool: PathBuf,
    #[serde(default)]
    pub merge_tool_args: Vec<String>,
    pub file_extension: String,
    #[serde(default)]
    pub summary_path: Option<PathBuf>,
    #[serde(default)]
    pub env_log: Option<EnvLogConfig>,
    #[serde(default)]
    pub query_time_format: TimestampFormat,
    #[serde(default)]
    pub annotation: AnnotationConfig,
    pub merge: bool,
    #[serde(default)]
    pub clean_target: bool,
}

impl Default for Config {
    /// Generate a new Config object. All paths will be empty/invalid
    fn default() -> Self {
        Self {
            logbook: LogbookConfig::default(),
            source_folder: PathBuf::from("None"),
            target_folder: PathBuf::from("None"),
            merge_tool: PathBuf::from("None"),
            merge_tool_args: Vec::new(),
            file_extension: String::from("h5"),
            summary_path: None,
            env_log: None,
            query_time_format: TimestampFormat::default(),
            annotation: AnnotationConfig::default(),
            merge: false,
            clean_target: false,
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// Write the configuration to a YAML file
    pub fn write_config_file(&self, config_path: &Path) -> Result<(), ConfigError> {
        let yaml_str = serde_yaml::to_string(self)?;
        std::fs::write(config_path, yaml_str)?;
        Ok(())
    }

    /// Construct an event file name using the reconstruction output format
    pub fn get_run_file_name(&self, id: impl Display) -> String {
        format!("reco_run{id}_3D.{}", self.file_extension)
    }

    /// Get the path to a single run's event file
    pub fn get_source_file(&self, run_number: u32) -> PathBuf {
        self.source_folder.join(self.get_run_file_name(run_number))
    }

    /// Get the path to the merged file of a group. A one-run group is still named as a range.
    pub fn get_merged_file(&self, first_run: u32, last_run: u32) -> PathBuf {
        self.target_folder
            .join(self.get_run_file_name(format!("{first_run}-{last_run}")))
    }

    /// Get the file the annotation stage should write to for this run id
    pub fn get_annotation_file(&self, run: &RunId) -> PathBuf {
        match self.annotation.stage {
            AnnotationStage::BeforeMerge => self.source_folder.join(self.get_run_file_name(run)),
            AnnotationStage::AfterMerge => self.get_merged_file(run.start(), run.stop()),
        }
    }

    pub fn need_annotation(&self) -> bool {
        self.annotation.enabled
    }

    pub fn has_merge_tool(&self) -> bool {
        self.merge_tool != Path::new("None")
    }
}
