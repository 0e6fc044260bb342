use std::path::PathBuf;
use std::process::Command;
use std::sync::mpsc::Sender;

use super::config::Config;
use super::error::MergeError;
use super::merge_plan::MergeInstruction;
use super::worker_status::{Stage, WorkerStatus};

/// The external tool that concatenates run files.
///
/// Invoked as `program [args...] <destination> <source_1> ... <source_n>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeTool {
    program: PathBuf,
    args: Vec<String>,
}

impl MergeTool {
    pub fn new(program: PathBuf, args: Vec<String>) -> Self {
        Self { program, args }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.merge_tool.clone(), config.merge_tool_args.clone())
    }

    fn command(&self, instruction: &MergeInstruction) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(&instruction.destination)
            .args(&instruction.sources);
        command
    }

    /// Run one instruction. A non-zero exit is an error carrying the tool's stderr as is.
    pub fn run(&self, instruction: &MergeInstruction) -> Result<(), MergeError> {
        spdlog::info!(
            "Executing: {} {} {} ({} sources)",
            self.program.display(),
            self.args.join(" "),
            instruction.destination.display(),
            instruction.sources.len()
        );
        let output = self
            .command(instruction)
            .output()
            .map_err(|source| MergeError::Spawn {
                tool: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            spdlog::error!(
                "Error executing merge into {}: {}",
                instruction.destination.display(),
                stderr
            );
            return Err(MergeError::ToolFailure {
                destination: instruction.destination.clone(),
                code: output.status.code(),
                stderr,
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            spdlog::debug!("{}", stdout.trim_end());
        }
        if let Ok(meta) = instruction.destination.metadata() {
            spdlog::info!(
                "Wrote {} ({})",
                instruction.destination.display(),
                human_bytes::human_bytes(meta.len() as f64)
            );
        }
        Ok(())
    }
}

/// Run a merge plan in order, stopping at the first failure. Nothing is retried.
pub fn execute_plan(
    tool: &MergeTool,
    plan: &[MergeInstruction],
    tx: &Sender<WorkerStatus>,
) -> Result<Vec<PathBuf>, MergeError> {
    let mut merged = Vec::with_capacity(plan.len());
    let total = plan.len().max(1) as f32;
    for (idx, instruction) in plan.iter().enumerate() {
        let label = instruction
            .destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        tx.send(WorkerStatus::new(idx as f32 / total, Stage::Merge, label.clone()))?;
        tool.run(instruction)?;
        merged.push(instruction.destination.clone());
    }
    tx.send(WorkerStatus::new(1.0, Stage::Merge, String::from("done")))?;
    Ok(merged)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn instruction(destination: PathBuf, sources: &[&str]) -> MergeInstruction {
        MergeInstruction {
            destination,
            sources: sources.iter().map(PathBuf::from).collect(),
        }
    }

    // Stands in for the merge tool: fails on destinations containing "bad", otherwise
    // writes its source list to the destination
    fn fake_tool() -> MergeTool {
        MergeTool::new(
            PathBuf::from("sh"),
            vec![
                String::from("-c"),
                String::from(
                    r#"case "$1" in *bad*) echo "broken input" >&2; exit 3;; esac; dest="$1"; shift; echo "$@" > "$dest""#,
                ),
                String::from("fake_merge"),
            ],
        )
    }

    #[test]
    fn test_tool_receives_destination_then_sources() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("reco_run1-2_3D.h5");
        let (tx, rx) = mpsc::channel();
        let merged = execute_plan(
            &fake_tool(),
            &[instruction(dest.clone(), &["a.h5", "b.h5"])],
            &tx,
        )
        .unwrap();
        assert_eq!(merged, vec![dest.clone()]);
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "a.h5 b.h5\n");
        let last = rx.try_iter().last().unwrap();
        assert_eq!(last.stage, Stage::Merge);
        assert_eq!(last.progress, 1.0);
    }

    #[test]
    fn test_plan_stops_at_first_failure() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("reco_run1-2_3D.h5");
        let bad = dir.path().join("bad_3D.h5");
        let third = dir.path().join("reco_run5-6_3D.h5");
        let (tx, _rx) = mpsc::channel();
        let err = execute_plan(
            &fake_tool(),
            &[
                instruction(first.clone(), &["1.h5", "2.h5"]),
                instruction(bad.clone(), &["3.h5"]),
                instruction(third.clone(), &["5.h5", "6.h5"]),
            ],
            &tx,
        )
        .unwrap_err();
        match err {
            MergeError::ToolFailure {
                destination,
                code,
                stderr,
            } => {
                assert_eq!(destination, bad);
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "broken input\n");
            }
            e => panic!("unexpected error {e}"),
        }
        assert!(first.exists());
        assert!(!third.exists());
    }

    #[test]
    fn test_missing_tool_cannot_spawn() {
        let tool = MergeTool::new(PathBuf::from("/nonexistent/merge-tool"), vec![]);
        let err = tool
            .run(&instruction(PathBuf::from("out.h5"), &["in.h5"]))
            .unwrap_err();
        assert!(matches!(err, MergeError::Spawn { .. }));
    }
}
