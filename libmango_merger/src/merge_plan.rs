use fxhash::FxHashMap;
use std::collections::BTreeSet;
use std::path::PathBuf;

use super::config::Config;
use super::run_record::{ConditionKey, RunId, RunRecord};

/// All runs taken under one set of experimental conditions.
///
/// Runs are kept in an ordered set, so they are de-duplicated and always iterate in ascending
/// order no matter the order they were added in.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeGroup {
    pub condition: ConditionKey,
    runs: BTreeSet<u32>,
}

impl MergeGroup {
    pub fn new(condition: ConditionKey) -> Self {
        Self {
            condition,
            runs: BTreeSet::new(),
        }
    }

    /// Add every run covered by the id (a range contributes all of its runs)
    pub fn add(&mut self, run: &RunId) {
        for number in run.runs() {
            self.runs.insert(number);
        }
    }

    /// The member runs in ascending order
    pub fn runs(&self) -> impl Iterator<Item = u32> + '_ {
        self.runs.iter().copied()
    }

    pub fn first_run(&self) -> Option<u32> {
        self.runs.first().copied()
    }

    pub fn last_run(&self) -> Option<u32> {
        self.runs.last().copied()
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// The merge instruction for this group. None for an empty group.
    pub fn instruction(&self, config: &Config) -> Option<MergeInstruction> {
        let first = self.first_run()?;
        let last = self.last_run()?;
        Some(MergeInstruction {
            destination: config.get_merged_file(first, last),
            sources: self.runs().map(|run| config.get_source_file(run)).collect(),
        })
    }
}

/// One call of the external merge tool: concatenate `sources` (in order) into `destination`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeInstruction {
    pub destination: PathBuf,
    pub sources: Vec<PathBuf>,
}

/// Group records by condition key. Groups come out in the order their key first appears.
pub fn group_runs(records: &[RunRecord]) -> Vec<MergeGroup> {
    let mut index: FxHashMap<ConditionKey, usize> = FxHashMap::default();
    let mut groups: Vec<MergeGroup> = Vec::new();
    for record in records.iter() {
        let idx = *index.entry(record.condition).or_insert_with(|| {
            groups.push(MergeGroup::new(record.condition));
            groups.len() - 1
        });
        groups[idx].add(&record.run);
    }
    groups
}

/// Build the merge plan for a set of records
pub fn plan(records: &[RunRecord], config: &Config) -> Vec<MergeInstruction> {
    let groups = group_runs(records);
    for group in groups.iter() {
        spdlog::debug!(
            "Merge group {} holds {} runs",
            group.condition,
            group.len()
        );
    }
    groups
        .iter()
        .filter_map(|group| group.instruction(config))
        .collect()
}
