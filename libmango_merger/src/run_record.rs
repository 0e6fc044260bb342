use std::fmt::Display;
use std::hash::Hash;
use std::ops::RangeInclusive;

use super::annotation::Annotation;
use super::error::FieldError;

/// Field name under which the drift field is attached to an event file
pub const DRIFT_FIELD_NAME: &str = "DRIFT_V";
/// Field name under which the source position is attached to an event file
pub const POSITION_NAME: &str = "HOLE_number";
/// Field names of the He/CF4/SF6 gas ratio, in logbook order
pub const GAS_FIELDS: [&str; 3] = ["He(%)", "CF4(%)", "SF6(%)"];

/// Identifies the data a logbook row refers to: either one run or an inclusive range of runs.
///
/// The Display form ("101" or "5-8") is the id used in the reco_run file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunId {
    Single(u32),
    Range { start: u32, stop: u32 },
}

impl RunId {
    /// Build a RunId from a start/stop pair. Equal bounds collapse to a single run.
    pub fn from_bounds(start: u32, stop: u32) -> Result<Self, FieldError> {
        if start > stop {
            Err(FieldError::InvertedRange { start, stop })
        } else if start == stop {
            Ok(Self::Single(start))
        } else {
            Ok(Self::Range { start, stop })
        }
    }

    pub fn start(&self) -> u32 {
        match self {
            Self::Single(run) => *run,
            Self::Range { start, .. } => *start,
        }
    }

    pub fn stop(&self) -> u32 {
        match self {
            Self::Single(run) => *run,
            Self::Range { stop, .. } => *stop,
        }
    }

    /// Every individual run covered by this id, inclusive
    pub fn runs(&self) -> RangeInclusive<u32> {
        self.start()..=self.stop()
    }
}

impl Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single(run) => write!(f, "{run}"),
            Self::Range { start, stop } => write!(f, "{start}-{stop}"),
        }
    }
}

/// The experimental settings used to group runs for merging.
///
/// Floats are not hashable, so equality and hashing go through the bit pattern
/// (with -0.0 folded onto 0.0). Two keys read from the same logbook text always agree.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionKey {
    pub position: Option<f64>,
    pub drift_field: Option<f64>,
}

fn key_bits(value: &Option<f64>) -> Option<u64> {
    value.map(|v| if v == 0.0 { 0.0f64.to_bits() } else { v.to_bits() })
}

impl ConditionKey {
    pub fn new(position: Option<f64>, drift_field: Option<f64>) -> Self {
        Self {
            position,
            drift_field,
        }
    }
}

impl PartialEq for ConditionKey {
    fn eq(&self, other: &Self) -> bool {
        key_bits(&self.position) == key_bits(&other.position)
            && key_bits(&self.drift_field) == key_bits(&other.drift_field)
    }
}

impl Eq for ConditionKey {}

impl Hash for ConditionKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        key_bits(&self.position).hash(state);
        key_bits(&self.drift_field).hash(state);
    }
}

impl Display for ConditionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fmt_opt = |v: &Option<f64>| match v {
            Some(v) => format!("{v}"),
            None => String::from("unset"),
        };
        write!(
            f,
            "position {} / drift {}",
            fmt_opt(&self.position),
            fmt_opt(&self.drift_field)
        )
    }
}

/// Gas mixture percentages, in the logbook order He/CF4/SF6
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GasMix {
    pub helium: Option<f64>,
    pub cf4: Option<f64>,
    pub sf6: Option<f64>,
}

impl GasMix {
    pub fn to_annotation(&self) -> Annotation {
        GAS_FIELDS
            .into_iter()
            .zip([self.helium, self.cf4, self.sf6])
            .collect()
    }
}

/// One normalized logbook row
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub run: RunId,
    pub start_time: Option<String>,
    pub condition: ConditionKey,
    pub gas: Option<GasMix>,
    pub metadata: Annotation,
}

impl RunRecord {
    pub fn new(run: RunId, condition: ConditionKey) -> Self {
        Self {
            run,
            start_time: None,
            condition,
            gas: None,
            metadata: Annotation::default(),
        }
    }

    /// The fields this record contributes to an annotation: the gas mix (if the logbook
    /// has one), its metadata, then the condition fields.
    pub fn annotation_fields(&self) -> Annotation {
        let mut fields = self.gas.map(|gas| gas.to_annotation()).unwrap_or_default();
        fields.extend(&self.metadata);
        fields.insert(DRIFT_FIELD_NAME, self.condition.drift_field);
        fields.insert(POSITION_NAME, self.condition.position);
        fields
    }
}
