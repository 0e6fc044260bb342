use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::{Duration, PrimitiveDateTime};

use super::error::TimestampError;

/// The timestamp layouts understood by the merger.
///
/// Each environmental log source (and the logbook start time) names the layout it uses in
/// the configuration. Adding a new log source means adding a variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampFormat {
    /// The bench sensor layout, `day/month/year_hour-minute-second` (12/06/2024_14-03-59)
    BenchSensor,
    /// Free-form text. Year-first layouts are tried first, then day-first ones, then the
    /// MIDAS history layout (Wed Jun 12 14:03:59 2024)
    #[default]
    DayFirst,
}

impl TimestampFormat {
    pub fn name(&self) -> &'static str {
        match self {
            Self::BenchSensor => "bench_sensor",
            Self::DayFirst => "day_first",
        }
    }

    /// Parse a timestamp. Never falls back to a default time.
    pub fn parse(&self, value: &str) -> Result<PrimitiveDateTime, TimestampError> {
        let trimmed = value.trim();
        let parsed = match self {
            Self::BenchSensor => PrimitiveDateTime::parse(
                trimmed,
                format_description!(
                    "[day padding:none]/[month padding:none]/[year]_[hour padding:none]-[minute]-[second]"
                ),
            )
            .ok(),
            Self::DayFirst => parse_day_first(trimmed),
        };
        parsed.ok_or_else(|| TimestampError::Unparseable {
            value: value.to_string(),
            format: self.name(),
        })
    }
}

fn parse_day_first(value: &str) -> Option<PrimitiveDateTime> {
    let layouts = [
        format_description!(
            "[year]-[month padding:none]-[day padding:none] [hour padding:none]:[minute]:[second]"
        ),
        format_description!(
            "[year]-[month padding:none]-[day padding:none] [hour padding:none]:[minute]:[second].[subsecond]"
        ),
        format_description!(
            "[year]-[month padding:none]-[day padding:none]T[hour padding:none]:[minute]:[second]"
        ),
        format_description!(
            "[year]-[month padding:none]-[day padding:none]T[hour padding:none]:[minute]:[second].[subsecond]"
        ),
        format_description!(
            "[year]/[month padding:none]/[day padding:none] [hour padding:none]:[minute]:[second]"
        ),
        format_description!(
            "[year]-[month padding:none]-[day padding:none] [hour padding:none]:[minute]"
        ),
        format_description!(
            "[day padding:none]/[month padding:none]/[year] [hour padding:none]:[minute]:[second]"
        ),
        format_description!(
            "[day padding:none]/[month padding:none]/[year] [hour padding:none]:[minute]"
        ),
        format_description!(
            "[day padding:none]-[month padding:none]-[year] [hour padding:none]:[minute]:[second]"
        ),
        format_description!(
            "[day padding:none].[month padding:none].[year] [hour padding:none]:[minute]:[second]"
        ),
        format_description!(
            "[day padding:none].[month padding:none].[year] [hour padding:none]:[minute]"
        ),
        format_description!(
            "[weekday repr:short] [month repr:short] [day padding:space] [hour]:[minute]:[second] [year]"
        ),
    ];
    layouts
        .iter()
        .find_map(|layout| PrimitiveDateTime::parse(value, layout).ok())
}

/// Absolute wall-clock distance between two timestamps
pub fn distance(a: PrimitiveDateTime, b: PrimitiveDateTime) -> Duration {
    (a - b).abs()
}
