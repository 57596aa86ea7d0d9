//! Operator and grouping vocabulary
//!
//! The closed sets of aggregation operators and group keys, plus the
//! structured [`QuerySpec`] every query is built from. Keyword parsing
//! lives here so the builder and the external query surface reject unknown
//! words in one place.

use crate::calendar::TimeUnit;
use crate::query::error::BuildError;
use crate::store::SeriesId;
use serde::{Deserialize, Serialize};

/// Aggregation operators supported by the query builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateOp {
    Min,
    Max,
    /// Duration-weighted average
    Avg,
    Sum,
    /// Sum over per-group maxima (heating degree sums)
    SumMax,
    /// Sum over per-group duration-weighted averages
    SumAvg,
    /// Sum over per-group minima clamped to negative values (cooling sums)
    SumMinNegative,
    /// Duration-weighted on-ratio of the boolean flag
    OnRatio,
    /// Value-times-duration integral
    Integrate,
    /// Per-group maxima differentiated against the previous group
    DiffOfMax,
    /// Maximum over per-group maxima
    MaxOfMax,
}

impl AggregateOp {
    /// Parse an operator keyword. Unknown keywords are a build error.
    pub fn parse(s: &str) -> Result<Self, BuildError> {
        match s {
            "min" => Ok(AggregateOp::Min),
            "max" => Ok(AggregateOp::Max),
            "avg" => Ok(AggregateOp::Avg),
            "sum" => Ok(AggregateOp::Sum),
            "sum_max" => Ok(AggregateOp::SumMax),
            "sum_avg" => Ok(AggregateOp::SumAvg),
            "sum_min_negative" => Ok(AggregateOp::SumMinNegative),
            "on_ratio" => Ok(AggregateOp::OnRatio),
            "integrate" => Ok(AggregateOp::Integrate),
            "diff_of_max" => Ok(AggregateOp::DiffOfMax),
            "max_of_max" => Ok(AggregateOp::MaxOfMax),
            other => Err(BuildError::UnknownOperator(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateOp::Min => "min",
            AggregateOp::Max => "max",
            AggregateOp::Avg => "avg",
            AggregateOp::Sum => "sum",
            AggregateOp::SumMax => "sum_max",
            AggregateOp::SumAvg => "sum_avg",
            AggregateOp::SumMinNegative => "sum_min_negative",
            AggregateOp::OnRatio => "on_ratio",
            AggregateOp::Integrate => "integrate",
            AggregateOp::DiffOfMax => "diff_of_max",
            AggregateOp::MaxOfMax => "max_of_max",
        }
    }

    /// Operators that aggregate a grouped sub-aggregate in an inner query.
    pub fn is_compound(&self) -> bool {
        matches!(
            self,
            AggregateOp::SumMax
                | AggregateOp::SumAvg
                | AggregateOp::SumMinNegative
                | AggregateOp::DiffOfMax
                | AggregateOp::MaxOfMax
        )
    }

    /// Operators that skip samples flagged invalid (`val_bool = 0`).
    pub fn filters_invalid_samples(&self) -> bool {
        matches!(
            self,
            AggregateOp::Min
                | AggregateOp::Max
                | AggregateOp::SumMax
                | AggregateOp::SumAvg
                | AggregateOp::SumMinNegative
                | AggregateOp::DiffOfMax
        )
    }
}

impl std::fmt::Display for AggregateOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Intermediate aggregation bucket applied before the outer operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupKey {
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl GroupKey {
    /// Parse a group keyword. Unknown keywords are a build error.
    pub fn parse(s: &str) -> Result<Self, BuildError> {
        match s {
            "hour" => Ok(GroupKey::Hour),
            "day" => Ok(GroupKey::Day),
            "week" => Ok(GroupKey::Week),
            "month" => Ok(GroupKey::Month),
            "year" => Ok(GroupKey::Year),
            other => Err(BuildError::UnknownGroup(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GroupKey::Hour => "hour",
            GroupKey::Day => "day",
            GroupKey::Week => "week",
            GroupKey::Month => "month",
            GroupKey::Year => "year",
        }
    }
}

impl From<TimeUnit> for GroupKey {
    fn from(unit: TimeUnit) -> Self {
        match unit {
            TimeUnit::Day => GroupKey::Day,
            TimeUnit::Week => GroupKey::Week,
            TimeUnit::Month => GroupKey::Month,
            TimeUnit::Year => GroupKey::Year,
        }
    }
}

/// Structured description of one aggregation query.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    pub op: AggregateOp,
    pub series: SeriesId,
    pub unit: TimeUnit,
    /// Whole units into the past for the window start (period-aligned).
    pub start: u32,
    /// Whole units into the past for the window end (0 = current open period).
    pub end: u32,
    /// Inner grouping bucket.
    pub group: Option<GroupKey>,
    /// Outer grouping bucket, applied after a compound operator's inner query.
    pub group2: Option<GroupKey>,
    /// Exclude rows whose value equals this (sensor zero-glitches).
    pub ignore_value: Option<f64>,
}

impl QuerySpec {
    pub fn new(op: AggregateOp, series: SeriesId, unit: TimeUnit, start: u32, end: u32) -> Self {
        Self {
            op,
            series,
            unit,
            start,
            end,
            group: None,
            group2: None,
            ignore_value: None,
        }
    }

    pub fn group(mut self, group: GroupKey) -> Self {
        self.group = Some(group);
        self
    }

    pub fn group2(mut self, group2: GroupKey) -> Self {
        self.group2 = Some(group2);
        self
    }

    pub fn ignore_value(mut self, value: f64) -> Self {
        self.ignore_value = Some(value);
        self
    }

    /// Collapsed windows qualify for the reduced dialect's fast path.
    pub fn is_single_increment(&self) -> bool {
        self.start == self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_keywords_round_trip() {
        for kw in [
            "min",
            "max",
            "avg",
            "sum",
            "sum_max",
            "sum_avg",
            "sum_min_negative",
            "on_ratio",
            "integrate",
            "diff_of_max",
            "max_of_max",
        ] {
            assert_eq!(AggregateOp::parse(kw).unwrap().as_str(), kw);
        }
    }

    #[test]
    fn unknown_operator_is_rejected() {
        assert!(matches!(
            AggregateOp::parse("median"),
            Err(BuildError::UnknownOperator(_))
        ));
    }

    #[test]
    fn invalid_sample_filter_covers_extrema_and_sums() {
        assert!(AggregateOp::Min.filters_invalid_samples());
        assert!(AggregateOp::Max.filters_invalid_samples());
        assert!(AggregateOp::SumMax.filters_invalid_samples());
        assert!(AggregateOp::DiffOfMax.filters_invalid_samples());
        assert!(!AggregateOp::Avg.filters_invalid_samples());
        assert!(!AggregateOp::OnRatio.filters_invalid_samples());
    }

    #[test]
    fn unknown_group_is_rejected() {
        assert!(matches!(
            GroupKey::parse("decade"),
            Err(BuildError::UnknownGroup(_))
        ));
        assert_eq!(GroupKey::parse("week").unwrap(), GroupKey::Week);
    }
}
