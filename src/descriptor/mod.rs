//! Function descriptors
//!
//! A metric's symbolic function name (`day_max`, `week_minus1`,
//! `rolling_12m_year_minus1`, ...) is parsed exactly once, at configuration
//! load, into a [`FunctionDescriptor`]. Evaluation later is a single match
//! over this closed enum; the name string is never re-parsed per cycle.
//!
//! Unknown or malformed names are a [`DescriptorError`], never a panic; the
//! metric is logged and skipped, the rest of the configuration loads.

mod parser;

pub use parser::parse;

use crate::calendar::{RollingWindow, TimeUnit};
use crate::query::AggregateOp;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Raw metric parameters as loaded from configuration.
pub type ParamMap = HashMap<String, Value>;

/// Errors from descriptor parsing.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DescriptorError {
    /// The name matches no known grammar shape (including malformed offsets
    /// and windows).
    #[error("unknown function name: {0}")]
    UnknownFunction(String),

    /// A named-series function is missing a required parameter.
    #[error("function '{function}' requires parameter '{param}'")]
    MissingParameter {
        function: &'static str,
        param: &'static str,
    },

    /// A parameter exists but cannot be interpreted.
    #[error("parameter '{param}' is malformed: {reason}")]
    InvalidParameter { param: &'static str, reason: String },
}

/// The parsed, structured form of a metric's function name.
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionDescriptor {
    /// Computed once at startup, never rescheduled.
    Static(StaticKind),
    /// Recomputed incrementally on every new source sample.
    OnChange {
        unit: TimeUnit,
        /// `None` tracks consumption against the period baseline.
        op: Option<SampleStat>,
    },
    /// Recomputed on schedule over a whole-unit window.
    Periodic {
        unit: TimeUnit,
        /// Window start, whole units into the past.
        start: u32,
        /// Window end, whole units into the past. `start == end` collapses
        /// the window to a point-in-time reading.
        end: u32,
        /// `None` computes the counter delta across the window boundaries.
        op: Option<AggregateOp>,
    },
    /// Fixed-length lookback windows.
    Rolling(RollingKind),
    /// Seasonal / special-purpose series with their own parameters.
    NamedSeries(NamedSeriesFn),
}

/// Statistic an on-change metric maintains over the open period. Extrema
/// update from the cache; the average is re-derived from the store, since
/// it cannot be maintained incrementally from samples alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleStat {
    Min,
    Max,
    Avg,
}

/// Values computed once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaticKind {
    /// Oldest stored value of the series.
    OldestValue,
    /// Timestamp of the oldest stored sample.
    OldestLog,
    /// The store's reported version string.
    StoreVersion,
}

/// The two rolling shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum RollingKind {
    /// Aggregate over the trailing window ending now (`last_24h_max`).
    Last {
        window: RollingWindow,
        op: AggregateOp,
    },
    /// Consumption over a trailing window anchored at a period boundary
    /// (`rolling_12m_year_minus1`). Month/year windows use the fixed
    /// day-count approximations.
    Consumption {
        window: RollingWindow,
        unit: TimeUnit,
        offset: u32,
    },
}

/// Named functions with parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamedSeriesFn {
    /// Sum of daily maxima over the warm season (or one month) of a year.
    HeatingDegreeSum { year: i32, month: Option<u32> },
    /// Sum of negative daily minima over the cold season (or one month).
    CoolingDegreeSum { year: i32, month: Option<u32> },
    /// Weighted sum of daily maxima over a year (0.5 in January, 0.75 in
    /// February, 1.0 after).
    GrasslandTempSum { year: i32 },
    /// Consumption over the same elapsed portion of the previous year.
    PriorYearPeriod,
}

impl FunctionDescriptor {
    /// Does this metric listen to new source samples?
    pub fn is_on_change(&self) -> bool {
        matches!(self, FunctionDescriptor::OnChange { .. })
    }
}
