//! Store access
//!
//! The engine never owns the log data; it only reads the external
//! append-only `log` table of `(item_id, time, val_num, val_bool, duration)`
//! rows. This module holds the series identifier and raw row types, the
//! [`QueryExecutor`] that serializes all access to the store connection,
//! and the read-only statement validator guarding `raw_query`.

mod error;
mod executor;
mod validate;

pub use error::{StoreError, StoreResult};
pub use executor::{ExecutorConfig, QueryExecutor};
pub use validate::validate_statement;

use serde::{Deserialize, Serialize};

/// Identifier of one source series in the log table (`item_id` column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeriesId(pub i64);

impl std::fmt::Display for SeriesId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "series:{}", self.0)
    }
}

/// One raw result row of an aggregation query: `(time1, value)`.
/// Either column can be NULL (empty aggregate, LAG over the first group).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawRow {
    pub time: Option<i64>,
    pub value: Option<f64>,
}

impl RawRow {
    pub fn new(time: Option<i64>, value: Option<f64>) -> Self {
        Self { time, value }
    }
}
