//! Result Normalizer
//!
//! Converts raw store rows into the ordered `(timestamp, value)` pairs the
//! rest of the system consumes, and owns the sentinel vocabulary:
//!
//! - `(None, None)` — the executor failed; "no usable result"
//! - `(Some(0), Some(0.0))` — the window holds no data; consumption-style
//!   callers read this as zero, not unknown
//!
//! Values are rounded to one decimal. Rows with a NULL timestamp or value
//! (empty aggregates, the LAG seed row of a differentiated query) are
//! dropped; if that drops everything the result degrades to the no-data
//! sentinel.

use crate::store::{RawRow, StoreError};
use tracing::{error, info};

/// One normalized result pair.
pub type ValuePair = (Option<i64>, Option<f64>);

/// Sentinel list meaning "the query failed".
pub fn error_result() -> Vec<ValuePair> {
    vec![(None, None)]
}

/// Sentinel list meaning "the window holds no data".
pub fn no_data_result() -> Vec<ValuePair> {
    vec![(Some(0), Some(0.0))]
}

/// True for the `(None, None)` error sentinel.
pub fn is_error_result(pairs: &[ValuePair]) -> bool {
    matches!(pairs, [(None, None)])
}

/// True for the `(0, 0)` no-data sentinel.
pub fn is_no_data_result(pairs: &[ValuePair]) -> bool {
    matches!(pairs, [(Some(0), Some(v))] if *v == 0.0)
}

/// Round to one decimal, the resolution every derived value is reported at.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Normalize an executor result into ordered value pairs.
pub fn normalize(result: Result<Vec<RawRow>, StoreError>) -> Vec<ValuePair> {
    let rows = match result {
        Ok(rows) => rows,
        Err(e) => {
            error!(error = %e, "store query failed, returning error sentinel");
            return error_result();
        }
    };

    if rows.is_empty() {
        info!("no rows in window, returning no-data sentinel");
        return no_data_result();
    }

    let pairs: Vec<ValuePair> = rows
        .into_iter()
        .filter_map(|row| match (row.time, row.value) {
            (Some(t), Some(v)) => Some((Some(t), Some(round1(v)))),
            _ => None,
        })
        .collect();

    if pairs.is_empty() {
        info!("all rows dropped as null, returning no-data sentinel");
        return no_data_result();
    }
    pairs
}

/// The single usable value of a scalar query: the last pair's value.
pub fn scalar(pairs: &[ValuePair]) -> Option<f64> {
    if is_error_result(pairs) || is_no_data_result(pairs) {
        return None;
    }
    pairs.last().and_then(|(_, v)| *v)
}
