//! Query build error types

use crate::calendar::CalendarError;
use thiserror::Error;

/// Errors raised while assembling an aggregation query.
///
/// A build error abandons the single metric evaluation for this cycle; it
/// is never fatal to the process.
#[derive(Error, Debug)]
pub enum BuildError {
    /// Operator keyword not in the supported set
    #[error("unknown operator: {0}")]
    UnknownOperator(String),

    /// Group keyword not in the supported set
    #[error("unknown group key: {0}")]
    UnknownGroup(String),

    /// Window resolution failed (unknown unit, inverted offsets)
    #[error("window resolution failed: {0}")]
    Window(#[from] CalendarError),
}

/// Result type for query building
pub type BuildResult<T> = Result<T, BuildError>;
