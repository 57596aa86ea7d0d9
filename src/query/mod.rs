//! Query construction
//!
//! Turns an operator plus a calendar window into a parametrized SQL
//! aggregation query against the append-only `log` table:
//!
//! - **Op**: operator and group-key vocabulary, the structured query spec
//! - **Dialect**: the two store dialects behind one trait
//! - **Builder**: window resolution plus dialect dispatch
//!
//! # Dialects
//!
//! ```text
//! rich     boundary arithmetic in SQL date expressions, offsets bound
//! reduced  boundaries precomputed by the Calendar Resolver, epoch-ms
//!          comparisons only; single-increment fast path for collapsed
//!          windows
//! ```
//!
//! Both dialects produce semantically equivalent results for the same
//! operator. Unknown operators, units, or group keys are build errors,
//! never silent defaults.

mod builder;
mod dialect;
mod error;
mod op;

pub use builder::QueryBuilder;
pub use dialect::{select_dialect, BoundQuery, Dialect, DialectKind, ReducedDialect, RichDialect};
pub use error::{BuildError, BuildResult};
pub use op::{AggregateOp, GroupKey, QuerySpec};
