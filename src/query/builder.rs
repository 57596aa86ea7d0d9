//! Query builder
//!
//! Resolves the calendar window for a [`QuerySpec`] and hands it to the
//! selected dialect, preferring the single-increment fast path when the
//! window is collapsed.

use crate::calendar::resolve_window;
use crate::query::dialect::{BoundQuery, Dialect};
use crate::query::error::BuildResult;
use crate::query::op::QuerySpec;
use chrono::{DateTime, Local};
use std::sync::Arc;

pub struct QueryBuilder {
    dialect: Arc<dyn Dialect>,
}

impl QueryBuilder {
    pub fn new(dialect: Arc<dyn Dialect>) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    /// Build the aggregation query for `spec` as of `now`.
    pub fn build(&self, spec: &QuerySpec, now: DateTime<Local>) -> BuildResult<BoundQuery> {
        let window = resolve_window(spec.unit, spec.start, spec.end, now)?;
        if let Some(query) = self.dialect.build_single(spec, window) {
            return Ok(query);
        }
        self.dialect.build(spec, window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::TimeUnit;
    use crate::query::dialect::{select_dialect, DialectKind};
    use crate::query::error::BuildError;
    use crate::query::op::AggregateOp;
    use crate::store::SeriesId;

    #[test]
    fn collapsed_window_takes_fast_path_on_reduced() {
        let builder = QueryBuilder::new(select_dialect(DialectKind::Reduced));
        let spec = QuerySpec::new(AggregateOp::Max, SeriesId(1), TimeUnit::Week, 1, 1);
        let q = builder.build(&spec, Local::now()).unwrap();
        assert!(q.sql.starts_with("SELECT MAX(time)"));
    }

    #[test]
    fn rich_always_uses_general_form() {
        let builder = QueryBuilder::new(select_dialect(DialectKind::Rich));
        let spec = QuerySpec::new(AggregateOp::Max, SeriesId(1), TimeUnit::Week, 1, 1);
        let q = builder.build(&spec, Local::now()).unwrap();
        assert!(q.sql.contains("date('now'"));
    }

    #[test]
    fn inverted_window_surfaces_as_build_error() {
        let builder = QueryBuilder::new(select_dialect(DialectKind::Reduced));
        let spec = QuerySpec::new(AggregateOp::Max, SeriesId(1), TimeUnit::Day, 0, 2);
        assert!(matches!(
            builder.build(&spec, Local::now()),
            Err(BuildError::Window(_))
        ));
    }
}
