//! Store dialects
//!
//! One [`Dialect`] trait, two implementations. The dialect is selected once
//! at startup from configuration and never inspected per call.
//!
//! The **rich** dialect pushes window-boundary arithmetic into SQL date
//! expressions, binding the raw unit offsets. The **reduced** dialect has no
//! date arithmetic in its queries: the Calendar Resolver computes absolute
//! boundaries and the SQL compares epoch milliseconds only; integer bucket
//! arithmetic is shifted by the deployment's UTC offset so buckets align
//! with local period boundaries, and grouping by month or year uses plain
//! `strftime` formatting, which every build of the store ships. The reduced
//! dialect also offers a single-increment fast path for collapsed windows.

use crate::calendar::{TimeUnit, TimeWindow};
use crate::query::error::{BuildError, BuildResult};
use crate::query::op::{AggregateOp, GroupKey, QuerySpec};
use crate::store::SeriesId;
use chrono::{Local, TimeZone};
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::Arc;

/// A ready-to-execute SQL statement with its bind parameters.
#[derive(Debug, Clone)]
pub struct BoundQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

impl BoundQuery {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// The statement with parameters interpolated, for debug logging only.
    /// Execution always goes through bound parameters.
    pub fn interpolated(&self) -> String {
        let mut out = String::with_capacity(self.sql.len() + 16);
        let mut next = 0usize;
        let mut chars = self.sql.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '?' {
                out.push(c);
                continue;
            }
            let mut digits = String::new();
            while let Some(d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                digits.push(*d);
                chars.next();
            }
            let idx = digits
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .unwrap_or(next);
            next = idx + 1;
            match self.params.get(idx) {
                Some(v) => {
                    let _ = write!(out, "{}", display_value(v));
                }
                None => out.push('?'),
            }
        }
        out
    }
}

fn display_value(v: &Value) -> String {
    match v {
        Value::Null => "NULL".to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Real(r) => r.to_string(),
        Value::Text(t) => format!("'{t}'"),
        Value::Blob(b) => format!("<{} bytes>", b.len()),
    }
}

/// Which dialect a deployment runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    Rich,
    #[default]
    Reduced,
}

/// Pick the dialect implementation for a configured kind.
pub fn select_dialect(kind: DialectKind) -> Arc<dyn Dialect> {
    match kind {
        DialectKind::Rich => Arc::new(RichDialect),
        DialectKind::Reduced => Arc::new(ReducedDialect),
    }
}

/// SQL generation for one store dialect.
pub trait Dialect: Send + Sync {
    fn name(&self) -> &'static str;

    /// General aggregation query over the spec's window.
    fn build(&self, spec: &QuerySpec, window: TimeWindow) -> BuildResult<BoundQuery>;

    /// Cheaper form for collapsed windows (`start == end`). `None` when the
    /// dialect has no fast path or the operator needs the general form.
    fn build_single(&self, _spec: &QuerySpec, _window: TimeWindow) -> Option<BoundQuery> {
        None
    }

    /// Nearest sample strictly before `before_ts` (delta/consumption
    /// boundary fallback).
    fn next_earlier(&self, series: SeriesId, before_ts: i64) -> BoundQuery {
        BoundQuery::new(
            "SELECT time AS time1, val_num AS value FROM log \
             WHERE item_id = ?1 AND time < ?2 ORDER BY time DESC LIMIT 1",
            vec![Value::Integer(series.0), Value::Integer(before_ts)],
        )
    }

    /// Oldest stored sample for the series (absolute-lookup fallback).
    fn oldest_entry(&self, series: SeriesId) -> BoundQuery {
        BoundQuery::new(
            "SELECT time AS time1, val_num AS value FROM log \
             WHERE item_id = ?1 ORDER BY time ASC LIMIT 1",
            vec![Value::Integer(series.0)],
        )
    }

    /// Statement reporting the store's version string.
    fn version_query(&self) -> &'static str {
        "SELECT sqlite_version()"
    }
}

/// Select expression for the plain operators (also the inner expression of
/// the compound ones).
fn inner_expr(op: AggregateOp) -> &'static str {
    match op {
        AggregateOp::Min => "MIN(val_num)",
        AggregateOp::Max | AggregateOp::SumMax | AggregateOp::DiffOfMax | AggregateOp::MaxOfMax => {
            "MAX(val_num)"
        }
        AggregateOp::Avg | AggregateOp::SumAvg => {
            "ROUND(AVG(val_num * duration) / AVG(duration), 1)"
        }
        AggregateOp::Sum => "SUM(val_num)",
        AggregateOp::SumMinNegative => {
            "CASE WHEN MIN(val_num) < 0 THEN MIN(val_num) ELSE 0 END"
        }
        AggregateOp::OnRatio => "ROUND(SUM(val_bool * duration) * 1.0 / SUM(duration), 1)",
        AggregateOp::Integrate => "ROUND(SUM(val_num * duration), 1)",
    }
}

/// Outer expression of the compound operators, over the inner `value` column.
fn outer_expr(op: AggregateOp) -> &'static str {
    match op {
        AggregateOp::SumMax | AggregateOp::SumAvg | AggregateOp::SumMinNegative => {
            "ROUND(SUM(value), 1)"
        }
        AggregateOp::DiffOfMax => "value - LAG(value) OVER (ORDER BY time)",
        AggregateOp::MaxOfMax => "MAX(value)",
        _ => unreachable!("outer_expr called for a non-compound operator"),
    }
}

fn sample_filters(spec: &QuerySpec, ignore_param: &str) -> String {
    let mut filters = String::new();
    if spec.op.filters_invalid_samples() {
        filters.push_str(" AND val_bool = 1");
    }
    if spec.ignore_value.is_some() {
        let _ = write!(filters, " AND val_num != {ignore_param}");
    }
    filters
}

fn assemble(
    spec: &QuerySpec,
    time_col: &str,
    where_clause: &str,
    group_expr: impl Fn(GroupKey) -> String,
    params: Vec<Value>,
) -> BoundQuery {
    let group_by = |key: Option<GroupKey>| -> String {
        key.map(|k| format!(" GROUP BY {}", group_expr(k))).unwrap_or_default()
    };

    let sql = if spec.op.is_compound() {
        format!(
            "SELECT {time} AS time1, {outer} AS value FROM \
             (SELECT time, {inner} AS value FROM log WHERE {where_clause}{inner_group} \
             ORDER BY time ASC) AS grouped{outer_group} ORDER BY time1 ASC",
            time = time_col,
            outer = outer_expr(spec.op),
            inner = inner_expr(spec.op),
            inner_group = group_by(spec.group),
            outer_group = group_by(spec.group2),
        )
    } else {
        format!(
            "SELECT {time} AS time1, {expr} AS value FROM log WHERE {where_clause}{group} \
             ORDER BY time1 ASC",
            time = time_col,
            expr = inner_expr(spec.op),
            group = group_by(spec.group),
        )
    };

    BoundQuery::new(sql, params)
}

/// Dialect with date arithmetic available in SQL.
pub struct RichDialect;

impl RichDialect {
    /// `date(...)` expression for the window start (period-aligned) with the
    /// offset bound as `?2`.
    fn start_expr(unit: TimeUnit) -> &'static str {
        match unit {
            TimeUnit::Day => "date('now', 'localtime', '-' || ?2 || ' days')",
            TimeUnit::Week => {
                "date('now', 'localtime', '-6 days', 'weekday 1', '-' || (?2 * 7) || ' days')"
            }
            TimeUnit::Month => "date('now', 'localtime', 'start of month', '-' || ?2 || ' months')",
            TimeUnit::Year => "date('now', 'localtime', 'start of year', '-' || ?2 || ' years')",
        }
    }

    /// Expression for the window end day (today shifted back), offset `?3`.
    fn end_expr(unit: TimeUnit) -> &'static str {
        match unit {
            TimeUnit::Day => "date('now', 'localtime', '-' || ?3 || ' days')",
            TimeUnit::Week => "date('now', 'localtime', '-' || (?3 * 7) || ' days')",
            TimeUnit::Month => "date('now', 'localtime', '-' || ?3 || ' months')",
            TimeUnit::Year => "date('now', 'localtime', '-' || ?3 || ' years')",
        }
    }

    fn group_expr(key: GroupKey) -> String {
        let fmt = match key {
            GroupKey::Hour => "strftime('%Y-%m-%d %H', time / 1000, 'unixepoch', 'localtime')",
            GroupKey::Day => "date(time / 1000, 'unixepoch', 'localtime')",
            GroupKey::Week => "strftime('%Y-%W', time / 1000, 'unixepoch', 'localtime')",
            GroupKey::Month => "strftime('%Y-%m', time / 1000, 'unixepoch', 'localtime')",
            GroupKey::Year => "strftime('%Y', time / 1000, 'unixepoch', 'localtime')",
        };
        fmt.to_string()
    }
}

impl Dialect for RichDialect {
    fn name(&self) -> &'static str {
        "rich"
    }

    fn build(&self, spec: &QuerySpec, _window: TimeWindow) -> BuildResult<BoundQuery> {
        let time_col =
            "CAST(strftime('%s', time / 1000, 'unixepoch', 'localtime', 'start of day') AS INTEGER) * 1000";
        let where_clause = format!(
            "item_id = ?1 AND date(time / 1000, 'unixepoch', 'localtime') BETWEEN {start} AND {end}{filters}",
            start = Self::start_expr(spec.unit),
            end = Self::end_expr(spec.unit),
            filters = sample_filters(spec, "?4"),
        );

        let mut params = vec![
            Value::Integer(spec.series.0),
            Value::Integer(spec.start as i64),
            Value::Integer(spec.end as i64),
        ];
        if let Some(ignore) = spec.ignore_value {
            params.push(Value::Real(ignore));
        }

        Ok(assemble(spec, time_col, &where_clause, Self::group_expr, params))
    }
}

/// UTC offset of the deployment at the window start, in milliseconds. Used
/// to align the reduced dialect's integer buckets with local midnights.
fn tz_offset_ms(window: TimeWindow) -> i64 {
    Local
        .timestamp_millis_opt(window.start_ts)
        .earliest()
        .map(|t| t.offset().local_minus_utc() as i64 * 1000)
        .unwrap_or(0)
}

/// Dialect without date arithmetic: windows arrive as precomputed epoch-ms
/// boundaries.
pub struct ReducedDialect;

impl ReducedDialect {
    /// Group expressions with integer buckets shifted into local time by
    /// `tz_ms`, so bucket edges coincide with local midnights.
    fn group_expr(key: GroupKey, tz_ms: i64) -> String {
        match key {
            GroupKey::Hour => format!("(time + {tz_ms}) / 3600000"),
            GroupKey::Day => format!("(time + {tz_ms}) / 86400000"),
            // epoch day 0 was a Thursday; +3 aligns the buckets to Monday
            GroupKey::Week => format!("((time + {tz_ms}) / 86400000 + 3) / 7"),
            // formatting only, no date arithmetic
            GroupKey::Month => {
                "strftime('%Y-%m', time / 1000, 'unixepoch', 'localtime')".to_string()
            }
            GroupKey::Year => "strftime('%Y', time / 1000, 'unixepoch', 'localtime')".to_string(),
        }
    }

    fn window_params(spec: &QuerySpec, window: TimeWindow) -> (String, Vec<Value>) {
        let where_clause = format!(
            "item_id = ?1 AND time >= ?2 AND time < ?3{filters}",
            filters = sample_filters(spec, "?4"),
        );
        let mut params = vec![
            Value::Integer(spec.series.0),
            Value::Integer(window.start_ts),
            Value::Integer(window.end_ts),
        ];
        if let Some(ignore) = spec.ignore_value {
            params.push(Value::Real(ignore));
        }
        (where_clause, params)
    }
}

impl Dialect for ReducedDialect {
    fn name(&self) -> &'static str {
        "reduced"
    }

    fn build(&self, spec: &QuerySpec, window: TimeWindow) -> BuildResult<BoundQuery> {
        let tz_ms = tz_offset_ms(window);
        // local-midnight stamp of the sample's day, back in epoch ms
        let time_col = format!("((time + {tz_ms}) / 86400000) * 86400000 - {tz_ms}");
        let (where_clause, params) = Self::window_params(spec, window);
        Ok(assemble(
            spec,
            &time_col,
            &where_clause,
            |key| Self::group_expr(key, tz_ms),
            params,
        ))
    }

    /// One aggregate row, no grouping, no sort. Functionally identical to
    /// the general form for a collapsed window, but cheaper.
    fn build_single(&self, spec: &QuerySpec, window: TimeWindow) -> Option<BoundQuery> {
        if !spec.is_single_increment()
            || spec.op.is_compound()
            || spec.group.is_some()
            || spec.group2.is_some()
        {
            return None;
        }
        let (where_clause, params) = Self::window_params(spec, window);
        let sql = format!(
            "SELECT MAX(time) AS time1, {expr} AS value FROM log WHERE {where_clause}",
            expr = inner_expr(spec.op),
        );
        Some(BoundQuery::new(sql, params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(op: AggregateOp) -> QuerySpec {
        QuerySpec::new(op, SeriesId(7), TimeUnit::Day, 3, 1)
    }

    fn window() -> TimeWindow {
        TimeWindow {
            start_ts: 1_700_000_000_000,
            end_ts: 1_700_259_200_000,
        }
    }

    #[test]
    fn reduced_binds_resolved_boundaries() {
        let q = ReducedDialect.build(&spec(AggregateOp::Sum), window()).unwrap();
        assert!(q.sql.contains("time >= ?2 AND time < ?3"));
        assert_eq!(q.params[1], Value::Integer(1_700_000_000_000));
        assert_eq!(q.params[2], Value::Integer(1_700_259_200_000));
        // sum does not filter invalid samples
        assert!(!q.sql.contains("val_bool"));
    }

    #[test]
    fn rich_binds_offsets_not_boundaries() {
        let q = RichDialect.build(&spec(AggregateOp::Max), window()).unwrap();
        assert!(q.sql.contains("date('now'"));
        assert_eq!(q.params[1], Value::Integer(3));
        assert_eq!(q.params[2], Value::Integer(1));
    }

    #[test]
    fn extrema_exclude_invalid_samples() {
        for op in [AggregateOp::Min, AggregateOp::Max, AggregateOp::DiffOfMax] {
            let q = ReducedDialect.build(&spec(op), window()).unwrap();
            assert!(q.sql.contains("val_bool = 1"), "{op} must filter flagged rows");
        }
    }

    #[test]
    fn ignore_value_adds_bound_filter() {
        let q = ReducedDialect
            .build(&spec(AggregateOp::Max).ignore_value(0.0), window())
            .unwrap();
        assert!(q.sql.contains("val_num != ?4"));
        assert_eq!(q.params[3], Value::Real(0.0));
    }

    #[test]
    fn compound_ops_nest_a_grouped_subquery() {
        let tz = tz_offset_ms(window());
        let q = ReducedDialect
            .build(
                &spec(AggregateOp::SumMax).group(GroupKey::Day).group2(GroupKey::Month),
                window(),
            )
            .unwrap();
        assert!(q.sql.contains("ROUND(SUM(value), 1)"));
        assert!(q.sql.contains("(SELECT time, MAX(val_num) AS value"));
        assert!(q.sql.contains(&format!("GROUP BY (time + {tz}) / 86400000")));
        assert!(q.sql.contains("strftime('%Y-%m'"));
    }

    #[test]
    fn reduced_buckets_align_to_local_midnights() {
        let tz = tz_offset_ms(window());
        let q = ReducedDialect
            .build(&spec(AggregateOp::Max).group(GroupKey::Day), window())
            .unwrap();
        // day buckets and day stamps are shifted by the UTC offset
        assert!(q.sql.contains(&format!("(time + {tz}) / 86400000")));
        assert!(q.sql.contains(&format!("* 86400000 - {tz}")));

        // month/year grouping formats in local time
        let q = ReducedDialect
            .build(&spec(AggregateOp::Max).group(GroupKey::Month), window())
            .unwrap();
        assert!(q.sql.contains("'unixepoch', 'localtime')"));
    }

    #[test]
    fn diff_of_max_uses_lag_window() {
        let q = ReducedDialect
            .build(&spec(AggregateOp::DiffOfMax).group(GroupKey::Day), window())
            .unwrap();
        assert!(q.sql.contains("LAG(value) OVER (ORDER BY time)"));
    }

    #[test]
    fn single_increment_fast_path_is_reduced_only() {
        let s = QuerySpec::new(AggregateOp::Max, SeriesId(7), TimeUnit::Day, 2, 2);
        let q = ReducedDialect.build_single(&s, window()).unwrap();
        assert!(q.sql.starts_with("SELECT MAX(time)"));
        assert!(!q.sql.contains("GROUP BY"));
        assert!(!q.sql.contains("ORDER BY"));
        assert!(RichDialect.build_single(&s, window()).is_none());
        // compound operators never take the fast path
        let c = QuerySpec::new(AggregateOp::SumMax, SeriesId(7), TimeUnit::Day, 2, 2);
        assert!(ReducedDialect.build_single(&c, window()).is_none());
        // neither do grouped specs, which need per-bucket rows
        let g = QuerySpec::new(AggregateOp::Max, SeriesId(7), TimeUnit::Day, 2, 2)
            .group(GroupKey::Hour);
        assert!(ReducedDialect.build_single(&g, window()).is_none());
    }

    #[test]
    fn windowed_spec_skips_fast_path() {
        let s = QuerySpec::new(AggregateOp::Max, SeriesId(7), TimeUnit::Day, 3, 1);
        assert!(ReducedDialect.build_single(&s, window()).is_none());
    }

    #[test]
    fn interpolation_is_for_logging_only() {
        let q = BoundQuery::new(
            "SELECT * FROM log WHERE item_id = ?1 AND time < ?2",
            vec![Value::Integer(7), Value::Integer(123)],
        );
        assert_eq!(
            q.interpolated(),
            "SELECT * FROM log WHERE item_id = 7 AND time < 123"
        );
    }

    #[test]
    fn fallback_queries_walk_backward() {
        let q = ReducedDialect.next_earlier(SeriesId(7), 1_000);
        assert!(q.sql.contains("time < ?2 ORDER BY time DESC LIMIT 1"));
        let q = ReducedDialect.oldest_entry(SeriesId(7));
        assert!(q.sql.contains("ORDER BY time ASC LIMIT 1"));
    }
}
