//! Derivation Engine
//!
//! Ties the pieces together: declared metrics are evaluated against the
//! store and published as [`MetricUpdate`]s, external queries are resolved
//! through the same builder/executor path, and the scheduling cycle drives
//! period rollovers and cache resets.
//!
//! All recomputation runs on the single dispatch worker; the public methods
//! here only enqueue work or execute read-only queries.

use crate::cache::{AggregationCache, ExtremumOp, ExtremumUpdate};
use crate::calendar::{
    is_month_start, is_week_start, is_year_start, local_midnight_ms, period_start,
    resolve_period_window, shift_back, TimeUnit, TimeWindow,
};
use crate::config::Config;
use crate::dispatch::{self, Dispatcher, Task, Worker};
use crate::metric::{Cadence, Metric, MetricId, MetricSet};
use crate::normalize::{
    error_result, is_error_result, normalize, round1, scalar, ValuePair,
};
use crate::query::{
    select_dialect, AggregateOp, Dialect, GroupKey, QueryBuilder, QuerySpec, ReducedDialect,
};
use crate::descriptor::{FunctionDescriptor, NamedSeriesFn, RollingKind, SampleStat, StaticKind};
use crate::store::{ExecutorConfig, QueryExecutor, SeriesId, StoreResult};
use chrono::{DateTime, Datelike, Local, NaiveDate, TimeZone};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// A published metric result.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricUpdate {
    pub id: MetricId,
    pub name: String,
    pub value: MetricValue,
}

/// The value side of an update.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Number(f64),
    Timestamp(i64),
    Text(String),
    /// The computation failed; the previous published value stays valid.
    Unavailable,
}

/// One external aggregation query.
///
/// `start` defaults to `end + count` when absent; `end` defaults to the
/// current open period. The inner grouping defaults to the timeframe unit,
/// so a multi-unit window comes back as one row per unit instance.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub op: AggregateOp,
    pub series: SeriesId,
    pub unit: TimeUnit,
    pub start: Option<u32>,
    pub end: Option<u32>,
    pub count: Option<u32>,
    pub group: Option<GroupKey>,
    pub group2: Option<GroupKey>,
    pub ignore_value: Option<f64>,
}

impl QueryRequest {
    pub fn new(op: AggregateOp, series: SeriesId, unit: TimeUnit) -> Self {
        Self {
            op,
            series,
            unit,
            start: None,
            end: None,
            count: None,
            group: None,
            group2: None,
            ignore_value: None,
        }
    }
}

/// The metrics-derivation engine.
pub struct Engine {
    executor: QueryExecutor,
    builder: QueryBuilder,
    dialect: Arc<dyn Dialect>,
    /// Absolute-bound queries (rolling and seasonal windows) need no date
    /// arithmetic, so they always go through the reduced SQL shape.
    span: ReducedDialect,
    metrics: MetricSet,
    cache: Mutex<AggregationCache>,
    dispatcher: Dispatcher,
    updates: broadcast::Sender<MetricUpdate>,
    last_cycle: Mutex<Option<NaiveDate>>,
}

impl Engine {
    /// Build the engine and its dispatch worker from configuration.
    pub fn new(config: &Config) -> (Arc<Self>, Worker) {
        let dialect = select_dialect(config.store.dialect);
        let executor = QueryExecutor::new(ExecutorConfig {
            path: PathBuf::from(&config.store.path),
            lock_timeout: Duration::from_secs(config.store.lock_timeout_secs),
            reconnect_cooldown: Duration::from_secs(config.store.reconnect_cooldown_secs),
        });
        let metrics = MetricSet::from_definitions(&config.metrics);
        let (dispatcher, worker) = dispatch::channel(config.engine.start_suspended);
        let (updates, _) = broadcast::channel(256);

        info!(
            metrics = metrics.len(),
            dialect = dialect.name(),
            "engine initialized"
        );

        let engine = Arc::new(Self {
            executor,
            builder: QueryBuilder::new(Arc::clone(&dialect)),
            dialect,
            span: ReducedDialect,
            metrics,
            cache: Mutex::new(AggregationCache::new()),
            dispatcher,
            updates,
            last_cycle: Mutex::new(None),
        });
        (engine, worker)
    }

    /// Subscribe to published metric updates.
    pub fn subscribe(&self) -> broadcast::Receiver<MetricUpdate> {
        self.updates.subscribe()
    }

    /// Feed a new source sample into the dispatch queue. Returns `false`
    /// when dispatch is suspended and the sample was dropped.
    pub fn sample(&self, series: SeriesId, value: f64) -> bool {
        self.dispatcher.enqueue(Task::Sample { series, value })
    }

    /// Raise or lower dispatch suspension. While suspended, samples and
    /// recompute triggers are dropped; queries keep working.
    pub fn suspend(&self, on: bool) {
        self.dispatcher.suspend(on);
    }

    pub fn is_suspended(&self) -> bool {
        self.dispatcher.is_suspended()
    }

    /// Execute an external aggregation query.
    pub fn query(&self, request: &QueryRequest) -> Vec<ValuePair> {
        self.query_at(request, Local::now())
    }

    /// [`Engine::query`] evaluated against an explicit `now`.
    pub fn query_at(&self, request: &QueryRequest, now: DateTime<Local>) -> Vec<ValuePair> {
        let end = request.end.unwrap_or(0);
        let start = request
            .start
            .unwrap_or_else(|| end.saturating_add(request.count.unwrap_or(0)));

        let mut spec = QuerySpec::new(request.op, request.series, request.unit, start, end);
        spec.group = request.group.or(Some(GroupKey::from(request.unit)));
        spec.group2 = request.group2;
        spec.ignore_value = request.ignore_value;

        match self.builder.build(&spec, now) {
            Ok(query) => normalize(self.executor.execute(&query)),
            Err(e) => {
                error!(error = %e, ?spec, "query build failed");
                error_result()
            }
        }
    }

    /// Execute a validated read-only statement verbatim.
    pub fn raw_query(&self, sql: &str) -> StoreResult<Vec<Vec<rusqlite::types::Value>>> {
        self.executor.execute_raw(sql)
    }

    /// The store's reported version string.
    pub fn store_version(&self) -> StoreResult<String> {
        self.executor.store_version(self.dialect.version_query())
    }

    /// One scheduling cycle: detect period rollovers, reset the affected
    /// caches and enqueue due metrics.
    pub fn run_cycle(&self) {
        self.run_cycle_at(Local::now());
    }

    /// [`Engine::run_cycle`] evaluated against an explicit `now`.
    pub fn run_cycle_at(&self, now: DateTime<Local>) {
        let today = now.date_naive();
        let previous = {
            let mut last = lock(&self.last_cycle);
            last.replace(today)
        };

        match previous {
            None => {
                // first cycle: compute everything that is not sample-driven
                for metric in self.metrics.iter() {
                    if metric.cadence() != Cadence::OnChange {
                        self.dispatcher.enqueue(Task::Recompute(metric.id));
                    }
                }
                return;
            }
            Some(prev) if prev != today => {
                let mut rolled = vec![TimeUnit::Day];
                if is_week_start(today) {
                    rolled.push(TimeUnit::Week);
                }
                if is_month_start(today) {
                    rolled.push(TimeUnit::Month);
                }
                if is_year_start(today) {
                    rolled.push(TimeUnit::Year);
                }
                info!(?rolled, %today, "period rollover");

                {
                    let mut cache = lock(&self.cache);
                    for &unit in &rolled {
                        cache.reset(unit);
                    }
                }
                for &unit in &rolled {
                    for metric in self.metrics.due_at_rollover(unit) {
                        self.dispatcher.enqueue(Task::Recompute(metric.id));
                    }
                }
            }
            Some(_) => {}
        }

        for metric in self.metrics.every_cycle() {
            self.dispatcher.enqueue(Task::Recompute(metric.id));
        }
    }

    /// Consume the dispatch queue until every producer is gone.
    pub async fn run(self: Arc<Self>, mut worker: Worker) {
        info!("engine worker started");
        while let Some(task) = worker.next_task().await {
            self.handle_task(task, Local::now());
        }
        info!("engine worker stopped");
    }

    fn handle_task(&self, task: Task, now: DateTime<Local>) {
        match task {
            Task::Recompute(id) => {
                if let Some(metric) = self.metrics.get(id) {
                    let value = self.recompute(metric, now);
                    self.publish(metric, value);
                } else {
                    warn!(%id, "recompute for unknown metric");
                }
            }
            Task::Sample { series, value } => self.observe_sample(series, value, now),
        }
    }

    /// Run every on-change metric listening on `series` against a new
    /// sample.
    pub fn observe_sample(&self, series: SeriesId, sample: f64, now: DateTime<Local>) {
        for metric in self.metrics.on_change_for(series) {
            let (unit, op) = match &metric.descriptor {
                FunctionDescriptor::OnChange { unit, op } => (*unit, *op),
                _ => continue,
            };
            let value = match op {
                Some(SampleStat::Min) => {
                    self.observe_extremum(metric, unit, ExtremumOp::Min, sample, now)
                }
                Some(SampleStat::Max) => {
                    self.observe_extremum(metric, unit, ExtremumOp::Max, sample, now)
                }
                // averages cannot be maintained incrementally; re-derive
                // the open period from the store
                Some(SampleStat::Avg) => {
                    let mut spec = QuerySpec::new(AggregateOp::Avg, metric.series, unit, 0, 0);
                    spec.ignore_value = metric.ignore_value;
                    self.build_and_aggregate(metric, &spec, now)
                }
                None => self.observe_consumption(metric, unit, sample, now),
            };
            self.publish(metric, value);
        }
    }

    /// Compare a sample against the cached period extremum, seeding from
    /// the store on first touch.
    fn observe_extremum(
        &self,
        metric: &Metric,
        unit: TimeUnit,
        op: ExtremumOp,
        sample: f64,
        now: DateTime<Local>,
    ) -> MetricValue {
        let outcome = lock(&self.cache).observe_extremum(metric.series, unit, op, sample);
        let value = match outcome {
            ExtremumUpdate::Updated(v) | ExtremumUpdate::Unchanged(v) => v,
            ExtremumUpdate::NeedsSeed => {
                let agg = match op {
                    ExtremumOp::Min => AggregateOp::Min,
                    ExtremumOp::Max => AggregateOp::Max,
                };
                let mut spec = QuerySpec::new(agg, metric.series, unit, 0, 0);
                spec.ignore_value = metric.ignore_value;
                let stored = match self.builder.build(&spec, now) {
                    Ok(query) => scalar(&normalize(self.executor.execute(&query))),
                    Err(e) => {
                        error!(metric = %metric.name, error = %e, "extremum seed build failed");
                        None
                    }
                };
                let seeded = match stored {
                    Some(s) if !op.improves(sample, s) => s,
                    _ => sample,
                };
                lock(&self.cache).seed_extremum(metric.series, unit, op, seeded)
            }
        };
        MetricValue::Number(round1(value))
    }

    /// Consumption of the open period: sample minus the cached baseline
    /// reading at the period start.
    fn observe_consumption(
        &self,
        metric: &Metric,
        unit: TimeUnit,
        sample: f64,
        now: DateTime<Local>,
    ) -> MetricValue {
        let baseline = lock(&self.cache).baseline(metric.series, unit);
        let baseline = match baseline {
            Some(b) => b,
            None => {
                let today = now.date_naive();
                let start_ts = match period_start(unit, 0, today) {
                    Ok(date) => local_midnight_ms(date),
                    Err(e) => {
                        error!(metric = %metric.name, error = %e, "period start unresolvable");
                        return MetricValue::Unavailable;
                    }
                };
                let reading = match self.reading_before(metric.series, start_ts) {
                    Ok(r) => r,
                    Err(e) => {
                        warn!(metric = %metric.name, error = %e, "baseline seed failed");
                        return MetricValue::Unavailable;
                    }
                };
                // no history at all: the sample itself opens the period
                let seed = reading.unwrap_or(sample);
                lock(&self.cache).seed_baseline(metric.series, unit, seed)
            }
        };

        let delta = round1(sample - baseline);
        if delta < 0.0 {
            // not clamped; correction is left to the consumer
            warn!(metric = %metric.name, delta, "negative consumption");
        }
        MetricValue::Number(delta)
    }

    /// Evaluate one metric from the store.
    fn recompute(&self, metric: &Metric, now: DateTime<Local>) -> MetricValue {
        match &metric.descriptor {
            FunctionDescriptor::Static(kind) => self.compute_static(metric, *kind),
            FunctionDescriptor::OnChange { unit, op } => {
                // explicit recompute of a sample-driven metric reads the
                // open period directly, bypassing the cache
                let agg = match op {
                    Some(SampleStat::Min) => AggregateOp::Min,
                    Some(SampleStat::Avg) => AggregateOp::Avg,
                    Some(SampleStat::Max) | None => AggregateOp::Max,
                };
                let mut spec = QuerySpec::new(agg, metric.series, *unit, 0, 0);
                spec.ignore_value = metric.ignore_value;
                self.build_and_aggregate(metric, &spec, now)
            }
            FunctionDescriptor::Periodic {
                unit,
                start,
                end,
                op,
            } => match op {
                // a collapsed window is a point-in-time meter reading
                Some(_) if start == end => self.reading_at(metric, *unit, *start, now),
                Some(op) => {
                    let window =
                        match resolve_period_window(*unit, *start, *end, now.date_naive()) {
                            Ok(w) => w,
                            Err(e) => {
                                error!(metric = %metric.name, error = %e, "period window unresolvable");
                                return MetricValue::Unavailable;
                            }
                        };
                    let mut spec = QuerySpec::new(*op, metric.series, *unit, 0, 0);
                    spec.ignore_value = metric.ignore_value;
                    self.span_aggregate(metric, &spec, window)
                }
                None => self.periodic_consumption(metric, *unit, *start, *end, now),
            },
            FunctionDescriptor::Rolling(RollingKind::Last { window, op }) => {
                let end_ts = now.timestamp_millis();
                let span = TimeWindow {
                    start_ts: end_ts - window.duration_ms(),
                    end_ts,
                };
                let mut spec = QuerySpec::new(*op, metric.series, TimeUnit::Day, 0, 0);
                spec.ignore_value = metric.ignore_value;
                self.span_aggregate(metric, &spec, span)
            }
            FunctionDescriptor::Rolling(RollingKind::Consumption {
                window,
                unit,
                offset,
            }) => self.rolling_consumption(metric, *window, *unit, *offset, now),
            FunctionDescriptor::NamedSeries(series_fn) => {
                self.compute_named_series(metric, series_fn, now)
            }
        }
    }

    fn compute_static(&self, metric: &Metric, kind: StaticKind) -> MetricValue {
        match kind {
            StaticKind::StoreVersion => match self.store_version() {
                Ok(version) => MetricValue::Text(version),
                Err(e) => {
                    warn!(metric = %metric.name, error = %e, "store version unavailable");
                    MetricValue::Unavailable
                }
            },
            StaticKind::OldestValue | StaticKind::OldestLog => {
                let query = self.dialect.oldest_entry(metric.series);
                match self.executor.execute(&query) {
                    Ok(rows) => match rows.first() {
                        Some(row) => match kind {
                            StaticKind::OldestValue => row
                                .value
                                .map(MetricValue::Number)
                                .unwrap_or(MetricValue::Unavailable),
                            _ => row
                                .time
                                .map(MetricValue::Timestamp)
                                .unwrap_or(MetricValue::Unavailable),
                        },
                        None => MetricValue::Unavailable,
                    },
                    Err(e) => {
                        warn!(metric = %metric.name, error = %e, "oldest entry lookup failed");
                        MetricValue::Unavailable
                    }
                }
            }
        }
    }

    /// Counter delta across whole unit instances: reading at the period
    /// boundary `end` back minus reading at the boundary `start` back. The
    /// open period never contributes.
    fn periodic_consumption(
        &self,
        metric: &Metric,
        unit: TimeUnit,
        start: u32,
        end: u32,
        now: DateTime<Local>,
    ) -> MetricValue {
        let window = match resolve_period_window(unit, start, end, now.date_naive()) {
            Ok(w) => w,
            Err(e) => {
                error!(metric = %metric.name, error = %e, "consumption window unresolvable");
                return MetricValue::Unavailable;
            }
        };
        self.consumption_between(metric, window.start_ts, window.end_ts)
    }

    /// Meter reading at the start of the unit instance `offset` back.
    fn reading_at(
        &self,
        metric: &Metric,
        unit: TimeUnit,
        offset: u32,
        now: DateTime<Local>,
    ) -> MetricValue {
        let ts = match period_start(unit, offset, now.date_naive()) {
            Ok(date) => local_midnight_ms(date),
            Err(e) => {
                error!(metric = %metric.name, error = %e, "reading boundary unresolvable");
                return MetricValue::Unavailable;
            }
        };
        match self.reading_before(metric.series, ts) {
            Ok(Some(value)) => MetricValue::Number(round1(value)),
            Ok(None) => MetricValue::Unavailable,
            Err(e) => {
                warn!(metric = %metric.name, error = %e, "boundary reading failed");
                MetricValue::Unavailable
            }
        }
    }

    /// Consumption over a fixed-length window ending at a period boundary
    /// (or now, for offset 0).
    fn rolling_consumption(
        &self,
        metric: &Metric,
        window: crate::calendar::RollingWindow,
        unit: TimeUnit,
        offset: u32,
        now: DateTime<Local>,
    ) -> MetricValue {
        let end_ts = if offset == 0 {
            now.timestamp_millis()
        } else {
            match period_start(unit, offset - 1, now.date_naive()) {
                Ok(date) => local_midnight_ms(date),
                Err(e) => {
                    error!(metric = %metric.name, error = %e, "rolling boundary unresolvable");
                    return MetricValue::Unavailable;
                }
            }
        };
        self.consumption_between(metric, end_ts - window.duration_ms(), end_ts)
    }

    fn consumption_between(&self, metric: &Metric, start_ts: i64, end_ts: i64) -> MetricValue {
        let readings = self
            .reading_before(metric.series, start_ts)
            .and_then(|start| Ok((start, self.reading_before(metric.series, end_ts)?)));
        match readings {
            Ok((Some(start), Some(end))) => {
                let delta = round1(end - start);
                if delta < 0.0 {
                    // not clamped; correction is left to the consumer
                    warn!(metric = %metric.name, delta, "negative consumption");
                }
                MetricValue::Number(delta)
            }
            // an empty series has consumed nothing
            Ok(_) => MetricValue::Number(0.0),
            Err(e) => {
                warn!(metric = %metric.name, error = %e, "consumption readings failed");
                MetricValue::Unavailable
            }
        }
    }

    /// Last reading strictly before `ts`, falling back to the oldest stored
    /// sample when the series starts later.
    fn reading_before(&self, series: SeriesId, ts: i64) -> StoreResult<Option<f64>> {
        let rows = self.executor.execute(&self.dialect.next_earlier(series, ts))?;
        if let Some(value) = rows.iter().find_map(|r| r.value) {
            return Ok(Some(value));
        }
        let rows = self.executor.execute(&self.dialect.oldest_entry(series))?;
        Ok(rows.iter().find_map(|r| r.value))
    }

    fn compute_named_series(
        &self,
        metric: &Metric,
        series_fn: &NamedSeriesFn,
        now: DateTime<Local>,
    ) -> MetricValue {
        let today = now.date_naive();
        match series_fn {
            NamedSeriesFn::HeatingDegreeSum { year, month } => {
                match heating_season(*year, *month) {
                    Some((start, end)) => {
                        self.seasonal_sum(metric, AggregateOp::SumMax, start, end, today)
                    }
                    None => MetricValue::Unavailable,
                }
            }
            NamedSeriesFn::CoolingDegreeSum { year, month } => {
                match cooling_season(*year, *month) {
                    Some((start, end)) => {
                        self.seasonal_sum(metric, AggregateOp::SumMinNegative, start, end, today)
                    }
                    None => MetricValue::Unavailable,
                }
            }
            NamedSeriesFn::GrasslandTempSum { year } => self.grassland_sum(metric, *year, today),
            NamedSeriesFn::PriorYearPeriod => self.prior_year_period(metric, today),
        }
    }

    /// Sum of per-day aggregates over a seasonal window, clamped to today.
    fn seasonal_sum(
        &self,
        metric: &Metric,
        op: AggregateOp,
        start: NaiveDate,
        end: NaiveDate,
        today: NaiveDate,
    ) -> MetricValue {
        let end = match today.succ_opt() {
            Some(tomorrow) => end.min(tomorrow),
            None => end,
        };
        let span = TimeWindow {
            start_ts: local_midnight_ms(start),
            end_ts: local_midnight_ms(end),
        };
        let mut spec = QuerySpec::new(op, metric.series, TimeUnit::Day, 0, 0);
        spec.group = Some(GroupKey::Day);
        spec.ignore_value = metric.ignore_value;
        self.span_aggregate(metric, &spec, span)
    }

    /// Weighted sum of daily maxima from Jan 1st: half weight in January,
    /// three quarters in February, full weight after. Freezing days count
    /// with their negative maxima. Reported as a whole number.
    fn grassland_sum(&self, metric: &Metric, year: i32, today: NaiveDate) -> MetricValue {
        let Some((start, end)) = gts_span(year) else {
            return MetricValue::Unavailable;
        };
        let end = match today.succ_opt() {
            Some(tomorrow) => end.min(tomorrow),
            None => end,
        };
        let span = TimeWindow {
            start_ts: local_midnight_ms(start),
            end_ts: local_midnight_ms(end),
        };
        let mut spec = QuerySpec::new(AggregateOp::Max, metric.series, TimeUnit::Day, 0, 0);
        spec.group = Some(GroupKey::Day);
        spec.ignore_value = metric.ignore_value;

        let query = match self.span.build(&spec, span) {
            Ok(q) => q,
            Err(e) => {
                error!(metric = %metric.name, error = %e, "grassland query build failed");
                return MetricValue::Unavailable;
            }
        };
        let pairs = normalize(self.executor.execute(&query));
        if is_error_result(&pairs) {
            return MetricValue::Unavailable;
        }

        let mut sum = 0.0;
        for (ts, value) in &pairs {
            let (Some(ts), Some(max)) = (ts, value) else {
                continue;
            };
            let Some(day) = Local.timestamp_millis_opt(*ts).earliest() else {
                continue;
            };
            let weight = match day.month() {
                1 => 0.5,
                2 => 0.75,
                _ => 1.0,
            };
            sum += max * weight;
        }
        MetricValue::Number(sum.round())
    }

    /// Consumption over the elapsed portion of the previous year.
    fn prior_year_period(&self, metric: &Metric, today: NaiveDate) -> MetricValue {
        let boundaries = (|| {
            let end = shift_back(TimeUnit::Year, 1, today).ok()?.succ_opt()?;
            let start = NaiveDate::from_ymd_opt(today.year() - 1, 1, 1)?;
            Some((start, end))
        })();
        match boundaries {
            Some((start, end)) => {
                self.consumption_between(metric, local_midnight_ms(start), local_midnight_ms(end))
            }
            None => MetricValue::Unavailable,
        }
    }

    /// Build through the configured dialect and reduce to one value.
    fn build_and_aggregate(
        &self,
        metric: &Metric,
        spec: &QuerySpec,
        now: DateTime<Local>,
    ) -> MetricValue {
        match self.builder.build(spec, now) {
            Ok(query) => scalar_value(&normalize(self.executor.execute(&query))),
            Err(e) => {
                error!(metric = %metric.name, error = %e, "metric query build failed");
                MetricValue::Unavailable
            }
        }
    }

    /// Execute a spec against an absolute window and reduce to one value.
    fn span_aggregate(&self, metric: &Metric, spec: &QuerySpec, span: TimeWindow) -> MetricValue {
        match self.span.build(spec, span) {
            Ok(query) => scalar_value(&normalize(self.executor.execute(&query))),
            Err(e) => {
                error!(metric = %metric.name, error = %e, "span query build failed");
                MetricValue::Unavailable
            }
        }
    }

    fn publish(&self, metric: &Metric, value: MetricValue) {
        debug!(metric = %metric.name, ?value, "metric updated");
        let _ = self.updates.send(MetricUpdate {
            id: metric.id,
            name: metric.name.clone(),
            value,
        });
    }
}

/// Error sentinels stay errors; a no-data window reads as zero.
fn scalar_value(pairs: &[ValuePair]) -> MetricValue {
    if is_error_result(pairs) {
        return MetricValue::Unavailable;
    }
    MetricValue::Number(scalar(pairs).unwrap_or(0.0))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// `[start, end)` of the warm season (Mar 20th through Sep 21st), or one
/// whole month of it.
fn heating_season(year: i32, month: Option<u32>) -> Option<(NaiveDate, NaiveDate)> {
    match month {
        Some(m) => month_span(year, m),
        None => Some((
            NaiveDate::from_ymd_opt(year, 3, 20)?,
            NaiveDate::from_ymd_opt(year, 9, 22)?,
        )),
    }
}

/// `[start, end)` of the cold season (Sep 21st through Mar 21st of the next
/// year), or one whole month of it. Months January through March belong to
/// the season that started the year before.
fn cooling_season(year: i32, month: Option<u32>) -> Option<(NaiveDate, NaiveDate)> {
    match month {
        Some(m) if m <= 3 => month_span(year + 1, m),
        Some(m) => month_span(year, m),
        None => Some((
            NaiveDate::from_ymd_opt(year, 9, 21)?,
            NaiveDate::from_ymd_opt(year + 1, 3, 22)?,
        )),
    }
}

/// The whole given year; the caller clamps to the elapsed portion.
fn gts_span(year: i32) -> Option<(NaiveDate, NaiveDate)> {
    Some((
        NaiveDate::from_ymd_opt(year, 1, 1)?,
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?,
    ))
}

fn month_span(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let end = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((start, end))
}
