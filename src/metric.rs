//! Metric registry
//!
//! Declared metrics from the configuration, parsed once into descriptors
//! and classified by recomputation cadence. A definition whose function
//! name does not parse is logged and skipped; one bad entry never takes
//! down the rest of the set.

use crate::calendar::TimeUnit;
use crate::config::MetricDef;
use crate::descriptor::{self, FunctionDescriptor, ParamMap, RollingKind, StaticKind};
use crate::store::SeriesId;
use std::collections::HashSet;
use std::fmt;
use tracing::warn;

/// Index of a metric within its [`MetricSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricId(pub u32);

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "metric:{}", self.0)
    }
}

/// When a metric is recomputed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// Once, when the engine starts.
    Startup,
    /// On every new sample of the source series.
    OnChange,
    /// At the rollover of the named timeframe.
    Rollover(TimeUnit),
    /// On every engine cycle.
    EveryCycle,
}

/// A validated metric: definition plus its parsed descriptor.
#[derive(Debug, Clone)]
pub struct Metric {
    pub id: MetricId,
    pub name: String,
    pub series: SeriesId,
    pub descriptor: FunctionDescriptor,
    pub params: ParamMap,
    pub ignore_value: Option<f64>,
}

impl Metric {
    pub fn cadence(&self) -> Cadence {
        match &self.descriptor {
            FunctionDescriptor::Static(StaticKind::StoreVersion)
            | FunctionDescriptor::Static(StaticKind::OldestValue)
            | FunctionDescriptor::Static(StaticKind::OldestLog) => Cadence::Startup,
            FunctionDescriptor::OnChange { .. } => Cadence::OnChange,
            FunctionDescriptor::Periodic { unit, .. } => Cadence::Rollover(*unit),
            FunctionDescriptor::Rolling(RollingKind::Last { .. }) => Cadence::EveryCycle,
            FunctionDescriptor::Rolling(RollingKind::Consumption { unit, .. }) => {
                Cadence::Rollover(*unit)
            }
            // seasonal sums move with the day
            FunctionDescriptor::NamedSeries(_) => Cadence::Rollover(TimeUnit::Day),
        }
    }
}

/// The full set of declared metrics.
#[derive(Debug, Default)]
pub struct MetricSet {
    metrics: Vec<Metric>,
}

impl MetricSet {
    /// Build the set from configuration, skipping invalid definitions.
    pub fn from_definitions(defs: &[MetricDef]) -> Self {
        let mut metrics = Vec::with_capacity(defs.len());
        let mut seen = HashSet::new();

        for def in defs {
            if !seen.insert(def.name.clone()) {
                warn!(metric = %def.name, "duplicate metric name, skipping");
                continue;
            }
            let descriptor = match descriptor::parse(&def.function, &def.params) {
                Ok(d) => d,
                Err(e) => {
                    warn!(metric = %def.name, function = %def.function, error = %e,
                          "invalid metric function, skipping");
                    continue;
                }
            };
            metrics.push(Metric {
                id: MetricId(metrics.len() as u32),
                name: def.name.clone(),
                series: def.series,
                descriptor,
                params: def.params.clone(),
                ignore_value: def.ignore_value,
            });
        }

        Self { metrics }
    }

    pub fn get(&self, id: MetricId) -> Option<&Metric> {
        self.metrics.get(id.0 as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Metric> {
        self.metrics.iter()
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Metrics computed once at startup.
    pub fn startup(&self) -> impl Iterator<Item = &Metric> {
        self.metrics
            .iter()
            .filter(|m| m.cadence() == Cadence::Startup)
    }

    /// Metrics recomputed on every cycle.
    pub fn every_cycle(&self) -> impl Iterator<Item = &Metric> {
        self.metrics
            .iter()
            .filter(|m| m.cadence() == Cadence::EveryCycle)
    }

    /// Metrics due at the rollover of `unit`.
    pub fn due_at_rollover(&self, unit: TimeUnit) -> impl Iterator<Item = &Metric> + '_ {
        self.metrics
            .iter()
            .filter(move |m| m.cadence() == Cadence::Rollover(unit))
    }

    /// On-change metrics listening to `series`.
    pub fn on_change_for(&self, series: SeriesId) -> impl Iterator<Item = &Metric> + '_ {
        self.metrics
            .iter()
            .filter(move |m| m.series == series && m.descriptor.is_on_change())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(name: &str, function: &str) -> MetricDef {
        MetricDef {
            name: name.into(),
            series: SeriesId(7),
            function: function.into(),
            params: ParamMap::new(),
            ignore_value: None,
        }
    }

    #[test]
    fn invalid_definitions_are_skipped_not_fatal() {
        let set = MetricSet::from_definitions(&[
            def("good", "day_max"),
            def("bad", "fortnight_minusx"),
            def("also_good", "week_minus1"),
        ]);
        assert_eq!(set.len(), 2);
        let names: Vec<_> = set.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["good", "also_good"]);
    }

    #[test]
    fn duplicate_names_keep_the_first() {
        let set = MetricSet::from_definitions(&[def("a", "day_max"), def("a", "week_max")]);
        assert_eq!(set.len(), 1);
        assert!(set.get(MetricId(0)).unwrap().descriptor.is_on_change());
    }

    #[test]
    fn cadence_classification() {
        let set = MetricSet::from_definitions(&[
            def("version", "store_version"),
            def("daily_peak", "day_max"),
            def("last_week", "week_minus1"),
            def("trailing", "last_24h_max"),
            def("rolling_year", "rolling_12m_year_minus1"),
        ]);
        let cadences: Vec<_> = set.iter().map(|m| m.cadence()).collect();
        assert_eq!(
            cadences,
            vec![
                Cadence::Startup,
                Cadence::OnChange,
                Cadence::Rollover(TimeUnit::Week),
                Cadence::EveryCycle,
                Cadence::Rollover(TimeUnit::Year),
            ]
        );
    }

    #[test]
    fn rollover_and_listener_queries() {
        let set = MetricSet::from_definitions(&[
            def("w", "week_minus1"),
            def("m", "month_minus1_avg"),
            def("peak", "day_max"),
        ]);

        let weekly: Vec<_> = set
            .due_at_rollover(TimeUnit::Week)
            .map(|m| m.name.as_str())
            .collect();
        assert_eq!(weekly, vec!["w"]);

        let listeners: Vec<_> = set
            .on_change_for(SeriesId(7))
            .map(|m| m.name.as_str())
            .collect();
        assert_eq!(listeners, vec!["peak"]);
        assert!(set.on_change_for(SeriesId(99)).next().is_none());
    }
}
