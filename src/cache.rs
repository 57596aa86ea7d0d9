//! Incremental Cache Engine
//!
//! Running extrema and period baselines for on-change metrics, so a new
//! sample only costs a store query the first time a `(series, timeframe)`
//! pair is touched within a period. One keyed map owned exclusively by the
//! dispatch worker; no internal locking.
//!
//! Per `(series, timeframe)` the lifecycle is Empty → Seeded → Updated,
//! reset to Empty on period rollover:
//!
//! - first sample of a period: the caller seeds the entry with exactly one
//!   store query over the period so far
//! - every later sample: compared in memory; the store is not consulted
//! - rollover: [`AggregationCache::reset`] wipes the timeframe's entries so
//!   the next sample forces a reseed
//!
//! An entry for timeframe T therefore only ever reflects samples observed
//! since the start of the current instance of T.

use crate::calendar::TimeUnit;
use crate::normalize::round1;
use crate::store::SeriesId;
use std::collections::HashMap;

/// Extremum direction tracked by an on-change cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtremumOp {
    Min,
    Max,
}

impl ExtremumOp {
    /// Is `sample` more extreme than `cached` in this direction?
    pub fn improves(&self, sample: f64, cached: f64) -> bool {
        match self {
            ExtremumOp::Min => sample < cached,
            ExtremumOp::Max => sample > cached,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExtremumOp::Min => "min",
            ExtremumOp::Max => "max",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Slot {
    Extremum(ExtremumOp),
    Baseline,
}

/// Outcome of observing a sample against a cached extremum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExtremumUpdate {
    /// No entry for this period yet; the caller must seed from the store.
    NeedsSeed,
    /// The sample was more extreme; the cache now holds it.
    Updated(f64),
    /// The cached extremum stands.
    Unchanged(f64),
}

/// Keyed store of per-period extrema and baselines.
#[derive(Debug, Default)]
pub struct AggregationCache {
    entries: HashMap<(SeriesId, TimeUnit, Slot), f64>,
}

impl AggregationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wipe every entry of one timeframe across all series. Driven by the
    /// rollover check; other timeframes are untouched.
    pub fn reset(&mut self, unit: TimeUnit) {
        self.entries.retain(|(_, u, _), _| *u != unit);
    }

    /// Compare a new sample against the cached extremum, updating it when
    /// more extreme. Purely in memory.
    pub fn observe_extremum(
        &mut self,
        series: SeriesId,
        unit: TimeUnit,
        op: ExtremumOp,
        sample: f64,
    ) -> ExtremumUpdate {
        let key = (series, unit, Slot::Extremum(op));
        match self.entries.get_mut(&key) {
            None => ExtremumUpdate::NeedsSeed,
            Some(cached) if op.improves(sample, *cached) => {
                *cached = sample;
                ExtremumUpdate::Updated(sample)
            }
            Some(cached) => ExtremumUpdate::Unchanged(*cached),
        }
    }

    /// Store the period-so-far extremum fetched from the store.
    pub fn seed_extremum(
        &mut self,
        series: SeriesId,
        unit: TimeUnit,
        op: ExtremumOp,
        value: f64,
    ) -> f64 {
        self.entries.insert((series, unit, Slot::Extremum(op)), value);
        value
    }

    pub fn extremum(&self, series: SeriesId, unit: TimeUnit, op: ExtremumOp) -> Option<f64> {
        self.entries.get(&(series, unit, Slot::Extremum(op))).copied()
    }

    /// The period's opening value, if seeded.
    pub fn baseline(&self, series: SeriesId, unit: TimeUnit) -> Option<f64> {
        self.entries.get(&(series, unit, Slot::Baseline)).copied()
    }

    /// Store the period's opening value.
    pub fn seed_baseline(&mut self, series: SeriesId, unit: TimeUnit, value: f64) -> f64 {
        self.entries.insert((series, unit, Slot::Baseline), value);
        value
    }

    /// Derived consumption of a sample against the period baseline.
    pub fn delta_from_baseline(&self, series: SeriesId, unit: TimeUnit, sample: f64) -> Option<f64> {
        self.baseline(series, unit).map(|b| round1(sample - b))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const S: SeriesId = SeriesId(1);

    #[test]
    fn unseeded_entry_requests_a_seed() {
        let mut cache = AggregationCache::new();
        assert_eq!(
            cache.observe_extremum(S, TimeUnit::Day, ExtremumOp::Max, 5.0),
            ExtremumUpdate::NeedsSeed
        );
    }

    #[test]
    fn cached_maximum_equals_max_of_seed_and_samples() {
        let mut cache = AggregationCache::new();
        let seed = 7.0;
        cache.seed_extremum(S, TimeUnit::Day, ExtremumOp::Max, seed);

        let samples = [3.0, 9.5, 4.2, 9.4, 11.0, 2.0];
        for s in samples {
            cache.observe_extremum(S, TimeUnit::Day, ExtremumOp::Max, s);
        }

        let expected = samples.iter().cloned().fold(seed, f64::max);
        assert_eq!(cache.extremum(S, TimeUnit::Day, ExtremumOp::Max), Some(expected));
    }

    #[test]
    fn minimum_moves_only_downward() {
        let mut cache = AggregationCache::new();
        cache.seed_extremum(S, TimeUnit::Week, ExtremumOp::Min, 4.0);

        assert_eq!(
            cache.observe_extremum(S, TimeUnit::Week, ExtremumOp::Min, 6.0),
            ExtremumUpdate::Unchanged(4.0)
        );
        assert_eq!(
            cache.observe_extremum(S, TimeUnit::Week, ExtremumOp::Min, 1.5),
            ExtremumUpdate::Updated(1.5)
        );
        assert_eq!(cache.extremum(S, TimeUnit::Week, ExtremumOp::Min), Some(1.5));
    }

    #[test]
    fn min_and_max_slots_are_independent() {
        let mut cache = AggregationCache::new();
        cache.seed_extremum(S, TimeUnit::Day, ExtremumOp::Min, 3.0);
        cache.seed_extremum(S, TimeUnit::Day, ExtremumOp::Max, 3.0);
        cache.observe_extremum(S, TimeUnit::Day, ExtremumOp::Max, 8.0);

        assert_eq!(cache.extremum(S, TimeUnit::Day, ExtremumOp::Min), Some(3.0));
        assert_eq!(cache.extremum(S, TimeUnit::Day, ExtremumOp::Max), Some(8.0));
    }

    #[test]
    fn reset_clears_only_the_given_timeframe() {
        let mut cache = AggregationCache::new();
        cache.seed_extremum(S, TimeUnit::Day, ExtremumOp::Max, 5.0);
        cache.seed_extremum(S, TimeUnit::Week, ExtremumOp::Max, 6.0);
        cache.seed_baseline(S, TimeUnit::Week, 100.0);

        cache.reset(TimeUnit::Week);

        // the weekly entries are gone, the next weekly sample reseeds
        assert_eq!(
            cache.observe_extremum(S, TimeUnit::Week, ExtremumOp::Max, 1.0),
            ExtremumUpdate::NeedsSeed
        );
        assert_eq!(cache.baseline(S, TimeUnit::Week), None);
        // the daily entry is untouched
        assert_eq!(cache.extremum(S, TimeUnit::Day, ExtremumOp::Max), Some(5.0));
    }

    #[test]
    fn consumption_delta_against_baseline() {
        let mut cache = AggregationCache::new();
        cache.seed_baseline(S, TimeUnit::Week, 120.0);
        assert_eq!(cache.delta_from_baseline(S, TimeUnit::Week, 133.4), Some(13.4));
        assert_eq!(cache.delta_from_baseline(S, TimeUnit::Day, 133.4), None);
    }
}
