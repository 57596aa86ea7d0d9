//! # Tally
//!
//! Metrics-derivation engine over an append-only measurement log. Tally
//! turns raw `(series, time, value)` samples stored in a log table into
//! derived time-series metrics: per-period extrema, consumption deltas,
//! rolling aggregates and seasonal sums.
//!
//! ## Features
//!
//! - **Symbolic metrics**: names like `day_max` or `rolling_12m_year_minus1`
//!   parsed once into structured descriptors
//! - **Calendar windows**: period-aligned boundaries (ISO weeks, calendar
//!   months) resolved in one place
//! - **Dialect-abstracted SQL**: one query shape for stores with date
//!   arithmetic, one for stores without
//! - **Incremental updates**: on-change metrics cost one store query per
//!   period, then run from memory
//! - **Ordered dispatch**: a single consumer serializes every recomputation
//!
//! ## Modules
//!
//! - [`calendar`]: window resolution and rollover predicates
//! - [`descriptor`]: function-name grammar and parsed descriptors
//! - [`query`]: operators, dialects and the query builder
//! - [`store`]: the serialized store executor and raw-statement validation
//! - [`engine`]: metric evaluation, scheduling and the external surface
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tally::config::Config;
//! use tally::engine::Engine;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::load_default();
//!     let (engine, worker) = Engine::new(&config);
//!
//!     tokio::spawn(engine.clone().run(worker));
//!
//!     engine.run_cycle();
//!     engine.sample(tally::store::SeriesId(12), 21.5);
//! }
//! ```

pub mod cache;
pub mod calendar;
pub mod config;
pub mod descriptor;
pub mod dispatch;
pub mod engine;
pub mod metric;
pub mod normalize;
pub mod query;
pub mod store;

// Re-export top-level types for convenience
pub use cache::{AggregationCache, ExtremumOp, ExtremumUpdate};

pub use calendar::{CalendarError, RollingWindow, TimeUnit, TimeWindow, WindowUnit};

pub use config::{Config, ConfigError, LoggingConfig, MetricDef};

pub use descriptor::{
    DescriptorError, FunctionDescriptor, NamedSeriesFn, RollingKind, SampleStat, StaticKind,
};

pub use dispatch::{Dispatcher, Task, Worker};

pub use engine::{Engine, MetricUpdate, MetricValue, QueryRequest};

pub use metric::{Cadence, Metric, MetricId, MetricSet};

pub use normalize::{normalize, round1, scalar, ValuePair};

pub use query::{
    AggregateOp, BoundQuery, BuildError, Dialect, DialectKind, GroupKey, QueryBuilder, QuerySpec,
};

pub use store::{QueryExecutor, RawRow, SeriesId, StoreError, StoreResult};

/// Crate-level error aggregating the per-area enums.
#[derive(Debug, thiserror::Error)]
pub enum TallyError {
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    #[error(transparent)]
    Calendar(#[from] CalendarError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
