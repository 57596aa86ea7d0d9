//! Benchmarks for the tally query pipeline
//!
//! Run with: cargo bench

use chrono::Local;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tally::calendar::TimeUnit;
use tally::descriptor::{self, ParamMap};
use tally::query::{select_dialect, AggregateOp, DialectKind, GroupKey, QueryBuilder, QuerySpec};
use tally::store::SeriesId;

fn bench_descriptor_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("descriptor_parse");
    let params = ParamMap::new();

    for name in ["day", "day_max", "month_minus2", "last_24h_max", "rolling_12m_year_minus1"] {
        group.bench_function(name, |b| {
            b.iter(|| descriptor::parse(black_box(name), black_box(&params)).unwrap())
        });
    }

    group.finish();
}

fn bench_query_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_build");
    let now = Local::now();

    for kind in [DialectKind::Rich, DialectKind::Reduced] {
        let builder = QueryBuilder::new(select_dialect(kind));

        let plain = QuerySpec::new(AggregateOp::Max, SeriesId(1), TimeUnit::Week, 1, 0);
        group.bench_function(format!("plain_{kind:?}"), |b| {
            b.iter(|| builder.build(black_box(&plain), now).unwrap())
        });

        let compound = QuerySpec::new(AggregateOp::SumMax, SeriesId(1), TimeUnit::Year, 0, 0)
            .group(GroupKey::Day)
            .group2(GroupKey::Month);
        group.bench_function(format!("compound_{kind:?}"), |b| {
            b.iter(|| builder.build(black_box(&compound), now).unwrap())
        });

        let single = QuerySpec::new(AggregateOp::Max, SeriesId(1), TimeUnit::Week, 1, 1);
        group.bench_function(format!("single_{kind:?}"), |b| {
            b.iter(|| builder.build(black_box(&single), now).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_descriptor_parse, bench_query_build);
criterion_main!(benches);
