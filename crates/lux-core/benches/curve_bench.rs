//! Benchmarks for the daylight curve and chiclet stepping.

use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lux_core::{filled_chiclet_value, Coordinates, DaylightCurve};

fn bench_hourly_samples(c: &mut Criterion) {
    let coords = Coordinates {
        latitude: 44.43,
        longitude: 26.1,
    };
    let curve = DaylightCurve::default();
    let date = NaiveDate::from_ymd_opt(2024, 6, 21).unwrap();

    c.bench_function("daylight_hourly_samples", |b| {
        b.iter(|| lux_core::domain::solar::hourly_samples(black_box(coords), &curve, date))
    });
}

fn bench_chiclet(c: &mut Criterion) {
    c.bench_function("filled_chiclet_step", |b| {
        b.iter(|| {
            for value in 0..=100 {
                black_box(filled_chiclet_value(black_box(value), 6));
            }
        })
    });
}

criterion_group!(benches, bench_hourly_samples, bench_chiclet);
criterion_main!(benches);
