//! Criterion benchmarks for the estimator hot paths in `ir-core`.
//!
//! These benchmarks run on synthetic event streams so they are
//! deterministic in CI and on developer machines: no file I/O, no real
//! source corpora.

use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use ir_common::{TestOutcome, VehicleId};
use ir_config::{CycleGapPolicy, EstimatorConfig, ShrinkageConstants};
use ir_core::aggregate::Aggregates;
use ir_core::cycle::CycleSegmenter;
use ir_core::event::TestEvent;
use ir_core::hierarchy::{HierarchyMode, RateModel};
use ir_core::interpolate::{interpolate, BandRate};

fn synthetic_vehicle(vid: u64, events: usize) -> Vec<TestEvent> {
    let start = NaiveDate::from_ymd_opt(2018, 1, 1).unwrap();
    (0..events)
        .map(|i| TestEvent {
            vehicle_id: VehicleId(vid),
            source_record_id: i as u64 + 1,
            test_date: start + chrono::Duration::days((i as i64) * 370 % 2200),
            outcome: if i % 4 == 0 {
                TestOutcome::Fail
            } else {
                TestOutcome::Pass
            },
            category: "car".to_string(),
            mileage: Some(20_000 + (vid as u32 % 10) * 12_000),
            first_registration: Some(NaiveDate::from_ymd_opt(2014, 6, 1).unwrap()),
            regime: Some("annual".to_string()),
            powertrain: Some(if vid % 3 == 0 { "diesel" } else { "petrol" }.to_string()),
            make: Some(format!("Make{}", vid % 25)),
            model: None,
            defect_categories: Vec::new(),
        })
        .collect()
}

fn bench_cycle_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("cycle_segmenter");

    for vehicles in [100u64, 1_000] {
        let fleet: Vec<Vec<TestEvent>> =
            (1..=vehicles).map(|vid| synthetic_vehicle(vid, 6)).collect();
        group.bench_with_input(
            BenchmarkId::new("segment_fleet", vehicles),
            &fleet,
            |b, fleet| {
                b.iter(|| {
                    let mut seg = CycleSegmenter::new(CycleGapPolicy::default());
                    let mut cycles = 0u64;
                    for vehicle in fleet {
                        let out = seg.segment_vehicle(black_box(vehicle.clone())).unwrap();
                        cycles += out.iter().filter(|c| c.cycle_first).count() as u64;
                    }
                    black_box(cycles);
                })
            },
        );
    }
    group.finish();
}

fn bench_model_fit(c: &mut Criterion) {
    let config = EstimatorConfig::default();
    let mut seg = CycleSegmenter::new(CycleGapPolicy::default());
    let mut aggregates = Aggregates::new();
    for vid in 1..=5_000u64 {
        for ce in seg.segment_vehicle(synthetic_vehicle(vid, 4)).unwrap() {
            aggregates.record(&ce, &config.mileage_buckets, &config.age_buckets);
        }
    }
    aggregates.sanitize();

    let mut group = c.benchmark_group("rate_model");
    for (name, mode) in [
        ("full", HierarchyMode::Full),
        ("two_level", HierarchyMode::TwoLevel),
    ] {
        group.bench_function(BenchmarkId::new("fit", name), |b| {
            b.iter(|| {
                let model = RateModel::fit(
                    black_box(&aggregates),
                    &ShrinkageConstants::default(),
                    mode,
                );
                black_box(model.segment_count());
            })
        });
    }
    group.finish();
}

fn bench_interpolation(c: &mut Criterion) {
    let bands: Vec<BandRate> = EstimatorConfig::default()
        .mileage_buckets
        .iter()
        .enumerate()
        .map(|(i, def)| BandRate::new(def, 0.10 + i as f64 * 0.04))
        .collect();

    c.bench_function("interpolate_mileage_axis", |b| {
        b.iter(|| {
            let mut acc = 0.0;
            for v in (0..150_000u32).step_by(997) {
                acc += interpolate(black_box(&bands), v as f64).unwrap_or(0.0);
            }
            black_box(acc);
        })
    });
}

criterion_group!(benches, bench_cycle_scan, bench_model_fit, bench_interpolation);
criterion_main!(benches);
