//! Criterion benchmarks for the per-hit fill hot path.
//!
//! The timing task's analyze loop is the only per-event cost in the
//! pipeline; this benchmark establishes a baseline for it at realistic hit
//! multiplicities.
//!
//! Run with: cargo bench --bench hit_fill

use calo_monitor::config::{Settings, SourceSettings};
use calo_monitor::geometry::Geometry;
use calo_monitor::source::SyntheticSource;
use calo_monitor::store::MonitorStore;
use calo_monitor::tasks::timing::TimingTask;
use calo_monitor::tasks::{MonitorTask, TaskContext};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;

fn timing_analyze_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("timing_analyze");

    for hits in [10u32, 100, 1000] {
        let settings = Settings::from_toml(
            r#"
            [tasks.timing]
            type = "timing"
            "#,
        )
        .unwrap();
        let store = Arc::new(MonitorStore::new());
        let mut task = TimingTask::new(TaskContext {
            name: "timing".to_string(),
            store: Some(store),
            settings: settings.tasks["timing"].clone(),
        });
        task.begin_job().unwrap();

        let mut geometry = Geometry::new();
        geometry.init_run(1);

        let mut source = SyntheticSource::new(SourceSettings {
            runs: 1,
            events_per_run: 1,
            hits_per_event: hits,
            seed: 42,
        });
        let runs = source.generate();
        let event = &runs[0].events[0];

        group.throughput(Throughput::Elements(u64::from(hits)));
        group.bench_with_input(BenchmarkId::new("hits", hits), &hits, |b, _| {
            b.iter(|| {
                task.analyze(black_box(event), &geometry).unwrap();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, timing_analyze_throughput);
criterion_main!(benches);
