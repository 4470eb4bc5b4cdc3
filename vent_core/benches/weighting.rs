use criterion::{Criterion, black_box, criterion_group, criterion_main};
use vent_core::PositionHistory;

/// A ring at full capacity with one sample per minute over three hours.
fn full_ring() -> PositionHistory {
    let mut history = PositionHistory::new(180, 0.1);
    for i in 0..180u64 {
        let metric = 20.0 + (i % 37) as f32;
        history.push(metric, i * 60_000);
    }
    history
}

fn bench_weighting(c: &mut Criterion) {
    let now = 181 * 60_000;

    let history = full_ring();
    c.bench_function("weighted_metric_full_ring", |b| {
        b.iter(|| black_box(history.weighted_metric(black_box(now))));
    });

    // The auto-mode candidate scan: one weighted average per position.
    let histories: Vec<PositionHistory> = (0..10).map(|_| full_ring()).collect();
    c.bench_function("scan_ten_positions", |b| {
        b.iter(|| {
            histories
                .iter()
                .filter_map(|h| h.weighted_metric(now))
                .fold(f32::INFINITY, f32::min)
        });
    });
}

criterion_group!(benches, bench_weighting);
criterion_main!(benches);
