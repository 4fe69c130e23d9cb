use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use csv_conform::{
    data::Value,
    primary_key::{KeyTracking, PrimaryKeyTracker},
};
use std::hint::black_box;

const ROWS: i64 = 50_000;

/// Composite `(region, sequence)` keys in sorted order, with every hundredth
/// key repeated.
fn sorted_keys() -> Vec<Vec<Option<Value>>> {
    let mut rows = Vec::with_capacity(ROWS as usize);
    for i in 0..ROWS {
        let row = vec![
            Some(Value::String(format!("region-{:02}", i / 2_500))),
            Some(Value::Integer(i)),
        ];
        if i % 100 == 0 {
            rows.push(row.clone());
        }
        rows.push(row);
    }
    rows
}

fn track(rows: &[Vec<Option<Value>>], mode: KeyTracking) -> usize {
    let mut tracker = PrimaryKeyTracker::new(&[0, 1], mode);
    rows.iter()
        .filter(|row| tracker.observe(row).duplicated)
        .count()
}

fn bench_key_tracking(c: &mut Criterion) {
    let rows = sorted_keys();
    assert_eq!(track(&rows, KeyTracking::Sorted), track(&rows, KeyTracking::Unsorted));

    let mut group = c.benchmark_group("primary_key_tracking");
    group.sample_size(20);

    group.bench_function("sorted_previous_key", |b| {
        b.iter_batched(
            || rows.clone(),
            |rows| black_box(track(&rows, KeyTracking::Sorted)),
            BatchSize::LargeInput,
        )
    });

    group.bench_function("unsorted_hash_set", |b| {
        b.iter_batched(
            || rows.clone(),
            |rows| black_box(track(&rows, KeyTracking::Unsorted)),
            BatchSize::LargeInput,
        )
    });

    group.finish();
}

criterion_group!(benches, bench_key_tracking);
criterion_main!(benches);
