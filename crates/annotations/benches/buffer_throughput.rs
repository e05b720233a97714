use annotations::{AnnotationBuffer, AnnotationRecord};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use std::time::{Duration, Instant};

/// Insert cost under steady state (buffer full, evicting on every insert)
fn benchmark_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("annotation_insert");

    for capacity in [10usize, 30, 120] {
        group.bench_with_input(
            BenchmarkId::from_parameter(capacity),
            &capacity,
            |b, &capacity| {
                let mut buffer = AnnotationBuffer::new(capacity, Duration::from_millis(500));
                let now = Instant::now();
                let mut ts = 0u64;
                b.iter(|| {
                    // Slight jitter so some inserts land mid-buffer.
                    let jitter = if ts % 3 == 0 { 40 } else { 0 };
                    buffer.insert(AnnotationRecord::new(ts.saturating_sub(jitter), now));
                    ts += 33;
                });
            },
        );
    }

    group.finish();
}

fn benchmark_nearest(c: &mut Criterion) {
    let mut buffer = AnnotationBuffer::new(30, Duration::from_millis(500));
    let now = Instant::now();
    for i in 0..30u64 {
        buffer.insert(AnnotationRecord::new(i * 33, now));
    }

    c.bench_function("annotation_nearest", |b| {
        let mut at = 0u64;
        b.iter(|| {
            at = (at + 7) % 1000;
            black_box(buffer.nearest(at));
        })
    });
}

criterion_group!(benches, benchmark_insert, benchmark_nearest);
criterion_main!(benches);
