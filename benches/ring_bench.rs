//! Performance benchmarks for the NoC simulator.
//!
//! Run with: `cargo bench`

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use nocsim::{Sim, SimConfigBuilder};

/// One finite run: every source streams packets until the time budget.
fn run_ring(ring_size: usize, max_time: u64) -> u64 {
    let config = SimConfigBuilder::new()
        .ring(ring_size)
        .max_time(max_time)
        .build()
        .expect("valid config");
    let mut sim = Sim::from_config(&config).expect("buildable sim");
    sim.start_all_sources();
    sim.run();
    sim.events_processed()
}

fn bench_ring_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_saturated");
    for ring_size in [4usize, 8, 16] {
        group.throughput(Throughput::Elements(ring_size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(ring_size),
            &ring_size,
            |b, &n| {
                b.iter(|| run_ring(n, 2_000));
            },
        );
    }
    group.finish();
}

fn bench_single_packet_latency(c: &mut Criterion) {
    c.bench_function("ring4_single_packet", |b| {
        b.iter(|| {
            let config = SimConfigBuilder::new()
                .ring(4)
                .packets_per_source(1)
                .build()
                .expect("valid config");
            let mut sim = Sim::from_config(&config).expect("buildable sim");
            sim.start_source(0);
            sim.run();
            sim.flit_arrived(2)
        });
    });
}

criterion_group!(benches, bench_ring_sizes, bench_single_packet_latency);
criterion_main!(benches);
