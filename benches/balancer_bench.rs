use criterion::{black_box, criterion_group, criterion_main, Criterion};
use parallel_hive::balancer::{normalize, plan_pieces, PerformanceCalculator, Sample};
use parallel_hive::{DroneId, HiveConfig, Invoke, NetworkError, ParallelQueen, Transport};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// 只记录派发分片大小的传输层
#[derive(Debug, Default)]
struct SizeTransport {
    sizes: Mutex<Vec<(DroneId, u64)>>,
}

impl Transport for SizeTransport {
    fn deliver(&self, drone: DroneId, invoke: Invoke) -> Result<(), NetworkError> {
        let size = invoke.piece_size().unwrap_or(0);
        self.sizes.lock().push((drone, size));
        Ok(())
    }
}

fn test_performances(count: usize) -> Vec<f64> {
    let mut performances: Vec<f64> = (0..count).map(|i| 0.5 + (i % 7) as f64 * 0.2).collect();
    normalize(&mut performances);
    performances
}

pub fn bench_plan_pieces(c: &mut Criterion) {
    let performances = test_performances(100);

    c.bench_function("plan pieces for 100 drones", |b| {
        b.iter(|| plan_pieces(black_box(&performances), 0, black_box(1_000_000)))
    });
}

pub fn bench_recalculate(c: &mut Criterion) {
    let calculator = PerformanceCalculator::default();
    let samples: Vec<Sample> = test_performances(100)
        .into_iter()
        .enumerate()
        .map(|(i, performance)| Sample {
            performance,
            throughput: 100.0 + i as f64,
            history_count: 10,
        })
        .collect();

    c.bench_function("recalculate 100 drones", |b| {
        b.iter(|| {
            let mut next = calculator.recalculate(black_box(&samples));
            normalize(&mut next);
            next
        })
    });
}

pub fn bench_full_round(c: &mut Criterion) {
    let transport = Arc::new(SizeTransport::default());
    let queen = ParallelQueen::new(HiveConfig::default(), transport.clone()).unwrap();
    for i in 0..16 {
        queen.add_drone(format!("node-{}", i), None).unwrap();
    }

    c.bench_function("dispatch and complete 16 pieces", |b| {
        b.iter(|| {
            let uid = queen.send_piece_data(Invoke::new("bench"), 0, 16_000).unwrap();
            let pieces: Vec<_> = transport.sizes.lock().drain(..).collect();
            for (drone, size) in pieces {
                let elapsed = Duration::from_millis(10 + drone.0 as u64);
                queen.on_piece_complete(drone, uid, size, elapsed).unwrap();
            }
        })
    });
}

criterion_group!{
    name = benches;
    config = Criterion::default();
    targets = bench_plan_pieces, bench_recalculate, bench_full_round
}
criterion_main!(benches);
