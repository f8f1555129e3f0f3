//! Basic example of parallel_hive usage

use parallel_hive::{
    ChannelTransport, Completion, CompletionEngine, DroneId, HiveConfig, Invoke, ParallelQueen,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let transport = Arc::new(ChannelTransport::new(16));
    let queen = Arc::new(ParallelQueen::new(HiveConfig::default(), transport.clone())?);
    let mut engine = CompletionEngine::start(queen.clone());

    // Three drones, each sleeping a different amount per unit of work
    for (i, micros_per_unit) in [20u64, 40, 80].into_iter().enumerate() {
        let id = queen.add_drone(format!("drone-{}", i), None)?;
        let mailbox = transport.connect(id);
        let reporter = engine.reporter();

        thread::spawn(move || {
            while let Ok(invoke) = mailbox.recv() {
                let (Some(uid), Some(size)) = (invoke.history_uid(), invoke.piece_size()) else {
                    continue;
                };
                let start = Instant::now();
                thread::sleep(Duration::from_micros(micros_per_unit * size));
                let done = Completion::Done {
                    drone: id,
                    uid,
                    size,
                    elapsed: start.elapsed(),
                };
                if reporter.blocking_send(done).is_err() {
                    break;
                }
            }
        });
    }

    for round in 0..5u64 {
        let invoke = Invoke::new("sum_squares").with("modulus", 1_000_007i64)?;
        let uid = queen.send_piece_data(invoke, round * 3000, 3000)?;
        engine.next_finished().await;
        println!("task {} done, performances: {:.3?}", uid, queen.performances());
    }

    for i in 0..queen.drone_count() {
        transport.disconnect(DroneId(i));
    }
    engine.shutdown().await;
    Ok(())
}
