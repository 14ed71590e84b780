//! Throughput harness: every worker thread hammers one shared pool with
//! allocate / write / release pairs and the aggregate rate is reported.
//!
//! ```text
//! cargo run --release --example throughput -- --threads 8 --ops 1000000
//! ```

use std::{thread, time::Instant};

use anyhow::Result;
use clap::Parser;
use slotpool::{Pool, PoolConfig};

#[derive(Debug, Parser)]
#[command(about = "Measure allocate/release throughput of a slot pool")]
struct Args {
    /// Worker threads.
    #[arg(short, long, default_value_t = 4, env = "SLOTPOOL_THREADS")]
    threads: usize,

    /// Allocate/release pairs per thread.
    #[arg(short, long, default_value_t = 5_000_000, env = "SLOTPOOL_OPS")]
    ops: u64,

    /// Slots in the pool.
    #[arg(short, long, default_value_t = 100_000)]
    capacity: usize,

    /// Usable bytes per slot.
    #[arg(long, default_value_t = slotpool::DEFAULT_SLOT_SIZE)]
    slot_size: usize,

    /// Slots each thread may cache before flushing.
    #[arg(long, default_value_t = slotpool::DEFAULT_CACHE_CAPACITY)]
    cache_capacity: usize,

    /// Slots moved per refill.
    #[arg(long, default_value_t = slotpool::DEFAULT_BATCH_SIZE)]
    batch_size: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let args = Args::parse();
    let config = PoolConfig::new(args.capacity)
        .slot_size(args.slot_size)
        .cache_capacity(args.cache_capacity)
        .batch_size(args.batch_size);
    let pool = Pool::with_config(config)?;

    let (pool, args) = (&pool, &args);
    let start = Instant::now();
    let results: Vec<slotpool::Result<()>> = thread::scope(|s| {
        let workers: Vec<_> = (0..args.threads)
            .map(|_| {
                s.spawn(move || -> slotpool::Result<()> {
                    pool.init_thread();
                    for i in 0..args.ops {
                        let mut slot = pool.allocate()?;
                        let n = slot.len().min(8);
                        slot[..n].copy_from_slice(&i.to_le_bytes()[..n]);
                        pool.release(slot);
                    }
                    pool.deregister_thread();
                    Ok(())
                })
            })
            .collect();

        workers
            .into_iter()
            .map(|worker| worker.join().expect("worker panicked"))
            .collect()
    });
    results.into_iter().collect::<slotpool::Result<()>>()?;
    let secs = start.elapsed().as_secs_f64();

    let total_ops = args.threads as f64 * args.ops as f64 * 2.0;
    println!("Time: {secs:.3} s");
    println!("Rate: {:.2} Mops/s", total_ops / 1e6 / secs);

    let stats = pool.stats();
    println!(
        "Refills: {}  Flushes: {}  Waits: {}",
        stats.refills, stats.flushes, stats.wait_episodes
    );

    Ok(())
}
