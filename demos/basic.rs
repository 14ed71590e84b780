use slotpool::{Pool, PoolConfig};

fn log_slot(label: &str, pool: &Pool) {
    let stats = pool.thread_stats().unwrap_or_default();
    println!(
        "{label}: {} free in pool, {} cached by this thread",
        pool.available(),
        stats.cached
    );
}

fn main() -> anyhow::Result<()> {
    let config = PoolConfig::new(8)
        .slot_size(64)
        .cache_capacity(4)
        .batch_size(2);
    let pool = Pool::with_config(config)?;
    pool.init_thread();
    log_slot("start", &pool);

    let mut a = pool.allocate()?;
    a[..5].copy_from_slice(b"hello");
    println!("Received slot {} at {:p}", a.index(), a.as_ptr());
    log_slot("after first allocate", &pool);

    let b = pool.allocate()?;
    println!("Received slot {} at {:p}", b.index(), b.as_ptr());

    pool.release(a);
    pool.release(b);
    log_slot("after release", &pool);

    let reused = pool.allocate()?;
    println!("Reused slot {}", reused.index());
    drop(reused);

    println!("Returned {:?} slots on deregister", pool.deregister_thread());
    log_slot("end", &pool);
    Ok(())
}
