//! A fixed-size slot allocator with per-thread caches.
//!
//! A [`Pool`] reserves one contiguous, page-aligned region at creation and
//! carves it into `capacity` cache-line aligned slots. Free slots are chained
//! into a single free list through their own first word, so bookkeeping costs
//! no extra memory.
//!
//! Threads never hit the free list for every call. Each thread keeps a
//! bounded cache of free slots and only touches the shared list in batches:
//!
//! ```text
//!   thread A          thread B          thread C
//! +-----------+     +-----------+     +-----------+
//! |   cache   |     |   cache   |     |   cache   |    no lock
//! +-----------+     +-----------+     +-----------+
//!    |     ^           |     ^           |     ^
//!  flush refill      flush refill      flush refill    batched, short lock
//!    v     |           v     |           v     |
//! +---------------------------------------------------+
//! |                   global free list                |
//! +---------------------------------------------------+
//! |                 backing region (mmap)             |    OS, twice
//! +---------------------------------------------------+
//! ```
//!
//! * **refill**: an empty cache takes up to `batch_size` slots. If the pool is
//!   empty the thread blocks until some other thread gives slots back.
//! * **flush**: a full cache gives back its oldest entries, keeping half.
//! * **repatriation**: when a thread exits (or calls
//!   [`Pool::deregister_thread`]) its cache is emptied into the pool.
//!
//! ```
//! use std::thread;
//! use slotpool::{Pool, PoolConfig};
//!
//! let pool = Pool::with_config(PoolConfig::new(1024).slot_size(256)).unwrap();
//!
//! thread::scope(|s| {
//!     for t in 0..4u8 {
//!         let pool = &pool;
//!         s.spawn(move || {
//!             pool.init_thread();
//!             for _ in 0..1000 {
//!                 let mut slot = pool.allocate().unwrap();
//!                 slot[0] = t;
//!                 pool.release(slot);
//!             }
//!         });
//!     }
//! });
//! ```

mod cache;
mod config;
mod error;
mod freelist;
mod kernel;
mod pool;
mod region;
mod registry;
mod slot;
mod stats;
mod utils;

pub use config::{
    DEFAULT_BATCH_SIZE, DEFAULT_CACHE_CAPACITY, DEFAULT_SLOT_SIZE, MAX_CAPACITY, PoolConfig,
};
pub use error::{PoolError, Result};
pub use pool::Pool;
pub use slot::Slot;
pub use stats::{CacheStats, PoolStats};
pub use utils::CACHE_LINE;
