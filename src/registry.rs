//! Per-thread bookkeeping: which pools the current thread holds a cache for.
//!
//! Every thread owns a small list of [`ThreadCache`]s, one per pool it called
//! `init_thread` on. The list lives in thread-local storage, so when the
//! thread exits the list is dropped and each cache gives its slots back to
//! its pool exactly once. [`deregister`] does the same on demand.

use std::{cell::RefCell, sync::Arc};

use crate::{cache::ThreadCache, pool::Shared};

thread_local! {
    static CACHES: RefCell<Vec<ThreadCache>> = const { RefCell::new(Vec::new()) };
}

/// Makes sure the calling thread has a cache for `shared`. Returns `true` if
/// one was created.
///
/// Caches whose pool handle has been dropped are released on the way.
pub(crate) fn ensure_initialized(shared: &Arc<Shared>) -> bool {
    let created = CACHES.try_with(|caches| {
        let Ok(mut caches) = caches.try_borrow_mut() else {
            return false;
        };

        caches.retain(|cache| !cache.is_orphaned());

        if caches.iter().any(|cache| cache.pool_id() == shared.id()) {
            return false;
        }

        caches.push(ThreadCache::new(Arc::clone(shared)));
        true
    });

    let created = created.unwrap_or(false);
    if created {
        tracing::debug!(
            pool = shared.id(),
            thread = ?std::thread::current().id(),
            "registered thread cache"
        );
    }
    created
}

/// Runs `f` on the calling thread's cache for pool `pool_id`.
///
/// Returns `None` when there is no such cache, including while the thread's
/// local storage is being torn down.
pub(crate) fn with_cache<R>(pool_id: u64, f: impl FnOnce(&mut ThreadCache) -> R) -> Option<R> {
    CACHES
        .try_with(|caches| {
            let mut caches = caches.try_borrow_mut().ok()?;
            caches
                .iter_mut()
                .find(|cache| cache.pool_id() == pool_id)
                .map(f)
        })
        .ok()
        .flatten()
}

/// Removes the calling thread's cache for `pool_id` and gives its slots back.
/// Returns how many slots were returned, `None` if there was no cache.
pub(crate) fn deregister(pool_id: u64) -> Option<usize> {
    let mut cache = CACHES
        .try_with(|caches| {
            let mut caches = caches.try_borrow_mut().ok()?;
            let position = caches.iter().position(|cache| cache.pool_id() == pool_id)?;
            Some(caches.swap_remove(position))
        })
        .ok()
        .flatten()?;

    Some(cache.repatriate())
}

/// Number of caches registered on the calling thread.
#[cfg(test)]
pub(crate) fn registered() -> usize {
    CACHES.with(|caches| caches.borrow().len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Pool, PoolConfig};

    fn pool(capacity: usize) -> Pool {
        let config = PoolConfig::new(capacity)
            .slot_size(64)
            .cache_capacity(4)
            .batch_size(2);
        Pool::with_config(config).unwrap()
    }

    #[test]
    fn init_is_idempotent() {
        let pool = pool(4);
        let shared = pool.shared();

        assert!(ensure_initialized(&shared));
        assert!(!ensure_initialized(&shared));
        assert_eq!(registered(), 1);
    }

    #[test]
    fn one_cache_per_pool() {
        let a = pool(4);
        let b = pool(4);
        a.init_thread();
        b.init_thread();
        assert_eq!(registered(), 2);

        a.release(a.allocate().unwrap());
        assert_eq!(a.thread_stats().unwrap().cached, 2);
        assert_eq!(b.thread_stats().unwrap().cached, 0);
    }

    #[test]
    fn missing_cache_yields_none() {
        assert_eq!(with_cache(u64::MAX, |cache| cache.len()), None);
        assert_eq!(deregister(u64::MAX), None);
    }

    #[test]
    fn dropping_pool_unregisters_current_thread() {
        let pool = pool(4);
        pool.init_thread();
        assert_eq!(registered(), 1);

        pool.destroy();
        assert_eq!(registered(), 0);
    }

    #[test]
    fn orphans_are_pruned_on_next_registration() {
        let first = pool(4);
        let shared = first.shared();
        first.init_thread();
        first.release(first.allocate().unwrap());

        // Keep the cache behind while its pool handle goes away.
        let cache = CACHES.with(|caches| caches.borrow_mut().pop()).unwrap();
        drop(first);
        CACHES.with(|caches| caches.borrow_mut().push(cache));
        drop(shared);
        assert_eq!(registered(), 1);

        let second = pool(4);
        second.init_thread();
        assert_eq!(registered(), 1);
    }

    #[test]
    fn dead_pool_is_pruned_while_other_threads_still_cache_it() {
        use std::sync::mpsc;

        let first = Arc::new(pool(8));
        let (ready, is_ready) = mpsc::channel();
        let mut steps = Vec::new();

        let workers: Vec<_> = (0..2)
            .map(|_| {
                let handle = Arc::clone(&first);
                let ready = ready.clone();
                let (step, next) = mpsc::channel::<()>();
                steps.push(step);

                std::thread::spawn(move || {
                    handle.init_thread();
                    handle.release(handle.allocate().unwrap());
                    drop(handle);
                    ready.send(()).unwrap();

                    next.recv().unwrap();
                    let second = pool(4);
                    second.init_thread();
                    registered()
                })
            })
            .collect();

        is_ready.recv().unwrap();
        is_ready.recv().unwrap();
        // Both workers still cache slots of the first pool.
        let shared = first.shared();
        drop(first);
        assert!(shared.is_closed());

        for step in steps {
            step.send(()).unwrap();
        }
        for worker in workers {
            assert_eq!(worker.join().unwrap(), 1);
        }

        // Both exits gave their slots back before the last reference went.
        assert_eq!(shared.available(), 8);
        assert_eq!(Arc::strong_count(&shared), 1);
    }

    #[test]
    fn thread_exit_repatriates() {
        let pool = pool(8);

        std::thread::scope(|s| {
            s.spawn(|| {
                pool.init_thread();
                pool.release(pool.allocate().unwrap());
                assert_eq!(pool.available(), 6);
            })
            .join()
            .unwrap();
        });

        assert_eq!(pool.available(), 8);
        assert_eq!(pool.stats().repatriations, 1);
    }
}
