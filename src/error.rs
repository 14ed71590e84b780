//! Errors returned by the pool.

use std::io;

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PoolError>;

/// Everything that can go wrong while building or using a [`crate::Pool`].
///
/// Running out of slots is not an error: `allocate` blocks until another
/// thread gives slots back.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The [`crate::PoolConfig`] was rejected before touching the OS.
    #[error("invalid pool configuration: `{field}` {reason}")]
    InvalidConfig {
        /// Name of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// The operating system refused to reserve the backing region. No pool
    /// exists afterwards.
    #[error("failed to reserve {bytes} bytes of backing memory")]
    Reserve {
        /// Requested length of the region.
        bytes: usize,
        /// Error reported by the OS.
        #[source]
        source: io::Error,
    },

    /// `allocate` was called on a thread that never ran
    /// [`crate::Pool::init_thread`] for this pool.
    #[error("thread has no cache for this pool, call `init_thread` first")]
    ThreadNotInitialized,

    /// A refill completed without producing a slot.
    #[error("pool exhausted")]
    Exhausted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_config_names_field() {
        let err = PoolError::InvalidConfig {
            field: "batch_size",
            reason: "must not exceed cache_capacity",
        };
        assert_eq!(
            err.to_string(),
            "invalid pool configuration: `batch_size` must not exceed cache_capacity"
        );
    }

    #[test]
    fn reserve_keeps_os_error_as_source() {
        use std::error::Error as _;

        let err = PoolError::Reserve {
            bytes: 4096,
            source: io::Error::from(io::ErrorKind::OutOfMemory),
        };
        assert!(err.source().is_some());
        assert!(err.to_string().contains("4096"));
    }
}
