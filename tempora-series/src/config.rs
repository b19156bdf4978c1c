//! Configuration for sorted series

/// Configuration options for a sorted series
///
/// # Example
///
/// ```
/// use tempora_series::{PoolConfig, SeriesConfig};
///
/// let config = SeriesConfig {
///     initial_capacity: 64,
///     pool: PoolConfig { max_retained: 4 },
/// };
/// assert_eq!(config.initial_capacity, 64);
/// ```
#[derive(Debug, Clone)]
pub struct SeriesConfig {
    /// Capacity rented for a fresh dense key/value buffer
    pub initial_capacity: usize,

    /// Tuning for the buffer pools backing the series
    pub pool: PoolConfig,
}

impl Default for SeriesConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 16,
            pool: PoolConfig::default(),
        }
    }
}

/// Tuning for a [`BufferPool`](crate::BufferPool)
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of buffers the pool retains per element type
    pub max_retained: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_retained: crate::pool::DEFAULT_MAX_RETAINED,
        }
    }
}
