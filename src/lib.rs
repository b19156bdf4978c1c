//! Tempora: a time-series collection library
//!
//! This facade crate re-exports the public surface of the Tempora
//! workspace:
//!
//! - [`tempora_core`]: errors, lookup directions, key comparers
//! - [`tempora_series`]: the sorted series engine with versioned
//!   lock-free reads, concurrent cursors and binary serialization
//!
//! # Example
//!
//! ```
//! use tempora::{SortedSeries, TickComparer};
//!
//! let series = SortedSeries::new(TickComparer::<i64>::new());
//! series.set(10, 1.0)?;
//! assert_eq!(series.get(&10)?, 1.0);
//! # Ok::<(), tempora::Error>(())
//! ```

pub use tempora_core::*;
pub use tempora_series::*;
