//! Sorted series engine for Tempora
//!
//! This crate implements the mutable sorted keyed series at the heart
//! of Tempora, with the following components:
//!
//! - **VersionedLock**: optimistic sequence lock; readers retry
//!   instead of blocking
//! - **KeyStore**: dense or constant-space regular key storage
//! - **SortedSeries**: the ordered mapping with its mutation protocol
//! - **SeriesCursor**: bidirectional cursors that survive tail appends
//!   and fail fast on structural change
//! - **UpdateNotifier**: the edge trigger streaming consumers await
//! - **codec**: the compressed binary serialization of a series
//!
//! # Architecture
//!
//! ```text
//! Write Path:
//! writer → write section (version bump) → KeyStore / values → commit
//!
//! Read Path:
//! reader → version snapshot → KeyStore / values → version check → retry?
//! ```
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tempora_core::{Lookup, TickComparer};
//! use tempora_series::{SeriesCursor, SortedSeries};
//!
//! let series = Arc::new(SortedSeries::new(TickComparer::<i64>::new()));
//! series.set(10, 1.0)?;
//! series.set(20, 2.0)?;
//!
//! let mut cursor = SeriesCursor::new(Arc::clone(&series));
//! assert!(cursor.move_next()?);
//! assert_eq!(cursor.current(), Some((10, 1.0)));
//! assert!(cursor.move_at(&15, Lookup::Gt)?);
//! assert_eq!(cursor.current_key(), Some(20));
//! # Ok::<(), tempora_core::Error>(())
//! ```

pub mod codec;
pub mod config;
pub mod lock;
pub mod notify;
pub mod pool;
pub mod series;

mod key_store;

pub use config::{PoolConfig, SeriesConfig};
pub use lock::{VersionedLock, WriteSection};
pub use notify::{SeriesUpdate, UpdateNotifier};
pub use pool::BufferPool;
pub use series::{CursorState, SeriesCursor, SeriesIter, SortedSeries};
