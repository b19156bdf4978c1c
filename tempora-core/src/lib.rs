//! Core types and traits for Tempora
//!
//! This crate contains the fundamental types and error handling used
//! throughout the Tempora project. It provides:
//!
//! - Common error types with [`Error`] and [`Result`]
//! - Lookup directions, miss positions and append policies
//! - The [`KeyComparer`] trait with its optional diffable capability
//!
//! # Example
//!
//! ```
//! use tempora_core::{KeyComparer, Lookup, TickComparer};
//!
//! let cmp = TickComparer::<i64>::new();
//! assert!(cmp.is_diffable());
//! assert_eq!(cmp.diff(&30, &10), 20);
//! let dir = Lookup::Ge;
//! assert_eq!(dir, Lookup::Ge);
//! ```

pub mod comparer;
pub mod error;
pub mod types;

pub use comparer::{DefaultComparer, DiffableKey, KeyComparer, TickComparer};
pub use error::{Error, Result};
pub use types::*;
