//! Core types used throughout Tempora
//!
//! This module contains the fundamental data types that form the basis
//! of Tempora's data model: lookup directions, miss positions, append
//! policies and compression selection.

use serde::{Deserialize, Serialize};

/// Direction of a keyed lookup
///
/// A lookup either demands an exact hit (`Eq`) or the nearest entry on
/// one side of the requested key. `Le`/`Ge` admit the key itself,
/// `Lt`/`Gt` exclude it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Exactly the requested key
    Eq,
    /// The largest key strictly less than the requested key
    Lt,
    /// The largest key less than or equal to the requested key
    Le,
    /// The smallest key strictly greater than the requested key
    Gt,
    /// The smallest key greater than or equal to the requested key
    Ge,
}

/// Where a missed lookup key falls relative to the live entries
///
/// Streaming consumers use this to decide whether waiting for a later
/// append can ever satisfy the lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gap {
    /// The key precedes the first entry
    BeforeFirst,
    /// The key follows the last entry (or the series is empty)
    AfterEnd,
    /// The key falls strictly between two live entries
    Inside,
}

/// Outcome of a directional lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindResult<K, V> {
    /// An entry satisfied the lookup
    Found {
        /// The entry's key
        key: K,
        /// The entry's value
        value: V,
    },
    /// No entry satisfied the lookup
    Missing(Gap),
}

impl<K, V> FindResult<K, V> {
    /// Returns the found `(key, value)` pair, discarding a miss
    pub fn ok(self) -> Option<(K, V)> {
        match self {
            FindResult::Found { key, value } => Some((key, value)),
            FindResult::Missing(_) => None,
        }
    }

    /// True iff the lookup found an entry
    pub fn is_found(&self) -> bool {
        matches!(self, FindResult::Found { .. })
    }
}

/// How appending one series to another treats overlapping keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendPolicy {
    /// Fail if the incoming series overlaps the existing one at all
    ThrowOnOverlap,
    /// Drop existing entries at or after the incoming first key, then
    /// append everything
    DropOldOverlap,
    /// Accept an overlap only if it is pointwise equal, then append the
    /// strict tail of the incoming series
    IgnoreEqualOverlap,
    /// As `IgnoreEqualOverlap`, but additionally require a non-empty
    /// overlap unless the existing series is empty
    RequireEqualOverlap,
}

/// Compression algorithms supported by the series codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionType {
    /// No compression
    None,
    /// LZ4 compression (fast, moderate compression ratio)
    Lz4,
    /// Snappy compression (very fast, lower compression ratio)
    Snappy,
}
