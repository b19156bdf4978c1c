//! Error types for Tempora
//!
//! This module defines the error types used throughout Tempora.

use thiserror::Error;

/// The main error type for Tempora operations
#[derive(Error, Debug)]
pub enum Error {
    /// An I/O error occurred
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A serialization/deserialization error occurred
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The requested key was not found
    #[error("Key not found")]
    KeyNotFound,

    /// The series has no entries
    #[error("Series is empty")]
    Empty,

    /// A key violated the strict ordering of the series, or a cursor
    /// observed a structural change and was invalidated
    #[error("Key out of order")]
    OutOfOrder,

    /// The key is already present in the series
    #[error("Duplicate key")]
    DuplicateKey,

    /// A mutation was attempted on a sealed series
    #[error("Series is sealed")]
    Sealed,

    /// An append required the overlapping region to match and it did not
    #[error("Overlap mismatch")]
    OverlapMismatch,

    /// Data corruption was detected
    #[error("Corruption detected: {0}")]
    Corruption(String),
}

/// A specialized Result type for Tempora operations
pub type Result<T> = std::result::Result<T, Error>;
