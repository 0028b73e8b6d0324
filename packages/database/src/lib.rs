#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Persistent history of per-neighborhood metric snapshots.
//!
//! Snapshots are appended to a local `DuckDB` file and never rewritten.
//! Scores served to clients are always recomputed from the live cohort;
//! the rows stored here only record what a neighborhood looked like at a
//! point in time.

pub mod paths;
pub mod snapshots;

/// Errors that can occur during snapshot store operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// `DuckDB` query or connection error.
    #[error("DuckDB error: {0}")]
    Duckdb(#[from] duckdb::Error),

    /// Filesystem error preparing the database location.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored value does not fit the model type.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}
