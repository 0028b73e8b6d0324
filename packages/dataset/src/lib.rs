#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Reference data for the cityscope scorer.
//!
//! [`loader`] parses the neighborhood, listing, GTFS stop, and mall files,
//! dropping malformed rows instead of failing. [`Dataset`] is the immutable
//! in-memory view built from them, with R-tree proximity indexes and
//! per-neighborhood rent aggregates. [`DatasetStore`] is the process-wide
//! handle that swaps in a freshly loaded dataset atomically.

pub mod dataset;
pub mod loader;
pub mod store;

use std::path::{Path, PathBuf};

use cityscope_config::DataConfig;

pub use dataset::{Dataset, DatasetSummary, RentStats};
pub use store::DatasetStore;

/// Errors that can occur while loading reference data.
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    /// A data file exists but could not be read as CSV.
    #[error("CSV error in {path}: {source}")]
    Csv {
        /// Path to the CSV file.
        path: String,
        /// Underlying CSV error.
        source: csv::Error,
    },
}

/// Locations of the four reference data files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    /// Neighborhood list.
    pub neighborhoods: PathBuf,
    /// Rent listings.
    pub listings: PathBuf,
    /// GTFS `stops.txt`.
    pub stops: PathBuf,
    /// Mall locations.
    pub malls: PathBuf,
}

impl DataPaths {
    /// Resolves the configured file names against the configured directory.
    #[must_use]
    pub fn from_config(config: &DataConfig) -> Self {
        Self {
            neighborhoods: config.resolve(&config.neighborhoods),
            listings: config.resolve(&config.listings),
            stops: config.resolve(&config.stops),
            malls: config.resolve(&config.malls),
        }
    }

    /// Default file names inside `dir`.
    #[must_use]
    pub fn in_dir(dir: &Path) -> Self {
        Self::from_config(&DataConfig {
            dir: dir.to_path_buf(),
            ..DataConfig::default()
        })
    }
}
