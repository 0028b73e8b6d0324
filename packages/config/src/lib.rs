#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Configuration for the cityscope toolchain.
//!
//! Settings are read from a TOML file (`cityscope.toml` unless
//! `CITYSCOPE_CONFIG` points elsewhere). Every field has a default, so a
//! missing file is not an error. A handful of environment variables
//! (`BIND_ADDR`, `PORT`, `CITYSCOPE_DATA_DIR`, `CITYSCOPE_DB_PATH`) override
//! the file after it is parsed.

use std::path::{Path, PathBuf};

use cityscope_models::SearchRadii;
use serde::{Deserialize, Serialize};

/// Config file used when neither a path nor `CITYSCOPE_CONFIG` is given.
pub const DEFAULT_CONFIG_PATH: &str = "cityscope.toml";

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("I/O error reading {path}: {source}")]
    Io {
        /// Path of the config file.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`Config`].
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A value parsed but is out of range.
    #[error("Invalid config: {message}")]
    Invalid {
        /// Description of what went wrong.
        message: String,
    },
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Reference data file locations.
    pub data: DataConfig,
    /// Proximity search policy.
    pub proximity: ProximityConfig,
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Snapshot history store settings.
    pub database: DatabaseConfig,
}

/// Locations of the reference data files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DataConfig {
    /// Directory the file names below are resolved against.
    pub dir: PathBuf,
    /// Neighborhood list (`id,name,city,centerLat,centerLng`).
    pub neighborhoods: PathBuf,
    /// Rent listings (`id,neighborhoodId,price,dateListed`).
    pub listings: PathBuf,
    /// GTFS `stops.txt`.
    pub stops: PathBuf,
    /// Mall locations exported from OSM.
    pub malls: PathBuf,
}

impl DataConfig {
    /// Resolves a data file name against [`DataConfig::dir`].
    #[must_use]
    pub fn resolve(&self, file: &Path) -> PathBuf {
        self.dir.join(file)
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/real"),
            neighborhoods: PathBuf::from("neighborhoods.csv"),
            listings: PathBuf::from("listings.csv"),
            stops: PathBuf::from("stops.txt"),
            malls: PathBuf::from("malls.csv"),
        }
    }
}

/// Radii for counting nearby points and the cap on returned matches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProximityConfig {
    /// Transit stop search radius in kilometers.
    pub transit_radius_km: f64,
    /// Mall search radius in kilometers.
    pub mall_radius_km: f64,
    /// Maximum number of points returned for display.
    pub max_results: usize,
}

impl ProximityConfig {
    /// Default cap on points returned for display.
    pub const DEFAULT_MAX_RESULTS: usize = 1000;

    /// The radii used for counting.
    #[must_use]
    pub const fn radii(&self) -> SearchRadii {
        SearchRadii {
            transit_km: self.transit_radius_km,
            mall_km: self.mall_radius_km,
        }
    }
}

impl Default for ProximityConfig {
    fn default() -> Self {
        let radii = SearchRadii::default();
        Self {
            transit_radius_km: radii.transit_km,
            mall_radius_km: radii.mall_km,
            max_results: Self::DEFAULT_MAX_RESULTS,
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind.
    pub bind_addr: String,
    /// Port to bind.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: 4000,
        }
    }
}

/// Snapshot history store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// `DuckDB` file holding metric snapshots.
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/cityscope.duckdb"),
        }
    }
}

impl Config {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the TOML is malformed or a value is out of
    /// range.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::de::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from `path`, `CITYSCOPE_CONFIG`, or
    /// [`DEFAULT_CONFIG_PATH`], then applies environment overrides.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file exists but cannot be read or
    /// parsed, or if the final values are out of range.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map_or_else(
            || {
                std::env::var("CITYSCOPE_CONFIG")
                    .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
            },
            Path::to_path_buf,
        );

        let mut config = if path.exists() {
            log::info!("Loading config from {}", path.display());
            let contents = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io {
                path: path.display().to_string(),
                source: e,
            })?;
            Self::from_toml_str(&contents)?
        } else {
            log::info!("No config at {}, using defaults", path.display());
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Applies `BIND_ADDR`, `PORT`, `CITYSCOPE_DATA_DIR`, and
    /// `CITYSCOPE_DB_PATH` as returned by `lookup`.
    ///
    /// An unparseable `PORT` is logged and ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(addr) = lookup("BIND_ADDR") {
            self.server.bind_addr = addr;
        }

        if let Some(port) = lookup("PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(e) => log::warn!("Ignoring PORT={port}: {e}"),
            }
        }

        if let Some(dir) = lookup("CITYSCOPE_DATA_DIR") {
            self.data.dir = PathBuf::from(dir);
        }

        if let Some(path) = lookup("CITYSCOPE_DB_PATH") {
            self.database.path = PathBuf::from(path);
        }
    }

    /// Checks that radii are finite and non-negative.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("proximity.transit_radius_km", self.proximity.transit_radius_km),
            ("proximity.mall_radius_km", self.proximity.mall_radius_km),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid {
                    message: format!("{name} must be a finite, non-negative number, got {value}"),
                });
            }
        }
        Ok(())
    }
}
