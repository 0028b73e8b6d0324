#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Standalone entry point for the cityscope API server.
//!
//! Reads configuration from `CITYSCOPE_CONFIG` (or `cityscope.toml`) and
//! the usual environment overrides, then serves until interrupted.

use cityscope_config::Config;

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let config = Config::load(None)?;
    cityscope_server::run_server(config).await?;

    Ok(())
}
