#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared CLI utilities for cityscope binaries.
//!
//! [`init_logger`] sets up `indicatif-log-bridge` so that `log::info!` and
//! friends are suspended while spinners redraw, and [`Spinner`] wraps the
//! `indicatif` styles the binaries use for long-running steps.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

pub use indicatif::{MultiProgress, ProgressDrawTarget};

/// A steady-ticking spinner for a step of unknown length.
pub struct Spinner {
    bar: ProgressBar,
}

impl Spinner {
    /// Adds a spinner showing `message` to `multi`.
    #[must_use]
    pub fn start(multi: &MultiProgress, message: &str) -> Self {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(message.to_string());
        Self { bar }
    }

    /// Replaces the message.
    pub fn set_message(&self, message: impl Into<String>) {
        self.bar.set_message(message.into());
    }

    /// Stops the spinner, leaving `message` on screen.
    pub fn finish(self, message: impl Into<String>) {
        self.bar.set_style(
            ProgressStyle::with_template("  {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        self.bar.finish_with_message(message.into());
    }

    /// Stops the spinner and removes it.
    pub fn finish_and_clear(self) {
        self.bar.finish_and_clear();
    }
}

/// Initializes the global logger wrapped in `indicatif-log-bridge` so that
/// `log::info!` and friends are suspended while spinners redraw.
///
/// Returns the [`MultiProgress`] that all spinners must be added to.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let logger = pretty_env_logger::formatted_builder()
        .parse_env("RUST_LOG")
        .build();
    let level = logger.filter();

    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok(); // Already set, e.g. in tests

    log::set_max_level(level);

    multi
}
