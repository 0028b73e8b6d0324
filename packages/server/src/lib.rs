#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for the cityscope livability scorer.
//!
//! Scores are computed at request time from the live dataset, relative to
//! the cohort the request names (every neighborhood unless `/compare`
//! narrows it). The `DuckDB` snapshot store only records history and is
//! never consulted for a current score.

mod handlers;
mod overlay;

use std::sync::{Arc, Mutex};

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use cityscope_config::{Config, ProximityConfig};
use cityscope_database::{DbError, snapshots};
use cityscope_dataset::{DataPaths, DatasetError, DatasetStore};

/// Errors that can stop the server from starting.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Reference data could not be loaded.
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    /// The snapshot store could not be opened.
    #[error(transparent)]
    Db(#[from] DbError),

    /// The HTTP server failed to bind or run.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared application state.
pub struct AppState {
    /// Reloadable reference data.
    pub datasets: Arc<DatasetStore>,
    /// Where reloads read reference data from.
    pub data_paths: DataPaths,
    /// Search radii and result cap.
    pub proximity: ProximityConfig,
    /// Snapshot history store.
    /// `duckdb::Connection` is `Send` but not `Sync`, so a `Mutex` is needed.
    pub snapshots: Arc<Mutex<duckdb::Connection>>,
}

impl AppState {
    /// Loads the reference data and opens the snapshot store named by
    /// `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] if the data files cannot be read or the
    /// snapshot database cannot be opened.
    pub fn from_config(config: &Config) -> Result<Self, ServerError> {
        let data_paths = DataPaths::from_config(&config.data);

        log::info!("Loading reference data from {}...", config.data.dir.display());
        let datasets = DatasetStore::open(&data_paths)?;

        log::info!(
            "Opening snapshot database at {}...",
            config.database.path.display()
        );
        let conn = snapshots::open(&config.database.path)?;

        Ok(Self {
            datasets: Arc::new(datasets),
            data_paths,
            proximity: config.proximity,
            snapshots: Arc::new(Mutex::new(conn)),
        })
    }
}

/// Registers the `/api` routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(handlers::health))
            .route("/neighborhoods", web::get().to(handlers::neighborhoods))
            .route(
                "/neighborhoods/{id}/summary",
                web::get().to(handlers::summary),
            )
            .route(
                "/neighborhoods/{id}/history",
                web::get().to(handlers::history),
            )
            .route("/neighborhoods/{id}/stops", web::get().to(handlers::stops))
            .route("/neighborhoods/{id}/malls", web::get().to(handlers::malls))
            .route("/compare", web::get().to(handlers::compare))
            .route("/snapshots", web::post().to(handlers::record_snapshots))
            .route("/reload", web::post().to(handlers::reload)),
    );
}

/// Starts the cityscope API server.
///
/// Loads the reference data, opens the snapshot store, and serves the API
/// on the configured address. This is a regular async function; the caller
/// provides the runtime (e.g. via `#[actix_web::main]`).
///
/// # Errors
///
/// Returns [`ServerError`] if startup fails or the HTTP server fails to
/// bind or encounters a runtime error.
#[allow(clippy::future_not_send)]
pub async fn run_server(config: Config) -> Result<(), ServerError> {
    let state = web::Data::new(AppState::from_config(&config)?);

    let bind_addr = config.server.bind_addr;
    let port = config.server.port;

    log::info!("Starting server on {bind_addr}:{port}");

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((bind_addr, port))?
    .run()
    .await?;

    Ok(())
}
