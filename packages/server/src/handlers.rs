//! HTTP handler functions for the cityscope API.

use std::fmt::Display;
use std::sync::PoisonError;

use actix_web::{HttpResponse, web};
use chrono::{SubsecRound as _, Utc};
use cityscope_database::snapshots;
use cityscope_dataset::Dataset;
use cityscope_models::{NeighborhoodId, PoiKind, SearchRadii};
use cityscope_scoring::compute_breakdowns;
use cityscope_server_models::{
    ApiHealth, ApiNeighborhoodScore, ApiNeighborhoodSummary, ApiPoi, ApiSnapshot,
    CompareQueryParams, HistoryQueryParams, NearbyQueryParams, ResponseFormat,
};

use crate::{AppState, overlay};

/// `GET /api/health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /api/neighborhoods`
///
/// Every neighborhood scored against the full cohort.
pub async fn neighborhoods(state: web::Data<AppState>) -> HttpResponse {
    let dataset = state.datasets.current();
    HttpResponse::Ok().json(scored(&dataset, &[], state.proximity.radii()))
}

/// `GET /api/neighborhoods/{id}/summary`
///
/// The live full-cohort score, alongside the last recorded snapshot.
pub async fn summary(state: web::Data<AppState>, path: web::Path<NeighborhoodId>) -> HttpResponse {
    let id = path.into_inner();
    let dataset = state.datasets.current();

    let Some(score) = scored(&dataset, &[], state.proximity.radii())
        .into_iter()
        .find(|s| s.id == id)
    else {
        return not_found(id);
    };

    let db = state.snapshots.clone();
    let result = web::block(move || {
        let conn = db.lock().unwrap_or_else(PoisonError::into_inner);
        snapshots::latest(&conn, id)
    })
    .await;

    match result {
        Ok(Ok(last)) => HttpResponse::Ok().json(ApiNeighborhoodSummary {
            score,
            last_snapshot: last.map(ApiSnapshot::from),
        }),
        Ok(Err(e)) => internal_error("Failed to query latest snapshot", e),
        Err(e) => internal_error("Failed to query latest snapshot", e),
    }
}

/// `GET /api/neighborhoods/{id}/history`
///
/// Persisted snapshots, newest first.
pub async fn history(
    state: web::Data<AppState>,
    path: web::Path<NeighborhoodId>,
    params: web::Query<HistoryQueryParams>,
) -> HttpResponse {
    let id = path.into_inner();

    if state.datasets.current().neighborhood(id).is_none() {
        return not_found(id);
    }

    let db = state.snapshots.clone();
    let limit = params.limit;
    let result = web::block(move || {
        let conn = db.lock().unwrap_or_else(PoisonError::into_inner);
        snapshots::history(&conn, id, limit)
    })
    .await;

    match result {
        Ok(Ok(rows)) => {
            let api: Vec<ApiSnapshot> = rows.into_iter().map(ApiSnapshot::from).collect();
            HttpResponse::Ok().json(api)
        }
        Ok(Err(e)) => internal_error("Failed to query snapshot history", e),
        Err(e) => internal_error("Failed to query snapshot history", e),
    }
}

/// `GET /api/neighborhoods/{id}/stops`
pub async fn stops(
    state: web::Data<AppState>,
    path: web::Path<NeighborhoodId>,
    params: web::Query<NearbyQueryParams>,
) -> HttpResponse {
    nearby(&state, path.into_inner(), PoiKind::TransitStop, &params)
}

/// `GET /api/neighborhoods/{id}/malls`
pub async fn malls(
    state: web::Data<AppState>,
    path: web::Path<NeighborhoodId>,
    params: web::Query<NearbyQueryParams>,
) -> HttpResponse {
    nearby(&state, path.into_inner(), PoiKind::Mall, &params)
}

/// `GET /api/compare`
///
/// Scores only the requested neighborhoods, relative to each other.
pub async fn compare(
    state: web::Data<AppState>,
    params: web::Query<CompareQueryParams>,
) -> HttpResponse {
    let ids = params.parse_ids();
    let dataset = state.datasets.current();
    HttpResponse::Ok().json(scored(&dataset, &ids, state.proximity.radii()))
}

/// `POST /api/snapshots`
///
/// Runs a full-cohort scoring pass and appends the results to history.
pub async fn record_snapshots(state: web::Data<AppState>) -> HttpResponse {
    let dataset = state.datasets.current();
    let cohort = dataset.cohort_metrics(&[], state.proximity.radii());
    let batch = cityscope_scoring::snapshots(&cohort, Utc::now().trunc_subsecs(3));

    let db = state.snapshots.clone();
    let to_store = batch.clone();
    let result = web::block(move || {
        let conn = db.lock().unwrap_or_else(PoisonError::into_inner);
        snapshots::append(&conn, &to_store)
    })
    .await;

    match result {
        Ok(Ok(_)) => {
            let api: Vec<ApiSnapshot> = batch.into_iter().map(ApiSnapshot::from).collect();
            HttpResponse::Ok().json(api)
        }
        Ok(Err(e)) => internal_error("Failed to record snapshots", e),
        Err(e) => internal_error("Failed to record snapshots", e),
    }
}

/// `POST /api/reload`
///
/// Re-reads the reference data files and swaps the new dataset in.
pub async fn reload(state: web::Data<AppState>) -> HttpResponse {
    let datasets = state.datasets.clone();
    let paths = state.data_paths.clone();
    let result = web::block(move || datasets.reload(&paths)).await;

    match result {
        Ok(Ok(summary)) => HttpResponse::Ok().json(summary),
        Ok(Err(e)) => internal_error("Failed to reload reference data", e),
        Err(e) => internal_error("Failed to reload reference data", e),
    }
}

/// Scores a cohort and joins each result with its neighborhood, in cohort
/// order.
fn scored(
    dataset: &Dataset,
    ids: &[NeighborhoodId],
    radii: SearchRadii,
) -> Vec<ApiNeighborhoodScore> {
    let cohort = dataset.cohort_metrics(ids, radii);
    let breakdowns = compute_breakdowns(&cohort);

    cohort
        .iter()
        .filter_map(|metrics| {
            let neighborhood = dataset.neighborhood(metrics.neighborhood_id)?;
            let breakdown = breakdowns.get(&metrics.neighborhood_id)?;
            Some(ApiNeighborhoodScore::new(neighborhood, metrics, breakdown))
        })
        .collect()
}

fn nearby(
    state: &AppState,
    id: NeighborhoodId,
    kind: PoiKind,
    params: &NearbyQueryParams,
) -> HttpResponse {
    let radius_km = params
        .radius_km
        .unwrap_or_else(|| state.proximity.radii().for_kind(kind));
    let max = state.proximity.max_results;
    let limit = params.limit.map_or(max, |l| l.min(max));

    let dataset = state.datasets.current();
    let Some(matches) = dataset.nearby(id, kind, radius_km, limit) else {
        return not_found(id);
    };

    let pois: Vec<ApiPoi> = matches
        .iter()
        .map(|m| ApiPoi::new(m.item, m.distance_km))
        .collect();

    match params.format {
        ResponseFormat::Json => HttpResponse::Ok().json(pois),
        ResponseFormat::Geojson => HttpResponse::Ok()
            .content_type("application/geo+json")
            .body(overlay::feature_collection(&pois).to_string()),
    }
}

fn not_found(id: NeighborhoodId) -> HttpResponse {
    HttpResponse::NotFound().json(serde_json::json!({
        "error": format!("Unknown neighborhood {id}")
    }))
}

fn internal_error(message: &str, e: impl Display) -> HttpResponse {
    log::error!("{message}: {e}");
    HttpResponse::InternalServerError().json(serde_json::json!({
        "error": message
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use actix_web::{App, http::StatusCode, test};
    use cityscope_config::ProximityConfig;
    use cityscope_dataset::{DataPaths, DatasetStore, DatasetSummary};
    use cityscope_models::{Coordinate, Listing, Neighborhood, PointOfInterest, ScoreBand};

    use super::*;

    fn neighborhood(id: NeighborhoodId, name: &str, lat: f64, lon: f64) -> Neighborhood {
        Neighborhood {
            id,
            name: name.to_string(),
            city: "Vancouver".to_string(),
            center: Coordinate::new(lat, lon),
        }
    }

    fn listing(neighborhood_id: NeighborhoodId, price: f64) -> Listing {
        Listing {
            neighborhood_id,
            price,
            listed_on: None,
        }
    }

    fn poi(id: &str, kind: PoiKind, lat: f64, lon: f64) -> PointOfInterest {
        PointOfInterest {
            id: id.to_string(),
            name: format!("Point {id}"),
            kind,
            location: Coordinate::new(lat, lon),
        }
    }

    /// Downtown has both stops and the mall; Kitsilano is cheaper but has
    /// neither; Strathcona has no listings.
    fn dataset() -> Dataset {
        Dataset::new(
            vec![
                neighborhood(1, "Downtown", 49.2827, -123.1207),
                neighborhood(2, "Kitsilano", 49.2684, -123.1683),
                neighborhood(3, "Strathcona", 49.2776, -123.0888),
            ],
            vec![listing(1, 3000.0), listing(2, 1500.0)],
            vec![
                poi("50001", PoiKind::TransitStop, 49.2859, -123.1116),
                poi("50002", PoiKind::TransitStop, 49.2832, -123.1163),
            ],
            vec![poi("900", PoiKind::Mall, 49.2826, -123.1183)],
        )
    }

    fn state(paths: DataPaths) -> web::Data<AppState> {
        web::Data::new(AppState {
            datasets: Arc::new(DatasetStore::new(dataset())),
            data_paths: paths,
            proximity: ProximityConfig::default(),
            snapshots: Arc::new(Mutex::new(snapshots::open_in_memory().unwrap())),
        })
    }

    fn default_state() -> web::Data<AppState> {
        state(DataPaths::in_dir(&std::env::temp_dir().join("cityscope-server-unused")))
    }

    #[actix_web::test]
    async fn health_reports_version() {
        let app = test::init_service(App::new().configure(crate::configure)).await;
        let req = test::TestRequest::get().uri("/api/health").to_request();
        let body: ApiHealth = test::call_and_read_body_json(&app, req).await;
        assert!(body.healthy);
        assert_eq!(body.version, env!("CARGO_PKG_VERSION"));
    }

    #[actix_web::test]
    async fn lists_full_cohort_scores() {
        let app = test::init_service(
            App::new()
                .app_data(default_state())
                .configure(crate::configure),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/neighborhoods").to_request();
        let body: Vec<ApiNeighborhoodScore> = test::call_and_read_body_json(&app, req).await;

        let ids: Vec<_> = body.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(body[0].transit_count, 2);
        assert_eq!(body[0].mall_count, 1);
        assert_eq!(body[1].transit_count, 0);
        assert!(body.iter().all(|s| s.score <= 100));
    }

    #[actix_web::test]
    async fn summary_scores_against_full_cohort() {
        let app = test::init_service(
            App::new()
                .app_data(default_state())
                .configure(crate::configure),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/neighborhoods/1/summary")
            .to_request();
        let body: ApiNeighborhoodScore = test::call_and_read_body_json(&app, req).await;

        // Most expensive, most stops, and tied for most malls.
        assert_eq!(body.name, "Downtown");
        assert!(body.affordability.abs() < 1e-9);
        assert!((body.transit - 100.0).abs() < 1e-9);
        assert!((body.amenity - 100.0).abs() < 1e-9);
        assert_eq!(body.score, 45);
        assert_eq!(body.band, ScoreBand::Poor);
    }

    #[actix_web::test]
    async fn unknown_neighborhood_is_not_found() {
        let app = test::init_service(
            App::new()
                .app_data(default_state())
                .configure(crate::configure),
        )
        .await;

        for uri in [
            "/api/neighborhoods/42/summary",
            "/api/neighborhoods/42/history",
            "/api/neighborhoods/42/stops",
            "/api/neighborhoods/42/malls",
        ] {
            let req = test::TestRequest::get().uri(uri).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{uri}");
        }
    }

    #[actix_web::test]
    async fn compare_scores_relative_to_requested_ids() {
        let app = test::init_service(
            App::new()
                .app_data(default_state())
                .configure(crate::configure),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/compare?ids=2,1,1,99")
            .to_request();
        let body: Vec<ApiNeighborhoodScore> = test::call_and_read_body_json(&app, req).await;

        let scores: Vec<_> = body.iter().map(|s| (s.id, s.score)).collect();
        assert_eq!(scores, vec![(2, 55), (1, 45)]);
        assert_eq!(body[0].band, ScoreBand::Fair);

        let req = test::TestRequest::get().uri("/api/compare").to_request();
        let all: Vec<ApiNeighborhoodScore> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(all.len(), 3);
    }

    #[actix_web::test]
    async fn stops_are_nearest_first_and_capped() {
        let app = test::init_service(
            App::new()
                .app_data(default_state())
                .configure(crate::configure),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/neighborhoods/1/stops")
            .to_request();
        let body: Vec<ApiPoi> = test::call_and_read_body_json(&app, req).await;
        let ids: Vec<_> = body.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["50002", "50001"]);
        assert!(body[0].distance_km <= body[1].distance_km);

        let req = test::TestRequest::get()
            .uri("/api/neighborhoods/1/stops?limit=1")
            .to_request();
        let body: Vec<ApiPoi> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.len(), 1);
        assert_eq!(body[0].id, "50002");

        let req = test::TestRequest::get()
            .uri("/api/neighborhoods/2/stops?radiusKm=10")
            .to_request();
        let body: Vec<ApiPoi> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.len(), 2);

        let req = test::TestRequest::get()
            .uri("/api/neighborhoods/1/stops?radiusKm=-1")
            .to_request();
        let body: Vec<ApiPoi> = test::call_and_read_body_json(&app, req).await;
        assert!(body.is_empty());
    }

    #[actix_web::test]
    async fn malls_render_as_geojson() {
        let app = test::init_service(
            App::new()
                .app_data(default_state())
                .configure(crate::configure),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/neighborhoods/1/malls?format=geojson")
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["type"], "FeatureCollection");
        assert_eq!(body["features"].as_array().map(Vec::len), Some(1));
        assert_eq!(body["features"][0]["properties"]["kind"], "mall");
    }

    #[actix_web::test]
    async fn recorded_snapshots_show_up_in_history() {
        let app = test::init_service(
            App::new()
                .app_data(default_state())
                .configure(crate::configure),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/neighborhoods/1/history")
            .to_request();
        let body: Vec<ApiSnapshot> = test::call_and_read_body_json(&app, req).await;
        assert!(body.is_empty());

        let req = test::TestRequest::post().uri("/api/snapshots").to_request();
        let recorded: Vec<ApiSnapshot> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(recorded.len(), 3);

        let req = test::TestRequest::get()
            .uri("/api/neighborhoods/1/history?limit=5")
            .to_request();
        let body: Vec<ApiSnapshot> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.len(), 1);
        assert_eq!(body[0].score, 45);
        assert_eq!(body[0].transit_count, 2);
        assert_eq!(body[0].captured_at, recorded[0].captured_at);
    }

    #[actix_web::test]
    async fn summary_carries_last_recorded_snapshot() {
        let app = test::init_service(
            App::new()
                .app_data(default_state())
                .configure(crate::configure),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/neighborhoods/1/summary")
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert!(body["lastSnapshot"].is_null());
        assert_eq!(body["score"], 45);

        let req = test::TestRequest::post().uri("/api/snapshots").to_request();
        let recorded: Vec<ApiSnapshot> = test::call_and_read_body_json(&app, req).await;

        let req = test::TestRequest::get()
            .uri("/api/neighborhoods/1/summary")
            .to_request();
        let body: ApiNeighborhoodSummary = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.score.name, "Downtown");
        let last = body.last_snapshot.unwrap();
        assert_eq!(last.score, 45);
        assert_eq!(last.captured_at, recorded[0].captured_at);
    }

    #[actix_web::test]
    async fn reload_swaps_in_files_from_disk() {
        let dir = std::env::temp_dir().join(format!("cityscope-server-reload-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("neighborhoods.csv"),
            "id,name,city,centerLat,centerLng\n7,Gastown,Vancouver,49.2835,-123.1090\n",
        )
        .unwrap();

        let app = test::init_service(
            App::new()
                .app_data(state(DataPaths::in_dir(&dir)))
                .configure(crate::configure),
        )
        .await;

        let req = test::TestRequest::post().uri("/api/reload").to_request();
        let summary: DatasetSummary = test::call_and_read_body_json(&app, req).await;
        assert_eq!(summary.neighborhoods, 1);
        assert_eq!(summary.stops, 0);

        let req = test::TestRequest::get().uri("/api/neighborhoods").to_request();
        let body: Vec<ApiNeighborhoodScore> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.len(), 1);
        assert_eq!(body[0].id, 7);
        assert_eq!(body[0].score, 50);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
