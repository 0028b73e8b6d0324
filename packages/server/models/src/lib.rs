#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the cityscope server.
//!
//! These types are serialized to JSON for the REST API. They are kept
//! separate from the model types so the wire contract can evolve on its
//! own.

use chrono::{DateTime, Utc};
use cityscope_models::{
    MetricSnapshot, Neighborhood, NeighborhoodId, NeighborhoodMetrics, PoiKind, PointOfInterest,
    Score, ScoreBand, ScoreBreakdown,
};
use serde::{Deserialize, Serialize};

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHealth {
    /// Whether the server is healthy.
    pub healthy: bool,
    /// Server version.
    pub version: String,
}

/// A neighborhood with its live metrics and cohort-relative score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiNeighborhoodScore {
    /// Neighborhood id.
    pub id: NeighborhoodId,
    /// Display name.
    pub name: String,
    /// City.
    pub city: String,
    /// Center latitude.
    pub lat: f64,
    /// Center longitude.
    pub lng: f64,
    /// Mean listing price (`0` when the neighborhood has no listings).
    pub avg_rent: f64,
    /// Transit stops within the transit radius.
    pub transit_count: u32,
    /// Malls within the mall radius.
    pub mall_count: u32,
    /// Affordability sub-score (0-100).
    pub affordability: f64,
    /// Transit sub-score (0-100).
    pub transit: f64,
    /// Amenity sub-score (0-100).
    pub amenity: f64,
    /// Composite score (0-100).
    pub score: Score,
    /// Display band of the composite score.
    pub band: ScoreBand,
}

impl ApiNeighborhoodScore {
    /// Combines a neighborhood with its metrics and breakdown.
    #[must_use]
    pub fn new(
        neighborhood: &Neighborhood,
        metrics: &NeighborhoodMetrics,
        breakdown: &ScoreBreakdown,
    ) -> Self {
        Self {
            id: neighborhood.id,
            name: neighborhood.name.clone(),
            city: neighborhood.city.clone(),
            lat: neighborhood.center.latitude,
            lng: neighborhood.center.longitude,
            avg_rent: metrics.avg_rent,
            transit_count: metrics.transit_count,
            mall_count: metrics.mall_count,
            affordability: breakdown.affordability,
            transit: breakdown.transit,
            amenity: breakdown.amenity,
            score: breakdown.score,
            band: breakdown.band(),
        }
    }
}

/// A transit stop or mall near a neighborhood.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiPoi {
    /// Source identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Point kind.
    pub kind: PoiKind,
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lng: f64,
    /// Great-circle distance from the neighborhood center.
    pub distance_km: f64,
}

impl ApiPoi {
    /// Builds the API form of a matched point.
    #[must_use]
    pub fn new(poi: &PointOfInterest, distance_km: f64) -> Self {
        Self {
            id: poi.id.clone(),
            name: poi.name.clone(),
            kind: poi.kind,
            lat: poi.location.latitude,
            lng: poi.location.longitude,
            distance_km,
        }
    }
}

/// A persisted metric snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSnapshot {
    /// Neighborhood id.
    pub neighborhood_id: NeighborhoodId,
    /// Mean listing price at capture time.
    pub avg_rent: f64,
    /// Transit stop count at capture time.
    pub transit_count: u32,
    /// Mall count at capture time.
    pub mall_count: u32,
    /// Composite score at capture time.
    pub score: Score,
    /// When the scoring pass ran (ISO 8601).
    pub captured_at: DateTime<Utc>,
}

impl From<MetricSnapshot> for ApiSnapshot {
    fn from(s: MetricSnapshot) -> Self {
        Self {
            neighborhood_id: s.neighborhood_id,
            avg_rent: s.avg_rent,
            transit_count: s.transit_count,
            mall_count: s.mall_count,
            score: s.score,
            captured_at: s.captured_at,
        }
    }
}

/// A neighborhood's live score plus its most recent recorded snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiNeighborhoodSummary {
    /// Live full-cohort score.
    #[serde(flatten)]
    pub score: ApiNeighborhoodScore,
    /// Latest stored snapshot, `null` before the first scoring pass.
    pub last_snapshot: Option<ApiSnapshot>,
}

/// Response format of the nearby-points endpoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    /// A JSON array of [`ApiPoi`].
    #[default]
    Json,
    /// A `GeoJSON` `FeatureCollection` of points.
    Geojson,
}

/// Query parameters for the nearby stops and malls endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyQueryParams {
    /// Search radius in kilometers. Defaults to the configured radius for
    /// the point kind.
    pub radius_km: Option<f64>,
    /// Maximum number of points, capped by the configured maximum.
    pub limit: Option<usize>,
    /// Response format.
    #[serde(default)]
    pub format: ResponseFormat,
}

/// Query parameters for the history endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQueryParams {
    /// Maximum number of snapshots.
    pub limit: Option<usize>,
}

/// Query parameters for the compare endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareQueryParams {
    /// Comma-separated neighborhood ids forming the cohort.
    pub ids: Option<String>,
}

impl CompareQueryParams {
    /// Parses [`Self::ids`], skipping entries that are not integers.
    ///
    /// A missing or empty list yields no ids, which the server treats as
    /// the full cohort.
    #[must_use]
    pub fn parse_ids(&self) -> Vec<NeighborhoodId> {
        self.ids
            .as_deref()
            .map(|s| s.split(',').filter_map(|id| id.trim().parse().ok()).collect())
            .unwrap_or_default()
    }
}
