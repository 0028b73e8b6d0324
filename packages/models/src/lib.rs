#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Reference entity and metric types for the cityscope livability scorer.
//!
//! Neighborhoods, points of interest, and listings are immutable reference
//! data produced by the loader. [`NeighborhoodMetrics`], [`ScoreBreakdown`],
//! and [`MetricSnapshot`] are derived by the aggregation and scoring passes.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Identifier of a neighborhood as it appears in the source data.
pub type NeighborhoodId = i64;

/// A livability score, always in `0..=100`.
pub type Score = u8;

/// A WGS84 coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
}

impl Coordinate {
    /// Creates a coordinate from latitude and longitude in degrees.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Returns `true` if both components are finite numbers.
    #[must_use]
    pub const fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }
}

/// Anything with a single geographic position.
///
/// The proximity index is generic over this trait so it can hold points of
/// interest, neighborhoods, or bare coordinates.
pub trait Located {
    /// Returns the position of this item.
    fn location(&self) -> Coordinate;
}

impl Located for Coordinate {
    fn location(&self) -> Coordinate {
        *self
    }
}

/// A neighborhood with its display center.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighborhood {
    /// Source identifier.
    pub id: NeighborhoodId,
    /// Display name.
    pub name: String,
    /// City the neighborhood belongs to.
    pub city: String,
    /// Center used for proximity queries.
    pub center: Coordinate,
}

impl Located for Neighborhood {
    fn location(&self) -> Coordinate {
        self.center
    }
}

/// The kind of a point of interest.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PoiKind {
    /// A public transit stop (GTFS `stops.txt` row).
    TransitStop,
    /// A shopping mall.
    Mall,
}

/// A transit stop or mall.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointOfInterest {
    /// Source identifier (GTFS `stop_id`, or the row ordinal for malls).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Which dataset this point came from.
    pub kind: PoiKind,
    /// Position.
    pub location: Coordinate,
}

impl Located for PointOfInterest {
    fn location(&self) -> Coordinate {
        self.location
    }
}

/// A rental listing. Only ever used in aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    /// Neighborhood the listing belongs to.
    pub neighborhood_id: NeighborhoodId,
    /// Asking rent in currency units.
    pub price: f64,
    /// Date the listing was posted, when known.
    pub listed_on: Option<NaiveDate>,
}

/// Search radii used when counting nearby points of interest.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchRadii {
    /// Radius for transit stops in kilometers.
    pub transit_km: f64,
    /// Radius for malls in kilometers.
    pub mall_km: f64,
}

impl SearchRadii {
    /// Transit stop radius used when nothing else is configured.
    pub const DEFAULT_TRANSIT_KM: f64 = 1.5;
    /// Mall radius used when nothing else is configured.
    pub const DEFAULT_MALL_KM: f64 = 3.0;

    /// Returns the radius configured for the given point-of-interest kind.
    #[must_use]
    pub const fn for_kind(&self, kind: PoiKind) -> f64 {
        match kind {
            PoiKind::TransitStop => self.transit_km,
            PoiKind::Mall => self.mall_km,
        }
    }
}

impl Default for SearchRadii {
    fn default() -> Self {
        Self {
            transit_km: Self::DEFAULT_TRANSIT_KM,
            mall_km: Self::DEFAULT_MALL_KM,
        }
    }
}

/// Raw per-neighborhood inputs to a scoring pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NeighborhoodMetrics {
    /// Neighborhood these metrics describe.
    pub neighborhood_id: NeighborhoodId,
    /// Mean listing price, `0.0` when there are no listings.
    pub avg_rent: f64,
    /// Transit stops within the transit radius of the center.
    pub transit_count: u32,
    /// Malls within the mall radius of the center.
    pub mall_count: u32,
}

/// Normalized sub-scores and the weighted composite for one neighborhood.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// `100 - normalized rent`; cheaper is better.
    pub affordability: f64,
    /// Normalized transit count.
    pub transit: f64,
    /// Normalized mall count.
    pub amenity: f64,
    /// Rounded weighted composite.
    pub score: Score,
}

impl ScoreBreakdown {
    /// Returns the display band of the composite score.
    #[must_use]
    pub const fn band(&self) -> ScoreBand {
        ScoreBand::from_score(self.score)
    }
}

/// Coarse rating bucket for a composite score.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScoreBand {
    /// Below 55.
    Poor,
    /// 55 to 74.
    Fair,
    /// 75 and above.
    Good,
}

impl ScoreBand {
    /// Lowest score in the [`ScoreBand::Good`] band.
    pub const GOOD_THRESHOLD: Score = 75;
    /// Lowest score in the [`ScoreBand::Fair`] band.
    pub const FAIR_THRESHOLD: Score = 55;

    /// Buckets a composite score.
    #[must_use]
    pub const fn from_score(score: Score) -> Self {
        if score >= Self::GOOD_THRESHOLD {
            Self::Good
        } else if score >= Self::FAIR_THRESHOLD {
            Self::Fair
        } else {
            Self::Poor
        }
    }
}

/// An immutable, timestamped record of a neighborhood's metrics and score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    /// Neighborhood the snapshot describes.
    pub neighborhood_id: NeighborhoodId,
    /// Mean listing price at capture time.
    pub avg_rent: f64,
    /// Nearby transit stop count at capture time.
    pub transit_count: u32,
    /// Nearby mall count at capture time.
    pub mall_count: u32,
    /// Composite score computed over the capture cohort.
    pub score: Score,
    /// When the scoring pass ran.
    pub captured_at: DateTime<Utc>,
}
