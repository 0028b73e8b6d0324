#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! In-memory proximity index for points of interest.
//!
//! Answers "which points lie within `radius_km` of this center?" using
//! haversine great-circle distance on a 6371 km sphere. A point is a match
//! iff its distance is `<= radius_km`. Two implementations share the
//! [`ProximityIndex`] contract: [`LinearIndex`] scans every point, and
//! [`RTreeIndex`] narrows candidates with an R-tree envelope before applying
//! the same distance predicate, so both return the same set.

use std::f64::consts::FRAC_PI_2;

use cityscope_models::{Coordinate, Located};
use rstar::primitives::GeomWithData;
use rstar::{AABB, RTree};

/// Mean earth radius used by the haversine formula, in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Slack added to R-tree envelopes so boundary points survive rounding.
const ENVELOPE_MARGIN_DEG: f64 = 1e-6;

/// Great-circle distance between two coordinates in kilometers.
///
/// `a = sin²(Δlat/2) + cos(lat1)·cos(lat2)·sin²(Δlon/2)`,
/// `d = 2·R·asin(√a)`.
#[must_use]
#[allow(clippy::suboptimal_flops)]
pub fn haversine_km(from: Coordinate, to: Coordinate) -> f64 {
    // sin² is even, so the absolute deltas keep the result exactly symmetric.
    let d_lat = (to.latitude - from.latitude).abs().to_radians();
    let d_lon = (to.longitude - from.longitude).abs().to_radians();
    let s1 = (d_lat / 2.0).sin();
    let s2 = (d_lon / 2.0).sin();
    let a = s1 * s1 + from.latitude.to_radians().cos() * to.latitude.to_radians().cos() * s2 * s2;
    2.0 * EARTH_RADIUS_KM * a.clamp(0.0, 1.0).sqrt().asin()
}

/// Returns `true` if `radius_km` can match anything.
///
/// Negative and `NaN` radii are treated as an empty query rather than an
/// error.
#[must_use]
pub fn is_valid_radius(radius_km: f64) -> bool {
    radius_km >= 0.0
}

/// Linear-scan proximity filter over a slice.
///
/// Returns every point whose haversine distance from `center` is
/// `<= radius_km`, in input order. An invalid radius or a non-finite center
/// yields an empty result.
#[must_use]
pub fn find_within<T: Located>(center: Coordinate, radius_km: f64, points: &[T]) -> Vec<&T> {
    if !is_valid_radius(radius_km) || !center.is_finite() {
        return Vec::new();
    }

    points
        .iter()
        .filter(|p| haversine_km(center, p.location()) <= radius_km)
        .collect()
}

/// A match returned by [`ProximityIndex::nearest_within`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Nearby<'a, T> {
    /// The matched item.
    pub item: &'a T,
    /// Haversine distance from the query center.
    pub distance_km: f64,
}

/// Spatial lookup over a fixed set of located items.
pub trait ProximityIndex<T: Located> {
    /// All indexed items within `radius_km` of `center` (inclusive).
    ///
    /// Ordering is unspecified.
    fn find_within(&self, center: Coordinate, radius_km: f64) -> Vec<&T>;

    /// Every indexed item, in insertion order.
    fn items(&self) -> &[T];

    /// Number of items within `radius_km` of `center`.
    fn count_within(&self, center: Coordinate, radius_km: f64) -> usize {
        self.find_within(center, radius_km).len()
    }

    /// Matches sorted by ascending distance, truncated to `limit`.
    fn nearest_within(&self, center: Coordinate, radius_km: f64, limit: usize) -> Vec<Nearby<'_, T>> {
        let mut matches: Vec<Nearby<'_, T>> = self
            .find_within(center, radius_km)
            .into_iter()
            .map(|item| Nearby {
                item,
                distance_km: haversine_km(center, item.location()),
            })
            .collect();
        matches.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
        matches.truncate(limit);
        matches
    }

    /// Number of indexed items.
    fn len(&self) -> usize {
        self.items().len()
    }

    /// Whether the index holds no items.
    fn is_empty(&self) -> bool {
        self.items().is_empty()
    }
}

/// Reference index that scans every item on each query.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearIndex<T> {
    points: Vec<T>,
}

impl<T: Located> LinearIndex<T> {
    /// Wraps a set of points.
    #[must_use]
    pub const fn new(points: Vec<T>) -> Self {
        Self { points }
    }
}

impl<T: Located> ProximityIndex<T> for LinearIndex<T> {
    fn find_within(&self, center: Coordinate, radius_km: f64) -> Vec<&T> {
        find_within(center, radius_km, &self.points)
    }

    fn items(&self) -> &[T] {
        &self.points
    }
}

type TreeEntry = GeomWithData<[f64; 2], usize>;

/// R-tree backed index keyed on `[longitude, latitude]`.
///
/// Queries pre-filter with a conservative bounding box and then apply the
/// haversine predicate. Queries whose box would reach a pole or cross the
/// antimeridian fall back to a linear scan.
pub struct RTreeIndex<T> {
    points: Vec<T>,
    tree: RTree<TreeEntry>,
    /// Set when some coordinate lies outside the canonical lat/lon ranges;
    /// the envelope math assumes canonical coordinates.
    linear_only: bool,
}

impl<T: Located> RTreeIndex<T> {
    /// Bulk-loads the R-tree from a set of points.
    ///
    /// Points with non-finite coordinates are kept in [`ProximityIndex::items`]
    /// but never match a query.
    #[must_use]
    pub fn new(points: Vec<T>) -> Self {
        let mut linear_only = false;
        let entries: Vec<TreeEntry> = points
            .iter()
            .enumerate()
            .filter_map(|(idx, point)| {
                let c = point.location();
                if !c.is_finite() {
                    return None;
                }
                if c.latitude.abs() > 90.0 || c.longitude.abs() > 180.0 {
                    linear_only = true;
                }
                Some(GeomWithData::new([c.longitude, c.latitude], idx))
            })
            .collect();

        if linear_only {
            log::debug!("Proximity index holds non-canonical coordinates, using linear scans");
        }

        Self {
            points,
            tree: RTree::bulk_load(entries),
            linear_only,
        }
    }
}

impl<T: Located> ProximityIndex<T> for RTreeIndex<T> {
    fn find_within(&self, center: Coordinate, radius_km: f64) -> Vec<&T> {
        if !is_valid_radius(radius_km) || !center.is_finite() {
            return Vec::new();
        }

        let envelope = if self.linear_only {
            None
        } else {
            search_envelope(center, radius_km)
        };

        let Some(envelope) = envelope else {
            return find_within(center, radius_km, &self.points);
        };

        self.tree
            .locate_in_envelope(&envelope)
            .map(|entry| &self.points[entry.data])
            .filter(|p| haversine_km(center, p.location()) <= radius_km)
            .collect()
    }

    fn items(&self) -> &[T] {
        &self.points
    }
}

impl<T> std::fmt::Debug for RTreeIndex<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RTreeIndex")
            .field("points", &self.points.len())
            .field("indexed", &self.tree.size())
            .field("linear_only", &self.linear_only)
            .finish()
    }
}

/// Bounding box (`[lon, lat]` corners) containing every point within
/// `radius_km` of `center`, or `None` if the box would touch a pole or wrap
/// the antimeridian.
fn search_envelope(center: Coordinate, radius_km: f64) -> Option<AABB<[f64; 2]>> {
    if !radius_km.is_finite() {
        return None;
    }

    let angular = radius_km / EARTH_RADIUS_KM;
    if angular >= FRAC_PI_2 {
        return None;
    }

    let d_lat = angular.to_degrees() + ENVELOPE_MARGIN_DEG;
    let min_lat = center.latitude - d_lat;
    let max_lat = center.latitude + d_lat;
    if min_lat <= -90.0 || max_lat >= 90.0 {
        return None;
    }

    // Widest longitude spread of the cap, taken at the band's most
    // poleward latitude.
    let widest_lat = min_lat.abs().max(max_lat.abs()).to_radians();
    let ratio = angular.sin() / widest_lat.cos();
    if ratio >= 1.0 {
        return None;
    }

    let d_lon = ratio.asin().to_degrees() + ENVELOPE_MARGIN_DEG;
    let min_lon = center.longitude - d_lon;
    let max_lon = center.longitude + d_lon;
    if min_lon < -180.0 || max_lon > 180.0 {
        return None;
    }

    Some(AABB::from_corners([min_lon, min_lat], [max_lon, max_lat]))
}
