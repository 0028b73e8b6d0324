#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Livability scoring over a cohort of neighborhoods.
//!
//! Each metric is min-max normalized to `0..=100` against the cohort being
//! scored, never against a global range: adding or removing a neighborhood
//! changes every other neighborhood's score. Rent is inverted into an
//! affordability sub-score, then the three sub-scores are combined with
//! fixed weights and rounded half away from zero.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use cityscope_models::{MetricSnapshot, NeighborhoodId, NeighborhoodMetrics, Score, ScoreBreakdown};

/// Weight of the affordability sub-score.
pub const AFFORDABILITY_WEIGHT: f64 = 0.55;
/// Weight of the transit sub-score.
pub const TRANSIT_WEIGHT: f64 = 0.35;
/// Weight of the amenity (mall) sub-score.
pub const AMENITY_WEIGHT: f64 = 0.10;

/// Normalized value assigned when every cohort member shares one value.
pub const NEUTRAL_NORMALIZED: f64 = 50.0;

/// Upper bound of a normalized value and of a score.
pub const MAX_NORMALIZED: f64 = 100.0;

/// Min-max normalizes `value` into `0..=100`.
///
/// Returns [`NEUTRAL_NORMALIZED`] when `max == min`.
#[must_use]
#[allow(clippy::float_cmp)]
pub fn normalize(value: f64, min: f64, max: f64) -> f64 {
    if max == min {
        return NEUTRAL_NORMALIZED;
    }
    (value - min) / (max - min) * MAX_NORMALIZED
}

/// Observed bounds of one metric across a cohort.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricRange {
    /// Smallest value.
    pub min: f64,
    /// Largest value.
    pub max: f64,
}

impl MetricRange {
    /// Computes the range of `values`, or `None` if there are none.
    ///
    /// `NaN` values are ignored.
    pub fn over(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        values
            .into_iter()
            .filter(|v| !v.is_nan())
            .fold(None, |range, v| {
                Some(match range {
                    None => Self { min: v, max: v },
                    Some(Self { min, max }) => Self {
                        min: min.min(v),
                        max: max.max(v),
                    },
                })
            })
    }

    /// Normalizes `value` against this range.
    #[must_use]
    pub fn normalize(&self, value: f64) -> f64 {
        normalize(value, self.min, self.max)
    }
}

/// Per-metric ranges of a cohort, all taken in one pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CohortRanges {
    /// Average rent range.
    pub rent: MetricRange,
    /// Transit stop count range.
    pub transit: MetricRange,
    /// Mall count range.
    pub malls: MetricRange,
}

impl CohortRanges {
    /// Computes the ranges of a cohort, or `None` for an empty cohort.
    #[must_use]
    pub fn of(cohort: &[NeighborhoodMetrics]) -> Option<Self> {
        Some(Self {
            rent: MetricRange::over(cohort.iter().map(|m| m.avg_rent))?,
            transit: MetricRange::over(cohort.iter().map(|m| f64::from(m.transit_count)))?,
            malls: MetricRange::over(cohort.iter().map(|m| f64::from(m.mall_count)))?,
        })
    }

    /// Scores one member of the cohort these ranges were taken from.
    #[must_use]
    pub fn breakdown(&self, metrics: &NeighborhoodMetrics) -> ScoreBreakdown {
        let affordability = MAX_NORMALIZED - self.rent.normalize(metrics.avg_rent);
        let transit = self.transit.normalize(f64::from(metrics.transit_count));
        let amenity = self.malls.normalize(f64::from(metrics.mall_count));

        ScoreBreakdown {
            affordability,
            transit,
            amenity,
            score: composite(affordability, transit, amenity),
        }
    }
}

/// Weighted composite of three normalized sub-scores.
///
/// Rounds half away from zero and clamps to `0..=100`.
#[must_use]
#[allow(
    clippy::suboptimal_flops,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn composite(affordability: f64, transit: f64, amenity: f64) -> Score {
    let raw =
        AFFORDABILITY_WEIGHT * affordability + TRANSIT_WEIGHT * transit + AMENITY_WEIGHT * amenity;
    raw.round().clamp(0.0, MAX_NORMALIZED) as Score
}

/// Scores every member of `cohort` relative to the cohort itself.
///
/// An empty cohort yields an empty map. If an id appears more than once,
/// every occurrence contributes to the ranges and the last one is kept.
#[must_use]
pub fn compute_breakdowns(
    cohort: &[NeighborhoodMetrics],
) -> BTreeMap<NeighborhoodId, ScoreBreakdown> {
    let Some(ranges) = CohortRanges::of(cohort) else {
        return BTreeMap::new();
    };

    log::trace!("Scoring cohort of {} with ranges {ranges:?}", cohort.len());

    cohort
        .iter()
        .map(|m| (m.neighborhood_id, ranges.breakdown(m)))
        .collect()
}

/// Composite scores of every member of `cohort`.
#[must_use]
pub fn compute_scores(cohort: &[NeighborhoodMetrics]) -> BTreeMap<NeighborhoodId, Score> {
    compute_breakdowns(cohort)
        .into_iter()
        .map(|(id, breakdown)| (id, breakdown.score))
        .collect()
}

/// Builds the history records of a scoring pass, in cohort order.
#[must_use]
pub fn snapshots(cohort: &[NeighborhoodMetrics], captured_at: DateTime<Utc>) -> Vec<MetricSnapshot> {
    let Some(ranges) = CohortRanges::of(cohort) else {
        return Vec::new();
    };

    cohort
        .iter()
        .map(|m| MetricSnapshot {
            neighborhood_id: m.neighborhood_id,
            avg_rent: m.avg_rent,
            transit_count: m.transit_count,
            mall_count: m.mall_count,
            score: ranges.breakdown(m).score,
            captured_at,
        })
        .collect()
}
