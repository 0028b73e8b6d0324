//! Immutable in-memory reference dataset and per-neighborhood aggregation.

use std::collections::{BTreeMap, BTreeSet};

use cityscope_models::{
    Listing, Neighborhood, NeighborhoodId, NeighborhoodMetrics, PoiKind, PointOfInterest,
    SearchRadii,
};
use cityscope_spatial::{Nearby, ProximityIndex, RTreeIndex};
use serde::{Deserialize, Serialize};

use crate::{DataPaths, DatasetError, loader};

/// Running total of the listing prices of one neighborhood.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RentStats {
    /// Sum of prices.
    pub total: f64,
    /// Number of listings.
    pub count: u64,
}

impl RentStats {
    /// Adds one listing price.
    pub fn add(&mut self, price: f64) {
        self.total += price;
        self.count += 1;
    }

    /// Arithmetic mean of the prices, `0.0` when there are none.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total / self.count as f64
        }
    }
}

/// Row counts of a loaded dataset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetSummary {
    /// Neighborhoods kept.
    pub neighborhoods: usize,
    /// Listings attributed to a known neighborhood.
    pub listings: usize,
    /// Listings whose neighborhood does not exist.
    pub orphaned_listings: usize,
    /// Transit stops kept.
    pub stops: usize,
    /// Malls kept.
    pub malls: usize,
}

/// Reference data for one scoring lifetime. Never mutated after
/// construction; reloads build a new value.
#[derive(Debug)]
pub struct Dataset {
    neighborhoods: BTreeMap<NeighborhoodId, Neighborhood>,
    rents: BTreeMap<NeighborhoodId, RentStats>,
    stops: RTreeIndex<PointOfInterest>,
    malls: RTreeIndex<PointOfInterest>,
    summary: DatasetSummary,
}

impl Dataset {
    /// Builds a dataset from already-parsed records.
    ///
    /// Neighborhoods with non-finite centers are skipped; a repeated id
    /// replaces the earlier row. Listings that reference an unknown
    /// neighborhood are counted as orphaned and left out of every average.
    #[must_use]
    pub fn new(
        neighborhoods: Vec<Neighborhood>,
        listings: Vec<Listing>,
        stops: Vec<PointOfInterest>,
        malls: Vec<PointOfInterest>,
    ) -> Self {
        let mut by_id = BTreeMap::new();
        for neighborhood in neighborhoods {
            if !neighborhood.center.is_finite() {
                log::debug!("Skipping neighborhood {} with non-finite center", neighborhood.id);
                continue;
            }
            by_id.insert(neighborhood.id, neighborhood);
        }

        let mut rents: BTreeMap<NeighborhoodId, RentStats> = BTreeMap::new();
        let mut attributed = 0usize;
        let mut orphaned = 0usize;
        for listing in &listings {
            if !listing.price.is_finite() {
                continue;
            }
            if by_id.contains_key(&listing.neighborhood_id) {
                rents.entry(listing.neighborhood_id).or_default().add(listing.price);
                attributed += 1;
            } else {
                orphaned += 1;
            }
        }

        if orphaned > 0 {
            log::debug!("{orphaned} listings reference unknown neighborhoods and were excluded");
        }

        let stops: Vec<_> = stops.into_iter().filter(|p| p.location.is_finite()).collect();
        let malls: Vec<_> = malls.into_iter().filter(|p| p.location.is_finite()).collect();

        let summary = DatasetSummary {
            neighborhoods: by_id.len(),
            listings: attributed,
            orphaned_listings: orphaned,
            stops: stops.len(),
            malls: malls.len(),
        };

        Self {
            neighborhoods: by_id,
            rents,
            stops: RTreeIndex::new(stops),
            malls: RTreeIndex::new(malls),
            summary,
        }
    }

    /// Loads all four reference files and builds the dataset.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError`] if an existing file cannot be read as CSV.
    pub fn load(paths: &DataPaths) -> Result<Self, DatasetError> {
        let dataset = Self::new(
            loader::load_neighborhoods(&paths.neighborhoods)?,
            loader::load_listings(&paths.listings)?,
            loader::load_stops(&paths.stops)?,
            loader::load_malls(&paths.malls)?,
        );
        log::info!("Dataset ready: {:?}", dataset.summary);
        Ok(dataset)
    }

    /// Row counts.
    #[must_use]
    pub const fn summary(&self) -> DatasetSummary {
        self.summary
    }

    /// All neighborhoods in id order.
    pub fn neighborhoods(&self) -> impl Iterator<Item = &Neighborhood> {
        self.neighborhoods.values()
    }

    /// Looks up a neighborhood.
    #[must_use]
    pub fn neighborhood(&self, id: NeighborhoodId) -> Option<&Neighborhood> {
        self.neighborhoods.get(&id)
    }

    /// Mean listing price of a neighborhood, `0.0` if it has none.
    #[must_use]
    pub fn average_rent(&self, id: NeighborhoodId) -> f64 {
        self.rents.get(&id).map_or(0.0, RentStats::average)
    }

    /// The proximity index holding points of `kind`.
    #[must_use]
    pub const fn index(&self, kind: PoiKind) -> &RTreeIndex<PointOfInterest> {
        match kind {
            PoiKind::TransitStop => &self.stops,
            PoiKind::Mall => &self.malls,
        }
    }

    /// Aggregates one neighborhood's raw scoring inputs.
    #[must_use]
    pub fn metrics(&self, neighborhood: &Neighborhood, radii: SearchRadii) -> NeighborhoodMetrics {
        let count = |kind: PoiKind| {
            let n = self.index(kind).count_within(neighborhood.center, radii.for_kind(kind));
            u32::try_from(n).unwrap_or(u32::MAX)
        };

        NeighborhoodMetrics {
            neighborhood_id: neighborhood.id,
            avg_rent: self.average_rent(neighborhood.id),
            transit_count: count(PoiKind::TransitStop),
            mall_count: count(PoiKind::Mall),
        }
    }

    /// Aggregates a cohort.
    ///
    /// An empty `ids` slice means every neighborhood. Unknown ids are
    /// skipped and repeated ids are kept once, in first-seen order.
    #[must_use]
    pub fn cohort_metrics(
        &self,
        ids: &[NeighborhoodId],
        radii: SearchRadii,
    ) -> Vec<NeighborhoodMetrics> {
        if ids.is_empty() {
            return self
                .neighborhoods
                .values()
                .map(|n| self.metrics(n, radii))
                .collect();
        }

        let mut seen = BTreeSet::new();
        ids.iter()
            .filter(|id| seen.insert(**id))
            .filter_map(|id| self.neighborhood(*id))
            .map(|n| self.metrics(n, radii))
            .collect()
    }

    /// Points of `kind` near a neighborhood's center, nearest first, at most
    /// `limit` of them. `None` if the neighborhood does not exist.
    #[must_use]
    pub fn nearby(
        &self,
        id: NeighborhoodId,
        kind: PoiKind,
        radius_km: f64,
        limit: usize,
    ) -> Option<Vec<Nearby<'_, PointOfInterest>>> {
        let neighborhood = self.neighborhood(id)?;
        Some(
            self.index(kind)
                .nearest_within(neighborhood.center, radius_km, limit),
        )
    }
}

impl Default for Dataset {
    fn default() -> Self {
        Self::new(Vec::new(), Vec::new(), Vec::new(), Vec::new())
    }
}
