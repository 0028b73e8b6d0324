//! CSV loaders for the reference data files.
//!
//! Each loader reads one file, converts rows into model types, and drops
//! rows with missing or unparseable required fields or non-finite
//! coordinates. A missing file is logged and loads as an empty list.

use std::path::Path;

use chrono::NaiveDate;
use cityscope_models::{Coordinate, Listing, Neighborhood, NeighborhoodId, PoiKind, PointOfInterest};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::DatasetError;

/// Name given to malls exported without one.
pub const DEFAULT_MALL_NAME: &str = "Mall";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NeighborhoodRecord {
    id: String,
    name: Option<String>,
    city: Option<String>,
    center_lat: String,
    center_lng: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListingRecord {
    neighborhood_id: String,
    price: String,
    date_listed: Option<String>,
}

/// A GTFS `stops.txt` row. Other GTFS columns are ignored.
#[derive(Debug, Deserialize)]
struct StopRecord {
    stop_id: String,
    stop_name: Option<String>,
    stop_lat: String,
    stop_lon: String,
}

/// An OSM mall export row. Coordinates may sit in plain, Overpass (`@lat`),
/// or namespaced (`lat:lat`) columns, and an export can carry several.
#[derive(Debug, Deserialize)]
struct MallRecord {
    #[serde(default, alias = "@id")]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    lat: Option<String>,
    #[serde(default, rename = "@lat")]
    overpass_lat: Option<String>,
    #[serde(default, rename = "lat:lat")]
    namespaced_lat: Option<String>,
    #[serde(default)]
    lon: Option<String>,
    #[serde(default, rename = "@lon")]
    overpass_lon: Option<String>,
    #[serde(default, rename = "lon:lon")]
    namespaced_lon: Option<String>,
}

impl MallRecord {
    /// First non-empty of `lat`, `@lat`, `lat:lat`.
    fn latitude(&self) -> Option<&str> {
        first_non_empty([&self.lat, &self.overpass_lat, &self.namespaced_lat])
    }

    /// First non-empty of `lon`, `@lon`, `lon:lon`.
    fn longitude(&self) -> Option<&str> {
        first_non_empty([&self.lon, &self.overpass_lon, &self.namespaced_lon])
    }
}

fn first_non_empty<const N: usize>(columns: [&Option<String>; N]) -> Option<&str> {
    columns
        .into_iter()
        .filter_map(Option::as_deref)
        .find(|s| !s.trim().is_empty())
}

/// Parses a finite floating point number, ignoring surrounding whitespace.
#[must_use]
pub fn parse_finite(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parses a neighborhood id. Integral floats such as `"7.0"` are accepted.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
pub fn parse_id(s: &str) -> Option<NeighborhoodId> {
    let s = s.trim();
    if let Ok(id) = s.parse::<NeighborhoodId>() {
        return Some(id);
    }
    let value = parse_finite(s)?;
    (value.fract() == 0.0 && value.abs() < 9.0e15).then_some(value as NeighborhoodId)
}

/// Parses a coordinate pair, rejecting non-finite components.
#[must_use]
pub fn parse_coordinate(lat: &str, lon: &str) -> Option<Coordinate> {
    Some(Coordinate::new(parse_finite(lat)?, parse_finite(lon)?))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Reads every row of `path` as `R`, keeping the rows `convert` accepts.
fn read_rows<R: DeserializeOwned, T>(
    path: &Path,
    label: &str,
    mut convert: impl FnMut(usize, R) -> Option<T>,
) -> Result<Vec<T>, DatasetError> {
    if !path.exists() {
        log::warn!("{label} file not found at {}, loading none", path.display());
        return Ok(Vec::new());
    }

    let csv_error = |e: csv::Error| DatasetError::Csv {
        path: path.display().to_string(),
        source: e,
    };

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .map_err(csv_error)?;

    reader.headers().map_err(csv_error)?;

    let mut rows = 0usize;
    let mut kept = Vec::new();

    for (idx, result) in reader.deserialize::<R>().enumerate() {
        rows += 1;
        let record = match result {
            Ok(r) => r,
            Err(e) if e.is_io_error() => return Err(csv_error(e)),
            Err(e) => {
                log::trace!("  {label}: skipping malformed row {idx}: {e}");
                continue;
            }
        };

        if let Some(item) = convert(idx, record) {
            kept.push(item);
        } else {
            log::trace!("  {label}: dropping row {idx} with invalid fields");
        }
    }

    log::info!(
        "Loaded {} {label} from {} ({} rows, {} dropped)",
        kept.len(),
        path.display(),
        rows,
        rows - kept.len()
    );

    Ok(kept)
}

/// Loads `id,name,city,centerLat,centerLng` rows.
///
/// # Errors
///
/// Returns [`DatasetError`] if the file exists but cannot be opened as CSV.
pub fn load_neighborhoods(path: &Path) -> Result<Vec<Neighborhood>, DatasetError> {
    read_rows(path, "neighborhoods", |_, r: NeighborhoodRecord| {
        Some(Neighborhood {
            id: parse_id(&r.id)?,
            center: parse_coordinate(&r.center_lat, &r.center_lng)?,
            name: non_empty(r.name).unwrap_or_default(),
            city: non_empty(r.city).unwrap_or_default(),
        })
    })
}

/// Loads `id,neighborhoodId,price,dateListed` rows.
///
/// An unparseable `dateListed` is kept as `None`; an unparseable price or
/// neighborhood id drops the row.
///
/// # Errors
///
/// Returns [`DatasetError`] if the file exists but cannot be opened as CSV.
pub fn load_listings(path: &Path) -> Result<Vec<Listing>, DatasetError> {
    read_rows(path, "listings", |_, r: ListingRecord| {
        Some(Listing {
            neighborhood_id: parse_id(&r.neighborhood_id)?,
            price: parse_finite(&r.price)?,
            listed_on: r
                .date_listed
                .as_deref()
                .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok()),
        })
    })
}

/// Loads a GTFS `stops.txt`.
///
/// # Errors
///
/// Returns [`DatasetError`] if the file exists but cannot be opened as CSV.
pub fn load_stops(path: &Path) -> Result<Vec<PointOfInterest>, DatasetError> {
    read_rows(path, "transit stops", |_, r: StopRecord| {
        Some(PointOfInterest {
            location: parse_coordinate(&r.stop_lat, &r.stop_lon)?,
            id: r.stop_id,
            name: non_empty(r.stop_name).unwrap_or_default(),
            kind: PoiKind::TransitStop,
        })
    })
}

/// Loads an OSM mall export.
///
/// Latitude is taken from the first non-empty of `lat`, `@lat`, and
/// `lat:lat` (likewise longitude).
/// Rows without an id use their row ordinal; rows without a name use
/// [`DEFAULT_MALL_NAME`].
///
/// # Errors
///
/// Returns [`DatasetError`] if the file exists but cannot be opened as CSV.
pub fn load_malls(path: &Path) -> Result<Vec<PointOfInterest>, DatasetError> {
    read_rows(path, "malls", |idx, r: MallRecord| {
        Some(PointOfInterest {
            location: parse_coordinate(r.latitude()?, r.longitude()?)?,
            id: non_empty(r.id).unwrap_or_else(|| idx.to_string()),
            name: non_empty(r.name).unwrap_or_else(|| DEFAULT_MALL_NAME.to_string()),
            kind: PoiKind::Mall,
        })
    })
}

/// Deserializes every row of a CSV string. Used by tests of record shapes.
#[cfg(test)]
fn parse_str<R: DeserializeOwned>(data: &str) -> Vec<Result<R, csv::Error>> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(data.as_bytes())
        .deserialize::<R>()
        .collect()
}
