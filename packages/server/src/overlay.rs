//! `GeoJSON` rendering of nearby points for map overlays.

use cityscope_server_models::ApiPoi;
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, feature::Id};

/// Builds a point `FeatureCollection`, one feature per match, in input
/// order. Properties carry the name, kind, and distance.
pub fn feature_collection(pois: &[ApiPoi]) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features: pois.iter().map(feature).collect(),
        foreign_members: None,
    }
}

fn feature(poi: &ApiPoi) -> Feature {
    let point = geo::Point::new(poi.lng, poi.lat);

    let mut properties = JsonObject::new();
    properties.insert("name".to_string(), poi.name.clone().into());
    properties.insert("kind".to_string(), poi.kind.as_ref().into());
    properties.insert("distanceKm".to_string(), poi.distance_km.into());

    Feature {
        bbox: None,
        geometry: Some(Geometry::new(geojson::Value::from(&point))),
        id: Some(Id::String(poi.id.clone())),
        properties: Some(properties),
        foreign_members: None,
    }
}
