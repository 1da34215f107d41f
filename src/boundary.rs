use crate::api_client::Viewport;
use crate::error::ConfigError;
use crate::models::normalize_municipality;
use geo::{BoundingRect, Centroid, Coord, LineString, MultiPolygon, Point, Polygon};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct MunicipalityBoundary {
    pub name: String,
    pub geometry: MultiPolygon<f64>,
}

impl MunicipalityBoundary {
    pub fn new(name: impl Into<String>, geometry: MultiPolygon<f64>) -> Self {
        Self {
            name: name.into(),
            geometry,
        }
    }

    /// Bounding box of the polygon, used as the upstream search area.
    pub fn viewport(&self) -> Option<Viewport> {
        let rect = self.geometry.bounding_rect()?;
        Some(Viewport {
            ne_lat: rect.max().y,
            ne_lon: rect.max().x,
            sw_lat: rect.min().y,
            sw_lon: rect.min().x,
        })
    }

    pub fn centroid(&self) -> Option<Point<f64>> {
        self.geometry.centroid()
    }
}

/// Boundaries keyed by normalised municipality name. Loaded once per run.
#[derive(Debug, Clone, Default)]
pub struct BoundaryIndex {
    boundaries: HashMap<String, MunicipalityBoundary>,
}

impl BoundaryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a boundary; polygons of an already known name are merged into it.
    pub fn insert(&mut self, boundary: MunicipalityBoundary) {
        let key = normalize_municipality(&boundary.name);
        match self.boundaries.get_mut(&key) {
            Some(existing) => existing.geometry.0.extend(boundary.geometry.0),
            None => {
                self.boundaries.insert(key, boundary);
            }
        }
    }

    /// Exact, case-insensitive lookup. "Schagen" never matches "Schagenbrug".
    pub fn get(&self, name: &str) -> Result<&MunicipalityBoundary, ConfigError> {
        self.boundaries
            .get(&normalize_municipality(name))
            .ok_or_else(|| ConfigError::UnknownMunicipality(name.trim().to_string()))
    }

    pub fn len(&self) -> usize {
        self.boundaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boundaries.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.boundaries.values().map(|b| b.name.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Load a WGS84 GeoJSON FeatureCollection. The municipality name is read from
    /// `name_property`, falling back to `name`.
    pub fn from_geojson_file(path: &Path, name_property: &str) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::BoundaryData {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let index = Self::from_geojson_str(&content, name_property).map_err(|reason| {
            ConfigError::BoundaryData {
                path: path.to_path_buf(),
                reason,
            }
        })?;
        info!(
            "Loaded {} municipality boundaries from {}",
            index.len(),
            path.display()
        );
        Ok(index)
    }

    pub fn from_geojson_str(content: &str, name_property: &str) -> Result<Self, String> {
        let collection: FeatureCollection =
            serde_json::from_str(content).map_err(|e| format!("not a GeoJSON FeatureCollection: {}", e))?;

        let mut index = Self::new();
        for (i, feature) in collection.features.iter().enumerate() {
            let name = feature
                .properties
                .get(name_property)
                .or_else(|| feature.properties.get("name"))
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|n| !n.is_empty());
            let Some(name) = name else {
                debug!("Skipping feature {} without a name", i);
                continue;
            };
            let Some(geometry) = &feature.geometry else {
                debug!("Skipping feature {} ({}) without geometry", i, name);
                continue;
            };
            let polygons = geometry
                .to_multi_polygon()
                .map_err(|e| format!("feature {} ({}): {}", i, name, e))?;
            index.insert(MunicipalityBoundary::new(name, polygons));
        }

        if index.is_empty() {
            return Err("no named Polygon or MultiPolygon features".to_string());
        }
        Ok(index)
    }
}

#[derive(Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Deserialize)]
struct Feature {
    #[serde(default)]
    properties: serde_json::Map<String, Value>,
    geometry: Option<Geometry>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum Geometry {
    Polygon { coordinates: Vec<Vec<[f64; 2]>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<[f64; 2]>>> },
    #[serde(other)]
    Unsupported,
}

impl Geometry {
    fn to_multi_polygon(&self) -> Result<MultiPolygon<f64>, String> {
        match self {
            Geometry::Polygon { coordinates } => Ok(MultiPolygon::new(vec![polygon(coordinates)?])),
            Geometry::MultiPolygon { coordinates } => Ok(MultiPolygon::new(
                coordinates.iter().map(|rings| polygon(rings)).collect::<Result<_, _>>()?,
            )),
            Geometry::Unsupported => Err("geometry is not a Polygon or MultiPolygon".to_string()),
        }
    }
}

/// GeoJSON positions are `[lon, lat]`; the first ring is the exterior.
fn polygon(rings: &[Vec<[f64; 2]>]) -> Result<Polygon<f64>, String> {
    let mut rings = rings.iter().map(|ring| {
        LineString::new(ring.iter().map(|[x, y]| Coord { x: *x, y: *y }).collect())
    });
    let exterior = rings.next().ok_or("polygon has no rings")?;
    if exterior.0.len() < 4 {
        return Err("polygon ring has fewer than 4 positions".to_string());
    }
    Ok(Polygon::new(exterior, rings.collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "properties": {"naam": "Schagen"},
             "geometry": {"type": "Polygon", "coordinates": [[[4.6, 52.7], [4.9, 52.7], [4.9, 52.9], [4.6, 52.9], [4.6, 52.7]]]}},
            {"type": "Feature", "properties": {"naam": "Schagenbrug"},
             "geometry": {"type": "Polygon", "coordinates": [[[5.0, 53.0], [5.1, 53.0], [5.1, 53.1], [5.0, 53.1], [5.0, 53.0]]]}},
            {"type": "Feature", "properties": {"naam": "Texel"},
             "geometry": {"type": "MultiPolygon", "coordinates": [[[[4.7, 53.0], [4.9, 53.0], [4.9, 53.2], [4.7, 53.0]]]]}},
            {"type": "Feature", "properties": {"code": "GM0000"},
             "geometry": {"type": "Polygon", "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]]}}
        ]
    }"#;

    #[test]
    fn test_lookup_is_case_insensitive_and_exact() {
        let index = BoundaryIndex::from_geojson_str(SAMPLE, "naam").unwrap();
        assert_eq!(index.len(), 3);
        for name in ["schagen", "Schagen", "SCHAGEN", "  Schagen "] {
            assert_eq!(index.get(name).unwrap().name, "Schagen");
        }
        assert_eq!(index.get("schagenbrug").unwrap().name, "Schagenbrug");
        assert!(matches!(index.get("schag"), Err(ConfigError::UnknownMunicipality(_))));
        assert!(index.get("Groot Schagen").is_err());
    }

    #[test]
    fn test_viewport_is_bounding_box() {
        let index = BoundaryIndex::from_geojson_str(SAMPLE, "naam").unwrap();
        let viewport = index.get("Schagen").unwrap().viewport().unwrap();
        assert_eq!(
            viewport,
            Viewport {
                ne_lat: 52.9,
                ne_lon: 4.9,
                sw_lat: 52.7,
                sw_lon: 4.6
            }
        );
    }

    #[test]
    fn test_features_with_the_same_name_are_merged() {
        let mut index = BoundaryIndex::from_geojson_str(SAMPLE, "naam").unwrap();
        let extra = BoundaryIndex::from_geojson_str(SAMPLE, "naam").unwrap();
        index.insert(extra.get("Texel").unwrap().clone());
        assert_eq!(index.get("texel").unwrap().geometry.0.len(), 2);
    }

    #[test]
    fn test_name_property_falls_back_to_name() {
        let json = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "properties": {"name": "Bergen"},
             "geometry": {"type": "Polygon", "coordinates": [[[4.6, 52.6], [4.7, 52.6], [4.7, 52.7], [4.6, 52.6]]]}}]}"#;
        let index = BoundaryIndex::from_geojson_str(json, "naam").unwrap();
        assert!(index.get("bergen").is_ok());
    }

    #[test]
    fn test_rejects_files_without_polygons() {
        let json = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "properties": {"naam": "Ergens"},
             "geometry": {"type": "Point", "coordinates": [4.6, 52.6]}}]}"#;
        assert!(BoundaryIndex::from_geojson_str(json, "naam").is_err());
        assert!(BoundaryIndex::from_geojson_str("[]", "naam").is_err());
    }
}
