//! Geographic boundary documents for the map panel.

use crate::error::FetchError;
use crate::resolver::Fetcher;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    properties: FeatureProperties,
    geometry: Option<Geometry>,
}

#[derive(Debug, Default, Deserialize)]
struct FeatureProperties {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum Geometry {
    Polygon { coordinates: Vec<Vec<Vec<f64>>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<Vec<f64>>>> },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegionShape {
    pub name: String,
    /// Outer and inner rings as (lon, lat) pairs.
    pub rings: Vec<Vec<(f64, f64)>>,
}

impl RegionShape {
    /// Mean of the outer ring vertices; good enough to place a label.
    pub fn label_point(&self) -> Option<(f64, f64)> {
        let ring = self.rings.iter().max_by_key(|r| r.len())?;
        if ring.is_empty() {
            return None;
        }
        let n = ring.len() as f64;
        let (sx, sy) = ring
            .iter()
            .fold((0.0, 0.0), |(ax, ay), (x, y)| (ax + x, ay + y));
        Some((sx / n, sy / n))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeoBoundary {
    pub name: String,
    pub regions: Vec<RegionShape>,
    pub x_bounds: [f64; 2],
    pub y_bounds: [f64; 2],
}

impl GeoBoundary {
    pub fn from_geojson(name: &str, value: &Value) -> Result<Self, FetchError> {
        let collection: FeatureCollection = serde_json::from_value(value.clone())?;
        let mut regions = Vec::with_capacity(collection.features.len());

        for feature in collection.features {
            let polygons = match feature.geometry {
                Some(Geometry::Polygon { coordinates }) => vec![coordinates],
                Some(Geometry::MultiPolygon { coordinates }) => coordinates,
                Some(Geometry::Unsupported) | None => continue,
            };

            let rings = polygons
                .into_iter()
                .flatten()
                .map(|ring| {
                    ring.into_iter()
                        .filter(|pos| pos.len() >= 2)
                        .map(|pos| (pos[0], pos[1]))
                        .collect::<Vec<_>>()
                })
                .filter(|ring| !ring.is_empty())
                .collect::<Vec<_>>();

            regions.push(RegionShape {
                name: feature.properties.name,
                rings,
            });
        }

        let points = regions.iter().flat_map(|r| r.rings.iter().flatten());
        let (mut min_x, mut max_x, mut min_y, mut max_y) =
            (f64::MAX, f64::MIN, f64::MAX, f64::MIN);
        let mut any = false;
        for (x, y) in points {
            any = true;
            min_x = min_x.min(*x);
            max_x = max_x.max(*x);
            min_y = min_y.min(*y);
            max_y = max_y.max(*y);
        }
        if !any {
            return Err(FetchError::Decode(format!("{name}: boundary has no coordinates")));
        }

        Ok(Self {
            name: name.to_string(),
            regions,
            x_bounds: [min_x, max_x],
            y_bounds: [min_y, max_y],
        })
    }

    pub fn region(&self, name: &str) -> Option<&RegionShape> {
        self.regions.iter().find(|r| r.name == name)
    }
}

/// Named boundary datasets registered once and shared by every render.
///
/// A successful registration is permanent; a failed one is retried on the
/// next request.
#[derive(Default)]
pub struct GeoRegistry {
    maps: Mutex<HashMap<String, Arc<GeoBoundary>>>,
}

impl GeoRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn ensure_registered(
        &self,
        fetcher: &dyn Fetcher,
        name: &str,
        path: &str,
    ) -> Result<Arc<GeoBoundary>, FetchError> {
        let mut maps = self.maps.lock().await;
        if let Some(existing) = maps.get(name) {
            return Ok(existing.clone());
        }

        let boundary = match fetcher.read_static(path).await {
            Ok(doc) => GeoBoundary::from_geojson(name, &doc),
            Err(err) => Err(err),
        };

        match boundary {
            Ok(boundary) => {
                info!(map = name, regions = boundary.regions.len(), "boundary registered");
                let boundary = Arc::new(boundary);
                maps.insert(name.to_string(), boundary.clone());
                Ok(boundary)
            }
            Err(err) => {
                warn!(map = name, error = %err, "boundary registration failed");
                Err(err)
            }
        }
    }

    pub async fn get(&self, name: &str) -> Option<Arc<GeoBoundary>> {
        self.maps.lock().await.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::tests::CountingFetcher;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": { "name": "成都市" },
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[103.0, 30.0], [105.0, 30.0], [105.0, 31.0], [103.0, 30.0]]]
                    }
                },
                {
                    "type": "Feature",
                    "properties": { "name": "绵阳市" },
                    "geometry": {
                        "type": "MultiPolygon",
                        "coordinates": [[[[104.0, 31.0, 0.0], [106.0, 32.5], [104.0, 31.0]]]]
                    }
                },
                {
                    "type": "Feature",
                    "properties": { "name": "point" },
                    "geometry": { "type": "Point", "coordinates": [1.0, 2.0] }
                }
            ]
        })
    }

    #[test]
    fn test_parse_polygons_and_bounds() {
        let boundary = GeoBoundary::from_geojson("sichuan", &sample()).unwrap();
        assert_eq!(boundary.regions.len(), 2);
        assert_eq!(boundary.x_bounds, [103.0, 106.0]);
        assert_eq!(boundary.y_bounds, [30.0, 32.5]);
        assert!(boundary.region("成都市").unwrap().label_point().is_some());
    }

    #[test]
    fn test_empty_boundary_rejected() {
        let doc = json!({ "type": "FeatureCollection", "features": [] });
        assert!(GeoBoundary::from_geojson("empty", &doc).is_err());
    }

    #[tokio::test]
    async fn test_registration_is_one_time() {
        let fetcher = CountingFetcher::default().with_file("sichuan.json", Ok(sample()));
        let registry = GeoRegistry::new();

        registry.ensure_registered(&fetcher, "sichuan", "sichuan.json").await.unwrap();
        registry.ensure_registered(&fetcher, "sichuan", "sichuan.json").await.unwrap();
        assert_eq!(fetcher.calls(), (0, 1));
        assert!(registry.get("sichuan").await.is_some());
    }

    #[tokio::test]
    async fn test_failed_registration_retries() {
        let fetcher = CountingFetcher::default();
        let registry = GeoRegistry::new();

        assert!(registry.ensure_registered(&fetcher, "sichuan", "sichuan.json").await.is_err());
        assert!(registry.ensure_registered(&fetcher, "sichuan", "sichuan.json").await.is_err());
        assert_eq!(fetcher.calls(), (0, 2));
        assert!(registry.get("sichuan").await.is_none());
    }
}
