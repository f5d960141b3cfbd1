//! In-memory GeoJSON source

use std::sync::Arc;

use dv_core::BBox;
use geo::BoundingRect;
use geojson::GeoJson;

use super::Row;
use crate::{DataViewError, Result};

/// A feature: its properties and the bounding box of its geometry
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub properties: Row,
    pub bbox: Option<BBox>,
}

impl Feature {
    pub fn new(properties: Row, bbox: Option<BBox>) -> Self {
        Self { properties, bbox }
    }

    /// Properties restricted to `columns`; every property when `columns` is empty
    pub fn project(&self, columns: &[String]) -> Row {
        if columns.is_empty() {
            return self.properties.clone();
        }
        columns
            .iter()
            .filter_map(|c| self.properties.get(c).map(|v| (c.clone(), v.clone())))
            .collect()
    }
}

/// Feature collection held in memory
#[derive(Debug, Clone, Default)]
pub struct GeoJsonSource {
    features: Arc<Vec<Feature>>,
}

impl GeoJsonSource {
    pub fn from_features(features: Vec<Feature>) -> Self {
        Self {
            features: Arc::new(features),
        }
    }

    /// Features without geometry
    pub fn from_rows(rows: Vec<Row>) -> Self {
        Self::from_features(rows.into_iter().map(|r| Feature::new(r, None)).collect())
    }

    /// Parse GeoJSON text (a FeatureCollection or a single Feature)
    pub fn parse(text: &str) -> Result<Self> {
        let geojson: GeoJson = text
            .parse()
            .map_err(|e| DataViewError::Source(format!("Failed to parse GeoJSON: {}", e)))?;
        Self::from_geojson(geojson)
    }

    pub fn from_geojson(geojson: GeoJson) -> Result<Self> {
        let features = match geojson {
            GeoJson::FeatureCollection(collection) => collection.features,
            GeoJson::Feature(feature) => vec![feature],
            GeoJson::Geometry(_) => {
                return Err(DataViewError::Source(
                    "GeoJSON source must be a Feature or a FeatureCollection".to_string(),
                ))
            }
        };

        let features = features
            .into_iter()
            .map(|feature| {
                let bbox = match feature.geometry {
                    Some(geometry) => geometry_bbox(geometry)?,
                    None => None,
                };
                Ok(Feature::new(feature.properties.unwrap_or_default(), bbox))
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!("Loaded {} GeoJSON features", features.len());
        Ok(Self::from_features(features))
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    /// Properties of every feature
    pub fn rows(&self) -> Vec<Row> {
        self.features.iter().map(|f| f.properties.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

fn geometry_bbox(geometry: geojson::Geometry) -> Result<Option<BBox>> {
    let geometry = geo_types::Geometry::<f64>::try_from(geometry)
        .map_err(|e| DataViewError::Source(format!("Invalid GeoJSON geometry: {}", e)))?;

    Ok(geometry.bounding_rect().map(|rect| {
        BBox::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLLECTION: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "geometry": {"type": "Point", "coordinates": [2.17, 41.38]},
                "properties": {"name": "Barcelona", "pop": 1620000}
            },
            {
                "type": "Feature",
                "geometry": {"type": "LineString", "coordinates": [[-3.7, 40.4], [-0.37, 39.47]]},
                "properties": {"name": "Madrid-Valencia", "pop": null}
            },
            {
                "type": "Feature",
                "geometry": null,
                "properties": {"name": "Nowhere"}
            }
        ]
    }"#;

    #[test]
    fn test_parse_feature_collection() {
        let source = GeoJsonSource::parse(COLLECTION).unwrap();
        assert_eq!(source.len(), 3);

        let features = source.features();
        assert_eq!(features[0].bbox, Some(BBox::new(2.17, 41.38, 2.17, 41.38)));
        assert_eq!(features[1].bbox, Some(BBox::new(-3.7, 39.47, -0.37, 40.4)));
        assert_eq!(features[2].bbox, None);
        assert_eq!(source.rows()[0]["name"], "Barcelona");
    }

    #[test]
    fn test_parse_rejects_bare_geometry() {
        let err = GeoJsonSource::parse(r#"{"type": "Point", "coordinates": [0, 0]}"#).unwrap_err();
        assert!(matches!(err, DataViewError::Source(_)));
        assert!(GeoJsonSource::parse("not json").is_err());
    }

    #[test]
    fn test_project_columns() {
        let source = GeoJsonSource::parse(COLLECTION).unwrap();
        let feature = &source.features()[0];

        let projected = feature.project(&["pop".to_string(), "missing".to_string()]);
        assert_eq!(projected.len(), 1);
        assert_eq!(projected["pop"], 1620000);
        assert_eq!(feature.project(&[]).len(), 2);
    }
}
