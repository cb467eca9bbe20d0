//! Vector features and GeoJSON export
//!
//! River networks leave the raster world here: each branch becomes a
//! `Feature` with a `LineString` geometry, and a `FeatureCollection`
//! serialises to the GeoJSON layout downstream tools expect.

use crate::error::{Error, Result};
use geo_types::{Coord, Geometry, LineString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Attribute value types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl AttributeValue {
    fn to_json(&self) -> Value {
        match self {
            AttributeValue::Null => Value::Null,
            AttributeValue::Bool(b) => json!(b),
            AttributeValue::Int(i) => json!(i),
            AttributeValue::Float(f) => json!(f),
            AttributeValue::String(s) => json!(s),
        }
    }
}

/// A geographic feature with geometry and attributes
#[derive(Debug, Clone)]
pub struct Feature {
    pub geometry: Option<Geometry<f64>>,
    /// Sorted so GeoJSON output is stable
    pub properties: BTreeMap<String, AttributeValue>,
    pub id: Option<String>,
}

impl Feature {
    /// Create a new feature with geometry
    pub fn new(geometry: Geometry<f64>) -> Self {
        Self {
            geometry: Some(geometry),
            properties: BTreeMap::new(),
            id: None,
        }
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: AttributeValue) {
        self.properties.insert(key.into(), value);
    }

    pub fn get_property(&self, key: &str) -> Option<&AttributeValue> {
        self.properties.get(key)
    }

    /// GeoJSON `Feature` object
    pub fn to_geojson(&self) -> Result<Value> {
        let geometry = match &self.geometry {
            Some(g) => geometry_to_geojson(g)?,
            None => Value::Null,
        };

        let properties: Map<String, Value> = self
            .properties
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();

        let mut feature = json!({
            "type": "Feature",
            "geometry": geometry,
            "properties": properties,
        });
        if let Some(id) = &self.id {
            feature["id"] = json!(id);
        }
        Ok(feature)
    }
}

/// Collection of features
#[derive(Debug, Clone, Default)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new() -> Self {
        Self { features: Vec::new() }
    }

    pub fn push(&mut self, feature: Feature) {
        self.features.push(feature);
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }

    /// GeoJSON `FeatureCollection` object
    pub fn to_geojson(&self) -> Result<Value> {
        let features = self
            .features
            .iter()
            .map(Feature::to_geojson)
            .collect::<Result<Vec<_>>>()?;

        Ok(json!({
            "type": "FeatureCollection",
            "features": features,
        }))
    }

    /// Pretty-printed GeoJSON text
    pub fn to_geojson_string(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.to_geojson()?).map_err(|e| Error::Other(e.to_string()))
    }
}

impl IntoIterator for FeatureCollection {
    type Item = Feature;
    type IntoIter = std::vec::IntoIter<Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.into_iter()
    }
}

fn coord_json(c: &Coord<f64>) -> Value {
    json!([c.x, c.y])
}

fn line_json(line: &LineString<f64>) -> Value {
    Value::Array(line.coords().map(coord_json).collect())
}

fn geometry_to_geojson(geometry: &Geometry<f64>) -> Result<Value> {
    let value = match geometry {
        Geometry::Point(p) => json!({
            "type": "Point",
            "coordinates": coord_json(&p.0),
        }),
        Geometry::LineString(line) => json!({
            "type": "LineString",
            "coordinates": line_json(line),
        }),
        Geometry::MultiLineString(lines) => json!({
            "type": "MultiLineString",
            "coordinates": lines.iter().map(line_json).collect::<Vec<_>>(),
        }),
        _ => {
            return Err(Error::UnsupportedDataType(
                "only points and line strings export to GeoJSON".to_string(),
            ))
        }
    };
    Ok(value)
}
