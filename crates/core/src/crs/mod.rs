//! Coordinate Reference System handling
//!
//! Only what a GeoTIFF GeoKeyDirectory can tell us natively: an EPSG code
//! and whether it is a geographic (degrees) or projected (linear units) system.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad family of a coordinate reference system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrsKind {
    /// Angular coordinates (longitude, latitude in degrees)
    Geographic,
    /// Linear coordinates (usually metres)
    Projected,
    /// Family not recorded
    Unknown,
}

/// Coordinate Reference System representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CRS {
    epsg: Option<u32>,
    kind: CrsKind,
}

impl CRS {
    /// Create a CRS from an EPSG code of unknown family
    pub fn from_epsg(code: u32) -> Self {
        let kind = if code == 4326 || code == 4269 || code == 4674 {
            CrsKind::Geographic
        } else {
            CrsKind::Unknown
        };
        Self { epsg: Some(code), kind }
    }

    /// Geographic CRS from its EPSG code (GeographicTypeGeoKey)
    pub fn geographic(code: u32) -> Self {
        Self { epsg: Some(code), kind: CrsKind::Geographic }
    }

    /// Projected CRS from its EPSG code (ProjectedCSTypeGeoKey)
    pub fn projected(code: u32) -> Self {
        Self { epsg: Some(code), kind: CrsKind::Projected }
    }

    /// WGS84 geographic CRS (EPSG:4326)
    pub fn wgs84() -> Self {
        Self::geographic(4326)
    }

    /// Get EPSG code if known
    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    pub fn kind(&self) -> CrsKind {
        self.kind
    }

    /// Whether coordinates are longitude/latitude degrees
    pub fn is_geographic(&self) -> bool {
        self.kind == CrsKind::Geographic
    }

    /// Check if two CRS are equivalent
    pub fn is_equivalent(&self, other: &CRS) -> bool {
        match (self.epsg, other.epsg) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Get a string identifier for this CRS
    pub fn identifier(&self) -> String {
        match self.epsg {
            Some(code) => format!("EPSG:{}", code),
            None => "Unknown".to_string(),
        }
    }
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

impl Default for CRS {
    fn default() -> Self {
        Self::wgs84()
    }
}
