//! Analysis configuration
//!
//! Loaded from a TOML file. Every field has a default, so a file only needs
//! the keys it changes:
//!
//! ```toml
//! dem = "s24_w047_1arc_v3.tif"
//! output_dir = "jacarei"
//! thresholds = [100, 5]
//!
//! [pour_point]
//! x = -46.467348
//! y = -22.908965
//! ```

use anyhow::{bail, Context, Result};
use hydrotile_algorithms::hydrology::{DistanceMetric, PourPoint};
use hydrotile_core::{DirMap, Snap};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Parameters of a full pipeline run
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Input elevation GeoTIFF
    pub dem: Option<PathBuf>,
    /// Directory receiving plots and optional rasters
    pub output_dir: PathBuf,
    /// Codes for N, NE, E, SE, S, SW, W, NW
    pub dirmap: [u8; 8],
    /// Catchment outlet
    pub pour_point: PourPoint,
    /// How a coordinate pour point is matched to a cell
    pub snap: Snap,
    /// Accumulation thresholds, one river network (and plot) per entry
    pub thresholds: Vec<f64>,
    /// Minimum rise imposed while filling depressions
    pub fill_epsilon: f64,
    /// Gradient step used when resolving flats
    pub flat_epsilon: f64,
    pub distance_metric: DistanceMetric,
    /// Also write every intermediate grid as GeoTIFF and each network as GeoJSON
    pub write_rasters: bool,
    /// Plot pixels per raster cell
    pub plot_scale: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            dem: None,
            output_dir: PathBuf::from("output"),
            dirmap: DirMap::ESRI.codes(),
            pour_point: PourPoint::Coordinate {
                x: -46.467348,
                y: -22.908965,
            },
            snap: Snap::Center,
            thresholds: vec![100.0, 5.0],
            fill_epsilon: 0.0,
            flat_epsilon: 1e-5,
            distance_metric: DistanceMetric::Cells,
            write_rasters: false,
            plot_scale: 2,
        }
    }
}

impl AnalysisConfig {
    /// Load from a TOML file
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml(&contents).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Check parameters and build the direction map
    pub fn validate(&self) -> Result<DirMap> {
        let dirmap = DirMap::new(self.dirmap).context("Invalid dirmap")?;

        if self.thresholds.is_empty() {
            bail!("At least one accumulation threshold is required");
        }
        if let Some(t) = self
            .thresholds
            .iter()
            .find(|t| !t.is_finite() || **t < 0.0)
        {
            bail!("Accumulation thresholds must be finite and >= 0, got {}", t);
        }
        if !self.fill_epsilon.is_finite() || self.fill_epsilon < 0.0 {
            bail!("fill_epsilon must be finite and >= 0, got {}", self.fill_epsilon);
        }
        if !self.flat_epsilon.is_finite() || self.flat_epsilon <= 0.0 {
            bail!("flat_epsilon must be finite and > 0, got {}", self.flat_epsilon);
        }
        if self.plot_scale == 0 {
            bail!("plot_scale must be at least 1");
        }
        Ok(dirmap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_reproduce_reference_run() {
        let config = AnalysisConfig::default();
        assert_eq!(config.dirmap, [64, 128, 1, 2, 4, 8, 16, 32]);
        assert_eq!(config.thresholds, vec![100.0, 5.0]);
        assert_eq!(config.distance_metric, DistanceMetric::Cells);
        assert!(!config.write_rasters);
        assert_eq!(config.validate().unwrap(), DirMap::ESRI);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config = AnalysisConfig::from_toml(
            r#"
            dem = "tile.tif"
            thresholds = [50]
            distance_metric = "geographic"

            [pour_point]
            row = 10
            col = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.dem, Some(PathBuf::from("tile.tif")));
        assert_eq!(config.thresholds, vec![50.0]);
        assert_eq!(config.distance_metric, DistanceMetric::Geographic);
        assert_eq!(config.pour_point, PourPoint::Cell { row: 10, col: 4 });
        assert_eq!(config.flat_epsilon, 1e-5);
        assert_eq!(config.output_dir, PathBuf::from("output"));
    }

    #[test]
    fn coordinate_pour_point_parses() {
        let config = AnalysisConfig::from_toml("pour_point = { x = 1.5, y = -2.0 }").unwrap();
        assert_eq!(config.pour_point, PourPoint::Coordinate { x: 1.5, y: -2.0 });
        assert_eq!(config.snap, Snap::Center);

        let corner = AnalysisConfig::from_toml("snap = \"corner\"").unwrap();
        assert_eq!(corner.snap, Snap::Corner);
        assert!(AnalysisConfig::from_toml("snap = \"edge\"").is_err());
    }

    #[test]
    fn unknown_key_is_rejected() {
        assert!(AnalysisConfig::from_toml("treshold = 3").is_err());
    }

    #[test]
    fn toml_roundtrip() {
        let config = AnalysisConfig {
            dem: Some(PathBuf::from("a.tif")),
            write_rasters: true,
            ..Default::default()
        };
        let text = toml::to_string(&config).unwrap();
        assert_eq!(AnalysisConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        fs::write(&path, "output_dir = \"plots\"\nplot_scale = 4\n").unwrap();
        let config = AnalysisConfig::load_from_path(&path).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("plots"));
        assert_eq!(config.plot_scale, 4);

        let missing = AnalysisConfig::load_from_path(dir.path().join("none.toml"));
        assert!(missing.is_err());
    }

    #[test]
    fn validation_failures() {
        let bad_dirmap = AnalysisConfig {
            dirmap: [1, 1, 2, 4, 8, 16, 32, 64],
            ..Default::default()
        };
        assert!(bad_dirmap.validate().is_err());

        let no_thresholds = AnalysisConfig {
            thresholds: vec![],
            ..Default::default()
        };
        assert!(no_thresholds.validate().is_err());

        let negative = AnalysisConfig {
            thresholds: vec![100.0, -1.0],
            ..Default::default()
        };
        assert!(negative.validate().is_err());

        let flat = AnalysisConfig {
            flat_epsilon: 0.0,
            ..Default::default()
        };
        assert!(flat.validate().is_err());
    }
}
