//! Flow distance to a pour point
//!
//! Length of the D8 flow path from every cell to the pour point, measured
//! either in cell steps or in ground distance.

use super::catchment::{pour_cell, upstream_neighbors, PourPoint};
use hydrotile_core::raster::{DirMap, Direction, Raster};
use hydrotile_core::{Algorithm, Error, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

/// Metres per degree of latitude (WGS84 mean)
const METRES_PER_DEGREE_LAT: f64 = 110_574.0;
/// Metres per degree of longitude at the equator
const METRES_PER_DEGREE_LON: f64 = 111_320.0;

/// How each D8 step is measured
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Every step counts 1
    #[default]
    Cells,
    /// Cardinal and diagonal cell lengths; metres for geographic CRSs,
    /// CRS units otherwise
    Geographic,
}

/// Parameters for flow distance
#[derive(Debug, Clone, Default)]
pub struct FlowDistanceParams {
    pub pour_point: PourPoint,
    pub dirmap: DirMap,
    pub metric: DistanceMetric,
}

/// Flow distance algorithm
#[derive(Debug, Clone, Default)]
pub struct FlowDistance;

impl Algorithm for FlowDistance {
    type Input = Raster<u8>;
    type Output = Raster<f64>;
    type Params = FlowDistanceParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Flow Distance"
    }

    fn description(&self) -> &'static str {
        "Flow path length from every cell to a pour point"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        flow_distance(&input, &params)
    }
}

/// Horizontal and vertical step lengths for `metric`
fn step_lengths(flow_dir: &Raster<u8>, metric: DistanceMetric) -> (f64, f64) {
    match metric {
        DistanceMetric::Cells => (1.0, 1.0),
        DistanceMetric::Geographic => {
            let (dx, dy) = flow_dir.transform().cell_sizes();
            if flow_dir.crs().is_some_and(|crs| crs.is_geographic()) {
                let (_, _, min_y, max_y) = flow_dir.extent();
                let lat = ((min_y + max_y) / 2.0).to_radians();
                (dx * METRES_PER_DEGREE_LON * lat.cos(), dy * METRES_PER_DEGREE_LAT)
            } else {
                (dx, dy)
            }
        }
    }
}

/// Flow distance from every cell to the pour point.
///
/// With `DistanceMetric::Cells` a diagonal step counts 1, like a cardinal
/// one. With `DistanceMetric::Geographic` diagonal steps use the cell
/// diagonal.
///
/// # Returns
/// Raster<f64>: 0 at the pour cell, NaN where flow never reaches it
pub fn flow_distance(flow_dir: &Raster<u8>, params: &FlowDistanceParams) -> Result<Raster<f64>> {
    let (rows, cols) = flow_dir.shape();
    let (pour_row, pour_col) = pour_cell(flow_dir, params.pour_point)?;
    let (dx, dy) = step_lengths(flow_dir, params.metric);
    let lengths = |dir: Direction| match params.metric {
        DistanceMetric::Cells => 1.0,
        DistanceMetric::Geographic => dir.distance(dx, dy),
    };

    let mut distance = Array2::<f64>::from_elem((rows, cols), f64::NAN);
    distance[(pour_row, pour_col)] = 0.0;
    let mut queue = VecDeque::from([(pour_row, pour_col)]);
    let mut max_distance = 0.0_f64;

    // Each cell has one downstream neighbour, so its distance is final
    // the first time it is reached.
    while let Some((row, col)) = queue.pop_front() {
        let here = distance[(row, col)];
        for (dir, nr, nc) in upstream_neighbors(flow_dir, &params.dirmap, row, col) {
            if !distance[(nr, nc)].is_nan() {
                continue;
            }
            let d = here + lengths(dir);
            distance[(nr, nc)] = d;
            max_distance = max_distance.max(d);
            queue.push_back((nr, nc));
        }
    }

    debug!(metric = ?params.metric, max_distance, "flow distance computed");
    flow_dir.derive(distance, Some(f64::NAN))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use hydrotile_core::{GeoTransform, CRS};

    /// 1 x 5 strip draining east, 30 m cells
    fn strip() -> Raster<u8> {
        let mut fdir = Raster::filled(1, 5, 1u8);
        fdir.set(0, 4, 0).unwrap();
        fdir.set_transform(GeoTransform::new(0.0, 30.0, 30.0, -30.0));
        fdir.set_nodata(Some(255));
        fdir
    }

    fn params(metric: DistanceMetric) -> FlowDistanceParams {
        FlowDistanceParams {
            pour_point: PourPoint::Cell { row: 0, col: 4 },
            dirmap: DirMap::ESRI,
            metric,
        }
    }

    #[test]
    fn counts_cells_to_outlet() {
        let dist = flow_distance(&strip(), &params(DistanceMetric::Cells)).unwrap();
        for col in 0..5 {
            assert_eq!(dist.get(0, col).unwrap(), (4 - col) as f64);
        }
    }

    #[test]
    fn projected_lengths_use_cell_size() {
        let dist = flow_distance(&strip(), &params(DistanceMetric::Geographic)).unwrap();
        assert_relative_eq!(dist.get(0, 0).unwrap(), 120.0);
    }

    #[test]
    fn diagonal_steps() {
        // (0,0) drains SE into (1,1), the outlet
        let mut fdir = Raster::from_vec(vec![2u8, 255, 255, 0], 2, 2).unwrap();
        fdir.set_transform(GeoTransform::new(0.0, 2.0, 1.0, -1.0));
        let mut p = params(DistanceMetric::Geographic);
        p.pour_point = PourPoint::Cell { row: 1, col: 1 };

        let dist = flow_distance(&fdir, &p).unwrap();
        assert_relative_eq!(dist.get(0, 0).unwrap(), 2f64.sqrt());
        assert!(dist.get(0, 1).unwrap().is_nan());

        p.metric = DistanceMetric::Cells;
        assert_eq!(flow_distance(&fdir, &p).unwrap().get(0, 0).unwrap(), 1.0);
    }

    #[test]
    fn geographic_crs_converts_degrees_to_metres() {
        let mut fdir = strip();
        // 0.001 degree cells on the equator
        fdir.set_transform(GeoTransform::new(0.0, 0.0005, 0.001, -0.001));
        fdir.set_crs(Some(CRS::wgs84()));

        let dist = flow_distance(&fdir, &params(DistanceMetric::Geographic)).unwrap();
        assert_relative_eq!(dist.get(0, 0).unwrap(), 4.0 * 111.32, epsilon = 1e-3);
    }

    #[test]
    fn cells_outside_catchment_are_nan() {
        let mut fdir = strip();
        fdir.set(0, 1, 0).unwrap();
        let dist = flow_distance(&fdir, &params(DistanceMetric::Cells)).unwrap();
        assert!(dist.get(0, 0).unwrap().is_nan());
        assert!(dist.get(0, 1).unwrap().is_nan());
        assert_eq!(dist.get(0, 2).unwrap(), 2.0);
    }

    #[test]
    fn pour_point_errors_match_catchment() {
        let mut p = params(DistanceMetric::Cells);
        p.pour_point = PourPoint::Coordinate { x: -1000.0, y: 0.0 };
        assert!(matches!(
            flow_distance(&strip(), &p).unwrap_err(),
            Error::PointOutsideRaster { .. }
        ));
    }
}
