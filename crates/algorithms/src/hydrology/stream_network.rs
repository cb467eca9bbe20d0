//! Stream network extraction
//!
//! Two views of the same channel network:
//! - `stream_network`: binary raster of cells whose accumulation exceeds a
//!   threshold
//! - `extract_river_network`: the same cells traced into branches
//!   (polylines of cell centres) that export to GeoJSON
//!
//! Branches start at channel heads (no upstream stream cell) and at
//! junctions (two or more upstream stream cells). Each follows the flow
//! directions downstream and ends at the next junction, which it includes,
//! or at the last stream cell before the channel leaves the network.

use geo::{BoundingRect, Euclidean, Length, Rect};
use geo_types::{Coord, Geometry, LineString, MultiLineString};
use hydrotile_core::raster::{DirMap, Raster, DIR_NODATA};
use hydrotile_core::vector::{AttributeValue, Feature, FeatureCollection};
use hydrotile_core::{Algorithm, Error, Result};
use ndarray::Array2;
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Parameters for stream network extraction
#[derive(Debug, Clone)]
pub struct StreamNetworkParams {
    /// Flow accumulation threshold (in cell counts).
    /// Cells with accumulation strictly greater than this are streams.
    /// Default: 100.0
    pub threshold: f64,
}

impl Default for StreamNetworkParams {
    fn default() -> Self {
        Self { threshold: 100.0 }
    }
}

/// Extract a binary stream mask from flow accumulation.
///
/// # Arguments
/// * `flow_acc` - Flow accumulation raster (from `flow_accumulation`)
/// * `params` - Stream network parameters (threshold)
///
/// # Returns
/// Raster<u8> with 1 = stream cell, 0 = non-stream cell
pub fn stream_network(flow_acc: &Raster<f64>, params: StreamNetworkParams) -> Result<Raster<u8>> {
    check_threshold(params.threshold)?;
    let threshold = params.threshold;

    let output = flow_acc.data().mapv(|acc| {
        u8::from(!acc.is_nan() && !flow_acc.is_nodata(acc) && acc > threshold)
    });

    flow_acc.derive(output, None)
}

fn check_threshold(threshold: f64) -> Result<()> {
    if threshold.is_finite() && threshold >= 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidParameter {
            name: "threshold",
            value: threshold.to_string(),
            reason: "must be a finite, non-negative cell count".into(),
        })
    }
}

/// One channel segment of a river network
#[derive(Debug, Clone)]
pub struct Branch {
    pub id: usize,
    /// Cells from upstream to downstream, as (row, col)
    pub cells: Vec<(usize, usize)>,
    /// Cell centres in the raster CRS
    pub line: LineString<f64>,
}

impl Branch {
    /// Planimetric length in CRS units
    pub fn length(&self) -> f64 {
        self.line.length::<Euclidean>()
    }
}

/// Branches extracted at one accumulation threshold
#[derive(Debug, Clone)]
pub struct RiverNetwork {
    pub threshold: f64,
    pub branches: Vec<Branch>,
}

impl RiverNetwork {
    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    /// All cells touched by any branch
    pub fn covered_cells(&self) -> BTreeSet<(usize, usize)> {
        self.branches
            .iter()
            .flat_map(|b| b.cells.iter().copied())
            .collect()
    }

    /// Bounding rectangle of all branches, `None` for an empty network
    pub fn bounds(&self) -> Option<Rect<f64>> {
        self.to_multi_line_string().bounding_rect()
    }

    pub fn to_multi_line_string(&self) -> MultiLineString<f64> {
        MultiLineString::new(self.branches.iter().map(|b| b.line.clone()).collect())
    }

    /// One `LineString` feature per branch
    pub fn to_feature_collection(&self) -> FeatureCollection {
        let mut fc = FeatureCollection::new();
        for branch in &self.branches {
            let mut feature = Feature::new(Geometry::LineString(branch.line.clone()));
            feature.id = Some(branch.id.to_string());
            feature.set_property("threshold", AttributeValue::Float(self.threshold));
            feature.set_property("cells", AttributeValue::Int(branch.cells.len() as i64));
            feature.set_property("length", AttributeValue::Float(branch.length()));
            fc.push(feature);
        }
        fc
    }

    /// GeoJSON `FeatureCollection` of the branches
    pub fn to_geojson(&self) -> Result<Value> {
        self.to_feature_collection().to_geojson()
    }
}

/// River network extraction algorithm
#[derive(Debug, Clone, Default)]
pub struct RiverNetworkExtraction;

/// Inputs for [`RiverNetworkExtraction`]
#[derive(Debug, Clone)]
pub struct RiverNetworkInput {
    pub flow_dir: Raster<u8>,
    pub accumulation: Raster<f64>,
}

/// Parameters for [`RiverNetworkExtraction`]
#[derive(Debug, Clone, Default)]
pub struct RiverNetworkParams {
    pub dirmap: DirMap,
    pub threshold: StreamNetworkParams,
}

impl Algorithm for RiverNetworkExtraction {
    type Input = RiverNetworkInput;
    type Output = RiverNetwork;
    type Params = RiverNetworkParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "River Network"
    }

    fn description(&self) -> &'static str {
        "Trace channel branches above an accumulation threshold"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        extract_river_network(
            &input.flow_dir,
            &params.dirmap,
            &input.accumulation,
            params.threshold.threshold,
        )
    }
}

/// Trace the channel network of cells with accumulation above `threshold`.
///
/// Stream cells are cells with a valid direction code and accumulation
/// strictly greater than `threshold`. Branches shorter than two cells are
/// dropped.
///
/// # Returns
/// `RiverNetwork` with branches numbered from 0 in raster scan order of
/// their first cell
pub fn extract_river_network(
    flow_dir: &Raster<u8>,
    dirmap: &DirMap,
    accumulation: &Raster<f64>,
    threshold: f64,
) -> Result<RiverNetwork> {
    check_threshold(threshold)?;
    accumulation.ensure_shape(flow_dir.shape())?;
    let (rows, cols) = flow_dir.shape();

    let mut is_stream = Array2::<bool>::from_elem((rows, cols), false);
    let mut stream_cells = 0usize;
    for ((row, col), flag) in is_stream.indexed_iter_mut() {
        let code = unsafe { flow_dir.get_unchecked(row, col) };
        let acc = unsafe { accumulation.get_unchecked(row, col) };
        if code != DIR_NODATA && !flow_dir.is_nodata(code) && !acc.is_nan() && acc > threshold {
            *flag = true;
            stream_cells += 1;
        }
    }

    let downstream = |row: usize, col: usize| {
        let code = unsafe { flow_dir.get_unchecked(row, col) };
        dirmap
            .downstream(code, row, col, rows, cols)
            .filter(|&(nr, nc)| is_stream[(nr, nc)])
    };

    // Upstream stream neighbours per stream cell
    let mut inflows = Array2::<u8>::zeros((rows, cols));
    for row in 0..rows {
        for col in 0..cols {
            if is_stream[(row, col)] {
                if let Some((nr, nc)) = downstream(row, col) {
                    inflows[(nr, nc)] += 1;
                }
            }
        }
    }

    let mut branches = Vec::new();
    for row in 0..rows {
        for col in 0..cols {
            if !is_stream[(row, col)] || inflows[(row, col)] == 1 {
                continue;
            }

            let mut cells = vec![(row, col)];
            let mut current = (row, col);
            while let Some(next) = downstream(current.0, current.1) {
                cells.push(next);
                // Junctions end a branch; malformed cyclic grids end at the stream size
                if inflows[next] != 1 || cells.len() > stream_cells {
                    break;
                }
                current = next;
            }

            if cells.len() < 2 {
                continue;
            }

            let line: LineString<f64> = cells
                .iter()
                .map(|&(r, c)| {
                    let (x, y) = flow_dir.pixel_to_geo(c, r);
                    Coord { x, y }
                })
                .collect();
            branches.push(Branch {
                id: branches.len(),
                cells,
                line,
            });
        }
    }

    debug!(threshold, stream_cells, branches = branches.len(), "river network traced");
    if branches.is_empty() {
        warn!(threshold, "no channel exceeds the accumulation threshold");
    }

    Ok(RiverNetwork { threshold, branches })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hydrology::{flow_accumulation, flow_direction, priority_flood_flat};
    use hydrotile_core::GeoTransform;

    fn dem(rows: usize, cols: usize, f: impl Fn(usize, usize) -> f64) -> Raster<f64> {
        let mut dem = Raster::new(rows, cols);
        dem.set_transform(GeoTransform::new(0.0, rows as f64, 1.0, -1.0));
        for row in 0..rows {
            for col in 0..cols {
                dem.set(row, col, f(row, col)).unwrap();
            }
        }
        dem
    }

    /// V-shaped valley: flanks drain sideways into col 3, which drains south.
    /// Accumulation along the channel is 7 * (row + 1).
    fn valley() -> (Raster<u8>, Raster<f64>) {
        let dem = dem(9, 7, |row, col| {
            let across = (col as f64 - 3.0).abs() * 10.0;
            let along = (9 - row) as f64;
            across + along
        });
        let filled = priority_flood_flat(&dem).unwrap();
        let fdir = flow_direction(&filled, &DirMap::ESRI).unwrap();
        let acc = flow_accumulation(&fdir, &DirMap::ESRI).unwrap();
        (fdir, acc)
    }

    #[test]
    fn test_stream_network_threshold_is_strict() {
        let mut acc = Raster::from_vec(vec![4.0, 5.0, 6.0, f64::NAN], 1, 4).unwrap();
        acc.set_nodata(Some(f64::NAN));
        let streams = stream_network(&acc, StreamNetworkParams { threshold: 5.0 }).unwrap();
        assert_eq!(streams.data().as_slice().unwrap(), &[0, 0, 1, 0]);
    }

    #[test]
    fn test_stream_network_binary_output() {
        let (_, acc) = valley();
        let streams = stream_network(&acc, StreamNetworkParams { threshold: 2.0 }).unwrap();
        assert!(streams.data().iter().all(|&v| v == 0 || v == 1));
        assert_eq!(streams.get(8, 3).unwrap(), 1, "valley outlet is a stream");
        assert_eq!(streams.get(0, 0).unwrap(), 0, "ridge top is not");
    }

    #[test]
    fn test_stream_network_rejects_negative_threshold() {
        let (_, acc) = valley();
        assert!(stream_network(&acc, StreamNetworkParams { threshold: -1.0 }).is_err());
    }

    #[test]
    fn single_channel_is_one_branch() {
        let (fdir, acc) = valley();
        let network = extract_river_network(&fdir, &DirMap::ESRI, &acc, 6.0).unwrap();

        assert_eq!(network.len(), 1);
        let branch = &network.branches[0];
        assert!(branch.cells.iter().all(|&(_, col)| col == 3));
        assert_eq!(*branch.cells.last().unwrap(), (8, 3));
        assert_eq!(branch.line.0.len(), branch.cells.len());
        // Cell centres
        assert_eq!(branch.line.0[0], Coord { x: 3.5, y: 9.0 - branch.cells[0].0 as f64 - 0.5 });
    }

    #[test]
    fn junction_splits_branches() {
        // Hand-built Y: heads at (0,0) and (0,2) meet at (1,1), then south
        let mut fdir = Raster::filled(4, 3, 0u8);
        fdir.set(0, 0, 2).unwrap(); // SE
        fdir.set(0, 2, 8).unwrap(); // SW
        fdir.set(1, 1, 4).unwrap(); // S
        fdir.set(2, 1, 4).unwrap(); // S
        let acc = Raster::filled(4, 3, 10.0);
        let network = extract_river_network(&fdir, &DirMap::ESRI, &acc, 1.0).unwrap();

        let cells: Vec<_> = network.branches.iter().map(|b| b.cells.clone()).collect();
        assert!(cells.contains(&vec![(0, 0), (1, 1)]));
        assert!(cells.contains(&vec![(0, 2), (1, 1)]));
        assert!(cells.contains(&vec![(1, 1), (2, 1), (3, 1)]));
        assert_eq!(network.len(), 3, "isolated single cells are dropped");
    }

    #[test]
    fn higher_threshold_is_subset() {
        let (fdir, acc) = valley();
        let low = extract_river_network(&fdir, &DirMap::ESRI, &acc, 1.0).unwrap();
        let high = extract_river_network(&fdir, &DirMap::ESRI, &acc, 6.0).unwrap();
        assert!(high.covered_cells().is_subset(&low.covered_cells()));
        assert!(high.covered_cells().len() < low.covered_cells().len());
    }

    #[test]
    fn geojson_export() {
        let (fdir, acc) = valley();
        let network = extract_river_network(&fdir, &DirMap::ESRI, &acc, 6.0).unwrap();
        let json = network.to_geojson().unwrap();

        assert_eq!(json["type"], "FeatureCollection");
        let feature = &json["features"][0];
        assert_eq!(feature["geometry"]["type"], "LineString");
        assert_eq!(feature["properties"]["threshold"], 6.0);
        let coords = feature["geometry"]["coordinates"].as_array().unwrap();
        assert_eq!(coords.len(), network.branches[0].cells.len());

        let rect = network.bounds().unwrap();
        assert_eq!(rect.min().x, 3.5);
    }

    #[test]
    fn empty_network_above_max_accumulation() {
        let (fdir, acc) = valley();
        let network = extract_river_network(&fdir, &DirMap::ESRI, &acc, 1e6).unwrap();
        assert!(network.is_empty());
        assert!(network.bounds().is_none());
    }

    #[test]
    fn mismatched_shapes() {
        let (fdir, _) = valley();
        let acc = Raster::filled(2, 2, 1.0);
        assert!(matches!(
            extract_river_network(&fdir, &DirMap::ESRI, &acc, 1.0).unwrap_err(),
            Error::SizeMismatch { .. }
        ));
    }
}
