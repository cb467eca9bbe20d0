//! D8 flow direction algorithm
//!
//! Calculates the direction of flow from each cell to its steepest
//! downslope neighbor using the D8 (deterministic eight-node) method.
//!
//! Codes come from a [`DirMap`]; with the default ESRI map:
//! ```text
//!   32  64  128
//!   16   0    1
//!    8   4    2
//! ```
//! `NO_FLOW` (0) marks pits, unresolved flats and edge outlets,
//! `DIR_NODATA` (255) marks no-data.

use crate::maybe_rayon::*;
use hydrotile_core::raster::{DirMap, Direction, Raster, DIR_NODATA, NO_FLOW};
use hydrotile_core::{Algorithm, Error, Result};
use ndarray::Array2;

/// Flow direction algorithm (D8)
#[derive(Debug, Clone, Default)]
pub struct FlowDirection;

impl Algorithm for FlowDirection {
    type Input = Raster<f64>;
    type Output = Raster<u8>;
    type Params = DirMap;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Flow Direction (D8)"
    }

    fn description(&self) -> &'static str {
        "Calculate D8 flow direction from a conditioned DEM"
    }

    fn execute(&self, input: Self::Input, dirmap: Self::Params) -> Result<Self::Output> {
        flow_direction(&input, &dirmap)
    }
}

/// Calculate D8 flow direction from a DEM.
///
/// The input DEM should be hydrologically conditioned (depressions filled,
/// flats resolved) for meaningful results.
///
/// Drop to each neighbour is `(center - neighbour) / distance`, with the
/// distance taken from the x and y cell sizes so non-square cells are
/// weighted correctly. Ties keep the first direction in N, NE, E, SE, S,
/// SW, W, NW order.
///
/// # Returns
/// Raster<u8> with codes from `dirmap`, `NO_FLOW` or `DIR_NODATA`
pub fn flow_direction(dem: &Raster<f64>, dirmap: &DirMap) -> Result<Raster<u8>> {
    let (rows, cols) = dem.shape();
    let (dx, dy) = dem.transform().cell_sizes();
    if !(dx > 0.0 && dy > 0.0) {
        return Err(Error::InvalidParameter {
            name: "cell_size",
            value: format!("{} x {}", dx, dy),
            reason: "cell sizes must be positive".into(),
        });
    }

    let distances: [f64; 8] = Direction::ALL.map(|d| d.distance(dx, dy));

    let output_data: Vec<u8> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![NO_FLOW; cols];

            for col in 0..cols {
                let center = unsafe { dem.get_unchecked(row, col) };

                if dem.is_nodata(center) {
                    row_data[col] = DIR_NODATA;
                    continue;
                }

                let mut max_drop = 0.0_f64;
                let mut best: Option<Direction> = None;

                for dir in Direction::ALL {
                    let Some((nr, nc)) = dir.step(row, col, rows, cols) else {
                        continue;
                    };

                    let neighbor = unsafe { dem.get_unchecked(nr, nc) };
                    if dem.is_nodata(neighbor) {
                        continue;
                    }

                    let drop = (center - neighbor) / distances[dir.index()];
                    if drop > max_drop {
                        max_drop = drop;
                        best = Some(dir);
                    }
                }

                if let Some(dir) = best {
                    row_data[col] = dirmap.code(dir);
                }
            }

            row_data
        })
        .collect();

    let data = Array2::from_shape_vec((rows, cols), output_data)
        .map_err(|e| Error::Other(e.to_string()))?;
    dem.derive(data, Some(DIR_NODATA))
}
