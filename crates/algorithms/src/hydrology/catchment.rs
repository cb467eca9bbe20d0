//! Catchment delineation
//!
//! Collects every cell whose D8 path reaches a pour point. Upstream
//! traversal is a breadth-first search over the reversed flow graph, so
//! catchment size is bounded only by memory.

use hydrotile_core::raster::{DirMap, Direction, Raster, Snap, Window, DIR_NODATA};
use hydrotile_core::{Algorithm, Error, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

/// Outlet of a catchment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PourPoint {
    /// Geographic coordinate in the raster CRS
    Coordinate { x: f64, y: f64 },
    /// Grid cell
    Cell { row: usize, col: usize },
}

impl PourPoint {
    /// Grid cell of this pour point in `raster`
    pub fn locate<T: hydrotile_core::RasterElement>(
        &self,
        raster: &Raster<T>,
    ) -> Result<(usize, usize)> {
        self.locate_snapped(raster, Snap::Center)
    }

    /// Grid cell of this pour point, matching coordinates under `snap`
    pub fn locate_snapped<T: hydrotile_core::RasterElement>(
        &self,
        raster: &Raster<T>,
        snap: Snap,
    ) -> Result<(usize, usize)> {
        match *self {
            PourPoint::Coordinate { x, y } => raster.cell_at_snapped(x, y, snap),
            PourPoint::Cell { row, col } => {
                let (rows, cols) = raster.shape();
                if row >= rows || col >= cols {
                    return Err(Error::IndexOutOfBounds { row, col, rows, cols });
                }
                Ok((row, col))
            }
        }
    }
}

/// The top-left cell
impl Default for PourPoint {
    fn default() -> Self {
        PourPoint::Cell { row: 0, col: 0 }
    }
}

/// Parameters for catchment delineation
#[derive(Debug, Clone, Default)]
pub struct CatchmentParams {
    pub pour_point: PourPoint,
    pub dirmap: DirMap,
}

/// Catchment delineation algorithm
#[derive(Debug, Clone, Default)]
pub struct Catchment;

impl Algorithm for Catchment {
    type Input = Raster<u8>;
    type Output = Raster<u8>;
    type Params = CatchmentParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Catchment"
    }

    fn description(&self) -> &'static str {
        "Delineate the catchment draining to a pour point"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        catchment(&input, &params.dirmap, params.pour_point)
    }
}

/// Locate the pour cell and check it carries a direction code
pub(crate) fn pour_cell(flow_dir: &Raster<u8>, pour_point: PourPoint) -> Result<(usize, usize)> {
    let (row, col) = pour_point.locate(flow_dir)?;
    let code = unsafe { flow_dir.get_unchecked(row, col) };
    if code == DIR_NODATA || flow_dir.is_nodata(code) {
        return Err(Error::InvalidParameter {
            name: "pour_point",
            value: format!("cell ({}, {})", row, col),
            reason: "pour point falls on a no-data cell".into(),
        });
    }
    Ok((row, col))
}

/// Neighbours of (`row`, `col`) whose direction code points back at it.
pub(crate) fn upstream_neighbors<'a>(
    flow_dir: &'a Raster<u8>,
    dirmap: &'a DirMap,
    row: usize,
    col: usize,
) -> impl Iterator<Item = (Direction, usize, usize)> + 'a {
    let (rows, cols) = flow_dir.shape();
    Direction::ALL.into_iter().filter_map(move |dir| {
        let (nr, nc) = dir.step(row, col, rows, cols)?;
        let code = unsafe { flow_dir.get_unchecked(nr, nc) };
        (dirmap.direction(code) == Some(dir.opposite())).then_some((dir, nr, nc))
    })
}

/// Delineate the catchment that drains to `pour_point`.
///
/// # Returns
/// Raster<u8> holding the original direction codes inside the catchment
/// (pour cell included) and `DIR_NODATA` everywhere else.
pub fn catchment(flow_dir: &Raster<u8>, dirmap: &DirMap, pour_point: PourPoint) -> Result<Raster<u8>> {
    let (rows, cols) = flow_dir.shape();
    let (pour_row, pour_col) = pour_cell(flow_dir, pour_point)?;

    let mut output = Array2::<u8>::from_elem((rows, cols), DIR_NODATA);
    let mut queue: VecDeque<(usize, usize)> = VecDeque::new();
    output[(pour_row, pour_col)] = unsafe { flow_dir.get_unchecked(pour_row, pour_col) };
    queue.push_back((pour_row, pour_col));

    let mut cells = 1usize;
    while let Some((row, col)) = queue.pop_front() {
        for (_, nr, nc) in upstream_neighbors(flow_dir, dirmap, row, col) {
            if output[(nr, nc)] != DIR_NODATA {
                continue;
            }
            output[(nr, nc)] = unsafe { flow_dir.get_unchecked(nr, nc) };
            queue.push_back((nr, nc));
            cells += 1;
        }
    }

    debug!(pour_row, pour_col, cells, "catchment delineated");
    flow_dir.derive(output, Some(DIR_NODATA))
}

/// 0/1 mask of a catchment grid (1 = inside)
pub fn catchment_mask(catchment: &Raster<u8>) -> Result<Raster<u8>> {
    let mask = catchment
        .data()
        .mapv(|code| u8::from(code != DIR_NODATA && !catchment.is_nodata(code)));
    catchment.derive(mask, None)
}

/// Crop `raster` to the bounding window of `catchment`.
///
/// Both grids must share a shape. The cropped raster keeps its values and
/// no-data marker and is re-georeferenced to the window's top-left corner.
///
/// # Returns
/// The cropped raster and the window used, in the parent grid's indices
pub fn clip_to_catchment<T: hydrotile_core::RasterElement>(
    raster: &Raster<T>,
    catchment: &Raster<u8>,
) -> Result<(Raster<T>, Window)> {
    raster.ensure_shape(catchment.shape())?;
    let window = Window::bounding(catchment, |code| {
        code != DIR_NODATA && !catchment.is_nodata(code)
    })
    .ok_or(Error::EmptyCatchment)?;

    debug!(
        row = window.row,
        col = window.col,
        rows = window.rows,
        cols = window.cols,
        "clipping to catchment"
    );
    Ok((raster.window(&window)?, window))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hydrology::flow_direction::flow_direction;
    use hydrotile_core::GeoTransform;

    fn dem(rows: usize, cols: usize, f: impl Fn(usize, usize) -> f64) -> Raster<f64> {
        let mut dem = Raster::new(rows, cols);
        dem.set_transform(GeoTransform::new(100.0, 200.0, 10.0, -10.0));
        for row in 0..rows {
            for col in 0..cols {
                dem.set(row, col, f(row, col)).unwrap();
            }
        }
        dem
    }

    /// Ridge at col 3: left half drains west, right half drains east
    fn ridge() -> Raster<u8> {
        let dem = dem(5, 7, |_, col| 10.0 - (col as f64 - 3.0).abs());
        flow_direction(&dem, &DirMap::ESRI).unwrap()
    }

    #[test]
    fn catchment_of_south_slope_outlet() {
        let fdir = flow_direction(&dem(5, 5, |row, _| (5 - row) as f64 * 10.0), &DirMap::ESRI).unwrap();
        let result = catchment(&fdir, &DirMap::ESRI, PourPoint::Cell { row: 4, col: 2 }).unwrap();

        // Straight south flow: only column 2 drains into (4, 2)
        for row in 0..5 {
            for col in 0..5 {
                let inside = result.get(row, col).unwrap() != DIR_NODATA;
                assert_eq!(inside, col == 2, "cell ({}, {})", row, col);
            }
        }
        assert_eq!(result.get(2, 2).unwrap(), fdir.get(2, 2).unwrap());
    }

    #[test]
    fn catchment_stops_at_ridge() {
        let fdir = ridge();
        let result = catchment(&fdir, &DirMap::ESRI, PourPoint::Cell { row: 2, col: 6 }).unwrap();
        let mask = catchment_mask(&result).unwrap();

        assert_eq!(mask.get(2, 6).unwrap(), 1);
        assert_eq!(mask.get(2, 4).unwrap(), 1);
        assert_eq!(mask.get(2, 1).unwrap(), 0, "west flank drains elsewhere");
    }

    #[test]
    fn pour_point_from_coordinate() {
        let fdir = ridge();
        // Cell (2, 6) spans x 160..170, y 170..180
        let by_coord = catchment(&fdir, &DirMap::ESRI, PourPoint::Coordinate { x: 165.0, y: 175.0 }).unwrap();
        let by_cell = catchment(&fdir, &DirMap::ESRI, PourPoint::Cell { row: 2, col: 6 }).unwrap();
        assert_eq!(by_coord.data(), by_cell.data());
    }

    #[test]
    fn corner_snap_moves_to_nearest_corner_cell() {
        let fdir = ridge();
        let point = PourPoint::Coordinate { x: 156.0, y: 174.0 };
        assert_eq!(point.locate(&fdir).unwrap(), (2, 5));
        assert_eq!(point.locate_snapped(&fdir, Snap::Center).unwrap(), (2, 5));
        assert_eq!(point.locate_snapped(&fdir, Snap::Corner).unwrap(), (3, 6));

        let cell = PourPoint::Cell { row: 1, col: 1 };
        assert_eq!(cell.locate_snapped(&fdir, Snap::Corner).unwrap(), (1, 1));
    }

    #[test]
    fn pour_point_outside_extent() {
        let fdir = ridge();
        let err = catchment(&fdir, &DirMap::ESRI, PourPoint::Coordinate { x: 0.0, y: 0.0 }).unwrap_err();
        assert!(matches!(err, Error::PointOutsideRaster { .. }));

        let err = catchment(&fdir, &DirMap::ESRI, PourPoint::Cell { row: 9, col: 0 }).unwrap_err();
        assert!(matches!(err, Error::IndexOutOfBounds { .. }));
    }

    #[test]
    fn pour_point_on_nodata() {
        let mut fdir = ridge();
        fdir.set(2, 6, DIR_NODATA).unwrap();
        let err = catchment(&fdir, &DirMap::ESRI, PourPoint::Cell { row: 2, col: 6 }).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { name: "pour_point", .. }));
    }

    #[test]
    fn long_channel_has_no_depth_limit() {
        // 1 x 40000 strip draining east: deeper than any recursion limit
        let cols = 40_000;
        let fdir = Raster::filled(1, cols, 1u8);
        let result = catchment(&fdir, &DirMap::ESRI, PourPoint::Cell { row: 0, col: cols - 1 }).unwrap();
        let mask = catchment_mask(&result).unwrap();
        assert_eq!(mask.data().iter().filter(|&&v| v == 1).count(), cols);
    }

    #[test]
    fn clip_window_is_georeferenced() {
        let fdir = ridge();
        let result = catchment(&fdir, &DirMap::ESRI, PourPoint::Cell { row: 2, col: 6 }).unwrap();
        let (clipped, window) = clip_to_catchment(&fdir, &result).unwrap();

        // The ridge crest drains east, and each row keeps to itself
        assert_eq!(window, Window::new(2, 3, 1, 4));
        assert_eq!(clipped.shape(), (1, 4));
        let (x, y) = clipped.transform().pixel_to_geo_corner(0, 0);
        assert_eq!((x, y), (130.0, 180.0));
        assert_eq!(clipped.get(0, 0).unwrap(), fdir.get(window.row, window.col).unwrap());
    }

    #[test]
    fn clip_of_empty_catchment_fails() {
        let fdir = ridge();
        let empty = fdir.like(DIR_NODATA);
        let err = clip_to_catchment(&fdir, &empty).unwrap_err();
        assert!(matches!(err, Error::EmptyCatchment));
    }
}
