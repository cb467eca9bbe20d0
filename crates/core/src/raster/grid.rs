//! Main Raster type

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, RasterElement, Window};
use ndarray::{s, Array2, ArrayView2};
use serde::{Deserialize, Serialize};

/// How a geographic point is matched to a cell
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Snap {
    /// The cell containing the point
    #[default]
    Center,
    /// The cell whose top-left corner is nearest the point
    Corner,
}

/// A georeferenced 2D raster grid.
///
/// `Raster<T>` stores values of type `T` in a 2D grid with associated
/// geographic metadata (transform and CRS).
///
/// # Example
///
/// ```ignore
/// use hydrotile_core::Raster;
///
/// let mut dem: Raster<f64> = Raster::new(100, 100);
/// dem.set(10, 20, 842.0)?;
/// let z = dem.get(10, 20)?;
/// ```
#[derive(Debug, Clone)]
pub struct Raster<T: RasterElement> {
    /// Raster data stored in row-major order (row, col)
    data: Array2<T>,
    transform: GeoTransform,
    crs: Option<CRS>,
    nodata: Option<T>,
}

impl<T: RasterElement> Raster<T> {
    /// Create a new raster filled with zeros
    pub fn new(rows: usize, cols: usize) -> Self {
        Self::from_array(Array2::zeros((rows, cols)))
    }

    /// Create a new raster filled with a specific value
    pub fn filled(rows: usize, cols: usize, value: T) -> Self {
        Self::from_array(Array2::from_elem((rows, cols), value))
    }

    /// Create a raster from existing row-major data
    pub fn from_vec(data: Vec<T>, rows: usize, cols: usize) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }

        let array = Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| Error::Other(e.to_string()))?;

        Ok(Self::from_array(array))
    }

    /// Create a raster from an ndarray
    pub fn from_array(data: Array2<T>) -> Self {
        Self {
            data,
            transform: GeoTransform::default(),
            crs: None,
            nodata: None,
        }
    }

    /// Create a raster with the same georeferencing but a different cell type
    pub fn with_same_meta<U: RasterElement>(&self, rows: usize, cols: usize) -> Raster<U> {
        Raster {
            data: Array2::zeros((rows, cols)),
            transform: self.transform,
            crs: self.crs.clone(),
            nodata: None,
        }
    }

    /// Wrap `data` with this raster's georeferencing and the given no-data value.
    ///
    /// Fails with `SizeMismatch` if `data` does not have this raster's shape.
    pub fn derive<U: RasterElement>(&self, data: Array2<U>, nodata: Option<U>) -> Result<Raster<U>> {
        self.ensure_shape(data.dim())?;
        Ok(Raster {
            data,
            transform: self.transform,
            crs: self.crs.clone(),
            nodata,
        })
    }

    /// Create a raster with the same dimensions and metadata, filled with a value
    pub fn like(&self, fill_value: T) -> Self {
        Self {
            data: Array2::from_elem(self.data.dim(), fill_value),
            transform: self.transform,
            crs: self.crs.clone(),
            nodata: self.nodata,
        }
    }

    // Dimensions

    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Total number of cells
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Fail with `SizeMismatch` unless this raster has the given shape
    pub fn ensure_shape(&self, (rows, cols): (usize, usize)) -> Result<()> {
        let (er, ec) = self.shape();
        if er != rows || ec != cols {
            return Err(Error::SizeMismatch { er, ec, ar: rows, ac: cols });
        }
        Ok(())
    }

    // Data access

    /// Get value at (row, col)
    pub fn get(&self, row: usize, col: usize) -> Result<T> {
        self.data
            .get((row, col))
            .copied()
            .ok_or(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            })
    }

    /// Get value at (row, col) without bounds checking
    ///
    /// # Safety
    /// Caller must ensure row < self.rows() and col < self.cols()
    pub unsafe fn get_unchecked(&self, row: usize, col: usize) -> T {
        unsafe { *self.data.uget((row, col)) }
    }

    /// Set value at (row, col)
    pub fn set(&mut self, row: usize, col: usize, value: T) -> Result<()> {
        if row >= self.rows() || col >= self.cols() {
            return Err(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            });
        }
        self.data[(row, col)] = value;
        Ok(())
    }

    pub fn view(&self) -> ArrayView2<'_, T> {
        self.data.view()
    }

    pub fn data(&self) -> &Array2<T> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Array2<T> {
        &mut self.data
    }

    /// Consume the raster and return the underlying array
    pub fn into_array(self) -> Array2<T> {
        self.data
    }

    // Metadata

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn set_transform(&mut self, transform: GeoTransform) {
        self.transform = transform;
    }

    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    pub fn set_crs(&mut self, crs: Option<CRS>) {
        self.crs = crs;
    }

    pub fn nodata(&self) -> Option<T> {
        self.nodata
    }

    pub fn set_nodata(&mut self, nodata: Option<T>) {
        self.nodata = nodata;
    }

    /// Cell size (assumes square cells)
    pub fn cell_size(&self) -> f64 {
        self.transform.cell_size()
    }

    /// Geographic bounds (min_x, min_y, max_x, max_y)
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.transform.bounds(self.cols(), self.rows())
    }

    /// Plotting extent (min_x, max_x, min_y, max_y)
    pub fn extent(&self) -> (f64, f64, f64, f64) {
        let (min_x, min_y, max_x, max_y) = self.bounds();
        (min_x, max_x, min_y, max_y)
    }

    // Coordinate conversion

    /// Geographic coordinates of the centre of (col, row)
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> (f64, f64) {
        self.transform.pixel_to_geo(col, row)
    }

    /// Fractional pixel coordinates (col, row) of a geographic point
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        self.transform.geo_to_pixel(x, y)
    }

    /// Cell (row, col) containing the geographic point (x, y)
    pub fn cell_at(&self, x: f64, y: f64) -> Result<(usize, usize)> {
        self.cell_at_snapped(x, y, Snap::Center)
    }

    /// Cell (row, col) of the geographic point (x, y) under `snap`
    pub fn cell_at_snapped(&self, x: f64, y: f64, snap: Snap) -> Result<(usize, usize)> {
        let (col, row) = self.geo_to_pixel(x, y);
        if !col.is_finite() || !row.is_finite() {
            return Err(Error::PointOutsideRaster { x, y });
        }

        let (col, row) = match snap {
            Snap::Center => (col.floor(), row.floor()),
            Snap::Corner => (col.round(), row.round()),
        };
        if col < 0.0 || row < 0.0 || col >= self.cols() as f64 || row >= self.rows() as f64 {
            return Err(Error::PointOutsideRaster { x, y });
        }

        Ok((row as usize, col as usize))
    }

    /// Copy a window of this raster into a new, re-georeferenced raster
    pub fn window(&self, window: &Window) -> Result<Self> {
        let (rows, cols) = self.shape();
        if !window.fits(rows, cols) {
            return Err(Error::IndexOutOfBounds {
                row: window.row + window.rows.saturating_sub(1),
                col: window.col + window.cols.saturating_sub(1),
                rows,
                cols,
            });
        }

        let data = self
            .data
            .slice(s![
                window.row..window.row + window.rows,
                window.col..window.col + window.cols
            ])
            .to_owned();

        Ok(Self {
            data,
            transform: self.transform.shifted(window.col, window.row),
            crs: self.crs.clone(),
            nodata: self.nodata,
        })
    }

    // Value checks

    pub fn is_nodata(&self, value: T) -> bool {
        value.is_nodata(self.nodata)
    }

    /// Check if cell at (row, col) contains no-data
    pub fn is_nodata_at(&self, row: usize, col: usize) -> Result<bool> {
        let value = self.get(row, col)?;
        Ok(self.is_nodata(value))
    }

    /// Number of cells holding valid data
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|&&v| !self.is_nodata(v)).count()
    }

    // Statistics

    /// Calculate basic statistics (min, max, mean, count of valid cells)
    pub fn statistics(&self) -> RasterStatistics<T> {
        let mut min: Option<T> = None;
        let mut max: Option<T> = None;
        let mut sum: f64 = 0.0;
        let mut count: usize = 0;

        for &value in self.data.iter() {
            if self.is_nodata(value) {
                continue;
            }

            if min.map_or(true, |m| value < m) {
                min = Some(value);
            }
            if max.map_or(true, |m| value > m) {
                max = Some(value);
            }

            if let Some(v) = value.to_f64() {
                sum += v;
                count += 1;
            }
        }

        RasterStatistics {
            min,
            max,
            mean: (count > 0).then(|| sum / count as f64),
            valid_count: count,
            nodata_count: self.len() - count,
        }
    }
}

/// Basic statistics for a raster
#[derive(Debug, Clone)]
pub struct RasterStatistics<T> {
    pub min: Option<T>,
    pub max: Option<T>,
    pub mean: Option<f64>,
    pub valid_count: usize,
    pub nodata_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raster_creation() {
        let raster: Raster<f32> = Raster::new(100, 200);
        assert_eq!(raster.rows(), 100);
        assert_eq!(raster.cols(), 200);
        assert_eq!(raster.shape(), (100, 200));
    }

    #[test]
    fn test_raster_access() {
        let mut raster: Raster<f32> = Raster::new(10, 10);
        raster.set(5, 5, 42.0).unwrap();
        assert_eq!(raster.get(5, 5).unwrap(), 42.0);
        assert!(raster.get(10, 0).is_err());
    }

    #[test]
    fn test_raster_statistics() {
        let mut raster: Raster<f32> = Raster::new(10, 10);
        for i in 0..10 {
            for j in 0..10 {
                raster.set(i, j, (i * 10 + j) as f32).unwrap();
            }
        }

        let stats = raster.statistics();
        assert_eq!(stats.min, Some(0.0));
        assert_eq!(stats.max, Some(99.0));
        assert_eq!(stats.valid_count, 100);
    }

    #[test]
    fn test_corner_snap_picks_nearest_corner() {
        let mut dem: Raster<f64> = Raster::new(4, 5);
        dem.set_transform(GeoTransform::new(10.0, 20.0, 2.0, -2.0));

        // (1.6, 2.4) in pixel space: contained in (2, 1), nearest corner is (2, 2)
        assert_eq!(dem.cell_at_snapped(13.2, 15.2, Snap::Center).unwrap(), (2, 1));
        assert_eq!(dem.cell_at_snapped(13.2, 15.2, Snap::Corner).unwrap(), (2, 2));
        assert_eq!(dem.cell_at_snapped(10.1, 19.9, Snap::Corner).unwrap(), (0, 0));

        // The last half cell rounds past the edge
        assert!(dem.cell_at_snapped(19.5, 15.0, Snap::Corner).is_err());
        assert_eq!(dem.cell_at_snapped(19.5, 15.0, Snap::Center).unwrap(), (2, 4));
    }

    #[test]
    fn test_cell_at_resolves_containing_cell() {
        let mut dem: Raster<f64> = Raster::new(4, 5);
        dem.set_transform(GeoTransform::new(10.0, 20.0, 2.0, -2.0));

        assert_eq!(dem.cell_at(10.1, 19.9).unwrap(), (0, 0));
        assert_eq!(dem.cell_at(15.0, 15.0).unwrap(), (2, 2));
        assert_eq!(dem.cell_at(19.99, 12.01).unwrap(), (3, 4));

        assert!(matches!(
            dem.cell_at(9.0, 15.0),
            Err(Error::PointOutsideRaster { .. })
        ));
        assert!(dem.cell_at(15.0, 12.0).is_err());
        assert!(dem.cell_at(f64::NAN, 15.0).is_err());
    }

    #[test]
    fn test_window_shifts_georeferencing() {
        let mut dem: Raster<f64> = Raster::new(6, 6);
        dem.set_transform(GeoTransform::new(0.0, 6.0, 1.0, -1.0));
        dem.set(3, 4, 7.0).unwrap();
        dem.set_nodata(Some(-9999.0));

        let sub = dem.window(&Window::new(2, 3, 3, 2)).unwrap();
        assert_eq!(sub.shape(), (3, 2));
        assert_eq!(sub.get(1, 1).unwrap(), 7.0);
        assert_eq!(sub.pixel_to_geo(1, 1), dem.pixel_to_geo(4, 3));
        assert_eq!(sub.nodata(), Some(-9999.0));

        assert!(dem.window(&Window::new(4, 4, 3, 3)).is_err());
    }

    #[test]
    fn test_extent_order() {
        let mut dem: Raster<f64> = Raster::new(2, 4);
        dem.set_transform(GeoTransform::new(-47.0, -22.0, 0.5, -0.5));
        assert_eq!(dem.extent(), (-47.0, -45.0, -23.0, -22.0));
    }

    #[test]
    fn test_derive_checks_shape() {
        let dem: Raster<f64> = Raster::new(3, 3);
        assert!(dem.derive(Array2::<u8>::zeros((3, 3)), Some(255)).is_ok());
        assert!(matches!(
            dem.derive(Array2::<u8>::zeros((2, 3)), None),
            Err(Error::SizeMismatch { .. })
        ));
    }
}
