//! Rectangular sub-grids of a raster

use super::{Raster, RasterElement};

/// A rectangular block of cells: top-left (`row`, `col`) plus size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub row: usize,
    pub col: usize,
    pub rows: usize,
    pub cols: usize,
}

impl Window {
    pub fn new(row: usize, col: usize, rows: usize, cols: usize) -> Self {
        Self { row, col, rows, cols }
    }

    /// Smallest window containing every cell for which `keep` returns true.
    ///
    /// Returns `None` when no cell matches.
    pub fn bounding<T, F>(raster: &Raster<T>, mut keep: F) -> Option<Self>
    where
        T: RasterElement,
        F: FnMut(T) -> bool,
    {
        let mut min_row = usize::MAX;
        let mut min_col = usize::MAX;
        let mut max_row = 0;
        let mut max_col = 0;

        for ((row, col), &value) in raster.data().indexed_iter() {
            if keep(value) {
                min_row = min_row.min(row);
                min_col = min_col.min(col);
                max_row = max_row.max(row);
                max_col = max_col.max(col);
            }
        }

        if min_row == usize::MAX {
            return None;
        }

        Some(Self::new(
            min_row,
            min_col,
            max_row - min_row + 1,
            max_col - min_col + 1,
        ))
    }

    /// Whether this window fits inside a grid of the given shape
    pub fn fits(&self, rows: usize, cols: usize) -> bool {
        self.rows > 0
            && self.cols > 0
            && self.row + self.rows <= rows
            && self.col + self.cols <= cols
    }

    /// Map a cell of the parent grid into window coordinates
    pub fn to_local(&self, row: usize, col: usize) -> Option<(usize, usize)> {
        if row >= self.row
            && col >= self.col
            && row < self.row + self.rows
            && col < self.col + self.cols
        {
            Some((row - self.row, col - self.col))
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounding_window_of_marked_cells() {
        let mut r: Raster<u8> = Raster::new(6, 8);
        r.set(2, 3, 1).unwrap();
        r.set(4, 6, 1).unwrap();

        let w = Window::bounding(&r, |v| v == 1).unwrap();
        assert_eq!(w, Window::new(2, 3, 3, 4));
        assert_eq!(w.to_local(4, 6), Some((2, 3)));
        assert_eq!(w.to_local(1, 3), None);
        assert!(w.fits(6, 8));
    }

    #[test]
    fn bounding_window_none_when_empty() {
        let r: Raster<u8> = Raster::new(3, 3);
        assert!(Window::bounding(&r, |v| v == 1).is_none());
    }
}
