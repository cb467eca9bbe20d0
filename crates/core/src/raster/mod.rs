//! Raster data structures and operations

pub mod d8;
mod element;
mod geotransform;
mod grid;
mod window;

pub use d8::{DirMap, Direction, DIR_NODATA, NO_FLOW};
pub use element::RasterElement;
pub use geotransform::GeoTransform;
pub use grid::{Raster, RasterStatistics, Snap};
pub use window::Window;
