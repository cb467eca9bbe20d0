//! # Hydrotile Colormap
//!
//! Color mapping and PNG plotting for hydrotile rasters.
//!
//! Color schemes are multi-stop ramps (plus the Cubehelix helix and a
//! discrete palette for D8 direction codes). [`ColormapParams`] adds range,
//! normalization and reversal; [`Plot`] paints rasters, river polylines,
//! labelled axes and a colour bar onto a PNG canvas.
//!
//! ## Usage
//!
//! ```ignore
//! use hydrotile_colormap::{auto_params, ColorScheme, Plot};
//!
//! let params = auto_params(&accumulation, ColorScheme::Cubehelix).log();
//! let mut plot = Plot::for_raster(&accumulation, 4)?;
//! plot.draw_raster(&accumulation, &params)?;
//! plot.draw_title("Flow Accumulation");
//! plot.draw_axes("Longitude", "Latitude");
//! plot.draw_colorbar(&params, "Upstream Cells");
//! plot.save("accumulation.png")?;
//! ```

mod plot;
mod render;
mod scheme;

pub use plot::Plot;
pub use render::{auto_params, ColormapParams, Normalization};
pub use scheme::{evaluate, line_color, ColorScheme, ColorStop, Rgb, LINE_PALETTE};
