//! PNG plots of rasters with vector overlays.
//!
//! A [`Plot`] is an RGBA canvas laid out as
//! ```text
//!                         title
//!   y axis | map area (raster extent) | colour bar | ticks, label
//!          |         x axis           |
//! ```
//! Raster layers fill the map area, one cell per `scale` x `scale` block.
//! Polylines are given in the raster CRS and projected onto the same area.
//! Text is drawn with embedded-graphics monospace fonts.

use crate::render::{format_tick, linear_ticks, ColormapParams};
use crate::scheme::Rgb;
use embedded_graphics::mono_font::ascii::{FONT_6X10, FONT_9X15_BOLD};
use embedded_graphics::mono_font::{MonoFont, MonoTextStyle};
use embedded_graphics::pixelcolor::{Rgb888, RgbColor};
use embedded_graphics::prelude::{DrawTarget, Drawable, OriginDimensions, Pixel, Point, Size};
use embedded_graphics::text::{Alignment, Baseline, Text, TextStyle, TextStyleBuilder};
use geo_types::LineString;
use hydrotile_core::raster::{Raster, RasterElement};
use hydrotile_core::{Error, Result};
use image::{ImageError, Rgba, RgbaImage};
use std::convert::Infallible;
use std::path::Path;

const PAD: u32 = 6;
const TITLE_HEIGHT: u32 = 28;
/// Left of the map: rotated axis label and tick values
const AXIS_WIDTH: u32 = 76;
/// Below the map: tick values and axis label
const AXIS_HEIGHT: u32 = 36;
const TICK: u32 = 4;
const BAR_GAP: u32 = 14;
const BAR_WIDTH: u32 = 18;
/// Right of the colour bar: tick values and rotated label
const BAR_LABELS: u32 = 64;

const MAP_X: u32 = AXIS_WIDTH;
const MAP_Y: u32 = TITLE_HEIGHT;

const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);
const FRAME: Rgba<u8> = Rgba([40, 40, 40, 255]);
const INK: Rgb888 = Rgb888::new(30, 30, 30);

/// Raster canvas with optional line overlays, axes and colour bar
#[derive(Debug, Clone)]
pub struct Plot {
    image: RgbaImage,
    /// (min_x, max_x, min_y, max_y) of the map area in CRS units
    extent: (f64, f64, f64, f64),
    rows: usize,
    cols: usize,
    scale: u32,
}

impl Plot {
    /// Empty plot sized for `raster`, `scale` pixels per cell
    pub fn for_raster<T: RasterElement>(raster: &Raster<T>, scale: u32) -> Result<Self> {
        let (rows, cols) = raster.shape();
        if rows == 0 || cols == 0 {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }
        if scale == 0 {
            return Err(Error::InvalidParameter {
                name: "scale",
                value: scale.to_string(),
                reason: "must be at least one pixel per cell".into(),
            });
        }

        let map_w = cols as u32 * scale;
        let map_h = rows as u32 * scale;
        let width = AXIS_WIDTH + map_w + BAR_GAP + BAR_WIDTH + BAR_LABELS;
        let height = TITLE_HEIGHT + map_h + AXIS_HEIGHT;

        Ok(Self {
            image: RgbaImage::from_pixel(width, height, BACKGROUND),
            extent: raster.extent(),
            rows,
            cols,
            scale,
        })
    }

    fn map_size(&self) -> (u32, u32) {
        (self.cols as u32 * self.scale, self.rows as u32 * self.scale)
    }

    /// Blend `color` over the pixel at (x, y) if it lies on the canvas
    fn blend(&mut self, x: i64, y: i64, color: [u8; 4]) {
        if x < 0 || y < 0 || x >= self.image.width() as i64 || y >= self.image.height() as i64 {
            return;
        }
        let alpha = color[3] as u32;
        if alpha == 0 {
            return;
        }
        let pixel = self.image.get_pixel_mut(x as u32, y as u32);
        for c in 0..3 {
            let over = color[c] as u32 * alpha;
            let under = pixel[c] as u32 * (255 - alpha);
            pixel[c] = ((over + under) / 255) as u8;
        }
    }

    /// Paint a raster layer into the map area.
    ///
    /// The raster must have the shape the plot was created for. No-data
    /// cells use `params.nodata_color`, which is transparent by default, so
    /// earlier layers show through.
    pub fn draw_raster<T: RasterElement>(
        &mut self,
        raster: &Raster<T>,
        params: &ColormapParams,
    ) -> Result<()> {
        raster.ensure_shape((self.rows, self.cols))?;
        let nodata = raster.nodata();

        for ((row, col), value) in raster.data().indexed_iter() {
            let color = if value.is_nodata(nodata) {
                params.nodata_color
            } else {
                value
                    .to_f64()
                    .map_or(params.nodata_color, |v| params.color_of(v))
            };
            let x0 = (MAP_X + col as u32 * self.scale) as i64;
            let y0 = (MAP_Y + row as u32 * self.scale) as i64;
            for dy in 0..self.scale as i64 {
                for dx in 0..self.scale as i64 {
                    self.blend(x0 + dx, y0 + dy, color);
                }
            }
        }
        Ok(())
    }

    /// Pixel position of a CRS coordinate, relative to the canvas
    fn project(&self, x: f64, y: f64) -> (i64, i64) {
        let (min_x, max_x, min_y, max_y) = self.extent;
        let (map_w, map_h) = self.map_size();
        let px = (x - min_x) / (max_x - min_x) * map_w as f64;
        let py = (max_y - y) / (max_y - min_y) * map_h as f64;
        (
            MAP_X as i64 + px.floor() as i64,
            MAP_Y as i64 + py.floor() as i64,
        )
    }

    fn inside_map(&self, x: i64, y: i64) -> bool {
        let (map_w, map_h) = self.map_size();
        x >= MAP_X as i64
            && y >= MAP_Y as i64
            && x < (MAP_X + map_w) as i64
            && y < (MAP_Y + map_h) as i64
    }

    /// Draw a polyline in CRS coordinates, clipped to the map area
    pub fn draw_line(&mut self, line: &LineString<f64>, color: Rgb) {
        let rgba = color.rgba();
        for segment in line.lines() {
            let from = self.project(segment.start.x, segment.start.y);
            let to = self.project(segment.end.x, segment.end.y);
            for (x, y) in bresenham(from, to) {
                if self.inside_map(x, y) {
                    self.blend(x, y, rgba);
                }
            }
        }
    }

    /// Centred title above the map, shrunk to the small font when it would not fit
    pub fn draw_title(&mut self, title: &str) {
        let width = self.width();
        let fits = |font: &MonoFont<'_>| {
            font.character_size.width * title.chars().count() as u32 <= width - 2 * PAD
        };
        let bold = fits(&FONT_9X15_BOLD);
        self.text(
            title,
            (width / 2) as i64,
            (TITLE_HEIGHT / 2) as i64,
            if bold { &FONT_9X15_BOLD } else { &FONT_6X10 },
            text_style(Alignment::Center, Baseline::Middle),
        );
    }

    /// Frame the map and label both axes with CRS coordinates
    pub fn draw_axes(&mut self, x_label: &str, y_label: &str) {
        let (map_w, map_h) = self.map_size();
        let (min_x, max_x, min_y, max_y) = self.extent;
        self.frame(MAP_X, MAP_Y, map_w, map_h);

        let bottom = (MAP_Y + map_h) as i64;
        let (xs, x_step) = linear_ticks(min_x, max_x, (map_w / 70).clamp(2, 6) as usize);
        for x in xs {
            let (px, _) = self.project(x, max_y);
            if px < MAP_X as i64 || px > (MAP_X + map_w) as i64 {
                continue;
            }
            for dy in 1..=TICK as i64 {
                self.blend(px, bottom + dy, FRAME.0);
            }
            self.text(
                &format_tick(x, x_step),
                px,
                bottom + TICK as i64 + 2,
                &FONT_6X10,
                text_style(Alignment::Center, Baseline::Top),
            );
        }
        self.text(
            x_label,
            (MAP_X + map_w / 2) as i64,
            (self.height() - PAD) as i64,
            &FONT_6X10,
            text_style(Alignment::Center, Baseline::Bottom),
        );

        let left = MAP_X as i64 - 1;
        let (ys, y_step) = linear_ticks(min_y, max_y, (map_h / 40).clamp(2, 8) as usize);
        for y in ys {
            let (_, py) = self.project(min_x, y);
            if py < MAP_Y as i64 || py > (MAP_Y + map_h) as i64 {
                continue;
            }
            for dx in 1..=TICK as i64 {
                self.blend(left - dx, py, FRAME.0);
            }
            self.text(
                &format_tick(y, y_step),
                left - TICK as i64 - 3,
                py,
                &FONT_6X10,
                text_style(Alignment::Right, Baseline::Middle),
            );
        }
        self.vertical_text(y_label, (PAD + 5) as i64, (MAP_Y + map_h / 2) as i64);
    }

    /// Draw a vertical colour bar beside the map, high values at the top,
    /// with its tick values and a rotated label
    pub fn draw_colorbar(&mut self, params: &ColormapParams, label: &str) {
        let (map_w, map_h) = self.map_size();
        let x0 = MAP_X + map_w + BAR_GAP;
        let span = (map_h - 1).max(1) as f64;

        for i in 0..map_h {
            let color = params.bar_color(1.0 - i as f64 / span).rgba();
            for dx in 0..BAR_WIDTH {
                self.blend((x0 + dx) as i64, (MAP_Y + i) as i64, color);
            }
        }
        self.frame(x0, MAP_Y, BAR_WIDTH, map_h);

        let right = (x0 + BAR_WIDTH) as i64;
        for (p, text) in params.ticks() {
            let y = (MAP_Y + map_h) as i64 - 1 - (p * span).round() as i64;
            for dx in 1..=TICK as i64 {
                self.blend(right + dx, y, FRAME.0);
            }
            self.text(
                &text,
                right + TICK as i64 + 3,
                y,
                &FONT_6X10,
                text_style(Alignment::Left, Baseline::Middle),
            );
        }
        self.vertical_text(
            label,
            (self.width() - PAD - 5) as i64,
            (MAP_Y + map_h / 2) as i64,
        );
    }

    fn frame(&mut self, x: u32, y: u32, w: u32, h: u32) {
        let (left, top) = (x as i64 - 1, y as i64 - 1);
        let (right, bottom) = ((x + w) as i64, (y + h) as i64);
        for px in left..=right {
            self.blend(px, top, FRAME.0);
            self.blend(px, bottom, FRAME.0);
        }
        for py in top..=bottom {
            self.blend(left, py, FRAME.0);
            self.blend(right, py, FRAME.0);
        }
    }

    fn text(&mut self, text: &str, x: i64, y: i64, font: &MonoFont<'_>, style: TextStyle) {
        let character = MonoTextStyle::new(font, INK);
        Text::with_text_style(text, Point::new(x as i32, y as i32), character, style)
            .draw(self)
            .ok();
    }

    /// Text reading bottom to top, centred on (x, y)
    fn vertical_text(&mut self, text: &str, x: i64, y: i64) {
        let character = MonoTextStyle::new(&FONT_6X10, INK);
        let mut target = Rotated { plot: self, x, y };
        Text::with_text_style(
            text,
            Point::zero(),
            character,
            text_style(Alignment::Center, Baseline::Middle),
        )
        .draw(&mut target)
        .ok();
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Canvas pixel at the centre of a raster cell
    pub fn cell_pixel(&self, row: usize, col: usize) -> Option<[u8; 4]> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        let x = MAP_X + col as u32 * self.scale + self.scale / 2;
        let y = MAP_Y + row as u32 * self.scale + self.scale / 2;
        Some(self.image.get_pixel(x, y).0)
    }

    /// Write the canvas as PNG
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.image
            .save_with_format(path.as_ref(), image::ImageFormat::Png)
            .map_err(|e| match e {
                ImageError::IoError(io) => Error::Io(io),
                other => Error::Other(format!("PNG encoding failed: {}", other)),
            })
    }
}

fn text_style(alignment: Alignment, baseline: Baseline) -> TextStyle {
    TextStyleBuilder::new()
        .alignment(alignment)
        .baseline(baseline)
        .build()
}

fn ink_rgba(color: Rgb888) -> [u8; 4] {
    [color.r(), color.g(), color.b(), 255]
}

impl OriginDimensions for Plot {
    fn size(&self) -> Size {
        Size::new(self.width(), self.height())
    }
}

impl DrawTarget for Plot {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> std::result::Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            self.blend(point.x as i64, point.y as i64, ink_rgba(color));
        }
        Ok(())
    }
}

/// Draws onto a [`Plot`] turned a quarter counter-clockwise about (x, y)
struct Rotated<'a> {
    plot: &'a mut Plot,
    x: i64,
    y: i64,
}

impl OriginDimensions for Rotated<'_> {
    fn size(&self) -> Size {
        Size::new(self.plot.height(), self.plot.width())
    }
}

impl DrawTarget for Rotated<'_> {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> std::result::Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            let (x, y) = (self.x + point.y as i64, self.y - point.x as i64);
            self.plot.blend(x, y, ink_rgba(color));
        }
        Ok(())
    }
}

/// Pixels on the segment between two points, endpoints included
fn bresenham(from: (i64, i64), to: (i64, i64)) -> Vec<(i64, i64)> {
    let (mut x0, mut y0) = from;
    let (x1, y1) = to;

    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    let mut path = Vec::with_capacity((dx - dy) as usize + 1);

    loop {
        path.push((x0, y0));
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheme::ColorScheme;
    use geo_types::line_string;
    use hydrotile_core::GeoTransform;

    fn ramp() -> Raster<f64> {
        let mut r = Raster::from_vec((0..12).map(f64::from).collect(), 3, 4).unwrap();
        r.set_transform(GeoTransform::new(100.0, 30.0, 10.0, -10.0));
        r
    }

    /// Non-background pixels in [x0, x1) x [y0, y1), with their bounding box size
    fn ink(plot: &Plot, x0: u32, x1: u32, y0: u32, y1: u32) -> (usize, u32, u32) {
        let (mut count, mut min, mut max) = (0, (u32::MAX, u32::MAX), (0, 0));
        for y in y0..y1 {
            for x in x0..x1 {
                if *plot.image().get_pixel(x, y) != BACKGROUND {
                    count += 1;
                    min = (min.0.min(x), min.1.min(y));
                    max = (max.0.max(x), max.1.max(y));
                }
            }
        }
        if count == 0 {
            return (0, 0, 0);
        }
        (count, max.0 - min.0 + 1, max.1 - min.1 + 1)
    }

    #[test]
    fn canvas_layout() {
        let plot = Plot::for_raster(&ramp(), 5).unwrap();
        assert_eq!(plot.width(), AXIS_WIDTH + 20 + BAR_GAP + BAR_WIDTH + BAR_LABELS);
        assert_eq!(plot.height(), TITLE_HEIGHT + 15 + AXIS_HEIGHT);
    }

    #[test]
    fn raster_cells_take_scheme_colors() {
        let raster = ramp();
        let params = ColormapParams::with_range(ColorScheme::Cubehelix, 0.0, 11.0);
        let mut plot = Plot::for_raster(&raster, 4).unwrap();
        plot.draw_raster(&raster, &params).unwrap();

        assert_eq!(plot.cell_pixel(0, 0), Some([0, 0, 0, 255]));
        assert_eq!(plot.cell_pixel(2, 3), Some([255, 255, 255, 255]));
        assert_eq!(plot.cell_pixel(3, 0), None);
    }

    #[test]
    fn nodata_leaves_background() {
        let mut raster = ramp();
        raster.set_nodata(Some(5.0));
        let params = ColormapParams::with_range(ColorScheme::Viridis, 0.0, 11.0);
        let mut plot = Plot::for_raster(&raster, 2).unwrap();
        plot.draw_raster(&raster, &params).unwrap();
        assert_eq!(plot.cell_pixel(1, 1), Some(BACKGROUND.0));
    }

    #[test]
    fn lines_land_on_their_cells() {
        let raster = ramp();
        let mut plot = Plot::for_raster(&raster, 10).unwrap();
        // Horizontal line through the centres of row 1
        let line = line_string![(x: 105.0, y: 15.0), (x: 135.0, y: 15.0)];
        let red = Rgb::new(255, 0, 0);
        plot.draw_line(&line, red);

        for col in 0..4 {
            assert_eq!(plot.cell_pixel(1, col), Some([255, 0, 0, 255]), "col {}", col);
        }
        assert_eq!(plot.cell_pixel(0, 0), Some(BACKGROUND.0));
    }

    #[test]
    fn lines_outside_extent_are_clipped() {
        let raster = ramp();
        let mut plot = Plot::for_raster(&raster, 2).unwrap();
        plot.draw_line(&line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0)], Rgb::BLACK);
        assert!(plot.image().pixels().all(|p| *p == BACKGROUND));
    }

    #[test]
    fn colorbar_runs_top_high() {
        let raster = ramp();
        let params = ColormapParams::with_range(ColorScheme::Cubehelix, 0.0, 1.0);
        let mut plot = Plot::for_raster(&raster, 10).unwrap();
        plot.draw_colorbar(&params, "Value");

        let x = MAP_X + 40 + BAR_GAP + BAR_WIDTH / 2;
        assert_eq!(plot.image().get_pixel(x, MAP_Y).0, [255, 255, 255, 255]);
        assert_eq!(plot.image().get_pixel(x, MAP_Y + 29).0, [0, 0, 0, 255]);
    }

    #[test]
    fn colorbar_has_ticks_values_and_label() {
        let raster = ramp();
        let params = ColormapParams::with_range(ColorScheme::Cubehelix, 0.0, 1.0);
        let mut plot = Plot::for_raster(&raster, 20).unwrap();
        plot.draw_colorbar(&params, "Upstream Cells");

        // Ticks at 0, 0.2, .., 1 with the top one level with the bar's top row
        let bar_right = MAP_X + 80 + BAR_GAP + BAR_WIDTH;
        assert_eq!(plot.image().get_pixel(bar_right + 2, MAP_Y).0, FRAME.0);
        assert_eq!(plot.image().get_pixel(bar_right + 2, MAP_Y + 59).0, FRAME.0);

        let label_x = plot.width() - PAD - 11;
        let values = ink(&plot, bar_right + TICK + 3, label_x, MAP_Y - 5, MAP_Y + 65);
        assert!(values.0 > 0, "tick values missing");

        // Label reads vertically along the bar
        let (count, w, h) = ink(&plot, label_x, plot.width(), 0, plot.height());
        assert!(count > 0);
        assert!(h > w, "label is {}x{}", w, h);
    }

    #[test]
    fn class_colorbar_has_one_block_per_code() {
        let raster = ramp();
        let params = ColormapParams::classes(ColorScheme::Directions, [1.0, 2.0, 4.0]);
        let mut plot = Plot::for_raster(&raster, 10).unwrap();
        plot.draw_colorbar(&params, "Flow Direction");

        let x = MAP_X + 40 + BAR_GAP + BAR_WIDTH / 2;
        assert_eq!(plot.image().get_pixel(x, MAP_Y + 29).0, params.color_of(1.0));
        assert_eq!(plot.image().get_pixel(x, MAP_Y + 15).0, params.color_of(2.0));
        assert_eq!(plot.image().get_pixel(x, MAP_Y).0, params.color_of(4.0));
    }

    #[test]
    fn axes_are_framed_ticked_and_labelled() {
        let raster = ramp();
        let mut plot = Plot::for_raster(&raster, 20).unwrap();
        plot.draw_axes("Longitude", "Latitude");

        // Frame and a tick under x = 120, halfway across the 80 px map
        let bottom = MAP_Y + 60;
        assert_eq!(plot.image().get_pixel(MAP_X - 1, MAP_Y + 10).0, FRAME.0);
        assert_eq!(plot.image().get_pixel(MAP_X + 40, bottom + 2).0, FRAME.0);

        let below = ink(&plot, MAP_X - 20, MAP_X + 100, bottom + TICK + 1, plot.height());
        assert!(below.0 > 0, "x tick values and label missing");

        let (count, w, h) = ink(&plot, 0, PAD + 12, MAP_Y, bottom);
        assert!(count > 0, "y label missing");
        assert!(h > w);

        // Map interior stays clear
        assert_eq!(plot.cell_pixel(1, 1), Some(BACKGROUND.0));
    }

    #[test]
    fn title_sits_above_the_map() {
        let raster = ramp();
        let mut plot = Plot::for_raster(&raster, 20).unwrap();
        assert_eq!(ink(&plot, 0, plot.width(), 0, TITLE_HEIGHT).0, 0);

        plot.draw_title("Flow Accumulation");
        let (count, w, _) = ink(&plot, 0, plot.width(), 0, TITLE_HEIGHT);
        assert!(count > 0);
        assert!(w > 100, "title is {} px wide", w);
        assert_eq!(ink(&plot, 0, plot.width(), TITLE_HEIGHT, plot.height()).0, 0);
    }

    #[test]
    fn long_titles_fall_back_to_the_small_font() {
        let raster = Raster::<f64>::new(2, 2);
        let mut plot = Plot::for_raster(&raster, 1).unwrap();
        let title = "River Network (>100 accumulation)";
        plot.draw_title(title);
        let (_, _, h) = ink(&plot, 0, plot.width(), 0, TITLE_HEIGHT);
        assert!(h <= 10, "title is {} px tall", h);
    }

    #[test]
    fn save_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plot.png");
        let raster = ramp();
        let mut plot = Plot::for_raster(&raster, 3).unwrap();
        plot.draw_raster(&raster, &ColormapParams::new(ColorScheme::Cubehelix))
            .unwrap();
        plot.draw_axes("x", "y");
        plot.save(&path).unwrap();

        let decoded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (plot.width(), plot.height()));
    }

    #[test]
    fn rejects_zero_scale() {
        assert!(Plot::for_raster(&ramp(), 0).is_err());
    }

    #[test]
    fn bresenham_endpoints() {
        let line = bresenham((0, 0), (3, -2));
        assert_eq!(line.first(), Some(&(0, 0)));
        assert_eq!(line.last(), Some(&(3, -2)));
    }
}
