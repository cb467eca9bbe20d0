//! Value normalization, colour bar ticks and automatic ranges.

use crate::scheme::{evaluate, ColorScheme, Rgb};
use hydrotile_core::raster::{Raster, RasterElement};

/// How data values map onto the [0, 1] color axis.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalization {
    /// `(v - min) / (max - min)`
    Linear,
    /// `ln(v / min) / ln(max / min)`; `min` is raised to at least 1
    Log,
    /// Each listed value is one class, spread evenly over the axis.
    /// Values not in the list render as no-data.
    Classes(Vec<f64>),
}

/// Parameters for colormap rendering.
#[derive(Debug, Clone)]
pub struct ColormapParams {
    /// Color scheme to use.
    pub scheme: ColorScheme,
    /// Minimum value for normalization. Values below this are clamped.
    pub min: f64,
    /// Maximum value for normalization. Values above this are clamped.
    pub max: f64,
    /// Run the scheme from 1 to 0 (matplotlib's `_r` maps).
    pub reverse: bool,
    pub norm: Normalization,
    /// Color for nodata pixels (RGBA). Default: fully transparent.
    pub nodata_color: [u8; 4],
}

impl ColormapParams {
    /// Create params with the given scheme; min/max must be set separately
    /// or use [`auto_params`] to detect from data.
    pub fn new(scheme: ColorScheme) -> Self {
        Self::with_range(scheme, 0.0, 1.0)
    }

    /// Create params with explicit min/max range.
    pub fn with_range(scheme: ColorScheme, min: f64, max: f64) -> Self {
        Self {
            scheme,
            min,
            max,
            reverse: false,
            norm: Normalization::Linear,
            nodata_color: [0, 0, 0, 0],
        }
    }

    /// One class per value, in the given order
    pub fn classes(scheme: ColorScheme, values: impl IntoIterator<Item = f64>) -> Self {
        let values: Vec<f64> = values.into_iter().collect();
        let max = values.len().saturating_sub(1) as f64;
        Self {
            norm: Normalization::Classes(values),
            ..Self::with_range(scheme, 0.0, max)
        }
    }

    pub fn reversed(mut self) -> Self {
        self.reverse = !self.reverse;
        self
    }

    /// Switch to logarithmic normalization, raising `min` to at least 1
    pub fn log(mut self) -> Self {
        self.norm = Normalization::Log;
        self.min = self.min.max(1.0);
        if self.max <= self.min {
            self.max = self.min + 1.0;
        }
        self
    }

    /// Position of `value` on the color axis, `None` if it has no color
    pub fn normalize(&self, value: f64) -> Option<f64> {
        let t = self.position(value)?;
        Some(if self.reverse { 1.0 - t } else { t })
    }

    /// Position of `value` along the colour bar, 0 at the bottom.
    /// Unlike [`normalize`](Self::normalize) this ignores `reverse`.
    pub fn position(&self, value: f64) -> Option<f64> {
        if !value.is_finite() {
            return None;
        }
        let t = match &self.norm {
            Normalization::Linear => {
                let range = self.max - self.min;
                if range.abs() > f64::EPSILON {
                    (value - self.min) / range
                } else {
                    0.0
                }
            }
            Normalization::Log => {
                let min = self.min.max(1.0);
                let span = (self.max / min).ln();
                if span > 0.0 {
                    (value.max(min) / min).ln() / span
                } else {
                    0.0
                }
            }
            Normalization::Classes(values) => {
                let index = values.iter().position(|&v| v == value)?;
                if values.len() > 1 {
                    index as f64 / (values.len() - 1) as f64
                } else {
                    0.0
                }
            }
        };
        Some(t.clamp(0.0, 1.0))
    }

    /// Color at a position of the color axis, honouring `reverse`
    pub fn color_at(&self, t: f64) -> Rgb {
        evaluate(self.scheme, if self.reverse { 1.0 - t } else { t })
    }

    /// Colour bar fill at bar position `p`; classes fill equal blocks
    pub fn bar_color(&self, p: f64) -> Rgb {
        match &self.norm {
            Normalization::Classes(values) if values.len() > 1 => {
                let n = values.len();
                let index = ((p.clamp(0.0, 1.0) * n as f64).floor() as usize).min(n - 1);
                self.color_at(index as f64 / (n - 1) as f64)
            }
            _ => self.color_at(p),
        }
    }

    /// Labelled colour bar ticks as (bar position, label), 0 at the bottom
    pub fn ticks(&self) -> Vec<(f64, String)> {
        match &self.norm {
            Normalization::Classes(values) => {
                let n = values.len() as f64;
                values
                    .iter()
                    .enumerate()
                    .map(|(i, &v)| ((i as f64 + 0.5) / n, format_tick(v, 1.0)))
                    .collect()
            }
            Normalization::Log => {
                let decades = log_ticks(self.min, self.max);
                if decades.len() < 2 {
                    return self.linear_bar_ticks();
                }
                decades
                    .into_iter()
                    .filter_map(|v| Some((self.position(v)?, format_tick(v, v))))
                    .collect()
            }
            Normalization::Linear => self.linear_bar_ticks(),
        }
    }

    fn linear_bar_ticks(&self) -> Vec<(f64, String)> {
        let (values, step) = linear_ticks(self.min, self.max, 5);
        values
            .into_iter()
            .filter_map(|v| Some((self.position(v)?, format_tick(v, step))))
            .collect()
    }

    /// RGBA for a data value
    pub fn color_of(&self, value: f64) -> [u8; 4] {
        match self.normalize(value) {
            Some(t) => evaluate(self.scheme, t).rgba(),
            None => self.nodata_color,
        }
    }
}

/// Auto-detect min/max from a raster, returning `ColormapParams` ready to use.
///
/// Scans all valid (non-nodata) cells to find the data range.
pub fn auto_params<T: RasterElement>(raster: &Raster<T>, scheme: ColorScheme) -> ColormapParams {
    let nodata = raster.nodata();
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;

    for val in raster.data().iter() {
        if val.is_nodata(nodata) {
            continue;
        }
        if let Some(v) = val.to_f64() {
            if v.is_finite() {
                min = min.min(v);
                max = max.max(v);
            }
        }
    }

    // Handle edge case: all nodata or constant raster
    if !min.is_finite() || !max.is_finite() {
        min = 0.0;
        max = 1.0;
    } else if (max - min).abs() < f64::EPSILON {
        max = min + 1.0;
    }

    ColormapParams::with_range(scheme, min, max)
}

/// Round values between `min` and `max` spaced by a 1, 2 or 5 step,
/// aiming for about `target` of them. Returns the values and the step.
pub(crate) fn linear_ticks(min: f64, max: f64, target: usize) -> (Vec<f64>, f64) {
    if !min.is_finite() || !max.is_finite() || max <= min {
        return (if min.is_finite() { vec![min] } else { Vec::new() }, 1.0);
    }
    let raw = (max - min) / target.max(1) as f64;
    let magnitude = 10f64.powf(raw.log10().floor());
    let step = match raw / magnitude {
        r if r <= 1.0 => 1.0,
        r if r <= 2.0 => 2.0,
        r if r <= 5.0 => 5.0,
        _ => 10.0,
    } * magnitude;

    let tolerance = step * 1e-9;
    let first = ((min - tolerance) / step).ceil();
    let ticks = (0..)
        .map(|i| (first + i as f64) * step)
        .take_while(|&v| v <= max + tolerance)
        .map(|v| if v.abs() < tolerance { 0.0 } else { v })
        .collect();
    (ticks, step)
}

/// Powers of ten between `min` and `max`
fn log_ticks(min: f64, max: f64) -> Vec<f64> {
    if min.is_nan() || min <= 0.0 || !max.is_finite() || max < min {
        return Vec::new();
    }
    let lo = (min.log10() - 1e-9).ceil() as i32;
    let hi = (max.log10() + 1e-9).floor() as i32;
    (lo..=hi).map(|k| 10f64.powi(k)).collect()
}

/// Tick label with as many decimals as `step` needs
pub(crate) fn format_tick(value: f64, step: f64) -> String {
    let decimals = if step >= 1.0 || step <= 0.0 {
        0
    } else {
        (-step.log10().floor()) as usize
    };
    let text = format!("{:.*}", decimals, value);
    match text.strip_prefix('-') {
        Some(rest) if rest.chars().all(|c| c == '0' || c == '.') => rest.to_string(),
        _ => text,
    }
}
