//! Color schemes and multi-stop interpolation engine.

use std::f64::consts::TAU;

/// RGB color as (r, g, b) with values in 0..=255.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub const BLACK: Self = Self::new(0, 0, 0);
    pub const WHITE: Self = Self::new(255, 255, 255);

    /// Opaque RGBA
    pub const fn rgba(self) -> [u8; 4] {
        [self.r, self.g, self.b, 255]
    }
}

/// A color stop: position in [0, 1] mapped to an RGB color.
#[derive(Debug, Clone, Copy)]
pub struct ColorStop {
    pub t: f64,
    pub color: Rgb,
}

impl ColorStop {
    pub const fn new(t: f64, r: u8, g: u8, b: u8) -> Self {
        Self {
            t,
            color: Rgb::new(r, g, b),
        }
    }
}

/// Available color schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorScheme {
    /// Perceptually uniform purple -> teal -> yellow
    Viridis,
    /// Green (2011) helix from black to white
    Cubehelix,
    /// 8 discrete viridis classes, one per D8 direction code
    Directions,
}

impl ColorScheme {
    /// All available schemes.
    pub const ALL: &[ColorScheme] = &[Self::Viridis, Self::Cubehelix, Self::Directions];

    /// Human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Viridis => "Viridis",
            Self::Cubehelix => "Cubehelix",
            Self::Directions => "Directions",
        }
    }
}

// ─── Color stop definitions ───────────────────────────────────────────

const VIRIDIS_STOPS: &[ColorStop] = &[
    ColorStop::new(0.000, 68, 1, 84),
    ColorStop::new(0.125, 71, 44, 122),
    ColorStop::new(0.250, 59, 81, 139),
    ColorStop::new(0.375, 44, 113, 142),
    ColorStop::new(0.500, 33, 144, 141),
    ColorStop::new(0.625, 39, 173, 129),
    ColorStop::new(0.750, 92, 200, 99),
    ColorStop::new(0.875, 170, 220, 50),
    ColorStop::new(1.000, 253, 231, 37),
];

/// Qualitative palette for overlaid lines (matplotlib "tab10")
pub const LINE_PALETTE: &[Rgb] = &[
    Rgb::new(31, 119, 180),
    Rgb::new(255, 127, 14),
    Rgb::new(44, 160, 44),
    Rgb::new(214, 39, 40),
    Rgb::new(148, 103, 189),
    Rgb::new(140, 86, 75),
    Rgb::new(227, 119, 194),
    Rgb::new(127, 127, 127),
    Rgb::new(188, 189, 34),
    Rgb::new(23, 190, 207),
];

/// Color for the `index`-th line, cycling through [`LINE_PALETTE`]
pub fn line_color(index: usize) -> Rgb {
    LINE_PALETTE[index % LINE_PALETTE.len()]
}

// ─── Interpolation engine ──────────────────────────────────────────────

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

fn lerp_color(c1: Rgb, c2: Rgb, t: f64) -> Rgb {
    Rgb::new(
        lerp(c1.r as f64, c2.r as f64, t).round() as u8,
        lerp(c1.g as f64, c2.g as f64, t).round() as u8,
        lerp(c1.b as f64, c2.b as f64, t).round() as u8,
    )
}

fn multi_stop(stops: &[ColorStop], t: f64) -> Rgb {
    if t <= 0.0 {
        return stops[0].color;
    }
    if t >= 1.0 {
        return stops[stops.len() - 1].color;
    }
    for i in 1..stops.len() {
        if t <= stops[i].t {
            let ratio = (t - stops[i - 1].t) / (stops[i].t - stops[i - 1].t);
            return lerp_color(stops[i - 1].color, stops[i].color, ratio);
        }
    }
    stops[stops.len() - 1].color
}

/// Cubehelix with matplotlib's defaults: start 0.5, rotations -1.5, hue 1, gamma 1
fn cubehelix(t: f64) -> Rgb {
    let l = t.clamp(0.0, 1.0);
    let amp = l * (1.0 - l) / 2.0;
    let phi = TAU * (0.5 / 3.0 - 1.5 * l);
    let (sin, cos) = phi.sin_cos();
    let channel = |p0: f64, p1: f64| {
        ((l + amp * (p0 * cos + p1 * sin)).clamp(0.0, 1.0) * 255.0).round() as u8
    };
    Rgb::new(
        channel(-0.14861, 1.78277),
        channel(-0.29227, -0.90649),
        channel(1.97294, 0.0),
    )
}

/// Evaluate a color scheme at normalized position `t` ∈ [0, 1].
///
/// Continuous schemes interpolate between stops. `Directions` snaps `t` to
/// one of 8 classes, so class `i` of 8 should be passed as `i / 7`.
pub fn evaluate(scheme: ColorScheme, t: f64) -> Rgb {
    match scheme {
        ColorScheme::Viridis => multi_stop(VIRIDIS_STOPS, t),
        ColorScheme::Cubehelix => cubehelix(t),
        ColorScheme::Directions => {
            let class = (t.clamp(0.0, 1.0) * 7.0).round();
            multi_stop(VIRIDIS_STOPS, class / 7.0)
        }
    }
}
