//! Flat resolution
//!
//! Depression filling with `epsilon = 0` leaves perfectly flat areas where
//! D8 routing finds no downslope neighbour. This module imposes a tiny
//! gradient across every drainable flat so that flow leaves it through its
//! low edge, preferring paths that stay away from higher surrounding terrain.
//!
//! Two breadth-first gradients are built per flat:
//! - *towards lower terrain*: steps from the flat's low edge (its outlets)
//! - *away from higher terrain*: steps from the flat's high edge
//!
//! and combined as `2 * towards + (flat_height - away)`. The conditioned
//! DEM is `dem + epsilon * increment`.
//!
//! Reference:
//! Barnes, R., Lehman, C., & Mulla, D. (2014). An efficient assignment of
//! drainage direction over flat surfaces in raster digital elevation models.
//! *Computers & Geosciences*, 62, 128–135.

use super::priority_flood::is_edge_cell;
use hydrotile_core::raster::{Direction, Raster};
use hydrotile_core::{Algorithm, Error, Result};
use ndarray::Array2;
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Parameters for flat resolution
#[derive(Debug, Clone)]
pub struct ResolveFlatsParams {
    /// Elevation added per unit of combined gradient.
    /// Must stay well below the vertical resolution of the DEM.
    pub epsilon: f64,
}

impl Default for ResolveFlatsParams {
    fn default() -> Self {
        Self { epsilon: 1e-5 }
    }
}

/// Result of flat resolution
#[derive(Debug, Clone)]
pub struct FlatResolution {
    /// Conditioned ("inflated") DEM
    pub dem: Raster<f64>,
    /// Cells that had no downslope neighbour before resolution
    pub flat_cells: usize,
    /// Flat cells left untouched because their flat has no outlet
    pub unresolved_cells: usize,
}

/// Flat resolution algorithm
#[derive(Debug, Clone, Default)]
pub struct ResolveFlats;

impl Algorithm for ResolveFlats {
    type Input = Raster<f64>;
    type Output = FlatResolution;
    type Params = ResolveFlatsParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Resolve Flats"
    }

    fn description(&self) -> &'static str {
        "Impose drainage gradients on flat areas (Barnes et al. 2014)"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        resolve_flats(&input, params)
    }
}

/// Resolve flats in a depression-filled DEM.
///
/// A *flat cell* is a valid cell that is not an edge cell (border or next
/// to no-data) and has no strictly lower valid neighbour. A *low edge* is a
/// drained cell (one with a lower neighbour, or an edge cell) with the same
/// elevation as an adjacent flat cell. A *high edge* is a flat cell next to
/// higher terrain.
///
/// Flats that touch no low edge cannot drain (closed pits in an unfilled
/// DEM); they are reported in `unresolved_cells` and left unchanged.
pub fn resolve_flats(dem: &Raster<f64>, params: ResolveFlatsParams) -> Result<FlatResolution> {
    if !(params.epsilon > 0.0 && params.epsilon.is_finite()) {
        return Err(Error::InvalidParameter {
            name: "epsilon",
            value: params.epsilon.to_string(),
            reason: "must be a positive finite number".into(),
        });
    }

    let (rows, cols) = dem.shape();
    let z = |r: usize, c: usize| unsafe { dem.get_unchecked(r, c) };
    let valid = |r: usize, c: usize| !dem.is_nodata(z(r, c));
    let neighbors = |r: usize, c: usize| {
        Direction::ALL
            .into_iter()
            .filter_map(move |d| d.step(r, c, rows, cols))
    };

    // Step 1: classify flat cells
    let mut is_flat = Array2::<bool>::from_elem((rows, cols), false);
    let mut flat_cells = 0usize;
    for row in 0..rows {
        for col in 0..cols {
            if !valid(row, col) || is_edge_cell(dem, row, col) {
                continue;
            }
            let here = z(row, col);
            let has_lower = neighbors(row, col).any(|(nr, nc)| valid(nr, nc) && z(nr, nc) < here);
            if !has_lower {
                is_flat[(row, col)] = true;
                flat_cells += 1;
            }
        }
    }

    if flat_cells == 0 {
        debug!("no flats to resolve");
        return Ok(FlatResolution {
            dem: dem.clone(),
            flat_cells: 0,
            unresolved_cells: 0,
        });
    }

    // Step 2: find low and high edges
    let mut low_edges: Vec<(usize, usize)> = Vec::new();
    let mut high_edges: Vec<(usize, usize)> = Vec::new();
    for row in 0..rows {
        for col in 0..cols {
            if !valid(row, col) {
                continue;
            }
            let here = z(row, col);
            if is_flat[(row, col)] {
                if neighbors(row, col).any(|(nr, nc)| valid(nr, nc) && z(nr, nc) > here) {
                    high_edges.push((row, col));
                }
            } else if neighbors(row, col).any(|(nr, nc)| is_flat[(nr, nc)] && z(nr, nc) == here) {
                low_edges.push((row, col));
            }
        }
    }

    // Step 3: label each drainable flat by flood fill from its low edges
    // Adjacent flat cells always share an elevation, so a flat is exactly
    // one connected component of flat cells. Low edges stay unlabelled.
    let mut labels = Array2::<u32>::zeros((rows, cols));
    let mut next_label = 0u32;
    let mut queue: VecDeque<(usize, usize)> = VecDeque::new();
    for &(row, col) in &low_edges {
        let elevation = z(row, col);
        for (sr, sc) in neighbors(row, col) {
            if labels[(sr, sc)] != 0 || !is_flat[(sr, sc)] || z(sr, sc) != elevation {
                continue;
            }
            next_label += 1;
            labels[(sr, sc)] = next_label;
            queue.push_back((sr, sc));
            while let Some((r, c)) = queue.pop_front() {
                for (nr, nc) in neighbors(r, c) {
                    if labels[(nr, nc)] == 0 && is_flat[(nr, nc)] {
                        labels[(nr, nc)] = next_label;
                        queue.push_back((nr, nc));
                    }
                }
            }
        }
    }

    // Step 4: gradient away from higher terrain
    let mut away = Array2::<u32>::zeros((rows, cols));
    let mut flat_height = vec![0u32; next_label as usize + 1];
    for &(row, col) in &high_edges {
        if labels[(row, col)] != 0 {
            away[(row, col)] = 1;
            queue.push_back((row, col));
        }
    }
    while let Some((r, c)) = queue.pop_front() {
        let label = labels[(r, c)];
        let step = away[(r, c)];
        flat_height[label as usize] = flat_height[label as usize].max(step);
        for (nr, nc) in neighbors(r, c) {
            if is_flat[(nr, nc)] && labels[(nr, nc)] == label && away[(nr, nc)] == 0 {
                away[(nr, nc)] = step + 1;
                queue.push_back((nr, nc));
            }
        }
    }

    // Step 5: gradient towards lower terrain
    let mut towards = Array2::<u32>::zeros((rows, cols));
    let mut reached = Array2::<bool>::from_elem((rows, cols), false);
    for &(row, col) in &low_edges {
        reached[(row, col)] = true;
        queue.push_back((row, col));
    }
    while let Some((r, c)) = queue.pop_front() {
        let elevation = z(r, c);
        let step = towards[(r, c)];
        for (nr, nc) in neighbors(r, c) {
            if is_flat[(nr, nc)] && !reached[(nr, nc)] && z(nr, nc) == elevation {
                reached[(nr, nc)] = true;
                towards[(nr, nc)] = step + 1;
                queue.push_back((nr, nc));
            }
        }
    }

    // Step 6: combine gradients and inflate
    let mut output = dem.data().clone();
    let mut unresolved_cells = 0usize;
    for ((row, col), &flat) in is_flat.indexed_iter() {
        if !flat {
            continue;
        }
        let label = labels[(row, col)];
        if label == 0 {
            unresolved_cells += 1;
            continue;
        }
        let mut increment = 2 * towards[(row, col)] as u64;
        let from_high = away[(row, col)];
        if from_high > 0 {
            increment += (flat_height[label as usize] - from_high) as u64;
        }
        output[(row, col)] += params.epsilon * increment as f64;
    }

    debug!(
        flats = next_label,
        flat_cells,
        low_edges = low_edges.len(),
        high_edges = high_edges.len(),
        "flat gradients applied"
    );
    if unresolved_cells > 0 {
        warn!(unresolved_cells, "flat cells without an outlet were left unchanged");
    }

    Ok(FlatResolution {
        dem: dem.derive(output, dem.nodata())?,
        flat_cells,
        unresolved_cells,
    })
}
