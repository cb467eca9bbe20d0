//! Priority-Flood depression filling
//!
//! O(n log n) depression filling. A min-heap processes cells in elevation
//! order, starting from every cell that can drain off the data: the grid
//! border and cells touching no-data.
//!
//! With `epsilon = 0` depressions become perfectly flat at their spill
//! level; [`resolve_flats`](super::resolve_flats) then adds the gradient
//! needed for routing.
//!
//! Reference:
//! Barnes, R., Lehman, C., & Mulla, D. (2014). Priority-Flood: An optimal
//! depression-filling and watershed-labeling algorithm for digital elevation
//! models. *Computers & Geosciences*, 62, 117–127.

use ndarray::Array2;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use hydrotile_core::raster::{Direction, Raster};
use hydrotile_core::{Algorithm, Error, Result};
use tracing::debug;

/// A cell in the priority queue, ordered by elevation (min-heap via reversed Ord).
///
/// `order` breaks ties first-in first-out so equal-elevation fills are deterministic.
#[derive(Debug, Clone)]
struct Cell {
    elevation: f64,
    order: u64,
    row: usize,
    col: usize,
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Cell {}

impl PartialOrd for Cell {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Cell {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse: lower elevation (then earlier insertion) has higher priority
        other
            .elevation
            .partial_cmp(&self.elevation)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.order.cmp(&self.order))
    }
}

/// Parameters for Priority-Flood filling
#[derive(Debug, Clone)]
pub struct PriorityFloodParams {
    /// Minimum elevation increment between a filled cell and the cell it
    /// was reached from. `0.0` leaves filled depressions perfectly flat.
    pub epsilon: f64,
}

impl Default for PriorityFloodParams {
    fn default() -> Self {
        Self { epsilon: 0.0 }
    }
}

/// Priority-Flood fill algorithm
#[derive(Debug, Clone, Default)]
pub struct PriorityFlood;

impl Algorithm for PriorityFlood {
    type Input = Raster<f64>;
    type Output = Raster<f64>;
    type Params = PriorityFloodParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Priority-Flood"
    }

    fn description(&self) -> &'static str {
        "Fill depressions using Priority-Flood (Barnes 2014)"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        priority_flood(&input, params)
    }
}

/// Whether (row, col) can drain off the data: on the grid border or next to no-data
pub(crate) fn is_edge_cell(dem: &Raster<f64>, row: usize, col: usize) -> bool {
    let (rows, cols) = dem.shape();
    if row == 0 || col == 0 || row == rows - 1 || col == cols - 1 {
        return true;
    }
    Direction::ALL.iter().any(|dir| {
        dir.step(row, col, rows, cols)
            .map_or(true, |(nr, nc)| dem.is_nodata(unsafe { dem.get_unchecked(nr, nc) }))
    })
}

/// Fill depressions in a DEM using the Priority-Flood algorithm.
///
/// # Algorithm
/// 1. Seed a min-heap with every valid edge cell (border or next to no-data)
/// 2. Pop the lowest cell
/// 3. For each unvisited valid neighbour set
///    `output = max(neighbour, popped + epsilon)` and push it
/// 4. Repeat until the heap is empty
///
/// No-data cells are copied through unchanged.
pub fn priority_flood(dem: &Raster<f64>, params: PriorityFloodParams) -> Result<Raster<f64>> {
    let (rows, cols) = dem.shape();
    if rows == 0 || cols == 0 {
        return Err(Error::InvalidDimensions { width: cols, height: rows });
    }
    if !(params.epsilon >= 0.0) {
        return Err(Error::InvalidParameter {
            name: "epsilon",
            value: params.epsilon.to_string(),
            reason: "must be a non-negative number".into(),
        });
    }
    let epsilon = params.epsilon;

    let mut output = dem.data().clone();
    let mut visited = Array2::<bool>::from_elem((rows, cols), false);
    let mut heap = BinaryHeap::new();
    let mut order: u64 = 0;

    // Step 1: seed the queue with cells that drain off the data
    for row in 0..rows {
        for col in 0..cols {
            let val = unsafe { dem.get_unchecked(row, col) };

            if dem.is_nodata(val) {
                visited[(row, col)] = true;
                continue;
            }

            if is_edge_cell(dem, row, col) {
                heap.push(Cell { elevation: val, order, row, col });
                order += 1;
                visited[(row, col)] = true;
            }
        }
    }
    debug!(seeds = heap.len(), "priority-flood seeded");

    let mut raised = 0usize;

    // Step 2: process cells in order of increasing elevation
    while let Some(cell) = heap.pop() {
        for dir in Direction::ALL {
            let Some((nr, nc)) = dir.step(cell.row, cell.col, rows, cols) else {
                continue;
            };

            if visited[(nr, nc)] {
                continue;
            }
            visited[(nr, nc)] = true;

            let neighbor_elev = output[(nr, nc)];

            // Raise cells lower than the spill level of the cell that reached them
            let filled_elev = if neighbor_elev < cell.elevation + epsilon {
                raised += 1;
                cell.elevation + epsilon
            } else {
                neighbor_elev
            };

            output[(nr, nc)] = filled_elev;
            heap.push(Cell {
                elevation: filled_elev,
                order,
                row: nr,
                col: nc,
            });
            order += 1;
        }
    }
    debug!(raised, "priority-flood finished");

    dem.derive(output, dem.nodata())
}

/// Convenience: Priority-Flood with epsilon=0 (flat filling).
pub fn priority_flood_flat(dem: &Raster<f64>) -> Result<Raster<f64>> {
    priority_flood(dem, PriorityFloodParams { epsilon: 0.0 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hydrotile_core::GeoTransform;

    fn create_dem_with_sink() -> Raster<f64> {
        // 7x7 DEM with a depression in the center
        let mut dem = Raster::new(7, 7);
        dem.set_transform(GeoTransform::new(0.0, 7.0, 1.0, -1.0));

        let values = [
            9.0, 9.0, 9.0, 9.0, 9.0, 9.0, 9.0,
            9.0, 8.0, 8.0, 8.0, 8.0, 8.0, 9.0,
            9.0, 8.0, 7.0, 7.0, 7.0, 8.0, 9.0,
            9.0, 8.0, 7.0, 3.0, 7.0, 8.0, 9.0,
            9.0, 8.0, 7.0, 7.0, 7.0, 8.0, 9.0,
            9.0, 8.0, 8.0, 8.0, 8.0, 8.0, 9.0,
            9.0, 9.0, 9.0, 9.0, 9.0, 9.0, 9.0,
        ];

        for (idx, &val) in values.iter().enumerate() {
            dem.set(idx / 7, idx % 7, val).unwrap();
        }

        dem
    }

    /// No valid interior cell may be strictly lower than all its valid neighbours
    fn assert_no_interior_pits(filled: &Raster<f64>) {
        let (rows, cols) = filled.shape();
        for row in 1..rows - 1 {
            for col in 1..cols - 1 {
                let z = filled.get(row, col).unwrap();
                if filled.is_nodata(z) || is_edge_cell(filled, row, col) {
                    continue;
                }
                let lowest = Direction::ALL
                    .iter()
                    .filter_map(|d| d.step(row, col, rows, cols))
                    .map(|(r, c)| filled.get(r, c).unwrap())
                    .fold(f64::INFINITY, f64::min);
                assert!(
                    z >= lowest,
                    "interior pit remains at ({}, {}): z={}, lowest neighbour={}",
                    row, col, z, lowest
                );
            }
        }
    }

    #[test]
    fn test_priority_flood_fills_sink() {
        let dem = create_dem_with_sink();
        let filled = priority_flood(&dem, PriorityFloodParams { epsilon: 0.0 }).unwrap();

        // Ring at 8.0 around a bowl at 7.0: everything inside spills at 8.0
        let center = filled.get(3, 3).unwrap();
        assert!(center >= 7.0, "Sink at (3,3) should be filled to >= 7.0, got {}", center);
        assert_no_interior_pits(&filled);
    }

    #[test]
    fn test_priority_flood_preserves_border() {
        let dem = create_dem_with_sink();
        let filled = priority_flood(&dem, PriorityFloodParams::default()).unwrap();

        assert_eq!(filled.get(0, 0).unwrap(), 9.0);
        assert_eq!(filled.get(0, 3).unwrap(), 9.0);
        assert_eq!(filled.get(6, 6).unwrap(), 9.0);
    }

    #[test]
    fn test_priority_flood_no_change_on_clean_dem() {
        let mut dem = Raster::new(10, 10);
        dem.set_transform(GeoTransform::new(0.0, 10.0, 1.0, -1.0));

        for row in 0..10 {
            for col in 0..10 {
                dem.set(row, col, (row + col) as f64).unwrap();
            }
        }

        let filled = priority_flood(&dem, PriorityFloodParams::default()).unwrap();

        for row in 0..10 {
            for col in 0..10 {
                assert_eq!(filled.get(row, col).unwrap(), dem.get(row, col).unwrap());
            }
        }
    }

    #[test]
    fn test_priority_flood_with_epsilon_creates_gradient() {
        let dem = create_dem_with_sink();
        let filled = priority_flood(&dem, PriorityFloodParams { epsilon: 0.01 }).unwrap();

        let center = filled.get(3, 3).unwrap();
        let ring = filled.get(2, 3).unwrap();

        assert!(center > ring, "Epsilon should create gradient: center={}, ring={}", center, ring);
    }

    #[test]
    fn test_priority_flood_never_lowers_elevation() {
        let dem = create_dem_with_sink();
        let filled = priority_flood(&dem, PriorityFloodParams::default()).unwrap();

        for ((row, col), &orig) in dem.data().indexed_iter() {
            let fill = filled.get(row, col).unwrap();
            assert!(
                fill >= orig,
                "Priority-Flood must never lower elevation at ({}, {}): orig={}, fill={}",
                row, col, orig, fill
            );
        }
    }

    #[test]
    fn test_priority_flood_outlet_respects_low_border() {
        // 5x5 DEM: border=10 except outlet at (4,2)=2, center sink at (2,2)=1
        let mut dem = Raster::new(5, 5);
        dem.set_transform(GeoTransform::new(0.0, 5.0, 1.0, -1.0));

        for row in 0..5 {
            for col in 0..5 {
                let is_border = row == 0 || row == 4 || col == 0 || col == 4;
                dem.set(row, col, if is_border { 10.0 } else { 5.0 }).unwrap();
            }
        }
        dem.set(2, 2, 1.0).unwrap();
        dem.set(4, 2, 2.0).unwrap();

        let filled = priority_flood_flat(&dem).unwrap();

        // The interior drains through the outlet, so the sink rises only to 5.0
        assert_eq!(filled.get(2, 2).unwrap(), 5.0);
        assert_no_interior_pits(&filled);
    }

    #[test]
    fn test_priority_flood_drains_into_nodata_hole() {
        // Bowl whose bottom is a no-data void: cells around the void are outlets
        let mut dem = Raster::filled(5, 5, 10.0);
        dem.set_nodata(Some(-32767.0));
        dem.set(2, 2, -32767.0).unwrap();
        dem.set(2, 1, 4.0).unwrap();

        let filled = priority_flood_flat(&dem).unwrap();
        assert_eq!(filled.get(2, 1).unwrap(), 4.0, "cell next to the void is an outlet");
        assert_eq!(filled.get(2, 2).unwrap(), -32767.0, "no-data copied through");
        assert_eq!(filled.nodata(), Some(-32767.0));
    }

    #[test]
    fn test_priority_flood_rejects_negative_epsilon() {
        let dem = create_dem_with_sink();
        assert!(priority_flood(&dem, PriorityFloodParams { epsilon: -1.0 }).is_err());
    }
}
