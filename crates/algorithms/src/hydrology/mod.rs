//! Hydrological analysis algorithms
//!
//! The single-tile workflow, in pipeline order:
//! - Priority-Flood: optimal O(n log n) depression filling (Barnes 2014)
//! - Resolve flats: drainage gradients over flat areas (Barnes 2014)
//! - Flow direction: D8 single flow direction with a configurable `DirMap`
//! - Catchment: cells draining to a pour point, plus clipping to its window
//! - Flow accumulation: upstream contributing area
//! - Flow distance: flow path length to the pour point
//! - Stream network: binary channel mask and traced river branches

mod catchment;
mod flow_accumulation;
mod flow_direction;
mod flow_distance;
mod priority_flood;
mod resolve_flats;
mod stream_network;

pub use catchment::{
    catchment, catchment_mask, clip_to_catchment, Catchment, CatchmentParams, PourPoint,
};
pub use flow_accumulation::{flow_accumulation, FlowAccumulation};
pub use flow_direction::{flow_direction, FlowDirection};
pub use flow_distance::{flow_distance, DistanceMetric, FlowDistance, FlowDistanceParams};
pub use priority_flood::{priority_flood, priority_flood_flat, PriorityFlood, PriorityFloodParams};
pub use resolve_flats::{resolve_flats, FlatResolution, ResolveFlats, ResolveFlatsParams};
pub use stream_network::{
    extract_river_network, stream_network, Branch, RiverNetwork, RiverNetworkExtraction,
    RiverNetworkInput, RiverNetworkParams, StreamNetworkParams,
};

#[cfg(test)]
mod tests {
    use super::*;
    use hydrotile_core::{Algorithm, DirMap, GeoTransform, Raster};

    #[test]
    fn stages_chain_through_the_algorithm_trait() {
        // Plane dipping south: every column drains straight down
        let mut dem = Raster::new(5, 5);
        dem.set_transform(GeoTransform::new(0.0, 5.0, 1.0, -1.0));
        for row in 0..5 {
            for col in 0..5 {
                dem.set(row, col, 10.0 - row as f64).unwrap();
            }
        }

        let filled = PriorityFlood.execute_default(dem).unwrap();
        let resolved = ResolveFlats.execute_default(filled).unwrap();
        assert_eq!(resolved.unresolved_cells, 0);
        let fdir = FlowDirection.execute_default(resolved.dem).unwrap();

        let pour_point = PourPoint::Cell { row: 4, col: 2 };
        let basin = Catchment
            .execute(
                fdir,
                CatchmentParams {
                    pour_point,
                    dirmap: DirMap::ESRI,
                },
            )
            .unwrap();
        let acc = FlowAccumulation.execute_default(basin.clone()).unwrap();
        assert_eq!(acc.get(4, 2).unwrap(), 5.0);

        let dist = FlowDistance
            .execute(
                basin.clone(),
                FlowDistanceParams {
                    pour_point,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(dist.get(0, 2).unwrap(), 4.0);
        assert!(dist.get(0, 1).unwrap().is_nan());

        let network = RiverNetworkExtraction
            .execute(
                RiverNetworkInput {
                    flow_dir: basin,
                    accumulation: acc,
                },
                RiverNetworkParams {
                    dirmap: DirMap::ESRI,
                    threshold: StreamNetworkParams { threshold: 1.0 },
                },
            )
            .unwrap();
        assert_eq!(network.len(), 1);
        assert_eq!(network.branches[0].cells, vec![(1, 2), (2, 2), (3, 2), (4, 2)]);
        assert_eq!(RiverNetworkExtraction.name(), "River Network");
    }
}
