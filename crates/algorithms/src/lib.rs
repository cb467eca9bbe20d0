//! # Hydrotile Algorithms
//!
//! Hydrological analysis of a single DEM tile: depression filling, flat
//! resolution, D8 routing, catchment delineation, accumulation, flow
//! distance and river-network extraction.
//!
//! Flow direction runs row-parallel with rayon when the default `parallel`
//! feature is enabled.

pub mod hydrology;
mod maybe_rayon;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::hydrology::{
        catchment, catchment_mask, clip_to_catchment, extract_river_network, flow_accumulation,
        flow_direction, flow_distance, priority_flood, resolve_flats, stream_network,
        DistanceMetric, FlatResolution, FlowDistanceParams, PourPoint, PriorityFloodParams,
        ResolveFlatsParams, RiverNetwork, StreamNetworkParams,
    };
    pub use hydrotile_core::prelude::*;
}
