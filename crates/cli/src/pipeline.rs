//! Full single-tile analysis: conditioning, catchment, derived grids,
//! river networks and their plots.

use crate::config::AnalysisConfig;
use crate::spinner;
use anyhow::{Context, Result};
use hydrotile_algorithms::hydrology::{
    catchment, clip_to_catchment, extract_river_network, flow_accumulation, flow_direction,
    flow_distance, priority_flood, resolve_flats, DistanceMetric, FlowDistanceParams, PourPoint,
    PriorityFloodParams, ResolveFlatsParams, RiverNetwork,
};
use hydrotile_colormap::{auto_params, line_color, ColorScheme, ColormapParams, Plot};
use hydrotile_core::io::{read_geotiff, write_geotiff, GeoTiffOptions};
use hydrotile_core::raster::DIR_NODATA;
use hydrotile_core::{DirMap, Raster, RasterElement, Window};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Grids produced by one run
#[derive(Debug)]
pub struct Analysis {
    pub filled: Raster<f64>,
    pub conditioned: Raster<f64>,
    pub flow_dir: Raster<u8>,
    /// Direction codes inside the catchment, clipped to its bounding window
    pub catchment: Raster<u8>,
    /// Position of the clipped grids in the input tile
    pub window: Window,
    /// Pour cell in clipped coordinates
    pub pour_cell: (usize, usize),
    pub accumulation: Raster<f64>,
    pub distance: Raster<f64>,
    /// One network per configured threshold, in the same order
    pub networks: Vec<RiverNetwork>,
}

impl Analysis {
    pub fn catchment_cells(&self) -> usize {
        self.catchment
            .data()
            .iter()
            .filter(|&&c| c != DIR_NODATA)
            .count()
    }

    pub fn max_accumulation(&self) -> f64 {
        self.accumulation.statistics().max.unwrap_or(0.0)
    }

    pub fn max_distance(&self) -> f64 {
        self.distance.statistics().max.unwrap_or(0.0)
    }
}

/// Read the DEM named by `config`, analyse it and write every output
pub fn run(config: &AnalysisConfig) -> Result<Analysis> {
    let dirmap = config.validate()?;
    let dem_path = config
        .dem
        .as_ref()
        .context("No DEM given: pass --dem or set `dem` in the config")?;

    let pb = spinner("Reading DEM...");
    let dem: Raster<f64> = read_geotiff(dem_path, None)
        .with_context(|| format!("Failed to read DEM {}", dem_path.display()))?;
    pb.finish_and_clear();
    info!(
        "DEM {}: {} x {}, cell size {}",
        dem_path.display(),
        dem.cols(),
        dem.rows(),
        dem.cell_size()
    );

    let start = Instant::now();
    let analysis = analyse(&dem, &dirmap, config)?;
    info!("Analysis finished in {:.2?}", start.elapsed());

    write_outputs(&analysis, &dirmap, config)?;
    log_summary(&analysis, config);
    Ok(analysis)
}

/// Run every stage on an in-memory DEM
pub fn analyse(dem: &Raster<f64>, dirmap: &DirMap, config: &AnalysisConfig) -> Result<Analysis> {
    let pb = spinner("Filling depressions...");
    let filled = priority_flood(
        dem,
        PriorityFloodParams {
            epsilon: config.fill_epsilon,
        },
    )
    .context("Failed to fill depressions")?;

    pb.set_message("Resolving flats...");
    let resolved = resolve_flats(
        &filled,
        ResolveFlatsParams {
            epsilon: config.flat_epsilon,
        },
    )
    .context("Failed to resolve flats")?;
    debug!(
        "{} flat cells, {} left unresolved",
        resolved.flat_cells, resolved.unresolved_cells
    );

    pb.set_message("Computing flow direction...");
    let flow_dir =
        flow_direction(&resolved.dem, dirmap).context("Failed to compute flow direction")?;

    pb.set_message("Delineating catchment...");
    let full_pour = config
        .pour_point
        .locate_snapped(&flow_dir, config.snap)
        .context("Pour point is outside the DEM")?;
    let outlet = PourPoint::Cell {
        row: full_pour.0,
        col: full_pour.1,
    };
    let basin = catchment(&flow_dir, dirmap, outlet).context("Failed to delineate catchment")?;
    let (clipped, window) =
        clip_to_catchment(&basin, &basin).context("Failed to clip to catchment")?;
    let pour_cell = window
        .to_local(full_pour.0, full_pour.1)
        .context("Pour point fell outside the clipped catchment")?;
    debug!("Catchment window {:?}, pour cell {:?}", window, pour_cell);

    pb.set_message("Accumulating flow...");
    let accumulation =
        flow_accumulation(&clipped, dirmap).context("Failed to compute flow accumulation")?;

    pb.set_message("Measuring flow distance...");
    let distance = flow_distance(
        &clipped,
        &FlowDistanceParams {
            pour_point: PourPoint::Cell {
                row: pour_cell.0,
                col: pour_cell.1,
            },
            dirmap: *dirmap,
            metric: config.distance_metric,
        },
    )
    .context("Failed to compute flow distance")?;

    pb.set_message("Extracting river networks...");
    let networks = config
        .thresholds
        .iter()
        .map(|&threshold| {
            extract_river_network(&clipped, dirmap, &accumulation, threshold)
                .with_context(|| format!("Failed to extract river network > {}", threshold))
        })
        .collect::<Result<Vec<_>>>()?;
    pb.finish_and_clear();

    Ok(Analysis {
        filled,
        conditioned: resolved.dem,
        flow_dir,
        catchment: clipped,
        window,
        pour_cell,
        accumulation,
        distance,
        networks,
    })
}

/// Plots always; GeoTIFF and GeoJSON when `write_rasters` is set.
/// Returns the paths written.
pub fn write_outputs(
    analysis: &Analysis,
    dirmap: &DirMap,
    config: &AnalysisConfig,
) -> Result<Vec<PathBuf>> {
    let dir = &config.output_dir;
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    let pb = spinner("Rendering plots...");
    let mut written = render_plots(analysis, dirmap, config)?;

    if config.write_rasters {
        pb.set_message("Writing rasters...");
        write_tiff(&analysis.filled, dir, "filled_dem.tif", &mut written)?;
        write_tiff(&analysis.conditioned, dir, "conditioned_dem.tif", &mut written)?;
        write_tiff(&analysis.flow_dir, dir, "flow_direction.tif", &mut written)?;
        write_tiff(&analysis.catchment, dir, "catchment.tif", &mut written)?;
        write_tiff(&analysis.accumulation, dir, "accumulation.tif", &mut written)?;
        write_tiff(&analysis.distance, dir, "distance.tif", &mut written)?;

        for network in &analysis.networks {
            let path = dir.join(format!("river_network_{}.geojson", network.threshold));
            let json = network
                .to_feature_collection()
                .to_geojson_string()
                .context("Failed to encode river network")?;
            fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
            written.push(path);
        }
    }
    pb.finish_and_clear();

    for path in &written {
        debug!("Wrote {}", path.display());
    }
    Ok(written)
}

fn write_tiff<T: RasterElement>(
    raster: &Raster<T>,
    dir: &Path,
    name: &str,
    written: &mut Vec<PathBuf>,
) -> Result<()> {
    let path = dir.join(name);
    write_geotiff(raster, &path, Some(GeoTiffOptions::default()))
        .with_context(|| format!("Failed to write {}", path.display()))?;
    written.push(path);
    Ok(())
}

fn render_plots(
    analysis: &Analysis,
    dirmap: &DirMap,
    config: &AnalysisConfig,
) -> Result<Vec<PathBuf>> {
    let (dir, scale) = (config.output_dir.as_path(), config.plot_scale);
    let geographic = analysis.catchment.crs().map_or(false, |c| c.is_geographic());
    let axes = if geographic {
        ("Longitude", "Latitude")
    } else {
        ("Easting", "Northing")
    };
    let mut written = Vec::new();

    let codes = ColormapParams::classes(
        ColorScheme::Directions,
        dirmap.sorted_codes().iter().map(|&c| f64::from(c)),
    );
    written.push(raster_plot(
        &analysis.catchment,
        &codes,
        axes,
        ("Delineated Catchment", "Flow Direction"),
        &dir.join("catchment.png"),
        scale,
    )?);

    let acc = auto_params(&analysis.accumulation, ColorScheme::Cubehelix).log();
    written.push(raster_plot(
        &analysis.accumulation,
        &acc,
        axes,
        ("Flow Accumulation", "Upstream Cells"),
        &dir.join("accumulation.png"),
        scale,
    )?);

    let units = match config.distance_metric {
        DistanceMetric::Cells => "cells",
        DistanceMetric::Geographic if geographic => "m",
        DistanceMetric::Geographic => "CRS units",
    };
    let dist = auto_params(&analysis.distance, ColorScheme::Cubehelix).reversed();
    let dist_label = format!("Distance to outlet ({})", units);
    written.push(raster_plot(
        &analysis.distance,
        &dist,
        axes,
        ("Flow Distance", dist_label.as_str()),
        &dir.join("distance.png"),
        scale,
    )?);

    for network in &analysis.networks {
        let mut plot = Plot::for_raster(&analysis.catchment, scale)?;
        for (i, branch) in network.branches.iter().enumerate() {
            plot.draw_line(&branch.line, line_color(i));
        }
        plot.draw_title(&format!("River Network (>{} accumulation)", network.threshold));
        plot.draw_axes(axes.0, axes.1);
        let path = dir.join(format!("river_network_{}.png", network.threshold));
        plot.save(&path)
            .with_context(|| format!("Failed to save {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}

/// Raster plot with a colour bar; `labels` is (title, colour bar label)
fn raster_plot<T: RasterElement>(
    raster: &Raster<T>,
    params: &ColormapParams,
    axes: (&str, &str),
    labels: (&str, &str),
    path: &Path,
    scale: u32,
) -> Result<PathBuf> {
    let mut plot = Plot::for_raster(raster, scale)?;
    plot.draw_raster(raster, params)?;
    plot.draw_title(labels.0);
    plot.draw_axes(axes.0, axes.1);
    plot.draw_colorbar(params, labels.1);
    plot.save(path)
        .with_context(|| format!("Failed to save {}", path.display()))?;
    Ok(path.to_path_buf())
}

fn log_summary(analysis: &Analysis, config: &AnalysisConfig) {
    let w = &analysis.window;
    info!(
        "Catchment: {} cells in a {} x {} window at row {}, col {} (outlet at {:?})",
        analysis.catchment_cells(),
        w.cols,
        w.rows,
        w.row,
        w.col,
        analysis.pour_cell
    );
    info!("Max accumulation: {}", analysis.max_accumulation());
    info!(
        "Max flow distance: {:.2} ({:?})",
        analysis.max_distance(),
        config.distance_metric
    );
    for network in &analysis.networks {
        info!(
            "River network > {}: {} branches",
            network.threshold,
            network.len()
        );
    }
    info!("Outputs in {}", config.output_dir.display());
}
