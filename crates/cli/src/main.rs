//! Hydrotile CLI - hydrological analysis of a single DEM tile

mod config;
mod pipeline;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use config::AnalysisConfig;
use hydrotile_algorithms::hydrology::{
    catchment, clip_to_catchment, extract_river_network, flow_accumulation, flow_direction,
    flow_distance, priority_flood, resolve_flats, DistanceMetric, FlowDistanceParams, PourPoint,
    PriorityFloodParams, ResolveFlatsParams,
};
use hydrotile_core::io::{read_geotiff, write_geotiff, GeoTiffOptions};
use hydrotile_core::{DirMap, Raster, RasterElement, Snap};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "hydrotile")]
#[command(author, version, about = "Hydrological analysis of a single DEM tile", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
    /// Individual hydrology stages
    Hydrology {
        #[command(subcommand)]
        algorithm: HydrologyCommands,
    },
    /// Full pipeline: condition, delineate, accumulate, extract and plot
    Run {
        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Input DEM (overrides the config)
        #[arg(long)]
        dem: Option<PathBuf>,
        /// Output directory (overrides the config)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        /// Accumulation thresholds, e.g. "100,5" (overrides the config)
        #[arg(short, long)]
        thresholds: Option<String>,
        /// Also write intermediate GeoTIFFs and network GeoJSON
        #[arg(long)]
        write_rasters: bool,
    },
}

/// Pour point given either as a coordinate or as a cell
#[derive(clap::Args)]
struct PourPointArgs {
    /// Pour point x in the raster CRS
    #[arg(long, requires = "y", conflicts_with_all = ["row", "col"], allow_negative_numbers = true)]
    x: Option<f64>,
    /// Pour point y in the raster CRS
    #[arg(long, requires = "x", allow_negative_numbers = true)]
    y: Option<f64>,
    /// Pour point row
    #[arg(long, requires = "col")]
    row: Option<usize>,
    /// Pour point column
    #[arg(long, requires = "row")]
    col: Option<usize>,
    /// Match --x/--y to the containing cell (center) or the nearest corner (corner)
    #[arg(long, default_value = "center", value_parser = parse_snap)]
    snap: Snap,
}

// ─── Hydrology subcommands ──────────────────────────────────────────────

#[derive(Subcommand)]
enum HydrologyCommands {
    /// Fill depressions in a DEM (Priority-Flood)
    FillDepressions {
        /// Input DEM file
        input: PathBuf,
        /// Output file
        output: PathBuf,
        /// Minimum rise between a filled cell and its spill cell
        #[arg(long, default_value = "0.0")]
        epsilon: f64,
    },
    /// Impose drainage gradients on flats of a filled DEM
    ResolveFlats {
        /// Input (filled) DEM file
        input: PathBuf,
        /// Output file
        output: PathBuf,
        /// Elevation step per gradient unit
        #[arg(long, default_value = "0.00001")]
        epsilon: f64,
    },
    /// D8 flow direction from a conditioned DEM
    FlowDirection {
        /// Input DEM file
        input: PathBuf,
        /// Output file (direction codes)
        output: PathBuf,
        /// Codes for N,NE,E,SE,S,SW,W,NW
        #[arg(long, default_value = "64,128,1,2,4,8,16,32")]
        dirmap: String,
    },
    /// Catchment draining to a pour point
    Catchment {
        /// Input flow direction raster
        input: PathBuf,
        /// Output file (codes inside the catchment, 255 outside)
        output: PathBuf,
        #[command(flatten)]
        pour_point: PourPointArgs,
        /// Crop the output to the catchment's bounding window
        #[arg(long)]
        clip: bool,
        /// Codes for N,NE,E,SE,S,SW,W,NW
        #[arg(long, default_value = "64,128,1,2,4,8,16,32")]
        dirmap: String,
    },
    /// Number of cells draining through each cell, itself included
    FlowAccumulation {
        /// Input flow direction (or catchment) raster
        input: PathBuf,
        /// Output file
        output: PathBuf,
        /// Codes for N,NE,E,SE,S,SW,W,NW
        #[arg(long, default_value = "64,128,1,2,4,8,16,32")]
        dirmap: String,
    },
    /// Flow-path distance from each cell to a pour point
    FlowDistance {
        /// Input flow direction (or catchment) raster
        input: PathBuf,
        /// Output file
        output: PathBuf,
        #[command(flatten)]
        pour_point: PourPointArgs,
        /// Distance metric: cells, geographic
        #[arg(short, long, default_value = "cells")]
        metric: String,
        /// Codes for N,NE,E,SE,S,SW,W,NW
        #[arg(long, default_value = "64,128,1,2,4,8,16,32")]
        dirmap: String,
    },
    /// River network as GeoJSON line strings
    RiverNetwork {
        /// Input flow direction (or catchment) raster
        input: PathBuf,
        /// Flow accumulation raster on the same grid
        #[arg(long)]
        accumulation: PathBuf,
        /// Output GeoJSON file
        output: PathBuf,
        /// Cells with accumulation strictly above this are streams
        #[arg(short, long, default_value = "100")]
        threshold: f64,
        /// Codes for N,NE,E,SE,S,SW,W,NW
        #[arg(long, default_value = "64,128,1,2,4,8,16,32")]
        dirmap: String,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Setting default subscriber failed")
}

pub(crate) fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn read_raster<T: RasterElement>(path: &Path) -> Result<Raster<T>> {
    let pb = spinner("Reading raster...");
    let raster: Raster<T> = read_geotiff(path, None)
        .with_context(|| format!("Failed to read raster {}", path.display()))?;
    pb.finish_and_clear();
    info!("Input: {} x {}", raster.cols(), raster.rows());
    Ok(raster)
}

fn write_result<T: RasterElement>(raster: &Raster<T>, path: &Path) -> Result<()> {
    let pb = spinner("Writing output...");
    write_geotiff(raster, path, Some(GeoTiffOptions::default()))
        .context("Failed to write output")?;
    pb.finish_and_clear();
    Ok(())
}

fn done(name: &str, path: &Path, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

fn parse_dirmap(s: &str) -> Result<DirMap> {
    let codes: Vec<u8> = s
        .split(',')
        .map(|c| {
            c.trim()
                .parse::<u8>()
                .with_context(|| format!("Invalid direction code: {}", c))
        })
        .collect::<Result<_>>()?;
    let codes: [u8; 8] = codes
        .try_into()
        .map_err(|v: Vec<u8>| anyhow::anyhow!("Dirmap needs 8 codes, got {}", v.len()))?;
    DirMap::new(codes).context("Invalid dirmap")
}

fn parse_thresholds(s: &str) -> Result<Vec<f64>> {
    s.split(',')
        .map(|t| {
            t.trim()
                .parse::<f64>()
                .with_context(|| format!("Invalid threshold: {}", t))
        })
        .collect()
}

fn parse_metric(s: &str) -> Result<DistanceMetric> {
    match s.to_lowercase().as_str() {
        "cells" | "cell" => Ok(DistanceMetric::Cells),
        "geographic" | "geo" => Ok(DistanceMetric::Geographic),
        _ => anyhow::bail!("Unknown metric: {}. Use cells or geographic.", s),
    }
}

impl PourPointArgs {
    fn pour_point(&self) -> Result<PourPoint> {
        match (self.x, self.y, self.row, self.col) {
            (Some(x), Some(y), None, None) => Ok(PourPoint::Coordinate { x, y }),
            (None, None, Some(row), Some(col)) => Ok(PourPoint::Cell { row, col }),
            _ => anyhow::bail!("Give the pour point as --x/--y or as --row/--col"),
        }
    }

    /// Pour cell in `raster`, with coordinates matched under --snap
    fn resolve<T: RasterElement>(&self, raster: &Raster<T>) -> Result<PourPoint> {
        let (row, col) = self
            .pour_point()?
            .locate_snapped(raster, self.snap)
            .context("Pour point is outside the raster")?;
        Ok(PourPoint::Cell { row, col })
    }
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        // ── Info ─────────────────────────────────────────────────────
        Commands::Info { input } => {
            let raster: Raster<f64> = read_raster(&input)?;
            let (rows, cols) = raster.shape();
            let bounds = raster.bounds();
            let (dx, dy) = raster.transform().cell_sizes();
            let stats = raster.statistics();

            println!("File: {}", input.display());
            println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
            println!("Cell size: {} x {}", dx, dy);
            println!(
                "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
                bounds.0, bounds.1, bounds.2, bounds.3
            );
            if let Some(crs) = raster.crs() {
                println!("CRS: {}", crs);
            }
            if let Some(nodata) = raster.nodata() {
                println!("NoData: {}", nodata);
            }
            println!("\nStatistics:");
            if let Some(min) = stats.min {
                println!("  Min: {:.4}", min);
            }
            if let Some(max) = stats.max {
                println!("  Max: {:.4}", max);
            }
            if let Some(mean) = stats.mean {
                println!("  Mean: {:.4}", mean);
            }
            println!(
                "  Valid cells: {} ({:.1}%)",
                stats.valid_count,
                100.0 * stats.valid_count as f64 / raster.len() as f64
            );
        }

        // ── Hydrology ────────────────────────────────────────────────
        Commands::Hydrology { algorithm } => match algorithm {
            HydrologyCommands::FillDepressions {
                input,
                output,
                epsilon,
            } => {
                let dem: Raster<f64> = read_raster(&input)?;
                let start = Instant::now();
                let result = priority_flood(&dem, PriorityFloodParams { epsilon })
                    .context("Failed to fill depressions")?;
                let elapsed = start.elapsed();
                write_result(&result, &output)?;
                done("Filled DEM", &output, elapsed);
            }

            HydrologyCommands::ResolveFlats {
                input,
                output,
                epsilon,
            } => {
                let dem: Raster<f64> = read_raster(&input)?;
                let start = Instant::now();
                let result = resolve_flats(&dem, ResolveFlatsParams { epsilon })
                    .context("Failed to resolve flats")?;
                let elapsed = start.elapsed();
                info!(
                    "{} flat cells, {} unresolved",
                    result.flat_cells, result.unresolved_cells
                );
                write_result(&result.dem, &output)?;
                done("Conditioned DEM", &output, elapsed);
            }

            HydrologyCommands::FlowDirection {
                input,
                output,
                dirmap,
            } => {
                let dirmap = parse_dirmap(&dirmap)?;
                let dem: Raster<f64> = read_raster(&input)?;
                let start = Instant::now();
                let result =
                    flow_direction(&dem, &dirmap).context("Failed to calculate flow direction")?;
                let elapsed = start.elapsed();
                write_result(&result, &output)?;
                done("Flow direction", &output, elapsed);
            }

            HydrologyCommands::Catchment {
                input,
                output,
                pour_point,
                clip,
                dirmap,
            } => {
                let dirmap = parse_dirmap(&dirmap)?;
                let flow_dir: Raster<u8> = read_raster(&input)?;
                let pour_point = pour_point.resolve(&flow_dir)?;
                let start = Instant::now();
                let mut result = catchment(&flow_dir, &dirmap, pour_point)
                    .context("Failed to delineate catchment")?;
                if clip {
                    let (clipped, window) = clip_to_catchment(&result, &result)
                        .context("Failed to clip to catchment")?;
                    info!("Clipped to {:?}", window);
                    result = clipped;
                }
                let elapsed = start.elapsed();
                write_result(&result, &output)?;
                done("Catchment", &output, elapsed);
            }

            HydrologyCommands::FlowAccumulation {
                input,
                output,
                dirmap,
            } => {
                let dirmap = parse_dirmap(&dirmap)?;
                let flow_dir: Raster<u8> = read_raster(&input)?;
                let start = Instant::now();
                let result = flow_accumulation(&flow_dir, &dirmap)
                    .context("Failed to calculate flow accumulation")?;
                let elapsed = start.elapsed();
                write_result(&result, &output)?;
                done("Flow accumulation", &output, elapsed);
            }

            HydrologyCommands::FlowDistance {
                input,
                output,
                pour_point,
                metric,
                dirmap,
            } => {
                let flow_dir: Raster<u8> = read_raster(&input)?;
                let params = FlowDistanceParams {
                    pour_point: pour_point.resolve(&flow_dir)?,
                    dirmap: parse_dirmap(&dirmap)?,
                    metric: parse_metric(&metric)?,
                };
                let start = Instant::now();
                let result =
                    flow_distance(&flow_dir, &params).context("Failed to calculate flow distance")?;
                let elapsed = start.elapsed();
                write_result(&result, &output)?;
                done("Flow distance", &output, elapsed);
            }

            HydrologyCommands::RiverNetwork {
                input,
                accumulation,
                output,
                threshold,
                dirmap,
            } => {
                let dirmap = parse_dirmap(&dirmap)?;
                let flow_dir: Raster<u8> = read_raster(&input)?;
                let acc: Raster<f64> = read_raster(&accumulation)?;
                let start = Instant::now();
                let network = extract_river_network(&flow_dir, &dirmap, &acc, threshold)
                    .context("Failed to extract river network")?;
                let elapsed = start.elapsed();
                let json = network
                    .to_feature_collection()
                    .to_geojson_string()
                    .context("Failed to encode river network")?;
                std::fs::write(&output, json).context("Failed to write output")?;
                info!("{} branches above {}", network.len(), threshold);
                done("River network", &output, elapsed);
            }
        },

        // ── Run ──────────────────────────────────────────────────────
        Commands::Run {
            config,
            dem,
            output_dir,
            thresholds,
            write_rasters,
        } => {
            let mut config = match config {
                Some(path) => AnalysisConfig::load_from_path(&path)?,
                None => AnalysisConfig::default(),
            };
            if dem.is_some() {
                config.dem = dem;
            }
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }
            if let Some(t) = thresholds {
                config.thresholds = parse_thresholds(&t)?;
            }
            config.write_rasters |= write_rasters;

            let start = Instant::now();
            pipeline::run(&config)?;
            println!("Outputs saved to: {}", config.output_dir.display());
            println!("  Processing time: {:.2?}", start.elapsed());
        }
    }

    Ok(())
}
