//! Benchmarks for hydrology algorithms

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use hydrotile_algorithms::hydrology::{
    catchment, extract_river_network, flow_accumulation, flow_direction, priority_flood,
    resolve_flats, PourPoint, PriorityFloodParams, ResolveFlatsParams,
};
use hydrotile_core::{DirMap, GeoTransform, Raster};

/// Create a DEM with a basin shape: higher edges sloping toward center outlet
fn create_basin_dem(size: usize) -> Raster<f64> {
    let mut dem = Raster::new(size, size);
    dem.set_transform(GeoTransform::new(0.0, size as f64, 1.0, -1.0));
    let center = size as f64 / 2.0;
    for row in 0..size {
        for col in 0..size {
            let dx = col as f64 - center;
            let dy = row as f64 - center;
            let dist = (dx * dx + dy * dy).sqrt();
            // Quantised bowl: plenty of flats for the resolver
            let noise = ((row * 7 + col * 13) % 17) as f64 * 0.01;
            dem.set(row, col, (dist + noise).round()).unwrap();
        }
    }
    dem
}

fn bench_priority_flood(c: &mut Criterion) {
    let mut group = c.benchmark_group("hydrology/priority_flood");
    for size in [128, 256, 512, 1024] {
        let dem = create_basin_dem(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| priority_flood(black_box(&dem), PriorityFloodParams::default()).unwrap())
        });
    }
    group.finish();
}

fn bench_resolve_flats(c: &mut Criterion) {
    let mut group = c.benchmark_group("hydrology/resolve_flats");
    for size in [128, 256, 512] {
        let filled = priority_flood(&create_basin_dem(size), PriorityFloodParams::default()).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| resolve_flats(black_box(&filled), ResolveFlatsParams::default()).unwrap())
        });
    }
    group.finish();
}

fn bench_flow_direction(c: &mut Criterion) {
    let mut group = c.benchmark_group("hydrology/flow_direction");
    for size in [256, 512, 1024, 2048] {
        let dem = create_basin_dem(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| flow_direction(black_box(&dem), &DirMap::ESRI).unwrap())
        });
    }
    group.finish();
}

fn bench_catchment_and_accumulation(c: &mut Criterion) {
    let mut group = c.benchmark_group("hydrology/catchment_accumulation");
    for size in [256, 512, 1024] {
        let filled = priority_flood(&create_basin_dem(size), PriorityFloodParams::default()).unwrap();
        let resolved = resolve_flats(&filled, ResolveFlatsParams::default()).unwrap();
        let fdir = flow_direction(&resolved.dem, &DirMap::ESRI).unwrap();
        let pour = PourPoint::Cell { row: size - 1, col: size / 2 };
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let basin = catchment(black_box(&fdir), &DirMap::ESRI, pour).unwrap();
                flow_accumulation(&basin, &DirMap::ESRI).unwrap()
            })
        });
    }
    group.finish();
}

fn bench_river_network(c: &mut Criterion) {
    let mut group = c.benchmark_group("hydrology/river_network");
    for size in [256, 512, 1024] {
        let dem = create_basin_dem(size);
        let fdir = flow_direction(&dem, &DirMap::ESRI).unwrap();
        let acc = flow_accumulation(&fdir, &DirMap::ESRI).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| extract_river_network(black_box(&fdir), &DirMap::ESRI, &acc, 100.0).unwrap())
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_priority_flood,
    bench_resolve_flats,
    bench_flow_direction,
    bench_catchment_and_accumulation,
    bench_river_network,
);
criterion_main!(benches);
