#![allow(dead_code)]

//! Shared utilities for benchmarks in MTree.
//!
//! This module provides common constants, sample data generators, and helper
//! functions used by the benchmarks: benchmark parameters (number of points, node
//! capacity, query sizes) and deterministic 2D data generation.

use criterion::Criterion;
use mtree::geometry::{EuclideanDistance, Point2D};
use mtree::tree::MTree;
use tracing::info;

//
// Benchmark Parameters
//
pub const BENCH_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);
pub const BENCH_NUM_POINTS: i32 = 1000;
pub const BENCH_MIN_CAPACITY: usize = 4;

pub const BENCH_KNN_SIZE: usize = 10;
pub const BENCH_RANGE_RADIUS: f64 = 25.0;

//
// Data Generation
//
pub fn generate_2d_data() -> Vec<Point2D<i32>> {
    info!("Generating 2D data with {} points", BENCH_NUM_POINTS);
    let data: Vec<Point2D<i32>> = (0..BENCH_NUM_POINTS)
        .map(|i| {
            let x = ((i * 37) % 1009) as f64 + (i as f64) * 0.001;
            let y = ((i * 73) % 997) as f64;
            Point2D::new(x, y, Some(i))
        })
        .collect();
    info!("Finished generating 2D data ({} points)", data.len());
    data
}

pub fn build_tree(points: &[Point2D<i32>]) -> MTree<Point2D<i32>, EuclideanDistance> {
    let mut tree = MTree::new(BENCH_MIN_CAPACITY, EuclideanDistance).unwrap();
    for point in points {
        tree.add(point.clone());
    }
    tree
}

// Configure Criterion with a timeout for benchmarks
pub fn configure_criterion() -> Criterion {
    Criterion::default().measurement_time(BENCH_TIMEOUT)
}
