use anyhow::Result;
use mtree::geometry::{EuclideanDistance, FnMetric, Point2D};
use mtree::tree::MTree;

fn main() -> Result<()> {
    // Create an M-Tree over 2D points with the stock Euclidean metric.
    let mut tree = MTree::new(2, EuclideanDistance)?;

    // Index some points.
    tree.add(Point2D::new(10.0, 20.0, Some(1)));
    tree.add(Point2D::new(80.0, 30.0, Some(2)));
    tree.add(Point2D::new(45.0, 70.0, Some(3)));
    tree.add(Point2D::new(12.0, 24.0, Some(4)));
    tree.add(Point2D::new(60.0, 60.0, Some(5)));

    // Query the tree for the 2 nearest neighbors to a point.
    let query_point = Point2D::new(12.0, 22.0, None);
    let nearest = tree.knn_search(&query_point, 2);
    println!("2 nearest neighbors to {:?}:", query_point);
    for neighbor in &nearest {
        println!("  {:?} at distance {:.3}", neighbor.data, neighbor.distance);
    }

    // Query the tree for everything within a radius.
    let in_range = tree.range_search(&query_point, 30.0);
    println!(
        "{} points within distance 30 of {:?}",
        in_range.len(),
        query_point
    );

    // The same index works with any metric, including a custom closure. Here points
    // are compared by their x coordinate only.
    let metric = FnMetric(|a: &Point2D<i32>, b: &Point2D<i32>| (a.x - b.x).abs());
    let mut x_tree = MTree::new(2, metric)?;
    x_tree.add(Point2D::new(10.0, 0.0, Some(1)));
    x_tree.add(Point2D::new(15.0, 99.0, Some(2)));
    x_tree.add(Point2D::new(30.0, 50.0, Some(3)));

    let nearest_by_x = x_tree.knn_search(&Point2D::new(14.0, 0.0, None), 1);
    println!(
        "nearest by x-distance: {:?} at distance {:.1}",
        nearest_by_x[0].data, nearest_by_x[0].distance
    );

    // Results stream lazily in distance order; taking a prefix does no extra work.
    for neighbor in tree.nearest(&query_point).take(3) {
        println!("streamed: {:?} at {:.3}", neighbor.data, neighbor.distance);
    }

    Ok(())
}
