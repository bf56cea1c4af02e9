//! ## Split Policies
//!
//! When an insertion overfills a node, the tree hands the pivots of all its children to
//! a split policy, which promotes two of them and partitions the whole set around the
//! promoted pair. The two partitions become the two replacement siblings.
//!
//! A policy receives the pivots through a [`DistanceCache`], which memoizes pairwise
//! distances so each pair is measured at most once per split. Policies address pivots by
//! index into the cache, so the data type needs neither hashing nor ordering.
//!
//! [`RandomBalancedSplit`] is the default policy: uniform random promotion combined with
//! a balanced partition. Any type implementing [`SplitFunction`] and honoring its
//! contract can be plugged into the tree instead.

use crate::geometry::DistanceMetric;
use rand::Rng;
use std::cmp::Ordering;
use tracing::debug;

/// Memoizing view over the pivots of a node being split.
///
/// Wraps the tree's metric so that the distance between any pair of pivots is computed
/// at most once for the duration of one split. The cache lives on the split's stack
/// frame and is dropped with it.
pub struct DistanceCache<'a, P, M: DistanceMetric<P>> {
    items: &'a [P],
    metric: &'a M,
    memo: Vec<Option<f64>>,
}

impl<'a, P, M: DistanceMetric<P>> DistanceCache<'a, P, M> {
    pub(crate) fn new(items: &'a [P], metric: &'a M) -> Self {
        DistanceCache {
            items,
            metric,
            memo: vec![None; items.len() * items.len()],
        }
    }

    /// Number of pivots being split.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The pivot at `index`.
    pub fn item(&self, index: usize) -> &P {
        &self.items[index]
    }

    /// Distance between the pivots at `a` and `b`, measured at most once per pair.
    pub fn distance(&mut self, a: usize, b: usize) -> f64 {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let slot = lo * self.items.len() + hi;
        match self.memo[slot] {
            Some(distance) => distance,
            None => {
                let distance = self.metric.distance(&self.items[lo], &self.items[hi]);
                self.memo[slot] = Some(distance);
                distance
            }
        }
    }
}

/// Outcome of a split policy: two promoted pivots and the partition of all pivots
/// around them. All fields are indices into the [`DistanceCache`] the policy received.
#[derive(Debug, Clone)]
pub struct Split {
    /// Index of the first promoted pivot. Must be contained in `first_partition`.
    pub first_promoted: usize,
    /// Indices assigned to the first replacement sibling.
    pub first_partition: Vec<usize>,
    /// Index of the second promoted pivot. Must be contained in `second_partition`.
    pub second_promoted: usize,
    /// Indices assigned to the second replacement sibling.
    pub second_partition: Vec<usize>,
}

/// Chooses two promoted pivots and partitions a set of pivots around them.
///
/// The contract: the two partitions must be disjoint, together cover every index in
/// `0..cache.len()`, and each must contain its promoted index. Neither partition may
/// hold fewer than the tree's minimum node capacity; a policy that keeps the partition
/// sizes within one of each other satisfies this for every legal capacity
/// configuration, since a splitting node holds at least `2 * min_capacity` children.
pub trait SplitFunction<P> {
    fn split<M: DistanceMetric<P>>(&self, cache: &mut DistanceCache<'_, P, M>) -> Split;
}

/// The default split policy: promotes two distinct pivots chosen uniformly at random,
/// then deals the remaining pivots to the two sides in a balanced fashion, each side
/// taking its most-preferred remaining pivot in turn.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomBalancedSplit;

impl<P> SplitFunction<P> for RandomBalancedSplit {
    fn split<M: DistanceMetric<P>>(&self, cache: &mut DistanceCache<'_, P, M>) -> Split {
        let n = cache.len();
        debug_assert!(n >= 2, "a split needs at least two pivots");

        let mut rng = rand::thread_rng();
        let first = rng.gen_range(0..n);
        let mut second = rng.gen_range(0..n - 1);
        if second >= first {
            second += 1;
        }
        debug!(
            "Splitting {} pivots around promoted indices {} and {}",
            n, first, second
        );

        // Rank the rest by how much closer they sit to the first pivot than the second.
        let mut rest: Vec<(f64, usize)> = (0..n)
            .filter(|&i| i != first && i != second)
            .map(|i| (cache.distance(i, first) - cache.distance(i, second), i))
            .collect();
        rest.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

        let mut first_partition = vec![first];
        let mut second_partition = vec![second];
        let mut lo = 0;
        let mut hi = rest.len();
        let mut turn_first = true;
        while lo < hi {
            if turn_first {
                first_partition.push(rest[lo].1);
                lo += 1;
            } else {
                hi -= 1;
                second_partition.push(rest[hi].1);
            }
            turn_first = !turn_first;
        }

        Split {
            first_promoted: first,
            first_partition,
            second_promoted: second,
            second_partition,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{EuclideanDistance, FnMetric, Point2D};
    use std::cell::Cell;

    fn pivots(n: usize) -> Vec<Point2D<i32>> {
        (0..n)
            .map(|i| Point2D::new(i as f64, (i * i) as f64, Some(i as i32)))
            .collect()
    }

    #[test]
    fn test_cache_measures_each_pair_once() {
        let calls = Cell::new(0usize);
        let metric = FnMetric(|a: &Point2D<i32>, b: &Point2D<i32>| {
            calls.set(calls.get() + 1);
            EuclideanDistance.distance(a, b)
        });
        let items = pivots(4);
        let mut cache = DistanceCache::new(&items, &metric);

        let d = cache.distance(1, 3);
        assert_eq!(cache.distance(3, 1), d);
        assert_eq!(cache.distance(1, 3), d);
        assert_eq!(calls.get(), 1);

        cache.distance(0, 2);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_cache_matches_metric() {
        let items = pivots(5);
        let metric = EuclideanDistance;
        let mut cache = DistanceCache::new(&items, &metric);
        for a in 0..items.len() {
            for b in 0..items.len() {
                assert_eq!(cache.distance(a, b), metric.distance(&items[a], &items[b]));
            }
        }
    }

    #[test]
    fn test_random_balanced_split_contract() {
        let metric = EuclideanDistance;
        for n in 2..20 {
            let items = pivots(n);
            let mut cache = DistanceCache::new(&items, &metric);
            let split = RandomBalancedSplit.split(&mut cache);

            assert!(split.first_partition.contains(&split.first_promoted));
            assert!(split.second_partition.contains(&split.second_promoted));
            assert_ne!(split.first_promoted, split.second_promoted);

            let mut all: Vec<usize> = split
                .first_partition
                .iter()
                .chain(split.second_partition.iter())
                .copied()
                .collect();
            all.sort_unstable();
            let expected: Vec<usize> = (0..n).collect();
            assert_eq!(all, expected, "partitions must cover every pivot exactly once");

            let diff = split.first_partition.len() as i64 - split.second_partition.len() as i64;
            assert!(diff.abs() <= 1, "partition sizes must stay within one of each other");
        }
    }
}
