//! ## M-Tree Implementation
//!
//! This module implements an M-Tree, a dynamic, height-balanced index for data drawn
//! from an arbitrary metric space. The tree only interacts with the data through a
//! [`DistanceMetric`], and uses the triangle inequality to prune subtrees during
//! search and removal, so no query has to visit the whole dataset.
//!
//! Every node stores a pivot (a representative data object), a covering radius that
//! bounds the distance from the pivot to everything below it, and, except at the root,
//! the exact distance to its parent's pivot. Inserting into a full node splits it in
//! two via a pluggable [`SplitFunction`]; removals that leave a node under capacity are
//! repaired by borrowing from or merging with a sibling. All leaves stay at the same
//! depth.
//!
//! ### Example
//!
//! ```
//! use mtree::geometry::{EuclideanDistance, Point2D};
//! use mtree::tree::MTree;
//!
//! let mut tree: MTree<Point2D<()>, EuclideanDistance> =
//!     MTree::new(2, EuclideanDistance).unwrap();
//! tree.add(Point2D::new(1.0, 2.0, None));
//! tree.add(Point2D::new(3.0, 4.0, None));
//! tree.add(Point2D::new(9.0, 9.0, None));
//!
//! let neighbors = tree.knn_search(&Point2D::new(2.0, 3.0, None), 2);
//! assert_eq!(neighbors.len(), 2);
//! assert!(neighbors[0].distance <= neighbors[1].distance);
//! ```

use crate::errors::MTreeError;
use crate::geometry::DistanceMetric;
use crate::split::{DistanceCache, RandomBalancedSplit, SplitFunction};
use ordered_float::OrderedFloat;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt::Debug;
use tracing::{debug, info};

/// A leaf-level record for one indexed data object.
#[derive(Debug, Clone)]
struct Entry<P> {
    data: P,
    distance_to_parent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    Leaf,
    Internal,
}

/// A node of the tree. Leaf nodes hold entries; internal nodes hold other nodes.
#[derive(Debug, Clone)]
struct Node<P> {
    /// The pivot all child distances are measured against.
    data: P,
    /// Upper bound on the distance from the pivot to any entry below this node.
    radius: f64,
    /// Exact distance to the parent's pivot; `None` at the root.
    distance_to_parent: Option<f64>,
    kind: NodeKind,
    children: Vec<Child<P>>,
}

#[derive(Debug, Clone)]
enum Child<P> {
    Entry(Entry<P>),
    Node(Box<Node<P>>),
}

impl<P> Child<P> {
    fn data(&self) -> &P {
        match self {
            Child::Entry(entry) => &entry.data,
            Child::Node(node) => &node.data,
        }
    }

    fn radius(&self) -> f64 {
        match self {
            Child::Entry(_) => 0.0,
            Child::Node(node) => node.radius,
        }
    }

    fn distance_to_parent(&self) -> f64 {
        match self {
            Child::Entry(entry) => entry.distance_to_parent,
            Child::Node(node) => node
                .distance_to_parent
                .expect("a child node always has a distance to its parent"),
        }
    }

    fn set_distance_to_parent(&mut self, distance: f64) {
        match self {
            Child::Entry(entry) => entry.distance_to_parent = distance,
            Child::Node(node) => node.distance_to_parent = Some(distance),
        }
    }
}

/// Structural signal returned by the insertion path and consumed by the parent.
enum AddOutcome<P> {
    Inserted,
    Split(Box<Node<P>>, Box<Node<P>>),
}

/// Structural signal returned by the removal path and consumed by the parent.
enum RemoveOutcome {
    Removed,
    Underflowed,
    NotFound,
}

/// Capacity parameters and collaborators threaded through the recursion.
struct TreeParams<'a, M, S> {
    min_capacity: usize,
    max_capacity: usize,
    metric: &'a M,
    split: &'a S,
}

impl<P: Clone + PartialEq + Debug> Node<P> {
    fn new(data: P, kind: NodeKind) -> Self {
        Node {
            data,
            radius: 0.0,
            distance_to_parent: None,
            kind,
            children: Vec::new(),
        }
    }

    /// Adds `child` at the given distance from this node's pivot, extending the
    /// covering radius as needed.
    fn attach(&mut self, mut child: Child<P>, distance: f64) {
        debug_assert!(distance >= 0.0, "metric returned a negative distance");
        child.set_distance_to_parent(distance);
        self.radius = self.radius.max(distance + child.radius());
        self.children.push(child);
    }

    /// Re-extends the covering radius over the direct child at `index` after its
    /// subtree changed.
    fn cover(&mut self, index: usize) {
        let child = &self.children[index];
        self.radius = self.radius.max(child.distance_to_parent() + child.radius());
    }

    fn child_node(&self, index: usize) -> &Node<P> {
        match &self.children[index] {
            Child::Node(node) => node,
            Child::Entry(_) => unreachable!("internal nodes hold only node children"),
        }
    }

    fn child_node_mut(&mut self, index: usize) -> &mut Node<P> {
        match &mut self.children[index] {
            Child::Node(node) => node,
            Child::Entry(_) => unreachable!("internal nodes hold only node children"),
        }
    }

    /// Inserts `data`, known to be at `distance` from this node's pivot, into the
    /// subtree rooted here. Capacity overflow at this node is resolved immediately by
    /// splitting; the replacement siblings are handed to the caller.
    fn add_data<M, S>(&mut self, data: P, distance: f64, params: &TreeParams<'_, M, S>) -> AddOutcome<P>
    where
        M: DistanceMetric<P>,
        S: SplitFunction<P>,
    {
        match self.kind {
            NodeKind::Leaf => {
                let entry = Entry {
                    data,
                    distance_to_parent: distance,
                };
                self.attach(Child::Entry(entry), distance);
            }
            NodeKind::Internal => {
                let (index, child_distance) = self.choose_subtree(&data, params.metric);
                match self.child_node_mut(index).add_data(data, child_distance, params) {
                    AddOutcome::Inserted => self.cover(index),
                    AddOutcome::Split(first, second) => {
                        self.children.swap_remove(index);
                        let d = params.metric.distance(&first.data, &self.data);
                        self.attach(Child::Node(first), d);
                        let d = params.metric.distance(&second.data, &self.data);
                        self.attach(Child::Node(second), d);
                    }
                }
            }
        }

        if self.children.len() > params.max_capacity {
            let (first, second) = self.split(params);
            return AddOutcome::Split(first, second);
        }
        AddOutcome::Inserted
    }

    /// Picks the child to descend into: the covering child nearest to `data`, or, when
    /// no child's ball covers `data`, the child needing the least radius enlargement.
    /// Returns the child's index and its pivot's distance to `data`.
    fn choose_subtree<M: DistanceMetric<P>>(&self, data: &P, metric: &M) -> (usize, f64) {
        let mut covering: Option<(usize, f64)> = None;
        let mut cheapest: Option<(usize, f64, f64)> = None;
        for (index, child) in self.children.iter().enumerate() {
            let distance = metric.distance(data, child.data());
            if distance <= child.radius() {
                if covering.map_or(true, |(_, best)| distance < best) {
                    covering = Some((index, distance));
                }
            } else {
                let enlargement = distance - child.radius();
                if cheapest.map_or(true, |(_, _, best)| enlargement < best) {
                    cheapest = Some((index, distance, enlargement));
                }
            }
        }
        covering
            .or(cheapest.map(|(index, distance, _)| (index, distance)))
            .expect("internal nodes are never empty")
    }

    /// Replaces this overfull node with two siblings chosen by the split policy.
    fn split<M, S>(&mut self, params: &TreeParams<'_, M, S>) -> (Box<Node<P>>, Box<Node<P>>)
    where
        M: DistanceMetric<P>,
        S: SplitFunction<P>,
    {
        debug!(
            "Splitting a {:?} node holding {} children",
            self.kind,
            self.children.len()
        );
        let children = std::mem::take(&mut self.children);
        let pivots: Vec<P> = children.iter().map(|child| child.data().clone()).collect();
        let mut pool: Vec<Option<Child<P>>> = children.into_iter().map(Some).collect();

        let mut cache = DistanceCache::new(&pivots, params.metric);
        let split = params.split.split(&mut cache);

        let first = Self::build_sibling(
            self.kind,
            split.first_promoted,
            &split.first_partition,
            &mut pool,
            &mut cache,
        );
        let second = Self::build_sibling(
            self.kind,
            split.second_promoted,
            &split.second_partition,
            &mut pool,
            &mut cache,
        );
        debug_assert!(pool.iter().all(Option::is_none), "split partitions must cover all children");
        (first, second)
    }

    fn build_sibling<M: DistanceMetric<P>>(
        kind: NodeKind,
        promoted: usize,
        partition: &[usize],
        pool: &mut [Option<Child<P>>],
        cache: &mut DistanceCache<'_, P, M>,
    ) -> Box<Node<P>> {
        let mut node = Box::new(Node::new(cache.item(promoted).clone(), kind));
        for &index in partition {
            let child = pool[index]
                .take()
                .expect("split partitions must be disjoint");
            let distance = cache.distance(promoted, index);
            node.attach(child, distance);
        }
        node
    }

    /// Removes `data`, known to be at `distance` from this node's pivot, from the
    /// subtree rooted here. `min_capacity` is this node's own minimum (the root's
    /// minimum differs from everyone else's).
    fn remove_data<M, S>(
        &mut self,
        data: &P,
        distance: f64,
        min_capacity: usize,
        params: &TreeParams<'_, M, S>,
    ) -> RemoveOutcome
    where
        M: DistanceMetric<P>,
        S: SplitFunction<P>,
    {
        let removed = match self.kind {
            NodeKind::Leaf => self.remove_entry(data),
            NodeKind::Internal => self.remove_from_children(data, distance, params),
        };
        if !removed {
            return RemoveOutcome::NotFound;
        }
        if self.children.len() < min_capacity {
            RemoveOutcome::Underflowed
        } else {
            RemoveOutcome::Removed
        }
    }

    fn remove_entry(&mut self, data: &P) -> bool {
        match self.children.iter().position(|child| child.data() == data) {
            Some(index) => {
                self.children.remove(index);
                true
            }
            None => false,
        }
    }

    /// Descends into every child whose ball may contain `data`. At most one child holds
    /// it, so the scan stops at the first success; a child's underflow is repaired here
    /// before reporting success.
    fn remove_from_children<M, S>(
        &mut self,
        data: &P,
        distance: f64,
        params: &TreeParams<'_, M, S>,
    ) -> bool
    where
        M: DistanceMetric<P>,
        S: SplitFunction<P>,
    {
        for index in 0..self.children.len() {
            let child = &self.children[index];
            if (distance - child.distance_to_parent()).abs() > child.radius() {
                continue;
            }
            let child_distance = params.metric.distance(data, child.data());
            if child_distance > child.radius() {
                continue;
            }
            let outcome = self.child_node_mut(index).remove_data(
                data,
                child_distance,
                params.min_capacity,
                params,
            );
            match outcome {
                RemoveOutcome::NotFound => {}
                RemoveOutcome::Removed => {
                    // A rebalance further down may have grown the child's radius.
                    self.cover(index);
                    return true;
                }
                RemoveOutcome::Underflowed => {
                    self.rebalance(index, params);
                    return true;
                }
            }
        }
        false
    }

    /// Repairs the underflowed child at `index`: the nearest sibling with spare
    /// capacity donates a grandchild; when every sibling is at minimum capacity the
    /// child is merged into the nearest one instead.
    fn rebalance<M, S>(&mut self, index: usize, params: &TreeParams<'_, M, S>)
    where
        M: DistanceMetric<P>,
        S: SplitFunction<P>,
    {
        let mut nearest_donor: Option<(usize, f64)> = None;
        let mut nearest_partner: Option<(usize, f64)> = None;
        for sibling in 0..self.children.len() {
            if sibling == index {
                continue;
            }
            let distance = params
                .metric
                .distance(self.children[index].data(), self.children[sibling].data());
            if self.child_node(sibling).children.len() > params.min_capacity {
                if nearest_donor.map_or(true, |(_, best)| distance < best) {
                    nearest_donor = Some((sibling, distance));
                }
            } else if nearest_partner.map_or(true, |(_, best)| distance < best) {
                nearest_partner = Some((sibling, distance));
            }
        }

        match (nearest_donor, nearest_partner) {
            (Some((donor, _)), _) => self.donate(donor, index, params),
            (None, Some((partner, _))) => self.merge(index, partner, params),
            (None, None) => unreachable!("an underflowed child always has a sibling"),
        }
    }

    /// Moves the donor's grandchild nearest to the receiver's pivot into the receiver.
    fn donate<M, S>(&mut self, donor: usize, receiver: usize, params: &TreeParams<'_, M, S>)
    where
        M: DistanceMetric<P>,
        S: SplitFunction<P>,
    {
        debug!("Rebalancing an underflowed node with a donated sibling child");
        let receiver_pivot = self.children[receiver].data();
        let (grandchild_index, grandchild_distance) = self
            .child_node(donor)
            .children
            .iter()
            .enumerate()
            .map(|(i, grandchild)| (i, params.metric.distance(grandchild.data(), receiver_pivot)))
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
            .expect("a donor always has children to spare");

        let grandchild = self.child_node_mut(donor).children.remove(grandchild_index);
        self.child_node_mut(receiver)
            .attach(grandchild, grandchild_distance);
        self.cover(receiver);
    }

    /// Folds the underflowed child at `index` into the sibling at `partner` and drops
    /// the emptied child.
    fn merge<M, S>(&mut self, index: usize, partner: usize, params: &TreeParams<'_, M, S>)
    where
        M: DistanceMetric<P>,
        S: SplitFunction<P>,
    {
        debug!("Merging an underflowed node into its nearest sibling");
        let grandchildren = std::mem::take(&mut self.child_node_mut(index).children);
        let partner_node = self.child_node_mut(partner);
        for grandchild in grandchildren {
            let distance = params.metric.distance(grandchild.data(), &partner_node.data);
            partner_node.attach(grandchild, distance);
        }
        self.cover(partner);
        self.children.remove(index);
    }
}

/// One query result: a reference to an indexed data object and its distance to the
/// query.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor<'a, P> {
    pub data: &'a P,
    pub distance: f64,
}

/// Record queued while a node still awaits expansion; keyed by the tightest lower
/// bound on the distance from the query to anything below the node.
struct PendingItem<'a, P> {
    min_distance: OrderedFloat<f64>,
    distance: f64,
    node: &'a Node<P>,
}

impl<P> PartialEq for PendingItem<'_, P> {
    fn eq(&self, other: &Self) -> bool {
        self.min_distance.eq(&other.min_distance)
    }
}

impl<P> Eq for PendingItem<'_, P> {}

impl<P> Ord for PendingItem<'_, P> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the BinaryHeap pops the smallest bound first.
        other.min_distance.cmp(&self.min_distance)
    }
}

impl<P> PartialOrd for PendingItem<'_, P> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Record for an entry whose exact distance to the query is known.
struct NearestItem<'a, P> {
    distance: OrderedFloat<f64>,
    data: &'a P,
}

impl<P> PartialEq for NearestItem<'_, P> {
    fn eq(&self, other: &Self) -> bool {
        self.distance.eq(&other.distance)
    }
}

impl<P> Eq for NearestItem<'_, P> {}

impl<P> Ord for NearestItem<'_, P> {
    fn cmp(&self, other: &Self) -> Ordering {
        other.distance.cmp(&self.distance)
    }
}

impl<P> PartialOrd for NearestItem<'_, P> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Lazy best-first traversal yielding indexed data in non-decreasing distance from the
/// query. Created by [`MTree::search`] and friends; the tree is borrowed read-only for
/// the iterator's lifetime.
///
/// An entry is yielded only once no unexpanded subtree could still produce something
/// closer, so results arrive in order and the traversal can be abandoned at any point
/// with no further cost.
pub struct Nearest<'a, P, M> {
    metric: &'a M,
    query: P,
    range: f64,
    limit: usize,
    yielded: usize,
    pending: BinaryHeap<PendingItem<'a, P>>,
    nearest: BinaryHeap<NearestItem<'a, P>>,
}

impl<'a, P, M> Iterator for Nearest<'a, P, M>
where
    P: Clone + PartialEq + Debug,
    M: DistanceMetric<P>,
{
    type Item = Neighbor<'a, P>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.yielded >= self.limit {
            return None;
        }
        loop {
            // Yield while no pending subtree could still beat the best known entry.
            let bound = self
                .pending
                .peek()
                .map_or(f64::INFINITY, |pending| pending.min_distance.into_inner());
            if let Some(best) = self.nearest.peek() {
                if best.distance.into_inner() <= bound {
                    let best = self.nearest.pop()?;
                    self.yielded += 1;
                    return Some(Neighbor {
                        data: best.data,
                        distance: best.distance.into_inner(),
                    });
                }
            }

            let pending = self.pending.pop()?;
            for child in &pending.node.children {
                // Cheap rejection from stored distances before paying for a metric call.
                if (pending.distance - child.distance_to_parent()).abs() - child.radius()
                    > self.range
                {
                    continue;
                }
                let distance = self.metric.distance(&self.query, child.data());
                let min_distance = (distance - child.radius()).max(0.0);
                if min_distance > self.range {
                    continue;
                }
                match child {
                    Child::Entry(entry) => self.nearest.push(NearestItem {
                        distance: OrderedFloat(distance),
                        data: &entry.data,
                    }),
                    Child::Node(node) => self.pending.push(PendingItem {
                        min_distance: OrderedFloat(min_distance),
                        distance,
                        node,
                    }),
                }
            }
        }
    }
}

/// M-Tree for data in a general metric space.
///
/// The tree is created with a minimum node capacity, a [`DistanceMetric`], and
/// optionally a maximum capacity and a [`SplitFunction`]. It supports insertion,
/// removal, k-nearest neighbor search, and range search. Data objects are compared by
/// equality and must be unique within the tree; inserting an object that is already
/// indexed is not supported.
///
/// In debug builds every mutation re-validates the whole structure; release builds
/// skip the check.
#[derive(Debug, Clone)]
pub struct MTree<P, M, S = RandomBalancedSplit> {
    root: Option<Box<Node<P>>>,
    min_capacity: usize,
    max_capacity: usize,
    metric: M,
    split: S,
    len: usize,
}

impl<P, M> MTree<P, M, RandomBalancedSplit>
where
    P: Clone + PartialEq + Debug,
    M: DistanceMetric<P>,
{
    /// Creates a new, empty M-Tree with the default split policy and the default
    /// maximum capacity of `2 * min_capacity - 1`.
    ///
    /// # Errors
    ///
    /// Returns `MTreeError::InvalidCapacity` if `min_capacity` is less than 2.
    pub fn new(min_capacity: usize, metric: M) -> Result<Self, MTreeError> {
        Self::with_options(min_capacity, None, metric, RandomBalancedSplit)
    }
}

impl<P, M, S> MTree<P, M, S>
where
    P: Clone + PartialEq + Debug,
    M: DistanceMetric<P>,
    S: SplitFunction<P>,
{
    /// Creates a new, empty M-Tree with an explicit split policy and, optionally, an
    /// explicit maximum node capacity (defaulted to `2 * min_capacity - 1`).
    ///
    /// # Errors
    ///
    /// Returns `MTreeError::InvalidCapacity` if `min_capacity` is less than 2 or
    /// `max_capacity` is less than `2 * min_capacity - 1`.
    pub fn with_options(
        min_capacity: usize,
        max_capacity: Option<usize>,
        metric: M,
        split: S,
    ) -> Result<Self, MTreeError> {
        if min_capacity < 2 {
            return Err(MTreeError::InvalidCapacity {
                min_capacity,
                max_capacity: max_capacity.unwrap_or(0),
            });
        }
        let max_capacity = max_capacity.unwrap_or(2 * min_capacity - 1);
        if max_capacity < 2 * min_capacity - 1 {
            return Err(MTreeError::InvalidCapacity {
                min_capacity,
                max_capacity,
            });
        }
        info!(
            "Creating new MTree with min_capacity: {} and max_capacity: {}",
            min_capacity, max_capacity
        );
        Ok(MTree {
            root: None,
            min_capacity,
            max_capacity,
            metric,
            split,
            len: 0,
        })
    }

    /// Number of indexed data objects.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Indexes a new data object.
    ///
    /// The object must not already be indexed; equality defines identity within the
    /// tree and duplicate objects are not supported.
    pub fn add(&mut self, data: P) {
        info!("Adding data into the MTree: {:?}", data);
        let params = TreeParams {
            min_capacity: self.min_capacity,
            max_capacity: self.max_capacity,
            metric: &self.metric,
            split: &self.split,
        };
        match &mut self.root {
            None => {
                let mut root = Box::new(Node::new(data.clone(), NodeKind::Leaf));
                root.attach(
                    Child::Entry(Entry {
                        data,
                        distance_to_parent: 0.0,
                    }),
                    0.0,
                );
                self.root = Some(root);
            }
            Some(root) => {
                let distance = params.metric.distance(&data, &root.data);
                if let AddOutcome::Split(first, second) = root.add_data(data, distance, &params) {
                    debug!("Root split; promoting a new root over the two replacements");
                    let mut new_root = Box::new(Node::new(root.data.clone(), NodeKind::Internal));
                    let d = params.metric.distance(&first.data, &new_root.data);
                    new_root.attach(Child::Node(first), d);
                    let d = params.metric.distance(&second.data, &new_root.data);
                    new_root.attach(Child::Node(second), d);
                    *root = new_root;
                }
            }
        }
        self.len += 1;
        #[cfg(debug_assertions)]
        self.check_invariants();
    }

    /// Removes an indexed data object.
    ///
    /// # Errors
    ///
    /// Returns `MTreeError::DataNotFound` if the object is not indexed.
    pub fn remove(&mut self, data: &P) -> Result<(), MTreeError> {
        info!("Removing data from the MTree: {:?}", data);
        let params = TreeParams {
            min_capacity: self.min_capacity,
            max_capacity: self.max_capacity,
            metric: &self.metric,
            split: &self.split,
        };
        let root = match &mut self.root {
            Some(root) => root,
            None => return Err(MTreeError::DataNotFound),
        };
        let distance = params.metric.distance(data, &root.data);
        let root_min = match root.kind {
            NodeKind::Leaf => 1,
            NodeKind::Internal => 2,
        };
        match root.remove_data(data, distance, root_min, &params) {
            RemoveOutcome::NotFound => return Err(MTreeError::DataNotFound),
            RemoveOutcome::Removed => {}
            RemoveOutcome::Underflowed => match root.kind {
                NodeKind::Leaf => {
                    debug!("Root emptied; the tree is now empty");
                    self.root = None;
                }
                NodeKind::Internal => {
                    debug!("Root underflowed; promoting its only child to root");
                    let mut child = match root.children.pop() {
                        Some(Child::Node(node)) => node,
                        _ => unreachable!("internal nodes hold only node children"),
                    };
                    child.distance_to_parent = None;
                    *root = child;
                }
            },
        }
        self.len -= 1;
        #[cfg(debug_assertions)]
        self.check_invariants();
        Ok(())
    }

    /// Returns a lazy iterator over the indexed data within `range` of `query`,
    /// nearest first, truncated to at most `limit` results.
    ///
    /// Results are produced incrementally: dropping the iterator early costs nothing
    /// beyond the work already done.
    pub fn search(&self, query: &P, range: f64, limit: usize) -> Nearest<'_, P, M> {
        info!(
            "Searching the MTree around {:?} with range {} and limit {}",
            query, range, limit
        );
        let mut pending = BinaryHeap::new();
        if let Some(root) = &self.root {
            let distance = self.metric.distance(query, &root.data);
            let min_distance = (distance - root.radius).max(0.0);
            if min_distance <= range {
                pending.push(PendingItem {
                    min_distance: OrderedFloat(min_distance),
                    distance,
                    node: root,
                });
            }
        }
        Nearest {
            metric: &self.metric,
            query: query.clone(),
            range,
            limit,
            yielded: 0,
            pending,
            nearest: BinaryHeap::new(),
        }
    }

    /// Returns a lazy iterator over all indexed data, nearest to `query` first.
    pub fn nearest(&self, query: &P) -> Nearest<'_, P, M> {
        self.search(query, f64::INFINITY, usize::MAX)
    }

    /// Returns the `k` indexed data objects nearest to `query`, nearest first.
    pub fn knn_search(&self, query: &P, k: usize) -> Vec<Neighbor<'_, P>> {
        self.search(query, f64::INFINITY, k).collect()
    }

    /// Returns all indexed data within `radius` of `query`, nearest first.
    pub fn range_search(&self, query: &P, radius: f64) -> Vec<Neighbor<'_, P>> {
        self.search(query, radius, usize::MAX).collect()
    }

    /// Walks the whole tree and asserts every structural invariant. Runs after each
    /// mutation in debug builds.
    #[cfg(debug_assertions)]
    fn check_invariants(&self) {
        let root = match &self.root {
            Some(root) => root,
            None => {
                assert_eq!(self.len, 0, "an empty tree must have length zero");
                return;
            }
        };
        assert!(
            root.distance_to_parent.is_none(),
            "the root has no distance to a parent"
        );
        let root_min = match root.kind {
            NodeKind::Leaf => 1,
            NodeKind::Internal => 2,
        };
        assert!(root.children.len() >= root_min, "root under capacity");
        assert!(root.children.len() <= self.max_capacity, "root over capacity");

        let mut entries = Vec::new();
        Self::check_node(root, &self.metric, self.min_capacity, self.max_capacity, &mut entries);
        assert_eq!(entries.len(), self.len, "entry count must match the tracked length");
        for i in 0..entries.len() {
            for j in (i + 1)..entries.len() {
                assert!(entries[i] != entries[j], "indexed data must be unique");
            }
        }
    }

    /// Returns the height of the subtree; asserts capacity bounds, exact parent
    /// distances, radius coverage, child-kind coherence, and uniform leaf depth.
    #[cfg(debug_assertions)]
    fn check_node<'a>(
        node: &'a Node<P>,
        metric: &M,
        min_capacity: usize,
        max_capacity: usize,
        entries: &mut Vec<&'a P>,
    ) -> usize {
        assert!(node.radius >= 0.0, "covering radius must be non-negative");
        let mut height: Option<usize> = None;
        for child in &node.children {
            match (node.kind, child) {
                (NodeKind::Leaf, Child::Entry(entry)) => {
                    assert_eq!(
                        entry.distance_to_parent,
                        metric.distance(&entry.data, &node.data),
                        "stored parent distance must be exact"
                    );
                    assert!(
                        entry.distance_to_parent <= node.radius,
                        "entry outside its node's covering radius"
                    );
                    entries.push(&entry.data);
                }
                (NodeKind::Internal, Child::Node(inner)) => {
                    let distance_to_parent = inner
                        .distance_to_parent
                        .expect("a child node always has a distance to its parent");
                    assert_eq!(
                        distance_to_parent,
                        metric.distance(&inner.data, &node.data),
                        "stored parent distance must be exact"
                    );
                    assert!(
                        distance_to_parent + inner.radius <= node.radius,
                        "child ball outside its parent's covering radius"
                    );
                    assert!(
                        inner.children.len() >= min_capacity,
                        "non-root node under capacity"
                    );
                    assert!(
                        inner.children.len() <= max_capacity,
                        "node over capacity"
                    );
                    let child_height =
                        Self::check_node(inner, metric, min_capacity, max_capacity, entries);
                    match height {
                        None => height = Some(child_height),
                        Some(previous) => {
                            assert_eq!(previous, child_height, "leaves must share a single depth")
                        }
                    }
                }
                _ => panic!("node kind does not match its children"),
            }
        }
        height.map_or(1, |h| h + 1)
    }
}
