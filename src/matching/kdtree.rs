//! Randomized kd-tree forest for approximate L2 search.
//!
//! Each tree splits on a dimension drawn among the highest-variance ones, at
//! the mean value. Queries descend every tree and then explore the closest
//! unexplored branches across the forest until `checks` descriptors have been
//! compared.

use crate::matches::IndMatches;
use crate::matching::metric::{DescriptorView, Metric, SquaredL2};
use crate::matching::neighbors::{ratio_matches, Neighbor, TopK};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

const SPLIT_CANDIDATES: usize = 5;
const VARIANCE_SAMPLE: usize = 100;

/// Parameters of the kd-tree forest.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KdTreeParams {
    /// Number of randomized trees.
    pub trees: usize,
    /// Maximum descriptors per leaf.
    pub leaf_size: usize,
    /// Descriptor comparisons allowed per query.
    pub checks: usize,
    /// Seed for split dimension selection.
    pub seed: u64,
}

impl Default for KdTreeParams {
    fn default() -> Self {
        Self {
            trees: 4,
            leaf_size: 8,
            checks: 256,
            seed: 0,
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum KdNode {
    Leaf { start: usize, end: usize },
    Split { dim: usize, value: f32, left: usize, right: usize },
}

#[derive(Debug)]
struct KdTree {
    nodes: Vec<KdNode>,
    order: Vec<u32>,
}

#[derive(Clone, Copy, Debug)]
struct Branch {
    bound: f32,
    tree: usize,
    node: usize,
}

impl PartialEq for Branch {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Branch {}

impl PartialOrd for Branch {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Branch {
    // Reversed so `BinaryHeap` pops the smallest bound first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .bound
            .total_cmp(&self.bound)
            .then_with(|| other.tree.cmp(&self.tree))
            .then_with(|| other.node.cmp(&self.node))
    }
}

/// Forest of randomized kd-trees over borrowed descriptors.
#[derive(Debug)]
pub struct KdForest<'a> {
    data: DescriptorView<'a, f32>,
    trees: Vec<KdTree>,
    checks: usize,
}

impl<'a> KdForest<'a> {
    /// Builds the forest over `data`.
    pub fn build(data: DescriptorView<'a, f32>, params: KdTreeParams) -> Self {
        let mut rng = StdRng::seed_from_u64(params.seed);
        let leaf_size = params.leaf_size.max(1);
        let trees = (0..params.trees.max(1))
            .map(|_| {
                let mut tree = KdTree {
                    nodes: Vec::new(),
                    order: (0..data.len() as u32).collect(),
                };
                let len = tree.order.len();
                build_node(&mut tree, data, 0, len, leaf_size, &mut rng);
                tree
            })
            .collect();
        Self {
            data,
            trees,
            checks: params.checks.max(1),
        }
    }

    /// Approximate `k` nearest neighbors of `query`.
    pub fn knn(&self, query: &[f32], k: usize) -> Vec<Neighbor> {
        let mut top = TopK::new(k);
        let mut heap = BinaryHeap::new();
        let mut visited = vec![false; self.data.len()];
        let mut checked = 0usize;
        for tree in 0..self.trees.len() {
            self.descend(tree, 0, query, &mut heap, &mut top, &mut visited, &mut checked);
        }
        while let Some(branch) = heap.pop() {
            if checked >= self.checks {
                break;
            }
            if top.worst_distance().is_some_and(|worst| branch.bound > worst) {
                break;
            }
            self.descend(
                branch.tree,
                branch.node,
                query,
                &mut heap,
                &mut top,
                &mut visited,
                &mut checked,
            );
        }
        top.into_sorted()
    }

    #[allow(clippy::too_many_arguments)]
    fn descend(
        &self,
        tree_idx: usize,
        mut node: usize,
        query: &[f32],
        heap: &mut BinaryHeap<Branch>,
        top: &mut TopK,
        visited: &mut [bool],
        checked: &mut usize,
    ) {
        let tree = &self.trees[tree_idx];
        loop {
            match tree.nodes[node] {
                KdNode::Split {
                    dim,
                    value,
                    left,
                    right,
                } => {
                    let diff = query[dim] - value;
                    let (near, far) = if diff < 0.0 { (left, right) } else { (right, left) };
                    heap.push(Branch {
                        bound: diff * diff,
                        tree: tree_idx,
                        node: far,
                    });
                    node = near;
                }
                KdNode::Leaf { start, end } => {
                    for &idx in &tree.order[start..end] {
                        let slot = &mut visited[idx as usize];
                        if *slot {
                            continue;
                        }
                        *slot = true;
                        *checked += 1;
                        top.push(Neighbor {
                            index: idx,
                            distance: SquaredL2::distance(query, self.data.get(idx as usize)),
                        });
                    }
                    return;
                }
            }
        }
    }
}

fn build_node(
    tree: &mut KdTree,
    data: DescriptorView<'_, f32>,
    start: usize,
    end: usize,
    leaf_size: usize,
    rng: &mut StdRng,
) -> usize {
    let node_idx = tree.nodes.len();
    tree.nodes.push(KdNode::Leaf { start, end });
    if end - start <= leaf_size {
        return node_idx;
    }

    let (dim, value) = choose_split(data, &tree.order[start..end], rng);
    let slice = &mut tree.order[start..end];
    let mut mid = 0usize;
    for k in 0..slice.len() {
        if data.get(slice[k] as usize)[dim] < value {
            slice.swap(k, mid);
            mid += 1;
        }
    }
    if mid == 0 || mid == slice.len() {
        return node_idx;
    }

    let mid = start + mid;
    let left = build_node(tree, data, start, mid, leaf_size, rng);
    let right = build_node(tree, data, mid, end, leaf_size, rng);
    tree.nodes[node_idx] = KdNode::Split {
        dim,
        value,
        left,
        right,
    };
    node_idx
}

fn choose_split(data: DescriptorView<'_, f32>, indices: &[u32], rng: &mut StdRng) -> (usize, f32) {
    let dim = data.dim();
    let sample = &indices[..indices.len().min(VARIANCE_SAMPLE)];
    let inv = 1.0 / sample.len() as f32;
    let mut mean = vec![0f32; dim];
    for &idx in sample {
        for (m, v) in mean.iter_mut().zip(data.get(idx as usize)) {
            *m += v * inv;
        }
    }
    let mut variance = vec![0f32; dim];
    for &idx in sample {
        for ((var, m), v) in variance.iter_mut().zip(&mean).zip(data.get(idx as usize)) {
            let d = v - m;
            *var += d * d;
        }
    }

    let mut dims: Vec<usize> = (0..dim).collect();
    dims.sort_by(|&a, &b| variance[b].total_cmp(&variance[a]).then_with(|| a.cmp(&b)));
    let pick = dims[rng.random_range(0..SPLIT_CANDIDATES.min(dim))];
    (pick, mean[pick])
}

/// Approximate L2 matching of `query` against a forest built over `train`.
pub fn match_kdtree(
    query: DescriptorView<'_, f32>,
    train: DescriptorView<'_, f32>,
    ratio: f32,
    params: KdTreeParams,
) -> IndMatches {
    if train.len() < 2 {
        return IndMatches::new();
    }
    let forest = KdForest::build(train, params);
    ratio_matches(query.len(), SquaredL2::ratio_bound(ratio), |i| {
        forest.knn(query.get(i), 2)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::brute;
    use rand::Rng;

    fn random_descriptors(count: usize, dim: usize, seed: u64) -> Vec<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..count * dim).map(|_| rng.random::<f32>()).collect()
    }

    #[test]
    fn exhaustive_checks_equal_brute_force() {
        let train = random_descriptors(300, 16, 1);
        let query = random_descriptors(40, 16, 2);
        let train_view = DescriptorView::new(&train, 16);
        let forest = KdForest::build(
            train_view,
            KdTreeParams {
                checks: usize::MAX,
                ..KdTreeParams::default()
            },
        );
        for q in DescriptorView::new(&query, 16).iter() {
            let approx = forest.knn(q, 2);
            let exact = brute::knn::<SquaredL2>(train_view, q, 2);
            assert_eq!(approx[0].index, exact[0].index);
            assert_eq!(approx[1].index, exact[1].index);
        }
    }

    #[test]
    fn exact_copies_are_found() {
        let train = random_descriptors(500, 32, 3);
        let view = DescriptorView::new(&train, 32);
        let forest = KdForest::build(view, KdTreeParams::default());
        for idx in [0usize, 17, 250, 499] {
            let result = forest.knn(view.get(idx), 2);
            assert_eq!(result[0].index, idx as u32);
            assert_eq!(result[0].distance, 0.0);
        }
    }
}
