//! Hierarchical navigable small world matching on the `hnsw` crate.
//!
//! The graph stores borrowed descriptors and orders them through
//! [`MetricSpace`], which exposes a [`Metric`] to `space` in `f32` bit units.
//! Level assignment draws from the crate's default-seeded `Pcg64`, so a given
//! descriptor set always produces the same graph.

use crate::matches::IndMatches;
use crate::matching::metric::{DescriptorView, Metric};
use crate::matching::neighbors::{ratio_matches, Neighbor};
use ::hnsw::{Hnsw, Params, Searcher};
use rand_pcg::Pcg64;
use std::marker::PhantomData;

/// Links per node on upper layers.
const LINKS: usize = 12;
/// Links per node on layer zero.
const LINKS_ZERO: usize = 24;

/// Parameters of the HNSW index.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HnswParams {
    /// Candidate list size while inserting.
    pub ef_construction: usize,
    /// Candidate list size while querying.
    pub ef_search: usize,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            ef_construction: 100,
            ef_search: 64,
        }
    }
}

/// [`Metric`] seen through `space`.
///
/// Distances are non-negative floats, whose bit patterns order like the
/// values, so `f32::to_bits` serves as the unsigned unit.
pub struct MetricSpace<M>(PhantomData<fn() -> M>);

impl<M> MetricSpace<M> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<M> Default for MetricSpace<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, M: Metric> space::Metric<&'a [M::Element]> for MetricSpace<M> {
    type Unit = u32;

    fn distance(&self, a: &&'a [M::Element], b: &&'a [M::Element]) -> u32 {
        M::distance(a, b).to_bits()
    }
}

/// HNSW index over borrowed descriptors.
pub struct HnswIndex<'a, M: Metric> {
    graph: Hnsw<MetricSpace<M>, &'a [M::Element], Pcg64, LINKS, LINKS_ZERO>,
    ef_search: usize,
}

impl<'a, M: Metric> HnswIndex<'a, M> {
    /// Builds the index by inserting every descriptor of `data` in order.
    pub fn build(data: DescriptorView<'a, M::Element>, params: HnswParams) -> Self {
        let mut graph = Hnsw::new_params(
            MetricSpace::new(),
            Params::new().ef_construction(params.ef_construction.max(1)),
        );
        let mut searcher = Searcher::default();
        for descriptor in data.iter() {
            graph.insert(descriptor, &mut searcher);
        }
        Self {
            graph,
            ef_search: params.ef_search.max(1),
        }
    }

    /// Number of indexed descriptors.
    pub fn len(&self) -> usize {
        self.graph.len()
    }

    /// Returns true when nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    /// Approximate `k` nearest neighbors of `query`, closest first.
    pub fn knn(&self, query: &'a [M::Element], k: usize) -> Vec<Neighbor> {
        self.knn_with(query, k, &mut Searcher::default())
    }

    fn knn_with(
        &self,
        query: &'a [M::Element],
        k: usize,
        searcher: &mut Searcher<u32>,
    ) -> Vec<Neighbor> {
        if k == 0 || self.graph.is_empty() {
            return Vec::new();
        }
        let mut dest = vec![
            space::Neighbor {
                index: !0,
                distance: !0,
            };
            k
        ];
        self.graph
            .nearest(&query, self.ef_search.max(k), searcher, &mut dest)
            .iter()
            .map(|n| Neighbor {
                index: n.index as u32,
                distance: f32::from_bits(n.distance),
            })
            .collect()
    }
}

/// Approximate matching of `query` against an HNSW graph built over `train`.
pub fn match_hnsw<'a, M: Metric>(
    query: DescriptorView<'a, M::Element>,
    train: DescriptorView<'a, M::Element>,
    ratio: f32,
    params: HnswParams,
) -> IndMatches {
    if train.len() < 2 {
        return IndMatches::new();
    }
    let index = HnswIndex::<M>::build(train, params);
    let mut searcher = Searcher::default();
    ratio_matches(query.len(), M::ratio_bound(ratio), |i| {
        index.knn_with(query.get(i), 2, &mut searcher)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::brute;
    use crate::matching::metric::{Hamming, SquaredL2, L1};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_f32(count: usize, dim: usize, seed: u64) -> Vec<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..count * dim).map(|_| rng.random::<f32>()).collect()
    }

    #[test]
    fn bit_units_preserve_distance_order() {
        let l1 = MetricSpace::<L1>::new();
        let origin: &[f32] = &[0.0, 0.0];
        let near: &[f32] = &[0.25, 0.0];
        let far: &[f32] = &[3.0, 1.5];
        let d_near = space::Metric::distance(&l1, &origin, &near);
        let d_far = space::Metric::distance(&l1, &origin, &far);
        assert!(d_near < d_far);
        assert_eq!(f32::from_bits(d_far), 4.5);
    }

    #[test]
    fn recall_against_brute_force() {
        let train = random_f32(400, 8, 7);
        let query = random_f32(100, 8, 8);
        let train_view = DescriptorView::new(&train, 8);
        let index = HnswIndex::<SquaredL2>::build(train_view, HnswParams::default());
        assert_eq!(index.len(), 400);
        let hits = DescriptorView::new(&query, 8)
            .iter()
            .filter(|q| {
                index.knn(*q, 1)[0].index == brute::knn::<SquaredL2>(train_view, q, 1)[0].index
            })
            .count();
        assert!(hits >= 90, "recall {hits}/100");
    }

    #[test]
    fn finds_stored_points_in_every_metric() {
        let floats = random_f32(200, 4, 9);
        let view = DescriptorView::new(&floats, 4);
        let params = HnswParams {
            ef_search: 200,
            ..HnswParams::default()
        };
        let l1 = HnswIndex::<L1>::build(view, params);
        for idx in [0usize, 99, 199] {
            assert_eq!(l1.knn(view.get(idx), 2)[0].index, idx as u32);
        }

        let mut rng = StdRng::seed_from_u64(10);
        let bytes: Vec<u8> = (0..200 * 32).map(|_| rng.random::<u8>()).collect();
        let bin = DescriptorView::new(&bytes, 32);
        let hamming = HnswIndex::<Hamming>::build(bin, params);
        for idx in [3usize, 150] {
            let found = hamming.knn(bin.get(idx), 2);
            assert_eq!(found[0].index, idx as u32);
            assert_eq!(found[0].distance, 0.0);
        }
    }

    #[test]
    fn repeated_builds_match_identically() {
        let train = random_f32(150, 8, 11);
        let query = random_f32(60, 8, 12);
        let run = || {
            match_hnsw::<SquaredL2>(
                DescriptorView::new(&query, 8),
                DescriptorView::new(&train, 8),
                0.8,
                HnswParams::default(),
            )
        };
        assert_eq!(run(), run());
    }
}
