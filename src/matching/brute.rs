//! Exhaustive nearest neighbor search.

use crate::matches::IndMatches;
use crate::matching::metric::{DescriptorView, Metric};
use crate::matching::neighbors::{ratio_matches, Neighbor, TopK};

/// Exact `k` nearest neighbors of `query` among `train`.
pub fn knn<M: Metric>(
    train: DescriptorView<'_, M::Element>,
    query: &[M::Element],
    k: usize,
) -> Vec<Neighbor> {
    let mut top = TopK::new(k);
    for (idx, desc) in train.iter().enumerate() {
        top.push(Neighbor {
            index: idx as u32,
            distance: M::distance(query, desc),
        });
    }
    top.into_sorted()
}

/// Matches every query descriptor against `train` with the distance ratio
/// test.
pub fn match_brute_force<M: Metric>(
    query: DescriptorView<'_, M::Element>,
    train: DescriptorView<'_, M::Element>,
    ratio: f32,
) -> IndMatches {
    if train.len() < 2 {
        return IndMatches::new();
    }
    ratio_matches(query.len(), M::ratio_bound(ratio), |i| {
        knn::<M>(train, query.get(i), 2)
    })
}
