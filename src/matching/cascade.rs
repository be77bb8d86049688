//! Cascade hashing for L2 descriptors.
//!
//! Descriptors are centered on a mean, then projected on random Gaussian
//! directions. One projection set yields a 128-bit code compared by Hamming
//! distance; several small projection sets yield bucket ids. A query is only
//! compared against train descriptors sharing at least one bucket, and only
//! the candidates with the smallest code distance are checked with exact L2.
//!
//! Small train sets leave most buckets nearly empty. When the buckets of a
//! query hold fewer than `top_candidates` train descriptors, the query is
//! ranked against every train code instead, so the ratio test always sees a
//! second neighbor when the train set has one.

use crate::matches::IndMatches;
use crate::matching::metric::{DescriptorView, Metric, SquaredL2};
use crate::matching::neighbors::{ratio_matches, Neighbor, TopK};
use crate::util::math::standard_normal;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Bits of the primary hash code.
pub const CODE_BITS: usize = 128;

/// Parameters of the cascade hasher.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CascadeHashingParams {
    /// Number of independent bucket groups.
    pub bucket_groups: usize,
    /// Bits per bucket id, at most 16.
    pub bits_per_bucket: usize,
    /// Candidates checked with exact L2 per query.
    pub top_candidates: usize,
    /// Seed for the projection directions.
    pub seed: u64,
}

impl Default for CascadeHashingParams {
    fn default() -> Self {
        Self {
            bucket_groups: 6,
            bits_per_bucket: 10,
            top_candidates: 10,
            seed: 0,
        }
    }
}

/// Hash codes and bucket ids of one descriptor set.
#[derive(Clone, Debug, PartialEq)]
pub struct HashedDescriptors {
    codes: Vec<u128>,
    /// Row-major, `bucket_groups` ids per descriptor.
    buckets: Vec<u16>,
}

impl HashedDescriptors {
    /// Number of hashed descriptors.
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// Returns true when nothing was hashed.
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

/// Running mean of descriptors, fed one set at a time.
#[derive(Clone, Debug)]
pub struct DescriptorMean {
    sum: Vec<f64>,
    count: usize,
}

impl DescriptorMean {
    /// Starts an empty mean over `dim`-element descriptors.
    pub fn new(dim: usize) -> Self {
        Self {
            sum: vec![0.0; dim],
            count: 0,
        }
    }

    /// Accumulates every descriptor of `set`.
    pub fn add(&mut self, set: DescriptorView<'_, f32>) {
        for desc in set.iter() {
            for (s, v) in self.sum.iter_mut().zip(desc) {
                *s += f64::from(*v);
            }
            self.count += 1;
        }
    }

    /// Mean of everything added so far; zeros when nothing was added.
    pub fn finish(self) -> Vec<f32> {
        let inv = if self.count == 0 {
            0.0
        } else {
            1.0 / self.count as f64
        };
        self.sum.into_iter().map(|s| (s * inv) as f32).collect()
    }
}

/// Random projections shared by every descriptor set matched together.
#[derive(Clone, Debug)]
pub struct CascadeHasher {
    dim: usize,
    params: CascadeHashingParams,
    primary: Vec<f32>,
    secondary: Vec<f32>,
}

impl CascadeHasher {
    /// Draws the projections for `dim`-element descriptors.
    pub fn new(dim: usize, params: CascadeHashingParams) -> Self {
        let params = CascadeHashingParams {
            bucket_groups: params.bucket_groups.max(1),
            bits_per_bucket: params.bits_per_bucket.clamp(1, 16),
            top_candidates: params.top_candidates.max(2),
            seed: params.seed,
        };
        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut draw = |count: usize| -> Vec<f32> {
            (0..count).map(|_| standard_normal(&mut rng) as f32).collect()
        };
        let primary = draw(CODE_BITS * dim);
        let secondary = draw(params.bucket_groups * params.bits_per_bucket * dim);
        Self {
            dim,
            params,
            primary,
            secondary,
        }
    }

    /// Descriptor length the projections were drawn for.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Component-wise mean over several descriptor sets.
    pub fn mean<'a, I>(dim: usize, sets: I) -> Vec<f32>
    where
        I: IntoIterator<Item = DescriptorView<'a, f32>>,
    {
        let mut acc = DescriptorMean::new(dim);
        for set in sets {
            acc.add(set);
        }
        acc.finish()
    }

    /// Hashes every descriptor of `descriptors` after centering on `mean`.
    pub fn hash(&self, descriptors: DescriptorView<'_, f32>, mean: &[f32]) -> HashedDescriptors {
        let groups = self.params.bucket_groups;
        let bits = self.params.bits_per_bucket;
        let mut codes = Vec::with_capacity(descriptors.len());
        let mut buckets = Vec::with_capacity(descriptors.len() * groups);
        let mut centered = vec![0f32; self.dim];
        for desc in descriptors.iter() {
            for ((c, v), m) in centered.iter_mut().zip(desc).zip(mean) {
                *c = v - m;
            }
            let mut code = 0u128;
            for (bit, row) in self.primary.chunks_exact(self.dim).enumerate() {
                if dot(row, &centered) > 0.0 {
                    code |= 1u128 << bit;
                }
            }
            codes.push(code);
            for group in self.secondary.chunks_exact(self.dim * bits) {
                let mut id = 0u16;
                for (bit, row) in group.chunks_exact(self.dim).enumerate() {
                    if dot(row, &centered) > 0.0 {
                        id |= 1u16 << bit;
                    }
                }
                buckets.push(id);
            }
        }
        HashedDescriptors { codes, buckets }
    }

    /// Ratio-test matching of hashed `query` descriptors against hashed
    /// `train` descriptors.
    pub fn match_hashed(
        &self,
        query: (&HashedDescriptors, DescriptorView<'_, f32>),
        train: (&HashedDescriptors, DescriptorView<'_, f32>),
        ratio: f32,
    ) -> IndMatches {
        let (query_hash, query_desc) = query;
        let (train_hash, train_desc) = train;
        if train_hash.len() < 2 {
            return IndMatches::new();
        }
        let groups = self.params.bucket_groups;
        let bucket_count = 1usize << self.params.bits_per_bucket;

        // table[group][bucket] -> train indices
        let mut table = vec![vec![Vec::<u32>::new(); bucket_count]; groups];
        for (idx, ids) in train_hash.buckets.chunks_exact(groups).enumerate() {
            for (group, &id) in ids.iter().enumerate() {
                table[group][id as usize].push(idx as u32);
            }
        }

        let mut stamp = vec![usize::MAX; train_hash.len()];
        let mut by_code_distance = vec![Vec::<u32>::new(); CODE_BITS + 1];
        ratio_matches(query_hash.len(), SquaredL2::ratio_bound(ratio), |i| {
            let code = query_hash.codes[i];
            let ids = &query_hash.buckets[i * groups..(i + 1) * groups];
            let mut collected = 0usize;
            for (group, &id) in ids.iter().enumerate() {
                for &cand in &table[group][id as usize] {
                    if stamp[cand as usize] == i {
                        continue;
                    }
                    stamp[cand as usize] = i;
                    let d = (code ^ train_hash.codes[cand as usize]).count_ones() as usize;
                    by_code_distance[d].push(cand);
                    collected += 1;
                }
            }
            if collected < self.params.top_candidates {
                for (cand, &train_code) in train_hash.codes.iter().enumerate() {
                    if stamp[cand] != i {
                        stamp[cand] = i;
                        let d = (code ^ train_code).count_ones() as usize;
                        by_code_distance[d].push(cand as u32);
                    }
                }
            }

            let mut top = TopK::new(2);
            let mut checked = 0usize;
            let q = query_desc.get(i);
            for bin in by_code_distance.iter_mut() {
                for &cand in bin.iter() {
                    if checked >= self.params.top_candidates {
                        break;
                    }
                    checked += 1;
                    top.push(Neighbor {
                        index: cand,
                        distance: SquaredL2::distance(q, train_desc.get(cand as usize)),
                    });
                }
                bin.clear();
            }
            top.into_sorted()
        })
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Hashes both sets with a mean taken over the pair, then matches them.
pub fn match_cascade(
    query: DescriptorView<'_, f32>,
    train: DescriptorView<'_, f32>,
    ratio: f32,
    params: CascadeHashingParams,
) -> IndMatches {
    let hasher = CascadeHasher::new(train.dim(), params);
    let mean = CascadeHasher::mean(train.dim(), [query, train]);
    let query_hash = hasher.hash(query, &mean);
    let train_hash = hasher.hash(train, &mean);
    hasher.match_hashed((&query_hash, query), (&train_hash, train), ratio)
}
