//! Region providers: the single source of regions for a stage.

use crate::progress::Progress;
use crate::regions::cache::RegionCache;
use crate::regions::io::{read_regions, region_paths};
use crate::regions::{Regions, RegionsType};
use crate::scene::{Scene, ViewId};
use crate::trace::{trace_event, trace_span};
use crate::util::{PairMatchError, PairMatchResult};
#[cfg(feature = "rayon")]
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// How regions are held in memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderMode {
    /// Every region is decoded at load time and stays resident.
    Eager,
    /// Regions are decoded on demand; at most `capacity` stay resident.
    Cached { capacity: usize },
    /// Like `Eager`, keeping only the `feature_count` largest-scale features.
    Preemptive { feature_count: usize },
}

impl ProviderMode {
    /// Picks the mode from the stage options: a preemptive feature count wins
    /// over a cache size, and a zero cache size means eager.
    pub fn from_options(cache_size: usize, preemptive_feature_count: Option<usize>) -> Self {
        match preemptive_feature_count {
            Some(feature_count) if feature_count > 0 => ProviderMode::Preemptive { feature_count },
            _ if cache_size > 0 => ProviderMode::Cached {
                capacity: cache_size,
            },
            _ => ProviderMode::Eager,
        }
    }
}

enum Store {
    Resident(BTreeMap<ViewId, Arc<Regions>>),
    Cached(RegionCache),
}

/// Shared-ownership access to the regions of every view of a scene.
pub struct RegionsProvider {
    regions_type: RegionsType,
    mode: ProviderMode,
    store: Store,
}

impl RegionsProvider {
    /// Resolves and loads the regions of every view of `scene` from `dir`.
    ///
    /// Fails if any view lacks one of its companion files or, for the
    /// resident modes, if any of them fails to parse.
    pub fn load(
        scene: &Scene,
        dir: &Path,
        regions_type: RegionsType,
        mode: ProviderMode,
        progress: &Progress,
    ) -> PairMatchResult<Self> {
        let _span = trace_span!("load_regions", views = scene.len()).entered();
        regions_type.validate()?;

        let mut sources: Vec<(ViewId, PathBuf, PathBuf)> = Vec::with_capacity(scene.len());
        for view in scene.views() {
            let (feat_path, desc_path) = region_paths(dir, view)?;
            for path in [&feat_path, &desc_path] {
                if !path.is_file() {
                    return Err(PairMatchError::MissingRegions {
                        view_id: view.id,
                        path: path.clone(),
                    });
                }
            }
            sources.push((view.id, feat_path, desc_path));
        }

        progress.restart(sources.len());
        let store = match mode {
            ProviderMode::Cached { capacity } => {
                let mut cache = RegionCache::new(capacity, regions_type)?;
                for (view_id, feat_path, desc_path) in sources {
                    cache.register(view_id, feat_path, desc_path);
                    progress.inc();
                }
                Store::Cached(cache)
            }
            ProviderMode::Eager | ProviderMode::Preemptive { .. } => {
                let truncate = match mode {
                    ProviderMode::Preemptive { feature_count } => Some(feature_count),
                    _ => None,
                };
                let decode = |(view_id, feat_path, desc_path): &(ViewId, PathBuf, PathBuf)|
                 -> PairMatchResult<(ViewId, Arc<Regions>)> {
                    let regions = read_regions(feat_path, desc_path, regions_type)?;
                    let regions = match truncate {
                        Some(count) => regions.strongest(count),
                        None => regions,
                    };
                    progress.inc();
                    Ok((*view_id, Arc::new(regions)))
                };
                #[cfg(feature = "rayon")]
                let loaded: PairMatchResult<Vec<_>> = sources.par_iter().map(decode).collect();
                #[cfg(not(feature = "rayon"))]
                let loaded: PairMatchResult<Vec<_>> = sources.iter().map(decode).collect();
                Store::Resident(loaded?.into_iter().collect())
            }
        };

        trace_event!("regions_loaded", views = scene.len());
        Ok(Self {
            regions_type,
            mode,
            store,
        })
    }

    /// Wraps regions that are already in memory.
    pub fn from_regions(
        regions_type: RegionsType,
        regions: impl IntoIterator<Item = (ViewId, Regions)>,
    ) -> Self {
        Self {
            regions_type,
            mode: ProviderMode::Eager,
            store: Store::Resident(
                regions
                    .into_iter()
                    .map(|(id, r)| (id, Arc::new(r)))
                    .collect(),
            ),
        }
    }

    /// Descriptor encoding of every region.
    pub fn regions_type(&self) -> RegionsType {
        self.regions_type
    }

    /// Residency mode chosen at load time.
    pub fn mode(&self) -> ProviderMode {
        self.mode
    }

    /// The underlying cache, for the cached mode.
    pub fn cache(&self) -> Option<&RegionCache> {
        match &self.store {
            Store::Cached(cache) => Some(cache),
            Store::Resident(_) => None,
        }
    }

    /// Returns true when the provider knows the view.
    pub fn contains(&self, view_id: ViewId) -> bool {
        match &self.store {
            Store::Resident(map) => map.contains_key(&view_id),
            Store::Cached(cache) => cache.contains(view_id),
        }
    }

    /// Known view ids in ascending order.
    pub fn view_ids(&self) -> Vec<ViewId> {
        match &self.store {
            Store::Resident(map) => map.keys().copied().collect(),
            Store::Cached(cache) => cache.view_ids().collect(),
        }
    }

    /// Regions of a view; cached providers may decode them on the fly.
    pub fn get(&self, view_id: ViewId) -> PairMatchResult<Arc<Regions>> {
        match &self.store {
            Store::Resident(map) => map
                .get(&view_id)
                .cloned()
                .ok_or(PairMatchError::UnknownView(view_id)),
            Store::Cached(cache) => cache.get(view_id),
        }
    }
}
