//! Capacity-bounded region cache with least-recently-used eviction.
//!
//! Views are registered up front with the paths of their companion files and
//! decoded lazily on first access. A lookup that misses marks the view as
//! `Loading`, releases the lock while decoding, and wakes any thread that
//! requested the same view in the meantime, so each view is decoded by at most
//! one thread at a time. Eviction only considers entries whose `Arc` is not
//! shared with a caller.

use crate::regions::io::read_regions;
use crate::regions::{Regions, RegionsType};
use crate::scene::ViewId;
use crate::trace::trace_debug;
use crate::util::{PairMatchError, PairMatchResult};
use parking_lot::{Condvar, Mutex};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

enum Slot {
    Loading,
    Ready {
        regions: Arc<Regions>,
        last_used: u64,
    },
}

enum Lookup {
    Hit(Arc<Regions>),
    Pending,
    Miss,
}

#[derive(Default)]
struct CacheState {
    slots: HashMap<ViewId, Slot>,
    clock: u64,
    evictions: usize,
}

impl CacheState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn resident(&self) -> usize {
        self.slots
            .values()
            .filter(|slot| matches!(slot, Slot::Ready { .. }))
            .count()
    }

    fn evict_over(&mut self, capacity: usize) {
        while self.resident() > capacity {
            let victim = self
                .slots
                .iter()
                .filter_map(|(&id, slot)| match slot {
                    Slot::Ready { regions, last_used } if Arc::strong_count(regions) == 1 => {
                        Some((*last_used, id))
                    }
                    _ => None,
                })
                .min();
            match victim {
                Some((_, id)) => {
                    self.slots.remove(&id);
                    self.evictions += 1;
                    trace_debug!("region_evicted", view_id = id);
                }
                // Everything left is borrowed by in-flight work.
                None => break,
            }
        }
    }
}

/// Lazily loading region store holding at most `capacity` unshared regions.
pub struct RegionCache {
    capacity: usize,
    regions_type: RegionsType,
    sources: BTreeMap<ViewId, (PathBuf, PathBuf)>,
    state: Mutex<CacheState>,
    loaded: Condvar,
}

impl RegionCache {
    /// Creates an empty cache.
    pub fn new(capacity: usize, regions_type: RegionsType) -> PairMatchResult<Self> {
        if capacity == 0 {
            return Err(PairMatchError::InvalidInput("cache capacity must be > 0"));
        }
        Ok(Self {
            capacity,
            regions_type,
            sources: BTreeMap::new(),
            state: Mutex::new(CacheState::default()),
            loaded: Condvar::new(),
        })
    }

    /// Registers the companion files of a view without decoding them.
    pub fn register(&mut self, view_id: ViewId, feat_path: PathBuf, desc_path: PathBuf) {
        self.sources.insert(view_id, (feat_path, desc_path));
    }

    /// Maximum number of resident regions.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Registered view ids.
    pub fn view_ids(&self) -> impl Iterator<Item = ViewId> + '_ {
        self.sources.keys().copied()
    }

    /// Returns true when the view is registered.
    pub fn contains(&self, view_id: ViewId) -> bool {
        self.sources.contains_key(&view_id)
    }

    /// Number of decoded regions currently held.
    pub fn resident_count(&self) -> usize {
        self.state.lock().resident()
    }

    /// Returns true when the view is decoded and held.
    pub fn is_resident(&self, view_id: ViewId) -> bool {
        matches!(
            self.state.lock().slots.get(&view_id),
            Some(Slot::Ready { .. })
        )
    }

    /// Number of evictions since creation.
    pub fn evictions(&self) -> usize {
        self.state.lock().evictions
    }

    /// Returns the regions of a view, decoding them on a miss.
    pub fn get(&self, view_id: ViewId) -> PairMatchResult<Arc<Regions>> {
        let (feat_path, desc_path) = self
            .sources
            .get(&view_id)
            .ok_or(PairMatchError::UnknownView(view_id))?;

        let mut state = self.state.lock();
        loop {
            let tick = state.tick();
            let lookup = match state.slots.get_mut(&view_id) {
                Some(Slot::Ready { regions, last_used }) => {
                    *last_used = tick;
                    Lookup::Hit(Arc::clone(regions))
                }
                Some(Slot::Loading) => Lookup::Pending,
                None => Lookup::Miss,
            };
            match lookup {
                Lookup::Hit(regions) => return Ok(regions),
                Lookup::Pending => self.loaded.wait(&mut state),
                Lookup::Miss => break,
            }
        }
        state.slots.insert(view_id, Slot::Loading);
        drop(state);

        let decoded = read_regions(feat_path, desc_path, self.regions_type);

        let mut state = self.state.lock();
        let result = match decoded {
            Ok(regions) => {
                let regions = Arc::new(regions);
                let last_used = state.tick();
                state.slots.insert(
                    view_id,
                    Slot::Ready {
                        regions: Arc::clone(&regions),
                        last_used,
                    },
                );
                state.evict_over(self.capacity);
                Ok(regions)
            }
            Err(err) => {
                state.slots.remove(&view_id);
                Err(err)
            }
        };
        drop(state);
        self.loaded.notify_all();
        result
    }
}
