//! Build-once memoization keyed by identity.
//!
//! Used to share one bottom-level structure per instance group across every
//! reference to it, including references requested concurrently from
//! several build threads.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use strata_core::SceneResult;

type Slot<V> = Arc<OnceLock<SceneResult<Arc<V>>>>;

/// Thread-safe map from key to a value built at most once.
///
/// The first caller for a key runs the builder; callers arriving while it
/// runs block until it finishes and then share its result, error included.
/// The map lock is only held to find the slot, never during a build, so
/// builds of different keys proceed in parallel.
pub struct BuildCache<K, V> {
    slots: Mutex<HashMap<K, Slot<V>>>,
    builds: AtomicUsize,
}

impl<K, V> Default for BuildCache<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            builds: AtomicUsize::new(0),
        }
    }
}

impl<K, V> BuildCache<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Value for `key`, running `build` only if no value exists or is being
    /// built.
    pub fn get_or_build<F>(&self, key: K, build: F) -> SceneResult<Arc<V>>
    where
        F: FnOnce() -> SceneResult<V>,
    {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(key).or_default())
        };

        slot.get_or_init(|| {
            self.builds.fetch_add(1, Ordering::Relaxed);
            build().map(Arc::new)
        })
        .clone()
    }

    /// Finished value for `key`, if any.
    pub fn get(&self, key: &K) -> Option<SceneResult<Arc<V>>> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.get(key).and_then(|slot| slot.get().cloned())
    }

    /// Number of builders that ran.
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }

    /// Number of keys with a slot.
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every finished successful value.
    pub fn values(&self) -> Vec<Arc<V>> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .values()
            .filter_map(|slot| slot.get().and_then(|r| r.as_ref().ok()).cloned())
            .collect()
    }
}
