//! Family of cache cells addressed by key

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use crate::cache::cell::{CacheCell, CachePolicy, CacheStatus, Lookup};
use crate::clock::Clock;
use crate::upstream::FetchError;

/// One [`CacheCell`] per key, created on first use and kept for the process lifetime
pub struct KeyedCache<K, T> {
    kind: &'static str,
    policy: CachePolicy,
    clock: Arc<dyn Clock>,
    cells: Mutex<HashMap<K, Arc<CacheCell<T>>>>,
}

impl<K, T> KeyedCache<K, T>
where
    K: Eq + Hash + Clone + Display,
    T: Default + Send + Sync + 'static,
{
    pub fn new(kind: &'static str, policy: CachePolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            kind,
            policy,
            clock,
            cells: Mutex::new(HashMap::new()),
        }
    }

    fn cell(&self, key: &K) -> Arc<CacheCell<T>> {
        let mut cells = self.cells.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(cells.entry(key.clone()).or_insert_with(|| {
            Arc::new(CacheCell::new(self.kind, self.policy, Arc::clone(&self.clock)))
        }))
    }

    /// [`CacheCell::get_or_refresh`] on the cell for `key`
    pub async fn get_or_refresh<F, Fut>(&self, key: &K, fetch: F) -> Lookup<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        self.cell(key).get_or_refresh(fetch).await
    }

    pub fn len(&self) -> usize {
        self.cells.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn status(&self) -> Vec<CacheStatus> {
        let cells: Vec<(K, Arc<CacheCell<T>>)> = self
            .cells
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(k, c)| (k.clone(), Arc::clone(c)))
            .collect();

        let mut statuses: Vec<CacheStatus> = cells
            .into_iter()
            .map(|(key, cell)| cell.status(Some(key.to_string())))
            .collect();
        statuses.sort_by(|a, b| a.key.cmp(&b.key));
        statuses
    }
}
