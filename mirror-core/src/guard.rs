use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Mutex;

use crate::error::{MirrorError, Result};

/// Removes its key from the in-progress set when dropped, including when the
/// owning future is dropped mid-flight.
pub(crate) struct InProgress<'a, K: Hash + Eq + Clone> {
    set: &'a Mutex<HashSet<K>>,
    key: K,
}

impl<'a, K: Hash + Eq + Clone> InProgress<'a, K> {
    pub(crate) fn acquire(set: &'a Mutex<HashSet<K>>, key: K, what: impl FnOnce() -> String) -> Result<Self> {
        let mut running = set.lock().unwrap_or_else(|e| e.into_inner());
        if !running.insert(key.clone()) {
            return Err(MirrorError::OperationInProgress(what()));
        }
        Ok(Self { set, key })
    }
}

impl<K: Hash + Eq + Clone> Drop for InProgress<'_, K> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.key);
    }
}
