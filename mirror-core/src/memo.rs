use std::collections::HashMap;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use tracing::debug;

use crate::error::Result;
use crate::services::Translator;

const NIL: usize = usize::MAX;

struct Node<K, V> {
    key: K,
    value: V,
    prev: usize,
    next: usize,
}

/// Fixed-capacity map with least-recently-used eviction.
///
/// Entries live in a slab; `prev`/`next` indices thread them into a recency
/// list with `head` the most recent and `tail` the next to evict. Lookups go
/// through `index`, so `get`, `put` and eviction are all O(1).
pub struct LruCache<K, V> {
    index: HashMap<K, usize>,
    nodes: Vec<Node<K, V>>,
    head: usize,
    tail: usize,
    capacity: NonZeroUsize,
}

impl<K: Hash + Eq + Clone, V> LruCache<K, V> {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            index: HashMap::with_capacity(capacity.get()),
            nodes: Vec::with_capacity(capacity.get()),
            head: NIL,
            tail: NIL,
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Membership test that does not touch recency.
    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    pub fn get(&mut self, key: &K) -> Option<&V> {
        let slot = *self.index.get(key)?;
        self.detach(slot);
        self.push_front(slot);
        Some(&self.nodes[slot].value)
    }

    /// Inserts or replaces `key`; returns the entry evicted to make room.
    pub fn put(&mut self, key: K, value: V) -> Option<(K, V)> {
        if let Some(&slot) = self.index.get(&key) {
            self.nodes[slot].value = value;
            self.detach(slot);
            self.push_front(slot);
            return None;
        }

        if self.nodes.len() < self.capacity.get() {
            let slot = self.nodes.len();
            self.nodes.push(Node {
                key: key.clone(),
                value,
                prev: NIL,
                next: NIL,
            });
            self.index.insert(key, slot);
            self.push_front(slot);
            return None;
        }

        // Full: reuse the tail slot for the new entry.
        let slot = self.tail;
        self.detach(slot);
        let old_key = std::mem::replace(&mut self.nodes[slot].key, key.clone());
        let old_value = std::mem::replace(&mut self.nodes[slot].value, value);
        self.index.remove(&old_key);
        self.index.insert(key, slot);
        self.push_front(slot);
        Some((old_key, old_value))
    }

    pub fn clear(&mut self) {
        self.index.clear();
        self.nodes.clear();
        self.head = NIL;
        self.tail = NIL;
    }

    fn detach(&mut self, slot: usize) {
        let (prev, next) = (self.nodes[slot].prev, self.nodes[slot].next);
        if prev == NIL {
            self.head = next;
        } else {
            self.nodes[prev].next = next;
        }
        if next == NIL {
            self.tail = prev;
        } else {
            self.nodes[next].prev = prev;
        }
        self.nodes[slot].prev = NIL;
        self.nodes[slot].next = NIL;
    }

    fn push_front(&mut self, slot: usize) {
        self.nodes[slot].next = self.head;
        if self.head != NIL {
            self.nodes[self.head].prev = slot;
        }
        self.head = slot;
        if self.tail == NIL {
            self.tail = slot;
        }
    }
}

/// Session-wide memo of translations keyed by `(source text, target language)`.
/// Shared between workers; the lock is never held across an `.await`.
pub struct TranslationMemo {
    inner: Mutex<LruCache<(String, String), String>>,
}

impl TranslationMemo {
    pub const DEFAULT_CAPACITY: usize = 50;

    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity)
            .or(NonZeroUsize::new(Self::DEFAULT_CAPACITY))
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, text: &str, lang: &str) -> Option<String> {
        let mut cache = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        cache.get(&(text.to_owned(), lang.to_owned())).cloned()
    }

    pub fn put(&self, text: &str, lang: &str, translated: String) {
        let mut cache = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(((evicted, evicted_lang), _)) =
            cache.put((text.to_owned(), lang.to_owned()), translated)
        {
            debug!(lang = %evicted_lang, chars = evicted.len(), "memo evicted entry");
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Translates through the memo. Empty text and the default language pass
    /// through untouched without calling the translator.
    pub async fn translate(
        &self,
        translator: &dyn Translator,
        text: &str,
        lang: &str,
        default_lang: &str,
    ) -> Result<String> {
        if text.is_empty() || lang == default_lang {
            return Ok(text.to_owned());
        }
        if let Some(hit) = self.get(text, lang) {
            return Ok(hit);
        }
        let translated = translator.translate(text, lang).await?;
        self.put(text, lang, translated.clone());
        Ok(translated)
    }
}
