//! Bounded tile cache
//!
//! Strict LRU over decoded tiles. Eviction is silent; an evicted tile is
//! fetched again the next time it is requested.

use crate::formats::decode::VariantRecord;
use log::debug;
use lru::LruCache;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Decoded records of one tile, shared with callers without copying
pub type Tile = Arc<Vec<Arc<VariantRecord>>>;

/// Cache key, rendered `"{dataset}.{zoom}.{index}"`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    pub dataset: String,
    pub zoom: u32,
    pub index: u64,
}

impl TileKey {
    pub fn new(dataset: impl Into<String>, zoom: u32, index: u64) -> Self {
        Self {
            dataset: dataset.into(),
            zoom,
            index,
        }
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.dataset, self.zoom, self.index)
    }
}

/// LRU cache of decoded tiles
pub struct TileCache {
    tiles: LruCache<TileKey, Tile>,
}

impl TileCache {
    /// A zero capacity is raised to one
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            tiles: LruCache::new(capacity),
        }
    }

    /// Look up a tile, marking it most recently used
    pub fn get(&mut self, key: &TileKey) -> Option<Tile> {
        let tile = self.tiles.get(key).cloned();
        debug!(
            "tile cache {} for {}",
            if tile.is_some() { "hit" } else { "miss" },
            key
        );
        tile
    }

    pub fn contains(&self, key: &TileKey) -> bool {
        self.tiles.contains(key)
    }

    /// Store a tile, evicting the least recently used one when full
    pub fn put(&mut self, key: TileKey, tile: Tile) {
        if let Some((evicted, _)) = self.tiles.push(key.clone(), tile) {
            if evicted != key {
                debug!("evicted tile {}", evicted);
            }
        }
    }

    /// Drop every tile of `dataset`
    pub fn invalidate_dataset(&mut self, dataset: &str) {
        let stale: Vec<TileKey> = self
            .tiles
            .iter()
            .filter(|(key, _)| key.dataset == dataset)
            .map(|(key, _)| key.clone())
            .collect();
        for key in stale {
            self.tiles.pop(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.tiles.cap().get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tile(n: usize) -> Tile {
        Arc::new(Vec::with_capacity(n))
    }

    #[test]
    fn test_key_rendering() {
        assert_eq!(TileKey::new("cohort", 3, 17).to_string(), "cohort.3.17");
    }

    #[test]
    fn test_lru_eviction_order() {
        let mut cache = TileCache::new(2);
        let (a, b, c) = (TileKey::new("d", 0, 0), TileKey::new("d", 1, 0), TileKey::new("d", 1, 1));

        cache.put(a.clone(), tile(0));
        cache.put(b.clone(), tile(0));
        // touch a so b becomes least recently used
        assert!(cache.get(&a).is_some());
        cache.put(c.clone(), tile(0));

        assert!(cache.contains(&a));
        assert!(!cache.contains(&b));
        assert!(cache.contains(&c));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_replacing_same_key_keeps_size() {
        let mut cache = TileCache::new(2);
        let a = TileKey::new("d", 0, 0);
        let newer = tile(0);
        cache.put(a.clone(), tile(0));
        cache.put(a.clone(), newer.clone());
        assert_eq!(cache.len(), 1);
        assert!(Arc::ptr_eq(&cache.get(&a).unwrap(), &newer));
    }

    #[test]
    fn test_invalidate_dataset() {
        let mut cache = TileCache::new(4);
        cache.put(TileKey::new("x", 0, 0), tile(0));
        cache.put(TileKey::new("y", 0, 0), tile(0));
        cache.put(TileKey::new("x", 1, 1), tile(0));
        cache.invalidate_dataset("x");
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&TileKey::new("y", 0, 0)));
    }

    #[test]
    fn test_zero_capacity_is_one() {
        let cache = TileCache::new(0);
        assert_eq!(cache.capacity(), 1);
        assert!(cache.is_empty());
    }
}
