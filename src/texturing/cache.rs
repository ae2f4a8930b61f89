use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crossbeam::queue::SegQueue;
use image::RgbImage;

use crate::error::Result;

/// Bounded cache of decoded observation images, shared across the worker
/// pool that backprojects texture for every tile (spec §5: "a bounded,
/// reference-counted cache of decoded observation images"). Eviction
/// candidates are tracked on a lock-free queue; an entry still checked out
/// by a worker (its `Arc` strong count above 1) is skipped rather than
/// evicted, so an in-flight read is never invalidated out from under it.
pub struct ObservationCache {
    capacity: usize,
    entries: Mutex<HashMap<u32, Arc<RgbImage>>>,
    recency: SegQueue<u32>,
}

impl ObservationCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(HashMap::new()),
            recency: SegQueue::new(),
        }
    }

    /// Returns the decoded image for `index`, loading it from `path` on a
    /// miss. Concurrent callers racing on the same miss each decode their own
    /// copy; the last one to insert wins, which is harmless since both
    /// decodes produce identical pixels.
    pub fn get_or_load(&self, index: u32, path: &Path) -> Result<Arc<RgbImage>> {
        if let Some(img) = self.entries.lock().unwrap().get(&index) {
            self.recency.push(index);
            return Ok(img.clone());
        }

        let decoded = Arc::new(image::open(path)?.to_rgb8());
        self.insert(index, decoded.clone());
        Ok(decoded)
    }

    fn insert(&self, index: u32, image: Arc<RgbImage>) {
        let mut entries = self.entries.lock().unwrap();
        while entries.len() >= self.capacity {
            if !self.evict_one(&mut entries) {
                break; // every cached entry is currently checked out
            }
        }
        entries.insert(index, image);
        self.recency.push(index);
    }

    fn evict_one(&self, entries: &mut HashMap<u32, Arc<RgbImage>>) -> bool {
        let mut requeued = Vec::new();
        let mut evicted = false;

        while let Some(candidate) = self.recency.pop() {
            let in_use = entries.get(&candidate).map(|img| Arc::strong_count(img) > 1).unwrap_or(false);
            if in_use {
                requeued.push(candidate);
                continue;
            }
            entries.remove(&candidate);
            evicted = true;
            break;
        }

        for c in requeued {
            self.recency.push(c);
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_png(path: &Path) {
        let img = RgbImage::new(4, 4);
        img.save(path).unwrap();
    }

    #[test]
    fn repeated_gets_reuse_the_cached_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.png");
        write_png(&path);

        let cache = ObservationCache::new(4);
        let first = cache.get_or_load(1, &path).unwrap();
        let second = cache.get_or_load(1, &path).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn capacity_bounds_the_resident_set() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ObservationCache::new(2);

        for i in 0..5u32 {
            let path = dir.path().join(format!("{i}.png"));
            write_png(&path);
            let img = cache.get_or_load(i, &path).unwrap();
            drop(img); // not checked out, so it's eligible for eviction
        }

        assert!(cache.len() <= 2);
    }
}
