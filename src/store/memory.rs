//! The reference in-memory [`Store`] implementation.

use std::collections::HashMap;

use super::Store;

/// A flat `ino -> bytes` map held entirely in process memory. Transactions are implemented
/// by recording, for every key touched since `begin`, its value (or absence) at that point;
/// `abort` replays that log backwards.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: HashMap<u64, Vec<u8>>,
    undo_log: Option<HashMap<u64, Option<Vec<u8>>>>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        MemoryStore {
            data: HashMap::new(),
            undo_log: None,
        }
    }

    fn record_pre_image(&mut self, ino: u64) {
        if let Some(log) = self.undo_log.as_mut() {
            log.entry(ino).or_insert_with(|| self.data.get(&ino).cloned());
        }
    }
}

impl Store for MemoryStore {
    fn get(&self, ino: u64) -> Option<Vec<u8>> {
        self.data.get(&ino).cloned()
    }

    fn put(&mut self, ino: u64, bytes: Vec<u8>, overwrite: bool) -> bool {
        if !overwrite && self.data.contains_key(&ino) {
            return false;
        }
        self.record_pre_image(ino);
        self.data.insert(ino, bytes);
        true
    }

    fn remove(&mut self, ino: u64) {
        self.record_pre_image(ino);
        self.data.remove(&ino);
    }

    fn begin(&mut self) {
        self.undo_log = Some(HashMap::new());
    }

    fn commit(&mut self) {
        self.undo_log = None;
    }

    fn abort(&mut self) {
        if let Some(log) = self.undo_log.take() {
            for (ino, pre_image) in log {
                match pre_image {
                    Some(bytes) => {
                        self.data.insert(ino, bytes);
                    }
                    None => {
                        self.data.remove(&ino);
                    }
                }
            }
        }
    }

    fn clear(&mut self) {
        self.data.clear();
        self.undo_log = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_without_overwrite_rejects_collision() {
        let mut store = MemoryStore::new();
        assert!(store.put(1, b"a".to_vec(), false));
        assert!(!store.put(1, b"b".to_vec(), false));
        assert_eq!(store.get(1), Some(b"a".to_vec()));
    }

    #[test]
    fn abort_restores_every_touched_key() {
        let mut store = MemoryStore::new();
        store.put(1, b"a".to_vec(), true);
        store.begin();
        store.put(1, b"b".to_vec(), true);
        store.put(2, b"new".to_vec(), true);
        store.remove(1);
        store.abort();
        assert_eq!(store.get(1), Some(b"a".to_vec()));
        assert_eq!(store.get(2), None);
    }

    #[test]
    fn commit_makes_mutations_permanent() {
        let mut store = MemoryStore::new();
        store.begin();
        store.put(5, b"x".to_vec(), true);
        store.commit();
        // abort after commit has nothing recorded, so it is a no-op.
        store.abort();
        assert_eq!(store.get(5), Some(b"x".to_vec()));
    }

    #[test]
    fn clear_drops_everything() {
        let mut store = MemoryStore::new();
        store.put(1, b"a".to_vec(), true);
        store.clear();
        assert_eq!(store.get(1), None);
    }
}
