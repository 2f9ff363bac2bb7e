//! In-memory implementation of [`CoderStateStore`].
//!
//! Same semantics as the SQLite store without persistence. Used by tests
//! and by accounts that do not need to survive a restart.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use trustcircle_core::PeerId;

use crate::error::Result;
use crate::traits::CoderStateStore;

/// In-memory coder-state store. Thread-safe via RwLock.
#[derive(Debug, Default)]
pub struct MemoryCoderStore {
    blobs: RwLock<BTreeMap<PeerId, Vec<u8>>>,
}

impl MemoryCoderStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of saved blobs.
    pub fn len(&self) -> usize {
        self.blobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing is saved.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CoderStateStore for MemoryCoderStore {
    fn load(&self, peer: &PeerId) -> Result<Option<Vec<u8>>> {
        let blobs = self.blobs.read().unwrap_or_else(PoisonError::into_inner);
        Ok(blobs.get(peer).cloned())
    }

    fn save(&self, peer: &PeerId, state: &[u8]) -> Result<()> {
        let mut blobs = self.blobs.write().unwrap_or_else(PoisonError::into_inner);
        blobs.insert(peer.clone(), state.to_vec());
        Ok(())
    }

    fn remove(&self, peer: &PeerId) -> Result<bool> {
        let mut blobs = self.blobs.write().unwrap_or_else(PoisonError::into_inner);
        Ok(blobs.remove(peer).is_some())
    }

    fn peers(&self) -> Result<Vec<PeerId>> {
        let blobs = self.blobs.read().unwrap_or_else(PoisonError::into_inner);
        Ok(blobs.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_load_replace() {
        let store = MemoryCoderStore::new();
        let peer = PeerId::from("peer-a");

        assert_eq!(store.load(&peer).unwrap(), None);
        store.save(&peer, b"one").unwrap();
        store.save(&peer, b"two").unwrap();
        assert_eq!(store.load(&peer).unwrap().as_deref(), Some(&b"two"[..]));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_remove_reports_presence() {
        let store = MemoryCoderStore::new();
        let peer = PeerId::from("peer-a");

        assert!(!store.remove(&peer).unwrap());
        store.save(&peer, b"state").unwrap();
        assert!(store.remove(&peer).unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn test_peers_ordered() {
        let store = MemoryCoderStore::new();
        for name in ["c", "a", "b"] {
            store.save(&PeerId::from(name), b"x").unwrap();
        }
        let peers: Vec<String> = store
            .peers()
            .unwrap()
            .into_iter()
            .map(PeerId::into_string)
            .collect();
        assert_eq!(peers, ["a", "b", "c"]);
    }
}
