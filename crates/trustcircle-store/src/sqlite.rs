//! SQLite implementation of [`CoderStateStore`].
//!
//! The primary persistent backend. Uses rusqlite with bundled SQLite behind
//! a mutex; callers on an async runtime dispatch to `spawn_blocking`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, OptionalExtension};

use trustcircle_core::PeerId;

use crate::error::{Result, StoreError};
use crate::migration::{self, now_millis};
use crate::traits::CoderStateStore;

/// SQLite-based coder-state store. Thread-safe via an internal mutex.
#[derive(Clone)]
pub struct SqliteCoderStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCoderStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|e| {
            StoreError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
                Some(format!("mutex poisoned: {}", e)),
            ))
        })?;
        f(&conn)
    }
}

impl std::fmt::Debug for SqliteCoderStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCoderStore").finish_non_exhaustive()
    }
}

impl CoderStateStore for SqliteCoderStore {
    fn load(&self, peer: &PeerId) -> Result<Option<Vec<u8>>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT state FROM coder_states WHERE peer_id = ?1",
                params![peer.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::from)
        })
    }

    fn save(&self, peer: &PeerId, state: &[u8]) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO coder_states (peer_id, state, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(peer_id) DO UPDATE SET state = excluded.state,
                                                    updated_at = excluded.updated_at",
                params![peer.as_str(), state, now_millis()],
            )?;
            Ok(())
        })
    }

    fn remove(&self, peer: &PeerId) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM coder_states WHERE peer_id = ?1",
                params![peer.as_str()],
            )?;
            Ok(removed > 0)
        })
    }

    fn peers(&self) -> Result<Vec<PeerId>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT peer_id FROM coder_states ORDER BY peer_id")?;
            let peers = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .map(|id| id.map(PeerId::from))
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(peers)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCoderStore;
    use proptest::prelude::*;

    #[test]
    fn test_save_and_load() {
        let store = SqliteCoderStore::open_memory().unwrap();
        let peer = PeerId::from("peer-a");

        assert_eq!(store.load(&peer).unwrap(), None);
        store.save(&peer, b"first").unwrap();
        store.save(&peer, b"second").unwrap();
        assert_eq!(store.load(&peer).unwrap().as_deref(), Some(&b"second"[..]));
    }

    #[test]
    fn test_remove() {
        let store = SqliteCoderStore::open_memory().unwrap();
        let peer = PeerId::from("peer-a");

        store.save(&peer, b"state").unwrap();
        assert!(store.remove(&peer).unwrap());
        assert!(!store.remove(&peer).unwrap());
        assert!(store.peers().unwrap().is_empty());
    }

    #[test]
    fn test_empty_blob_round_trips() {
        let store = SqliteCoderStore::open_memory().unwrap();
        let peer = PeerId::from("peer-a");

        store.save(&peer, &[]).unwrap();
        assert_eq!(store.load(&peer).unwrap(), Some(Vec::new()));
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coders.db");
        let peer = PeerId::from("peer-a");

        {
            let store = SqliteCoderStore::open(&path).unwrap();
            store.save(&peer, b"negotiated").unwrap();
        }

        let store = SqliteCoderStore::open(&path).unwrap();
        assert_eq!(store.load(&peer).unwrap().as_deref(), Some(&b"negotiated"[..]));
        assert_eq!(store.peers().unwrap(), vec![peer]);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Save(u8, Vec<u8>),
        Remove(u8),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..4, proptest::collection::vec(any::<u8>(), 0..16)).prop_map(|(p, b)| Op::Save(p, b)),
            (0u8..4).prop_map(Op::Remove),
        ]
    }

    proptest! {
        #[test]
        fn prop_matches_memory_store(ops in proptest::collection::vec(op(), 0..32)) {
            let sqlite = SqliteCoderStore::open_memory().unwrap();
            let memory = MemoryCoderStore::new();
            let peer = |p: u8| PeerId::new(format!("peer-{}", p));

            for op in ops {
                match op {
                    Op::Save(p, blob) => {
                        sqlite.save(&peer(p), &blob).unwrap();
                        memory.save(&peer(p), &blob).unwrap();
                    }
                    Op::Remove(p) => {
                        prop_assert_eq!(
                            sqlite.remove(&peer(p)).unwrap(),
                            memory.remove(&peer(p)).unwrap()
                        );
                    }
                }
            }

            prop_assert_eq!(sqlite.peers().unwrap(), memory.peers().unwrap());
            for p in 0..4 {
                prop_assert_eq!(sqlite.load(&peer(p)).unwrap(), memory.load(&peer(p)).unwrap());
            }
        }
    }
}
