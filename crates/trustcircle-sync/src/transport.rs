//! Key/value transport boundary.
//!
//! The real store (its networking, conflict resolution and wire format) is
//! outside this crate. Accounts only need to publish values under keys,
//! read them back, and be told when someone else changed one.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// One changed key as observed by a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvsUpdate {
    pub key: String,
    pub value: Bytes,
}

/// Eventually-consistent key/value store with change notification.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait KvsTransport: Send + Sync {
    /// Write `value` under `key`, notifying other subscribers.
    async fn publish(&self, key: &str, value: Bytes) -> Result<()>;

    /// Wait for the next change made by someone else.
    async fn next_update(&self) -> Result<KvsUpdate>;

    /// Wait for the next change, giving up after `timeout`.
    ///
    /// Returns None if the timeout expires first.
    async fn next_update_timeout(&self, timeout: Duration) -> Result<Option<KvsUpdate>>;

    /// Current value of `key`.
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;
}

/// An in-process store for tests.
///
/// Every handle sees every other handle's writes, delivered through a
/// per-handle channel in publish order.
pub mod memory {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    use tokio::sync::{mpsc, Mutex, RwLock};

    use crate::error::SyncError;

    /// Shared contents and subscribers.
    pub struct MemoryKvs {
        values: RwLock<BTreeMap<String, Bytes>>,
        subscribers: RwLock<BTreeMap<u64, mpsc::Sender<KvsUpdate>>>,
        next_handle: AtomicU64,
    }

    impl MemoryKvs {
        /// Create a new empty store.
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Attach a new subscriber.
        pub async fn connect(self: &Arc<Self>) -> MemoryKvsHandle {
            let (tx, rx) = mpsc::channel(1000);
            let id = self.next_handle.fetch_add(1, Ordering::Relaxed);

            self.subscribers.write().await.insert(id, tx);

            MemoryKvsHandle {
                id,
                kvs: Arc::clone(self),
                receiver: Mutex::new(rx),
            }
        }

        /// All keys currently stored, ordered.
        pub async fn keys(&self) -> Vec<String> {
            self.values.read().await.keys().cloned().collect()
        }
    }

    impl Default for MemoryKvs {
        fn default() -> Self {
            Self {
                values: RwLock::new(BTreeMap::new()),
                subscribers: RwLock::new(BTreeMap::new()),
                next_handle: AtomicU64::new(0),
            }
        }
    }

    /// One subscriber's view of a [`MemoryKvs`].
    pub struct MemoryKvsHandle {
        id: u64,
        kvs: Arc<MemoryKvs>,
        receiver: Mutex<mpsc::Receiver<KvsUpdate>>,
    }

    impl Drop for MemoryKvsHandle {
        fn drop(&mut self) {
            if let Ok(mut subscribers) = self.kvs.subscribers.try_write() {
                subscribers.remove(&self.id);
            }
        }
    }

    #[async_trait]
    impl KvsTransport for MemoryKvsHandle {
        async fn publish(&self, key: &str, value: Bytes) -> Result<()> {
            self.kvs
                .values
                .write()
                .await
                .insert(key.to_owned(), value.clone());

            let subscribers = self.kvs.subscribers.read().await;
            for (id, sender) in subscribers.iter() {
                if *id != self.id {
                    let update = KvsUpdate {
                        key: key.to_owned(),
                        value: value.clone(),
                    };
                    // Dropped handles are simply no longer notified.
                    let _ = sender.send(update).await;
                }
            }
            tracing::trace!(key, "published");
            Ok(())
        }

        async fn next_update(&self) -> Result<KvsUpdate> {
            let mut rx = self.receiver.lock().await;
            rx.recv().await.ok_or(SyncError::ChannelClosed)
        }

        async fn next_update_timeout(&self, timeout: Duration) -> Result<Option<KvsUpdate>> {
            let mut rx = self.receiver.lock().await;
            match tokio::time::timeout(timeout, rx.recv()).await {
                Ok(Some(update)) => Ok(Some(update)),
                Ok(None) => Err(SyncError::ChannelClosed),
                Err(_) => Ok(None),
            }
        }

        async fn get(&self, key: &str) -> Result<Option<Bytes>> {
            Ok(self.kvs.values.read().await.get(key).cloned())
        }
    }
}
