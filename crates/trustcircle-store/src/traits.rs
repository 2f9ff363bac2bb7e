//! The persistence capability injected into every transport coder.

use std::sync::Arc;

use trustcircle_core::PeerId;

use crate::error::Result;

/// Opaque per-peer blob storage for coder state.
///
/// Calls are blocking. Async callers are expected to dispatch them to a
/// worker thread (`tokio::task::spawn_blocking`) rather than call inline.
///
/// Blobs are keyed by the remote peer id; one store serves one local account.
pub trait CoderStateStore: Send + Sync {
    /// Load the blob saved for `peer`, if any.
    fn load(&self, peer: &PeerId) -> Result<Option<Vec<u8>>>;

    /// Save (insert or replace) the blob for `peer`.
    fn save(&self, peer: &PeerId, state: &[u8]) -> Result<()>;

    /// Remove the blob for `peer`. Returns whether one existed.
    fn remove(&self, peer: &PeerId) -> Result<bool>;

    /// Every peer with a saved blob, ordered.
    fn peers(&self) -> Result<Vec<PeerId>>;
}

impl<S: CoderStateStore + ?Sized> CoderStateStore for Arc<S> {
    fn load(&self, peer: &PeerId) -> Result<Option<Vec<u8>>> {
        (**self).load(peer)
    }

    fn save(&self, peer: &PeerId, state: &[u8]) -> Result<()> {
        (**self).save(peer, state)
    }

    fn remove(&self, peer: &PeerId) -> Result<bool> {
        (**self).remove(peer)
    }

    fn peers(&self) -> Result<Vec<PeerId>> {
        (**self).peers()
    }
}
