//! Circle generations.
//!
//! A circle is a clique identifier, a generation counter and an ordered,
//! deduplicated peer set. Circles are produced only by convergence and never
//! mutated; a newer generation supersedes an older one.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::canonical::circle_bytes;
use crate::crypto::Blake3Hash;
use crate::types::{CircleId, CliqueId, PeerId};

/// One immutable generation of a circle.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Circle {
    pub clique: CliqueId,
    pub generation: u64,
    pub peers: BTreeSet<PeerId>,
}

impl Circle {
    /// Create a circle generation. Duplicate peers collapse.
    pub fn new(clique: CliqueId, generation: u64, peers: impl IntoIterator<Item = PeerId>) -> Self {
        Self {
            clique,
            generation,
            peers: peers.into_iter().collect(),
        }
    }

    /// Content address of this generation.
    pub fn id(&self) -> CircleId {
        CircleId(Blake3Hash::hash(&self.canonical_bytes()).0)
    }

    /// Canonical encoding.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        circle_bytes(self)
    }

    /// Whether `peer` is a member of this generation.
    pub fn contains(&self, peer: &PeerId) -> bool {
        self.peers.contains(peer)
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Whether the circle has no members.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circle_id_deterministic() {
        let a = Circle::new(CliqueId::from("c"), 0, [PeerId::from("p1")]);
        let b = Circle::new(CliqueId::from("c"), 0, [PeerId::from("p1")]);
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn test_generation_changes_id() {
        let a = Circle::new(CliqueId::from("c"), 0, [PeerId::from("p1")]);
        let b = Circle::new(CliqueId::from("c"), 1, [PeerId::from("p1")]);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_membership() {
        let circle = Circle::new(
            CliqueId::from("c"),
            2,
            [PeerId::from("b"), PeerId::from("a"), PeerId::from("b")],
        );
        assert_eq!(circle.len(), 2);
        assert!(circle.contains(&PeerId::from("a")));
        assert!(!circle.contains(&PeerId::from("z")));
        // Ordered
        let order: Vec<_> = circle.peers.iter().map(|p| p.as_str()).collect();
        assert_eq!(order, vec!["a", "b"]);
    }

    proptest::proptest! {
        #[test]
        fn prop_circle_id_ignores_member_order(mut ids in proptest::collection::vec("[a-z0-9]{1,12}", 0..16)) {
            let forward = Circle::new(CliqueId::from("c"), 1, ids.iter().cloned().map(PeerId::from));
            ids.reverse();
            let backward = Circle::new(CliqueId::from("c"), 1, ids.into_iter().map(PeerId::from));
            proptest::prop_assert_eq!(forward.id(), backward.id());
        }
    }
}
