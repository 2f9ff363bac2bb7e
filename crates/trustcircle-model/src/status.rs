//! Derived, read-only peer classifications.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use trustcircle_core::PeerId;

use crate::state::ModelState;

/// Epoch distance at which a peer counts as ancient rather than outdated.
pub const ANCIENT_EPOCH_DISTANCE: u64 = 2;

/// Bitset describing how a peer relates to the rest of the model.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PeerStatus(u8);

impl PeerStatus {
    /// No flags set.
    pub const NONE: Self = Self(0);
    /// Some trust edge touching the peer is one-way.
    pub const PARTIALLY_RECIPROCATED: Self = Self(1 << 0);
    /// Some trust edge touching the peer is mutual.
    pub const FULLY_RECIPROCATED: Self = Self(1 << 1);
    /// Another peer has excluded this one.
    pub const EXCLUDED: Self = Self(1 << 2);
    /// The peer's epoch is one behind the newest.
    pub const OUTDATED_EPOCH: Self = Self(1 << 3);
    /// The peer's epoch is at least [`ANCIENT_EPOCH_DISTANCE`] behind.
    pub const ANCIENT_EPOCH: Self = Self(1 << 4);

    const NAMES: [(PeerStatus, &'static str); 5] = [
        (Self::PARTIALLY_RECIPROCATED, "PartiallyReciprocated"),
        (Self::FULLY_RECIPROCATED, "FullyReciprocated"),
        (Self::EXCLUDED, "Excluded"),
        (Self::OUTDATED_EPOCH, "OutdatedEpoch"),
        (Self::ANCIENT_EPOCH, "AncientEpoch"),
    ];

    /// Raw bits.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether every flag in `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Set the flags in `other`.
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Whether no flag is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for PeerStatus {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for PeerStatus {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for PeerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "PeerStatus({})", names.join(" | "))
    }
}

/// Conceptual membership state of a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Membership {
    /// Neither registered nor vouched for.
    Unknown,
    /// Known (registered or vouched for) but not in any current circle.
    Candidate,
    /// Appears in the current circle of some registered peer.
    Member,
    /// Excluded by at least one other peer.
    Excluded,
}

/// Compute the status bitset for `peer`, which must be registered.
pub(crate) fn status_of(state: &ModelState, peer: &PeerId) -> PeerStatus {
    let mut status = PeerStatus::NONE;
    let own = state.dynamic_info(peer);

    for (other_id, other) in state.peers() {
        if other_id == peer {
            continue;
        }
        let other_dynamic = other.dynamic.as_ref();
        let i_trust = own.is_some_and(|d| d.trusts(other_id));
        let they_trust = other_dynamic.is_some_and(|d| d.trusts(peer));

        match (i_trust, they_trust) {
            (true, true) => status |= PeerStatus::FULLY_RECIPROCATED,
            (true, false) | (false, true) => status |= PeerStatus::PARTIALLY_RECIPROCATED,
            (false, false) => {}
        }
        if other_dynamic.is_some_and(|d| d.excludes(peer)) {
            status |= PeerStatus::EXCLUDED;
        }
    }

    if let Some(record) = state.peer(peer) {
        let distance = state.max_epoch().saturating_sub(record.permanent.epoch);
        if distance >= ANCIENT_EPOCH_DISTANCE {
            status |= PeerStatus::ANCIENT_EPOCH;
        } else if distance == 1 {
            status |= PeerStatus::OUTDATED_EPOCH;
        }
    }

    status
}

/// Classify `peer` into the membership state machine.
pub(crate) fn membership_of(state: &ModelState, peer: &PeerId) -> Membership {
    let excluded = state
        .peers()
        .any(|(id, r)| id != peer && r.dynamic.as_ref().is_some_and(|d| d.excludes(peer)));
    if excluded {
        return Membership::Excluded;
    }

    let member = state
        .peers()
        .filter_map(|(id, _)| state.current_circle_of(id))
        .any(|circle| circle.contains(peer));
    if member {
        return Membership::Member;
    }

    if state.has_peer(peer) || state.vouchers_for(peer).next().is_some() {
        Membership::Candidate
    } else {
        Membership::Unknown
    }
}

/// Whether both peers' DynamicInfos include each other.
pub(crate) fn mutually_trusted(state: &ModelState, a: &PeerId, b: &PeerId) -> bool {
    let trusts = |from: &PeerId, to: &PeerId| state.dynamic_info(from).is_some_and(|d| d.trusts(to));
    trusts(a, b) && trusts(b, a)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitset_ops() {
        let mut status = PeerStatus::NONE;
        assert!(status.is_empty());

        status |= PeerStatus::EXCLUDED;
        status.insert(PeerStatus::ANCIENT_EPOCH);
        assert!(status.contains(PeerStatus::EXCLUDED));
        assert!(status.contains(PeerStatus::EXCLUDED | PeerStatus::ANCIENT_EPOCH));
        assert!(!status.contains(PeerStatus::FULLY_RECIPROCATED));
        assert_eq!(status.bits(), 0b10100);
    }

    #[test]
    fn test_debug_lists_flags() {
        let status = PeerStatus::FULLY_RECIPROCATED | PeerStatus::OUTDATED_EPOCH;
        assert_eq!(
            format!("{:?}", status),
            "PeerStatus(FullyReciprocated | OutdatedEpoch)"
        );
    }
}
