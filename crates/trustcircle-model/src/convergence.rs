//! Membership convergence.
//!
//! Recomputes one peer's trust edges from an add/remove request and derives
//! the circle generation they describe. The computation is a pure function of
//! a [`ModelState`] snapshot: it never mutates the model, so it can run
//! without holding the model lock.
//!
//! ## Rules
//!
//! 1. Start from the peer's last DynamicInfo (`included` plus the peer itself,
//!    and `excluded`).
//! 2. Ids present in both request sets, unregistered ids, and the peer itself
//!    in `removing` are ignored.
//! 3. Every added id is included (and un-excluded), then every registered id
//!    the added peers transitively include is pulled in as well, except ids
//!    being removed and ids this peer already excludes.
//! 4. Every removed id moves to `excluded`; then any included peer whose
//!    registered vouchers were all issued by dropped peers is dropped too,
//!    until a fixpoint. Peers without vouchers are never cascade-dropped.
//! 5. The clique is the peer's own, else the smallest clique among included
//!    peers, else a freshly minted one.
//! 6. The clique's newest generation is reused when it has exactly the new
//!    peer set; otherwise the generation after it is created, so generations
//!    only move forward. A clique with no generation left leaves the peer
//!    unchanged.

use std::collections::{BTreeSet, VecDeque};

use trustcircle_core::{Circle, CliqueId, DynamicInfo, PeerId, SigningCapability};

use crate::error::{ModelError, Result};
use crate::state::ModelState;

/// Outcome of a convergence run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Convergence {
    /// The DynamicInfo to register (the previous one when nothing changed).
    pub dynamic_info: DynamicInfo,
    /// The circle generation `dynamic_info` references.
    pub circle: Circle,
    /// Whether anything differs from the previous DynamicInfo.
    pub changed: bool,
}

/// Run the convergence algorithm for `peer` on a snapshot.
///
/// Fails only when `peer` is unknown or the signer cannot sign for it; any
/// odd-looking request shape degrades to "no change".
pub fn calculate<F>(
    state: &ModelState,
    peer: &PeerId,
    adding: &BTreeSet<PeerId>,
    removing: &BTreeSet<PeerId>,
    signer: &dyn SigningCapability,
    clique_factory: F,
) -> Result<Convergence>
where
    F: FnOnce() -> CliqueId,
{
    let record = state.require_peer(peer)?;
    if signer.public_key() != record.permanent.signing_key {
        return Err(ModelError::SignerMismatch { peer: peer.clone() });
    }

    let previous = record.dynamic.as_ref();
    let mut included: BTreeSet<PeerId> = previous.map(|d| d.included.clone()).unwrap_or_default();
    let mut excluded: BTreeSet<PeerId> = previous.map(|d| d.excluded.clone()).unwrap_or_default();
    included.insert(peer.clone());
    excluded.remove(peer);

    let adds: BTreeSet<&PeerId> = adding
        .iter()
        .filter(|id| !removing.contains(*id) && state.has_peer(id))
        .collect();
    let removes: BTreeSet<&PeerId> = removing
        .iter()
        .filter(|id| !adding.contains(*id) && *id != peer && state.has_peer(id))
        .collect();

    // Explicit adds, then trust transfer from whatever the added peers trust.
    let mut queue: VecDeque<&PeerId> = VecDeque::new();
    for id in &adds {
        excluded.remove(*id);
        included.insert((*id).clone());
        queue.push_back(*id);
    }
    let mut visited: BTreeSet<&PeerId> = adds.clone();
    while let Some(current) = queue.pop_front() {
        let Some(dynamic) = state.dynamic_info(current) else {
            continue;
        };
        for trusted in &dynamic.included {
            if !visited.insert(trusted) {
                continue;
            }
            if removes.contains(trusted) || excluded.contains(trusted) || !state.has_peer(trusted) {
                continue;
            }
            if included.insert(trusted.clone()) {
                tracing::trace!(peer = %peer, via = %current, added = %trusted, "trust transferred");
            }
            queue.push_back(trusted);
        }
    }

    // Explicit removals, then the voucher cascade.
    let mut dropped: BTreeSet<PeerId> = BTreeSet::new();
    for id in &removes {
        included.remove(*id);
        excluded.insert((*id).clone());
        dropped.insert((*id).clone());
    }
    if !dropped.is_empty() {
        loop {
            let orphaned: Vec<PeerId> = included
                .iter()
                .filter(|id| *id != peer)
                .filter(|id| {
                    let mut sponsors = state.vouchers_for(id).map(|v| &v.sponsor).peekable();
                    sponsors.peek().is_some() && sponsors.all(|s| dropped.contains(s))
                })
                .cloned()
                .collect();
            if orphaned.is_empty() {
                break;
            }
            for id in orphaned {
                tracing::debug!(peer = %peer, dropped = %id, "voucher chain removed");
                included.remove(&id);
                dropped.insert(id);
            }
        }
    }

    if let Some(prev) = previous {
        if prev.included == included && prev.excluded == excluded {
            return Ok(unchanged(state, prev));
        }
    }

    let circle = match previous {
        Some(prev) => match next_circle(state, prev.clique.clone(), &included) {
            Some(circle) => circle,
            None => {
                tracing::warn!(peer = %peer, clique = %prev.clique, "circle generations exhausted");
                return Ok(unchanged(state, prev));
            }
        },
        None => {
            let adopted = included
                .iter()
                .filter(|id| *id != peer)
                .filter_map(|id| state.dynamic_info(id).map(|d| &d.clique))
                .min()
                .and_then(|clique| next_circle(state, clique.clone(), &included));
            match adopted {
                Some(circle) => circle,
                None => {
                    let clique = clique_factory();
                    next_circle(state, clique.clone(), &included)
                        .ok_or(ModelError::GenerationsExhausted { clique })?
                }
            }
        }
    };

    let version = previous.map_or(1, |d| d.version + 1);
    let dynamic_info = DynamicInfo::builder(version, &circle)
        .included(included)
        .excluded(excluded)
        .sign(signer)?;

    Ok(Convergence {
        dynamic_info,
        circle,
        changed: true,
    })
}

fn unchanged(state: &ModelState, prev: &DynamicInfo) -> Convergence {
    let circle = state.circle(&prev.circle_id).cloned().unwrap_or_else(|| {
        Circle::new(prev.clique.clone(), prev.circle_generation, prev.included.iter().cloned())
    });
    Convergence {
        dynamic_info: prev.clone(),
        circle,
        changed: false,
    }
}

/// The circle for `peers` in `clique`: the newest generation when it already
/// has exactly these members, otherwise the generation after it.
///
/// `None` when the clique has reached the last generation.
fn next_circle(state: &ModelState, clique: CliqueId, peers: &BTreeSet<PeerId>) -> Option<Circle> {
    let Some(newest) = state.circles_in_clique(&clique).map(|c| c.generation).max() else {
        return Some(Circle::new(clique, 0, peers.iter().cloned()));
    };
    if let Some(current) = state
        .circles_in_clique(&clique)
        .find(|c| c.generation == newest && &c.peers == peers)
    {
        return Some(current.clone());
    }
    let generation = newest.checked_add(1)?;
    Some(Circle::new(clique, generation, peers.iter().cloned()))
}
