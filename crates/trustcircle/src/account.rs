//! The Account: one local peer taking part in a trust circle.
//!
//! An account owns the local peer's signer, shares a [`Model`] with the rest
//! of the process, keeps one coder per remote peer, and talks to everyone
//! else through a [`KvsTransport`]. Every local change to the model is
//! published as a [`CircleSnapshot`] under the circle key; every coder frame
//! goes out under the message key from the local peer to the remote.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};

use trustcircle_coder::{Coder, CoderConfig};
use trustcircle_core::{
    CliqueId, PeerId, PermanentInfo, SigningCapability, StableInfo, Voucher,
};
use trustcircle_model::{Convergence, Model, PeerStatus, UpdateResult};
use trustcircle_policy::PolicyDocument;
use trustcircle_store::CoderStateStore;
use trustcircle_sync::keys::{circle_key, message_key, retirement_key};
use trustcircle_sync::{classify, KeyKind, KvsTransport, KvsUpdate, SyncError};

use crate::channel::{Outbound, PeerChannel};
use crate::error::{AccountError, Result};
use crate::snapshot::CircleSnapshot;

/// Configuration for an account.
#[derive(Debug, Clone)]
pub struct AccountConfig {
    /// Circle name used in every key this account reads or writes.
    pub circle_name: String,
    /// Refuse to send to, and drop messages from, peers that are not
    /// mutually trusted.
    pub require_mutual_trust: bool,
    /// Payloads held per peer while its coder negotiates. Oldest dropped first.
    pub max_pending_per_peer: usize,
    /// How long [`Account::poll`] waits for an update.
    pub update_timeout: Duration,
    /// Coder limits.
    pub coder: CoderConfig,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            circle_name: "Account".to_owned(),
            require_mutual_trust: true,
            max_pending_per_peer: 64,
            update_timeout: Duration::from_secs(5),
            coder: CoderConfig::default(),
        }
    }
}

/// Something the application should know about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountEvent {
    /// Decrypted application payload.
    Message { from: PeerId, payload: Vec<u8> },
    /// A coder finished negotiating with `peer`.
    PeerConnected { peer: PeerId },
    /// `peer` announced it left the circle; its coder state is gone.
    PeerRetired { peer: PeerId },
    /// A circle snapshot changed the local model.
    CircleUpdated { applied: usize },
    /// The key parameters value changed.
    KeyParametersChanged { value: Bytes },
    /// Another device asked for an initial sync.
    InitialSyncRequested,
    /// The account itself changed.
    AccountChanged,
}

/// What happened to a payload handed to [`Account::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Encrypted and published.
    Sent,
    /// Held until negotiation with the peer completes.
    Queued,
}

type Channels = HashMap<PeerId, Arc<Mutex<PeerChannel>>>;

/// One local peer's view of, and voice in, a trust circle.
pub struct Account<T: KvsTransport> {
    local: PermanentInfo,
    signer: Arc<dyn SigningCapability>,
    model: Arc<Model>,
    store: Arc<dyn CoderStateStore>,
    transport: T,
    config: AccountConfig,
    channels: Mutex<Channels>,
}

impl<T: KvsTransport> Account<T> {
    /// Create an account. Nothing is registered or published until the
    /// first write.
    pub fn new(
        local: PermanentInfo,
        signer: Arc<dyn SigningCapability>,
        model: Arc<Model>,
        store: Arc<dyn CoderStateStore>,
        transport: T,
        config: AccountConfig,
    ) -> Self {
        Self {
            local,
            signer,
            model,
            store,
            transport,
            config,
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// The local peer id.
    pub fn local_id(&self) -> &PeerId {
        &self.local.peer_id
    }

    /// The shared model.
    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    /// The transport handle.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The account configuration.
    pub fn config(&self) -> &AccountConfig {
        &self.config
    }

    /// Status of `peer` as seen by the local model.
    pub fn status_of(&self, peer: &PeerId) -> Result<PeerStatus> {
        Ok(self.model.status_of(peer)?)
    }

    /// Peers the local peer trusts that may access `view`.
    pub fn peers_trusted_by_me(&self, view: &str) -> Result<BTreeSet<PeerId>> {
        Ok(self.model.peers_trusted_by(&self.local.peer_id, view)?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Membership
    // ─────────────────────────────────────────────────────────────────────────

    /// Register the local peer and give it a circle of its own.
    ///
    /// On a fresh model this mints a new clique at generation 0.
    pub async fn bootstrap(&self) -> Result<Convergence> {
        self.advance(BTreeSet::new(), BTreeSet::new()).await
    }

    /// Converge the local peer's trust edges and publish the result.
    ///
    /// Peers that end up excluded lose their coder state.
    pub async fn advance(
        &self,
        adding: BTreeSet<PeerId>,
        removing: BTreeSet<PeerId>,
    ) -> Result<Convergence> {
        self.model.register_peer(self.local.clone())?;

        let model = Arc::clone(&self.model);
        let signer = Arc::clone(&self.signer);
        let local = self.local.peer_id.clone();
        let removing_copy = removing.clone();
        let result = tokio::task::spawn_blocking(move || {
            model.advance_peer(&local, &adding, &removing_copy, signer.as_ref(), || {
                CliqueId::mint(&local, now_millis())
            })
        })
        .await??;

        if result.changed {
            self.publish_circle().await?;
            for peer in removing.iter().filter(|id| result.dynamic_info.excludes(id)) {
                self.remove_peer(peer).await?;
            }
        }
        Ok(result)
    }

    /// Register another peer's identity, learned out of band.
    pub async fn introduce(&self, permanent: PermanentInfo) -> Result<UpdateResult> {
        let result = self.model.register_peer(permanent)?;
        if result == UpdateResult::Applied {
            self.publish_circle().await?;
        }
        Ok(result)
    }

    /// Replace the local StableInfo.
    pub async fn update_stable_info(&self, stable: StableInfo) -> Result<UpdateResult> {
        self.model.register_peer(self.local.clone())?;

        let model = Arc::clone(&self.model);
        let local = self.local.peer_id.clone();
        let result =
            tokio::task::spawn_blocking(move || model.update_stable_info(&local, stable)).await??;
        if result == UpdateResult::Applied {
            self.publish_circle().await?;
        }
        Ok(result)
    }

    /// Register a policy document.
    pub async fn register_policy(&self, document: PolicyDocument) -> Result<UpdateResult> {
        let result = self.model.register_policy(document)?;
        if result == UpdateResult::Applied {
            self.publish_circle().await?;
        }
        Ok(result)
    }

    /// Vouch for `candidate` if the local policy allows it.
    ///
    /// The candidate is registered and the voucher published; `None` means
    /// the policy forbids the introduction.
    pub async fn vouch_for(&self, candidate: PermanentInfo) -> Result<Option<Voucher>> {
        self.model.register_peer(candidate.clone())?;

        let model = Arc::clone(&self.model);
        let signer = Arc::clone(&self.signer);
        let local = self.local.peer_id.clone();
        let issued_at = now_millis() as i64;
        let voucher = tokio::task::spawn_blocking(move || {
            model.create_voucher(&candidate, &local, signer.as_ref(), issued_at)
        })
        .await??;

        if let Some(voucher) = &voucher {
            self.model.register_voucher(voucher.clone())?;
            info!(candidate = %voucher.candidate, "issued voucher");
        }
        self.publish_circle().await?;
        Ok(voucher)
    }

    /// Announce that the local peer is leaving the circle.
    pub async fn retire(&self) -> Result<()> {
        let key = retirement_key(&self.config.circle_name, &self.local.peer_id);
        self.transport.publish(&key, Bytes::new()).await?;
        info!(peer = %self.local.peer_id, circle = %self.config.circle_name, "retired");
        Ok(())
    }

    /// Forget the coder for `peer`, including its persisted state.
    ///
    /// Returns whether any state was stored.
    pub async fn remove_peer(&self, peer: &PeerId) -> Result<bool> {
        self.channels.lock().await.remove(peer);

        let store = Arc::clone(&self.store);
        let peer = peer.clone();
        let removed = tokio::task::spawn_blocking(move || store.remove(&peer)).await??;
        Ok(removed)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Messaging
    // ─────────────────────────────────────────────────────────────────────────

    /// Encrypt `payload` for `peer` and publish it.
    ///
    /// While the coder is negotiating the payload is queued and the
    /// negotiation frame is published instead.
    pub async fn send(&self, peer: &PeerId, payload: impl Into<Vec<u8>>) -> Result<Delivery> {
        if !self.model.has_peer(peer) {
            return Err(AccountError::UnknownPeer(peer.clone()));
        }
        if self.config.require_mutual_trust
            && !self.model.is_mutually_trusted(&self.local.peer_id, peer)
        {
            return Err(AccountError::NotMutuallyTrusted(peer.clone()));
        }

        let payload = payload.into();
        let out = self
            .with_channel(peer, move |channel| channel.send(payload))
            .await?;
        let delivery = if out.queued {
            Delivery::Queued
        } else {
            Delivery::Sent
        };
        self.publish_frames(peer, &out).await?;
        Ok(delivery)
    }

    /// Whether the coder for `peer` has finished negotiating.
    pub async fn is_connected(&self, peer: &PeerId) -> bool {
        let channel = self.channels.lock().await.get(peer).cloned();
        match channel {
            Some(channel) => channel.lock().await.coder.is_ready(),
            None => false,
        }
    }

    /// Payloads waiting for negotiation with `peer`.
    pub async fn pending_for(&self, peer: &PeerId) -> usize {
        let channel = self.channels.lock().await.get(peer).cloned();
        match channel {
            Some(channel) => channel.lock().await.pending(),
            None => 0,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Inbound
    // ─────────────────────────────────────────────────────────────────────────

    /// Process one changed key.
    ///
    /// Malformed values and coder failures are logged and skipped; only
    /// transport and worker failures are returned.
    pub async fn handle_update(&self, update: KvsUpdate) -> Result<Vec<AccountEvent>> {
        let KvsUpdate { key, value } = update;
        let kind = classify(&key);

        match kind {
            KeyKind::Circle { circle } if circle == self.config.circle_name => {
                self.on_circle(value).await
            }
            KeyKind::Retirement { circle, peer } if circle == self.config.circle_name => {
                self.on_retirement(peer).await
            }
            KeyKind::Message { circle, from, to }
                if circle == self.config.circle_name && to == self.local.peer_id =>
            {
                self.on_message(from, value).await
            }
            KeyKind::KeyParameters => Ok(vec![AccountEvent::KeyParametersChanged { value }]),
            KeyKind::InitialSync => Ok(vec![AccountEvent::InitialSyncRequested]),
            KeyKind::AccountChanged => Ok(vec![AccountEvent::AccountChanged]),
            KeyKind::Unknown => {
                debug!(key = %key, "ignoring unknown key");
                Ok(Vec::new())
            }
            _ => {
                trace!(key = %key, "key not for this account");
                Ok(Vec::new())
            }
        }
    }

    /// Wait up to `update_timeout` for one update and process it.
    pub async fn poll(&self) -> Result<Vec<AccountEvent>> {
        match self
            .transport
            .next_update_timeout(self.config.update_timeout)
            .await?
        {
            Some(update) => self.handle_update(update).await,
            None => Err(SyncError::Timeout(format!(
                "no update within {:?}",
                self.config.update_timeout
            ))
            .into()),
        }
    }

    /// Process every update already delivered, without waiting for more.
    pub async fn pump(&self) -> Result<Vec<AccountEvent>> {
        let mut events = Vec::new();
        while let Some(update) = self.transport.next_update_timeout(Duration::ZERO).await? {
            events.extend(self.handle_update(update).await?);
        }
        Ok(events)
    }

    async fn on_circle(&self, value: Bytes) -> Result<Vec<AccountEvent>> {
        let snapshot = match CircleSnapshot::from_bytes(&value) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "ignoring undecodable circle snapshot");
                return Ok(Vec::new());
            }
        };

        let model = Arc::clone(&self.model);
        let report = tokio::task::spawn_blocking(move || snapshot.merge_into(&model)).await?;
        debug!(applied = report.applied, rejected = report.rejected, "merged circle snapshot");

        if report.applied == 0 {
            return Ok(Vec::new());
        }
        Ok(vec![AccountEvent::CircleUpdated {
            applied: report.applied,
        }])
    }

    async fn on_retirement(&self, peer: PeerId) -> Result<Vec<AccountEvent>> {
        if peer == self.local.peer_id {
            return Ok(Vec::new());
        }
        self.remove_peer(&peer).await?;
        info!(peer = %peer, "peer retired");
        Ok(vec![AccountEvent::PeerRetired { peer }])
    }

    async fn on_message(&self, from: PeerId, frame: Bytes) -> Result<Vec<AccountEvent>> {
        if from == self.local.peer_id {
            return Ok(Vec::new());
        }
        if !self.model.has_peer(&from) {
            debug!(peer = %from, "frame from unregistered peer");
            return Ok(Vec::new());
        }

        let out = match self
            .with_channel(&from, move |channel| channel.receive(&frame))
            .await
        {
            Ok(out) => out,
            Err(AccountError::Worker(e)) => return Err(AccountError::Worker(e)),
            Err(e) => {
                warn!(peer = %from, error = %e, "coder error, frame skipped");
                return Ok(Vec::new());
            }
        };
        self.publish_frames(&from, &out).await?;

        let mut events = Vec::new();
        if out.connected {
            info!(peer = %from, "negotiation complete");
            events.push(AccountEvent::PeerConnected { peer: from.clone() });
        }
        if let Some(payload) = out.received {
            if self.config.require_mutual_trust
                && !self.model.is_mutually_trusted(&self.local.peer_id, &from)
            {
                warn!(peer = %from, "dropping message from peer that is not mutually trusted");
            } else {
                events.push(AccountEvent::Message { from, payload });
            }
        }
        Ok(events)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    /// Publish everything the model knows under the circle key.
    async fn publish_circle(&self) -> Result<()> {
        let bytes = CircleSnapshot::capture(&self.model.snapshot()).to_bytes()?;
        let key = circle_key(&self.config.circle_name);
        self.transport.publish(&key, Bytes::from(bytes)).await?;
        Ok(())
    }

    /// Publish frames in order. Later frames overwrite earlier ones in a
    /// last-writer-wins store; the coder recovers by retransmitting.
    async fn publish_frames(&self, peer: &PeerId, out: &Outbound) -> Result<()> {
        let key = message_key(&self.config.circle_name, &self.local.peer_id, peer);
        for frame in &out.frames {
            self.transport
                .publish(&key, Bytes::copy_from_slice(frame))
                .await?;
        }
        Ok(())
    }

    /// Run `f` on the channel for `peer` on a blocking worker.
    ///
    /// The channel's mutex is held for the duration, so calls for one peer
    /// are serialized while different peers proceed in parallel.
    async fn with_channel<R, F>(&self, peer: &PeerId, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut PeerChannel) -> Result<R> + Send + 'static,
    {
        let channel = self.channel(peer).await?;
        let mut guard = channel.lock_owned().await;
        tokio::task::spawn_blocking(move || f(&mut *guard)).await?
    }

    /// The channel for `peer`, opening its coder on first use.
    ///
    /// The map lock is not held while the coder loads, so other peers' lookups
    /// proceed. Opening only reads the store; if two tasks race, the first
    /// insert wins and the other coder is dropped.
    async fn channel(&self, peer: &PeerId) -> Result<Arc<Mutex<PeerChannel>>> {
        if let Some(channel) = self.channels.lock().await.get(peer) {
            return Ok(Arc::clone(channel));
        }

        let remote = self
            .model
            .permanent_info(peer)
            .ok_or_else(|| AccountError::UnknownPeer(peer.clone()))?;
        let local = self.local.peer_id.clone();
        let signer = Arc::clone(&self.signer);
        let store = Arc::clone(&self.store);
        let config = self.config.coder.clone();
        let coder =
            tokio::task::spawn_blocking(move || Coder::open(local, remote, signer, store, config))
                .await??;

        let mut channels = self.channels.lock().await;
        let channel = channels.entry(peer.clone()).or_insert_with(|| {
            debug!(peer = %peer, "opened coder");
            Arc::new(Mutex::new(PeerChannel::new(
                coder,
                self.config.max_pending_per_peer,
            )))
        });
        Ok(Arc::clone(channel))
    }
}

/// Current time in milliseconds.
fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
