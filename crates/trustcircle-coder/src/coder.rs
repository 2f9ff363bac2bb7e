//! The per-peer coder: negotiation state machine plus message wrapping.
//!
//! One `Coder` exists per (local, remote) pair and is driven by exactly one
//! caller at a time (`&mut self`). Every state change is persisted through
//! the injected [`CoderStateStore`] before the call returns.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, warn};

use trustcircle_core::{
    from_cbor, to_cbor, Ed25519Signature, Ed25519Verifier, PeerId, PermanentInfo,
    SignatureVerifier, SigningCapability,
};
use trustcircle_store::CoderStateStore;

use crate::crypto::{self, EphemeralSecret, Role, SessionKeys};
use crate::error::{CoderError, Result};
use crate::frame::{self, Frame, PROTOCOL_VERSION};
use crate::state::{CoderState, Handshake, Phase};
use crate::stream;

/// Room for CBOR framing and the AEAD tag around a maximal plaintext.
const FRAME_OVERHEAD: usize = 128;

/// Coder limits.
#[derive(Debug, Clone)]
pub struct CoderConfig {
    /// Largest plaintext `wrap` accepts; `unwrap` allows the same plus framing.
    pub max_frame_len: usize,
}

impl Default for CoderConfig {
    fn default() -> Self {
        Self {
            max_frame_len: 1024 * 1024,
        }
    }
}

/// What `wrap` produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WrapResult {
    /// A data frame carrying the plaintext.
    Ciphertext(Vec<u8>),
    /// The session is not ready; publish this negotiation frame instead and
    /// retry the plaintext later.
    NegotiationMessage(Vec<u8>),
}

/// What `unwrap` did with an inbound frame.
///
/// Any `reply` is a negotiation frame the caller must publish to the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnwrapOutcome {
    /// Application plaintext.
    Decoded(Vec<u8>),
    /// A negotiation step that did not finish the handshake.
    HandledInternally { reply: Option<Vec<u8>> },
    /// The session just became ready.
    NegotiationComplete { reply: Option<Vec<u8>> },
    /// Duplicate or superseded input; nothing changed.
    StaleEvent,
    /// The coder reset and restarted negotiation.
    Failure { reply: Option<Vec<u8>> },
}

/// Closed classification of an [`UnwrapOutcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoderStatus {
    DataReturned,
    Negotiating,
    NegotiationCompleted,
    Failure,
    StaleEvent,
}

impl UnwrapOutcome {
    /// The status code for this outcome.
    pub fn status(&self) -> CoderStatus {
        match self {
            UnwrapOutcome::Decoded(_) => CoderStatus::DataReturned,
            UnwrapOutcome::HandledInternally { .. } => CoderStatus::Negotiating,
            UnwrapOutcome::NegotiationComplete { .. } => CoderStatus::NegotiationCompleted,
            UnwrapOutcome::StaleEvent => CoderStatus::StaleEvent,
            UnwrapOutcome::Failure { .. } => CoderStatus::Failure,
        }
    }

    /// The negotiation frame to publish, if any.
    pub fn reply(&self) -> Option<&[u8]> {
        match self {
            UnwrapOutcome::HandledInternally { reply }
            | UnwrapOutcome::NegotiationComplete { reply }
            | UnwrapOutcome::Failure { reply } => reply.as_deref(),
            UnwrapOutcome::Decoded(_) | UnwrapOutcome::StaleEvent => None,
        }
    }
}

/// Encrypted transport to one remote peer.
pub struct Coder {
    local: PeerId,
    remote: PermanentInfo,
    signer: Arc<dyn SigningCapability>,
    verifier: Arc<dyn SignatureVerifier>,
    store: Arc<dyn CoderStateStore>,
    config: CoderConfig,
    state: CoderState,
}

impl Coder {
    /// Open the coder for `remote`, resuming from saved state when present.
    ///
    /// A saved blob that no longer decodes is discarded; the coder starts
    /// over and renegotiates.
    pub fn open(
        local: PeerId,
        remote: PermanentInfo,
        signer: Arc<dyn SigningCapability>,
        store: Arc<dyn CoderStateStore>,
        config: CoderConfig,
    ) -> Result<Self> {
        let state = match store.load(&remote.peer_id)? {
            Some(blob) => match from_cbor::<CoderState>(&blob) {
                Ok(state) => state,
                Err(e) => {
                    warn!(peer = %remote.peer_id, error = %e, "discarding unreadable coder state");
                    CoderState::new()
                }
            },
            None => CoderState::new(),
        };

        Ok(Self {
            local,
            remote,
            signer,
            verifier: Arc::new(Ed25519Verifier),
            store,
            config,
            state,
        })
    }

    /// Replace the signature verifier.
    pub fn with_verifier(mut self, verifier: Arc<dyn SignatureVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    /// Remove the persisted state. Used when the remote leaves the circle.
    pub fn destroy(self) -> Result<()> {
        self.store.remove(&self.remote.peer_id)?;
        debug!(peer = %self.remote.peer_id, "destroyed coder state");
        Ok(())
    }

    /// The remote peer id.
    pub fn remote(&self) -> &PeerId {
        &self.remote.peer_id
    }

    /// Current negotiation phase.
    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    /// Whether data frames can flow.
    pub fn is_ready(&self) -> bool {
        self.state.phase == Phase::Ready
    }

    /// Whether a `wrap` was refused since the last successful one.
    pub fn pending_retry(&self) -> bool {
        self.state.pending_retry
    }

    /// Encrypt a message for the remote, or start/continue negotiation.
    pub fn wrap(&mut self, plaintext: &[u8]) -> Result<WrapResult> {
        if plaintext.len() > self.config.max_frame_len {
            return Err(CoderError::InputLength {
                len: plaintext.len(),
            });
        }

        if let Some(keys) = self.state.ready_keys() {
            let counter = self.state.send_counter;
            let sealed = crypto::seal(&keys.send, counter, plaintext)?;
            let frame = Frame::Data {
                counter,
                ciphertext: Bytes::from(sealed),
            }
            .encode()?;
            self.state.send_counter += 1;
            self.state.pending_retry = false;
            self.persist()?;
            return Ok(WrapResult::Ciphertext(frame));
        }

        let retransmit = match &self.state.handshake {
            Some(handshake) if self.state.phase == Phase::Negotiating => {
                Some(handshake.last_sent.clone())
            }
            _ => None,
        };
        let message = match retransmit {
            Some(message) => message,
            None => self.begin_as_initiator()?,
        };
        self.state.pending_retry = true;
        self.persist()?;
        Ok(WrapResult::NegotiationMessage(message))
    }

    /// Process one inbound frame from the remote.
    pub fn unwrap(&mut self, input: &[u8]) -> Result<UnwrapOutcome> {
        if input.is_empty() || input.len() > self.config.max_frame_len + FRAME_OVERHEAD {
            return Err(CoderError::InputLength { len: input.len() });
        }

        let frame = match Frame::decode(input) {
            Ok(frame) => frame,
            Err(e) => return self.fail(&format!("undecodable frame: {}", e)),
        };

        let outcome = match frame {
            Frame::Hello {
                version,
                ephemeral,
                signature,
            } => self.on_hello(version, ephemeral, &signature)?,
            Frame::Reply {
                ephemeral,
                echo,
                signature,
            } => self.on_reply(ephemeral, echo, &signature)?,
            Frame::Confirm { mac } => self.on_confirm(mac)?,
            Frame::Data {
                counter,
                ciphertext,
            } => self.on_data(counter, &ciphertext)?,
        };

        if matches!(outcome, UnwrapOutcome::StaleEvent) {
            debug!(peer = %self.remote.peer_id, "stale coder event");
        } else {
            self.persist()?;
        }
        Ok(outcome)
    }

    /// Encrypt the next chunk of the outbound stream.
    pub fn encrypt_stream(&mut self, chunk: &[u8]) -> Result<Vec<u8>> {
        let key = self.state.ready_keys().ok_or(CoderError::NotReady)?.stream_send;
        let out = stream::encrypt(&key, &mut self.state.stream_send_position, chunk)?;
        self.persist()?;
        Ok(out)
    }

    /// Decrypt the next chunk of the inbound stream.
    ///
    /// Unless `end_of_stream` is set, the last byte of the input is held back
    /// and returned by a later call.
    pub fn decrypt_stream(&mut self, chunk: &[u8], end_of_stream: bool) -> Result<Vec<u8>> {
        let key = self.state.ready_keys().ok_or(CoderError::NotReady)?.stream_recv;
        let out = stream::decrypt(
            &key,
            &mut self.state.stream_recv_position,
            &mut self.state.carry,
            chunk,
            end_of_stream,
        )?;
        self.persist()?;
        Ok(out)
    }

    fn on_hello(
        &mut self,
        version: u8,
        ephemeral: [u8; 32],
        signature: &Ed25519Signature,
    ) -> Result<UnwrapOutcome> {
        if version != PROTOCOL_VERSION {
            return self.fail(&format!("unsupported protocol version {}", version));
        }
        let message = frame::hello_message(&self.remote.peer_id, &self.local, &ephemeral);
        if self.verify(&message, signature).is_err() {
            return self.fail("bad hello signature");
        }

        if let Some(handshake) = &self.state.handshake {
            if handshake.role == Role::Responder && handshake.remote_ephemeral == Some(ephemeral) {
                // Retransmitted hello for the session we already answered.
                return Ok(match self.state.phase {
                    Phase::Negotiating => UnwrapOutcome::HandledInternally {
                        reply: Some(handshake.last_sent.clone()),
                    },
                    _ => UnwrapOutcome::StaleEvent,
                });
            }

            let simultaneous = self.state.phase == Phase::Negotiating
                && handshake.role == Role::Initiator;
            if simultaneous && self.local < self.remote.peer_id {
                debug!(peer = %self.remote.peer_id, "simultaneous hello, keeping initiator role");
                return Ok(UnwrapOutcome::HandledInternally {
                    reply: Some(handshake.last_sent.clone()),
                });
            }
        }

        if self.state.phase == Phase::Ready {
            info!(peer = %self.remote.peer_id, "remote renegotiating session");
        }
        let reply = self.begin_as_responder(ephemeral)?;
        Ok(UnwrapOutcome::HandledInternally { reply: Some(reply) })
    }

    fn on_reply(
        &mut self,
        ephemeral: [u8; 32],
        echo: [u8; 32],
        signature: &Ed25519Signature,
    ) -> Result<UnwrapOutcome> {
        let Some(handshake) = &self.state.handshake else {
            return Ok(UnwrapOutcome::StaleEvent);
        };
        if handshake.role != Role::Initiator || handshake.local_ephemeral != echo {
            return Ok(UnwrapOutcome::StaleEvent);
        }
        if self.state.phase == Phase::Ready {
            // Our confirm was lost; resend it.
            return Ok(if handshake.remote_ephemeral == Some(ephemeral) {
                UnwrapOutcome::HandledInternally {
                    reply: Some(handshake.last_sent.clone()),
                }
            } else {
                UnwrapOutcome::StaleEvent
            });
        }

        let message = frame::reply_message(&self.remote.peer_id, &self.local, &ephemeral, &echo);
        if self.verify(&message, signature).is_err() {
            return self.fail("bad reply signature");
        }

        let transcript = frame::transcript(
            &self.local,
            &self.remote.peer_id,
            &handshake.local_ephemeral,
            &ephemeral,
        );
        let shared = handshake.local_secret.diffie_hellman(&ephemeral);
        let keys = SessionKeys::derive(Role::Initiator, &shared, &transcript);
        let confirm = Frame::Confirm {
            mac: keys.confirmation(&transcript),
        }
        .encode()?;

        if let Some(handshake) = self.state.handshake.as_mut() {
            handshake.remote_ephemeral = Some(ephemeral);
            handshake.keys = Some(keys);
            handshake.transcript = Some(transcript);
            handshake.last_sent = confirm.clone();
        }
        self.state.phase = Phase::Ready;
        info!(peer = %self.remote.peer_id, role = "initiator", "coder session established");
        Ok(UnwrapOutcome::NegotiationComplete {
            reply: Some(confirm),
        })
    }

    fn on_confirm(&mut self, mac: [u8; 32]) -> Result<UnwrapOutcome> {
        let Some(handshake) = &self.state.handshake else {
            return Ok(UnwrapOutcome::StaleEvent);
        };
        if handshake.role != Role::Responder || self.state.phase == Phase::Ready {
            return Ok(UnwrapOutcome::StaleEvent);
        }
        let (Some(keys), Some(transcript)) = (&handshake.keys, &handshake.transcript) else {
            return Ok(UnwrapOutcome::StaleEvent);
        };
        if keys.confirmation(transcript) != mac {
            return self.fail("key confirmation mismatch");
        }

        self.state.phase = Phase::Ready;
        info!(peer = %self.remote.peer_id, role = "responder", "coder session established");
        Ok(UnwrapOutcome::NegotiationComplete { reply: None })
    }

    fn on_data(&mut self, counter: u64, ciphertext: &[u8]) -> Result<UnwrapOutcome> {
        let keys = self
            .state
            .handshake
            .as_ref()
            .filter(|h| self.state.phase == Phase::Ready || h.role == Role::Responder)
            .and_then(|h| h.keys.as_ref());
        let Some(keys) = keys else {
            return self.fail("data frame without a session");
        };

        if counter < self.state.recv_counter {
            return Ok(UnwrapOutcome::StaleEvent);
        }
        let Some(plaintext) = crypto::open(&keys.recv, counter, ciphertext) else {
            return self.fail("data frame failed authentication");
        };

        if self.state.phase != Phase::Ready {
            // A valid data frame proves the initiator holds the keys even
            // if its confirm never arrived.
            self.state.phase = Phase::Ready;
            info!(peer = %self.remote.peer_id, role = "responder", "coder session established by data");
        }
        self.state.recv_counter = counter + 1;
        Ok(UnwrapOutcome::Decoded(plaintext))
    }

    fn begin_as_initiator(&mut self) -> Result<Vec<u8>> {
        let secret = EphemeralSecret::generate();
        let ephemeral = secret.public_key();
        let message = frame::hello_message(&self.local, &self.remote.peer_id, &ephemeral);
        let signature = self.signer.try_sign(&message)?;
        let hello = Frame::Hello {
            version: PROTOCOL_VERSION,
            ephemeral,
            signature,
        }
        .encode()?;

        self.state.start(Handshake {
            role: Role::Initiator,
            local_secret: secret,
            local_ephemeral: ephemeral,
            remote_ephemeral: None,
            keys: None,
            transcript: None,
            last_sent: hello.clone(),
        });
        debug!(peer = %self.remote.peer_id, "sent hello");
        Ok(hello)
    }

    fn begin_as_responder(&mut self, remote_ephemeral: [u8; 32]) -> Result<Vec<u8>> {
        let secret = EphemeralSecret::generate();
        let ephemeral = secret.public_key();
        let message =
            frame::reply_message(&self.local, &self.remote.peer_id, &ephemeral, &remote_ephemeral);
        let signature = self.signer.try_sign(&message)?;
        let reply = Frame::Reply {
            ephemeral,
            echo: remote_ephemeral,
            signature,
        }
        .encode()?;

        let transcript = frame::transcript(
            &self.remote.peer_id,
            &self.local,
            &remote_ephemeral,
            &ephemeral,
        );
        let shared = secret.diffie_hellman(&remote_ephemeral);
        let keys = SessionKeys::derive(Role::Responder, &shared, &transcript);

        self.state.start(Handshake {
            role: Role::Responder,
            local_secret: secret,
            local_ephemeral: ephemeral,
            remote_ephemeral: Some(remote_ephemeral),
            keys: Some(keys),
            transcript: Some(transcript),
            last_sent: reply.clone(),
        });
        debug!(peer = %self.remote.peer_id, "sent reply");
        Ok(reply)
    }

    /// Reset to a fresh negotiation and report the failure.
    fn fail(&mut self, reason: &str) -> Result<UnwrapOutcome> {
        warn!(peer = %self.remote.peer_id, reason, "coder reset");
        let hello = self.begin_as_initiator()?;
        self.persist()?;
        Ok(UnwrapOutcome::Failure { reply: Some(hello) })
    }

    fn verify(
        &self,
        message: &[u8],
        signature: &Ed25519Signature,
    ) -> trustcircle_core::Result<()> {
        self.verifier
            .verify(&self.remote.signing_key, message, signature)
    }

    fn persist(&self) -> Result<()> {
        let blob = to_cbor(&self.state)?;
        self.store.save(&self.remote.peer_id, &blob)?;
        Ok(())
    }
}

impl std::fmt::Debug for Coder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coder")
            .field("local", &self.local)
            .field("remote", &self.remote.peer_id)
            .field("phase", &self.state.phase)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trustcircle_core::{CoreError, Ed25519PublicKey, EncryptionPublicKey, Keypair};
    use trustcircle_store::MemoryCoderStore;

    struct Side {
        coder: Coder,
        store: Arc<MemoryCoderStore>,
    }

    fn identity(seed: u8) -> (Keypair, PermanentInfo) {
        let keypair = Keypair::from_seed(&[seed; 32]);
        let info = PermanentInfo::new(
            "Mac14,2",
            keypair.public_key(),
            EncryptionPublicKey::from_bytes([seed; 32]),
            0,
        );
        (keypair, info)
    }

    fn pair() -> (Side, Side) {
        let (ka, a) = identity(1);
        let (kb, b) = identity(2);
        (side(ka, &a, &b), side(kb, &b, &a))
    }

    fn side(keypair: Keypair, local: &PermanentInfo, remote: &PermanentInfo) -> Side {
        let store = Arc::new(MemoryCoderStore::new());
        let coder = Coder::open(
            local.peer_id.clone(),
            remote.clone(),
            Arc::new(keypair),
            store.clone(),
            CoderConfig::default(),
        )
        .unwrap();
        Side { coder, store }
    }

    /// Drive a handshake from `a`'s first wrap; returns round trips used.
    fn negotiate(a: &mut Coder, b: &mut Coder) -> usize {
        let mut to_b = match a.wrap(b"").unwrap() {
            WrapResult::NegotiationMessage(m) => Some(m),
            WrapResult::Ciphertext(_) => return 0,
        };
        let mut round_trips = 0;
        while let Some(msg) = to_b.take() {
            round_trips += 1;
            assert!(round_trips <= 3, "negotiation did not converge");
            let to_a = b.unwrap(&msg).unwrap().reply().map(<[u8]>::to_vec);
            if let Some(msg) = to_a {
                to_b = a.unwrap(&msg).unwrap().reply().map(<[u8]>::to_vec);
            }
        }
        round_trips
    }

    fn ready_pair() -> (Side, Side) {
        let (mut a, mut b) = pair();
        negotiate(&mut a.coder, &mut b.coder);
        assert!(a.coder.is_ready() && b.coder.is_ready());
        (a, b)
    }

    fn data(coder: &mut Coder, m: &[u8]) -> Vec<u8> {
        match coder.wrap(m).unwrap() {
            WrapResult::Ciphertext(c) => c,
            other => panic!("expected ciphertext, got {:?}", other),
        }
    }

    #[test]
    fn test_negotiation_liveness() {
        let (mut a, mut b) = pair();
        let round_trips = negotiate(&mut a.coder, &mut b.coder);

        assert!(round_trips <= 3);
        assert!(a.coder.is_ready());
        assert!(b.coder.is_ready());

        for m in [&b""[..], b"x", b"hello over the circle", &[0u8; 1000][..]] {
            let frame = data(&mut a.coder, m);
            assert_eq!(b.coder.unwrap(&frame).unwrap(), UnwrapOutcome::Decoded(m.to_vec()));
            let frame = data(&mut b.coder, m);
            assert_eq!(a.coder.unwrap(&frame).unwrap(), UnwrapOutcome::Decoded(m.to_vec()));
        }
    }

    #[test]
    fn test_outcome_status_codes() {
        let (mut a, mut b) = pair();
        let WrapResult::NegotiationMessage(hello) = a.coder.wrap(b"hi").unwrap() else {
            panic!("expected negotiation");
        };
        assert!(a.coder.pending_retry());

        let reply = b.coder.unwrap(&hello).unwrap();
        assert_eq!(reply.status(), CoderStatus::Negotiating);

        let confirm = a.coder.unwrap(reply.reply().unwrap()).unwrap();
        assert_eq!(confirm.status(), CoderStatus::NegotiationCompleted);

        let done = b.coder.unwrap(confirm.reply().unwrap()).unwrap();
        assert_eq!(done.status(), CoderStatus::NegotiationCompleted);
        assert_eq!(done.reply(), None);

        let frame = data(&mut a.coder, b"hi");
        assert!(!a.coder.pending_retry());
        let decoded = b.coder.unwrap(&frame).unwrap();
        assert_eq!(decoded.status(), CoderStatus::DataReturned);

        assert_eq!(b.coder.unwrap(&frame).unwrap().status(), CoderStatus::StaleEvent);
    }

    #[test]
    fn test_wrap_while_negotiating_retransmits() {
        let (mut a, _b) = pair();
        let first = a.coder.wrap(b"one").unwrap();
        let second = a.coder.wrap(b"two").unwrap();
        assert_eq!(first, second);
        assert_eq!(a.coder.phase(), Phase::Negotiating);
    }

    #[test]
    fn test_simultaneous_hello_resolves_by_peer_id() {
        let (mut a, mut b) = pair();
        let WrapResult::NegotiationMessage(hello_a) = a.coder.wrap(b"").unwrap() else {
            panic!()
        };
        let WrapResult::NegotiationMessage(hello_b) = b.coder.wrap(b"").unwrap() else {
            panic!()
        };

        let out_a = a.coder.unwrap(&hello_b).unwrap();
        let out_b = b.coder.unwrap(&hello_a).unwrap();

        // The side with the smaller id retransmits its hello, the other replies.
        let (small, large, small_out, large_out) = if a.coder.local < b.coder.local {
            (&mut a.coder, &mut b.coder, out_a, out_b)
        } else {
            (&mut b.coder, &mut a.coder, out_b, out_a)
        };
        assert_eq!(small_out.status(), CoderStatus::Negotiating);
        assert_eq!(large_out.status(), CoderStatus::Negotiating);

        let confirm = small.unwrap(large_out.reply().unwrap()).unwrap();
        assert_eq!(confirm.status(), CoderStatus::NegotiationCompleted);

        // The retransmitted hello reaches the responder late; it must not
        // tear down the session.
        let late = large.unwrap(small_out.reply().unwrap()).unwrap();
        assert_eq!(late.status(), CoderStatus::Negotiating);

        let done = large.unwrap(confirm.reply().unwrap()).unwrap();
        assert_eq!(done.status(), CoderStatus::NegotiationCompleted);
        assert_eq!(large.unwrap(small_out.reply().unwrap()).unwrap(), UnwrapOutcome::StaleEvent);

        let frame = data(small, b"after race");
        assert_eq!(large.unwrap(&frame).unwrap(), UnwrapOutcome::Decoded(b"after race".to_vec()));
    }

    #[test]
    fn test_lost_confirm_recovered_by_data() {
        let (mut a, mut b) = pair();
        let WrapResult::NegotiationMessage(hello) = a.coder.wrap(b"").unwrap() else {
            panic!()
        };
        let reply = b.coder.unwrap(&hello).unwrap();
        let _lost = a.coder.unwrap(reply.reply().unwrap()).unwrap();
        assert!(a.coder.is_ready());
        assert!(!b.coder.is_ready());

        let frame = data(&mut a.coder, b"payload");
        assert_eq!(b.coder.unwrap(&frame).unwrap(), UnwrapOutcome::Decoded(b"payload".to_vec()));
        assert!(b.coder.is_ready());
    }

    #[test]
    fn test_duplicate_reply_resends_confirm() {
        let (mut a, mut b) = pair();
        let WrapResult::NegotiationMessage(hello) = a.coder.wrap(b"").unwrap() else {
            panic!()
        };
        let reply = b.coder.unwrap(&hello).unwrap();
        let confirm = a.coder.unwrap(reply.reply().unwrap()).unwrap();
        let again = a.coder.unwrap(reply.reply().unwrap()).unwrap();

        assert_eq!(again.status(), CoderStatus::Negotiating);
        assert_eq!(again.reply(), confirm.reply());
    }

    #[test]
    fn test_hello_while_ready_renegotiates() {
        let (mut a, _b) = ready_pair();
        let old_frame = data(&mut a.coder, b"old session");

        // b lost its state and starts over.
        let (kb, b_info) = identity(2);
        let (_, a_info) = identity(1);
        let mut fresh_b = side(kb, &b_info, &a_info);
        negotiate(&mut fresh_b.coder, &mut a.coder);
        assert!(a.coder.is_ready() && fresh_b.coder.is_ready());

        // Frames from the old session no longer open.
        let outcome = fresh_b.coder.unwrap(&old_frame).unwrap();
        assert_eq!(outcome.status(), CoderStatus::Failure);
    }

    #[test]
    fn test_garbage_resets_with_hello() {
        let (mut a, _b) = ready_pair();
        let outcome = a.coder.unwrap(b"definitely not a frame").unwrap();

        assert_eq!(outcome.status(), CoderStatus::Failure);
        assert!(outcome.reply().is_some());
        assert_eq!(a.coder.phase(), Phase::Negotiating);
    }

    #[test]
    fn test_data_before_negotiation_fails() {
        let (mut a, mut b) = ready_pair();
        let frame = data(&mut a.coder, b"x");

        let (kc, c_info) = identity(3);
        let (_, a_info) = identity(1);
        let mut stranger = side(kc, &c_info, &a_info);
        assert_eq!(stranger.coder.unwrap(&frame).unwrap().status(), CoderStatus::Failure);
        assert_eq!(b.coder.unwrap(&frame).unwrap().status(), CoderStatus::DataReturned);
    }

    #[test]
    fn test_forged_hello_rejected() {
        let (_a, mut b) = pair();
        let (mallory, _) = identity(9);
        let (_, a_info) = identity(1);
        let eph = EphemeralSecret::generate().public_key();
        let b_id = b.coder.local.clone();
        let forged = Frame::Hello {
            version: PROTOCOL_VERSION,
            ephemeral: eph,
            signature: mallory.sign(&frame::hello_message(&a_info.peer_id, &b_id, &eph)),
        }
        .encode()
        .unwrap();

        assert_eq!(b.coder.unwrap(&forged).unwrap().status(), CoderStatus::Failure);
        assert!(!b.coder.is_ready());
    }

    #[test]
    fn test_empty_input_is_input_length() {
        let (mut a, _b) = pair();
        assert!(matches!(
            a.coder.unwrap(&[]),
            Err(CoderError::InputLength { len: 0 })
        ));
    }

    #[test]
    fn test_oversized_plaintext_rejected() {
        let (mut a, _b) = ready_pair();
        let too_big = vec![0u8; CoderConfig::default().max_frame_len + 1];
        assert!(matches!(
            a.coder.wrap(&too_big),
            Err(CoderError::InputLength { .. })
        ));
    }

    #[test]
    fn test_state_survives_reopen() {
        let (mut a, mut b) = ready_pair();
        let frame = data(&mut a.coder, b"before restart");
        b.coder.unwrap(&frame).unwrap();

        let (kb, b_info) = identity(2);
        let (_, a_info) = identity(1);
        let mut reopened = Coder::open(
            b_info.peer_id.clone(),
            a_info,
            Arc::new(kb),
            b.store.clone(),
            CoderConfig::default(),
        )
        .unwrap();
        assert!(reopened.is_ready());

        // Replay protection survived too.
        assert_eq!(reopened.unwrap(&frame).unwrap(), UnwrapOutcome::StaleEvent);
        let next = data(&mut a.coder, b"after restart");
        assert_eq!(reopened.unwrap(&next).unwrap(), UnwrapOutcome::Decoded(b"after restart".to_vec()));
    }

    #[test]
    fn test_destroy_removes_state() {
        let (a, _b) = ready_pair();
        let store = a.store.clone();
        assert_eq!(store.len(), 1);
        a.coder.destroy().unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_unreadable_state_starts_over() {
        let (ka, a_info) = identity(1);
        let (_, b_info) = identity(2);
        let store = Arc::new(MemoryCoderStore::new());
        store.save(&b_info.peer_id, b"corrupt").unwrap();

        let coder = Coder::open(
            a_info.peer_id.clone(),
            b_info,
            Arc::new(ka),
            store,
            CoderConfig::default(),
        )
        .unwrap();
        assert_eq!(coder.phase(), Phase::Uninitialized);
    }

    struct LockedSigner(Ed25519PublicKey);

    impl SigningCapability for LockedSigner {
        fn public_key(&self) -> Ed25519PublicKey {
            self.0
        }

        fn try_sign(&self, _message: &[u8]) -> std::result::Result<Ed25519Signature, CoreError> {
            Err(CoreError::SigningUnavailable)
        }
    }

    #[test]
    fn test_locked_signer_is_ordinary_error() {
        let (ka, a_info) = identity(1);
        let (_, b_info) = identity(2);
        let mut coder = Coder::open(
            a_info.peer_id.clone(),
            b_info,
            Arc::new(LockedSigner(ka.public_key())),
            Arc::new(MemoryCoderStore::new()),
            CoderConfig::default(),
        )
        .unwrap();

        assert!(matches!(coder.wrap(b"x"), Err(CoderError::SigningUnavailable)));
        assert_eq!(coder.phase(), Phase::Uninitialized);
    }

    #[test]
    fn test_stream_requires_ready() {
        let (mut a, _b) = pair();
        assert!(matches!(a.coder.encrypt_stream(b"x"), Err(CoderError::NotReady)));
        assert!(matches!(a.coder.decrypt_stream(b"x", true), Err(CoderError::NotReady)));
    }

    #[test]
    fn test_stream_split_invariance_through_coder() {
        for len in [1usize, 2, 17] {
            let plain: Vec<u8> = (0..len as u8).collect();
            for at in 1..=len {
                let (mut a, mut b) = ready_pair();
                let ct = a.coder.encrypt_stream(&plain).unwrap();
                let mut out = b.coder.decrypt_stream(&ct[..at], false).unwrap();
                out.extend(b.coder.decrypt_stream(&ct[at..], true).unwrap());
                assert_eq!(out, plain, "len {} split at {}", len, at);
            }
        }

        let plain: Vec<u8> = (0..4096u32).map(|i| i as u8).collect();
        for at in [1usize, 63, 64, 65, 2048, 4095, 4096] {
            let (mut a, mut b) = ready_pair();
            let ct = a.coder.encrypt_stream(&plain).unwrap();
            let mut out = b.coder.decrypt_stream(&ct[..at], false).unwrap();
            out.extend(b.coder.decrypt_stream(&ct[at..], true).unwrap());
            assert_eq!(out, plain, "len 4096 split at {}", at);
        }
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(32))]

            #[test]
            fn prop_unwrap_inverts_wrap(messages in proptest::collection::vec(
                proptest::collection::vec(any::<u8>(), 0..256), 1..8)
            ) {
                let (mut a, mut b) = ready_pair();
                for m in messages {
                    let frame = data(&mut a.coder, &m);
                    prop_assert_eq!(b.coder.unwrap(&frame).unwrap(), UnwrapOutcome::Decoded(m));
                }
            }
        }
    }
}
