//! One remote peer's coder plus the payloads waiting for it.

use std::collections::VecDeque;

use trustcircle_coder::{Coder, UnwrapOutcome, WrapResult};

use crate::error::Result;

/// What a channel wants published after a call.
#[derive(Debug, Default)]
pub(crate) struct Outbound {
    /// Frames for the remote, in publish order.
    pub frames: Vec<Vec<u8>>,
    /// Plaintext received from the remote.
    pub received: Option<Vec<u8>>,
    /// The session became ready during this call.
    pub connected: bool,
    /// The payload was queued behind negotiation.
    pub queued: bool,
}

/// A coder with a bounded queue of payloads sent before it was ready.
pub(crate) struct PeerChannel {
    pub coder: Coder,
    pending: VecDeque<Vec<u8>>,
    max_pending: usize,
}

impl PeerChannel {
    pub fn new(coder: Coder, max_pending: usize) -> Self {
        Self {
            coder,
            pending: VecDeque::new(),
            max_pending,
        }
    }

    /// Wrap `payload`, queueing it if the session is still negotiating.
    pub fn send(&mut self, payload: Vec<u8>) -> Result<Outbound> {
        let mut out = Outbound::default();
        match self.coder.wrap(&payload)? {
            WrapResult::Ciphertext(frame) => out.frames.push(frame),
            WrapResult::NegotiationMessage(frame) => {
                self.enqueue(payload);
                out.frames.push(frame);
                out.queued = true;
            }
        }
        Ok(out)
    }

    /// Feed one inbound frame to the coder.
    pub fn receive(&mut self, frame: &[u8]) -> Result<Outbound> {
        let was_ready = self.coder.is_ready();
        let outcome = self.coder.unwrap(frame)?;
        let mut out = Outbound::default();

        if let Some(reply) = outcome.reply() {
            out.frames.push(reply.to_vec());
        }
        match outcome {
            UnwrapOutcome::Decoded(plaintext) => out.received = Some(plaintext),
            UnwrapOutcome::Failure { .. } => {
                tracing::warn!(peer = %self.coder.remote(), pending = self.pending.len(), "coder failed, renegotiating");
            }
            UnwrapOutcome::StaleEvent
            | UnwrapOutcome::HandledInternally { .. }
            | UnwrapOutcome::NegotiationComplete { .. } => {}
        }

        if !was_ready && self.coder.is_ready() {
            out.connected = true;
            self.flush(&mut out)?;
        }
        Ok(out)
    }

    /// Number of payloads waiting for negotiation.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn enqueue(&mut self, payload: Vec<u8>) {
        if self.max_pending == 0 {
            return;
        }
        if self.pending.len() >= self.max_pending {
            self.pending.pop_front();
            tracing::warn!(peer = %self.coder.remote(), "pending queue full, dropped oldest payload");
        }
        self.pending.push_back(payload);
    }

    fn flush(&mut self, out: &mut Outbound) -> Result<()> {
        while let Some(payload) = self.pending.pop_front() {
            match self.coder.wrap(&payload)? {
                WrapResult::Ciphertext(frame) => out.frames.push(frame),
                WrapResult::NegotiationMessage(frame) => {
                    self.pending.push_front(payload);
                    out.frames.push(frame);
                    break;
                }
            }
        }
        Ok(())
    }
}
