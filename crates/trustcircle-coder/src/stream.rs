//! Streaming channel with a one-byte decrypt carry buffer.
//!
//! The decoder never drains the last byte of a chunk unless it is told the
//! stream ended: the final byte of every non-final chunk is held back and
//! decrypted together with the next chunk, or alone at end of stream.

use crate::crypto::apply_keystream;
use crate::error::{CoderError, Result};

/// Encrypt `chunk` at the current keystream position and advance it.
pub(crate) fn encrypt(key: &[u8; 32], position: &mut u64, chunk: &[u8]) -> Result<Vec<u8>> {
    if chunk.is_empty() {
        return Err(CoderError::InputLength { len: 0 });
    }
    let mut out = chunk.to_vec();
    apply_keystream(key, *position, &mut out)?;
    *position += out.len() as u64;
    Ok(out)
}

/// Decrypt `chunk`, honouring the carry buffer.
pub(crate) fn decrypt(
    key: &[u8; 32],
    position: &mut u64,
    carry: &mut Option<u8>,
    chunk: &[u8],
    end_of_stream: bool,
) -> Result<Vec<u8>> {
    if chunk.is_empty() && carry.is_none() {
        return Err(CoderError::InputLength { len: 0 });
    }

    let mut buf = Vec::with_capacity(chunk.len() + 1);
    buf.extend(carry.take());
    buf.extend_from_slice(chunk);
    if !end_of_stream {
        *carry = buf.pop();
    }

    apply_keystream(key, *position, &mut buf)?;
    *position += buf.len() as u64;
    Ok(buf)
}
