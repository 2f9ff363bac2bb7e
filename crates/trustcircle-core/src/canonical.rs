//! Canonical CBOR encoding for deterministic serialization.
//!
//! This module implements RFC 8949 Core Deterministic Encoding:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - No floats (timestamps are i64 milliseconds)
//!
//! Every signature in the engine covers `domain || canonical_bytes(document)`,
//! and circle ids are the hash of the canonical circle encoding, so the same
//! document must produce identical bytes on every peer.

use ciborium::value::Value;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::circle::Circle;
use crate::error::CoreError;
use crate::peer::{DynamicInfo, PermanentInfo, StableInfo};
use crate::voucher::Voucher;

/// Document field keys (integer keys for compact encoding).
///
/// Keys 0-23 encode as single bytes in CBOR.
mod keys {
    pub mod permanent {
        pub const PEER_ID: u64 = 0;
        pub const MODEL_ID: u64 = 1;
        pub const SIGNING_KEY: u64 = 2;
        pub const ENCRYPTION_KEY: u64 = 3;
        pub const EPOCH: u64 = 4;
    }

    pub mod stable {
        pub const VERSION: u64 = 0;
        pub const DEVICE_CLASS: u64 = 1;
        pub const POLICY_VERSION: u64 = 2;
        pub const POLICY_HASH: u64 = 3;
        pub const POLICY_SECRETS: u64 = 4;
    }

    pub mod dynamic {
        pub const VERSION: u64 = 0;
        pub const CLIQUE: u64 = 1;
        pub const CIRCLE_ID: u64 = 2;
        pub const CIRCLE_GENERATION: u64 = 3;
        pub const INCLUDED: u64 = 4;
        pub const EXCLUDED: u64 = 5;
    }

    pub mod circle {
        pub const CLIQUE: u64 = 0;
        pub const GENERATION: u64 = 1;
        pub const PEERS: u64 = 2;
    }

    pub mod voucher {
        pub const CANDIDATE: u64 = 0;
        pub const SPONSOR: u64 = 1;
        pub const ISSUED_AT: u64 = 2;
    }
}

/// The value shapes a signed document is built from.
///
/// There is no float or tag variant, so every value has exactly one
/// encoding and encoding cannot fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanonicalValue {
    Unsigned(u64),
    Signed(i64),
    Bytes(Vec<u8>),
    Text(String),
    Array(Vec<CanonicalValue>),
    /// Entries in any order; encoding sorts them by encoded key.
    Map(Vec<(CanonicalValue, CanonicalValue)>),
    Bool(bool),
    Null,
}

impl CanonicalValue {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    pub fn text_array<'a>(items: impl IntoIterator<Item = &'a str>) -> Self {
        Self::Array(items.into_iter().map(Self::text).collect())
    }

    /// A map with small integer keys, the layout of every document.
    pub fn fields(entries: impl IntoIterator<Item = (u64, CanonicalValue)>) -> Self {
        Self::Map(
            entries
                .into_iter()
                .map(|(key, value)| (Self::Unsigned(key), value))
                .collect(),
        )
    }

    /// Deterministic CBOR: shortest heads, definite lengths, map entries
    /// ordered by their encoded key bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write(&mut buf);
        buf
    }

    fn write(&self, buf: &mut Vec<u8>) {
        match self {
            Self::Unsigned(n) => head(buf, UINT, *n),
            Self::Signed(n) if *n < 0 => head(buf, NINT, (-1 - *n) as u64),
            Self::Signed(n) => head(buf, UINT, *n as u64),
            Self::Bytes(b) => {
                head(buf, BYTES, b.len() as u64);
                buf.extend_from_slice(b);
            }
            Self::Text(s) => {
                head(buf, TEXT, s.len() as u64);
                buf.extend_from_slice(s.as_bytes());
            }
            Self::Array(items) => {
                head(buf, ARRAY, items.len() as u64);
                items.iter().for_each(|item| item.write(buf));
            }
            Self::Map(entries) => {
                let mut encoded: Vec<(Vec<u8>, &CanonicalValue)> =
                    entries.iter().map(|(k, v)| (k.to_bytes(), v)).collect();
                encoded.sort_by(|a, b| a.0.cmp(&b.0));

                head(buf, MAP, encoded.len() as u64);
                for (key, value) in encoded {
                    buf.extend_from_slice(&key);
                    value.write(buf);
                }
            }
            Self::Bool(b) => buf.push(if *b { 0xf5 } else { 0xf4 }),
            Self::Null => buf.push(0xf6),
        }
    }
}

impl TryFrom<&Value> for CanonicalValue {
    type Error = CoreError;

    fn try_from(value: &Value) -> Result<Self, CoreError> {
        Ok(match value {
            Value::Integer(i) => {
                let n = i128::from(*i);
                match u64::try_from(n) {
                    Ok(n) => Self::Unsigned(n),
                    Err(_) => Self::Signed(i64::try_from(n).map_err(|_| {
                        CoreError::EncodingError(format!("integer {n} out of range"))
                    })?),
                }
            }
            Value::Bytes(b) => Self::Bytes(b.clone()),
            Value::Text(s) => Self::Text(s.clone()),
            Value::Array(items) => Self::Array(
                items
                    .iter()
                    .map(Self::try_from)
                    .collect::<Result<_, _>>()?,
            ),
            Value::Map(entries) => Self::Map(
                entries
                    .iter()
                    .map(|(k, v)| Ok((Self::try_from(k)?, Self::try_from(v)?)))
                    .collect::<Result<_, CoreError>>()?,
            ),
            Value::Bool(b) => Self::Bool(*b),
            Value::Null => Self::Null,
            other => {
                return Err(CoreError::EncodingError(format!(
                    "no canonical form for {other:?}"
                )))
            }
        })
    }
}

/// Canonical bytes of an arbitrary CBOR value.
///
/// Floats, tags and integers outside the `i64`/`u64` range are rejected
/// with [`CoreError::EncodingError`].
pub fn encode_canonical(value: &Value) -> Result<Vec<u8>, CoreError> {
    Ok(CanonicalValue::try_from(value)?.to_bytes())
}

/// Canonical bytes of a PermanentInfo.
pub fn permanent_info_bytes(info: &PermanentInfo) -> Vec<u8> {
    use keys::permanent::*;
    CanonicalValue::fields([
        (PEER_ID, CanonicalValue::text(info.peer_id.as_str())),
        (MODEL_ID, CanonicalValue::text(info.model_id.as_str())),
        (SIGNING_KEY, CanonicalValue::Bytes(info.signing_key.0.to_vec())),
        (ENCRYPTION_KEY, CanonicalValue::Bytes(info.encryption_key.0.to_vec())),
        (EPOCH, CanonicalValue::Unsigned(info.epoch)),
    ])
    .to_bytes()
}

/// Canonical bytes of the signed content of a StableInfo (signature excluded).
pub fn stable_info_bytes(info: &StableInfo) -> Vec<u8> {
    use keys::stable::*;
    let secrets = info
        .policy_secrets
        .iter()
        .map(|(name, secret)| (CanonicalValue::text(name.as_str()), CanonicalValue::Bytes(secret.clone())))
        .collect();

    CanonicalValue::fields([
        (VERSION, CanonicalValue::Unsigned(info.version)),
        (DEVICE_CLASS, CanonicalValue::text(info.device_class.as_str())),
        (POLICY_VERSION, CanonicalValue::Unsigned(info.policy_version)),
        (POLICY_HASH, CanonicalValue::Bytes(info.policy_hash.0.to_vec())),
        (POLICY_SECRETS, CanonicalValue::Map(secrets)),
    ])
    .to_bytes()
}

/// Canonical bytes of the signed content of a DynamicInfo (signature excluded).
pub fn dynamic_info_bytes(info: &DynamicInfo) -> Vec<u8> {
    use keys::dynamic::*;
    CanonicalValue::fields([
        (VERSION, CanonicalValue::Unsigned(info.version)),
        (CLIQUE, CanonicalValue::text(info.clique.as_str())),
        (CIRCLE_ID, CanonicalValue::Bytes(info.circle_id.0.to_vec())),
        (CIRCLE_GENERATION, CanonicalValue::Unsigned(info.circle_generation)),
        (INCLUDED, CanonicalValue::text_array(info.included.iter().map(|p| p.as_str()))),
        (EXCLUDED, CanonicalValue::text_array(info.excluded.iter().map(|p| p.as_str()))),
    ])
    .to_bytes()
}

/// Canonical bytes of a circle generation; its hash is the circle id.
pub fn circle_bytes(circle: &Circle) -> Vec<u8> {
    use keys::circle::*;
    CanonicalValue::fields([
        (CLIQUE, CanonicalValue::text(circle.clique.as_str())),
        (GENERATION, CanonicalValue::Unsigned(circle.generation)),
        (PEERS, CanonicalValue::text_array(circle.peers.iter().map(|p| p.as_str()))),
    ])
    .to_bytes()
}

/// Canonical bytes of the signed content of a voucher (signature excluded).
pub fn voucher_bytes(voucher: &Voucher) -> Vec<u8> {
    use keys::voucher::*;
    CanonicalValue::fields([
        (CANDIDATE, CanonicalValue::text(voucher.candidate.as_str())),
        (SPONSOR, CanonicalValue::text(voucher.sponsor.as_str())),
        (ISSUED_AT, CanonicalValue::Signed(voucher.issued_at)),
    ])
    .to_bytes()
}

/// Construct a signed message: `domain || canonical`.
pub fn signed_message(domain: &[u8], canonical: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(domain.len() + canonical.len());
    buf.extend_from_slice(domain);
    buf.extend_from_slice(canonical);
    buf
}

/// Serialize any document to CBOR for transport or persistence.
///
/// This is the wire form, not the signed form: signatures always cover the
/// canonical encoding produced by the functions above.
pub fn to_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>, CoreError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| CoreError::EncodingError(e.to_string()))?;
    Ok(buf)
}

/// Deserialize a document from its CBOR wire form.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CoreError> {
    ciborium::from_reader(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))
}

// Major types.
const UINT: u8 = 0;
const NINT: u8 = 1;
const BYTES: u8 = 2;
const TEXT: u8 = 3;
const ARRAY: u8 = 4;
const MAP: u8 = 5;

/// Initial byte plus the shortest big-endian argument for `n`.
fn head(buf: &mut Vec<u8>, major: u8, n: u64) {
    let major = major << 5;
    match n {
        0..=23 => buf.push(major | n as u8),
        24..=0xff => buf.extend_from_slice(&[major | 24, n as u8]),
        0x100..=0xffff => {
            buf.push(major | 25);
            buf.extend_from_slice(&(n as u16).to_be_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            buf.push(major | 26);
            buf.extend_from_slice(&(n as u32).to_be_bytes());
        }
        _ => {
            buf.push(major | 27);
            buf.extend_from_slice(&n.to_be_bytes());
        }
    }
}
