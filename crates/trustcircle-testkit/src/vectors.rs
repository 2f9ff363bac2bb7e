//! Golden key vectors.
//!
//! Every implementation sharing a key/value store with this one must
//! classify these keys identically, and build the same key back from the
//! classification.

use trustcircle_core::PeerId;
use trustcircle_sync::{classify, KeyKind};

/// A golden key vector.
#[derive(Debug, Clone)]
pub struct KeyVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// The raw store key.
    pub key: &'static str,
    /// How the key must classify.
    pub expected: KeyKind,
}

fn peer(id: &str) -> PeerId {
    PeerId::from(id)
}

/// Get all golden key vectors.
pub fn all_vectors() -> Vec<KeyVector> {
    vec![
        KeyVector {
            name: "circle key",
            key: "oAccount",
            expected: KeyKind::Circle {
                circle: "Account".into(),
            },
        },
        KeyVector {
            name: "circle key with empty name",
            key: "o",
            expected: KeyKind::Circle {
                circle: String::new(),
            },
        },
        KeyVector {
            name: "retirement key",
            key: "-Account|peer-1",
            expected: KeyKind::Retirement {
                circle: "Account".into(),
                peer: peer("peer-1"),
            },
        },
        KeyVector {
            name: "message key",
            key: "Account|peer-1:peer-2",
            expected: KeyKind::Message {
                circle: "Account".into(),
                from: peer("peer-1"),
                to: peer("peer-2"),
            },
        },
        KeyVector {
            name: "message key splits on the last separators",
            key: "Home|Office|a:b:c",
            expected: KeyKind::Message {
                circle: "Home|Office".into(),
                from: peer("a:b"),
                to: peer("c"),
            },
        },
        KeyVector {
            name: "key parameters",
            key: ">KeyParameters",
            expected: KeyKind::KeyParameters,
        },
        KeyVector {
            name: "initial sync marker",
            key: "^InitialSync",
            expected: KeyKind::InitialSync,
        },
        KeyVector {
            name: "account changed marker",
            key: "^AccountChanged",
            expected: KeyKind::AccountChanged,
        },
        KeyVector {
            name: "empty key",
            key: "",
            expected: KeyKind::Unknown,
        },
        KeyVector {
            name: "unknown marker",
            key: "^Nope",
            expected: KeyKind::Unknown,
        },
        KeyVector {
            name: "unknown parameters key",
            key: ">Other",
            expected: KeyKind::Unknown,
        },
        KeyVector {
            name: "retirement without peer separator",
            key: "-Account",
            expected: KeyKind::Unknown,
        },
        KeyVector {
            name: "message without sender",
            key: "Account|:peer-2",
            expected: KeyKind::Unknown,
        },
        KeyVector {
            name: "bare word",
            key: "Account",
            expected: KeyKind::Unknown,
        },
    ]
}

/// Check every vector, returning `(name, passed)`.
pub fn verify_all_vectors() -> Vec<(String, bool)> {
    all_vectors()
        .iter()
        .map(|v| {
            let classified = classify(v.key) == v.expected;
            let rebuilt = match v.expected.to_key() {
                Some(key) => key == v.key,
                None => true,
            };
            (v.name.to_string(), classified && rebuilt)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_vectors_pass() {
        for (name, passed) in verify_all_vectors() {
            assert!(passed, "vector '{}' failed", name);
        }
    }

    #[test]
    fn test_vector_names_unique() {
        let vectors = all_vectors();
        let mut names: Vec<_> = vectors.iter().map(|v| v.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), vectors.len());
    }
}
