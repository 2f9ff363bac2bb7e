//! Policy documents.
//!
//! A policy maps a peer's hardware model to a capability category, says which
//! sponsor categories may introduce which candidate categories, and lists the
//! data views each category may see. Documents are immutable and addressed by
//! the Blake3 hash of their canonical encoding.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use trustcircle_core::{from_cbor, to_cbor, Blake3Hash, CanonicalValue};

use crate::error::{PolicyError, Result};

/// Domain separator for policy content hashes.
pub const POLICY_HASH_DOMAIN: &[u8] = b"trustcircle-policy-v0:";

/// Maps model ids with a given prefix to a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub model_prefix: String,
    pub category: String,
}

/// A versioned, hashable rule set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDocument {
    pub version: u64,
    /// Claimed content hash; see [`PolicyDocument::verify_hash`].
    pub hash: Blake3Hash,
    /// Ordered prefix rules; the first match wins.
    pub model_to_category: Vec<CategoryRule>,
    /// Candidate category -> sponsor categories allowed to introduce it.
    pub introducers: BTreeMap<String, BTreeSet<String>>,
    /// Category -> views that category may access.
    pub views: BTreeMap<String, BTreeSet<String>>,
}

impl PolicyDocument {
    /// Start building a policy at the given version.
    pub fn builder(version: u64) -> PolicyBuilder {
        PolicyBuilder::new(version)
    }

    /// Hash of the canonical encoding (the `hash` field itself is not covered).
    pub fn compute_hash(&self) -> Blake3Hash {
        let mut buf = POLICY_HASH_DOMAIN.to_vec();
        buf.extend_from_slice(&self.canonical_bytes());
        Blake3Hash::hash(&buf)
    }

    /// Check the claimed hash against the content.
    pub fn verify_hash(&self) -> Result<()> {
        let computed = self.compute_hash();
        if computed != self.hash {
            return Err(PolicyError::HashMismatch {
                claimed: self.hash.to_hex(),
                computed: computed.to_hex(),
            });
        }
        Ok(())
    }

    /// Canonical encoding of the rules.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let set = |items: &BTreeSet<String>| CanonicalValue::text_array(items.iter().map(String::as_str));
        let table = |map: &BTreeMap<String, BTreeSet<String>>| {
            CanonicalValue::Map(
                map.iter()
                    .map(|(k, v)| (CanonicalValue::text(k.as_str()), set(v)))
                    .collect(),
            )
        };

        let rules = self
            .model_to_category
            .iter()
            .map(|r| CanonicalValue::text_array([r.model_prefix.as_str(), r.category.as_str()]))
            .collect();

        CanonicalValue::fields([
            (0, CanonicalValue::Unsigned(self.version)),
            (1, CanonicalValue::Array(rules)),
            (2, table(&self.introducers)),
            (3, table(&self.views)),
        ])
        .to_bytes()
    }

    /// Category of a hardware model: the first rule whose prefix matches.
    pub fn category_for_model(&self, model_id: &str) -> Option<&str> {
        self.model_to_category
            .iter()
            .find(|rule| model_id.starts_with(&rule.model_prefix))
            .map(|rule| rule.category.as_str())
    }

    /// Whether a sponsor of `sponsor_category` may introduce a candidate of
    /// `candidate_category`.
    pub fn can_introduce(&self, sponsor_category: &str, candidate_category: &str) -> bool {
        self.introducers
            .get(candidate_category)
            .is_some_and(|sponsors| sponsors.contains(sponsor_category))
    }

    /// Whether any category in this policy is granted `view`.
    pub fn defines_view(&self, view: &str) -> bool {
        self.views.values().any(|views| views.contains(view))
    }

    /// Whether a peer holding `capabilities` may access `view`.
    pub fn evaluate<'a>(
        &self,
        capabilities: impl IntoIterator<Item = &'a str>,
        view: &str,
    ) -> bool {
        capabilities.into_iter().any(|category| {
            self.views
                .get(category)
                .is_some_and(|views| views.contains(view))
        })
    }

    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(to_cbor(self)?)
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(from_cbor(bytes)?)
    }
}

/// Builder for [`PolicyDocument`]; `build` stamps the content hash.
#[derive(Debug, Clone)]
pub struct PolicyBuilder {
    version: u64,
    model_to_category: Vec<CategoryRule>,
    introducers: BTreeMap<String, BTreeSet<String>>,
    views: BTreeMap<String, BTreeSet<String>>,
}

impl PolicyBuilder {
    /// Start building at the given version.
    pub fn new(version: u64) -> Self {
        Self {
            version,
            model_to_category: Vec::new(),
            introducers: BTreeMap::new(),
            views: BTreeMap::new(),
        }
    }

    /// Append a model-prefix rule.
    pub fn category(mut self, model_prefix: impl Into<String>, category: impl Into<String>) -> Self {
        self.model_to_category.push(CategoryRule {
            model_prefix: model_prefix.into(),
            category: category.into(),
        });
        self
    }

    /// Allow `sponsor` category peers to introduce `candidate` category peers.
    pub fn introducer(mut self, candidate: impl Into<String>, sponsor: impl Into<String>) -> Self {
        self.introducers
            .entry(candidate.into())
            .or_default()
            .insert(sponsor.into());
        self
    }

    /// Grant `view` to `category`.
    pub fn view(mut self, category: impl Into<String>, view: impl Into<String>) -> Self {
        self.views
            .entry(category.into())
            .or_default()
            .insert(view.into());
        self
    }

    /// Finish, computing the content hash.
    pub fn build(self) -> PolicyDocument {
        let mut doc = PolicyDocument {
            version: self.version,
            hash: Blake3Hash::ZERO,
            model_to_category: self.model_to_category,
            introducers: self.introducers,
            views: self.views,
        };
        doc.hash = doc.compute_hash();
        doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PolicyDocument {
        PolicyDocument::builder(1)
            .category("Mac", "full")
            .category("iPhone", "full")
            .category("Watch", "limited")
            .introducer("full", "full")
            .introducer("limited", "full")
            .view("full", "passwords")
            .view("full", "wifi")
            .view("limited", "wifi")
            .build()
    }

    #[test]
    fn test_category_first_prefix_wins() {
        let doc = PolicyDocument::builder(1)
            .category("Mac", "a")
            .category("MacBook", "b")
            .build();
        assert_eq!(doc.category_for_model("MacBookPro18,1"), Some("a"));
        assert_eq!(doc.category_for_model("Toaster"), None);
    }

    #[test]
    fn test_can_introduce() {
        let doc = sample();
        assert!(doc.can_introduce("full", "limited"));
        assert!(!doc.can_introduce("limited", "full"));
        assert!(!doc.can_introduce("full", "unknown"));
    }

    #[test]
    fn test_evaluate() {
        let doc = sample();
        assert!(doc.evaluate(["full"], "passwords"));
        assert!(!doc.evaluate(["limited"], "passwords"));
        assert!(doc.evaluate(["limited", "full"], "passwords"));
        assert!(!doc.evaluate(std::iter::empty(), "wifi"));
    }

    #[test]
    fn test_defines_view() {
        let doc = sample();
        assert!(doc.defines_view("wifi"));
        assert!(!doc.defines_view("health"));
    }

    #[test]
    fn test_hash_covers_content() {
        let doc = sample();
        doc.verify_hash().unwrap();

        let mut tampered = doc.clone();
        tampered
            .views
            .entry("limited".into())
            .or_default()
            .insert("passwords".into());
        assert!(matches!(
            tampered.verify_hash(),
            Err(PolicyError::HashMismatch { .. })
        ));
    }

    #[test]
    fn test_bytes_roundtrip_preserves_hash() {
        let doc = sample();
        let decoded = PolicyDocument::from_bytes(&doc.to_bytes().unwrap()).unwrap();
        assert_eq!(doc, decoded);
        decoded.verify_hash().unwrap();
    }
}
