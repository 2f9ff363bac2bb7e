//! Registry of known policy documents, keyed by content hash.

use std::collections::BTreeMap;

use trustcircle_core::Blake3Hash;

use crate::document::PolicyDocument;
use crate::error::{PolicyError, Result};

/// Result of registering a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterResult {
    /// The policy was new.
    Inserted,
    /// An identical policy was already registered.
    AlreadyExists,
}

/// All policy documents known locally.
///
/// Lookups that miss never fall back to another document: a peer pointing at
/// an unregistered policy is denied.
#[derive(Debug, Clone, Default)]
pub struct PolicyRegistry {
    documents: BTreeMap<Blake3Hash, PolicyDocument>,
}

impl PolicyRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a document after checking its content hash.
    pub fn register(&mut self, document: PolicyDocument) -> Result<RegisterResult> {
        document.verify_hash()?;
        if self.documents.contains_key(&document.hash) {
            return Ok(RegisterResult::AlreadyExists);
        }
        tracing::debug!(
            version = document.version,
            hash = %document.hash.to_hex(),
            "registered policy"
        );
        self.documents.insert(document.hash, document);
        Ok(RegisterResult::Inserted)
    }

    /// Look up a document by hash.
    pub fn lookup(&self, hash: &Blake3Hash) -> Option<&PolicyDocument> {
        self.documents.get(hash)
    }

    /// Look up a document by hash, failing with `NotFound`.
    pub fn require(&self, hash: &Blake3Hash) -> Result<&PolicyDocument> {
        self.lookup(hash)
            .ok_or_else(|| PolicyError::NotFound(hash.to_hex()))
    }

    /// Every registered document, ordered by hash.
    pub fn documents(&self) -> impl Iterator<Item = &PolicyDocument> {
        self.documents.values()
    }

    /// The registered document with the highest version.
    ///
    /// Ties are broken by hash so the answer is deterministic.
    pub fn highest_version(&self) -> Option<&PolicyDocument> {
        self.documents
            .values()
            .max_by(|a, b| a.version.cmp(&b.version).then(a.hash.cmp(&b.hash)))
    }

    /// Whether any registered document defines `view`.
    pub fn defines_view(&self, view: &str) -> bool {
        self.documents.values().any(|doc| doc.defines_view(view))
    }

    /// Fail with `UnknownView` unless some registered document defines `view`.
    pub fn require_view(&self, view: &str) -> Result<()> {
        if self.defines_view(view) {
            Ok(())
        } else {
            Err(PolicyError::UnknownView(view.to_owned()))
        }
    }

    /// Evaluate `view` for a peer whose StableInfo references `hash`.
    ///
    /// A missing policy is a denial, never an error.
    pub fn evaluate<'a>(
        &self,
        hash: &Blake3Hash,
        capabilities: impl IntoIterator<Item = &'a str>,
        view: &str,
    ) -> bool {
        match self.lookup(hash) {
            Some(doc) => doc.evaluate(capabilities, view),
            None => {
                tracing::debug!(hash = %hash.to_hex(), view, "policy not registered, denying");
                false
            }
        }
    }

    /// Number of registered documents.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(version: u64, view: &str) -> PolicyDocument {
        PolicyDocument::builder(version)
            .category("", "any")
            .view("any", view)
            .build()
    }

    #[test]
    fn test_register_idempotent() {
        let mut registry = PolicyRegistry::new();
        let doc = policy(1, "wifi");

        assert_eq!(registry.register(doc.clone()).unwrap(), RegisterResult::Inserted);
        assert_eq!(
            registry.register(doc).unwrap(),
            RegisterResult::AlreadyExists
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_rejects_bad_hash() {
        let mut registry = PolicyRegistry::new();
        let mut doc = policy(1, "wifi");
        doc.hash = Blake3Hash::hash(b"lies");

        assert!(matches!(
            registry.register(doc),
            Err(PolicyError::HashMismatch { .. })
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_highest_version() {
        let mut registry = PolicyRegistry::new();
        registry.register(policy(1, "a")).unwrap();
        registry.register(policy(3, "b")).unwrap();
        registry.register(policy(2, "c")).unwrap();

        assert_eq!(registry.highest_version().unwrap().version, 3);
    }

    #[test]
    fn test_missing_policy_fails_closed() {
        let registry = PolicyRegistry::new();
        assert!(!registry.evaluate(&Blake3Hash::hash(b"x"), ["any"], "wifi"));
        assert!(matches!(
            registry.require(&Blake3Hash::ZERO),
            Err(PolicyError::NotFound(_))
        ));
    }

    #[test]
    fn test_unknown_view() {
        let mut registry = PolicyRegistry::new();
        let doc = policy(1, "wifi");
        let hash = doc.hash;
        registry.register(doc).unwrap();

        registry.require_view("wifi").unwrap();
        assert!(matches!(
            registry.require_view("health"),
            Err(PolicyError::UnknownView(_))
        ));
        assert!(registry.evaluate(&hash, ["any"], "wifi"));
    }
}
