//! Deterministic cache keys derived from normalized unit specs.

use crate::types::UnitSpec;

/// A deterministic identifier for a unit specification.
///
/// Two specs with the same name, version, and options always produce the
/// same fingerprint, across processes and regardless of the order options
/// were added in. Used as the cache key and the entry file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of a spec.
    pub fn of(spec: &UnitSpec) -> Self {
        let mut hasher = blake3::Hasher::new();

        // Field separators prevent ambiguity between adjacent values
        // ("ab"+"c" vs "a"+"bc"); options iterate in BTreeMap key order.
        hasher.update(spec.name.as_bytes());
        hasher.update(b"\x00");
        if let Some(version) = &spec.version {
            hasher.update(version.as_bytes());
        }
        hasher.update(b"\x00");
        for (key, value) in &spec.options {
            hasher.update(key.as_bytes());
            hasher.update(b"\x01");
            hasher.update(value.as_bytes());
            hasher.update(b"\x01");
        }

        Self(hasher.finalize().to_hex().to_string())
    }

    /// Reconstruct a fingerprint from its hex form (e.g. a cache file name).
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Hex representation, safe for use as a file name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
