//! Content hashing for stored generation results

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// A SHA-256 hash of a stored result object.
///
/// Archived meshes carry their hash in the job record so a worker or the
/// dashboard can verify what it downloads against what the pipeline stored.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Compute a hash from bytes
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Get the hash as a prefixed hex string (e.g., "sha256:abcdef...")
    pub fn to_prefixed_hex(&self) -> String {
        format!("sha256:{}", self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_bytes_same_hash() {
        assert_eq!(
            ContentHash::from_bytes(b"glTF"),
            ContentHash::from_bytes(b"glTF")
        );
        assert_ne!(
            ContentHash::from_bytes(b"glTF"),
            ContentHash::from_bytes(b"glTf")
        );
    }

    #[test]
    fn test_prefixed_hex_form() {
        let h = ContentHash::from_bytes(b"mesh bytes");
        let prefixed = h.to_prefixed_hex();
        assert!(prefixed.starts_with("sha256:"));
        assert_eq!(prefixed.len(), 7 + 64);
        assert!(prefixed[7..].chars().all(|c| c.is_ascii_hexdigit()));
        assert!(prefixed.ends_with(&h.to_hex()));
    }
}
