//! Hashing for manifest identity.
//!
//! Two builds from the same recipe and configuration must be
//! indistinguishable; the manifest hash is the cheap witness for that. It is
//! a truncated SHA-256 over the canonical JSON serialization, so any change
//! to a pin, a package list or an environment declaration changes the hash.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Length of the truncated hash used for display and report identity.
const OBJ_HASH_PREFIX_LEN: usize = 20;

/// A content hash identifying a manifest or step definition.
///
/// The hash is a 20-character truncated SHA-256 of the JSON-serialized
/// value, lowercase hexadecimal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectHash(pub String);

impl std::fmt::Display for ObjectHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

pub trait Hashable: Serialize {
  fn compute_hash(&self) -> Result<ObjectHash, serde_json::Error> {
    let serialized = serde_json::to_string(self)?;
    let mut hasher = Sha256::new();
    hasher.update(serialized.as_bytes());
    let full = format!("{:x}", hasher.finalize());
    Ok(ObjectHash(full[..OBJ_HASH_PREFIX_LEN].to_string()))
  }
}
