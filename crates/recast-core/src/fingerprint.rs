//! Signature fingerprinting for dependency invalidation
//!
//! A unit's signature checksum covers only its externally visible shape (the
//! public signature lines reported by the structural peek). Body-only edits
//! keep the checksum stable, so an invalidation collaborator can skip
//! recompiling dependents.

use std::fmt;

use sha2::{Digest, Sha256};

/// Content-derived checksum over a unit's public signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignatureChecksum(u64);

impl SignatureChecksum {
    /// Checksum over signature lines, independent of their order
    pub fn of<S: AsRef<str>>(signatures: &[S]) -> Self {
        let mut sorted: Vec<&str> = signatures.iter().map(AsRef::as_ref).collect();
        sorted.sort_unstable();

        let mut hasher = Sha256::new();
        for signature in sorted {
            hasher.update(signature.as_bytes());
            hasher.update(b"\n");
        }
        let digest = hasher.finalize();

        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        Self(u64::from_be_bytes(prefix))
    }

    pub fn from_raw(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SignatureChecksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Checksum transition recorded by one enhancement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureChange {
    pub previous: Option<SignatureChecksum>,
    pub current: SignatureChecksum,
}

impl SignatureChange {
    /// True when dependents may need recompiling
    pub fn changed(&self) -> bool {
        self.previous != Some(self.current)
    }
}
