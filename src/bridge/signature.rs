// Copyright 2026 The Causeway Project
// SPDX-License-Identifier: Apache-2.0

// Thinking-block signatures.
//
// A signature is a truncated SHA-256 of the block's full text plus its
// length and a timestamp. It is a provenance tag, not an integrity
// proof — callers must not rely on it for authentication.

use sha2::{Digest, Sha256};

/// Number of hex characters kept from the digest.
const HASH_PREFIX_LEN: usize = 16;

/// Provenance tag attached when a thinking block closes.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockSignature {
    /// Truncated lowercase hex SHA-256 of the block content.
    pub hash: String,
    /// Byte length of the signed content.
    pub length: usize,
    /// Unix timestamp (seconds) at signing time.
    pub timestamp: i64,
}

/// Sign the full accumulated text of a closed block.
pub fn sign_block(content: &str) -> BlockSignature {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let digest = hasher.finalize();

    let mut hash = format!("{digest:x}");
    hash.truncate(HASH_PREFIX_LEN);

    BlockSignature {
        hash,
        length: content.len(),
        timestamp: chrono::Utc::now().timestamp(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_deterministic_over_content() {
        let a = sign_block("Let me think");
        let b = sign_block("Let me think");
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.length, 12);
        assert_eq!(a.hash.len(), HASH_PREFIX_LEN);
    }

    #[test]
    fn different_content_different_hash() {
        assert_ne!(sign_block("a").hash, sign_block("b").hash);
    }

    #[test]
    fn empty_content_signs_cleanly() {
        let sig = sign_block("");
        assert_eq!(sig.length, 0);
        assert_eq!(sig.hash.len(), HASH_PREFIX_LEN);
    }
}
