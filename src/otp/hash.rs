//! Passcode digests. Only hashes are stored or compared; the raw code never
//! touches the store or the logs.

use sha2::{Digest, Sha256};

/// Hash a passcode for storage-safe comparison.
///
/// The digest covers the decimal string form, so whatever the client typed can
/// be hashed the same way on verification.
#[must_use]
pub fn hash_code(code: u32) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(code.to_string().as_bytes());
    hasher.finalize().to_vec()
}

/// Compare two digests, touching every byte regardless of where they diverge.
#[must_use]
pub fn digest_matches(candidate: &[u8], stored: &[u8]) -> bool {
    if candidate.len() != stored.len() {
        return false;
    }
    candidate
        .iter()
        .zip(stored)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn hash_code_is_deterministic() {
        assert_eq!(hash_code(123_456), hash_code(123_456));
    }

    #[test]
    fn hash_code_produces_256_bit_digests() {
        assert_eq!(hash_code(100_000).len(), 32);
    }

    #[test]
    fn neighboring_codes_do_not_collide() {
        let digests: HashSet<Vec<u8>> = (100_000..110_000).map(hash_code).collect();
        assert_eq!(digests.len(), 10_000);
    }

    #[test]
    fn digest_matches_accepts_equal() {
        let digest = hash_code(654_321);
        assert!(digest_matches(&digest, &digest.clone()));
    }

    #[test]
    fn digest_matches_rejects_different() {
        assert!(!digest_matches(&hash_code(111_111), &hash_code(111_112)));
    }

    #[test]
    fn digest_matches_rejects_length_mismatch() {
        let digest = hash_code(222_222);
        assert!(!digest_matches(&digest[..16], &digest));
    }
}
