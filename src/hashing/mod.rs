//! BLAKE3-based hashing helpers.
//!
//! Full 32-byte hashes identify content; 64-bit truncations key caches and
//! the deduplication window. Truncation to 64 bits is acceptable here: a
//! collision costs a cache miss or a skipped dedup, never data corruption.
//! The lexical embedder uses a separate FNV-1a 32-bit token hash so that
//! token bucketing stays stable across releases.

use blake3::Hasher;

/// Computes the full 32-byte BLAKE3 hash of a memory's content.
#[inline]
pub fn hash_content(content: &str) -> [u8; 32] {
    *blake3::hash(content.as_bytes()).as_bytes()
}

/// Computes a 64-bit BLAKE3 hash, truncated from 256 bits.
#[inline]
pub fn hash_to_u64(data: &[u8]) -> u64 {
    let hash = blake3::hash(data);
    let bytes: [u8; 8] = hash.as_bytes()[0..8]
        .try_into()
        .expect("BLAKE3 always produces at least 8 bytes");
    u64::from_le_bytes(bytes)
}

/// Hashes the identifying fields of a remember request for deduplication.
///
/// Tags must be pre-sorted so that tag order never affects the hash.
#[inline]
pub fn hash_dedup_key(
    tenant_id: &str,
    agent_id: &str,
    content: &str,
    kind: &str,
    sorted_tags: &[String],
) -> u64 {
    let mut hasher = Hasher::new();
    hasher.update(tenant_id.as_bytes());
    hasher.update(b"|");
    hasher.update(agent_id.as_bytes());
    hasher.update(b"|");
    hasher.update(content.as_bytes());
    hasher.update(b"|");
    hasher.update(kind.as_bytes());
    for tag in sorted_tags {
        hasher.update(b"|");
        hasher.update(tag.as_bytes());
    }
    let hash = hasher.finalize();
    let bytes: [u8; 8] = hash.as_bytes()[0..8]
        .try_into()
        .expect("BLAKE3 always produces at least 8 bytes");
    u64::from_le_bytes(bytes)
}

/// Hashes arbitrary serialized query parameters into a cache-key suffix.
#[inline]
pub fn hash_params(params: &[u8]) -> u64 {
    hash_to_u64(params)
}

/// Stable FNV-1a 32-bit hash for lexical token bucketing.
///
/// Deterministic across platforms and releases; the lexical tier's vectors
/// depend on this staying fixed.
#[inline]
pub fn hash_token32(token: &str) -> u32 {
    const FNV_OFFSET: u32 = 0x811c_9dc5;
    const FNV_PRIME: u32 = 0x0100_0193;

    let mut hash = FNV_OFFSET;
    for byte in token.as_bytes() {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_hash_content_determinism() {
        let content = "User prefers dark mode";
        assert_eq!(hash_content(content), hash_content(content));
        assert_ne!(hash_content(content), hash_content("User prefers light mode"));
    }

    #[test]
    fn test_hash_to_u64_distribution() {
        let mut seen = HashSet::new();
        for i in 0..1000 {
            seen.insert(hash_to_u64(format!("item-{}", i).as_bytes()));
        }
        assert_eq!(seen.len(), 1000);
    }

    #[test]
    fn test_dedup_key_tag_order_independent_when_sorted() {
        let tags = vec!["alpha".to_string(), "beta".to_string()];
        let a = hash_dedup_key("t1", "a1", "content", "fact", &tags);
        let b = hash_dedup_key("t1", "a1", "content", "fact", &tags);
        assert_eq!(a, b);
    }

    #[test]
    fn test_dedup_key_scope_sensitivity() {
        let tags = vec![];
        let a = hash_dedup_key("t1", "a1", "content", "fact", &tags);
        let b = hash_dedup_key("t2", "a1", "content", "fact", &tags);
        assert_ne!(a, b);
    }

    #[test]
    fn test_token32_known_values() {
        // FNV-1a reference value for the empty string is the offset basis.
        assert_eq!(hash_token32(""), 0x811c_9dc5);
        assert_eq!(hash_token32("a"), hash_token32("a"));
        assert_ne!(hash_token32("a"), hash_token32("b"));
    }
}
