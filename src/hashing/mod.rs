//! BLAKE3-based hashing primitives shared by [`crate::fingerprint`] and [`crate::tenant`].

use blake3::Hasher;

/// Computes a 64-bit hash of the input data using BLAKE3, truncated from 256 bits.
///
/// # Truncation Rationale
///
/// This function takes the first 8 bytes (64 bits) of a BLAKE3 hash. This truncation
/// is acceptable for the following use cases:
///
/// - **Cache keys**: Fast lookups in hash maps and tiered caches
/// - **Identifiers**: Tenant IDs, context hashes, and content fingerprints
/// - **Deduplication**: Detecting likely-duplicate entries before expensive operations
///
/// # Collision Probability
///
/// With 64 bits of entropy, the birthday paradox gives us the following collision probabilities:
///
/// | Number of Items | Collision Probability |
/// |-----------------|----------------------|
/// | 1 million       | ~0.00003% (negligible) |
/// | 10 million      | ~0.003% (very low) |
/// | 100 million     | ~0.3% (low) |
/// | 1 billion       | ~3% (noticeable) |
///
/// For practical cache sizes (millions of entries), the collision probability is negligible.
#[inline]
pub fn hash_to_u64(data: &[u8]) -> u64 {
    let hash = blake3::hash(data);
    let bytes: [u8; 8] = hash.as_bytes()[0..8]
        .try_into()
        .expect("BLAKE3 always produces at least 8 bytes");
    u64::from_le_bytes(bytes)
}

/// Hashes a `(role, plan)` pair with an explicit separator to avoid ambiguity
/// between e.g. `("ab", "cd")` and `("abc", "d")`.
#[inline]
pub fn hash_context(role: &str, plan: &str) -> u64 {
    let mut hasher = Hasher::new();
    hasher.update(role.as_bytes());
    hasher.update(b"|");
    hasher.update(plan.as_bytes());

    let hash = hasher.finalize();
    let bytes: [u8; 8] = hash.as_bytes()[0..8]
        .try_into()
        .expect("BLAKE3 always produces at least 8 bytes");
    u64::from_le_bytes(bytes)
}

/// Hashes a tenant identifier into a compact, stable `u64`.
#[inline]
pub fn hash_tenant_id(tenant: &str) -> u64 {
    hash_to_u64(tenant.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_hash_to_u64_determinism() {
        let data = b"test-tenant-id-12345";

        let hash1 = hash_to_u64(data);
        let hash2 = hash_to_u64(data);

        assert_eq!(hash1, hash2);
    }

    #[test]
    fn test_hash_to_u64_uniqueness() {
        let inputs = [
            b"tenant-001".as_slice(),
            b"tenant-002".as_slice(),
            b"TENANT-001".as_slice(),
            b"tenant-001 ".as_slice(),
        ];

        let hashes: Vec<_> = inputs.iter().map(|i| hash_to_u64(i)).collect();
        let unique_hashes: HashSet<_> = hashes.iter().collect();

        assert_eq!(unique_hashes.len(), inputs.len());
    }

    #[test]
    fn test_hash_context_determinism() {
        let hash1 = hash_context("admin", "enterprise");
        let hash2 = hash_context("admin", "enterprise");

        assert_eq!(hash1, hash2);
    }

    #[test]
    fn test_hash_context_separator_prevents_ambiguity() {
        let hash1 = hash_context("ab", "cd");
        let hash2 = hash_context("abc", "d");
        let hash3 = hash_context("a", "bcd");

        assert_ne!(hash1, hash2);
        assert_ne!(hash1, hash3);
        assert_ne!(hash2, hash3);
    }

    #[test]
    fn test_hash_tenant_id_consistency() {
        let tenant = "acme-corp-production";

        let id1 = hash_tenant_id(tenant);
        let id2 = hash_tenant_id(tenant);

        assert_eq!(id1, id2);
    }

    #[test]
    fn test_hash_tenant_id_equals_hash_to_u64() {
        let tenant = "test-tenant";
        assert_eq!(hash_tenant_id(tenant), hash_to_u64(tenant.as_bytes()));
    }
}
