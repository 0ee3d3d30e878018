//! Deterministic seed derivation for mission-scoped signal streams.
//!
//! Every mission folds its id into the configured scorer seed, and each
//! seed-sensitive scorer draws from its own HMAC-separated stream so that
//! adding a scorer never perturbs another scorer's flags.

use hmac::{Hmac, Mac};
use sha2::Sha256;

fn fnv1a64(bytes: &[u8]) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0100_0000_01b3;
    let mut hash = FNV_OFFSET;
    for b in bytes {
        hash = (hash ^ u64::from(*b)).wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Fold a mission id into the configured base seed.
#[must_use]
pub fn mission_seed(mission_id: &str, base_seed: u64) -> u64 {
    let mut buf = Vec::with_capacity(mission_id.len() + 18);
    buf.extend_from_slice(b"DETECTIVE-");
    buf.extend_from_slice(mission_id.trim().as_bytes());
    buf.extend_from_slice(&base_seed.to_le_bytes());
    fnv1a64(&buf)
}

/// Derive an independent stream seed for one scorer domain.
#[must_use]
pub fn derive_stream_seed(user_seed: u64, domain_tag: &[u8]) -> u64 {
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(&user_seed.to_le_bytes()) else {
        return fnv1a64(domain_tag) ^ user_seed;
    };
    mac.update(domain_tag);
    let digest = mac.finalize().into_bytes();
    let mut seed_bytes = [0u8; 8];
    seed_bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(seed_bytes)
}
