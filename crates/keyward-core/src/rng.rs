//! Explicit RNG injection, replacing the original's per-call
//! `rand.New(rand.NewSource(time.Now().UnixNano()))` global-ish seeding.

use rand::RngCore;

/// A source of randomness handed to constructors instead of reached for
/// globally. Production code uses [`OsRngSource`]; tests can substitute a
/// deterministic source.
pub trait RngSource: Send + Sync {
    /// A decimal verification code in `1000..=9999`.
    fn verification_code(&self) -> u16;

    /// `len` cryptographically random bytes (used for IVs/nonces by callers
    /// that don't already pull their own RNG from a crypto crate).
    fn fill_bytes(&self, buf: &mut [u8]);
}

/// The production RNG source, backed by the operating system's CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRngSource;

impl RngSource for OsRngSource {
    fn verification_code(&self) -> u16 {
        let mut rng = rand::rngs::OsRng;
        1000 + (rng.next_u32() % 9000) as u16
    }

    fn fill_bytes(&self, buf: &mut [u8]) {
        rand::rngs::OsRng.fill_bytes(buf);
    }
}
