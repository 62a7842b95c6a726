//! Key-naming and TTL constants shared by the admission surface and the
//! worker, so both sides agree on exactly what string goes in C1.

use std::time::Duration;

pub fn verification_code_key(public_key_ecdsa: &str) -> String {
    format!("verification_code_{public_key_ecdsa}")
}

pub fn resend_cooldown_key(public_key_ecdsa: &str) -> String {
    format!("resend_{public_key_ecdsa}")
}

/// Session dedup TTL for keygen/reshare/migrate tasks.
pub const SESSION_TTL_PROVISIONING: Duration = Duration::from_secs(5 * 60);

/// Session dedup TTL for keysign tasks.
pub const SESSION_TTL_SIGNING: Duration = Duration::from_secs(30 * 60);

/// Verification code lifetime before it is consumed.
pub const VERIFICATION_CODE_TTL: Duration = Duration::from_secs(60 * 60);

/// Verification code lifetime after successful consumption.
pub const VERIFICATION_CODE_TTL_AFTER_CONSUME: Duration = Duration::from_secs(5 * 60);

/// Minimum spacing between `/vault/resend` calls for the same pubkey.
pub const RESEND_COOLDOWN_TTL: Duration = Duration::from_secs(3 * 60);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_shapes_match_contract() {
        assert_eq!(verification_code_key("abc"), "verification_code_abc");
        assert_eq!(resend_cooldown_key("abc"), "resend_abc");
    }
}
