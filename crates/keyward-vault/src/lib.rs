//! Vault backup codec: the canonical binary container plus the
//! password-derived AES-GCM layer that wraps it for storage in C2.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use keyward_core::Vault;
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

mod container;

const NONCE_LEN: usize = 12;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VaultCodecError {
    #[error("incorrect password")]
    BadPassword,
    #[error("corrupt or truncated vault backup")]
    CorruptBackup,
}

fn derive_key(password: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.finalize().into()
}

/// Encrypt a [`Vault`] into the on-disk backup byte layout: a random
/// 12-byte nonce followed by the AES-256-GCM-sealed canonical container.
pub fn encrypt_vault_backup(password: &str, vault: &Vault) -> Vec<u8> {
    let key = derive_key(password);
    let cipher = Aes256Gcm::new_from_slice(&key).expect("key is always 32 bytes");

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let plaintext = container::encode(vault);
    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: &plaintext,
                aad: &[],
            },
        )
        .expect("in-memory AES-GCM seal does not fail");

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    out
}

/// Decrypt and parse a vault backup produced by [`encrypt_vault_backup`].
pub fn decrypt_vault_from_backup(password: &str, bytes: &[u8]) -> Result<Vault, VaultCodecError> {
    if bytes.len() < NONCE_LEN {
        return Err(VaultCodecError::CorruptBackup);
    }
    let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_LEN);

    let key = derive_key(password);
    let cipher = Aes256Gcm::new_from_slice(&key).expect("key is always 32 bytes");
    let nonce = Nonce::from_slice(nonce_bytes);

    let plaintext = cipher
        .decrypt(
            nonce,
            Payload {
                msg: ciphertext,
                aad: &[],
            },
        )
        .map_err(|_| VaultCodecError::BadPassword)?;

    container::decode(&plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyward_core::LibType;
    use std::collections::BTreeMap;

    fn sample_vault() -> Vault {
        let mut key_shares = BTreeMap::new();
        key_shares.insert("pub1".to_string(), "share1".to_string());
        Vault {
            name: "test vault".into(),
            public_key_ecdsa: "a".repeat(66),
            public_key_eddsa: "b".repeat(64),
            hex_chain_code: "c".repeat(64),
            local_party_id: "party-1".into(),
            signers: vec!["party-1".into(), "party-2".into()],
            key_shares,
            lib_type: LibType::Gg20,
            reshare_prefix: None,
        }
    }

    #[test]
    fn round_trip_law_holds_for_nonempty_password() {
        let vault = sample_vault();
        let backup = encrypt_vault_backup("correct horse battery staple", &vault);
        let decoded = decrypt_vault_from_backup("correct horse battery staple", &backup).unwrap();
        assert_eq!(decoded, vault);
    }

    #[test]
    fn wrong_password_fails_authentication() {
        let vault = sample_vault();
        let backup = encrypt_vault_backup("right-password", &vault);
        let err = decrypt_vault_from_backup("wrong-password", &backup).unwrap_err();
        assert_eq!(err, VaultCodecError::BadPassword);
    }

    #[test]
    fn truncated_backup_is_corrupt() {
        let vault = sample_vault();
        let backup = encrypt_vault_backup("pw", &vault);
        let truncated = &backup[..NONCE_LEN + 2];
        let err = decrypt_vault_from_backup("pw", truncated).unwrap_err();
        assert_eq!(err, VaultCodecError::BadPassword);
    }

    #[test]
    fn each_encryption_uses_a_fresh_nonce() {
        let vault = sample_vault();
        let a = encrypt_vault_backup("pw", &vault);
        let b = encrypt_vault_backup("pw", &vault);
        assert_ne!(a[..NONCE_LEN], b[..NONCE_LEN]);
    }

    #[test]
    fn backup_shorter_than_nonce_is_corrupt() {
        let err = decrypt_vault_from_backup("pw", &[1, 2, 3]).unwrap_err();
        assert_eq!(err, VaultCodecError::CorruptBackup);
    }
}
