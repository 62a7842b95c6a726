//! Body encryption for outgoing envelopes. Two modes, selected per
//! [`crate::Messenger`] instance rather than toggled at call time:
//! legacy AES-256-CBC (PKCS7-padded, key used as-is) and AES-256-GCM
//! (key is SHA-256 of the raw key bytes, authenticated).
//!
//! `hex_encryption_key` is expected to decode to 32 bytes; this matches
//! every session key this service issues (the hex chain code length).

use aes::Aes256;
use aes_gcm::aead::{Aead, KeyInit as GcmKeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce as GcmNonce};
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

const CBC_IV_LEN: usize = 16;
const GCM_NONCE_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum CipherError {
    #[error("invalid hex encryption key: {0}")]
    InvalidHexKey(#[from] hex::FromHexError),
    #[error("encryption key must be 32 bytes, got {0}")]
    WrongKeyLength(usize),
    #[error("ciphertext too short")]
    Truncated,
    #[error("decryption failed")]
    DecryptFailed,
}

/// AES-256-CBC encrypt, random IV prepended to the ciphertext.
pub fn encrypt_cbc(plaintext: &[u8], hex_key: &str) -> Result<Vec<u8>, CipherError> {
    let key = decode_key(hex_key)?;

    let mut iv = [0u8; CBC_IV_LEN];
    rand::rngs::OsRng.fill_bytes(&mut iv);

    let ciphertext = Aes256CbcEnc::new(&key.into(), &iv.into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut out = Vec::with_capacity(CBC_IV_LEN + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// AES-256-CBC decrypt, expecting a 16-byte IV prefix as produced by
/// [`encrypt_cbc`].
pub fn decrypt_cbc(ciphertext: &[u8], hex_key: &str) -> Result<Vec<u8>, CipherError> {
    let key = decode_key(hex_key)?;
    if ciphertext.len() < CBC_IV_LEN {
        return Err(CipherError::Truncated);
    }
    let (iv, body) = ciphertext.split_at(CBC_IV_LEN);
    Aes256CbcDec::new(&key.into(), iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(body)
        .map_err(|_| CipherError::DecryptFailed)
}

/// AES-256-GCM encrypt with a SHA-256-derived key, random 12-byte nonce
/// prepended to the sealed ciphertext.
pub fn encrypt_gcm(plaintext: &[u8], hex_key: &str) -> Result<Vec<u8>, CipherError> {
    let raw_key = hex::decode(hex_key)?;
    let key = Sha256::digest(&raw_key);
    let cipher = Aes256Gcm::new_from_slice(&key).expect("sha256 output is always 32 bytes");

    let mut nonce_bytes = [0u8; GCM_NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = GcmNonce::from_slice(&nonce_bytes);

    let sealed = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad: &[],
            },
        )
        .map_err(|_| CipherError::DecryptFailed)?;

    let mut out = Vec::with_capacity(GCM_NONCE_LEN + sealed.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// AES-256-GCM decrypt as produced by [`encrypt_gcm`].
pub fn decrypt_gcm(ciphertext: &[u8], hex_key: &str) -> Result<Vec<u8>, CipherError> {
    if ciphertext.len() < GCM_NONCE_LEN {
        return Err(CipherError::Truncated);
    }
    let (nonce_bytes, sealed) = ciphertext.split_at(GCM_NONCE_LEN);

    let raw_key = hex::decode(hex_key)?;
    let key = Sha256::digest(&raw_key);
    let cipher = Aes256Gcm::new_from_slice(&key).expect("sha256 output is always 32 bytes");
    let nonce = GcmNonce::from_slice(nonce_bytes);

    cipher
        .decrypt(
            nonce,
            Payload {
                msg: sealed,
                aad: &[],
            },
        )
        .map_err(|_| CipherError::DecryptFailed)
}

fn decode_key(hex_key: &str) -> Result<[u8; 32], CipherError> {
    let bytes = hex::decode(hex_key)?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| CipherError::WrongKeyLength(len))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex_key() -> String {
        hex::encode([0x42u8; 32])
    }

    #[test]
    fn cbc_round_trips() {
        let key = hex_key();
        let ct = encrypt_cbc(b"hello relay", &key).unwrap();
        let pt = decrypt_cbc(&ct, &key).unwrap();
        assert_eq!(pt, b"hello relay");
    }

    #[test]
    fn cbc_nonce_varies_per_call() {
        let key = hex_key();
        let a = encrypt_cbc(b"same plaintext", &key).unwrap();
        let b = encrypt_cbc(b"same plaintext", &key).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn gcm_round_trips() {
        let key = hex_key();
        let ct = encrypt_gcm(b"hello relay", &key).unwrap();
        let pt = decrypt_gcm(&ct, &key).unwrap();
        assert_eq!(pt, b"hello relay");
    }

    #[test]
    fn gcm_deterministic_with_fixed_nonce_matches_known_vector() {
        // Mirrors the spec's fixed-nonce GCM vector: all-zero 12-byte nonce,
        // key = sha256(0x01 repeated 32 times), plaintext "abc" -> ciphertext
        // length is 3 bytes + 16-byte tag, prefixed with the 12-byte nonce.
        let key_bytes = [0x01u8; 32];
        let key = Sha256::digest(key_bytes);
        let cipher = Aes256Gcm::new_from_slice(&key).unwrap();
        let nonce = GcmNonce::from_slice(&[0u8; 12]);
        let sealed = cipher
            .encrypt(
                nonce,
                Payload {
                    msg: b"abc",
                    aad: &[],
                },
            )
            .unwrap();
        assert_eq!(sealed.len(), 3 + 16);
    }

    #[test]
    fn gcm_tamper_detected() {
        let key = hex_key();
        let mut ct = encrypt_gcm(b"hello relay", &key).unwrap();
        let last = ct.len() - 1;
        ct[last] ^= 0xFF;
        assert!(decrypt_gcm(&ct, &key).is_err());
    }

    #[test]
    fn wrong_key_length_rejected() {
        let err = encrypt_cbc(b"x", &hex::encode([0u8; 16])).unwrap_err();
        assert!(matches!(err, CipherError::WrongKeyLength(16)));
    }
}
