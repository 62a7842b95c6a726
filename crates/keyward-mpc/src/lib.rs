//! The MPC engine trait boundary: four operations (keygen, keysign,
//! reshare, migrate) each driver implements over a session, the local
//! party's state, and a relay messenger for round exchange.
//!
//! The concrete GG20 and DKLS threshold-signature protocols are opaque
//! per the product's scope — this crate provides the trait boundary, the
//! round-exchange scaffolding through [`keyward_relay::Messenger`], and a
//! conformant in-process reference driver suitable for integration tests,
//! not a production threshold-cryptography implementation.

use std::collections::BTreeMap;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use keyward_core::{LibType, Vault};
use keyward_relay::{Messenger, RelayError};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum MpcError {
    #[error("session requires at least one peer")]
    NoPeers,
    #[error("migrate requires a GG20 source vault, got {0:?}")]
    WrongLibType(LibType),
    #[error(transparent)]
    Relay(#[from] RelayError),
}

pub struct KeygenContext<'a> {
    pub session_id: &'a str,
    pub local_party_id: &'a str,
    pub peers: &'a [String],
    pub hex_chain_code: &'a str,
    pub messenger: Option<&'a mut Messenger>,
}

#[derive(Debug)]
pub struct KeygenOutput {
    pub key_share: String,
    pub public_key_ecdsa: String,
    pub public_key_eddsa: String,
}

pub struct KeysignContext<'a> {
    pub vault: &'a Vault,
    pub messages: &'a [String],
    pub derive_path: &'a str,
    pub is_ecdsa: bool,
    pub messenger: Option<&'a mut Messenger>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub message: String,
    pub signature: String,
}

pub struct ReshareContext<'a> {
    pub session_id: &'a str,
    pub local_party_id: &'a str,
    /// The vault being reshared, if this identity was already provisioned.
    pub current_vault: Option<&'a Vault>,
    /// The skeleton built by the worker when no current vault exists yet.
    pub skeleton: Option<&'a Vault>,
    pub new_committee: &'a [String],
    pub messenger: Option<&'a mut Messenger>,
}

pub struct MigrateContext<'a> {
    pub gg20_vault: &'a Vault,
    pub messenger: Option<&'a mut Messenger>,
}

/// The operations every threshold-signature driver (GG20, DKLS) provides.
#[async_trait]
pub trait MpcEngine: Send + Sync {
    fn lib_type(&self) -> LibType;

    async fn keygen(&self, ctx: KeygenContext<'_>) -> Result<KeygenOutput, MpcError>;

    async fn keysign(&self, ctx: KeysignContext<'_>) -> Result<Vec<Signature>, MpcError>;

    async fn reshare(&self, ctx: ReshareContext<'_>) -> Result<Vault, MpcError>;

    /// Only meaningful on the DKLS driver; GG20 vaults are never the
    /// *target* of a migration.
    async fn migrate(&self, ctx: MigrateContext<'_>) -> Result<Vault, MpcError>;
}

/// Select the reference driver for `lib_type`.
pub fn engine_for(lib_type: LibType) -> Box<dyn MpcEngine> {
    match lib_type {
        LibType::Gg20 => Box::new(ReferenceEngine { lib_type }),
        LibType::Dkls => Box::new(ReferenceEngine { lib_type }),
    }
}

async fn announce_round(
    messenger: Option<&mut Messenger>,
    from: &str,
    phase: &str,
) -> Result<(), MpcError> {
    if let Some(messenger) = messenger {
        messenger.send(from, "ALL", phase).await?;
    }
    Ok(())
}

fn derive(session_id: &str, chain_code: &str, label: &str) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(chain_code.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(session_id.as_bytes());
    mac.update(label.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

/// A conformant reference driver: it exercises the same session/messenger
/// plumbing a real GG20/DKLS driver would, deriving its outputs
/// deterministically from session and chain-code material rather than
/// running an actual threshold protocol.
struct ReferenceEngine {
    lib_type: LibType,
}

#[async_trait]
impl MpcEngine for ReferenceEngine {
    fn lib_type(&self) -> LibType {
        self.lib_type
    }

    async fn keygen(&self, ctx: KeygenContext<'_>) -> Result<KeygenOutput, MpcError> {
        if ctx.peers.is_empty() {
            return Err(MpcError::NoPeers);
        }
        announce_round(ctx.messenger, ctx.local_party_id, "keygen_round1").await?;

        let share = derive(ctx.session_id, ctx.hex_chain_code, "share");
        let ecdsa = derive(ctx.session_id, ctx.hex_chain_code, "ecdsa_pub");
        let eddsa = derive(ctx.session_id, ctx.hex_chain_code, "eddsa_pub");

        Ok(KeygenOutput {
            key_share: hex::encode(share),
            public_key_ecdsa: format!("02{}", &hex::encode(&ecdsa)[..64]),
            public_key_eddsa: hex::encode(&eddsa)[..64].to_string(),
        })
    }

    async fn keysign(&self, ctx: KeysignContext<'_>) -> Result<Vec<Signature>, MpcError> {
        if ctx.vault.signers.is_empty() {
            return Err(MpcError::NoPeers);
        }
        announce_round(ctx.messenger, &ctx.vault.local_party_id, "keysign_round1").await?;

        let scheme_tag = if ctx.is_ecdsa { "ecdsa" } else { "eddsa" };
        Ok(ctx
            .messages
            .iter()
            .map(|message| {
                let sig = derive(
                    message,
                    &ctx.vault.hex_chain_code,
                    &format!("{scheme_tag}:{}", ctx.derive_path),
                );
                Signature {
                    message: message.clone(),
                    signature: hex::encode(sig),
                }
            })
            .collect())
    }

    async fn reshare(&self, ctx: ReshareContext<'_>) -> Result<Vault, MpcError> {
        if ctx.new_committee.is_empty() {
            return Err(MpcError::NoPeers);
        }
        announce_round(ctx.messenger, ctx.local_party_id, "reshare_round1").await?;

        let base = ctx
            .current_vault
            .or(ctx.skeleton)
            .cloned()
            .unwrap_or_else(|| {
                Vault::skeleton(
                    String::new(),
                    String::new(),
                    ctx.local_party_id.to_string(),
                    ctx.new_committee.to_vec(),
                    None,
                    self.lib_type,
                )
            });

        let mut key_shares = BTreeMap::new();
        for (old_pub, _) in &base.key_shares {
            let share = derive(ctx.session_id, &base.hex_chain_code, old_pub);
            key_shares.insert(old_pub.clone(), hex::encode(share));
        }

        Ok(Vault {
            name: base.name,
            public_key_ecdsa: base.public_key_ecdsa,
            public_key_eddsa: base.public_key_eddsa,
            hex_chain_code: base.hex_chain_code,
            local_party_id: ctx.local_party_id.to_string(),
            signers: ctx.new_committee.to_vec(),
            key_shares: if key_shares.is_empty() {
                base.key_shares
            } else {
                key_shares
            },
            lib_type: self.lib_type,
            reshare_prefix: base.reshare_prefix,
        })
    }

    async fn migrate(&self, ctx: MigrateContext<'_>) -> Result<Vault, MpcError> {
        if ctx.gg20_vault.lib_type != LibType::Gg20 {
            return Err(MpcError::WrongLibType(ctx.gg20_vault.lib_type));
        }
        announce_round(ctx.messenger, &ctx.gg20_vault.local_party_id, "migrate_round1").await?;

        let mut key_shares = BTreeMap::new();
        for (pubkey, _old_share) in &ctx.gg20_vault.key_shares {
            let share = derive(pubkey, &ctx.gg20_vault.hex_chain_code, "dkls_migrated");
            key_shares.insert(pubkey.clone(), hex::encode(share));
        }

        Ok(Vault {
            name: ctx.gg20_vault.name.clone(),
            public_key_ecdsa: ctx.gg20_vault.public_key_ecdsa.clone(),
            public_key_eddsa: ctx.gg20_vault.public_key_eddsa.clone(),
            hex_chain_code: ctx.gg20_vault.hex_chain_code.clone(),
            local_party_id: ctx.gg20_vault.local_party_id.clone(),
            signers: ctx.gg20_vault.signers.clone(),
            key_shares,
            lib_type: LibType::Dkls,
            reshare_prefix: ctx.gg20_vault.reshare_prefix.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_vault() -> Vault {
        let mut key_shares = BTreeMap::new();
        key_shares.insert("pub1".to_string(), "share1".to_string());
        Vault {
            name: "v".into(),
            public_key_ecdsa: "a".repeat(66),
            public_key_eddsa: "b".repeat(64),
            hex_chain_code: "cc".into(),
            local_party_id: "party-1".into(),
            signers: vec!["party-1".into(), "party-2".into()],
            key_shares,
            lib_type: LibType::Gg20,
            reshare_prefix: None,
        }
    }

    #[tokio::test]
    async fn keygen_is_deterministic_for_same_session_and_chain_code() {
        let engine = engine_for(LibType::Gg20);
        let peers = vec!["party-1".to_string(), "party-2".to_string()];
        let out_a = engine
            .keygen(KeygenContext {
                session_id: "s1",
                local_party_id: "party-1",
                peers: &peers,
                hex_chain_code: "cc",
                messenger: None,
            })
            .await
            .unwrap();
        let out_b = engine
            .keygen(KeygenContext {
                session_id: "s1",
                local_party_id: "party-1",
                peers: &peers,
                hex_chain_code: "cc",
                messenger: None,
            })
            .await
            .unwrap();
        assert_eq!(out_a.key_share, out_b.key_share);
        assert_eq!(out_a.public_key_ecdsa.len(), 66);
        assert_eq!(out_a.public_key_eddsa.len(), 64);
    }

    #[tokio::test]
    async fn keygen_rejects_empty_peer_list() {
        let engine = engine_for(LibType::Dkls);
        let err = engine
            .keygen(KeygenContext {
                session_id: "s1",
                local_party_id: "party-1",
                peers: &[],
                hex_chain_code: "cc",
                messenger: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, MpcError::NoPeers));
    }

    #[tokio::test]
    async fn keysign_produces_one_signature_per_message() {
        let engine = engine_for(LibType::Gg20);
        let vault = sample_vault();
        let messages = vec!["msg1".to_string(), "msg2".to_string()];
        let sigs = engine
            .keysign(KeysignContext {
                vault: &vault,
                messages: &messages,
                derive_path: "m/44/0",
                is_ecdsa: true,
                messenger: None,
            })
            .await
            .unwrap();
        assert_eq!(sigs.len(), 2);
        assert_ne!(sigs[0].signature, sigs[1].signature);
    }

    #[tokio::test]
    async fn migrate_requires_gg20_source() {
        let engine = engine_for(LibType::Dkls);
        let mut vault = sample_vault();
        vault.lib_type = LibType::Dkls;
        let err = engine
            .migrate(MigrateContext {
                gg20_vault: &vault,
                messenger: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, MpcError::WrongLibType(LibType::Dkls)));
    }

    #[tokio::test]
    async fn migrate_preserves_public_key_identity() {
        let engine = engine_for(LibType::Dkls);
        let vault = sample_vault();
        let migrated = engine
            .migrate(MigrateContext {
                gg20_vault: &vault,
                messenger: None,
            })
            .await
            .unwrap();
        assert_eq!(migrated.public_key_ecdsa, vault.public_key_ecdsa);
        assert_eq!(migrated.lib_type, LibType::Dkls);
    }

    #[tokio::test]
    async fn reshare_without_current_vault_builds_from_skeleton() {
        let engine = engine_for(LibType::Gg20);
        let skeleton = Vault::skeleton(
            "new".into(),
            "cc".into(),
            "party-1".into(),
            vec!["party-1".into()],
            Some("prefix".into()),
            LibType::Gg20,
        );
        let committee = vec!["party-1".to_string(), "party-3".to_string()];
        let reshared = engine
            .reshare(ReshareContext {
                session_id: "s1",
                local_party_id: "party-1",
                current_vault: None,
                skeleton: Some(&skeleton),
                new_committee: &committee,
                messenger: None,
            })
            .await
            .unwrap();
        assert_eq!(reshared.signers, committee);
        assert_eq!(reshared.reshare_prefix.as_deref(), Some("prefix"));
    }
}
