use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which threshold-signature family produced a vault's key shares.
///
/// Immutable post-creation: migration always produces a new [`Vault`] of
/// [`LibType::Dkls`] rather than mutating an existing one in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LibType {
    Gg20,
    Dkls,
}

/// The persisted bundle of public keys, chain code, party identity and key
/// shares for one logical wallet.
///
/// `public_key_ecdsa` is the canonical identity: the backup filename is
/// always `<public_key_ecdsa>.bak`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault {
    pub name: String,
    pub public_key_ecdsa: String,
    pub public_key_eddsa: String,
    pub hex_chain_code: String,
    pub local_party_id: String,
    pub signers: Vec<String>,
    /// `public_key -> serialized_share`.
    pub key_shares: BTreeMap<String, String>,
    pub lib_type: LibType,
    pub reshare_prefix: Option<String>,
}

impl Vault {
    /// Construct the reshare/keygen skeleton used when no prior backup
    /// exists for this identity: signers and reshare prefix carried over
    /// from the request, public keys and key shares left empty.
    pub fn skeleton(
        name: String,
        hex_chain_code: String,
        local_party_id: String,
        old_parties: Vec<String>,
        old_reshare_prefix: Option<String>,
        lib_type: LibType,
    ) -> Self {
        Self {
            name,
            public_key_ecdsa: String::new(),
            public_key_eddsa: String::new(),
            hex_chain_code,
            local_party_id,
            signers: old_parties,
            key_shares: BTreeMap::new(),
            lib_type,
            reshare_prefix: old_reshare_prefix,
        }
    }

    /// The blob store filename for this vault's identity.
    pub fn backup_filename(&self) -> String {
        format!("{}.bak", self.public_key_ecdsa)
    }

    /// Look up the serialized key share for an exact public key match.
    pub fn key_share(&self, public_key: &str) -> Option<&str> {
        self.key_shares.get(public_key).map(String::as_str)
    }

    /// A fully provisioned vault has at least one key share and a non-empty
    /// ECDSA identity.
    pub fn is_provisioned(&self) -> bool {
        !self.public_key_ecdsa.is_empty() && !self.key_shares.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vault {
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
    fn backup_filename_uses_ecdsa_identity() {
        let v = sample();
        assert_eq!(v.backup_filename(), format!("{}.bak", "a".repeat(66)));
    }

    #[test]
    fn key_share_lookup_is_exact_match() {
        let v = sample();
        assert_eq!(v.key_share("pub1"), Some("share1"));
        assert_eq!(v.key_share("pub2"), None);
    }

    #[test]
    fn skeleton_is_not_provisioned() {
        let v = Vault::skeleton(
            "new".into(),
            "cc".into(),
            "party-1".into(),
            vec!["party-1".into()],
            Some("prefix".into()),
            LibType::Dkls,
        );
        assert!(!v.is_provisioned());
        assert_eq!(v.reshare_prefix.as_deref(), Some("prefix"));
    }

    #[test]
    fn sample_vault_is_provisioned() {
        assert!(sample().is_provisioned());
    }

    #[test]
    fn serde_round_trip_preserves_fields() {
        let v = sample();
        let json = serde_json::to_string(&v).unwrap();
        let back: Vault = serde_json::from_str(&json).unwrap();
        assert_eq!(v, back);
    }
}
