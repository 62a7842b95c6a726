//! Bridges a vault backup (or a fresh in-memory scratch pad) to the shape
//! the MPC engine expects while a protocol run is in progress.

use std::collections::HashMap;

use keyward_blobstore::BlobStore;
use keyward_core::Vault;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("no key share found for public key {0}")]
    ShareNotFound(String),
    #[error(transparent)]
    Blob(#[from] keyward_blobstore::BlobStoreError),
    #[error(transparent)]
    Codec(#[from] keyward_vault::VaultCodecError),
}

/// Per-session view over a vault's key shares.
///
/// Constructed either from an existing backup (keysign, reshare, migrate of
/// an already-provisioned identity) or empty (first-time keygen). Writes
/// during a protocol run land in the in-memory cache; persisting the
/// resulting vault back to the blob store is the worker's job, not this
/// accessor's — so a run that fails after partial progress never corrupts
/// the backup on disk.
pub struct LocalStateAccessor {
    vault: Option<Vault>,
    cache: HashMap<String, String>,
}

impl LocalStateAccessor {
    /// Start with no backing vault: an empty in-memory cache, used for
    /// first-time keygen where no `<pub>.bak` exists yet.
    pub fn empty() -> Self {
        Self {
            vault: None,
            cache: HashMap::new(),
        }
    }

    /// Load and decrypt an existing backup from `store` under `filename`.
    pub fn from_backup(
        store: &BlobStore,
        filename: &str,
        password: &str,
    ) -> Result<Self, StateError> {
        let bytes = store.get_file(filename)?;
        let vault = keyward_vault::decrypt_vault_from_backup(password, &bytes)?;
        Ok(Self {
            vault: Some(vault),
            cache: HashMap::new(),
        })
    }

    pub fn vault(&self) -> Option<&Vault> {
        self.vault.as_ref()
    }

    /// Look up the key share for `public_key`.
    ///
    /// If a vault is loaded, searches `vault.key_shares` for an exact
    /// match and fails with [`StateError::ShareNotFound`] if absent. If no
    /// vault is loaded, falls through to the in-memory cache (which may
    /// legitimately be empty mid-keygen).
    pub fn get_local_state(&self, public_key: &str) -> Result<String, StateError> {
        match &self.vault {
            Some(vault) => vault
                .key_share(public_key)
                .map(str::to_string)
                .ok_or_else(|| StateError::ShareNotFound(public_key.to_string())),
            None => Ok(self.cache.get(public_key).cloned().unwrap_or_default()),
        }
    }

    /// Accumulate a newly produced share into the in-memory cache, used
    /// while keygen/reshare/migrate build up the final vault.
    pub fn save_local_state(&mut self, public_key: &str, share: String) {
        self.cache.insert(public_key.to_string(), share);
    }

    /// Read the in-memory cache directly, bypassing the loaded vault.
    pub fn get_local_cache_state(&self, public_key: &str) -> Option<&str> {
        self.cache.get(public_key).map(String::as_str)
    }

    /// Drain the accumulated shares, consuming the accessor. Used by the
    /// worker once a protocol run completes to build the final [`Vault`].
    pub fn into_cache(self) -> HashMap<String, String> {
        self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyward_core::LibType;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn sample_vault(pub_key: &str) -> Vault {
        let mut key_shares = BTreeMap::new();
        key_shares.insert(pub_key.to_string(), "share-bytes".to_string());
        Vault {
            name: "v".into(),
            public_key_ecdsa: pub_key.to_string(),
            public_key_eddsa: "ed".into(),
            hex_chain_code: "cc".into(),
            local_party_id: "party-1".into(),
            signers: vec!["party-1".into()],
            key_shares,
            lib_type: LibType::Gg20,
            reshare_prefix: None,
        }
    }

    #[test]
    fn empty_accessor_returns_cache_value_for_any_key() {
        let mut accessor = LocalStateAccessor::empty();
        assert_eq!(accessor.get_local_state("anything").unwrap(), "");
        accessor.save_local_state("anything", "share".into());
        assert_eq!(accessor.get_local_state("anything").unwrap(), "share");
    }

    #[test]
    fn loaded_vault_exact_match_succeeds() {
        let dir = tempdir().unwrap();
        let store = BlobStore::open(dir.path()).unwrap();
        let vault = sample_vault(&"a".repeat(66));
        let bytes = keyward_vault::encrypt_vault_backup("pw", &vault);
        store.upload_file(&vault.backup_filename(), &bytes).unwrap();

        let accessor =
            LocalStateAccessor::from_backup(&store, &vault.backup_filename(), "pw").unwrap();
        assert_eq!(
            accessor.get_local_state(&"a".repeat(66)).unwrap(),
            "share-bytes"
        );
    }

    #[test]
    fn loaded_vault_missing_key_fails() {
        let dir = tempdir().unwrap();
        let store = BlobStore::open(dir.path()).unwrap();
        let vault = sample_vault(&"a".repeat(66));
        let bytes = keyward_vault::encrypt_vault_backup("pw", &vault);
        store.upload_file(&vault.backup_filename(), &bytes).unwrap();

        let accessor =
            LocalStateAccessor::from_backup(&store, &vault.backup_filename(), "pw").unwrap();
        let err = accessor.get_local_state(&"b".repeat(66)).unwrap_err();
        assert!(matches!(err, StateError::ShareNotFound(_)));
    }

    #[test]
    fn cache_state_bypasses_vault() {
        let mut accessor = LocalStateAccessor::empty();
        assert_eq!(accessor.get_local_cache_state("k"), None);
        accessor.save_local_state("k", "v".into());
        assert_eq!(accessor.get_local_cache_state("k"), Some("v"));
    }
}
