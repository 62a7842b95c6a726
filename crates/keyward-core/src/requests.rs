//! Wire-level request/response DTOs shared by the admission surface and
//! the worker (the worker deserializes the same JSON shape the API
//! enqueued as a task payload).

use serde::{Deserialize, Serialize};

use crate::vault::LibType;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultCreateRequest {
    pub name: String,
    pub session_id: String,
    pub hex_encryption_key: String,
    pub hex_chain_code: String,
    #[serde(default)]
    pub local_party_id: String,
    pub encryption_password: String,
    pub email: String,
    pub lib_type: LibType,
}

impl VaultCreateRequest {
    pub fn validate(&self) -> Result<(), String> {
        require_nonempty("name", &self.name)?;
        require_uuid("session_id", &self.session_id)?;
        require_hex("hex_encryption_key", &self.hex_encryption_key)?;
        require_hex("hex_chain_code", &self.hex_chain_code)?;
        require_nonempty("encryption_password", &self.encryption_password)?;
        require_nonempty("email", &self.email)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReshareRequest {
    pub name: String,
    pub session_id: String,
    pub hex_encryption_key: String,
    pub hex_chain_code: String,
    #[serde(default)]
    pub local_party_id: String,
    pub encryption_password: String,
    pub email: String,
    /// The identity being reshared. Empty when no backup exists yet (the
    /// worker then synthesizes a skeleton from `old_parties`).
    #[serde(default)]
    pub public_key: String,
    #[serde(default)]
    pub old_parties: Vec<String>,
    #[serde(default)]
    pub old_reshare_prefix: Option<String>,
    pub new_parties: Vec<String>,
    pub lib_type: LibType,
}

impl ReshareRequest {
    pub fn validate(&self) -> Result<(), String> {
        require_nonempty("name", &self.name)?;
        require_uuid("session_id", &self.session_id)?;
        require_hex("hex_encryption_key", &self.hex_encryption_key)?;
        require_hex("hex_chain_code", &self.hex_chain_code)?;
        require_nonempty("encryption_password", &self.encryption_password)?;
        require_nonempty("email", &self.email)?;
        if self.new_parties.is_empty() {
            return Err("new_parties is required".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationRequest {
    pub public_key: String,
    pub session_id: String,
    pub hex_encryption_key: String,
    pub encryption_password: String,
    pub email: String,
}

impl MigrationRequest {
    pub fn validate(&self) -> Result<(), String> {
        require_public_key(&self.public_key)?;
        require_uuid("session_id", &self.session_id)?;
        require_hex("hex_encryption_key", &self.hex_encryption_key)?;
        require_nonempty("encryption_password", &self.encryption_password)?;
        require_nonempty("email", &self.email)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeysignRequest {
    pub public_key: String,
    pub session_id: String,
    pub messages: Vec<String>,
    pub derive_path: String,
    pub is_ecdsa: bool,
    pub vault_password: String,
    pub hex_encryption_key: String,
}

impl KeysignRequest {
    pub fn validate(&self) -> Result<(), String> {
        require_public_key(&self.public_key)?;
        require_uuid("session_id", &self.session_id)?;
        require_hex("hex_encryption_key", &self.hex_encryption_key)?;
        require_nonempty("vault_password", &self.vault_password)?;
        if self.messages.is_empty() {
            return Err("messages is required".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultResendRequest {
    pub public_key_ecdsa: String,
    pub password: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultGetResponse {
    pub name: String,
    pub public_key_ecdsa: String,
    pub public_key_eddsa: String,
    pub hex_chain_code: String,
    pub local_party_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyGenerationTaskResult {
    pub ecdsa_public_key: String,
    pub eddsa_public_key: String,
}

/// The `email_vault_backup` task payload: everything the email handler
/// needs without re-reading the blob store or re-decrypting the vault.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailVaultBackupTask {
    pub email: String,
    pub file_name: String,
    /// Base64-encoded backup bytes, carried as a string rather than a
    /// lossily-cast `String::from_utf8` of raw ciphertext.
    pub file_content_base64: String,
    pub vault_name: String,
    pub code: String,
}

fn require_nonempty(field: &str, value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{field} is required"));
    }
    Ok(())
}

fn require_uuid(field: &str, value: &str) -> Result<(), String> {
    if !crate::validate::is_valid_session_id(value) {
        return Err(format!("{field} is not a valid session id"));
    }
    Ok(())
}

fn require_hex(field: &str, value: &str) -> Result<(), String> {
    if !crate::validate::is_hex_string(value) {
        return Err(format!("{field} is not valid hex"));
    }
    Ok(())
}

fn require_public_key(value: &str) -> Result<(), String> {
    if !crate::validate::is_valid_public_key_ecdsa(value) {
        return Err("public_key is not a valid ECDSA public key".into());
    }
    Ok(())
}
