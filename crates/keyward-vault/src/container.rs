//! Canonical binary encoding of a [`Vault`], independent of the encryption
//! layer. Length-prefixed fields rather than a self-describing format
//! (JSON, CBOR) so the on-disk shape is fixed and auditable.

use std::collections::BTreeMap;

use keyward_core::{LibType, Vault};

use crate::VaultCodecError;

const MAGIC: &[u8; 4] = b"KWV1";

fn push_str(buf: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    buf.extend_from_slice(bytes);
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], VaultCodecError> {
        let end = self.pos.checked_add(n).ok_or(VaultCodecError::CorruptBackup)?;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or(VaultCodecError::CorruptBackup)?;
        self.pos = end;
        Ok(slice)
    }

    fn take_u8(&mut self) -> Result<u8, VaultCodecError> {
        Ok(self.take(1)?[0])
    }

    fn take_string(&mut self) -> Result<String, VaultCodecError> {
        let len_bytes = self.take(4)?;
        let len = u32::from_be_bytes(len_bytes.try_into().unwrap()) as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| VaultCodecError::CorruptBackup)
    }
}

/// Serialize a [`Vault`] into the canonical container byte layout.
pub fn encode(vault: &Vault) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(MAGIC);
    push_str(&mut buf, &vault.name);
    push_str(&mut buf, &vault.public_key_ecdsa);
    push_str(&mut buf, &vault.public_key_eddsa);
    push_str(&mut buf, &vault.hex_chain_code);
    push_str(&mut buf, &vault.local_party_id);
    buf.push(match vault.lib_type {
        LibType::Gg20 => 0,
        LibType::Dkls => 1,
    });
    match &vault.reshare_prefix {
        Some(prefix) => {
            buf.push(1);
            push_str(&mut buf, prefix);
        }
        None => buf.push(0),
    }
    buf.extend_from_slice(&(vault.signers.len() as u32).to_be_bytes());
    for signer in &vault.signers {
        push_str(&mut buf, signer);
    }
    buf.extend_from_slice(&(vault.key_shares.len() as u32).to_be_bytes());
    for (pubkey, share) in &vault.key_shares {
        push_str(&mut buf, pubkey);
        push_str(&mut buf, share);
    }
    buf
}

/// Parse the canonical container byte layout back into a [`Vault`].
pub fn decode(bytes: &[u8]) -> Result<Vault, VaultCodecError> {
    let mut reader = Reader::new(bytes);
    if reader.take(4)? != MAGIC {
        return Err(VaultCodecError::CorruptBackup);
    }
    let name = reader.take_string()?;
    let public_key_ecdsa = reader.take_string()?;
    let public_key_eddsa = reader.take_string()?;
    let hex_chain_code = reader.take_string()?;
    let local_party_id = reader.take_string()?;
    let lib_type = match reader.take_u8()? {
        0 => LibType::Gg20,
        1 => LibType::Dkls,
        _ => return Err(VaultCodecError::CorruptBackup),
    };
    let reshare_prefix = match reader.take_u8()? {
        0 => None,
        1 => Some(reader.take_string()?),
        _ => return Err(VaultCodecError::CorruptBackup),
    };
    let signer_count = u32::from_be_bytes(reader.take(4)?.try_into().unwrap()) as usize;
    let mut signers = Vec::with_capacity(signer_count.min(1024));
    for _ in 0..signer_count {
        signers.push(reader.take_string()?);
    }
    let share_count = u32::from_be_bytes(reader.take(4)?.try_into().unwrap()) as usize;
    let mut key_shares = BTreeMap::new();
    for _ in 0..share_count {
        let pubkey = reader.take_string()?;
        let share = reader.take_string()?;
        key_shares.insert(pubkey, share);
    }
    Ok(Vault {
        name,
        public_key_ecdsa,
        public_key_eddsa,
        hex_chain_code,
        local_party_id,
        signers,
        key_shares,
        lib_type,
        reshare_prefix,
    })
}
