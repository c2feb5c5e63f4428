//! Key vault
//!
//! **Security Invariant: Private keys never leave the vault.** Callers hand
//! the vault a message and get back a hex signature.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::{sign, sign_message, CryptoError, CryptoResult, KeyId, KeyPair, PublicKey};

/// An in-memory key vault indexed by key id and by public key
pub struct KeyVault {
    keys: RwLock<HashMap<KeyId, VaultEntry>>,
}

struct VaultEntry {
    keypair: KeyPair,
    public_key: PublicKey,
    label: String,
    active: bool,
}

/// Public description of a vault key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    pub key_id: KeyId,
    pub public_key: PublicKey,
    pub label: String,
    pub active: bool,
}

impl KeyVault {
    /// Create a new empty vault
    pub fn new() -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
        }
    }

    /// Generate a new key pair and store it
    pub fn generate_key(&self, label: impl Into<String>) -> CryptoResult<(KeyId, PublicKey)> {
        self.insert(KeyPair::generate(), label.into())
    }

    /// Import an existing key pair
    pub fn import_key(
        &self,
        keypair: KeyPair,
        label: impl Into<String>,
    ) -> CryptoResult<(KeyId, PublicKey)> {
        self.insert(keypair, label.into())
    }

    fn insert(&self, keypair: KeyPair, label: String) -> CryptoResult<(KeyId, PublicKey)> {
        let public_key = keypair.public_key();
        let key_id = KeyId::new();

        self.keys
            .write()
            .map_err(|e| CryptoError::VaultError(e.to_string()))?
            .insert(
                key_id.clone(),
                VaultEntry {
                    keypair,
                    public_key: public_key.clone(),
                    label,
                    active: true,
                },
            );

        Ok((key_id, public_key))
    }

    /// Find the active key matching a public key
    pub fn find_by_public_key(&self, public_key: &PublicKey) -> CryptoResult<Option<KeyId>> {
        let keys = self
            .keys
            .read()
            .map_err(|e| CryptoError::VaultError(e.to_string()))?;

        Ok(keys
            .iter()
            .find(|(_, e)| e.active && &e.public_key == public_key)
            .map(|(id, _)| id.clone()))
    }

    /// Whether an active key for this public key is held
    pub fn holds(&self, public_key: &PublicKey) -> bool {
        matches!(self.find_by_public_key(public_key), Ok(Some(_)))
    }

    /// Sign raw bytes with a stored key
    pub fn sign(&self, key_id: &KeyId, message: &[u8]) -> CryptoResult<String> {
        let keys = self
            .keys
            .read()
            .map_err(|e| CryptoError::VaultError(e.to_string()))?;

        let entry = keys
            .get(key_id)
            .ok_or_else(|| CryptoError::KeyNotFound(key_id.to_string()))?;

        if !entry.active {
            return Err(CryptoError::SigningFailed("Key is inactive".to_string()));
        }

        sign(&entry.keypair, message)
    }

    /// Sign an offer's canonical sign message with a stored key
    pub fn sign_offer(
        &self,
        key_id: &KeyId,
        offer_content_serialized: &str,
        offerer_nonce: &str,
        signee_nonce: &str,
    ) -> CryptoResult<String> {
        let message = sign_message(offer_content_serialized, offerer_nonce, signee_nonce)?;
        self.sign(key_id, &message)
    }

    /// Deactivate a key (soft delete)
    pub fn deactivate_key(&self, key_id: &KeyId) -> CryptoResult<()> {
        let mut keys = self
            .keys
            .write()
            .map_err(|e| CryptoError::VaultError(e.to_string()))?;

        let entry = keys
            .get_mut(key_id)
            .ok_or_else(|| CryptoError::KeyNotFound(key_id.to_string()))?;

        entry.active = false;
        Ok(())
    }

    /// List all active keys
    pub fn list_keys(&self) -> CryptoResult<Vec<KeyInfo>> {
        let keys = self
            .keys
            .read()
            .map_err(|e| CryptoError::VaultError(e.to_string()))?;

        Ok(keys
            .iter()
            .filter(|(_, e)| e.active)
            .map(|(id, e)| KeyInfo {
                key_id: id.clone(),
                public_key: e.public_key.clone(),
                label: e.label.clone(),
                active: e.active,
            })
            .collect())
    }
}

impl Default for KeyVault {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify_offer_signature;

    #[test]
    fn test_vault_generate_and_sign() {
        let vault = KeyVault::new();
        let (key_id, public_key) = vault.generate_key("car").unwrap();

        let signature = vault.sign_offer(&key_id, "offer", "n1", "n2").unwrap();
        assert!(verify_offer_signature(&public_key, "offer", "n1", "n2", &signature).unwrap());
    }

    #[test]
    fn test_vault_find_by_public_key() {
        let vault = KeyVault::new();
        let (key_id, public_key) = vault.generate_key("gate").unwrap();

        assert_eq!(vault.find_by_public_key(&public_key).unwrap(), Some(key_id));
        assert!(!vault.holds(&KeyPair::generate().public_key()));
    }

    #[test]
    fn test_vault_deactivate_key() {
        let vault = KeyVault::new();
        let (key_id, public_key) = vault.generate_key("car").unwrap();
        vault.deactivate_key(&key_id).unwrap();

        assert!(vault.sign(&key_id, b"test").is_err());
        assert!(!vault.holds(&public_key));
        assert!(vault.list_keys().unwrap().is_empty());
    }
}
