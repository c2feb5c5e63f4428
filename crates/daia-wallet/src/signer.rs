//! Vault-backed sign resolver

use std::sync::Arc;

use async_trait::async_trait;
use daia_core::{ResolveError, SignResolution, SignResolver};
use daia_crypto::{random_hex, KeyVault, PublicKey};

/// Random bytes in a signee nonce
pub const SIGNEE_NONCE_BYTES: usize = 16;

/// Signs with any active key held in a vault
///
/// Each signature gets a fresh random signee nonce. Keys the vault does not
/// hold are declined so another resolver can be tried.
pub struct VaultSignResolver {
    vault: Arc<KeyVault>,
}

impl VaultSignResolver {
    pub fn new(vault: Arc<KeyVault>) -> Self {
        Self { vault }
    }
}

#[async_trait]
impl SignResolver for VaultSignResolver {
    async fn create_proof(
        &self,
        offer_bytes: &str,
        offerer_nonce: &str,
        pub_key: &PublicKey,
    ) -> Result<Option<SignResolution>, ResolveError> {
        let key_id = match self.vault.find_by_public_key(pub_key)? {
            Some(key_id) => key_id,
            None => {
                tracing::debug!(pub_key = %pub_key, "Key not held; declining");
                return Ok(None);
            }
        };

        let signee_nonce = random_hex(SIGNEE_NONCE_BYTES);
        let signature = self
            .vault
            .sign_offer(&key_id, offer_bytes, offerer_nonce, &signee_nonce)?;

        Ok(Some(SignResolution {
            signee_nonce,
            signature,
        }))
    }
}
