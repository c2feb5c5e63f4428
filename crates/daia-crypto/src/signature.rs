//! Digital signatures

use ed25519_dalek::{Signature as Ed25519Signature, Signer, Verifier};

use crate::{sign_message, CryptoError, CryptoResult, KeyAlgorithm, KeyPair, PublicKey};

/// Sign raw bytes, returning a hex-encoded signature
pub fn sign(keypair: &KeyPair, message: &[u8]) -> CryptoResult<String> {
    let signature = keypair
        .signing_key()
        .try_sign(message)
        .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;

    Ok(hex::encode(signature.to_bytes()))
}

/// Verify a hex-encoded signature using the scheme the key declares
///
/// Returns `Ok(false)` for a well-formed signature that does not match and
/// `Err` when the key or signature cannot be decoded at all.
pub fn verify(public_key: &PublicKey, message: &[u8], signature_hex: &str) -> CryptoResult<bool> {
    match public_key.algorithm {
        KeyAlgorithm::Ed25519 => {
            let bytes: [u8; 64] = hex::decode(signature_hex)
                .map_err(|e| CryptoError::InvalidSignatureFormat(e.to_string()))?
                .try_into()
                .map_err(|_| {
                    CryptoError::InvalidSignatureFormat("Signature must be 64 bytes".to_string())
                })?;

            let signature = Ed25519Signature::from_bytes(&bytes);
            let verifying_key = public_key.to_verifying_key()?;

            Ok(verifying_key.verify(message, &signature).is_ok())
        }
    }
}

/// Sign an offer on behalf of a requirement's key
pub fn sign_offer_bytes(
    keypair: &KeyPair,
    offer_content_serialized: &str,
    offerer_nonce: &str,
    signee_nonce: &str,
) -> CryptoResult<String> {
    let message = sign_message(offer_content_serialized, offerer_nonce, signee_nonce)?;
    sign(keypair, &message)
}

/// Verify a requirement signature over exact offer bytes
pub fn verify_offer_signature(
    public_key: &PublicKey,
    offer_content_serialized: &str,
    offerer_nonce: &str,
    signee_nonce: &str,
    signature_hex: &str,
) -> CryptoResult<bool> {
    let message = sign_message(offer_content_serialized, offerer_nonce, signee_nonce)?;
    verify(public_key, &message, signature_hex)
}
