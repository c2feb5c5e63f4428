//! DAIA Crypto - Cryptographic primitives for offer signing
//!
//! This crate provides:
//! - Key generation and public keys that declare their signature scheme
//! - The canonical sign message covered by every requirement signature
//! - Signing and verification (Ed25519)
//! - Hashing (SHA-256)
//! - An in-memory key vault
//!
//! # Security Invariant
//!
//! **Signatures are always computed over the exact offer bytes that travel
//! with an agreement, never over a re-serialization.**

pub mod hash;
pub mod keys;
pub mod message;
pub mod signature;
pub mod vault;

pub use hash::*;
pub use keys::*;
pub use message::*;
pub use signature::*;
pub use vault::*;

use thiserror::Error;

/// Cryptographic errors
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Signing failed: {0}")]
    SigningFailed(String),

    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),

    #[error("Invalid signature format: {0}")]
    InvalidSignatureFormat(String),

    #[error("Vault error: {0}")]
    VaultError(String),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
