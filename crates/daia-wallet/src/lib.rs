//! DAIA Wallet - Resolvers that let a party sign offers
//!
//! This crate implements the caller side of signing:
//! - VaultSignResolver: signs with keys held in a [`daia_crypto::KeyVault`]
//! - WalletPaymentResolver: pays within a spending budget
//! - CatalogReferenceResolver: points at previously published agreements
//! - OfferBuilder: constructs offers, including offerer self-signatures

use daia_core::{CodecError, RequirementId};
use daia_crypto::CryptoError;
use thiserror::Error;

pub mod budget;
pub mod catalog;
pub mod offer;
pub mod payment;
pub mod signer;

pub use budget::*;
pub use catalog::*;
pub use offer::*;
pub use payment::*;
pub use signer::*;

/// Errors raised while building offers
#[derive(Error, Debug)]
pub enum WalletError {
    #[error("Invalid offer: {0}")]
    Codec(#[from] CodecError),

    #[error("Cryptographic error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Requirement not found: {id}")]
    RequirementNotFound { id: RequirementId },

    #[error("Requirement {id} is not a sign requirement")]
    NotSignRequirement { id: RequirementId },

    #[error("Key does not match the public key of requirement {id}")]
    KeyMismatch { id: RequirementId },
}

pub type Result<T> = std::result::Result<T, WalletError>;
