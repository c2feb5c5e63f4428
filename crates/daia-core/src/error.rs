//! Error types for DAIA core operations
//!
//! Signing and ledger access fail with these errors. Verification does not:
//! its failures are data, reported through [`crate::VerificationOutcome`].

use thiserror::Error;

use crate::types::RequirementId;

/// Offer or ledger-envelope bytes don't have the expected shape
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid offer: {message}")]
    InvalidOffer { message: String },

    #[error("Embedded data is not valid UTF-8: {message}")]
    InvalidEncoding { message: String },
}

impl CodecError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        CodecError::InvalidOffer {
            message: message.into(),
        }
    }
}

/// Failures reported by a ledger gateway
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Ledger unavailable: {message}")]
    Unavailable { message: String },

    #[error("Malformed transaction: {message}")]
    MalformedTransaction { message: String },

    #[error("Transaction {tx_id} conflicts with an existing transaction")]
    Conflict { tx_id: String },

    #[error("Transaction rejected: {message}")]
    Rejected { message: String },
}

/// A resolver could not produce a proof for a reason worth reporting
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Cryptographic error: {0}")]
    Crypto(#[from] daia_crypto::CryptoError),

    #[error("{0}")]
    Other(String),
}

/// Signing an offer failed; no agreement was produced
#[derive(Error, Debug)]
pub enum SignError {
    #[error("Invalid offer: {0}")]
    InvalidOffer(#[from] CodecError),

    #[error("Requirement {requirement_id} could not be resolved: {reason}")]
    RequirementUnresolved {
        requirement_id: RequirementId,
        reason: String,
    },

    #[error("Publication transaction could not be built: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Transaction {tx_id} could not be published: {source}")]
    Publish {
        tx_id: String,
        #[source]
        source: LedgerError,
    },
}

impl SignError {
    pub(crate) fn unresolved(requirement_id: &RequirementId, reason: impl Into<String>) -> Self {
        SignError::RequirementUnresolved {
            requirement_id: requirement_id.clone(),
            reason: reason.into(),
        }
    }

    /// The requirement that stopped signing, if one did
    pub fn failed_requirement_id(&self) -> Option<&RequirementId> {
        match self {
            SignError::RequirementUnresolved { requirement_id, .. } => Some(requirement_id),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SignError>;
