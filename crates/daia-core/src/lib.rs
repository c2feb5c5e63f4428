//! DAIA Core - Offers, proofs and agreements between parties on a ledger
//!
//! This crate implements the protocol engine:
//! - OfferContent: requirements one party wants satisfied
//! - Proof: typed evidence answering one requirement
//! - Agreement: the exact offer bytes plus a complete proof set
//! - OfferSigner: resolves every requirement and builds the publication transaction
//! - AgreementVerifier: re-derives pass/fail for every requirement, following references
//!
//! Ledger access goes through [`LedgerGateway`]; requirement resolution goes
//! through the resolver traits. Neither is implemented here.
//!
//! # Protocol Invariants
//!
//! 1. Signatures cover `offer_content_serialized` exactly as published
//! 2. An agreement answers every requirement and nothing else
//! 3. Signing is fail-fast; verification is exhaustive
//! 4. A remote payment commits to exactly one payment nonce
//! 5. Reference walks never revisit an agreement on the current path

pub mod codec;
pub mod config;
pub mod error;
pub mod ledger;
pub mod resolver;
pub mod signer;
pub mod summary;
pub mod types;
pub mod verdict;
pub mod verifier;

#[cfg(test)]
pub(crate) mod test_util;

pub use codec::*;
pub use config::*;
pub use error::*;
pub use ledger::*;
pub use resolver::*;
pub use signer::*;
pub use summary::*;
pub use types::*;
pub use verdict::*;
pub use verifier::*;
