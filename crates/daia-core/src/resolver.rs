//! Requirement resolvers
//!
//! Resolvers are caller-supplied policy: they decide how a requirement gets
//! satisfied (which key signs, which wallet pays, which prior agreement is
//! referenced). `Ok(None)` means the resolver declines; the signer treats a
//! decline and an error the same way and stops. Payments already resolved
//! for that offer are then released.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use daia_crypto::PublicKey;

use crate::error::ResolveError;
use crate::ledger::TransactionHandle;
use crate::types::{Address, PaymentRequirement};

/// A signature over the canonical sign message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignResolution {
    pub signee_nonce: String,
    pub signature: String,
}

/// How a payment requirement will be met
#[derive(Debug)]
pub enum PaymentResolution {
    /// Outputs to add to the transaction that carries the agreement
    SelfAuthenticated { payments: BTreeMap<Address, u64> },
    /// A separate, already-built payment transaction
    RemoteTx { handle: Box<dyn TransactionHandle> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceResolution {
    pub pointer: String,
}

#[async_trait]
pub trait SignResolver: Send + Sync {
    async fn create_proof(
        &self,
        offer_bytes: &str,
        offerer_nonce: &str,
        pub_key: &PublicKey,
    ) -> Result<Option<SignResolution>, ResolveError>;
}

#[async_trait]
pub trait PaymentResolver: Send + Sync {
    async fn create_proof(
        &self,
        requirement: &PaymentRequirement,
    ) -> Result<Option<PaymentResolution>, ResolveError>;

    /// Give back a resolution whose offer was never signed
    ///
    /// The signer calls this once for every `Some` returned by
    /// [`PaymentResolver::create_proof`] when signing stops.
    async fn release(&self, _requirement: &PaymentRequirement) {}
}

#[async_trait]
pub trait ReferenceResolver: Send + Sync {
    async fn create_proof(
        &self,
        reference_type: &str,
    ) -> Result<Option<ReferenceResolution>, ResolveError>;
}

/// The resolvers handed to the signer for one offer
///
/// A missing resolver makes every requirement of that kind unresolvable.
#[derive(Clone, Default)]
pub struct Resolvers {
    pub sign: Option<Arc<dyn SignResolver>>,
    pub payment: Option<Arc<dyn PaymentResolver>>,
    pub reference: Option<Arc<dyn ReferenceResolver>>,
}

impl Resolvers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sign(mut self, resolver: Arc<dyn SignResolver>) -> Self {
        self.sign = Some(resolver);
        self
    }

    pub fn with_payment(mut self, resolver: Arc<dyn PaymentResolver>) -> Self {
        self.payment = Some(resolver);
        self
    }

    pub fn with_reference(mut self, resolver: Arc<dyn ReferenceResolver>) -> Self {
        self.reference = Some(resolver);
        self
    }
}
