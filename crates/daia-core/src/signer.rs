//! Offer signing
//!
//! [`OfferSigner`] turns an offer into an agreement by resolving every
//! requirement in key order. Signing is all-or-nothing: the first requirement
//! that cannot be resolved stops the run and no agreement is produced.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::codec::{encode_transaction_data, signing_bytes, validate_offer};
use crate::error::{Result, SignError};
use crate::ledger::{LedgerGateway, TransactionHandle, TransactionRequest};
use crate::resolver::{PaymentResolution, Resolvers};
use crate::types::{
    Address, Agreement, AgreementReferenceProof, LedgerTransactionData, OfferContent,
    PaymentAuth, PaymentProof, PaymentRequirement, Proof, ReferenceRequirement, Requirement,
    RequirementId, SignProof, SignRequirement,
};

/// A signed agreement and the transactions that publish it
#[derive(Debug)]
pub struct SignedAgreement {
    pub agreement: Agreement,
    /// Carries the agreement and every self-authenticated payment
    pub transaction: Box<dyn TransactionHandle>,
    /// Remote payment transactions; publish these before `transaction`
    pub internal_transactions: Vec<Box<dyn TransactionHandle>>,
    pub self_authenticated_payments: BTreeMap<Address, u64>,
}

impl SignedAgreement {
    /// The locator other agreements use to reference this one
    pub fn publication_id(&self) -> &str {
        self.transaction.id()
    }

    /// Publish the remote payments, then the agreement itself
    pub async fn publish_all(&self) -> Result<()> {
        for internal in &self.internal_transactions {
            publish(internal.as_ref()).await?;
        }
        publish(self.transaction.as_ref()).await?;
        tracing::info!(tx_id = %self.publication_id(), "Agreement published");
        Ok(())
    }
}

async fn release_reserved(resolvers: &Resolvers, reserved: &[PaymentRequirement]) {
    if let Some(resolver) = &resolvers.payment {
        for requirement in reserved {
            resolver.release(requirement).await;
        }
        if !reserved.is_empty() {
            tracing::debug!(released = reserved.len(), "Payment resolutions released");
        }
    }
}

async fn publish(handle: &dyn TransactionHandle) -> Result<()> {
    handle.publish().await.map_err(|source| SignError::Publish {
        tx_id: handle.id().to_string(),
        source,
    })
}

/// Proofs gathered so far for one offer
#[derive(Default)]
struct Accumulator {
    proofs: BTreeMap<RequirementId, Proof>,
    payments: BTreeMap<Address, u64>,
    internal_transactions: Vec<Box<dyn TransactionHandle>>,
    /// Payments the resolver has handed out for this offer
    reserved: Vec<PaymentRequirement>,
}

pub struct OfferSigner {
    ledger: Arc<dyn LedgerGateway>,
}

impl OfferSigner {
    pub fn new(ledger: Arc<dyn LedgerGateway>) -> Self {
        Self { ledger }
    }

    /// Resolve every requirement of `offer` and build its publication transaction
    ///
    /// Nothing is published. The caller decides when to call
    /// [`SignedAgreement::publish_all`].
    pub async fn sign_offer(
        &self,
        offer: &OfferContent,
        resolvers: &Resolvers,
    ) -> Result<SignedAgreement> {
        validate_offer(offer)?;
        let offer_bytes = signing_bytes(offer)?;

        tracing::debug!(
            offer_type = %offer.offer_type_identifier,
            requirements = offer.requirements.len(),
            "Signing offer"
        );

        let mut acc = Accumulator::default();
        let built = match self
            .resolve_requirements(offer, &offer_bytes, resolvers, &mut acc)
            .await
        {
            Ok(()) => self.build_publication(&offer_bytes, &acc).await,
            Err(e) => Err(e),
        };

        let (agreement, transaction) = match built {
            Ok(built) => built,
            Err(e) => {
                release_reserved(resolvers, &acc.reserved).await;
                return Err(e);
            }
        };

        tracing::info!(
            tx_id = %transaction.id(),
            offer_type = %offer.offer_type_identifier,
            internal = acc.internal_transactions.len(),
            "Offer signed"
        );

        Ok(SignedAgreement {
            agreement,
            transaction,
            internal_transactions: acc.internal_transactions,
            self_authenticated_payments: acc.payments,
        })
    }

    async fn resolve_requirements(
        &self,
        offer: &OfferContent,
        offer_bytes: &str,
        resolvers: &Resolvers,
        acc: &mut Accumulator,
    ) -> Result<()> {
        for (id, requirement) in &offer.requirements {
            let proof = match requirement {
                Requirement::Sign(req) => self.resolve_sign(id, req, offer_bytes, resolvers).await,
                Requirement::Payment(req) => self.resolve_payment(id, req, resolvers, acc).await,
                Requirement::AgreementReference(req) => {
                    self.resolve_reference(id, req, resolvers).await
                }
            };

            match proof {
                Ok(proof) => {
                    acc.proofs.insert(id.clone(), proof);
                }
                Err(e) => {
                    tracing::warn!(requirement_id = %id, error = %e, "Signing stopped");
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    async fn build_publication(
        &self,
        offer_bytes: &str,
        acc: &Accumulator,
    ) -> Result<(Agreement, Box<dyn TransactionHandle>)> {
        let agreement = Agreement {
            offer_content_serialized: offer_bytes.to_string(),
            proofs: acc.proofs.clone(),
        };
        let embedded = encode_transaction_data(&LedgerTransactionData::Agreement {
            agreement: agreement.clone(),
        })?;

        let transaction = self
            .ledger
            .make_transaction(TransactionRequest {
                payments: acc.payments.clone(),
                embedded_data: Some(embedded),
            })
            .await?;
        Ok((agreement, transaction))
    }

    async fn resolve_sign(
        &self,
        id: &RequirementId,
        req: &SignRequirement,
        offer_bytes: &str,
        resolvers: &Resolvers,
    ) -> Result<Proof> {
        // The offerer signed ahead of time with an empty signee nonce
        if let Some(signature) = &req.self_signature {
            return match daia_crypto::verify_offer_signature(
                &req.pub_key,
                offer_bytes,
                &req.offerer_nonce,
                "",
                signature,
            ) {
                Ok(true) => Ok(Proof::Sign(SignProof {
                    signee_nonce: String::new(),
                    signature: signature.clone(),
                })),
                Ok(false) => Err(SignError::unresolved(id, "self-signature does not verify")),
                Err(e) => Err(SignError::unresolved(
                    id,
                    format!("self-signature cannot be checked: {}", e),
                )),
            };
        }

        let resolver = resolvers
            .sign
            .as_ref()
            .ok_or_else(|| SignError::unresolved(id, "no sign resolver"))?;

        let resolution = match resolver
            .create_proof(offer_bytes, &req.offerer_nonce, &req.pub_key)
            .await
        {
            Ok(Some(resolution)) => resolution,
            Ok(None) => return Err(SignError::unresolved(id, format!("no signer for {}", req.pub_key))),
            Err(e) => return Err(SignError::unresolved(id, e.to_string())),
        };

        // Resolver output is checked like any other signature
        let valid = daia_crypto::verify_offer_signature(
            &req.pub_key,
            offer_bytes,
            &req.offerer_nonce,
            &resolution.signee_nonce,
            &resolution.signature,
        )
        .unwrap_or(false);
        if !valid {
            return Err(SignError::unresolved(id, "resolver produced an invalid signature"));
        }

        Ok(Proof::Sign(SignProof {
            signee_nonce: resolution.signee_nonce,
            signature: resolution.signature,
        }))
    }

    async fn resolve_payment(
        &self,
        id: &RequirementId,
        req: &PaymentRequirement,
        resolvers: &Resolvers,
        acc: &mut Accumulator,
    ) -> Result<Proof> {
        let resolver = resolvers
            .payment
            .as_ref()
            .ok_or_else(|| SignError::unresolved(id, "no payment resolver"))?;

        let resolution = match resolver.create_proof(req).await {
            Ok(Some(resolution)) => resolution,
            Ok(None) => {
                return Err(SignError::unresolved(
                    id,
                    format!("payment of {} to {} declined", req.amount, req.to),
                ))
            }
            Err(e) => return Err(SignError::unresolved(id, e.to_string())),
        };
        acc.reserved.push(req.clone());

        match (&req.auth, resolution) {
            (PaymentAuth::SelfAuthenticated, PaymentResolution::SelfAuthenticated { payments }) => {
                let covered = payments.get(&req.to).copied().unwrap_or(0);
                if covered < req.amount {
                    return Err(SignError::unresolved(
                        id,
                        format!("resolved {} to {}, required {}", covered, req.to, req.amount),
                    ));
                }
                for (to, amount) in payments {
                    if amount == 0 {
                        return Err(SignError::unresolved(id, format!("zero payment to {}", to)));
                    }
                    let total = acc.payments.entry(to.clone()).or_insert(0);
                    *total = total.checked_add(amount).ok_or_else(|| {
                        SignError::unresolved(id, format!("payments to {} overflow", to))
                    })?;
                }
                Ok(Proof::Payment(PaymentProof {
                    tx_id: String::new(),
                }))
            }
            (PaymentAuth::Remote { tx_id: hint, .. }, PaymentResolution::RemoteTx { handle }) => {
                let tx_id = handle.id().to_string();
                if let Some(hint) = hint {
                    if *hint != tx_id {
                        return Err(SignError::unresolved(
                            id,
                            format!("payment transaction {} does not match {}", tx_id, hint),
                        ));
                    }
                }
                tracing::debug!(requirement_id = %id, tx_id = %tx_id, "Remote payment resolved");
                acc.internal_transactions.push(handle);
                Ok(Proof::Payment(PaymentProof { tx_id }))
            }
            (PaymentAuth::SelfAuthenticated, PaymentResolution::RemoteTx { .. }) => Err(
                SignError::unresolved(id, "self-authenticated payment resolved to a remote transaction"),
            ),
            (PaymentAuth::Remote { .. }, PaymentResolution::SelfAuthenticated { .. }) => Err(
                SignError::unresolved(id, "remote payment resolved to self-authenticated outputs"),
            ),
        }
    }

    async fn resolve_reference(
        &self,
        id: &RequirementId,
        req: &ReferenceRequirement,
        resolvers: &Resolvers,
    ) -> Result<Proof> {
        let resolver = resolvers
            .reference
            .as_ref()
            .ok_or_else(|| SignError::unresolved(id, "no reference resolver"))?;

        let resolution = match resolver.create_proof(&req.reference_type).await {
            Ok(Some(resolution)) => resolution,
            Ok(None) => {
                return Err(SignError::unresolved(
                    id,
                    format!("no {} agreement to reference", req.reference_type),
                ))
            }
            Err(e) => return Err(SignError::unresolved(id, e.to_string())),
        };

        if resolution.pointer.is_empty() {
            return Err(SignError::unresolved(id, "resolver returned an empty reference"));
        }
        if let Some(pointer) = &req.pointer {
            if *pointer != resolution.pointer {
                return Err(SignError::unresolved(
                    id,
                    format!("reference {} does not match {}", resolution.pointer, pointer),
                ));
            }
        }

        Ok(Proof::AgreementReference(AgreementReferenceProof {
            reference: resolution.pointer,
        }))
    }
}
