//! Agreement verification
//!
//! [`AgreementVerifier`] re-derives, for every requirement of an agreement,
//! whether its proof satisfies it. Verification is exhaustive: every
//! requirement is checked and every failure is reported.
//!
//! Agreement references are followed depth-first through a
//! [`VerificationSession`] that lives for one top-level call. The session
//! tracks which references are on the current path, so a chain that loops
//! back on itself fails instead of recursing forever.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};

use crate::codec::parse_offer;
use crate::config::VerifierConfig;
use crate::ledger::{LedgerGateway, Transaction};
use crate::types::{
    Address, Agreement, LedgerTransactionData, OfferContent, PaymentAuth, PaymentRequirement,
    Proof, ReferenceRequirement, Requirement, RequirementId, SignRequirement,
};
use crate::verdict::{
    AgreementLookup, NotFoundReason, VerificationError, VerificationErrorKind,
    VerificationOutcome, VerificationReport,
};

type CheckResult = std::result::Result<(), VerificationError>;

/// A payment seen on the ledger while checking one requirement
#[derive(Debug, Clone, PartialEq, Eq)]
enum ObservedPayment {
    /// Output of the transaction carrying the agreement
    Carrying { to: Address, amount: u64 },
    /// Output of a separate payment transaction
    Remote {
        tx_id: String,
        to: Address,
        amount: u64,
    },
}

/// Observed payments of one agreement, per transaction output
///
/// Combined self-authenticated requirements share one output, so each
/// output is counted once however many requirements it satisfies.
#[derive(Debug, Default)]
struct ObservedTotals {
    carrying: BTreeMap<Address, u64>,
    remote: BTreeMap<(String, Address), u64>,
}

impl ObservedTotals {
    fn record(&mut self, payment: ObservedPayment) {
        match payment {
            ObservedPayment::Carrying { to, amount } => {
                self.carrying.insert(to, amount);
            }
            ObservedPayment::Remote { tx_id, to, amount } => {
                self.remote.insert((tx_id, to), amount);
            }
        }
    }

    fn per_recipient(self) -> BTreeMap<Address, u64> {
        let mut totals = self.carrying;
        for ((_, to), amount) in self.remote {
            let entry = totals.entry(to).or_insert(0);
            *entry = entry.saturating_add(amount);
        }
        totals
    }
}

/// Verifies agreements against a ledger
#[derive(Clone)]
pub struct AgreementVerifier {
    ledger: Arc<dyn LedgerGateway>,
    config: VerifierConfig,
}

impl AgreementVerifier {
    pub fn new(ledger: Arc<dyn LedgerGateway>) -> Self {
        Self {
            ledger,
            config: VerifierConfig::default(),
        }
    }

    pub fn with_config(mut self, config: VerifierConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Verify an agreement, optionally against the transaction that carries it
    ///
    /// Without a carrying transaction no self-authenticated payment can be
    /// satisfied.
    pub async fn verify_agreement(
        &self,
        agreement: &Agreement,
        transaction: Option<&Transaction>,
    ) -> VerificationOutcome {
        let mut session = VerificationSession::new(self.ledger.as_ref(), &self.config);
        if let Some(tx) = transaction {
            session.visiting.insert(tx.id.clone());
        }

        let outcome = session.verify(agreement, transaction, 0, true).await;
        log_outcome(transaction.map(|tx| tx.id.as_str()), &outcome);
        outcome
    }

    /// Fetch a transaction, read its agreement and verify it
    pub async fn get_agreement_from_transaction(&self, tx_id: &str) -> AgreementLookup {
        let mut session = VerificationSession::new(self.ledger.as_ref(), &self.config);
        session.visiting.insert(tx_id.to_string());

        let lookup = session.lookup(tx_id, 0, true).await;
        match &lookup {
            AgreementLookup::Found { verification, .. } => log_outcome(Some(tx_id), verification),
            AgreementLookup::NotFound { reason } => {
                tracing::info!(tx_id = %tx_id, reason = %reason, "No agreement found");
            }
        }
        lookup
    }

    /// Look up and verify several transactions, at most `concurrency` at a time
    ///
    /// Each lookup gets its own session. Results come back in input order.
    pub async fn verify_transactions(
        &self,
        tx_ids: Vec<String>,
        concurrency: usize,
    ) -> Vec<(String, AgreementLookup)> {
        stream::iter(tx_ids)
            .map(|tx_id| async move {
                let lookup = self.get_agreement_from_transaction(&tx_id).await;
                (tx_id, lookup)
            })
            .buffered(concurrency.max(1))
            .collect()
            .await
    }
}

fn log_outcome(tx_id: Option<&str>, outcome: &VerificationOutcome) {
    match outcome {
        VerificationOutcome::Passed { .. } => {
            tracing::info!(tx_id = ?tx_id, "Agreement verified");
        }
        VerificationOutcome::Failed(report) => {
            tracing::warn!(
                tx_id = ?tx_id,
                errors = report.errors.len(),
                unsatisfied = report.unsatisfied.len(),
                "Agreement failed verification"
            );
        }
    }
}

/// State for one top-level verification
///
/// `visiting` holds the references on the current path from the root.
pub struct VerificationSession<'a> {
    ledger: &'a dyn LedgerGateway,
    config: &'a VerifierConfig,
    visiting: HashSet<String>,
}

impl<'a> VerificationSession<'a> {
    pub fn new(ledger: &'a dyn LedgerGateway, config: &'a VerifierConfig) -> Self {
        Self {
            ledger,
            config,
            visiting: HashSet::new(),
        }
    }

    /// Fetch and verify the agreement at `tx_id`
    ///
    /// Boxed because it recurses through agreement references.
    pub fn lookup<'s>(
        &'s mut self,
        tx_id: &'s str,
        depth: usize,
        top_level: bool,
    ) -> BoxFuture<'s, AgreementLookup> {
        Box::pin(async move {
            let transaction = match self.ledger.find_transaction_by_id(tx_id).await {
                Ok(Some(tx)) => tx,
                Ok(None) => {
                    return AgreementLookup::NotFound {
                        reason: NotFoundReason::TransactionMissing,
                    }
                }
                Err(e) => {
                    return AgreementLookup::NotFound {
                        reason: NotFoundReason::FetchFailed {
                            message: e.to_string(),
                        },
                    }
                }
            };

            let agreement = match transaction.agreement() {
                Ok(agreement) => agreement,
                Err(error) => {
                    return AgreementLookup::NotFound {
                        reason: NotFoundReason::EmbeddedData { error },
                    }
                }
            };

            let verification = self
                .verify(&agreement, Some(&transaction), depth, top_level)
                .await;

            AgreementLookup::Found {
                transaction,
                agreement,
                verification,
            }
        })
    }

    pub async fn verify(
        &mut self,
        agreement: &Agreement,
        transaction: Option<&Transaction>,
        depth: usize,
        top_level: bool,
    ) -> VerificationOutcome {
        let offer = match parse_offer(&agreement.offer_content_serialized) {
            Ok(offer) => offer,
            Err(e) => {
                return VerificationOutcome::Failed(VerificationReport::blanket(
                    VerificationErrorKind::SchemaInvalid,
                    e.to_string(),
                ))
            }
        };

        // Nested references were accepted by whoever published them
        if top_level && !self.config.accepts_offer_type(&offer.offer_type_identifier) {
            return VerificationOutcome::Failed(VerificationReport::blanket(
                VerificationErrorKind::Other,
                format!("offer type {} is not accepted", offer.offer_type_identifier),
            ));
        }

        if let Some(report) = key_set_mismatch(&offer, agreement) {
            return VerificationOutcome::Failed(report);
        }

        let self_authenticated = self_authenticated_totals(&offer);
        let mut report = VerificationReport::default();
        let mut observed = ObservedTotals::default();

        // Key sets match here, so every requirement has a proof
        for ((id, requirement), proof) in offer.requirements.iter().zip(agreement.proofs.values()) {
            let result = self
                .check_requirement(
                    id,
                    requirement,
                    proof,
                    &agreement.offer_content_serialized,
                    transaction,
                    &self_authenticated,
                    depth,
                )
                .await;

            match result {
                Ok(payment) => {
                    if let Some(payment) = payment {
                        observed.record(payment);
                    }
                    report.satisfied.insert(id.clone());
                }
                Err(error) => {
                    tracing::debug!(requirement_id = %id, error = %error, "Requirement failed");
                    report.unsatisfied.insert(id.clone());
                    report.errors.push(error);
                }
            }
        }

        if report.errors.is_empty() {
            VerificationOutcome::Passed {
                total_payments: observed.per_recipient(),
            }
        } else {
            VerificationOutcome::Failed(report)
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn check_requirement(
        &mut self,
        id: &RequirementId,
        requirement: &Requirement,
        proof: &Proof,
        offer_bytes: &str,
        transaction: Option<&Transaction>,
        self_authenticated: &BTreeMap<Address, u64>,
        depth: usize,
    ) -> std::result::Result<Option<ObservedPayment>, VerificationError> {
        match (requirement, proof) {
            (Requirement::Sign(req), Proof::Sign(proof)) => {
                check_sign(id, req, &proof.signee_nonce, &proof.signature, offer_bytes)
                    .map(|()| None)
            }
            (Requirement::Payment(req), Proof::Payment(proof)) => match &req.auth {
                PaymentAuth::SelfAuthenticated => self.check_self_authenticated(
                    id,
                    req,
                    &proof.tx_id,
                    transaction,
                    self_authenticated,
                )
                .map(Some),
                PaymentAuth::Remote {
                    payment_nonce,
                    tx_id,
                } => {
                    self.check_remote(id, req, payment_nonce, tx_id.as_deref(), &proof.tx_id)
                        .await
                        .map(Some)
                }
            },
            (Requirement::AgreementReference(req), Proof::AgreementReference(proof)) => {
                self.check_reference(id, req, &proof.reference, depth)
                    .await
                    .map(|()| None)
            }
            (requirement, proof) => Err(VerificationError::new(
                id,
                VerificationErrorKind::InvalidProof,
                format!(
                    "{} requirement answered with a {} proof",
                    requirement.kind(),
                    proof.kind()
                ),
            )),
        }
    }

    fn check_self_authenticated(
        &self,
        id: &RequirementId,
        req: &PaymentRequirement,
        proof_tx_id: &str,
        transaction: Option<&Transaction>,
        self_authenticated: &BTreeMap<Address, u64>,
    ) -> std::result::Result<ObservedPayment, VerificationError> {
        if !proof_tx_id.is_empty() {
            return Err(VerificationError::new(
                id,
                VerificationErrorKind::InvalidProof,
                format!(
                    "self-authenticated payment names transaction {}",
                    proof_tx_id
                ),
            ));
        }

        let transaction = transaction.ok_or_else(|| {
            VerificationError::new(
                id,
                VerificationErrorKind::RequirementUnsatisfied,
                "no carrying transaction to check the payment against",
            )
        })?;

        // Requirements to the same address are met by one combined output
        let required = self_authenticated.get(&req.to).copied().unwrap_or(req.amount);
        let observed = transaction.payment_to(&req.to).ok_or_else(|| {
            VerificationError::new(
                id,
                VerificationErrorKind::RequirementUnsatisfied,
                format!("transaction {} pays nothing to {}", transaction.id, req.to),
            )
        })?;

        if self.config.payment_policy.is_satisfied(observed, required) {
            Ok(ObservedPayment::Carrying {
                to: req.to.clone(),
                amount: observed,
            })
        } else {
            Err(VerificationError::new(
                id,
                VerificationErrorKind::RequirementUnsatisfied,
                format!(
                    "transaction {} pays {} to {}, required {} ({})",
                    transaction.id, observed, req.to, required, self.config.payment_policy
                ),
            ))
        }
    }

    async fn check_remote(
        &self,
        id: &RequirementId,
        req: &PaymentRequirement,
        payment_nonce: &str,
        hinted_tx_id: Option<&str>,
        proof_tx_id: &str,
    ) -> std::result::Result<ObservedPayment, VerificationError> {
        let invalid =
            |message: String| VerificationError::new(id, VerificationErrorKind::InvalidProof, message);

        if proof_tx_id.is_empty() {
            return Err(invalid("remote payment proof names no transaction".to_string()));
        }
        if let Some(hint) = hinted_tx_id {
            if hint != proof_tx_id {
                return Err(invalid(format!(
                    "proof names transaction {}, requirement expects {}",
                    proof_tx_id, hint
                )));
            }
        }

        let payment_tx = match self.ledger.find_transaction_by_id(proof_tx_id).await {
            Ok(Some(tx)) => tx,
            Ok(None) => {
                return Err(VerificationError::new(
                    id,
                    VerificationErrorKind::FetchFailed,
                    format!("payment transaction {} not found", proof_tx_id),
                ))
            }
            Err(e) => {
                return Err(VerificationError::new(
                    id,
                    VerificationErrorKind::FetchFailed,
                    format!("fetching payment transaction {}: {}", proof_tx_id, e),
                ))
            }
        };

        match payment_tx.ledger_data() {
            Ok(LedgerTransactionData::PaymentIdentifier {
                payment_nonce: committed,
            }) => {
                if committed != payment_nonce {
                    return Err(invalid(format!(
                        "transaction {} commits to payment nonce {}, expected {}",
                        proof_tx_id, committed, payment_nonce
                    )));
                }
            }
            Ok(LedgerTransactionData::Agreement { .. }) => {
                return Err(invalid(format!(
                    "transaction {} carries an agreement, not a payment identifier",
                    proof_tx_id
                )))
            }
            Err(e) => {
                return Err(invalid(format!("transaction {}: {}", proof_tx_id, e)));
            }
        }

        let observed = payment_tx.payment_to(&req.to).unwrap_or(0);
        if self.config.payment_policy.is_satisfied(observed, req.amount) {
            Ok(ObservedPayment::Remote {
                tx_id: proof_tx_id.to_string(),
                to: req.to.clone(),
                amount: observed,
            })
        } else {
            Err(VerificationError::new(
                id,
                VerificationErrorKind::RequirementUnsatisfied,
                format!(
                    "transaction {} pays {} to {}, required {} ({})",
                    proof_tx_id, observed, req.to, req.amount, self.config.payment_policy
                ),
            ))
        }
    }

    async fn check_reference(
        &mut self,
        id: &RequirementId,
        req: &ReferenceRequirement,
        reference: &str,
        depth: usize,
    ) -> CheckResult {
        if let Some(pointer) = &req.pointer {
            if pointer != reference {
                return Err(VerificationError::new(
                    id,
                    VerificationErrorKind::InvalidProof,
                    format!("proof references {}, requirement expects {}", reference, pointer),
                ));
            }
        }
        if reference.is_empty() {
            return Err(VerificationError::new(
                id,
                VerificationErrorKind::InvalidProof,
                "reference proof is empty",
            ));
        }
        if self.visiting.contains(reference) {
            tracing::warn!(requirement_id = %id, reference = %reference, "Reference cycle detected");
            return Err(VerificationError::new(
                id,
                VerificationErrorKind::RequirementUnsatisfied,
                format!("cycle detected: {} is already being verified", reference),
            ));
        }
        if depth + 1 > self.config.max_reference_depth {
            return Err(VerificationError::new(
                id,
                VerificationErrorKind::RequirementUnsatisfied,
                format!(
                    "depth limit exceeded: {} is nested deeper than {}",
                    reference, self.config.max_reference_depth
                ),
            ));
        }

        tracing::debug!(requirement_id = %id, reference = %reference, depth = depth + 1, "Following reference");

        let reference = reference.to_string();
        self.visiting.insert(reference.clone());
        let lookup = self.lookup(&reference, depth + 1, false).await;
        self.visiting.remove(&reference);

        match lookup {
            AgreementLookup::Found { verification, .. } => match verification {
                VerificationOutcome::Passed { .. } => Ok(()),
                VerificationOutcome::Failed(report) => Err(VerificationError::new(
                    id,
                    VerificationErrorKind::RequirementUnsatisfied,
                    format!(
                        "referenced agreement {} failed verification with {} error(s)",
                        reference,
                        report.errors.len()
                    ),
                )
                .with_nested(report.errors)),
            },
            AgreementLookup::NotFound { reason } => {
                let kind = match reason {
                    NotFoundReason::FetchFailed { .. } | NotFoundReason::TransactionMissing => {
                        VerificationErrorKind::FetchFailed
                    }
                    NotFoundReason::EmbeddedData { .. } => VerificationErrorKind::InvalidProof,
                };
                Err(VerificationError::new(
                    id,
                    kind,
                    format!("referenced transaction {}: {}", reference, reason),
                ))
            }
        }
    }
}

fn check_sign(
    id: &RequirementId,
    req: &SignRequirement,
    signee_nonce: &str,
    signature: &str,
    offer_bytes: &str,
) -> CheckResult {
    match daia_crypto::verify_offer_signature(
        &req.pub_key,
        offer_bytes,
        &req.offerer_nonce,
        signee_nonce,
        signature,
    ) {
        Ok(true) => Ok(()),
        Ok(false) => Err(VerificationError::new(
            id,
            VerificationErrorKind::InvalidProof,
            format!("signature does not verify under {}", req.pub_key),
        )),
        Err(e) => Err(VerificationError::new(
            id,
            VerificationErrorKind::InvalidProof,
            format!("signature cannot be checked: {}", e),
        )),
    }
}

/// Blanket failure when requirements and proofs are not keyed alike
fn key_set_mismatch(offer: &OfferContent, agreement: &Agreement) -> Option<VerificationReport> {
    let missing: Vec<&RequirementId> = offer
        .requirements
        .keys()
        .filter(|id| !agreement.proofs.contains_key(*id))
        .collect();
    let stray: Vec<&RequirementId> = agreement
        .proofs
        .keys()
        .filter(|id| !offer.requirements.contains_key(*id))
        .collect();

    if missing.is_empty() && stray.is_empty() {
        return None;
    }

    let mut report = VerificationReport::blanket(
        VerificationErrorKind::Other,
        format!(
            "proof keys do not match requirement keys ({} missing, {} unexpected)",
            missing.len(),
            stray.len()
        ),
    );
    for id in missing {
        report.unsatisfied.insert(id.clone());
        report.errors.push(VerificationError::new(
            id,
            VerificationErrorKind::MissingProof,
            "no proof submitted",
        ));
    }
    for id in stray {
        report.errors.push(VerificationError::new(
            id,
            VerificationErrorKind::Other,
            "proof answers no requirement",
        ));
    }
    Some(report)
}

/// Combined self-authenticated amount owed to each address
fn self_authenticated_totals(offer: &OfferContent) -> BTreeMap<Address, u64> {
    let mut totals: BTreeMap<Address, u64> = BTreeMap::new();
    for requirement in offer.requirements.values() {
        if let Requirement::Payment(p) = requirement {
            if matches!(p.auth, PaymentAuth::SelfAuthenticated) {
                let entry = totals.entry(p.to.clone()).or_insert(0);
                // A sum past u64::MAX can never be paid, so saturating fails it
                *entry = entry.saturating_add(p.amount);
            }
        }
    }
    totals
}
