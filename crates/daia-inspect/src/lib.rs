//! DAIA Inspect - Agreement Inspection Toolkit
//!
//! Agreements are published inside ledger transactions. This crate reads
//! them back out of a ledger snapshot file and reports on them:
//! - Verification of one or many transactions
//! - Requirement-by-requirement inspection
//! - Offer summaries (payments, signers, references)

use std::path::Path;

use daia_core::{
    parse_offer, summarize_offer, AgreementLookup, AgreementVerifier, CodecError, LedgerError,
    OfferContent, OfferSummary, PaymentAuth, Requirement, RequirementId, RequirementKind,
    VerificationOutcome,
};
use daia_ledger::{InMemoryLedger, LedgerSnapshot};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while loading or inspecting agreements
#[derive(Error, Debug)]
pub enum InspectError {
    #[error("File error: {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Invalid offer: {0}")]
    Offer(#[from] CodecError),

    #[error("No agreement in transaction {tx_id}: {reason}")]
    NotFound { tx_id: String, reason: String },
}

pub type Result<T> = std::result::Result<T, InspectError>;

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| InspectError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Build a ledger from snapshot JSON
pub async fn load_ledger_snapshot_json(json: &str) -> Result<InMemoryLedger> {
    let snapshot: LedgerSnapshot = serde_json::from_str(json)?;
    Ok(InMemoryLedger::from_snapshot(&snapshot).await?)
}

/// Build a ledger from a snapshot file
pub async fn load_ledger_snapshot(path: impl AsRef<Path>) -> Result<InMemoryLedger> {
    let content = read_file(path.as_ref())?;
    load_ledger_snapshot_json(&content).await
}

/// Outcome of verifying one transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionVerdict {
    pub tx_id: String,
    pub verified: bool,
    /// `passed`, `failed` or `not-found`
    pub status: String,
    pub errors: Vec<String>,
}

impl TransactionVerdict {
    pub fn from_lookup(tx_id: &str, lookup: &AgreementLookup) -> Self {
        let (status, errors) = match lookup {
            AgreementLookup::Found {
                verification: VerificationOutcome::Passed { .. },
                ..
            } => ("passed", vec![]),
            AgreementLookup::Found {
                verification: VerificationOutcome::Failed(report),
                ..
            } => (
                "failed",
                report.errors.iter().map(|e| e.to_string()).collect(),
            ),
            AgreementLookup::NotFound { reason } => ("not-found", vec![reason.to_string()]),
        };

        Self {
            tx_id: tx_id.to_string(),
            verified: lookup.is_verified(),
            status: status.to_string(),
            errors,
        }
    }
}

/// Verify the agreement published in `tx_id`
pub async fn verify_transaction(verifier: &AgreementVerifier, tx_id: &str) -> TransactionVerdict {
    let lookup = verifier.get_agreement_from_transaction(tx_id).await;
    TransactionVerdict::from_lookup(tx_id, &lookup)
}

/// Verify many transactions with bounded concurrency, in input order
pub async fn verify_transactions(
    verifier: &AgreementVerifier,
    tx_ids: Vec<String>,
    concurrency: usize,
) -> Vec<TransactionVerdict> {
    verifier
        .verify_transactions(tx_ids, concurrency)
        .await
        .iter()
        .map(|(tx_id, lookup)| TransactionVerdict::from_lookup(tx_id, lookup))
        .collect()
}

/// One requirement of an inspected agreement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementLine {
    pub id: RequirementId,
    pub kind: RequirementKind,
    pub detail: String,
    /// Kind of the proof submitted against it, if any
    pub proof: Option<RequirementKind>,
    pub satisfied: bool,
}

/// Inspection details for an agreement transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgreementInspection {
    pub tx_id: String,
    /// None when the embedded offer does not parse
    pub offer_type: Option<String>,
    pub natural_language: Option<String>,
    pub requirements: Vec<RequirementLine>,
    pub verdict: TransactionVerdict,
    pub summary: OfferSummary,
}

fn describe(requirement: &Requirement) -> String {
    match requirement {
        Requirement::Sign(sign) => {
            let mut detail = format!("signature by {}", sign.pub_key);
            if sign.self_signature.is_some() {
                detail.push_str(" (self-signed)");
            }
            detail
        }
        Requirement::Payment(payment) => match &payment.auth {
            PaymentAuth::SelfAuthenticated => {
                format!("{} to {}, self-authenticated", payment.amount, payment.to)
            }
            PaymentAuth::Remote {
                payment_nonce,
                tx_id,
            } => {
                let mut detail = format!(
                    "{} to {}, remote (nonce {})",
                    payment.amount, payment.to, payment_nonce
                );
                if let Some(tx_id) = tx_id {
                    detail.push_str(&format!(" in {}", tx_id));
                }
                detail
            }
        },
        Requirement::AgreementReference(reference) => match &reference.pointer {
            Some(pointer) => format!("{} agreement at {}", reference.reference_type, pointer),
            None => format!("any {} agreement", reference.reference_type),
        },
    }
}

/// Inspect the agreement published in `tx_id`
///
/// Fails only when the transaction carries no agreement; an agreement that
/// does not verify is still inspected.
pub async fn inspect_transaction(
    verifier: &AgreementVerifier,
    tx_id: &str,
) -> Result<AgreementInspection> {
    let lookup = verifier.get_agreement_from_transaction(tx_id).await;
    let verdict = TransactionVerdict::from_lookup(tx_id, &lookup);

    let (agreement, verification) = match lookup {
        AgreementLookup::Found {
            agreement,
            verification,
            ..
        } => (agreement, verification),
        AgreementLookup::NotFound { reason } => {
            return Err(InspectError::NotFound {
                tx_id: tx_id.to_string(),
                reason: reason.to_string(),
            })
        }
    };

    let offer = match parse_offer(&agreement.offer_content_serialized) {
        Ok(offer) => offer,
        Err(e) => {
            tracing::debug!(tx_id = %tx_id, error = %e, "Embedded offer does not parse");
            return Ok(AgreementInspection {
                tx_id: tx_id.to_string(),
                offer_type: None,
                natural_language: None,
                requirements: vec![],
                verdict,
                summary: OfferSummary::default(),
            });
        }
    };

    let requirements = offer
        .requirements
        .iter()
        .map(|(id, requirement)| RequirementLine {
            id: id.clone(),
            kind: requirement.kind(),
            detail: describe(requirement),
            proof: agreement.proofs.get(id).map(|proof| proof.kind()),
            satisfied: match &verification {
                VerificationOutcome::Passed { .. } => true,
                VerificationOutcome::Failed(report) => report.satisfied.contains(id),
            },
        })
        .collect();

    Ok(AgreementInspection {
        tx_id: tx_id.to_string(),
        offer_type: Some(offer.offer_type_identifier.clone()),
        natural_language: Some(offer.natural_language_offer_content.clone()),
        requirements,
        verdict,
        summary: summarize_offer(&offer),
    })
}

/// Summarize offer JSON
///
/// Unlike [`daia_core::summarize_serialized_offer`] this reports why an
/// offer does not parse.
pub fn summarize_offer_json(json: &str) -> Result<OfferSummary> {
    let offer: OfferContent = parse_offer(json)?;
    Ok(summarize_offer(&offer))
}

/// Summarize an offer file
pub fn summarize_offer_file(path: impl AsRef<Path>) -> Result<OfferSummary> {
    let content = read_file(path.as_ref())?;
    summarize_offer_json(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use daia_core::{serialize_offer, Address, OfferSigner, Resolvers};
    use daia_crypto::{KeyPair, KeyVault, PublicKey};
    use daia_wallet::{OfferBuilder, SpendBudget, VaultSignResolver, WalletPaymentResolver};

    fn park_offer(driver: &PublicKey) -> OfferContent {
        OfferBuilder::new("PARK", "Park at gate 3 for one hour")
            .sign("driver", driver.clone(), "offerer-nonce-1")
            .self_authenticated_payment("fee", "addr", 200)
            .build()
            .unwrap()
    }

    async fn publish_park_agreement(ledger: &InMemoryLedger) -> String {
        let vault = Arc::new(KeyVault::new());
        let (_, driver) = vault.generate_key("driver").unwrap();
        let resolvers = Resolvers::new()
            .with_sign(Arc::new(VaultSignResolver::new(vault)))
            .with_payment(Arc::new(WalletPaymentResolver::new(
                Arc::new(ledger.clone()),
                SpendBudget::unlimited(),
            )));

        let signed = OfferSigner::new(Arc::new(ledger.clone()))
            .sign_offer(&park_offer(&driver), &resolvers)
            .await
            .unwrap();
        signed.publish_all().await.unwrap();
        signed.publication_id().to_string()
    }

    #[tokio::test]
    async fn test_snapshot_round_trip_then_verify() {
        let ledger = InMemoryLedger::new();
        let tx_id = publish_park_agreement(&ledger).await;

        let json = serde_json::to_string(&ledger.export_snapshot().await).unwrap();
        let loaded = load_ledger_snapshot_json(&json).await.unwrap();
        let verifier = AgreementVerifier::new(Arc::new(loaded));

        let verdict = verify_transaction(&verifier, &tx_id).await;
        assert!(verdict.verified);
        assert_eq!(verdict.status, "passed");
        assert!(verdict.errors.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_file() {
        let ledger = InMemoryLedger::new();
        let tx_id = publish_park_agreement(&ledger).await;

        let path = std::env::temp_dir().join(format!("daia-snapshot-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(
            &path,
            serde_json::to_string_pretty(&ledger.export_snapshot().await).unwrap(),
        )
        .unwrap();

        let loaded = load_ledger_snapshot(&path).await;
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded.unwrap().transaction_ids().await, vec![tx_id]);

        assert!(matches!(
            load_ledger_snapshot(&path).await,
            Err(InspectError::Io { .. })
        ));
    }

    #[tokio::test]
    async fn test_bad_snapshot() {
        assert!(matches!(
            load_ledger_snapshot_json("not json").await,
            Err(InspectError::Json(_))
        ));

        let tampered = r#"{"exportedAt": null, "transactions": {"abc": "{}"}}"#;
        assert!(matches!(
            load_ledger_snapshot_json(tampered).await,
            Err(InspectError::Ledger(_))
        ));
    }

    #[tokio::test]
    async fn test_verify_many_keeps_order() {
        let ledger = InMemoryLedger::new();
        let first = publish_park_agreement(&ledger).await;
        let second = publish_park_agreement(&ledger).await;
        let verifier = AgreementVerifier::new(Arc::new(ledger));

        let verdicts = verify_transactions(
            &verifier,
            vec![first.clone(), "missing".to_string(), second.clone()],
            2,
        )
        .await;

        let ids: Vec<&str> = verdicts.iter().map(|v| v.tx_id.as_str()).collect();
        assert_eq!(ids, vec![first.as_str(), "missing", second.as_str()]);
        assert_eq!(verdicts[1].status, "not-found");
        assert!(verdicts[0].verified && verdicts[2].verified);
    }

    #[tokio::test]
    async fn test_inspect_transaction() {
        let ledger = InMemoryLedger::new();
        let tx_id = publish_park_agreement(&ledger).await;
        let verifier = AgreementVerifier::new(Arc::new(ledger));

        let inspection = inspect_transaction(&verifier, &tx_id).await.unwrap();
        assert_eq!(inspection.offer_type.as_deref(), Some("PARK"));
        assert_eq!(inspection.requirements.len(), 2);
        assert!(inspection.requirements.iter().all(|r| r.satisfied));
        assert_eq!(inspection.requirements[1].kind, RequirementKind::Payment);
        assert_eq!(
            inspection.requirements[1].detail,
            "200 to addr, self-authenticated"
        );
        assert_eq!(
            inspection.summary.total_payments,
            BTreeMap::from([(Address::new("addr"), 200)])
        );

        assert!(matches!(
            inspect_transaction(&verifier, "missing").await,
            Err(InspectError::NotFound { .. })
        ));
    }

    #[test]
    fn test_summarize_offer_json() {
        let keypair = KeyPair::generate();
        let json = serialize_offer(&park_offer(&keypair.public_key())).unwrap();

        let summary = summarize_offer_json(&json).unwrap();
        assert_eq!(summary.offer_type_identifier, "PARK");
        assert_eq!(summary.signers, vec![keypair.public_key()]);

        assert!(matches!(
            summarize_offer_json(r#"{"offerTypeIdentifier": "PARK"}"#),
            Err(InspectError::Offer(_))
        ));
    }
}
