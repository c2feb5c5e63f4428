//! Verification results
//!
//! Verification never returns `Err`. Every way an agreement can fail is
//! reported as data so a caller sees all failing requirements at once.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ledger::{EmbeddedDataError, Transaction};
use crate::types::{Address, Agreement, RequirementId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationErrorKind {
    /// A transaction the proof depends on could not be fetched
    FetchFailed,
    /// The offer bytes do not parse into a valid offer
    SchemaInvalid,
    /// A requirement has no proof
    MissingProof,
    /// The proof is malformed, mistyped, or cryptographically wrong
    InvalidProof,
    /// The proof is well formed but the requirement is not met
    RequirementUnsatisfied,
    Other,
}

impl fmt::Display for VerificationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VerificationErrorKind::FetchFailed => "FETCH_FAILED",
            VerificationErrorKind::SchemaInvalid => "SCHEMA_INVALID",
            VerificationErrorKind::MissingProof => "MISSING_PROOF",
            VerificationErrorKind::InvalidProof => "INVALID_PROOF",
            VerificationErrorKind::RequirementUnsatisfied => "REQUIREMENT_UNSATISFIED",
            VerificationErrorKind::Other => "OTHER",
        };
        f.write_str(s)
    }
}

/// One reported verification failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationError {
    /// `None` for failures that apply to the agreement as a whole
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirement_id: Option<RequirementId>,
    pub kind: VerificationErrorKind,
    pub message: String,
    /// Errors of a referenced agreement, kept as a tree
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nested: Vec<VerificationError>,
}

impl VerificationError {
    pub fn new(
        requirement_id: &RequirementId,
        kind: VerificationErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            requirement_id: Some(requirement_id.clone()),
            kind,
            message: message.into(),
            nested: Vec::new(),
        }
    }

    pub fn blanket(kind: VerificationErrorKind, message: impl Into<String>) -> Self {
        Self {
            requirement_id: None,
            kind,
            message: message.into(),
            nested: Vec::new(),
        }
    }

    pub fn with_nested(mut self, nested: Vec<VerificationError>) -> Self {
        self.nested = nested;
        self
    }
}

impl fmt::Display for VerificationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.requirement_id {
            Some(id) => write!(f, "[{}] {}: {}", self.kind, id, self.message),
            None => write!(f, "[{}] {}", self.kind, self.message),
        }
    }
}

/// Per-requirement breakdown of a failed verification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub satisfied: BTreeSet<RequirementId>,
    pub unsatisfied: BTreeSet<RequirementId>,
    pub errors: Vec<VerificationError>,
}

impl VerificationReport {
    pub(crate) fn blanket(kind: VerificationErrorKind, message: impl Into<String>) -> Self {
        Self {
            errors: vec![VerificationError::blanket(kind, message)],
            ..Default::default()
        }
    }

    /// Error kinds reported for one requirement
    pub fn kinds_for(&self, id: &RequirementId) -> Vec<VerificationErrorKind> {
        self.errors
            .iter()
            .filter(|e| e.requirement_id.as_ref() == Some(id))
            .map(|e| e.kind)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum VerificationOutcome {
    #[serde(rename_all = "camelCase")]
    Passed {
        /// Payments observed on the ledger for the payment requirements, per recipient
        total_payments: BTreeMap<Address, u64>,
    },
    Failed(VerificationReport),
}

impl VerificationOutcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, VerificationOutcome::Passed { .. })
    }

    pub fn report(&self) -> Option<&VerificationReport> {
        match self {
            VerificationOutcome::Passed { .. } => None,
            VerificationOutcome::Failed(report) => Some(report),
        }
    }

    pub fn errors(&self) -> &[VerificationError] {
        self.report().map(|r| r.errors.as_slice()).unwrap_or(&[])
    }
}

/// Why no agreement could be read from a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum NotFoundReason {
    FetchFailed { message: String },
    TransactionMissing,
    EmbeddedData { error: EmbeddedDataError },
}

impl fmt::Display for NotFoundReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotFoundReason::FetchFailed { message } => write!(f, "fetch failed: {}", message),
            NotFoundReason::TransactionMissing => write!(f, "transaction not found"),
            NotFoundReason::EmbeddedData { error } => write!(f, "{}", error),
        }
    }
}

/// Result of reading and verifying the agreement a transaction publishes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "lookup", rename_all = "kebab-case")]
pub enum AgreementLookup {
    Found {
        transaction: Transaction,
        agreement: Agreement,
        verification: VerificationOutcome,
    },
    NotFound {
        reason: NotFoundReason,
    },
}

impl AgreementLookup {
    /// True only when an agreement was found and it verified
    pub fn is_verified(&self) -> bool {
        match self {
            AgreementLookup::Found { verification, .. } => verification.is_passed(),
            AgreementLookup::NotFound { .. } => false,
        }
    }

    pub fn verification(&self) -> Option<&VerificationOutcome> {
        match self {
            AgreementLookup::Found { verification, .. } => Some(verification),
            AgreementLookup::NotFound { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_wire_format() {
        let json = serde_json::to_string(&VerificationErrorKind::RequirementUnsatisfied).unwrap();
        assert_eq!(json, "\"REQUIREMENT_UNSATISFIED\"");
        assert_eq!(VerificationErrorKind::FetchFailed.to_string(), "FETCH_FAILED");
    }

    #[test]
    fn test_outcome_wire_format() {
        let mut totals = BTreeMap::new();
        totals.insert(Address::new("addr"), 200);
        let json = serde_json::to_value(VerificationOutcome::Passed {
            total_payments: totals,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"status": "passed", "totalPayments": {"addr": 200}})
        );

        let failed = VerificationOutcome::Failed(VerificationReport::blanket(
            VerificationErrorKind::SchemaInvalid,
            "bad offer",
        ));
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["errors"][0]["kind"], "SCHEMA_INVALID");
        assert!(json["errors"][0].get("requirementId").is_none());
        assert!(json["errors"][0].get("nested").is_none());
    }

    #[test]
    fn test_error_display() {
        let err = VerificationError::new(
            &RequirementId::new("pay1"),
            VerificationErrorKind::InvalidProof,
            "wrong nonce",
        );
        assert_eq!(err.to_string(), "[INVALID_PROOF] pay1: wrong nonce");
    }
}
