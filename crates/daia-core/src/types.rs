//! Offer, requirement, proof and agreement types
//!
//! All of these are closed sets of shapes dispatched by a `type` tag on the
//! wire. Maps are `BTreeMap`s so that iteration and serialization order is a
//! function of the keys alone.

use std::collections::BTreeMap;
use std::fmt;

use daia_crypto::PublicKey;
use serde::{Deserialize, Serialize};

// ============================================================================
// Identifiers
// ============================================================================

/// Key of one requirement within an offer
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequirementId(pub String);

impl RequirementId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequirementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RequirementId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A ledger address that can receive payments
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub String);

impl Address {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ============================================================================
// Offer and requirements
// ============================================================================

/// The content of an offer: what one party wants satisfied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferContent {
    /// Protocol sub-type, checked by recipients before anything else
    pub offer_type_identifier: String,
    /// Human-readable terms
    pub natural_language_offer_content: String,
    pub requirements: BTreeMap<RequirementId, Requirement>,
}

impl OfferContent {
    pub fn new(
        offer_type_identifier: impl Into<String>,
        natural_language_offer_content: impl Into<String>,
    ) -> Self {
        Self {
            offer_type_identifier: offer_type_identifier.into(),
            natural_language_offer_content: natural_language_offer_content.into(),
            requirements: BTreeMap::new(),
        }
    }

    pub fn requirement(&self, id: &RequirementId) -> Option<&Requirement> {
        self.requirements.get(id)
    }

    /// A copy of this offer with every self-signature cleared
    ///
    /// This is the shape whose serialization gets signed.
    pub fn without_self_signatures(&self) -> Self {
        let mut stripped = self.clone();
        for requirement in stripped.requirements.values_mut() {
            if let Requirement::Sign(sign) = requirement {
                sign.self_signature = None;
            }
        }
        stripped
    }
}

/// Discriminant shared by requirements and proofs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequirementKind {
    Sign,
    Payment,
    AgreementReference,
}

impl fmt::Display for RequirementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequirementKind::Sign => write!(f, "sign"),
            RequirementKind::Payment => write!(f, "payment"),
            RequirementKind::AgreementReference => write!(f, "agreement-reference"),
        }
    }
}

/// One clause of an offer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Requirement {
    Sign(SignRequirement),
    Payment(PaymentRequirement),
    AgreementReference(ReferenceRequirement),
}

impl Requirement {
    pub fn kind(&self) -> RequirementKind {
        match self {
            Requirement::Sign(_) => RequirementKind::Sign,
            Requirement::Payment(_) => RequirementKind::Payment,
            Requirement::AgreementReference(_) => RequirementKind::AgreementReference,
        }
    }
}

/// The named key must sign the offer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignRequirement {
    pub pub_key: PublicKey,
    pub offerer_nonce: String,
    /// Signature the offerer already attached, made with an empty signee nonce
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_signature: Option<String>,
}

/// A payment of `amount` must reach `to`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirement {
    pub to: Address,
    pub amount: u64,
    pub auth: PaymentAuth,
}

/// How a payment is proven
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PaymentAuth {
    /// Provable from the transaction that carries the agreement
    SelfAuthenticated,
    /// Provable from a separate transaction committed to `payment_nonce`
    #[serde(rename_all = "camelCase")]
    Remote {
        payment_nonce: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tx_id: Option<String>,
    },
}

/// The agreement depends on another, already-published agreement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceRequirement {
    pub reference_type: String,
    /// Expected locator; when set, the proof must point exactly here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pointer: Option<String>,
}

// ============================================================================
// Proofs and agreements
// ============================================================================

/// Evidence submitted against one requirement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Proof {
    Sign(SignProof),
    Payment(PaymentProof),
    AgreementReference(AgreementReferenceProof),
}

impl Proof {
    pub fn kind(&self) -> RequirementKind {
        match self {
            Proof::Sign(_) => RequirementKind::Sign,
            Proof::Payment(_) => RequirementKind::Payment,
            Proof::AgreementReference(_) => RequirementKind::AgreementReference,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignProof {
    /// Empty for offerer self-signatures
    pub signee_nonce: String,
    /// Hex-encoded signature
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentProof {
    /// Empty means "the carrying transaction itself"
    pub tx_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgreementReferenceProof {
    pub reference: String,
}

/// An offer paired with a complete set of proofs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agreement {
    /// The exact offer bytes every signature covers
    pub offer_content_serialized: String,
    pub proofs: BTreeMap<RequirementId, Proof>,
}

/// Envelope embedded in a published ledger transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum LedgerTransactionData {
    Agreement {
        agreement: Agreement,
    },
    /// Commits a bare payment transaction to exactly one payment nonce
    #[serde(rename_all = "camelCase")]
    PaymentIdentifier {
        payment_nonce: String,
    },
}
