//! Read-only offer summaries
//!
//! The only tolerant operation in the crate: a summary never fails. Payment
//! aggregates that would overflow come back empty instead of wrapped or
//! clamped, and text that does not parse summarizes to the empty summary.

use std::collections::BTreeMap;

use daia_crypto::PublicKey;
use serde::{Deserialize, Serialize};

use crate::codec::parse_offer;
use crate::types::{Address, OfferContent, PaymentAuth, Requirement};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferSummary {
    pub offer_type_identifier: String,
    /// Every payment the offer requires, summed per recipient
    pub total_payments: BTreeMap<Address, u64>,
    pub self_authenticated_payments: BTreeMap<Address, u64>,
    pub remote_payments: BTreeMap<Address, u64>,
    pub signers: Vec<PublicKey>,
    pub reference_types: Vec<String>,
}

pub fn summarize_offer(offer: &OfferContent) -> OfferSummary {
    let payments = || {
        offer.requirements.values().filter_map(|r| match r {
            Requirement::Payment(p) => Some(p),
            _ => None,
        })
    };

    let total_payments = aggregate(payments().map(|p| (&p.to, p.amount)));
    let self_authenticated_payments = aggregate(
        payments()
            .filter(|p| matches!(p.auth, PaymentAuth::SelfAuthenticated))
            .map(|p| (&p.to, p.amount)),
    );
    let remote_payments = aggregate(
        payments()
            .filter(|p| matches!(p.auth, PaymentAuth::Remote { .. }))
            .map(|p| (&p.to, p.amount)),
    );

    let signers = offer
        .requirements
        .values()
        .filter_map(|r| match r {
            Requirement::Sign(s) => Some(s.pub_key.clone()),
            _ => None,
        })
        .collect();

    let reference_types = offer
        .requirements
        .values()
        .filter_map(|r| match r {
            Requirement::AgreementReference(a) => Some(a.reference_type.clone()),
            _ => None,
        })
        .collect();

    OfferSummary {
        offer_type_identifier: offer.offer_type_identifier.clone(),
        total_payments,
        self_authenticated_payments,
        remote_payments,
        signers,
        reference_types,
    }
}

/// Summarize serialized offer text; unparseable text gives an empty summary
pub fn summarize_serialized_offer(text: &str) -> OfferSummary {
    parse_offer(text)
        .map(|offer| summarize_offer(&offer))
        .unwrap_or_default()
}

/// Sum amounts per address, or nothing at all on overflow
pub(crate) fn aggregate<'a>(
    amounts: impl Iterator<Item = (&'a Address, u64)>,
) -> BTreeMap<Address, u64> {
    let mut totals: BTreeMap<Address, u64> = BTreeMap::new();
    for (address, amount) in amounts {
        let entry = totals.entry(address.clone()).or_insert(0);
        match entry.checked_add(amount) {
            Some(sum) => *entry = sum,
            None => return BTreeMap::new(),
        }
    }
    totals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::serialize_offer;
    use crate::types::*;

    fn payment(to: &str, amount: u64, auth: PaymentAuth) -> Requirement {
        Requirement::Payment(PaymentRequirement {
            to: Address::new(to),
            amount,
            auth,
        })
    }

    fn remote(nonce: &str) -> PaymentAuth {
        PaymentAuth::Remote {
            payment_nonce: nonce.to_string(),
            tx_id: None,
        }
    }

    #[test]
    fn test_summary_aggregates_per_address() {
        let mut offer = OfferContent::new("PARK", "");
        offer.requirements.insert("a".into(), payment("gate", 100, PaymentAuth::SelfAuthenticated));
        offer.requirements.insert("b".into(), payment("gate", 50, remote("n1")));
        offer.requirements.insert("c".into(), payment("city", 7, PaymentAuth::SelfAuthenticated));
        offer.requirements.insert(
            "d".into(),
            Requirement::AgreementReference(ReferenceRequirement {
                reference_type: "PERMIT".to_string(),
                pointer: None,
            }),
        );

        let summary = summarize_offer(&offer);
        assert_eq!(summary.total_payments[&Address::new("gate")], 150);
        assert_eq!(summary.total_payments[&Address::new("city")], 7);
        assert_eq!(summary.self_authenticated_payments[&Address::new("gate")], 100);
        assert_eq!(summary.remote_payments[&Address::new("gate")], 50);
        assert!(!summary.remote_payments.contains_key(&Address::new("city")));
        assert_eq!(summary.reference_types, vec!["PERMIT".to_string()]);
        assert!(summary.signers.is_empty());
    }

    #[test]
    fn test_overflow_yields_empty_aggregate() {
        let mut offer = OfferContent::new("PARK", "");
        offer.requirements.insert("a".into(), payment("gate", u64::MAX, PaymentAuth::SelfAuthenticated));
        offer.requirements.insert("b".into(), payment("gate", 1, PaymentAuth::SelfAuthenticated));

        let summary = summarize_offer(&offer);
        assert!(summary.total_payments.is_empty());
        assert!(summary.self_authenticated_payments.is_empty());
        assert_eq!(summary.offer_type_identifier, "PARK");
    }

    #[test]
    fn test_serialized_summary() {
        let mut offer = OfferContent::new("PARK", "");
        offer.requirements.insert("a".into(), payment("gate", 100, PaymentAuth::SelfAuthenticated));
        let text = serialize_offer(&offer).unwrap();

        assert_eq!(
            summarize_serialized_offer(&text).total_payments[&Address::new("gate")],
            100
        );
        assert_eq!(summarize_serialized_offer("not an offer"), OfferSummary::default());
    }
}
