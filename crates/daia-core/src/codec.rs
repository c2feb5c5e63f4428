//! Canonical offer codec
//!
//! Offers serialize to compact JSON. Field order follows the struct
//! declarations and requirement order follows the `BTreeMap` keys, so the
//! output is a function of the in-memory value.
//!
//! **Verifiers never call [`serialize_offer`] on a received offer.** They
//! check signatures against `Agreement::offer_content_serialized` exactly as
//! it arrived; two equal values are not guaranteed to serialize to identical
//! bytes across versions.

use std::collections::BTreeSet;

use crate::error::CodecError;
use crate::types::{LedgerTransactionData, OfferContent, PaymentAuth, Requirement};

/// Serialize an offer, self-signatures included
pub fn serialize_offer(offer: &OfferContent) -> Result<String, CodecError> {
    Ok(serde_json::to_string(offer)?)
}

/// Parse and validate an offer
pub fn parse_offer(text: &str) -> Result<OfferContent, CodecError> {
    let offer: OfferContent = serde_json::from_str(text)?;
    validate_offer(&offer)?;
    Ok(offer)
}

/// The bytes that go into `offer_content_serialized` and under every signature
///
/// Self-signatures are cleared first: a self-signature lives inside the
/// requirement it satisfies, so it cannot cover itself.
pub fn signing_bytes(offer: &OfferContent) -> Result<String, CodecError> {
    serialize_offer(&offer.without_self_signatures())
}

/// Structural checks every offer must pass before it is signed or verified
pub fn validate_offer(offer: &OfferContent) -> Result<(), CodecError> {
    if offer.offer_type_identifier.trim().is_empty() {
        return Err(CodecError::invalid("offer type identifier is empty"));
    }
    if offer.requirements.is_empty() {
        return Err(CodecError::invalid("offer declares no requirements"));
    }

    let mut payment_nonces = BTreeSet::new();

    for (id, requirement) in &offer.requirements {
        if id.as_str().is_empty() {
            return Err(CodecError::invalid("requirement id is empty"));
        }

        match requirement {
            Requirement::Sign(sign) => {
                if sign.pub_key.key.is_empty() {
                    return Err(CodecError::invalid(format!("{}: public key is empty", id)));
                }
                if sign.offerer_nonce.is_empty() {
                    return Err(CodecError::invalid(format!("{}: offerer nonce is empty", id)));
                }
            }
            Requirement::Payment(payment) => {
                if payment.to.as_str().is_empty() {
                    return Err(CodecError::invalid(format!("{}: payment recipient is empty", id)));
                }
                if payment.amount == 0 {
                    return Err(CodecError::invalid(format!("{}: payment amount is zero", id)));
                }
                if let PaymentAuth::Remote {
                    payment_nonce,
                    tx_id,
                } = &payment.auth
                {
                    if payment_nonce.is_empty() {
                        return Err(CodecError::invalid(format!("{}: payment nonce is empty", id)));
                    }
                    if tx_id.as_deref() == Some("") {
                        return Err(CodecError::invalid(format!("{}: hinted tx id is empty", id)));
                    }
                    // One payment transaction commits to one nonce, so two
                    // requirements sharing a nonce could share one payment.
                    if !payment_nonces.insert(payment_nonce.as_str()) {
                        return Err(CodecError::invalid(format!(
                            "{}: payment nonce {} is used by another requirement",
                            id, payment_nonce
                        )));
                    }
                }
            }
            Requirement::AgreementReference(reference) => {
                if reference.reference_type.is_empty() {
                    return Err(CodecError::invalid(format!("{}: reference type is empty", id)));
                }
                if reference.pointer.as_deref() == Some("") {
                    return Err(CodecError::invalid(format!("{}: reference pointer is empty", id)));
                }
            }
        }
    }

    Ok(())
}

/// Encode the envelope embedded in a ledger transaction
pub fn encode_transaction_data(data: &LedgerTransactionData) -> Result<Vec<u8>, CodecError> {
    Ok(serde_json::to_vec(data)?)
}

/// Decode the envelope embedded in a ledger transaction
pub fn decode_transaction_data(bytes: &[u8]) -> Result<LedgerTransactionData, CodecError> {
    let text = std::str::from_utf8(bytes).map_err(|e| CodecError::InvalidEncoding {
        message: e.to_string(),
    })?;
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::*;
    use daia_crypto::PublicKey;

    fn park_offer() -> OfferContent {
        let mut offer = OfferContent::new("PARK", "Park at gate 3 for one hour");
        offer.requirements.insert(
            RequirementId::new("sign1"),
            Requirement::Sign(SignRequirement {
                pub_key: PublicKey::ed25519("aa".repeat(32)),
                offerer_nonce: "offerer-nonce".to_string(),
                self_signature: None,
            }),
        );
        offer.requirements.insert(
            RequirementId::new("pay1"),
            Requirement::Payment(PaymentRequirement {
                to: Address::new("addr"),
                amount: 200,
                auth: PaymentAuth::SelfAuthenticated,
            }),
        );
        offer.requirements.insert(
            RequirementId::new("ref1"),
            Requirement::AgreementReference(ReferenceRequirement {
                reference_type: "MEMBERSHIP".to_string(),
                pointer: None,
            }),
        );
        offer
    }

    fn remote(nonce: &str) -> Requirement {
        Requirement::Payment(PaymentRequirement {
            to: Address::new("addr"),
            amount: 10,
            auth: PaymentAuth::Remote {
                payment_nonce: nonce.to_string(),
                tx_id: None,
            },
        })
    }

    #[test]
    fn test_round_trip() {
        let offer = park_offer();
        let text = serialize_offer(&offer).unwrap();
        assert_eq!(parse_offer(&text).unwrap(), offer);
    }

    #[test]
    fn test_round_trip_keeps_self_signature() {
        let mut offer = park_offer();
        if let Some(Requirement::Sign(sign)) = offer.requirements.get_mut(&RequirementId::new("sign1")) {
            sign.self_signature = Some("abcd".to_string());
        }
        let text = serialize_offer(&offer).unwrap();
        assert_eq!(parse_offer(&text).unwrap(), offer);
    }

    #[test]
    fn test_serialization_is_deterministic() {
        let a = serialize_offer(&park_offer()).unwrap();
        let b = serialize_offer(&park_offer()).unwrap();
        assert_eq!(a, b);
        // Requirement keys come out sorted regardless of insertion order
        assert!(a.find("\"pay1\"").unwrap() < a.find("\"ref1\"").unwrap());
        assert!(a.find("\"ref1\"").unwrap() < a.find("\"sign1\"").unwrap());
    }

    #[test]
    fn test_signing_bytes_exclude_self_signatures() {
        let plain = park_offer();
        let mut signed = park_offer();
        if let Some(Requirement::Sign(sign)) = signed.requirements.get_mut(&RequirementId::new("sign1")) {
            sign.self_signature = Some("abcd".to_string());
        }

        assert_eq!(signing_bytes(&plain).unwrap(), signing_bytes(&signed).unwrap());
        assert!(!signing_bytes(&signed).unwrap().contains("selfSignature"));
    }

    #[test]
    fn test_parse_rejects_malformed_json() {
        assert!(matches!(parse_offer("{not json"), Err(CodecError::Json(_))));
    }

    #[test]
    fn test_parse_rejects_unknown_requirement_type() {
        let text = r#"{"offerTypeIdentifier":"PARK","naturalLanguageOfferContent":"",
            "requirements":{"x":{"type":"teleport"}}}"#;
        assert!(matches!(parse_offer(text), Err(CodecError::Json(_))));
    }

    #[test]
    fn test_validate_rejects_bad_shapes() {
        let mut empty_type = park_offer();
        empty_type.offer_type_identifier = " ".to_string();
        assert!(validate_offer(&empty_type).is_err());

        let no_requirements = OfferContent::new("PARK", "");
        assert!(validate_offer(&no_requirements).is_err());

        let mut zero_amount = park_offer();
        zero_amount.requirements.insert(
            RequirementId::new("pay1"),
            Requirement::Payment(PaymentRequirement {
                to: Address::new("addr"),
                amount: 0,
                auth: PaymentAuth::SelfAuthenticated,
            }),
        );
        assert!(validate_offer(&zero_amount).is_err());
    }

    #[test]
    fn test_validate_rejects_shared_payment_nonce() {
        let mut offer = park_offer();
        offer.requirements.insert(RequirementId::new("payA"), remote("n1"));
        offer.requirements.insert(RequirementId::new("payB"), remote("n1"));
        let err = validate_offer(&offer).unwrap_err();
        assert!(err.to_string().contains("n1"));

        offer.requirements.insert(RequirementId::new("payB"), remote("n2"));
        assert!(validate_offer(&offer).is_ok());
    }

    #[test]
    fn test_transaction_data_codec() {
        let data = LedgerTransactionData::PaymentIdentifier {
            payment_nonce: "n1".to_string(),
        };
        let bytes = encode_transaction_data(&data).unwrap();
        assert_eq!(decode_transaction_data(&bytes).unwrap(), data);

        assert!(matches!(
            decode_transaction_data(&[0xff, 0xfe]),
            Err(CodecError::InvalidEncoding { .. })
        ));
        assert!(matches!(
            decode_transaction_data(br#"{"type":"unknown"}"#),
            Err(CodecError::Json(_))
        ));
    }
}
