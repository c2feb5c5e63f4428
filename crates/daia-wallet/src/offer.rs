//! Offer construction

use daia_core::{
    signing_bytes, validate_offer, Address, OfferContent, PaymentAuth, PaymentRequirement,
    ReferenceRequirement, Requirement, RequirementId, SignRequirement,
};
use daia_crypto::{random_hex, sign_offer_bytes, KeyPair, PublicKey};

use crate::{Result, WalletError};

/// Random bytes in a generated offerer or payment nonce
pub const OFFER_NONCE_BYTES: usize = 16;

/// Fluent builder for [`OfferContent`]
///
/// Self-signatures cover the requirements present when they are made, so
/// call [`OfferBuilder::self_sign`] after every requirement is added.
#[derive(Debug, Clone)]
pub struct OfferBuilder {
    offer: OfferContent,
}

impl OfferBuilder {
    pub fn new(offer_type: impl Into<String>, natural_language: impl Into<String>) -> Self {
        Self {
            offer: OfferContent::new(offer_type, natural_language),
        }
    }

    pub fn sign(
        mut self,
        id: impl Into<String>,
        pub_key: PublicKey,
        offerer_nonce: impl Into<String>,
    ) -> Self {
        self.offer.requirements.insert(
            RequirementId::new(id),
            Requirement::Sign(SignRequirement {
                pub_key,
                offerer_nonce: offerer_nonce.into(),
                self_signature: None,
            }),
        );
        self
    }

    /// Sign requirement with a random offerer nonce
    pub fn sign_by(self, id: impl Into<String>, pub_key: PublicKey) -> Self {
        self.sign(id, pub_key, random_hex(OFFER_NONCE_BYTES))
    }

    pub fn self_authenticated_payment(
        mut self,
        id: impl Into<String>,
        to: impl Into<Address>,
        amount: u64,
    ) -> Self {
        self.offer.requirements.insert(
            RequirementId::new(id),
            Requirement::Payment(PaymentRequirement {
                to: to.into(),
                amount,
                auth: PaymentAuth::SelfAuthenticated,
            }),
        );
        self
    }

    pub fn remote_payment(
        mut self,
        id: impl Into<String>,
        to: impl Into<Address>,
        amount: u64,
        payment_nonce: impl Into<String>,
    ) -> Self {
        self.offer.requirements.insert(
            RequirementId::new(id),
            Requirement::Payment(PaymentRequirement {
                to: to.into(),
                amount,
                auth: PaymentAuth::Remote {
                    payment_nonce: payment_nonce.into(),
                    tx_id: None,
                },
            }),
        );
        self
    }

    /// Remote payment requirement with a random payment nonce
    pub fn remote_payment_fresh(
        self,
        id: impl Into<String>,
        to: impl Into<Address>,
        amount: u64,
    ) -> Self {
        self.remote_payment(id, to, amount, random_hex(OFFER_NONCE_BYTES))
    }

    pub fn agreement_reference(
        mut self,
        id: impl Into<String>,
        reference_type: impl Into<String>,
        pointer: Option<String>,
    ) -> Self {
        self.offer.requirements.insert(
            RequirementId::new(id),
            Requirement::AgreementReference(ReferenceRequirement {
                reference_type: reference_type.into(),
                pointer,
            }),
        );
        self
    }

    /// Attach the offerer's own signature to sign requirement `id`
    pub fn self_sign(mut self, id: impl Into<String>, keypair: &KeyPair) -> Result<Self> {
        self_sign_offer(&mut self.offer, &RequirementId::new(id), keypair)?;
        Ok(self)
    }

    /// Validate and return the offer
    pub fn build(self) -> Result<OfferContent> {
        validate_offer(&self.offer)?;
        Ok(self.offer)
    }
}

/// Sign requirement `id` of `offer` in place with an empty signee nonce
pub fn self_sign_offer(offer: &mut OfferContent, id: &RequirementId, keypair: &KeyPair) -> Result<()> {
    let bytes = signing_bytes(offer)?;

    let sign = match offer.requirements.get_mut(id) {
        Some(Requirement::Sign(sign)) => sign,
        Some(_) => return Err(WalletError::NotSignRequirement { id: id.clone() }),
        None => return Err(WalletError::RequirementNotFound { id: id.clone() }),
    };
    if sign.pub_key != keypair.public_key() {
        return Err(WalletError::KeyMismatch { id: id.clone() });
    }

    sign.self_signature = Some(sign_offer_bytes(keypair, &bytes, &sign.offerer_nonce, "")?);
    Ok(())
}
