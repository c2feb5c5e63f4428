//! Fixtures for unit tests: an in-memory gateway and offer builders

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use daia_crypto::KeyPair;

use crate::codec::{encode_transaction_data, signing_bytes};
use crate::error::{LedgerError, ResolveError};
use crate::ledger::{LedgerGateway, Transaction, TransactionData, TransactionHandle, TransactionRequest};
use crate::resolver::{
    PaymentResolution, PaymentResolver, ReferenceResolution, ReferenceResolver, SignResolution,
    SignResolver,
};
use crate::types::*;

// ============================================================================
// Mock ledger
// ============================================================================

#[derive(Debug, Default)]
struct MockState {
    transactions: HashMap<String, Transaction>,
    next_id: u64,
    unavailable: bool,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MockLedger {
    state: Arc<Mutex<MockState>>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, transaction: Transaction) {
        self.state
            .lock()
            .unwrap()
            .transactions
            .insert(transaction.id.clone(), transaction);
    }

    pub fn get(&self, id: &str) -> Option<Transaction> {
        self.state.lock().unwrap().transactions.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().transactions.len()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unwrap().unavailable = unavailable;
    }

    /// Publish `agreement` under a chosen id
    pub fn insert_agreement(
        &self,
        id: &str,
        agreement: &Agreement,
        payments: &[(&str, u64)],
    ) -> Transaction {
        let data = LedgerTransactionData::Agreement {
            agreement: agreement.clone(),
        };
        let transaction = Transaction {
            id: id.to_string(),
            data: TransactionData {
                embedded_data: Some(encode_transaction_data(&data).unwrap()),
                payments: payment_map(payments),
            },
        };
        self.insert(transaction.clone());
        transaction
    }

    /// Publish a remote payment committed to `nonce`
    pub fn insert_payment(&self, id: &str, nonce: &str, to: &str, amount: u64) -> Transaction {
        let data = LedgerTransactionData::PaymentIdentifier {
            payment_nonce: nonce.to_string(),
        };
        let transaction = Transaction {
            id: id.to_string(),
            data: TransactionData {
                embedded_data: Some(encode_transaction_data(&data).unwrap()),
                payments: payment_map(&[(to, amount)]),
            },
        };
        self.insert(transaction.clone());
        transaction
    }
}

#[derive(Debug)]
pub(crate) struct MockHandle {
    transaction: Transaction,
    ledger: MockLedger,
}

#[async_trait]
impl TransactionHandle for MockHandle {
    fn id(&self) -> &str {
        &self.transaction.id
    }

    fn serialize(&self) -> Vec<u8> {
        serde_json::to_vec(&self.transaction).unwrap_or_default()
    }

    async fn publish(&self) -> Result<(), LedgerError> {
        if self.ledger.state.lock().unwrap().unavailable {
            return Err(LedgerError::Unavailable {
                message: "mock ledger is offline".to_string(),
            });
        }
        self.ledger.insert(self.transaction.clone());
        Ok(())
    }
}

#[async_trait]
impl LedgerGateway for MockLedger {
    async fn find_transaction_by_id(&self, id: &str) -> Result<Option<Transaction>, LedgerError> {
        let state = self.state.lock().unwrap();
        if state.unavailable {
            return Err(LedgerError::Unavailable {
                message: "mock ledger is offline".to_string(),
            });
        }
        Ok(state.transactions.get(id).cloned())
    }

    fn parse_transaction(&self, raw: &[u8]) -> Result<Transaction, LedgerError> {
        serde_json::from_slice(raw).map_err(|e| LedgerError::MalformedTransaction {
            message: e.to_string(),
        })
    }

    async fn make_transaction(
        &self,
        request: TransactionRequest,
    ) -> Result<Box<dyn TransactionHandle>, LedgerError> {
        let id = {
            let mut state = self.state.lock().unwrap();
            state.next_id += 1;
            format!("tx-{}", state.next_id)
        };
        Ok(Box::new(MockHandle {
            transaction: Transaction {
                id,
                data: TransactionData {
                    embedded_data: request.embedded_data,
                    payments: request.payments,
                },
            },
            ledger: self.clone(),
        }))
    }
}

pub(crate) fn payment_map(payments: &[(&str, u64)]) -> BTreeMap<Address, u64> {
    payments
        .iter()
        .map(|(to, amount)| (Address::new(*to), *amount))
        .collect()
}

// ============================================================================
// Offers and proofs
// ============================================================================

pub(crate) fn sign_requirement(keypair: &KeyPair, offerer_nonce: &str) -> Requirement {
    Requirement::Sign(SignRequirement {
        pub_key: keypair.public_key(),
        offerer_nonce: offerer_nonce.to_string(),
        self_signature: None,
    })
}

pub(crate) fn self_auth_payment(to: &str, amount: u64) -> Requirement {
    Requirement::Payment(PaymentRequirement {
        to: Address::new(to),
        amount,
        auth: PaymentAuth::SelfAuthenticated,
    })
}

pub(crate) fn remote_payment(to: &str, amount: u64, nonce: &str) -> Requirement {
    Requirement::Payment(PaymentRequirement {
        to: Address::new(to),
        amount,
        auth: PaymentAuth::Remote {
            payment_nonce: nonce.to_string(),
            tx_id: None,
        },
    })
}

pub(crate) fn reference_requirement(reference_type: &str, pointer: Option<&str>) -> Requirement {
    Requirement::AgreementReference(ReferenceRequirement {
        reference_type: reference_type.to_string(),
        pointer: pointer.map(str::to_string),
    })
}

pub(crate) fn sign_proof(signee_nonce: &str, signature: &str) -> Proof {
    Proof::Sign(SignProof {
        signee_nonce: signee_nonce.to_string(),
        signature: signature.to_string(),
    })
}

pub(crate) fn payment_proof(tx_id: &str) -> Proof {
    Proof::Payment(PaymentProof {
        tx_id: tx_id.to_string(),
    })
}

pub(crate) fn reference_proof(reference: &str) -> Proof {
    Proof::AgreementReference(AgreementReferenceProof {
        reference: reference.to_string(),
    })
}

/// Pair an offer with hand-made proofs
pub(crate) fn agreement_for(offer: &OfferContent, proofs: &[(&str, Proof)]) -> Agreement {
    Agreement {
        offer_content_serialized: signing_bytes(offer).unwrap(),
        proofs: proofs
            .iter()
            .map(|(id, proof)| (RequirementId::new(*id), proof.clone()))
            .collect(),
    }
}

// ============================================================================
// Resolvers
// ============================================================================

/// Signs for one key with a fixed signee nonce
pub(crate) struct KeySigner {
    pub keypair: KeyPair,
    pub signee_nonce: String,
}

#[async_trait]
impl SignResolver for KeySigner {
    async fn create_proof(
        &self,
        offer_bytes: &str,
        offerer_nonce: &str,
        pub_key: &daia_crypto::PublicKey,
    ) -> Result<Option<SignResolution>, ResolveError> {
        if *pub_key != self.keypair.public_key() {
            return Ok(None);
        }
        let signature = daia_crypto::sign_offer_bytes(
            &self.keypair,
            offer_bytes,
            offerer_nonce,
            &self.signee_nonce,
        )?;
        Ok(Some(SignResolution {
            signee_nonce: self.signee_nonce.clone(),
            signature,
        }))
    }
}

/// Pays whatever is asked: in place, or through a nonce-tagged transaction
pub(crate) struct OpenWallet {
    pub ledger: MockLedger,
}

#[async_trait]
impl PaymentResolver for OpenWallet {
    async fn create_proof(
        &self,
        requirement: &PaymentRequirement,
    ) -> Result<Option<PaymentResolution>, ResolveError> {
        match &requirement.auth {
            PaymentAuth::SelfAuthenticated => {
                let mut payments = BTreeMap::new();
                payments.insert(requirement.to.clone(), requirement.amount);
                Ok(Some(PaymentResolution::SelfAuthenticated { payments }))
            }
            PaymentAuth::Remote { payment_nonce, .. } => {
                let data = LedgerTransactionData::PaymentIdentifier {
                    payment_nonce: payment_nonce.clone(),
                };
                let mut payments = BTreeMap::new();
                payments.insert(requirement.to.clone(), requirement.amount);
                let handle = self
                    .ledger
                    .make_transaction(TransactionRequest {
                        payments,
                        embedded_data: Some(
                            encode_transaction_data(&data)
                                .map_err(|e| ResolveError::Other(e.to_string()))?,
                        ),
                    })
                    .await?;
                Ok(Some(PaymentResolution::RemoteTx { handle }))
            }
        }
    }
}

/// Resolves reference types from a fixed table
pub(crate) struct ReferenceTable(pub HashMap<String, String>);

#[async_trait]
impl ReferenceResolver for ReferenceTable {
    async fn create_proof(
        &self,
        reference_type: &str,
    ) -> Result<Option<ReferenceResolution>, ResolveError> {
        Ok(self.0.get(reference_type).map(|pointer| ReferenceResolution {
            pointer: pointer.clone(),
        }))
    }
}

/// Declines everything
pub(crate) struct Declining;

#[async_trait]
impl SignResolver for Declining {
    async fn create_proof(
        &self,
        _offer_bytes: &str,
        _offerer_nonce: &str,
        _pub_key: &daia_crypto::PublicKey,
    ) -> Result<Option<SignResolution>, ResolveError> {
        Ok(None)
    }
}

#[async_trait]
impl PaymentResolver for Declining {
    async fn create_proof(
        &self,
        _requirement: &PaymentRequirement,
    ) -> Result<Option<PaymentResolution>, ResolveError> {
        Ok(None)
    }
}

/// Fails every payment with an error
pub(crate) struct Broken;

#[async_trait]
impl PaymentResolver for Broken {
    async fn create_proof(
        &self,
        _requirement: &PaymentRequirement,
    ) -> Result<Option<PaymentResolution>, ResolveError> {
        Err(ResolveError::Other("wallet locked".to_string()))
    }
}
