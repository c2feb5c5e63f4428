//! Ledger transaction gateway
//!
//! The protocol engine never builds ledger-specific bytes. It asks a gateway
//! to fetch, parse and build transactions, and reads only the embedded data
//! and the payments each transaction makes.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::codec::decode_transaction_data;
use crate::error::LedgerError;
use crate::types::{Address, Agreement, LedgerTransactionData};

/// What a transaction carries, as far as the protocol cares
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedded_data: Option<Vec<u8>>,
    /// Total paid to each address by this transaction
    #[serde(default)]
    pub payments: BTreeMap<Address, u64>,
}

/// A transaction observed on the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub data: TransactionData,
}

impl Transaction {
    pub fn payment_to(&self, address: &Address) -> Option<u64> {
        self.data.payments.get(address).copied()
    }

    /// Decode the embedded protocol envelope
    pub fn ledger_data(&self) -> Result<LedgerTransactionData, EmbeddedDataError> {
        let bytes = self
            .data
            .embedded_data
            .as_deref()
            .ok_or(EmbeddedDataError::Missing)?;
        decode_transaction_data(bytes).map_err(|e| EmbeddedDataError::Malformed(e.to_string()))
    }

    /// The agreement this transaction publishes, if it publishes one
    pub fn agreement(&self) -> Result<Agreement, EmbeddedDataError> {
        match self.ledger_data()? {
            LedgerTransactionData::Agreement { agreement } => Ok(agreement),
            LedgerTransactionData::PaymentIdentifier { .. } => {
                Err(EmbeddedDataError::NotAnAgreement)
            }
        }
    }
}

/// Why a transaction's embedded data could not be used
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "reason", content = "detail", rename_all = "kebab-case")]
pub enum EmbeddedDataError {
    #[error("transaction carries no embedded data")]
    Missing,
    #[error("embedded data is malformed: {0}")]
    Malformed(String),
    #[error("embedded data is a payment identifier, not an agreement")]
    NotAnAgreement,
}

/// Request to build a new transaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionRequest {
    pub payments: BTreeMap<Address, u64>,
    pub embedded_data: Option<Vec<u8>>,
}

/// A built transaction that can be serialized and published
#[async_trait]
pub trait TransactionHandle: Send + Sync + fmt::Debug {
    fn id(&self) -> &str;

    /// Raw ledger bytes, parseable by the gateway that built them
    fn serialize(&self) -> Vec<u8>;

    async fn publish(&self) -> Result<(), LedgerError>;
}

/// The ledger capability the engine consumes
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Fetch a published transaction by id or locator
    async fn find_transaction_by_id(&self, id: &str) -> Result<Option<Transaction>, LedgerError>;

    fn parse_transaction(&self, raw: &[u8]) -> Result<Transaction, LedgerError>;

    async fn make_transaction(
        &self,
        request: TransactionRequest,
    ) -> Result<Box<dyn TransactionHandle>, LedgerError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_transaction_data;

    fn tx_with(data: Option<Vec<u8>>) -> Transaction {
        Transaction {
            id: "tx".to_string(),
            data: TransactionData {
                embedded_data: data,
                payments: BTreeMap::new(),
            },
        }
    }

    #[test]
    fn test_agreement_extraction() {
        assert_eq!(tx_with(None).agreement(), Err(EmbeddedDataError::Missing));
        assert!(matches!(
            tx_with(Some(b"garbage".to_vec())).agreement(),
            Err(EmbeddedDataError::Malformed(_))
        ));

        let payment = encode_transaction_data(&LedgerTransactionData::PaymentIdentifier {
            payment_nonce: "n1".to_string(),
        })
        .unwrap();
        assert_eq!(
            tx_with(Some(payment)).agreement(),
            Err(EmbeddedDataError::NotAnAgreement)
        );

        let agreement = Agreement {
            offer_content_serialized: "{}".to_string(),
            proofs: BTreeMap::new(),
        };
        let bytes = encode_transaction_data(&LedgerTransactionData::Agreement {
            agreement: agreement.clone(),
        })
        .unwrap();
        assert_eq!(tx_with(Some(bytes)).agreement(), Ok(agreement));
    }
}
