//! DAIA Ledger - In-memory ledger gateway
//!
//! The ledger is:
//! - Content-addressed (a transaction id is the SHA-256 of its raw bytes)
//! - Publish-gated (built transactions are invisible until published)
//! - Append-only (a published id never changes body)
//! - Snapshot-able (export and re-import as JSON)
//!
//! Raw transactions are JSON: `{salt, createdAt, payments, embeddedData}`
//! with the embedded data hex-encoded.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use daia_core::{
    Address, LedgerError, LedgerGateway, Transaction, TransactionData, TransactionHandle,
    TransactionRequest,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, LedgerError>;

/// On-ledger encoding of one transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTransaction {
    /// Keeps otherwise identical transactions apart
    pub salt: String,
    pub created_at: DateTime<Utc>,
    pub payments: BTreeMap<Address, u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedded_data: Option<String>,
}

impl RawTransaction {
    fn from_request(request: TransactionRequest) -> Self {
        Self {
            salt: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            payments: request.payments,
            embedded_data: request.embedded_data.map(hex::encode),
        }
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| LedgerError::MalformedTransaction {
            message: e.to_string(),
        })
    }

    fn into_transaction(self, id: String) -> Result<Transaction> {
        let embedded_data = self
            .embedded_data
            .map(hex::decode)
            .transpose()
            .map_err(|e| LedgerError::MalformedTransaction {
                message: format!("embedded data is not hex: {}", e),
            })?;

        Ok(Transaction {
            id,
            data: TransactionData {
                embedded_data,
                payments: self.payments,
            },
        })
    }
}

/// Transaction id for raw bytes
pub fn transaction_id(raw: &[u8]) -> String {
    daia_crypto::sha256_hex(raw)
}

/// Decode raw bytes into a transaction
pub fn decode_transaction(raw: &[u8]) -> Result<Transaction> {
    let parsed: RawTransaction =
        serde_json::from_slice(raw).map_err(|e| LedgerError::MalformedTransaction {
            message: e.to_string(),
        })?;
    parsed.into_transaction(transaction_id(raw))
}

/// Every published transaction, as raw JSON text keyed by id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSnapshot {
    pub exported_at: Option<DateTime<Utc>>,
    pub transactions: BTreeMap<String, String>,
}

type Store = Arc<RwLock<HashMap<String, Vec<u8>>>>;

/// Thread-safe in-memory ledger
#[derive(Clone, Default)]
pub struct InMemoryLedger {
    published: Store,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every fetch and publish fail with [`LedgerError::Unavailable`]
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable {
                message: "in-memory ledger is offline".to_string(),
            });
        }
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.published.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.published.read().await.is_empty()
    }

    pub async fn transaction_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.published.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Publish transaction bytes built elsewhere
    ///
    /// Returns the transaction id.
    pub async fn submit_raw(&self, raw: &[u8]) -> Result<String> {
        self.check_available()?;
        let transaction = decode_transaction(raw)?;
        store(&self.published, &transaction.id, raw).await?;
        Ok(transaction.id)
    }

    pub async fn export_snapshot(&self) -> LedgerSnapshot {
        let published = self.published.read().await;
        let transactions = published
            .iter()
            .map(|(id, raw)| (id.clone(), String::from_utf8_lossy(raw).into_owned()))
            .collect();

        LedgerSnapshot {
            exported_at: Some(Utc::now()),
            transactions,
        }
    }

    /// Load a snapshot, checking every id against its body
    ///
    /// Returns how many transactions were added.
    pub async fn import_snapshot(&self, snapshot: &LedgerSnapshot) -> Result<usize> {
        for (id, raw) in &snapshot.transactions {
            let computed = transaction_id(raw.as_bytes());
            if *id != computed {
                return Err(LedgerError::MalformedTransaction {
                    message: format!("snapshot entry {} hashes to {}", id, computed),
                });
            }
            decode_transaction(raw.as_bytes())?;
        }

        let before = self.len().await;
        for (id, raw) in &snapshot.transactions {
            store(&self.published, id, raw.as_bytes()).await?;
        }
        let added = self.len().await - before;

        tracing::info!(added = added, total = snapshot.transactions.len(), "Ledger snapshot imported");
        Ok(added)
    }

    pub async fn from_snapshot(snapshot: &LedgerSnapshot) -> Result<Self> {
        let ledger = Self::new();
        ledger.import_snapshot(snapshot).await?;
        Ok(ledger)
    }
}

async fn store(published: &Store, id: &str, raw: &[u8]) -> Result<()> {
    let mut published = published.write().await;
    match published.get(id) {
        Some(existing) if existing.as_slice() == raw => {
            tracing::debug!(tx_id = %id, "Transaction already published");
            Ok(())
        }
        Some(_) => Err(LedgerError::Conflict {
            tx_id: id.to_string(),
        }),
        None => {
            published.insert(id.to_string(), raw.to_vec());
            tracing::debug!(tx_id = %id, "Transaction published");
            Ok(())
        }
    }
}

/// A built, not yet published transaction
#[derive(Debug)]
pub struct InMemoryHandle {
    id: String,
    raw: Vec<u8>,
    published: Store,
    unavailable: Arc<AtomicBool>,
}

#[async_trait]
impl TransactionHandle for InMemoryHandle {
    fn id(&self) -> &str {
        &self.id
    }

    fn serialize(&self) -> Vec<u8> {
        self.raw.clone()
    }

    async fn publish(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable {
                message: "in-memory ledger is offline".to_string(),
            });
        }
        store(&self.published, &self.id, &self.raw).await
    }
}

#[async_trait]
impl LedgerGateway for InMemoryLedger {
    async fn find_transaction_by_id(&self, id: &str) -> Result<Option<Transaction>> {
        self.check_available()?;
        let raw = match self.published.read().await.get(id) {
            Some(raw) => raw.clone(),
            None => return Ok(None),
        };
        decode_transaction(&raw).map(Some)
    }

    fn parse_transaction(&self, raw: &[u8]) -> Result<Transaction> {
        decode_transaction(raw)
    }

    async fn make_transaction(
        &self,
        request: TransactionRequest,
    ) -> Result<Box<dyn TransactionHandle>> {
        if let Some((to, _)) = request.payments.iter().find(|(_, amount)| **amount == 0) {
            return Err(LedgerError::Rejected {
                message: format!("zero payment to {}", to),
            });
        }

        let raw = RawTransaction::from_request(request).to_bytes()?;
        let id = transaction_id(&raw);
        tracing::debug!(tx_id = %id, bytes = raw.len(), "Transaction built");

        Ok(Box::new(InMemoryHandle {
            id,
            raw,
            published: self.published.clone(),
            unavailable: self.unavailable.clone(),
        }))
    }
}
