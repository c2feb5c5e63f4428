//! Budget-limited payment resolver

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use daia_core::{
    encode_transaction_data, LedgerGateway, LedgerTransactionData, PaymentAuth,
    PaymentRequirement, PaymentResolution, PaymentResolver, ResolveError, TransactionRequest,
};
use tokio::sync::Mutex;

use crate::budget::SpendBudget;

/// Pays requirements out of a [`SpendBudget`]
///
/// Self-authenticated requirements become outputs of the agreement
/// transaction. Remote requirements get their own transaction, tagged with
/// the requirement's payment nonce. Payments the budget refuses are
/// declined.
///
/// Each resolution holds its amount against the budget. The signer releases
/// it again if the offer is never signed.
pub struct WalletPaymentResolver {
    ledger: Arc<dyn LedgerGateway>,
    budget: SpendBudget,
    spent: Mutex<u64>,
}

impl WalletPaymentResolver {
    pub fn new(ledger: Arc<dyn LedgerGateway>, budget: SpendBudget) -> Self {
        Self {
            ledger,
            budget,
            spent: Mutex::new(0),
        }
    }

    pub fn budget(&self) -> &SpendBudget {
        &self.budget
    }

    /// Total held by resolutions that were not released
    pub async fn spent(&self) -> u64 {
        *self.spent.lock().await
    }

    pub async fn remaining(&self) -> Option<u64> {
        self.budget.remaining(self.spent().await)
    }
}

#[async_trait]
impl PaymentResolver for WalletPaymentResolver {
    async fn create_proof(
        &self,
        requirement: &PaymentRequirement,
    ) -> Result<Option<PaymentResolution>, ResolveError> {
        // Held across the ledger call so concurrent requests cannot overspend
        let mut spent = self.spent.lock().await;

        if let Err(violation) = self.budget.check(&requirement.to, requirement.amount, *spent) {
            tracing::warn!(
                to = %requirement.to,
                amount = requirement.amount,
                reason = %violation,
                "Payment declined"
            );
            return Ok(None);
        }

        let new_spent = spent
            .checked_add(requirement.amount)
            .ok_or_else(|| ResolveError::Other("spent total overflows".to_string()))?;

        let mut payments = BTreeMap::new();
        payments.insert(requirement.to.clone(), requirement.amount);

        let resolution = match &requirement.auth {
            PaymentAuth::SelfAuthenticated => PaymentResolution::SelfAuthenticated { payments },
            PaymentAuth::Remote { payment_nonce, .. } => {
                let embedded = encode_transaction_data(&LedgerTransactionData::PaymentIdentifier {
                    payment_nonce: payment_nonce.clone(),
                })
                .map_err(|e| ResolveError::Other(e.to_string()))?;

                let handle = self
                    .ledger
                    .make_transaction(TransactionRequest {
                        payments,
                        embedded_data: Some(embedded),
                    })
                    .await?;

                tracing::debug!(
                    tx_id = %handle.id(),
                    payment_nonce = %payment_nonce,
                    "Remote payment transaction built"
                );
                PaymentResolution::RemoteTx { handle }
            }
        };

        *spent = new_spent;
        Ok(Some(resolution))
    }

    async fn release(&self, requirement: &PaymentRequirement) {
        let mut spent = self.spent.lock().await;
        *spent = spent.saturating_sub(requirement.amount);
        tracing::debug!(
            to = %requirement.to,
            amount = requirement.amount,
            spent = *spent,
            "Payment released"
        );
    }
}
