//! Spending budgets for payment resolvers

use std::collections::BTreeSet;

use daia_core::Address;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a payment was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BudgetViolation {
    #[error("payment of {amount} exceeds the per-requirement limit of {limit}")]
    ExceedsPerRequirement { amount: u64, limit: u64 },

    #[error("payment of {amount} exceeds the remaining budget of {remaining}")]
    ExceedsTotal { amount: u64, remaining: u64 },

    #[error("recipient {to} is not allowed")]
    RecipientNotAllowed { to: Address },
}

/// Bounded spending authority for one wallet
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendBudget {
    /// Largest single requirement the wallet will pay
    pub max_per_requirement: Option<u64>,
    /// Total across every payment the wallet makes
    pub max_total: Option<u64>,
    /// When set, only these recipients are paid
    pub allowed_recipients: Option<BTreeSet<Address>>,
}

impl SpendBudget {
    /// A budget with no limits
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn with_max_per_requirement(mut self, limit: u64) -> Self {
        self.max_per_requirement = Some(limit);
        self
    }

    pub fn with_max_total(mut self, limit: u64) -> Self {
        self.max_total = Some(limit);
        self
    }

    pub fn with_allowed_recipients<I, A>(mut self, recipients: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Address>,
    {
        self.allowed_recipients = Some(recipients.into_iter().map(Into::into).collect());
        self
    }

    /// Check a payment given what has been spent so far
    pub fn check(&self, to: &Address, amount: u64, spent: u64) -> Result<(), BudgetViolation> {
        if let Some(allowed) = &self.allowed_recipients {
            if !allowed.contains(to) {
                return Err(BudgetViolation::RecipientNotAllowed { to: to.clone() });
            }
        }

        if let Some(limit) = self.max_per_requirement {
            if amount > limit {
                return Err(BudgetViolation::ExceedsPerRequirement { amount, limit });
            }
        }

        if let Some(limit) = self.max_total {
            let remaining = limit.saturating_sub(spent);
            if amount > remaining {
                return Err(BudgetViolation::ExceedsTotal { amount, remaining });
            }
        }

        Ok(())
    }

    /// What is left of the total, if the total is limited
    pub fn remaining(&self, spent: u64) -> Option<u64> {
        self.max_total.map(|limit| limit.saturating_sub(spent))
    }
}
