//! Transaction entity - a single income or expense movement.
//!
//! Amounts are stored positive; the sign is implied by the kind. Every
//! transaction references exactly one account, and deleting that account
//! deletes its transactions with it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EntityId;

/// Whether a transaction adds to or subtracts from its account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Income,
    Expense,
}

impl TransactionKind {
    /// The amount with its sign applied relative to the account balance.
    pub fn signed(self, amount: f64) -> f64 {
        match self {
            Self::Income => amount,
            Self::Expense => -amount,
        }
    }
}

/// A logged income/expense movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Identifier; local until the remote create resolves.
    pub id: EntityId,
    /// The account this transaction belongs to.
    pub account_id: EntityId,
    /// Owning user id.
    pub user_id: String,
    /// Positive amount; sign implied by `kind`.
    pub amount: f64,
    /// Income or expense.
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    /// Category name the transaction is filed under.
    pub category: String,
    /// Free-text description.
    pub description: String,
    /// When the transaction occurred.
    pub date: DateTime<Utc>,
}

/// Shallow patch applied to a transaction by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionPatch {
    pub id: Option<EntityId>,
    pub amount: Option<f64>,
    pub kind: Option<TransactionKind>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub date: Option<DateTime<Utc>>,
}

impl TransactionPatch {
    /// A patch that only swaps the identifier (id reconciliation).
    pub fn reconcile(id: EntityId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    /// Merges the patch into a transaction in place.
    pub fn apply_to(&self, trx: &mut Transaction) {
        if let Some(id) = &self.id {
            trx.id = id.clone();
        }
        if let Some(amount) = self.amount {
            trx.amount = amount;
        }
        if let Some(kind) = self.kind {
            trx.kind = kind;
        }
        if let Some(category) = &self.category {
            trx.category = category.clone();
        }
        if let Some(description) = &self.description {
            trx.description = description.clone();
        }
        if let Some(date) = self.date {
            trx.date = date;
        }
    }
}
