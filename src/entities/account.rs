//! Account entity - a bank-style account owned by one user.
//!
//! The balance is not stored independently of transactions by convention:
//! the mutation pipeline keeps it equal to the initial balance plus the
//! signed sum of the account's live transactions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EntityId;

/// Fixed set of account kinds supported by the app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Checking,
    Savings,
    Credit,
    Investment,
}

/// A user's account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Identifier; local until the remote create resolves.
    pub id: EntityId,
    /// Owning user id.
    pub user_id: String,
    /// Display name.
    pub name: String,
    /// Account kind.
    #[serde(rename = "type")]
    pub kind: AccountKind,
    /// Current balance in the account currency.
    pub balance: f64,
    /// ISO currency code, e.g. `"USD"`.
    pub currency: String,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
}

/// Shallow patch applied to an account by id. `None` fields are left
/// untouched; `id` carries the temp-to-server reconciliation swap.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountPatch {
    pub id: Option<EntityId>,
    pub name: Option<String>,
    pub kind: Option<AccountKind>,
    pub balance: Option<f64>,
    pub currency: Option<String>,
}

impl AccountPatch {
    /// A patch that only swaps the identifier (id reconciliation).
    pub fn reconcile(id: EntityId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    /// A patch that only replaces the balance.
    pub fn balance(balance: f64) -> Self {
        Self {
            balance: Some(balance),
            ..Self::default()
        }
    }

    /// Merges the patch into an account in place.
    pub fn apply_to(&self, account: &mut Account) {
        if let Some(id) = &self.id {
            account.id = id.clone();
        }
        if let Some(name) = &self.name {
            account.name = name.clone();
        }
        if let Some(kind) = self.kind {
            account.kind = kind;
        }
        if let Some(balance) = self.balance {
            account.balance = balance;
        }
        if let Some(currency) = &self.currency {
            account.currency = currency.clone();
        }
    }
}
