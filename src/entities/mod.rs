//! Plain data records shared across the crate.
//!
//! These are the in-memory shapes: ids carry provenance, timestamps are
//! `chrono` UTC values, and serde produces the camelCase, string-dated form
//! the local cache persists. The remote wire form lives in [`crate::sync`].

mod account;
mod category;
mod id;
mod transaction;
mod user;

pub use account::{Account, AccountKind, AccountPatch};
pub use category::{Category, CategoryPatch};
pub use id::EntityId;
pub use transaction::{Transaction, TransactionKind, TransactionPatch};
pub use user::{ProfilePatch, UserProfile};

use serde::{Deserialize, Serialize};

/// The entity collections the remote store and local cache are keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Collection {
    Accounts,
    Transactions,
    /// One document per user holding the whole category list.
    Categories,
    /// User profile documents keyed by uid.
    Users,
}

impl Collection {
    /// Stable name used for cache file names and store routing.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accounts => "accounts",
            Self::Transactions => "transactions",
            Self::Categories => "userCategories",
            Self::Users => "users",
        }
    }
}
