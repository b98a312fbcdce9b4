//! Remote sync adapter.
//!
//! Bridges the aggregate store to the document store: encodes entities into
//! their wire form (camelCase fields, epoch-millisecond timestamps, no id in
//! the body), maps store-assigned ids into marked [`EntityId`]s, and decodes
//! incoming documents fail-closed. Save calls choose create vs update from
//! the id's provenance, cascade deletes ride a single atomic batch, and live
//! subscriptions deliver typed full-collection snapshots.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::entities::{
    Account, AccountKind, Category, Collection, EntityId, Transaction, TransactionKind,
    UserProfile,
};
use crate::errors::{SubscriptionError, SyncError};
use crate::remote::{CancelHandle, Document, DocumentStore, Filter, SnapshotEvent, Subscription};

/// Wire form of an account document.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct AccountDoc {
    user_id: String,
    name: String,
    #[serde(rename = "type")]
    kind: AccountKind,
    balance: f64,
    currency: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    created_at: DateTime<Utc>,
}

impl AccountDoc {
    fn from_entity(account: &Account) -> Self {
        Self {
            user_id: account.user_id.clone(),
            name: account.name.clone(),
            kind: account.kind,
            balance: account.balance,
            currency: account.currency.clone(),
            created_at: account.created_at,
        }
    }

    fn into_entity(self, id: EntityId) -> Account {
        Account {
            id,
            user_id: self.user_id,
            name: self.name,
            kind: self.kind,
            balance: self.balance,
            currency: self.currency,
            created_at: self.created_at,
        }
    }
}

/// Wire form of a transaction document. The account reference keeps its
/// provenance marker so a transaction logged against a still-pending account
/// round-trips unchanged.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct TransactionDoc {
    user_id: String,
    account_id: String,
    amount: f64,
    #[serde(rename = "type")]
    kind: TransactionKind,
    category: String,
    description: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    date: DateTime<Utc>,
}

impl TransactionDoc {
    fn from_entity(trx: &Transaction) -> Self {
        Self {
            user_id: trx.user_id.clone(),
            account_id: trx.account_id.to_string(),
            amount: trx.amount,
            kind: trx.kind,
            category: trx.category.clone(),
            description: trx.description.clone(),
            date: trx.date,
        }
    }

    fn into_entity(self, id: EntityId) -> Transaction {
        Transaction {
            id,
            account_id: EntityId::parse(&self.account_id),
            user_id: self.user_id,
            amount: self.amount,
            kind: self.kind,
            category: self.category,
            description: self.description,
            date: self.date,
        }
    }
}

/// Wire form of the single per-user categories document; the whole list is
/// overwritten on every mutation.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CategoriesDoc {
    user_id: String,
    categories: Vec<Category>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    updated_at: DateTime<Utc>,
}

/// Wire form of a user profile document (the document id is the uid).
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ProfileDoc {
    email: String,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    avatar: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    preferred_currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    preferred_country: Option<String>,
}

fn encode<T: Serialize>(doc: &T) -> Result<serde_json::Value, SyncError> {
    serde_json::to_value(doc).map_err(|e| SyncError::Store(format!("encode failed: {e}")))
}

fn decode_doc<T: serde::de::DeserializeOwned>(doc: &Document) -> Result<T, SyncError> {
    serde_json::from_value(doc.data.clone()).map_err(|e| SyncError::Decode {
        id: doc.id.clone(),
        reason: e.to_string(),
    })
}

/// A live, typed collection feed. Documents that fail to decode are logged
/// and skipped; the rest of the snapshot stays usable.
pub struct TypedSubscription<T> {
    raw: Subscription,
    map: Box<dyn Fn(Vec<Document>) -> Vec<T> + Send>,
}

impl<T> TypedSubscription<T> {
    /// Next full snapshot, a terminal error, or `None` after teardown.
    pub async fn next(&mut self) -> Option<Result<Vec<T>, SubscriptionError>> {
        match self.raw.next().await? {
            SnapshotEvent::Snapshot(docs) => Some(Ok((self.map)(docs))),
            SnapshotEvent::Failed(err) => Some(Err(err)),
        }
    }

    /// Idempotent teardown handle.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.raw.cancel_handle()
    }

    /// Stops the feed. Idempotent.
    pub fn unsubscribe(&self) {
        self.raw.unsubscribe();
    }
}

fn decode_each<W>(collection: Collection) -> Box<dyn Fn(Vec<Document>) -> Vec<W::Entity> + Send>
where
    W: WireInto + serde::de::DeserializeOwned + 'static,
{
    Box::new(move |docs| {
        docs.into_iter()
            .filter_map(|doc| match decode_doc::<W>(&doc) {
                Ok(wire) => Some(wire.into_with_id(EntityId::from_remote(doc.id))),
                Err(err) => {
                    warn!(
                        collection = collection.as_str(),
                        %err,
                        "skipping malformed remote document"
                    );
                    None
                }
            })
            .collect()
    })
}

/// Wire document that converts into its in-memory entity once the marked id
/// is known.
trait WireInto: Sized {
    type Entity;
    fn into_with_id(self, id: EntityId) -> Self::Entity;
}

impl WireInto for AccountDoc {
    type Entity = Account;
    fn into_with_id(self, id: EntityId) -> Account {
        self.into_entity(id)
    }
}

impl WireInto for TransactionDoc {
    type Entity = Transaction;
    fn into_with_id(self, id: EntityId) -> Transaction {
        self.into_entity(id)
    }
}

/// The adapter the pipeline and session binder talk to.
pub struct SyncAdapter {
    store: Arc<dyn DocumentStore>,
}

impl SyncAdapter {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Persists an account: update when its id is already server-assigned,
    /// create otherwise. Returns the durable marked id. The local id never
    /// travels in the document body.
    pub async fn save_account(&self, account: &Account) -> Result<EntityId, SyncError> {
        let data = encode(&AccountDoc::from_entity(account))?;
        match account.id.remote_part() {
            Some(raw) => {
                self.store.update(Collection::Accounts, raw, data).await?;
                Ok(account.id.clone())
            }
            None => {
                let raw = self.store.create(Collection::Accounts, data).await?;
                Ok(EntityId::from_remote(raw))
            }
        }
    }

    /// Persists a transaction under the same create/update split.
    pub async fn save_transaction(&self, trx: &Transaction) -> Result<EntityId, SyncError> {
        let data = encode(&TransactionDoc::from_entity(trx))?;
        match trx.id.remote_part() {
            Some(raw) => {
                self.store
                    .update(Collection::Transactions, raw, data)
                    .await?;
                Ok(trx.id.clone())
            }
            None => {
                let raw = self.store.create(Collection::Transactions, data).await?;
                Ok(EntityId::from_remote(raw))
            }
        }
    }

    /// Deletes a transaction document. A still-local id has nothing durable
    /// to delete.
    pub async fn delete_transaction(&self, id: &EntityId) -> Result<(), SyncError> {
        if let Some(raw) = id.remote_part() {
            self.store.delete(Collection::Transactions, raw).await?;
        }
        Ok(())
    }

    /// Deletes an account and every transaction referencing it as one
    /// all-or-nothing batch, so a failure never leaves orphaned
    /// transactions behind.
    pub async fn delete_account_cascade(
        &self,
        user_id: &str,
        account_id: &EntityId,
    ) -> Result<(), SyncError> {
        let trx_docs = self
            .store
            .query(
                Collection::Transactions,
                &Filter::account(user_id, account_id.to_string()),
            )
            .await?;
        let mut refs: Vec<(Collection, String)> = trx_docs
            .into_iter()
            .map(|doc| (Collection::Transactions, doc.id))
            .collect();
        if let Some(raw) = account_id.remote_part() {
            refs.push((Collection::Accounts, raw.to_string()));
        }
        if refs.is_empty() {
            return Ok(());
        }
        self.store.batch_delete(&refs).await
    }

    /// Overwrites the user's whole category list.
    pub async fn save_categories(
        &self,
        user_id: &str,
        categories: &[Category],
    ) -> Result<(), SyncError> {
        let doc = CategoriesDoc {
            user_id: user_id.to_string(),
            categories: categories.to_vec(),
            updated_at: Utc::now(),
        };
        self.store
            .put(Collection::Categories, user_id, encode(&doc)?)
            .await
    }

    /// Live account feed for one user.
    pub fn subscribe_accounts(&self, user_id: &str) -> TypedSubscription<Account> {
        TypedSubscription {
            raw: self
                .store
                .subscribe(Collection::Accounts, Filter::user(user_id)),
            map: decode_each::<AccountDoc>(Collection::Accounts),
        }
    }

    /// Live transaction feed for one user.
    pub fn subscribe_transactions(&self, user_id: &str) -> TypedSubscription<Transaction> {
        TypedSubscription {
            raw: self
                .store
                .subscribe(Collection::Transactions, Filter::user(user_id)),
            map: decode_each::<TransactionDoc>(Collection::Transactions),
        }
    }

    /// Live category feed: the user's single categories document, flattened
    /// to its list (empty while the document does not exist yet).
    pub fn subscribe_categories(&self, user_id: &str) -> TypedSubscription<Category> {
        TypedSubscription {
            raw: self
                .store
                .subscribe(Collection::Categories, Filter::user(user_id)),
            map: Box::new(|docs| {
                docs.into_iter()
                    .find_map(|doc| match decode_doc::<CategoriesDoc>(&doc) {
                        Ok(wire) => Some(wire.categories),
                        Err(err) => {
                            warn!(%err, "skipping malformed categories document");
                            None
                        }
                    })
                    .unwrap_or_default()
            }),
        }
    }

    /// Fetches the stored profile for a uid, if any.
    pub async fn fetch_profile(&self, uid: &str) -> Result<Option<UserProfile>, SyncError> {
        let Some(doc) = self.store.get(Collection::Users, uid).await? else {
            return Ok(None);
        };
        let wire: ProfileDoc = decode_doc(&doc)?;
        Ok(Some(UserProfile {
            uid: uid.to_string(),
            email: wire.email,
            name: wire.name,
            avatar: wire.avatar,
            created_at: wire.created_at,
            preferred_currency: wire.preferred_currency,
            preferred_country: wire.preferred_country,
        }))
    }

    /// Creates or replaces the profile document for a user.
    pub async fn save_profile(&self, profile: &UserProfile) -> Result<(), SyncError> {
        let doc = ProfileDoc {
            email: profile.email.clone(),
            name: profile.name.clone(),
            avatar: profile.avatar.clone(),
            created_at: profile.created_at,
            preferred_currency: profile.preferred_currency.clone(),
            preferred_country: profile.preferred_country.clone(),
        };
        self.store
            .put(Collection::Users, &profile.uid, encode(&doc)?)
            .await
    }

    /// Deletes everything the user owns (accounts, transactions, category
    /// document, profile) in one atomic batch.
    pub async fn delete_all_user_data(&self, uid: &str) -> Result<(), SyncError> {
        let accounts = self
            .store
            .query(Collection::Accounts, &Filter::user(uid))
            .await?;
        let transactions = self
            .store
            .query(Collection::Transactions, &Filter::user(uid))
            .await?;

        let mut refs: Vec<(Collection, String)> = Vec::new();
        refs.extend(
            accounts
                .into_iter()
                .map(|doc| (Collection::Accounts, doc.id)),
        );
        refs.extend(
            transactions
                .into_iter()
                .map(|doc| (Collection::Transactions, doc.id)),
        );
        refs.push((Collection::Categories, uid.to_string()));
        refs.push((Collection::Users, uid.to_string()));
        self.store.batch_delete(&refs).await
    }
}
