//! Remote document store interface.
//!
//! The durable store is an external collaborator consumed through the
//! [`DocumentStore`] trait: keyed JSON documents grouped into collections,
//! field-equality queries, atomic batch deletes, and live subscriptions that
//! push the entire matching collection on every change. [`memory::MemoryStore`]
//! is the in-process implementation the tests run against.

pub mod memory;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::entities::Collection;
use crate::errors::{SubscriptionError, SyncError};

/// One stored document: the store-assigned id plus its JSON body. Ids never
/// appear inside the body.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

/// Field-equality filter for queries and subscriptions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    /// Match documents whose `userId` field equals this.
    pub user_id: Option<String>,
    /// Match documents whose `accountId` field equals this.
    pub account_id: Option<String>,
}

impl Filter {
    /// Everything owned by one user.
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            account_id: None,
        }
    }

    /// One user's documents referencing one account.
    pub fn account(user_id: impl Into<String>, account_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            account_id: Some(account_id.into()),
        }
    }

    /// Whether a document body matches the filter.
    pub fn matches(&self, data: &Value) -> bool {
        let field_eq = |field: &str, expected: &Option<String>| match expected {
            Some(expected) => data.get(field).and_then(Value::as_str) == Some(expected.as_str()),
            None => true,
        };
        field_eq("userId", &self.user_id) && field_eq("accountId", &self.account_id)
    }
}

/// What a live subscription delivers.
#[derive(Debug)]
pub enum SnapshotEvent {
    /// The entire current collection matching the filter.
    Snapshot(Vec<Document>),
    /// Terminal failure; no further events will arrive and there is no
    /// auto-retry.
    Failed(SubscriptionError),
}

/// Idempotent unsubscribe handle. Safe to call any number of times, from
/// any owner; the store prunes the listener on its next delivery pass.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the subscription. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A live collection subscription.
///
/// Receives full-collection snapshots in the store's emission order. Must be
/// unsubscribed (directly or through its [`CancelHandle`]) exactly once per
/// subscribe on teardown; after cancellation no further event is delivered.
#[derive(Debug)]
pub struct Subscription {
    events: mpsc::UnboundedReceiver<SnapshotEvent>,
    cancel: CancelHandle,
}

impl Subscription {
    /// Pairs a receiver with its cancel handle. Store implementations call
    /// this from `subscribe`.
    pub fn new(events: mpsc::UnboundedReceiver<SnapshotEvent>, cancel: CancelHandle) -> Self {
        Self { events, cancel }
    }

    /// Next event, or `None` once the subscription is cancelled or the
    /// store side hung up.
    pub async fn next(&mut self) -> Option<SnapshotEvent> {
        if self.cancel.is_cancelled() {
            return None;
        }
        let event = self.events.recv().await;
        if self.cancel.is_cancelled() {
            return None;
        }
        event
    }

    /// Handle for tearing the subscription down from another owner.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Stops the subscription. Idempotent.
    pub fn unsubscribe(&self) {
        self.cancel.cancel();
    }
}

/// The external document store, reduced to the calls this app makes.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Creates a document with a store-assigned id and returns that id.
    async fn create(&self, collection: Collection, data: Value) -> Result<String, SyncError>;

    /// Replaces the body of an existing document.
    async fn update(&self, collection: Collection, id: &str, data: Value)
    -> Result<(), SyncError>;

    /// Creates or replaces a document at a caller-chosen id.
    async fn put(&self, collection: Collection, id: &str, data: Value) -> Result<(), SyncError>;

    /// Deletes a document. Deleting a missing document is not an error.
    async fn delete(&self, collection: Collection, id: &str) -> Result<(), SyncError>;

    /// Fetches one document by id.
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, SyncError>;

    /// All documents matching the filter.
    async fn query(&self, collection: Collection, filter: &Filter)
    -> Result<Vec<Document>, SyncError>;

    /// Deletes every referenced document as one all-or-nothing unit.
    async fn batch_delete(&self, refs: &[(Collection, String)]) -> Result<(), SyncError>;

    /// Opens a live subscription that pushes the full matching collection
    /// on every change, starting with the current contents.
    fn subscribe(&self, collection: Collection, filter: Filter) -> Subscription;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filter_matches_on_declared_fields_only() {
        let doc = json!({"userId": "u1", "accountId": "a1", "amount": 3.0});

        assert!(Filter::user("u1").matches(&doc));
        assert!(!Filter::user("u2").matches(&doc));
        assert!(Filter::account("u1", "a1").matches(&doc));
        assert!(!Filter::account("u1", "a2").matches(&doc));
        assert!(Filter::default().matches(&doc));
    }

    #[tokio::test]
    async fn cancelled_subscription_yields_nothing() {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancelHandle::new();
        let mut sub = Subscription::new(rx, cancel.clone());

        tx.send(SnapshotEvent::Snapshot(Vec::new())).unwrap();
        sub.unsubscribe();
        sub.unsubscribe(); // idempotent

        assert!(cancel.is_cancelled());
        assert!(sub.next().await.is_none());
    }
}
