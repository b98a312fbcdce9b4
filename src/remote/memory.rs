//! In-process document store.
//!
//! Reference implementation of [`DocumentStore`] backed by plain maps.
//! Tests run against it the way the rest of the app runs against the real
//! backend: live subscribers get a fresh filtered snapshot after every
//! mutation, and batch deletes happen under one lock so they are observed
//! all-or-nothing.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::trace;

use super::{CancelHandle, Document, DocumentStore, Filter, SnapshotEvent, Subscription};
use crate::entities::Collection;
use crate::errors::{SubscriptionError, SyncError};

#[derive(Debug)]
struct Subscriber {
    collection: Collection,
    filter: Filter,
    sender: mpsc::UnboundedSender<SnapshotEvent>,
    cancel: CancelHandle,
}

impl Subscriber {
    fn is_live(&self) -> bool {
        !self.cancel.is_cancelled() && !self.sender.is_closed()
    }
}

#[derive(Debug, Default)]
struct Inner {
    collections: HashMap<Collection, BTreeMap<String, Value>>,
    subscribers: Vec<Subscriber>,
    next_id: u64,
}

impl Inner {
    fn snapshot_for(&self, collection: Collection, filter: &Filter) -> Vec<Document> {
        self.collections
            .get(&collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, data)| filter.matches(data))
                    .map(|(id, data)| Document {
                        id: id.clone(),
                        data: data.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn notify(&mut self, collection: Collection) {
        self.subscribers.retain(Subscriber::is_live);
        let mut deliveries = Vec::new();
        for sub in &self.subscribers {
            if sub.collection == collection {
                deliveries.push((
                    sub.sender.clone(),
                    self.snapshot_for(collection, &sub.filter),
                ));
            }
        }
        for (sender, docs) in deliveries {
            let _ = sender.send(SnapshotEvent::Snapshot(docs));
        }
    }
}

/// In-memory [`DocumentStore`] with live snapshot push.
#[derive(Debug)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    fail_writes: AtomicBool,
    // true while calls are held back; flipped by resume().
    gate: watch::Sender<bool>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            inner: Mutex::default(),
            fail_writes: AtomicBool::new(false),
            gate: watch::channel(false).0,
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose calls stay pending and whose subscriptions stay silent
    /// until [`resume`](Self::resume) is called, like a backend that stopped
    /// answering. Lets tests pin the in-flight commit window open.
    pub fn paused() -> Self {
        let store = Self::new();
        store.gate.send_replace(true);
        store
    }

    /// Releases calls held by [`paused`](Self::paused) and delivers the
    /// initial snapshots held back while paused.
    pub fn resume(&self) {
        self.gate.send_replace(false);
        let mut inner = self.lock();
        let collections: HashSet<Collection> =
            inner.subscribers.iter().map(|sub| sub.collection).collect();
        for collection in collections {
            inner.notify(collection);
        }
    }

    async fn wait_available(&self) {
        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|held| !held).await;
    }

    /// Test knob: while set, every write call fails with a store error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), SyncError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SyncError::Store("simulated write failure".into()));
        }
        Ok(())
    }

    /// Test knob: terminally fails every live subscription on a collection.
    pub fn fail_subscriptions(&self, collection: Collection, reason: &str) {
        let mut inner = self.lock();
        inner.subscribers.retain(Subscriber::is_live);
        for sub in &inner.subscribers {
            if sub.collection == collection {
                let _ = sub.sender.send(SnapshotEvent::Failed(SubscriptionError {
                    reason: reason.to_string(),
                }));
            }
        }
        // The failure is terminal: drop these listeners so the error is the
        // last event they ever receive.
        inner.subscribers.retain(|sub| sub.collection != collection);
    }

    /// Number of documents currently stored in a collection.
    pub fn len(&self, collection: Collection) -> usize {
        self.lock()
            .collections
            .get(&collection)
            .map_or(0, BTreeMap::len)
    }

    /// Whether a collection holds no documents.
    pub fn is_empty(&self, collection: Collection) -> bool {
        self.len(collection) == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create(&self, collection: Collection, data: Value) -> Result<String, SyncError> {
        self.wait_available().await;
        self.check_writable()?;
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = format!("doc{}", inner.next_id);
        inner
            .collections
            .entry(collection)
            .or_default()
            .insert(id.clone(), data);
        trace!(collection = collection.as_str(), id, "document created");
        inner.notify(collection);
        Ok(id)
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        data: Value,
    ) -> Result<(), SyncError> {
        self.wait_available().await;
        self.check_writable()?;
        let mut inner = self.lock();
        let docs = inner.collections.entry(collection).or_default();
        if !docs.contains_key(id) {
            return Err(SyncError::NotFound(format!(
                "{}/{id}",
                collection.as_str()
            )));
        }
        docs.insert(id.to_string(), data);
        inner.notify(collection);
        Ok(())
    }

    async fn put(&self, collection: Collection, id: &str, data: Value) -> Result<(), SyncError> {
        self.wait_available().await;
        self.check_writable()?;
        let mut inner = self.lock();
        inner
            .collections
            .entry(collection)
            .or_default()
            .insert(id.to_string(), data);
        inner.notify(collection);
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), SyncError> {
        self.wait_available().await;
        self.check_writable()?;
        let mut inner = self.lock();
        if inner
            .collections
            .entry(collection)
            .or_default()
            .remove(id)
            .is_some()
        {
            inner.notify(collection);
        }
        Ok(())
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, SyncError> {
        self.wait_available().await;
        let inner = self.lock();
        Ok(inner
            .collections
            .get(&collection)
            .and_then(|docs| docs.get(id))
            .map(|data| Document {
                id: id.to_string(),
                data: data.clone(),
            }))
    }

    async fn query(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<Vec<Document>, SyncError> {
        self.wait_available().await;
        Ok(self.lock().snapshot_for(collection, filter))
    }

    async fn batch_delete(&self, refs: &[(Collection, String)]) -> Result<(), SyncError> {
        self.wait_available().await;
        self.check_writable()?;
        // One lock across the whole batch: subscribers never observe a
        // partially applied delete.
        let mut inner = self.lock();
        let mut touched = HashSet::new();
        for (collection, id) in refs {
            if let Some(docs) = inner.collections.get_mut(collection) {
                if docs.remove(id).is_some() {
                    touched.insert(*collection);
                }
            }
        }
        for collection in touched {
            inner.notify(collection);
        }
        Ok(())
    }

    fn subscribe(&self, collection: Collection, filter: Filter) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let cancel = CancelHandle::new();
        let mut inner = self.lock();
        // Fire the current contents immediately, like the real backend. A
        // paused store says nothing until resume() pushes the snapshot.
        if !*self.gate.borrow() {
            let _ = sender.send(SnapshotEvent::Snapshot(
                inner.snapshot_for(collection, &filter),
            ));
        }
        inner.subscribers.push(Subscriber {
            collection,
            filter,
            sender,
            cancel: cancel.clone(),
        });
        Subscription::new(receiver, cancel)
    }
}
